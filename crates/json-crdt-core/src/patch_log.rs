//! Single-blob framing for a sequence of patches.
//!
//! Layout: one format-version byte, then per patch a u32 big-endian frame
//! length followed by that many binary-codec bytes. Stores persist their
//! whole patch log as one such blob and replay it on load.

use thiserror::Error;

use crate::codec_binary;
use crate::codec_verbose::CodecError;
use crate::patch::Patch;

pub const LOG_FORMAT_VERSION: u8 = 1;
/// Upper bound on one frame; anything larger is treated as corruption.
pub const MAX_FRAME_LEN: usize = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum PatchLogError {
    #[error("unsupported patch log version: {0}")]
    Version(u8),
    #[error("corrupt patch log: blob ends mid-frame")]
    Truncated,
    #[error("corrupt patch log: frame length {0} exceeds max")]
    FrameTooLarge(usize),
    #[error("patch codec failed: {0}")]
    Codec(#[from] CodecError),
}

/// Appends one framed patch to a log blob, starting the blob if empty.
pub fn append_to_log(blob: &mut Vec<u8>, patch: &Patch) -> Result<(), PatchLogError> {
    let frame = codec_binary::encode_patch(patch)?;
    if blob.is_empty() {
        blob.push(LOG_FORMAT_VERSION);
    }
    blob.extend_from_slice(&(frame.len() as u32).to_be_bytes());
    blob.extend_from_slice(&frame);
    Ok(())
}

/// Serializes a whole patch sequence into one blob. An empty sequence
/// yields an empty blob.
pub fn encode_log<'a>(patches: impl IntoIterator<Item = &'a Patch>) -> Result<Vec<u8>, PatchLogError> {
    let mut blob = Vec::new();
    for patch in patches {
        append_to_log(&mut blob, patch)?;
    }
    Ok(blob)
}

/// Decodes a blob back into its patch sequence, in frame order.
pub fn decode_log(blob: &[u8]) -> Result<Vec<Patch>, PatchLogError> {
    let Some((&version, mut rest)) = blob.split_first() else {
        return Ok(Vec::new());
    };
    if version != LOG_FORMAT_VERSION {
        return Err(PatchLogError::Version(version));
    }

    let mut patches = Vec::new();
    while !rest.is_empty() {
        let (frame, tail) = split_frame(rest)?;
        patches.push(codec_binary::decode_patch(frame)?);
        rest = tail;
    }
    Ok(patches)
}

fn split_frame(data: &[u8]) -> Result<(&[u8], &[u8]), PatchLogError> {
    if data.len() < 4 {
        return Err(PatchLogError::Truncated);
    }
    let (header, body) = data.split_at(4);
    let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    if len > MAX_FRAME_LEN {
        return Err(PatchLogError::FrameTooLarge(len));
    }
    if body.len() < len {
        return Err(PatchLogError::Truncated);
    }
    Ok(body.split_at(len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SessionId;
    use crate::patch_builder::PatchBuilder;
    use crate::value::NodeValue;
    use serde_json::json;

    fn sample_patch(seed: u8) -> Patch {
        let mut b = PatchBuilder::new(SessionId::from_bytes([seed; 16]), 1);
        let obj = b.new_obj();
        b.ins_obj(obj, vec![("seed".to_string(), NodeValue::Lit(json!(seed)))]);
        b.build()
    }

    #[test]
    fn empty_log_round_trips() {
        let blob = encode_log([]).unwrap();
        assert!(blob.is_empty());
        assert!(decode_log(&blob).unwrap().is_empty());
    }

    #[test]
    fn log_round_trips_in_order() {
        let patches = vec![sample_patch(1), sample_patch(2), sample_patch(3)];
        let blob = encode_log(&patches).unwrap();
        assert_eq!(decode_log(&blob).unwrap(), patches);
    }

    #[test]
    fn append_extends_an_existing_blob() {
        let mut blob = encode_log([&sample_patch(1)]).unwrap();
        append_to_log(&mut blob, &sample_patch(2)).unwrap();
        let restored = decode_log(&blob).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored[1], sample_patch(2));
    }

    #[test]
    fn corrupt_blobs_are_detected() {
        assert!(matches!(decode_log(&[9]), Err(PatchLogError::Version(9))));
        assert!(matches!(
            decode_log(&[LOG_FORMAT_VERSION, 0, 0]),
            Err(PatchLogError::Truncated)
        ));
        assert!(matches!(
            decode_log(&[LOG_FORMAT_VERSION, 0, 0, 0, 8, 1]),
            Err(PatchLogError::Truncated)
        ));
    }
}

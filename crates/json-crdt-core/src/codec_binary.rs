//! Compact binary patch codec: CBOR over the verbose wire shape.
//!
//! Both codecs share one schema, so a patch decoded from either form is
//! identical in memory and can be re-encoded in the other.

use serde_json::Value;

use crate::codec_verbose::{self, CodecError};
use crate::patch::Patch;

pub fn encode_patch(patch: &Patch) -> Result<Vec<u8>, CodecError> {
    let wire = codec_verbose::encode_patch(patch)?;
    let mut out = Vec::with_capacity(128);
    ciborium::ser::into_writer(&wire, &mut out)
        .map_err(|e| CodecError::Binary(e.to_string()))?;
    Ok(out)
}

pub fn decode_patch(data: &[u8]) -> Result<Patch, CodecError> {
    let wire: Value =
        ciborium::de::from_reader(data).map_err(|e| CodecError::Binary(e.to_string()))?;
    codec_verbose::decode_patch(&wire)
}

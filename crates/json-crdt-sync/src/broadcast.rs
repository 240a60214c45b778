//! Eager patch fan-out to interested subscribers.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use json_crdt_core::{codec_binary, codec_verbose, DocError, Patch};

use crate::error::SyncError;

/// Encoding of an envelope payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncodingFormat {
    Json,
    Base64,
    Binary,
}

impl EncodingFormat {
    pub fn wire_name(&self) -> &'static str {
        match self {
            EncodingFormat::Json => "json",
            EncodingFormat::Base64 => "base64",
            EncodingFormat::Binary => "binary",
        }
    }

    pub fn from_wire_name(name: &str) -> Result<Self, DocError> {
        Ok(match name {
            "json" => EncodingFormat::Json,
            "base64" => EncodingFormat::Base64,
            "binary" => EncodingFormat::Binary,
            other => return Err(DocError::InvalidEncoding(other.to_string())),
        })
    }
}

/// Pub/sub message: a serialized patch plus enough framing to decode it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub topic: String,
    pub payload: Vec<u8>,
    pub encoding: EncodingFormat,
}

impl Envelope {
    pub fn from_patch(
        topic: &str,
        patch: &Patch,
        encoding: EncodingFormat,
    ) -> Result<Self, SyncError> {
        let payload = match encoding {
            EncodingFormat::Json => {
                let wire = codec_verbose::encode_patch(patch)?;
                serde_json::to_vec(&wire)
                    .map_err(|e| SyncError::Broadcast(format!("json encode: {e}")))?
            }
            EncodingFormat::Base64 => {
                let bin = codec_binary::encode_patch(patch)?;
                base64::engine::general_purpose::STANDARD
                    .encode(bin)
                    .into_bytes()
            }
            EncodingFormat::Binary => codec_binary::encode_patch(patch)?,
        };
        Ok(Self {
            topic: topic.to_string(),
            payload,
            encoding,
        })
    }

    pub fn decode_patch(&self) -> Result<Patch, SyncError> {
        match self.encoding {
            EncodingFormat::Json => {
                let wire: serde_json::Value = serde_json::from_slice(&self.payload)
                    .map_err(|e| SyncError::Broadcast(format!("json decode: {e}")))?;
                Ok(codec_verbose::decode_patch(&wire)?)
            }
            EncodingFormat::Base64 => {
                let bin = base64::engine::general_purpose::STANDARD
                    .decode(&self.payload)
                    .map_err(|e| SyncError::Broadcast(format!("base64 decode: {e}")))?;
                Ok(codec_binary::decode_patch(&bin)?)
            }
            EncodingFormat::Binary => Ok(codec_binary::decode_patch(&self.payload)?),
        }
    }
}

/// Publishes every locally-applied patch immediately. At-least-once, no
/// ordering guarantee across topics.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn publish(&self, envelope: Envelope) -> Result<(), SyncError>;
}

/// In-process fan-out over a tokio broadcast channel.
#[derive(Debug)]
pub struct ChannelBroadcaster {
    tx: broadcast::Sender<Envelope>,
}

impl ChannelBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChannelBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Broadcaster for ChannelBroadcaster {
    async fn publish(&self, envelope: Envelope) -> Result<(), SyncError> {
        // A send error only means there are no subscribers right now, which
        // is not a failure for at-least-once fan-out.
        let _ = self.tx.send(envelope);
        Ok(())
    }
}

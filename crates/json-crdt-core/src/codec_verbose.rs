//! Human-readable JSON patch codec.
//!
//! One JSON object per operation, discriminated by the `op` field:
//! `new_<kind>` for node creation, `ins`, `del`, and `nop`. Every row
//! carries its own `id`; structural rows add `obj` plus payload fields.
//! Timestamps encode as `{"sid": <16 bytes>, "cnt": <u64>}`. Temporal
//! values and node references exist only in sentinel form on the wire
//! (`{"type":"time",...}` / `{"type":"ref",...}`); in memory they are
//! proper `NodeValue` variants.

use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::clock::{SessionId, Timestamp};
use crate::node::NodeKind;
use crate::patch::{DelTarget, InsPayload, Op, Patch};
use crate::value::NodeValue;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("patch must not be empty")]
    EmptyPatch,
    #[error("invalid patch payload")]
    InvalidPayload,
    #[error("invalid operation row")]
    InvalidOperation,
    #[error("unknown operation: {0}")]
    UnknownOperation(String),
    #[error("invalid timestamp encoding")]
    InvalidTimestamp,
    #[error("invalid base64 payload")]
    InvalidBase64,
    #[error("invalid temporal value")]
    InvalidTemporal,
    #[error("binary frame error: {0}")]
    Binary(String),
}

pub(crate) fn ts_to_wire(ts: Timestamp) -> Value {
    let mut out = Map::new();
    out.insert(
        "sid".to_string(),
        Value::Array(ts.sid.as_bytes().iter().map(|b| Value::from(*b)).collect()),
    );
    out.insert("cnt".to_string(), Value::from(ts.cnt));
    Value::Object(out)
}

pub(crate) fn ts_from_wire(v: &Value) -> Result<Timestamp, CodecError> {
    let obj = v.as_object().ok_or(CodecError::InvalidTimestamp)?;
    let sid_arr = obj
        .get("sid")
        .and_then(Value::as_array)
        .ok_or(CodecError::InvalidTimestamp)?;
    if sid_arr.len() != 16 {
        return Err(CodecError::InvalidTimestamp);
    }
    let mut bytes = [0u8; 16];
    for (i, b) in sid_arr.iter().enumerate() {
        bytes[i] = b
            .as_u64()
            .and_then(|n| u8::try_from(n).ok())
            .ok_or(CodecError::InvalidTimestamp)?;
    }
    let cnt = obj
        .get("cnt")
        .and_then(Value::as_u64)
        .ok_or(CodecError::InvalidTimestamp)?;
    Ok(Timestamp::new(SessionId::from_bytes(bytes), cnt))
}

fn value_to_wire(value: &NodeValue) -> Value {
    match value {
        NodeValue::Lit(v) => v.clone(),
        NodeValue::Ref(ts) => {
            let mut out = Map::new();
            out.insert("type".to_string(), Value::String("ref".to_string()));
            out.insert("value".to_string(), ts_to_wire(*ts));
            Value::Object(out)
        }
        NodeValue::Temporal(t) => {
            let mut out = Map::new();
            out.insert("type".to_string(), Value::String("time".to_string()));
            out.insert("value".to_string(), Value::String(t.to_rfc3339()));
            Value::Object(out)
        }
    }
}

fn value_from_wire(v: &Value) -> Result<NodeValue, CodecError> {
    if let Some(obj) = v.as_object() {
        if obj.len() == 2 {
            match obj.get("type").and_then(Value::as_str) {
                Some("ref") => {
                    let ts =
                        ts_from_wire(obj.get("value").ok_or(CodecError::InvalidOperation)?)?;
                    return Ok(NodeValue::Ref(ts));
                }
                Some("time") => {
                    let raw = obj
                        .get("value")
                        .and_then(Value::as_str)
                        .ok_or(CodecError::InvalidTemporal)?;
                    let t = DateTime::parse_from_rfc3339(raw)
                        .map_err(|_| CodecError::InvalidTemporal)?;
                    return Ok(NodeValue::Temporal(t.with_timezone(&Utc)));
                }
                _ => {}
            }
        }
    }
    Ok(NodeValue::Lit(v.clone()))
}

fn encode_op(op: &Op) -> Value {
    let mut row = Map::new();
    row.insert("id".to_string(), ts_to_wire(op.id()));
    match op {
        Op::New { kind, value, .. } => {
            row.insert(
                "op".to_string(),
                Value::String(format!("new_{}", kind.wire_name())),
            );
            if let Some(value) = value {
                row.insert("value".to_string(), value_to_wire(value));
            }
        }
        Op::Ins { obj, payload, .. } => {
            row.insert("op".to_string(), Value::String("ins".to_string()));
            row.insert("obj".to_string(), ts_to_wire(*obj));
            match payload {
                InsPayload::Val(value) => {
                    row.insert("value".to_string(), value_to_wire(value));
                }
                InsPayload::Obj(entries) => match entries.as_slice() {
                    [(key, value)] => {
                        row.insert("key".to_string(), Value::String(key.clone()));
                        row.insert("value".to_string(), value_to_wire(value));
                    }
                    _ => {
                        row.insert(
                            "entries".to_string(),
                            Value::Array(
                                entries
                                    .iter()
                                    .map(|(k, v)| {
                                        let mut e = Map::new();
                                        e.insert("key".to_string(), Value::String(k.clone()));
                                        e.insert("value".to_string(), value_to_wire(v));
                                        Value::Object(e)
                                    })
                                    .collect(),
                            ),
                        );
                    }
                },
                InsPayload::Vec(entries) => {
                    row.insert(
                        "entries".to_string(),
                        Value::Array(
                            entries
                                .iter()
                                .map(|(i, v)| {
                                    let mut e = Map::new();
                                    e.insert("index".to_string(), Value::from(*i));
                                    e.insert("value".to_string(), value_to_wire(v));
                                    Value::Object(e)
                                })
                                .collect(),
                        ),
                    );
                }
                InsPayload::Str { after, text } => {
                    row.insert("after".to_string(), ts_to_wire(*after));
                    row.insert("value".to_string(), Value::String(text.clone()));
                }
                InsPayload::Arr { after, values } => {
                    row.insert("after".to_string(), ts_to_wire(*after));
                    row.insert(
                        "values".to_string(),
                        Value::Array(values.iter().map(value_to_wire).collect()),
                    );
                }
                InsPayload::Bin { after, data } => {
                    row.insert("after".to_string(), ts_to_wire(*after));
                    row.insert(
                        "data".to_string(),
                        Value::String(base64::engine::general_purpose::STANDARD.encode(data)),
                    );
                }
            }
        }
        Op::Del { obj, target, .. } => {
            row.insert("op".to_string(), Value::String("del".to_string()));
            row.insert("obj".to_string(), ts_to_wire(*obj));
            match target {
                DelTarget::Key(key) => {
                    row.insert("key".to_string(), Value::String(key.clone()));
                }
                DelTarget::Index(index) => {
                    row.insert("index".to_string(), Value::from(*index));
                }
                DelTarget::Range { start, end } => {
                    row.insert("start".to_string(), ts_to_wire(*start));
                    row.insert("end".to_string(), ts_to_wire(*end));
                }
                DelTarget::Node => {}
            }
        }
        Op::Nop { len, .. } => {
            row.insert("op".to_string(), Value::String("nop".to_string()));
            if *len > 1 {
                row.insert("len".to_string(), Value::from(*len));
            }
        }
    }
    Value::Object(row)
}

fn decode_ins(row: &Map<String, Value>) -> Result<InsPayload, CodecError> {
    if let Some(after) = row.get("after") {
        let after = ts_from_wire(after)?;
        if let Some(text) = row.get("value").and_then(Value::as_str) {
            return Ok(InsPayload::Str {
                after,
                text: text.to_string(),
            });
        }
        if let Some(values) = row.get("values").and_then(Value::as_array) {
            return Ok(InsPayload::Arr {
                after,
                values: values
                    .iter()
                    .map(value_from_wire)
                    .collect::<Result<Vec<_>, _>>()?,
            });
        }
        if let Some(data) = row.get("data").and_then(Value::as_str) {
            return Ok(InsPayload::Bin {
                after,
                data: base64::engine::general_purpose::STANDARD
                    .decode(data)
                    .map_err(|_| CodecError::InvalidBase64)?,
            });
        }
        return Err(CodecError::InvalidOperation);
    }
    if let Some(key) = row.get("key").and_then(Value::as_str) {
        let value = value_from_wire(row.get("value").ok_or(CodecError::InvalidOperation)?)?;
        return Ok(InsPayload::Obj(vec![(key.to_string(), value)]));
    }
    if let Some(entries) = row.get("entries").and_then(Value::as_array) {
        let rows = entries
            .iter()
            .map(|e| e.as_object().ok_or(CodecError::InvalidOperation))
            .collect::<Result<Vec<_>, _>>()?;
        let indexed = rows.first().is_some_and(|e| e.contains_key("index"));
        if indexed {
            let entries = rows
                .iter()
                .map(|e| {
                    let index = e
                        .get("index")
                        .and_then(Value::as_u64)
                        .ok_or(CodecError::InvalidOperation)?;
                    let value =
                        value_from_wire(e.get("value").ok_or(CodecError::InvalidOperation)?)?;
                    Ok((index, value))
                })
                .collect::<Result<Vec<_>, CodecError>>()?;
            return Ok(InsPayload::Vec(entries));
        }
        let entries = rows
            .iter()
            .map(|e| {
                let key = e
                    .get("key")
                    .and_then(Value::as_str)
                    .ok_or(CodecError::InvalidOperation)?;
                let value = value_from_wire(e.get("value").ok_or(CodecError::InvalidOperation)?)?;
                Ok((key.to_string(), value))
            })
            .collect::<Result<Vec<_>, CodecError>>()?;
        return Ok(InsPayload::Obj(entries));
    }
    if let Some(value) = row.get("value") {
        return Ok(InsPayload::Val(value_from_wire(value)?));
    }
    Err(CodecError::InvalidOperation)
}

fn decode_del(row: &Map<String, Value>) -> Result<DelTarget, CodecError> {
    if let Some(key) = row.get("key").and_then(Value::as_str) {
        return Ok(DelTarget::Key(key.to_string()));
    }
    if let Some(index) = row.get("index").and_then(Value::as_u64) {
        return Ok(DelTarget::Index(index));
    }
    if let (Some(start), Some(end)) = (row.get("start"), row.get("end")) {
        return Ok(DelTarget::Range {
            start: ts_from_wire(start)?,
            end: ts_from_wire(end)?,
        });
    }
    // A register clear carries no target fields at all; a row with leftover
    // or misspelled fields is malformed, not a clear.
    if row.keys().all(|k| matches!(k.as_str(), "op" | "id" | "obj")) {
        return Ok(DelTarget::Node);
    }
    Err(CodecError::InvalidOperation)
}

fn decode_op(row: &Value) -> Result<Op, CodecError> {
    let row = row.as_object().ok_or(CodecError::InvalidOperation)?;
    let name = row
        .get("op")
        .and_then(Value::as_str)
        .ok_or(CodecError::InvalidOperation)?;
    let id = ts_from_wire(row.get("id").ok_or(CodecError::InvalidOperation)?)?;
    if let Some(kind) = name.strip_prefix("new_") {
        let kind =
            NodeKind::from_wire_name(kind).map_err(|_| CodecError::UnknownOperation(name.to_string()))?;
        let value = row.get("value").map(value_from_wire).transpose()?;
        return Ok(Op::New { id, kind, value });
    }
    match name {
        "ins" => Ok(Op::Ins {
            id,
            obj: ts_from_wire(row.get("obj").ok_or(CodecError::InvalidOperation)?)?,
            payload: decode_ins(row)?,
        }),
        "del" => Ok(Op::Del {
            id,
            obj: ts_from_wire(row.get("obj").ok_or(CodecError::InvalidOperation)?)?,
            target: decode_del(row)?,
        }),
        "nop" => Ok(Op::Nop {
            id,
            len: row.get("len").and_then(Value::as_u64).unwrap_or(1),
        }),
        other => Err(CodecError::UnknownOperation(other.to_string())),
    }
}

pub fn encode_patch(patch: &Patch) -> Result<Value, CodecError> {
    if patch.is_empty() {
        return Err(CodecError::EmptyPatch);
    }
    let mut root = Map::new();
    root.insert(
        "ops".to_string(),
        Value::Array(patch.ops.iter().map(encode_op).collect()),
    );
    if !patch.metadata.is_empty() {
        root.insert("metadata".to_string(), Value::Object(patch.metadata.clone()));
    }
    Ok(Value::Object(root))
}

pub fn decode_patch(wire: &Value) -> Result<Patch, CodecError> {
    let root = wire.as_object().ok_or(CodecError::InvalidPayload)?;
    let rows = root
        .get("ops")
        .and_then(Value::as_array)
        .ok_or(CodecError::InvalidPayload)?;
    if rows.is_empty() {
        return Err(CodecError::EmptyPatch);
    }
    let ops = rows.iter().map(decode_op).collect::<Result<Vec<_>, _>>()?;
    let metadata = match root.get("metadata") {
        Some(Value::Object(m)) => m.clone(),
        Some(_) => return Err(CodecError::InvalidPayload),
        None => Map::new(),
    };
    Ok(Patch { ops, metadata })
}

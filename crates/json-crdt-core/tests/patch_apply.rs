//! Patch application semantics: sequencing, failure, and clock effects.

use json_crdt_core::{
    codec_binary, codec_verbose, DocError, Document, NodeKind, NodeValue, Op, Patch, SessionId,
    Timestamp, ROOT_ID,
};
use serde_json::json;

fn sid(b: u8) -> SessionId {
    SessionId::from_bytes([b; 16])
}

fn ts(b: u8, cnt: u64) -> Timestamp {
    Timestamp::new(sid(b), cnt)
}

#[test]
fn failed_op_aborts_without_rolling_back_earlier_ops() {
    let mut doc = Document::new(sid(1));

    let mut b = doc.builder();
    let obj = b.new_obj();
    b.ins_obj(obj, vec![("a".to_string(), NodeValue::Lit(json!(1)))]);
    b.ins_val(ROOT_ID, NodeValue::Ref(obj));
    let mut patch = b.build();
    // Target a node that does not exist; everything before it must stick.
    patch.ops.push(Op::Ins {
        id: ts(1, 50),
        obj: ts(9, 9),
        payload: json_crdt_core::InsPayload::Val(NodeValue::Lit(json!(2))),
    });

    let before = doc.version();
    let err = patch.apply(&mut doc).unwrap_err();
    assert!(matches!(err, DocError::NodeNotFound(_)));

    // Earlier ops applied, but the version did not advance.
    assert_eq!(doc.view(), json!({"a": 1}));
    assert_eq!(doc.version(), before);
}

#[test]
fn version_advances_once_per_successful_patch() {
    let mut doc = Document::new(sid(1));
    assert_eq!(doc.version(), 0);

    let mut b = doc.builder();
    let obj = b.new_obj();
    b.ins_val(ROOT_ID, NodeValue::Ref(obj));
    b.build().apply(&mut doc).unwrap();
    assert_eq!(doc.version(), 1);

    let mut b = doc.builder();
    b.nop(1);
    b.build().apply(&mut doc).unwrap();
    assert_eq!(doc.version(), 2);
}

#[test]
fn nop_reserves_counter_space_without_document_effect() {
    let mut doc = Document::new(sid(1));
    let before = doc.view();

    let patch = Patch::new(vec![Op::Nop {
        id: ts(1, 100),
        len: 25,
    }]);
    patch.apply(&mut doc).unwrap();

    assert_eq!(doc.view(), before);
    assert!(doc.next_timestamp().cnt >= 125);
}

#[test]
fn foreign_patch_advances_the_local_clock_past_its_range() {
    let mut doc = Document::new(sid(1));

    let mut remote = Document::new(sid(7));
    let mut b = remote.builder();
    let s = b.new_str();
    b.ins_str(s, s, "abcdef").unwrap();
    b.ins_val(ROOT_ID, NodeValue::Ref(s));
    let patch = b.build();
    let span = patch.span();

    patch.apply(&mut doc).unwrap();
    assert_eq!(doc.view(), json!("abcdef"));
    assert!(doc.next_timestamp().cnt > span);
}

#[test]
fn new_op_for_existing_node_keeps_prior_state() {
    let mut doc = Document::new(sid(1));
    let mut b = doc.builder();
    let s = b.new_str();
    b.ins_str(s, s, "keep").unwrap();
    b.ins_val(ROOT_ID, NodeValue::Ref(s));
    b.build().apply(&mut doc).unwrap();

    // A redelivered create for the same id must not reset the node.
    let recreate = Patch::new(vec![Op::New {
        id: s,
        kind: NodeKind::Str,
        value: None,
    }]);
    recreate.apply(&mut doc).unwrap();
    assert_eq!(doc.view(), json!("keep"));
}

#[test]
fn patches_survive_both_codecs_and_apply_identically() {
    let mut source = Document::new(sid(3));
    let mut b = source.builder();
    let obj = b.new_obj();
    let s = b.new_str();
    b.ins_str(s, s, "codec").unwrap();
    b.ins_obj(
        obj,
        vec![
            ("text".to_string(), NodeValue::Ref(s)),
            ("n".to_string(), NodeValue::Lit(json!(42))),
        ],
    );
    b.ins_val(ROOT_ID, NodeValue::Ref(obj));
    b.set_metadata("origin", json!("codec-test"));
    let patch = b.build();

    let via_json = codec_verbose::decode_patch(&codec_verbose::encode_patch(&patch).unwrap())
        .unwrap();
    let via_cbor = codec_binary::decode_patch(&codec_binary::encode_patch(&patch).unwrap())
        .unwrap();
    assert_eq!(via_json, patch);
    assert_eq!(via_cbor, patch);

    let mut a = Document::new(sid(0x51));
    let mut b = Document::new(sid(0x52));
    via_json.apply(&mut a).unwrap();
    via_cbor.apply(&mut b).unwrap();
    assert_eq!(a.view(), b.view());
    assert_eq!(a.view(), json!({"n": 42, "text": "codec"}));
}

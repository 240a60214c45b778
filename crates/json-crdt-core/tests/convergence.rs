//! Multi-replica convergence scenarios driven through the public API.

use json_crdt_core::{Document, NodeValue, Patch, SessionId, ROOT_ID};
use serde_json::json;

fn sid(b: u8) -> SessionId {
    SessionId::from_bytes([b; 16])
}

/// Creates a root object with a `counter` key and returns the bootstrap
/// patch plus the object node id.
fn bootstrap(doc: &mut Document) -> (Patch, json_crdt_core::Timestamp) {
    let mut b = doc.builder();
    let obj = b.new_obj();
    b.ins_obj(obj, vec![("counter".to_string(), NodeValue::Lit(json!(0)))]);
    b.ins_val(ROOT_ID, NodeValue::Ref(obj));
    let patch = b.build();
    patch.apply(doc).unwrap();
    (patch, obj)
}

#[test]
fn lww_conflict_resolves_identically_on_both_replicas() {
    let mut a = Document::new(sid(0xaa));
    let mut b = Document::new(sid(0xbb));

    let (boot, obj) = bootstrap(&mut a);
    boot.apply(&mut b).unwrap();

    // Concurrent writes to the same key from both sessions.
    let mut ba = a.builder();
    ba.ins_obj(obj, vec![("counter".to_string(), NodeValue::Lit(json!(5)))]);
    let write_a = ba.build();

    let mut bb = b.builder();
    bb.ins_obj(obj, vec![("counter".to_string(), NodeValue::Lit(json!(10)))]);
    let write_b = bb.build();

    write_a.apply(&mut a).unwrap();
    write_b.apply(&mut a).unwrap();

    write_b.apply(&mut b).unwrap();
    write_a.apply(&mut b).unwrap();

    assert_eq!(a.view(), b.view());
    // Session 0xbb orders after 0xaa, so its write wins on both replicas.
    assert_eq!(a.view(), json!({"counter": 10}));
}

#[test]
fn rga_edits_in_disjoint_regions_do_not_interfere() {
    let mut a = Document::new(sid(0xaa));
    let mut b = Document::new(sid(0xbb));

    let mut boot = a.builder();
    let s = boot.new_str();
    boot.ins_str(s, s, "hello world").unwrap();
    boot.ins_val(ROOT_ID, NodeValue::Ref(s));
    let boot = boot.build();
    boot.apply(&mut a).unwrap();
    boot.apply(&mut b).unwrap();

    // a edits the front, b edits the back, concurrently.
    let hello_o = match a.get_node(s).unwrap() {
        json_crdt_core::Node::Str(n) => n.visible_slot(4).unwrap(),
        _ => unreachable!(),
    };
    let world_d = match b.get_node(s).unwrap() {
        json_crdt_core::Node::Str(n) => n.visible_slot(10).unwrap(),
        _ => unreachable!(),
    };

    let mut ba = a.builder();
    ba.ins_str(s, hello_o, ",").unwrap();
    let edit_a = ba.build();

    let mut bb = b.builder();
    bb.ins_str(s, world_d, "!").unwrap();
    let edit_b = bb.build();

    edit_a.apply(&mut a).unwrap();
    edit_b.apply(&mut a).unwrap();

    edit_b.apply(&mut b).unwrap();
    edit_a.apply(&mut b).unwrap();

    assert_eq!(a.view(), json!("hello, world!"));
    assert_eq!(a.view(), b.view());
}

#[test]
fn redelivered_patches_leave_state_unchanged() {
    let mut a = Document::new(sid(0xaa));
    let (boot, obj) = bootstrap(&mut a);

    let mut b = a.builder();
    b.ins_obj(obj, vec![("counter".to_string(), NodeValue::Lit(json!(1)))]);
    b.del_key(obj, "gone");
    let patch = b.build();

    patch.apply(&mut a).unwrap();
    let once = a.view();
    patch.apply(&mut a).unwrap();
    boot.apply(&mut a).unwrap();
    assert_eq!(a.view(), once);
}

#[test]
fn three_replicas_converge_under_arbitrary_delivery_orders() {
    let sids = [0x11, 0x22, 0x33];
    let mut docs: Vec<Document> = sids.iter().map(|b| Document::new(sid(*b))).collect();

    let (boot, obj) = bootstrap(&mut docs[0]);
    boot.apply(&mut docs[1]).unwrap();
    boot.apply(&mut docs[2]).unwrap();

    // Each replica makes a concurrent write to its own key.
    let mut patches = Vec::new();
    for (i, doc) in docs.iter_mut().enumerate() {
        let mut b = doc.builder();
        b.ins_obj(
            obj,
            vec![(format!("k{i}"), NodeValue::Lit(json!(i as u64)))],
        );
        let patch = b.build();
        patch.apply(doc).unwrap();
        patches.push(patch);
    }

    // Deliver the two foreign patches to each replica in opposite orders.
    for (i, doc) in docs.iter_mut().enumerate() {
        let mut foreign: Vec<&Patch> = patches
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, p)| p)
            .collect();
        if i % 2 == 1 {
            foreign.reverse();
        }
        for patch in foreign {
            patch.apply(doc).unwrap();
        }
    }

    let expected = json!({"counter": 0, "k0": 0, "k1": 1, "k2": 2});
    for doc in &docs {
        assert_eq!(doc.view(), expected);
    }
}

#[test]
fn delete_and_concurrent_write_converge_to_the_later_timestamp() {
    let mut a = Document::new(sid(0xaa));
    let mut b = Document::new(sid(0xbb));

    let (boot, obj) = bootstrap(&mut a);
    boot.apply(&mut b).unwrap();

    let mut ba = a.builder();
    ba.ins_obj(obj, vec![("counter".to_string(), NodeValue::Lit(json!(99)))]);
    let write = ba.build();

    let mut bb = b.builder();
    bb.del_key(obj, "counter");
    let delete = bb.build();

    write.apply(&mut a).unwrap();
    delete.apply(&mut a).unwrap();

    delete.apply(&mut b).unwrap();
    write.apply(&mut b).unwrap();

    assert_eq!(a.view(), b.view());
    // 0xbb's delete carries the greater timestamp, so the key stays gone.
    assert_eq!(a.view(), json!({}));
}

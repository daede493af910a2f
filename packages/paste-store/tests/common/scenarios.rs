//! Store contract scenarios
//!
//! Every backend must pass these. Stores are built with a lifetime of
//! [`TTL`] seconds. Timed scenarios take the `ManualClock` driving the store.

use paste_store::{DocumentStore, ErrorKind, ManualClock};
use pretty_assertions::assert_eq;

use super::assertions::{assert_hits_ordered, assert_stats_ordered, count_of, keys_of};
use super::fixtures::{Ns, TTL};

const TTL_SECS: i64 = TTL as i64;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Documents
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn roundtrip(store: &dyn DocumentStore, ns: &Ns) {
    let doc = ns.doc("rt", "Round Trip", "alpha, beta");
    store.set(&doc, false).await.unwrap();

    let value = store.get(&doc.key, false).await.unwrap();
    assert_eq!(value.as_deref(), Some(doc.value.as_str()));
    assert_eq!(store.get(&ns.key("absent"), false).await.unwrap(), None);
}

pub async fn empty_title_and_tags(store: &dyn DocumentStore, ns: &Ns) {
    let first = ns.doc("bare1", "", "");
    let second = ns.doc("bare2", "", " , ");
    store.set(&first, false).await.unwrap();
    store.set(&second, false).await.unwrap();

    assert!(store.get(&first.key, true).await.unwrap().is_some());
    assert!(store.get(&second.key, true).await.unwrap().is_some());
}

pub async fn live_key_collision(store: &dyn DocumentStore, clock: &ManualClock, ns: &Ns) {
    let original = ns.doc("dup", "Original", "");
    store.set(&original, false).await.unwrap();

    let err = store.set(&ns.doc("dup", "Intruder", ""), false).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ConstraintViolation);
    assert_eq!(
        store.get(&original.key, true).await.unwrap().as_deref(),
        Some(original.value.as_str())
    );

    // Expired keys may be reused
    clock.advance(TTL_SECS + 1);
    let mut reuse = ns.doc("dup", "Reuse", "");
    reuse.value = "second life".to_string();
    store.set(&reuse, false).await.unwrap();
    assert_eq!(
        store.get(&reuse.key, true).await.unwrap().as_deref(),
        Some("second life")
    );
}

pub async fn delete_negative(store: &dyn DocumentStore, clock: &ManualClock, ns: &Ns) {
    assert!(!store.delete(&ns.key("never")).await.unwrap());

    let doc = ns.doc("del", "Delete Me", "");
    store.set(&doc, false).await.unwrap();
    assert!(store.delete(&doc.key).await.unwrap());
    assert!(!store.delete(&doc.key).await.unwrap());
    assert_eq!(store.get(&doc.key, false).await.unwrap(), None);

    let expired = ns.doc("del-exp", "Expired", "");
    store.set(&expired, false).await.unwrap();
    clock.advance(TTL_SECS + 1);
    assert!(!store.delete(&expired.key).await.unwrap());
}

pub async fn reserved_keys_absent(store: &dyn DocumentStore, ns: &Ns) {
    let tag = ns.tag("guarded");
    let doc = ns.doc("guarded", "Guarded", &tag);
    store.set(&doc, false).await.unwrap();

    let doc_tags = format!("{}:tags", doc.key);
    for key in ["tags:stats", "docs:expiry", "docs:tags", doc_tags.as_str()] {
        assert_eq!(store.get(key, false).await.unwrap(), None, "get {}", key);
        assert!(!store.delete(key).await.unwrap(), "delete {}", key);
    }

    assert!(store.get(&doc.key, true).await.unwrap().is_some());
    assert_eq!(count_of(&store.tag_stats().await.unwrap(), &tag), 1);
    assert!(store.delete(&doc.key).await.unwrap());
    assert_eq!(count_of(&store.tag_stats().await.unwrap(), &tag), 0);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Expiration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn liveness_boundary(store: &dyn DocumentStore, clock: &ManualClock, ns: &Ns) {
    let doc = ns.doc("live", "Liveness", "");
    store.set(&doc, false).await.unwrap();

    clock.advance(TTL_SECS - 1);
    assert!(store.get(&doc.key, true).await.unwrap().is_some());

    clock.advance(2);
    assert_eq!(store.get(&doc.key, true).await.unwrap(), None);
    assert_eq!(store.get(&doc.key, false).await.unwrap(), None);
}

pub async fn refresh_on_read(store: &dyn DocumentStore, clock: &ManualClock, ns: &Ns) {
    let doc = ns.doc("refresh", "Refresh", "");
    store.set(&doc, false).await.unwrap();

    clock.advance(TTL_SECS / 2);
    assert!(store.get(&doc.key, false).await.unwrap().is_some());

    // Deadline is now T + TTL/2 + TTL
    clock.advance(TTL_SECS - 1);
    assert!(store.get(&doc.key, true).await.unwrap().is_some());

    clock.advance(2);
    assert_eq!(store.get(&doc.key, true).await.unwrap(), None);
}

pub async fn skip_expire_read_keeps_deadline(
    store: &dyn DocumentStore,
    clock: &ManualClock,
    ns: &Ns,
) {
    let doc = ns.doc("peek", "Peek", "");
    store.set(&doc, false).await.unwrap();

    clock.advance(TTL_SECS / 2);
    assert!(store.get(&doc.key, true).await.unwrap().is_some());

    clock.advance(TTL_SECS / 2 + 1);
    assert_eq!(store.get(&doc.key, true).await.unwrap(), None);
}

pub async fn refresh_never_adds_deadline(
    store: &dyn DocumentStore,
    clock: &ManualClock,
    ns: &Ns,
) {
    let doc = ns.doc("forever", "Forever", "");
    store.set(&doc, true).await.unwrap();

    clock.advance(TTL_SECS * 10);
    assert!(store.get(&doc.key, false).await.unwrap().is_some());

    clock.advance(TTL_SECS * 10);
    assert!(store.get(&doc.key, false).await.unwrap().is_some());
}

pub async fn purge_expired(store: &dyn DocumentStore, clock: &ManualClock, ns: &Ns) -> usize {
    let tag = ns.tag("purge");
    let short = ns.doc("purge-a", "Short", &tag);
    let kept = ns.doc("purge-b", "Kept", &tag);
    store.set(&short, false).await.unwrap();
    store.set(&kept, true).await.unwrap();

    clock.advance(TTL_SECS + 1);
    let purged = store.purge_expired().await.unwrap();
    assert!(purged >= 1, "expected at least one purged document");

    assert_eq!(store.get(&short.key, true).await.unwrap(), None);
    assert!(store.get(&kept.key, true).await.unwrap().is_some());
    assert_eq!(count_of(&store.tag_stats().await.unwrap(), &tag), 1);
    purged
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tags
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn tag_accounting(store: &dyn DocumentStore, ns: &Ns) {
    let x = ns.tag("x");
    let y = ns.tag("y");
    let a = ns.doc("tag-a", "A", &format!("{}, {}, {}", x, y, x));
    let b = ns.doc("tag-b", "B", &x);
    store.set(&a, false).await.unwrap();
    store.set(&b, false).await.unwrap();

    let stats = store.tag_stats().await.unwrap();
    assert_stats_ordered(&stats);
    assert_eq!((count_of(&stats, &x), count_of(&stats, &y)), (2, 1));

    assert!(store.delete(&a.key).await.unwrap());
    let stats = store.tag_stats().await.unwrap();
    assert_eq!((count_of(&stats, &x), count_of(&stats, &y)), (1, 0));

    assert!(store.delete(&b.key).await.unwrap());
    let stats = store.tag_stats().await.unwrap();
    assert_eq!(count_of(&stats, &x), 0);
}

pub async fn tag_counts_follow_expiry(store: &dyn DocumentStore, clock: &ManualClock, ns: &Ns) {
    let tag = ns.tag("fleeting");
    store
        .set(&ns.doc("exp-a", "A", &tag), false)
        .await
        .unwrap();
    store.set(&ns.doc("exp-b", "B", &tag), true).await.unwrap();
    assert_eq!(count_of(&store.tag_stats().await.unwrap(), &tag), 2);

    clock.advance(TTL_SECS + 1);
    let stats = store.tag_stats().await.unwrap();
    assert_stats_ordered(&stats);
    assert_eq!(count_of(&stats, &tag), 1);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Search
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn search_case_insensitive(store: &dyn DocumentStore, ns: &Ns) {
    let hello = ns.doc("hello", "Hello World", "");
    let tagged = ns.doc("tagged", "Untitled", &ns.tag("RustLang"));
    store.set(&hello, false).await.unwrap();
    store.set(&tagged, false).await.unwrap();

    for term in ["hello", "HELLO WORLD", "lo wor"] {
        let hits = store.search(term).await.unwrap();
        assert!(
            keys_of(&hits).contains(&hello.key.as_str()),
            "'{}' should match '{}'",
            term,
            hello.title
        );
    }

    let hits = store.search(&ns.tag("rustlang")).await.unwrap();
    assert_eq!(keys_of(&hits), vec![tagged.key.as_str()]);
    assert_eq!(hits[0].title, "Untitled");

    // Case folding is not limited to ASCII
    let accented = ns.doc("accented", &format!("{} ÉCOLE Straße", ns.key("Fr")), "");
    store.set(&accented, false).await.unwrap();
    let hits = store.search(&format!("{} école", ns.key("Fr"))).await.unwrap();
    assert_eq!(keys_of(&hits), vec![accented.key.as_str()]);

    let missing = store.search(&ns.key("zz-no-such-title")).await.unwrap();
    assert!(missing.is_empty());
}

pub async fn search_matches_each_tag_alone(store: &dyn DocumentStore, ns: &Ns) {
    let doc = ns.doc("pair", "Pair", &format!("{}, {}", ns.tag("ab"), ns.tag("cd")));
    store.set(&doc, false).await.unwrap();

    let hits = store.search(&ns.tag("cd")).await.unwrap();
    assert_eq!(keys_of(&hits), vec![doc.key.as_str()]);

    // A term spanning two tags matches neither
    let across = format!("b,{}", ns.tag("c"));
    assert!(store.search(&across).await.unwrap().is_empty());
}

pub async fn search_ordered_by_key(store: &dyn DocumentStore, ns: &Ns) {
    let title = format!("{} ordering", ns.key("Search"));
    for name in ["s3", "s1", "s2"] {
        store.set(&ns.doc(name, &title, ""), false).await.unwrap();
    }

    let hits = store.search(&title).await.unwrap();
    assert_hits_ordered(&hits);
    assert_eq!(
        keys_of(&hits),
        vec![ns.key("s1").as_str(), ns.key("s2").as_str(), ns.key("s3").as_str()]
    );
}

pub async fn search_excludes_expired(store: &dyn DocumentStore, clock: &ManualClock, ns: &Ns) {
    let title = format!("{} ephemeral", ns.key("Search"));
    let short = ns.doc("eph-a", &title, "");
    let kept = ns.doc("eph-b", &title, "");
    store.set(&short, false).await.unwrap();
    store.set(&kept, true).await.unwrap();

    clock.advance(TTL_SECS + 1);
    let hits = store.search(&title).await.unwrap();
    assert_eq!(keys_of(&hits), vec![kept.key.as_str()]);

    // Expired documents must not match through their tags either
    let tag = ns.tag("ghosttag");
    store
        .set(&ns.doc("eph-c", "Other", &tag), false)
        .await
        .unwrap();
    clock.advance(TTL_SECS + 1);
    assert!(store.search(&tag).await.unwrap().is_empty());
}

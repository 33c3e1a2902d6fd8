use confab::db::models::Role;
use confab::db::{Store, StoreError};
use tempfile::TempDir;

#[test]
fn appends_keep_their_order_across_interleaved_conversations() {
    let store = Store::open_in_memory().unwrap();
    let a = store.create_conversation("alice").unwrap();
    let b = store.create_conversation("alice").unwrap();

    store.append_message(&a.id, Role::User, "a1").unwrap();
    store.append_message(&b.id, Role::User, "b1").unwrap();
    store.append_message(&a.id, Role::Assistant, "a2").unwrap();
    store.append_message(&b.id, Role::Assistant, "b2").unwrap();
    store.append_message(&a.id, Role::User, "a3").unwrap();

    let texts: Vec<String> = store
        .list_messages(&a.id, None)
        .unwrap()
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(texts, ["a1", "a2", "a3"]);

    let texts: Vec<String> = store
        .list_messages(&b.id, None)
        .unwrap()
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(texts, ["b1", "b2"]);
}

#[test]
fn limit_one_returns_the_just_appended_message() {
    let store = Store::open_in_memory().unwrap();
    let conv = store.create_conversation("alice").unwrap();
    for text in ["first", "second", "third"] {
        let appended = store.append_message(&conv.id, Role::User, text).unwrap();
        let latest = store.list_messages(&conv.id, Some(1)).unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].id, appended.id);
        assert_eq!(latest[0].content, text);
    }
}

#[test]
fn delete_cascades_to_messages() {
    let store = Store::open_in_memory().unwrap();
    let conv = store.create_conversation("alice").unwrap();
    let msg = store.append_message(&conv.id, Role::User, "hello").unwrap();

    store.delete(&conv.id).unwrap();

    assert!(matches!(
        store.get_conversation(&conv.id),
        Err(StoreError::NotFound(_))
    ));
    assert!(matches!(
        store.get_message(&msg.id),
        Err(StoreError::NotFound(_))
    ));
    assert!(matches!(
        store.list_messages(&conv.id, None),
        Err(StoreError::NotFound(_))
    ));
    assert!(matches!(
        store.delete(&conv.id),
        Err(StoreError::NotFound(_))
    ));
}

#[test]
fn title_stays_default_until_renamed() {
    let store = Store::open_in_memory().unwrap();
    let conv = store.create_conversation("alice").unwrap();
    store.append_message(&conv.id, Role::User, "Hello").unwrap();
    store
        .append_message(&conv.id, Role::Assistant, "Hi there")
        .unwrap();

    let listed = store.list_conversations("alice", None).unwrap();
    assert_eq!(listed[0].title, "New Chat");

    store.rename(&conv.id, "Greeting").unwrap();
    let listed = store.list_conversations("alice", None).unwrap();
    assert_eq!(listed[0].title, "Greeting");
}

#[test]
fn listing_orders_pinned_first_then_newest() {
    let store = Store::open_in_memory().unwrap();
    let oldest = store.create_conversation("alice").unwrap();
    let middle = store.create_conversation("alice").unwrap();
    let newest = store.create_conversation("alice").unwrap();
    store.set_pinned(&oldest.id, true).unwrap();

    let ids: Vec<String> = store
        .list_conversations("alice", None)
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(ids[0], oldest.id);
    assert!(ids[1..].contains(&middle.id));
    assert!(ids[1..].contains(&newest.id));
}

#[test]
fn title_filter_is_a_case_insensitive_substring_match() {
    let store = Store::open_in_memory().unwrap();
    let groceries = store.create_conversation("alice").unwrap();
    let work = store.create_conversation("alice").unwrap();
    store.rename(&groceries.id, "Grocery Planning").unwrap();
    store.rename(&work.id, "Work Notes").unwrap();

    let hits = store.list_conversations("alice", Some("gROcer")).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, groceries.id);

    assert!(store
        .list_conversations("alice", Some("missing"))
        .unwrap()
        .is_empty());
}

#[test]
fn conversations_are_scoped_to_their_user() {
    let store = Store::open_in_memory().unwrap();
    store.create_conversation("alice").unwrap();
    store.create_conversation("bob").unwrap();

    assert_eq!(store.list_conversations("alice", None).unwrap().len(), 1);
    assert_eq!(store.list_conversations("bob", None).unwrap().len(), 1);
    assert!(store.list_conversations("carol", None).unwrap().is_empty());
}

#[test]
fn store_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("confab.db");

    let conv_id = {
        let store = Store::open(&db_path).unwrap();
        let conv = store.create_conversation("alice").unwrap();
        store.append_message(&conv.id, Role::User, "persisted").unwrap();
        conv.id
    };

    let store = Store::open(&db_path).unwrap();
    let messages = store.list_messages(&conv_id, None).unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "persisted");
}

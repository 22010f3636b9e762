use super::*;
use std::time::Duration as StdDuration;

use crate::test_support::{message_ids, sample_message};

#[test]
fn add_message_dedups_by_id() {
    let store = ChatStore::new();
    assert!(store.add_message(GroupId(5), sample_message(42, 5, 0)));
    assert!(!store.add_message(GroupId(5), sample_message(42, 5, 1)));
    assert_eq!(store.messages(GroupId(5)).len(), 1);
}

#[test]
fn id_42_survives_every_insertion_path_exactly_once() {
    let store = ChatStore::new();
    store.add_message(GroupId(5), sample_message(42, 5, 2));
    store.set_messages(
        GroupId(5),
        vec![sample_message(42, 5, 2), sample_message(41, 5, 1)],
    );
    store.prepend_messages(
        GroupId(5),
        vec![sample_message(40, 5, 0), sample_message(42, 5, 2)],
    );
    store.add_message(GroupId(5), sample_message(42, 5, 2));

    let matches = store
        .messages(GroupId(5))
        .into_iter()
        .filter(|m| m.id.0 == 42)
        .count();
    assert_eq!(matches, 1);
}

#[test]
fn reads_are_sorted_ascending_regardless_of_insertion_order() {
    let store = ChatStore::new();
    // History pages arrive newest-request-first; pushes arrive append-only.
    store.set_messages(
        GroupId(5),
        vec![sample_message(30, 5, 30), sample_message(10, 5, 10)],
    );
    store.add_message(GroupId(5), sample_message(20, 5, 20));
    store.prepend_messages(
        GroupId(5),
        vec![sample_message(5, 5, 5), sample_message(15, 5, 15)],
    );
    store.add_message(GroupId(5), sample_message(40, 5, 40));

    assert_eq!(message_ids(&store.messages(GroupId(5))), vec![5, 10, 15, 20, 30, 40]);
}

#[test]
fn prepend_filters_ids_already_present() {
    let store = ChatStore::new();
    store.set_messages(
        GroupId(5),
        vec![sample_message(10, 5, 10), sample_message(11, 5, 11)],
    );
    store.prepend_messages(
        GroupId(5),
        vec![
            sample_message(8, 5, 8),
            sample_message(10, 5, 10),
            sample_message(9, 5, 9),
        ],
    );
    assert_eq!(message_ids(&store.messages(GroupId(5))), vec![8, 9, 10, 11]);
}

#[test]
fn set_messages_replaces_wholesale() {
    let store = ChatStore::new();
    store.add_message(GroupId(5), sample_message(1, 5, 1));
    store.set_messages(GroupId(5), vec![sample_message(2, 5, 2)]);
    assert_eq!(message_ids(&store.messages(GroupId(5))), vec![2]);
}

#[test]
fn rooms_are_independent() {
    let store = ChatStore::new();
    store.add_message(GroupId(5), sample_message(1, 5, 1));
    store.add_message(GroupId(6), sample_message(2, 6, 2));

    store.clear_room(GroupId(5));
    assert!(store.messages(GroupId(5)).is_empty());
    assert_eq!(message_ids(&store.messages(GroupId(6))), vec![2]);

    store.clear_all();
    assert!(store.messages(GroupId(6)).is_empty());
}

#[tokio::test(start_paused = true)]
async fn typing_entries_expire_lazily_at_the_ttl() {
    let store = ChatStore::new();
    store.set_typing(GroupId(5), UserId(7), "alice", true);

    tokio::time::advance(StdDuration::from_millis(4999)).await;
    let visible = store.typing_users(GroupId(5));
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].username, "alice");

    // No intervening write: expiry happens on read.
    tokio::time::advance(StdDuration::from_millis(2)).await;
    assert!(store.typing_users(GroupId(5)).is_empty());
}

#[tokio::test(start_paused = true)]
async fn typing_refresh_restarts_the_ttl() {
    let store = ChatStore::new();
    store.set_typing(GroupId(5), UserId(7), "alice", true);
    tokio::time::advance(StdDuration::from_millis(3000)).await;
    store.set_typing(GroupId(5), UserId(7), "alice", true);

    tokio::time::advance(StdDuration::from_millis(3000)).await;
    assert_eq!(store.typing_users(GroupId(5)).len(), 1);

    tokio::time::advance(StdDuration::from_millis(2001)).await;
    assert!(store.typing_users(GroupId(5)).is_empty());
}

#[tokio::test(start_paused = true)]
async fn typing_false_removes_immediately() {
    let store = ChatStore::new();
    store.set_typing(GroupId(5), UserId(7), "alice", true);
    store.set_typing(GroupId(5), UserId(9), "bob", true);

    store.set_typing(GroupId(5), UserId(7), "alice", false);
    let visible = store.typing_users(GroupId(5));
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].user_id, UserId(9));
}

#[tokio::test(start_paused = true)]
async fn clear_room_drops_typing_state_too() {
    let store = ChatStore::new();
    store.set_typing(GroupId(5), UserId(7), "alice", true);
    store.clear_room(GroupId(5));
    assert!(store.typing_users(GroupId(5)).is_empty());
}

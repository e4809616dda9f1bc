// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn sentence(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_owned).collect()
}

/// A small tree shaped like the real one: branches with actions,
/// channel leaves, an action-less root.
fn sample_tree() -> CommandTree {
    let mut tree = CommandTree::new();
    let root = tree.root();
    let help = tree.add(root, "help", Some(Action::Help));
    tree.add(help, "get", Some(Action::GetHelp));
    let subscribe = tree.add(root, "subscribe", Some(Action::SubscribeHelp));
    let to = tree.add(subscribe, "to", Some(Action::SubscribeHelp));
    tree.add(to, "protobuf_all", Some(Action::Subscribe("protobuf_all".to_owned())));
    tree.add(to, "0of09", Some(Action::Subscribe("0of09".to_owned())));
    tree
}

#[test]
fn walk_empty_sentence_stays_at_root() {
    let tree = sample_tree();
    assert_eq!(tree.walk(&[]), tree.root());
}

#[test]
fn walk_descends_matching_tokens() {
    let tree = sample_tree();
    let node = tree.walk(&sentence("subscribe to protobuf_all"));
    assert_eq!(tree.action(node), Some(&Action::Subscribe("protobuf_all".to_owned())));
}

#[test]
fn walk_stops_at_unmatched_token() {
    let tree = sample_tree();
    let node = tree.walk(&sentence("subscribe nonsense protobuf_all"));
    assert_eq!(tree.action(node), Some(&Action::SubscribeHelp));
}

#[test]
fn walk_ignores_tokens_past_a_leaf() {
    let tree = sample_tree();
    let node = tree.walk(&sentence("subscribe to 0of09 trailing junk"));
    assert_eq!(tree.action(node), Some(&Action::Subscribe("0of09".to_owned())));
}

#[test]
fn walk_is_deterministic() {
    let tree = sample_tree();
    let tokens = sentence("subscribe to 0of09");
    assert_eq!(tree.walk(&tokens), tree.walk(&tokens));
}

#[test]
fn descendants_lists_children_in_insertion_order() {
    let tree = sample_tree();
    let listing = tree.descendants(tree.root(), 0);
    assert_eq!(
        listing,
        "help\n  get\nsubscribe\n  to\n    protobuf_all\n    0of09\n"
    );
}

#[test]
fn descendants_depth_controls_indentation() {
    let tree = sample_tree();
    let node = tree.walk(&sentence("subscribe to"));
    assert_eq!(tree.descendants(node, 0), "protobuf_all\n0of09\n");
    assert_eq!(tree.descendants(node, 2), "    protobuf_all\n    0of09\n");
}

#[test]
fn descendants_of_leaf_is_empty() {
    let tree = sample_tree();
    let node = tree.walk(&sentence("subscribe to 0of09"));
    assert!(tree.is_leaf(node));
    assert_eq!(tree.descendants(node, 0), "");
}

#[test]
fn re_adding_a_token_keeps_position_and_replaces_action() {
    let mut tree = CommandTree::new();
    let root = tree.root();
    tree.add(root, "first", Some(Action::Help));
    tree.add(root, "second", Some(Action::GetHelp));
    let len_before = tree.len();
    let node = tree.add(root, "first", Some(Action::GetHelp));
    assert_eq!(tree.len(), len_before);
    assert_eq!(tree.action(node), Some(&Action::GetHelp));
    assert_eq!(tree.descendants(root, 0), "first\nsecond\n");
}

#[test]
fn new_tree_is_empty_root() {
    let tree = CommandTree::new();
    assert!(tree.is_empty());
    assert!(tree.is_leaf(tree.root()));
    assert_eq!(tree.action(tree.root()), None);
}

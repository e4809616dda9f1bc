// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hierarchical command tree for the client text protocol.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]; a rebuild
//! replaces the whole arena, so stale ids from a previous generation
//! cannot alias into the new tree. Children are kept in insertion order
//! because the descendant listing is a client-visible format.

use indexmap::IndexMap;

/// Index of a node inside one tree generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// What a matched node does to the calling session. Actions are plain
/// data; the dispatcher interprets them against its own tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Help,
    HelpHelp,
    GetHelp,
    GetHelpRx,
    GetHelpTx,
    GetHelpMessagesReceived,
    GetHelpMessagesLost,
    SubscribeHelp,
    UnsubscribeHelp,
    PortsForZabbix,
    StoredPbs,
    StoredAsciiWaveforms,
    GetRx(String),
    GetTx(String),
    GetMessagesReceived(String),
    GetMessagesLost(String),
    Subscribe(String),
    Unsubscribe(String),
}

#[derive(Debug, Default)]
struct Node {
    children: IndexMap<String, NodeId>,
    action: Option<Action>,
}

/// Rooted, finite token tree.
#[derive(Debug)]
pub struct CommandTree {
    nodes: Vec<Node>,
}

impl Default for CommandTree {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandTree {
    /// A tree holding only an action-less root.
    pub fn new() -> Self {
        Self { nodes: vec![Node::default()] }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Attach a child under `parent`. Re-adding an existing token
    /// replaces its action and keeps the original position and subtree.
    pub fn add(&mut self, parent: NodeId, token: impl Into<String>, action: Option<Action>) -> NodeId {
        let token = token.into();
        if let Some(&existing) = self.nodes[parent.0].children.get(&token) {
            self.nodes[existing.0].action = action;
            return existing;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node { children: IndexMap::new(), action });
        self.nodes[parent.0].children.insert(token, id);
        id
    }

    pub fn action(&self, id: NodeId) -> Option<&Action> {
        self.nodes[id.0].action.as_ref()
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.nodes[id.0].children.is_empty()
    }

    /// Consume tokens left to right, descending to the matching child at
    /// each step. Stops at a leaf or at the first unmatched token; the
    /// remaining tail is discarded silently.
    pub fn walk(&self, sentence: &[String]) -> NodeId {
        let mut current = self.root();
        for token in sentence {
            if self.is_leaf(current) {
                break;
            }
            match self.nodes[current.0].children.get(token) {
                Some(&child) => current = child,
                None => break,
            }
        }
        current
    }

    /// Indented listing of a node's subtree: children in insertion
    /// order, each line prefixed by `2*depth` spaces. Every line is
    /// newline-terminated, so the output concatenates cleanly.
    pub fn descendants(&self, id: NodeId, depth: usize) -> String {
        let mut out = String::new();
        for (token, &child) in &self.nodes[id.0].children {
            for _ in 0..depth {
                out.push_str("  ");
            }
            out.push_str(token);
            out.push('\n');
            out.push_str(&self.descendants(child, depth + 1));
        }
        out
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;

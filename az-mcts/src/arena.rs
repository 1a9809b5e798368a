//! Arena-backed node storage, addressed by index and looked up by canonical state key.

use az_core::StateKey;
use rustc_hash::FxHashMap;

use crate::node::{Node, NodeId};

pub struct Arena {
    nodes: Vec<Node>,
    index: FxHashMap<StateKey, NodeId>,
}

impl Arena {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            index: FxHashMap::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.index.clear();
    }

    /// Return the node for `key`, creating it with `make` on first sight.
    pub fn get_or_insert_with(&mut self, key: StateKey, make: impl FnOnce() -> Node) -> NodeId {
        if let Some(&id) = self.index.get(&key) {
            return id;
        }
        let id = self.nodes.len() as NodeId;
        self.nodes.push(make());
        self.index.insert(key, id);
        id
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id as usize]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id as usize]
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

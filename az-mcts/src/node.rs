//! Node and edge statistics for PUCT.

use az_core::{Player, PlayerValue};

pub type NodeId = u32;

/// One position in the search tree.
///
/// Edge statistics are stored on the parent, one slot per legal action in ascending action order.
#[derive(Clone, Debug)]
pub struct Node {
    pub to_play: Player,
    /// Exact value of a finished position; such nodes are never expanded.
    pub terminal: Option<PlayerValue>,
    pub is_expanded: bool,
    /// Evaluator value estimate, from `to_play`'s point of view.
    pub value: f32,

    pub actions: Vec<usize>,
    pub n: Vec<u32>,
    pub w: Vec<f32>,
    pub p: Vec<f32>,
    pub n_sum: u32,
}

impl Node {
    pub fn new(to_play: Player, terminal: Option<PlayerValue>) -> Self {
        Self {
            to_play,
            terminal,
            is_expanded: false,
            value: 0.0,
            actions: Vec::new(),
            n: Vec::new(),
            w: Vec::new(),
            p: Vec::new(),
            n_sum: 0,
        }
    }

    /// Install priors for `actions`; visit statistics start at zero.
    pub fn expand(&mut self, actions: Vec<usize>, priors: Vec<f32>, value: f32) {
        let k = actions.len();
        self.actions = actions;
        self.p = priors;
        self.n = vec![0; k];
        self.w = vec![0.0; k];
        self.n_sum = 0;
        self.value = value;
        self.is_expanded = true;
    }

    /// Mean value of edge `e` from `to_play`'s point of view; 0 for unvisited edges.
    pub fn q(&self, e: usize) -> f32 {
        let n = self.n[e];
        if n == 0 {
            0.0
        } else {
            self.w[e] / (n as f32)
        }
    }
}

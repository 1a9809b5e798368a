//! Core PUCT MCTS (single-threaded) over any `az_core::Game`.

use az_core::{Game, GameError, Player, PlayerValue};
use rand::Rng;
use rand_distr::{Distribution, Gamma};
use thiserror::Error;

use crate::arena::Arena;
use crate::infer::{legal_priors, uniform_over_legal, EvaluationError, Evaluator};
use crate::node::{Node, NodeId};

/// Added under the square root so the first visit of a node still follows the priors.
const SQRT_EPS: f32 = 1e-8;

#[derive(Clone, Copy, Debug)]
pub struct MctsConfig {
    pub c_puct: f32,
    pub simulations: u32,
    /// Keep nodes across searches until `reset` is called.
    pub reuse_tree: bool,
    /// Root Dirichlet alpha (self-play only).
    pub dirichlet_alpha: f32,
    /// Root Dirichlet epsilon mix-in fraction (self-play only); 0 disables noise.
    pub dirichlet_epsilon: f32,
}

impl Default for MctsConfig {
    fn default() -> Self {
        Self {
            c_puct: 2.0,
            simulations: 64,
            reuse_tree: true,
            dirichlet_alpha: 0.3,
            dirichlet_epsilon: 0.0,
        }
    }
}

impl From<&az_core::MctsConfig> for MctsConfig {
    fn from(c: &az_core::MctsConfig) -> Self {
        Self {
            c_puct: c.cpuct,
            simulations: c.num_mcts_sims,
            reuse_tree: c.reuse_tree,
            dirichlet_alpha: c.dirichlet_alpha,
            dirichlet_epsilon: c.dirichlet_epsilon,
        }
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid config: {msg}")]
    InvalidConfig { msg: &'static str },
    #[error("cannot search from a terminal state")]
    TerminalRoot,
    #[error("non-terminal state has no legal actions")]
    NoLegalActions,
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error(transparent)]
    Game(#[from] GameError),
}

#[derive(Default, Clone, Debug)]
pub struct SearchStats {
    pub node_count: usize,
    pub simulations: u32,
    pub expansions: u32,
    pub terminal_hits: u32,
    /// Descents stopped because they returned to a position already on the path.
    pub cycle_cutoffs: u32,
}

#[derive(Clone, Debug)]
pub struct SearchResult {
    /// Root visit distribution over the full action space; sums to 1.
    pub pi: Vec<f32>,
    /// Root value estimate from the mover's point of view.
    pub root_value: f32,
    /// Root priors used for selection (after noise), over the full action space.
    pub root_priors: Vec<f32>,
    pub stats: SearchStats,
}

impl SearchResult {
    /// Most visited action; ties go to the lowest index.
    pub fn best_action(&self) -> Option<usize> {
        argmax_first(&self.pi)
    }
}

/// (node, edge index) pairs from the root down.
type Path = Vec<(NodeId, usize)>;

pub struct Mcts {
    cfg: MctsConfig,
    arena: Arena,
    stats: SearchStats,
    // Priors used at the root for the current search (raw or noisy), indexed by edge.
    root_p: Vec<f32>,
}

impl Mcts {
    pub fn new(cfg: MctsConfig) -> Result<Self, SearchError> {
        if !(cfg.c_puct.is_finite() && cfg.c_puct > 0.0) {
            return Err(SearchError::InvalidConfig {
                msg: "c_puct must be finite and > 0",
            });
        }
        if cfg.simulations == 0 {
            return Err(SearchError::InvalidConfig {
                msg: "simulations must be > 0",
            });
        }
        if !(cfg.dirichlet_epsilon.is_finite() && (0.0..=1.0).contains(&cfg.dirichlet_epsilon)) {
            return Err(SearchError::InvalidConfig {
                msg: "dirichlet_epsilon must be in [0,1]",
            });
        }
        if cfg.dirichlet_epsilon > 0.0
            && !(cfg.dirichlet_alpha.is_finite() && cfg.dirichlet_alpha > 0.0)
        {
            return Err(SearchError::InvalidConfig {
                msg: "dirichlet_alpha must be finite and > 0",
            });
        }
        Ok(Self {
            cfg,
            arena: Arena::new(),
            stats: SearchStats::default(),
            root_p: Vec::new(),
        })
    }

    pub fn config(&self) -> &MctsConfig {
        &self.cfg
    }

    /// Drop every node. The next search starts from an empty tree.
    pub fn reset(&mut self) {
        self.arena.clear();
    }

    pub fn node_count(&self) -> usize {
        self.arena.len()
    }

    /// Run `cfg.simulations` simulations from `root` and return the visit distribution.
    ///
    /// `rng` is only consumed for root Dirichlet noise.
    pub fn search<G, E, R>(
        &mut self,
        game: &G,
        root: &G::State,
        evaluator: &E,
        rng: &mut R,
    ) -> Result<SearchResult, SearchError>
    where
        G: Game,
        E: Evaluator + ?Sized,
        R: Rng + ?Sized,
    {
        if game.is_terminal(root) {
            return Err(SearchError::TerminalRoot);
        }
        if !self.cfg.reuse_tree {
            self.reset();
        }
        self.stats = SearchStats::default();

        let root_id = self.node_for(game, root);
        // Expand root immediately (priors available for PUCT).
        if !self.arena.get(root_id).is_expanded {
            self.expand(root_id, game, root, evaluator)?;
        }

        let raw = self.arena.get(root_id).p.clone();
        self.root_p = if self.cfg.dirichlet_epsilon > 0.0 {
            apply_root_dirichlet_noise(
                &raw,
                self.cfg.dirichlet_alpha,
                self.cfg.dirichlet_epsilon,
                rng,
            )
        } else {
            raw
        };

        // A forced move needs no simulations; the distribution is one-hot either way.
        if self.arena.get(root_id).actions.len() > 1 {
            for _ in 0..self.cfg.simulations {
                self.simulate(root_id, game, root, evaluator)?;
                self.stats.simulations += 1;
            }
        }

        self.stats.node_count = self.arena.len();
        let result = self.finish(root_id, game.action_space());
        log::trace!(
            "search: {} sims, {} nodes, {} expansions, root_value={:.3}",
            result.stats.simulations,
            result.stats.node_count,
            result.stats.expansions,
            result.root_value
        );
        Ok(result)
    }

    fn simulate<G, E>(
        &mut self,
        root_id: NodeId,
        game: &G,
        root: &G::State,
        evaluator: &E,
    ) -> Result<(), SearchError>
    where
        G: Game,
        E: Evaluator + ?Sized,
    {
        let mut state = root.clone();
        let mut node_id = root_id;
        let mut path: Path = Vec::new();
        let mut on_path: Vec<NodeId> = vec![root_id];

        let leaf_value = loop {
            let node = self.arena.get(node_id);
            if let Some(v) = node.terminal {
                self.stats.terminal_hits += 1;
                break v;
            }
            if !node.is_expanded {
                break self.expand(node_id, game, &state, evaluator)?;
            }

            let e = self.select_edge(node_id, root_id);
            let action = self.arena.get(node_id).actions[e];
            state = game.apply(&state, action)?;
            path.push((node_id, e));

            let child = self.node_for(game, &state);
            if on_path.contains(&child) {
                // Repetition: score the loop as a draw instead of descending forever.
                self.stats.cycle_cutoffs += 1;
                break PlayerValue::new(Player::First, 0.0);
            }
            on_path.push(child);
            node_id = child;
        };

        self.backup(&path, leaf_value);
        Ok(())
    }

    fn node_for<G: Game>(&mut self, game: &G, state: &G::State) -> NodeId {
        let key = game.state_key(state);
        self.arena.get_or_insert_with(key, || {
            Node::new(
                game.to_play(state),
                game.outcome(state).map(PlayerValue::from_outcome),
            )
        })
    }

    fn expand<G, E>(
        &mut self,
        node_id: NodeId,
        game: &G,
        state: &G::State,
        evaluator: &E,
    ) -> Result<PlayerValue, SearchError>
    where
        G: Game,
        E: Evaluator + ?Sized,
    {
        let actions = game.legal_actions(state);
        if actions.is_empty() {
            return Err(SearchError::NoLegalActions);
        }
        let features = game.encode(state);
        let legal = game.legal_mask(state);
        let eval = evaluator.evaluate(&features, &legal)?;
        let priors = legal_priors(&eval, game.action_space(), &actions)?;

        let n = self.arena.get_mut(node_id);
        n.expand(actions, priors, eval.value);
        self.stats.expansions += 1;
        Ok(PlayerValue::new(n.to_play, eval.value))
    }

    fn select_edge(&self, node_id: NodeId, root_id: NodeId) -> usize {
        let n = self.arena.get(node_id);
        let p = if node_id == root_id && self.root_p.len() == n.p.len() {
            &self.root_p
        } else {
            &n.p
        };
        puct_select(self.cfg.c_puct, n, p)
    }

    fn backup(&mut self, path: &[(NodeId, usize)], leaf_value: PlayerValue) {
        for &(node_id, e) in path.iter().rev() {
            let n = self.arena.get_mut(node_id);
            // Express value in the parent node's POV.
            let v = leaf_value.value_for(n.to_play);
            n.n[e] += 1;
            n.w[e] += v;
            n.n_sum += 1;
        }
    }

    fn finish(&self, root_id: NodeId, action_space: usize) -> SearchResult {
        let root = self.arena.get(root_id);
        let mut pi = vec![0.0f32; action_space];
        let mut root_priors = vec![0.0f32; action_space];
        for (e, &a) in root.actions.iter().enumerate() {
            pi[a] = root.n[e] as f32;
            root_priors[a] = self.root_p.get(e).copied().unwrap_or(root.p[e]);
        }

        let sum: f32 = pi.iter().sum();
        if sum > 0.0 {
            for v in &mut pi {
                *v /= sum;
            }
        } else if let Some(best) = argmax_first(&root_priors) {
            // Forced move, or a reused root whose visits were all spent elsewhere.
            pi[best] = 1.0;
        }

        let root_value = if root.n_sum > 0 {
            root.w.iter().sum::<f32>() / root.n_sum as f32
        } else {
            root.value
        };

        SearchResult {
            pi,
            root_value,
            root_priors,
            stats: self.stats.clone(),
        }
    }
}

/// Edge of `node` maximising `Q + c_puct * P * sqrt(N) / (1 + n)`, using `priors` for P.
pub fn puct_select(c_puct: f32, node: &Node, priors: &[f32]) -> usize {
    let sqrt_sum = (node.n_sum as f32 + SQRT_EPS).sqrt();

    let mut best_score = f32::NEG_INFINITY;
    let mut best_e = 0usize;
    for (e, &p) in priors.iter().enumerate().take(node.actions.len()) {
        let u = c_puct * p * sqrt_sum / (1.0 + node.n[e] as f32);
        let score = node.q(e) + u;
        // Strict `>`: ties keep the lowest action index.
        if score > best_score {
            best_score = score;
            best_e = e;
        }
    }
    best_e
}

fn argmax_first(v: &[f32]) -> Option<usize> {
    let mut best = None::<(usize, f32)>;
    for (i, &x) in v.iter().enumerate() {
        match best {
            Some((_, bv)) if x <= bv => {}
            _ => best = Some((i, x)),
        }
    }
    best.map(|(i, _)| i)
}

fn apply_root_dirichlet_noise<R: Rng + ?Sized>(
    p_raw: &[f32],
    alpha: f32,
    eps: f32,
    rng: &mut R,
) -> Vec<f32> {
    if p_raw.len() < 2 {
        return p_raw.to_vec();
    }
    // Sample gamma(alpha, 1) for each legal action, then normalize -> Dirichlet.
    let Ok(gamma) = Gamma::new(alpha as f64, 1.0) else {
        return p_raw.to_vec();
    };
    let eta: Vec<f64> = p_raw.iter().map(|_| gamma.sample(rng)).collect();
    let sum: f64 = eta.iter().sum();
    if !(sum.is_finite() && sum > 0.0) {
        return p_raw.to_vec();
    }

    // Mix.
    p_raw
        .iter()
        .zip(&eta)
        .map(|(&p, &x)| (1.0 - eps) * p + eps * (x / sum) as f32)
        .collect()
}

/// Executed-move distribution from a visit distribution. Caller chooses how/when to sample.
///
/// `t == 0` is greedy argmax with the lowest index winning ties; `t > 0` is `pi^(1/t)`
/// renormalised over legal actions.
pub fn apply_temperature(pi: &[f32], legal: &[bool], t: f32) -> Vec<f32> {
    if !t.is_finite() || t < 0.0 {
        return uniform_over_legal(legal);
    }
    let mut out = vec![0.0f32; pi.len()];
    if t == 0.0 {
        let mut best = None::<(usize, f32)>;
        for (i, (&v, &ok)) in pi.iter().zip(legal).enumerate() {
            if !ok {
                continue;
            }
            match best {
                Some((_, bv)) if v <= bv => {}
                _ => best = Some((i, v)),
            }
        }
        if let Some((i, _)) = best {
            out[i] = 1.0;
        }
        return out;
    }

    let inv_t = 1.0 / t;
    let mut sum = 0.0f32;
    for (i, (&v, &ok)) in pi.iter().zip(legal).enumerate() {
        if ok {
            let w = v.max(0.0).powf(inv_t);
            out[i] = w;
            sum += w;
        }
    }
    if !(sum.is_finite() && sum > 0.0) {
        return apply_temperature(pi, legal, 0.0);
    }
    for v in &mut out {
        *v /= sum;
    }
    out
}

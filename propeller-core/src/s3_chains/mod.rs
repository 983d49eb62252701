//! S3 — Node-Chain Builder / Extended-TSP (`spec.md` §4.3).
//!
//! Runs once per function's frozen CFG. Builds one chain per node, attaches
//! mutually-forced edges, then repeatedly merges the highest-gain candidate
//! assembly until none remains, attaches leftover fallthroughs, and finally
//! coalesces the surviving chains by execution density into the function's
//! output layout.

pub mod assembly;
pub mod chain;
pub mod exttsp;

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use bitvec::prelude::*;

use crate::cfg::{ControlFlowGraph, EdgeId, NodeId};
use crate::error::{PropellerError, Result};
use crate::options::PropellerOptions;

use assembly::NodeChainAssembly;
use chain::{ChainId, NodeChain, NodeState};

/// A priority-queue entry. Ordered by gain (max-heap), tie-broken by the
/// lowest delegate node id in each chain — `spec.md` §5's "stable key
/// (lowest delegate-node address, then lowest section index)".
struct PqEntry {
    gain: f64,
    split: ChainId,
    unsplit: ChainId,
    split_gen: u64,
    unsplit_gen: u64,
}

impl PartialEq for PqEntry {
    fn eq(&self, other: &Self) -> bool {
        self.gain == other.gain && self.split == other.split && self.unsplit == other.unsplit
    }
}
impl Eq for PqEntry {}

impl PartialOrd for PqEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PqEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.gain
            .partial_cmp(&other.gain)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.split.0.cmp(&self.split.0))
            .then_with(|| other.unsplit.0.cmp(&self.unsplit.0))
    }
}

/// A function's finished basic-block layout: a permutation of its blocks
/// plus the index at which the cold partition begins (`spec.md` §4.3.5,
/// §6.2 "hot/cold partition boundary"). `hot_cold_boundary == blocks.len()`
/// means every block is hot (no cold suffix to split off).
#[derive(Debug, Clone)]
pub struct FunctionLayout {
    pub blocks: Vec<NodeId>,
    pub hot_cold_boundary: usize,
}

/// Builds the per-function basic-block layout for one CFG.
pub struct ChainBuilder<'a> {
    cfg: &'a ControlFlowGraph,
    options: &'a PropellerOptions,
    node_state: Vec<NodeState>,
    chains: HashMap<ChainId, NodeChain>,
    candidate_chains: HashMap<ChainId, HashSet<ChainId>>,
    assemblies: HashMap<(ChainId, ChainId), NodeChainAssembly>,
    pq: BinaryHeap<PqEntry>,
    mutually_forced_out: HashSet<NodeId>,
}

impl<'a> ChainBuilder<'a> {
    /// Run the full algorithm and return the function's final block layout
    /// as a plain permutation (used by callers that don't need the
    /// hot/cold boundary, and by this module's own scenario tests).
    pub fn run(cfg: &'a ControlFlowGraph, options: &'a PropellerOptions) -> Result<Vec<NodeId>> {
        Self::run_layout(cfg, options).map(|l| l.blocks)
    }

    /// Run the full algorithm and return the function's final layout
    /// together with the hot/cold partition boundary (`spec.md` §6.2).
    pub fn run_layout(cfg: &'a ControlFlowGraph, options: &'a PropellerOptions) -> Result<FunctionLayout> {
        if cfg.nodes.is_empty() {
            return Err(PropellerError::InvariantViolation(format!(
                "{}: cannot chain-build a CFG with no nodes",
                cfg.name
            )));
        }
        let mut builder = ChainBuilder {
            cfg,
            options,
            node_state: Vec::new(),
            chains: HashMap::new(),
            candidate_chains: HashMap::new(),
            assemblies: HashMap::new(),
            pq: BinaryHeap::new(),
            mutually_forced_out: HashSet::new(),
        };
        builder.init_chains();
        builder.init_mutually_forced_edges();
        builder.build_chain_graph();
        builder.seed_queue();
        builder.merge_loop();
        builder.attach_fallthroughs();
        builder.verify_no_empty_chains()?;
        Ok(builder.coalesce())
    }

    fn init_chains(&mut self) {
        self.node_state = vec![NodeState { chain: ChainId(self.cfg.entry), offset: 0 }; self.cfg.nodes.len()];
        for node in &self.cfg.nodes {
            let chain = NodeChain::singleton(node.id, node.size, node.freq);
            self.node_state[node.id.0 as usize] = NodeState { chain: chain.delegate, offset: 0 };
            self.chains.insert(chain.delegate, chain);
        }
    }

    /// Identify mutually-forced edges (`spec.md` §3), break cycles among
    /// them by cutting the edge whose sink has the lowest id (a stand-in
    /// for "lowest address" since node ids increase with original-layout
    /// address, see `cfg.rs`), and attach the survivors immediately.
    fn init_mutually_forced_edges(&mut self) {
        let n = self.cfg.nodes.len();
        let mut out_count = vec![0u32; n];
        let mut in_count = vec![0u32; n];
        for edge in self.cfg.hot_intra_edges() {
            out_count[edge.src.0 as usize] += 1;
            in_count[edge.sink.0 as usize] += 1;
        }

        let mut forced_out: HashMap<NodeId, NodeId> = HashMap::new();
        for edge in self.cfg.hot_intra_edges() {
            if out_count[edge.src.0 as usize] == 1 && in_count[edge.sink.0 as usize] == 1 {
                forced_out.insert(edge.src, edge.sink);
            }
        }

        // Cycle breaking: forced_out has out-degree <= 1 per node, so any
        // cycle is a pure loop. Walk forward from every unvisited node;
        // closing back onto a node still `in_stack` means we found one —
        // same `visited`/`in_stack` bitset DFS idiom as
        // `control_flow::ControlFlowAnalyzer::detect_loops`'s back-edge walk.
        let mut visited: BitVec<u32> = bitvec![u32, Lsb0; 0; n];
        let mut in_stack: BitVec<u32> = bitvec![u32, Lsb0; 0; n];
        let mut cut: HashSet<NodeId> = HashSet::new();
        for start in 0..n {
            let start = NodeId(start as u32);
            if visited[start.0 as usize] {
                continue;
            }
            let mut path = Vec::new();
            let mut cur = start;
            loop {
                if in_stack[cur.0 as usize] {
                    let cycle_start = path.iter().position(|&x| x == cur).unwrap();
                    let cycle = &path[cycle_start..];
                    let mut worst: Option<NodeId> = None; // src whose sink has the lowest id
                    for &c in cycle {
                        if let Some(&sink) = forced_out.get(&c) {
                            let replace = worst.map(|w| sink.0 < forced_out[&w].0).unwrap_or(true);
                            if replace {
                                worst = Some(c);
                            }
                        }
                    }
                    if let Some(src) = worst {
                        cut.insert(src);
                    }
                    break;
                }
                if visited[cur.0 as usize] {
                    break;
                }
                visited.set(cur.0 as usize, true);
                in_stack.set(cur.0 as usize, true);
                path.push(cur);
                match forced_out.get(&cur) {
                    Some(&sink) => cur = sink,
                    None => break,
                }
            }
            for p in path {
                in_stack.set(p.0 as usize, false);
            }
        }
        for src in cut {
            forced_out.remove(&src);
        }

        let forced_sinks: HashSet<NodeId> = forced_out.values().copied().collect();
        for start in 0..n {
            let start = NodeId(start as u32);
            if forced_sinks.contains(&start) {
                continue; // not a chain head
            }
            let mut cur = start;
            while let Some(&sink) = forced_out.get(&cur) {
                self.mutually_forced_out.insert(cur);
                self.merge_adjacent(cur, sink);
                cur = sink;
            }
        }
    }

    /// Merge `sink`'s chain onto the end of `src`'s chain (used only for
    /// mutually-forced attachment, where ordering is fixed: src first).
    fn merge_adjacent(&mut self, src: NodeId, sink: NodeId) {
        let src_chain_id = self.node_state[src.0 as usize].chain;
        let sink_chain_id = self.node_state[sink.0 as usize].chain;
        if src_chain_id == sink_chain_id {
            return;
        }
        let sink_chain = self.chains.remove(&sink_chain_id).unwrap();
        {
            let src_chain = self.chains.get_mut(&src_chain_id).unwrap();
            src_chain.nodes.extend_from_slice(&sink_chain.nodes);
            src_chain.size += sink_chain.size;
            src_chain.freq += sink_chain.freq;
            src_chain.generation += 1;
        }
        self.reindex_chain(src_chain_id);
        self.fold_edges(src_chain_id, sink_chain_id, sink_chain);
    }

    /// Recompute `node_state` offsets for every node currently in `chain_id`.
    fn reindex_chain(&mut self, chain_id: ChainId) {
        let nodes = self.chains[&chain_id].nodes.clone();
        let mut acc = 0u64;
        for n in nodes {
            self.node_state[n.0 as usize] = NodeState { chain: chain_id, offset: acc };
            acc += self.cfg.node(n).size;
        }
    }

    /// Redirect every chain-to-chain edge reference from `removed` onto
    /// `survivor`, dropping self-loops, and drop `removed`'s bookkeeping.
    /// Grounded in `PropellerNodeChainBuilder.cpp`'s `mergeInOutEdges`.
    fn fold_edges(&mut self, survivor: ChainId, removed: ChainId, removed_chain: NodeChain) {
        for (dst, edge_ids) in removed_chain.out_edges {
            if dst == survivor {
                continue;
            }
            self.chains
                .get_mut(&survivor)
                .unwrap()
                .out_edges
                .entry(dst)
                .or_default()
                .extend(edge_ids);
            if let Some(dst_chain) = self.chains.get_mut(&dst) {
                dst_chain.in_edges.insert(survivor);
                dst_chain.in_edges.remove(&removed);
            }
            self.candidate_chains.entry(dst).or_default().insert(survivor);
            if let Some(set) = self.candidate_chains.get_mut(&dst) {
                set.remove(&removed);
            }
            self.candidate_chains.entry(survivor).or_default().insert(dst);
        }

        for src in removed_chain.in_edges {
            if src == survivor {
                self.chains.get_mut(&survivor).unwrap().out_edges.remove(&removed);
                continue;
            }
            if let Some(src_chain) = self.chains.get_mut(&src) {
                if let Some(edge_ids) = src_chain.out_edges.remove(&removed) {
                    src_chain.out_edges.entry(survivor).or_default().extend(edge_ids);
                }
            }
            self.chains.get_mut(&survivor).unwrap().in_edges.insert(src);
            self.candidate_chains.entry(survivor).or_default().insert(src);
            self.candidate_chains.entry(src).or_default().insert(survivor);
            if let Some(set) = self.candidate_chains.get_mut(&src) {
                set.remove(&removed);
            }
        }

        self.candidate_chains.remove(&removed);
        if let Some(set) = self.candidate_chains.get_mut(&survivor) {
            set.remove(&removed);
        }
        self.assemblies.retain(|&(a, b), _| a != removed && b != removed);
    }

    /// Register every nonzero-weight intra-function edge crossing chains as
    /// a chain-to-chain edge, then compute each chain's initial score.
    fn build_chain_graph(&mut self) {
        for edge in self.cfg.hot_intra_edges() {
            let src_chain = self.node_state[edge.src.0 as usize].chain;
            let sink_chain = self.node_state[edge.sink.0 as usize].chain;
            if src_chain == sink_chain {
                continue;
            }
            self.chains
                .get_mut(&src_chain)
                .unwrap()
                .out_edges
                .entry(sink_chain)
                .or_default()
                .push(edge.id);
            self.chains.get_mut(&sink_chain).unwrap().in_edges.insert(src_chain);
            self.candidate_chains.entry(src_chain).or_default().insert(sink_chain);
            self.candidate_chains.entry(sink_chain).or_default().insert(src_chain);
        }

        let ids: Vec<ChainId> = self.chains.keys().copied().collect();
        for id in ids {
            let nodes = self.chains[&id].nodes.clone();
            let score = assembly::compute_chain_score(self.cfg, &nodes, self.options);
            self.chains.get_mut(&id).unwrap().score = score;
        }
    }

    fn seed_queue(&mut self) {
        let mut pairs: Vec<(ChainId, ChainId)> = Vec::new();
        for (&a, set) in &self.candidate_chains {
            for &b in set {
                pairs.push((a, b));
            }
        }
        for (split, unsplit) in pairs {
            self.try_update_assembly(split, unsplit);
        }
    }

    /// Recompute the best assembly for `(split, unsplit)`. Inserts/refreshes
    /// the priority-queue entry if a positive-gain assembly exists, removes
    /// the cached entry otherwise. Returns whether one was kept.
    fn try_update_assembly(&mut self, split: ChainId, unsplit: ChainId) -> bool {
        let Some(split_chain) = self.chains.get(&split) else { return false };
        let Some(unsplit_chain) = self.chains.get(&unsplit) else { return false };
        let found = assembly::best_assembly(
            self.cfg,
            split_chain,
            unsplit_chain,
            &self.mutually_forced_out,
            self.cfg.entry,
            self.options,
        );
        match found {
            Some(a) => {
                let split_gen = split_chain.generation;
                let unsplit_gen = unsplit_chain.generation;
                self.pq.push(PqEntry {
                    gain: a.gain,
                    split,
                    unsplit,
                    split_gen,
                    unsplit_gen,
                });
                self.assemblies.insert((split, unsplit), a);
                true
            }
            None => {
                self.assemblies.remove(&(split, unsplit));
                false
            }
        }
    }

    fn merge_loop(&mut self) {
        while let Some(entry) = self.pq.pop() {
            let (Some(split_chain), Some(unsplit_chain)) =
                (self.chains.get(&entry.split), self.chains.get(&entry.unsplit))
            else {
                continue;
            };
            if split_chain.generation != entry.split_gen || unsplit_chain.generation != entry.unsplit_gen {
                continue; // stale entry; a fresher one was already pushed when these chains last changed
            }
            if self.options.separate_hot_cold && split_chain.is_cold() != unsplit_chain.is_cold() {
                continue;
            }
            let Some(assembly) = self.assemblies.get(&(entry.split, entry.unsplit)).cloned() else {
                continue;
            };
            self.apply_merge(entry.split, entry.unsplit, assembly);
        }
    }

    fn apply_merge(&mut self, split_id: ChainId, unsplit_id: ChainId, assembly: NodeChainAssembly) {
        let removed = self.chains.remove(&unsplit_id).unwrap();
        {
            let survivor = self.chains.get_mut(&split_id).unwrap();
            survivor.nodes = assembly.merged_nodes;
            survivor.size += removed.size;
            survivor.freq += removed.freq;
            survivor.score = assembly.score;
            survivor.generation += 1;
        }
        self.reindex_chain(split_id);
        self.fold_edges(split_id, unsplit_id, removed);

        let neighbors: Vec<ChainId> = self
            .candidate_chains
            .get(&split_id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .collect();
        for other in neighbors {
            if !self.chains.contains_key(&other) {
                continue;
            }
            let a = self.try_update_assembly(other, split_id);
            let b = self.try_update_assembly(split_id, other);
            if !a && !b {
                if let Some(set) = self.candidate_chains.get_mut(&split_id) {
                    set.remove(&other);
                }
                if let Some(set) = self.candidate_chains.get_mut(&other) {
                    set.remove(&split_id);
                }
            }
        }
    }

    /// After the merge loop is dry, opportunistically attach remaining
    /// fallthrough edges: first the original static fallthroughs, then any
    /// other intra edge (`PropellerNodeChainBuilder.cpp`'s
    /// `attachFallThroughs`).
    fn attach_fallthroughs(&mut self) {
        let ft_pairs: Vec<(NodeId, NodeId)> = self
            .cfg
            .nodes
            .iter()
            .filter_map(|n| n.ft_edge.map(|e| (n.id, self.cfg.edge(e).sink)))
            .collect();
        for (src, sink) in ft_pairs {
            self.try_attach(src, sink);
        }

        let intra_pairs: Vec<(NodeId, NodeId)> =
            self.cfg.intra_edges().map(|e| (e.src, e.sink)).collect();
        for (src, sink) in intra_pairs {
            self.try_attach(src, sink);
        }
    }

    fn try_attach(&mut self, src: NodeId, sink: NodeId) -> bool {
        if sink == self.cfg.entry {
            return false;
        }
        let src_chain_id = self.node_state[src.0 as usize].chain;
        let sink_chain_id = self.node_state[sink.0 as usize].chain;
        if src_chain_id == sink_chain_id {
            return false;
        }
        let (src_cold, sink_cold, src_is_tail, sink_is_head) = {
            let src_chain = &self.chains[&src_chain_id];
            let sink_chain = &self.chains[&sink_chain_id];
            (
                src_chain.is_cold(),
                sink_chain.is_cold(),
                src_chain.nodes.last() == Some(&src),
                sink_chain.nodes.first() == Some(&sink),
            )
        };
        if self.options.separate_hot_cold && src_cold != sink_cold {
            return false;
        }
        if !src_is_tail || !sink_is_head {
            return false;
        }

        let removed = self.chains.remove(&sink_chain_id).unwrap();
        let merged_nodes: Vec<NodeId> = self.chains[&src_chain_id]
            .nodes
            .iter()
            .chain(removed.nodes.iter())
            .copied()
            .collect();
        let score = assembly::compute_chain_score(self.cfg, &merged_nodes, self.options);
        {
            let survivor = self.chains.get_mut(&src_chain_id).unwrap();
            survivor.nodes = merged_nodes;
            survivor.size += removed.size;
            survivor.freq += removed.freq;
            survivor.score = score;
            survivor.generation += 1;
        }
        self.reindex_chain(src_chain_id);
        self.fold_edges(src_chain_id, sink_chain_id, removed);
        true
    }

    fn verify_no_empty_chains(&self) -> Result<()> {
        for chain in self.chains.values() {
            if chain.nodes.is_empty() {
                return Err(PropellerError::InvariantViolation(format!(
                    "{}: chain builder produced an empty chain",
                    self.cfg.name
                )));
            }
        }
        Ok(())
    }

    /// Sort surviving chains by decreasing execution density, entry chain
    /// first, cold chains last, and concatenate (`spec.md` §4.3.5).
    /// Grounded in `PropellerNodeChainBuilder.cpp`'s `coalesceChains`.
    fn coalesce(&self) -> FunctionLayout {
        let entry = self.cfg.entry;
        let mut chains: Vec<&NodeChain> = self.chains.values().collect();
        chains.sort_by(|a, b| {
            let a_entry = a.nodes.first() == Some(&entry);
            let b_entry = b.nodes.first() == Some(&entry);
            if a_entry != b_entry {
                return if a_entry { Ordering::Less } else { Ordering::Greater };
            }
            let a_cold = a.is_cold();
            let b_cold = b.is_cold();
            if a_cold != b_cold {
                return if a_cold { Ordering::Greater } else { Ordering::Less };
            }
            match b.exec_density().partial_cmp(&a.exec_density()).unwrap_or(Ordering::Equal) {
                Ordering::Equal => a.delegate.0.cmp(&b.delegate.0),
                other => other,
            }
        });

        // The sort above always places every cold chain after every hot
        // chain, so the boundary is simply the total size of the hot
        // chains' block counts. When `split_funcs` is off the caller emits
        // the whole layout as one partition and ignores the boundary.
        let mut boundary = 0usize;
        for c in &chains {
            if c.is_cold() {
                break;
            }
            boundary += c.nodes.len();
        }

        let blocks: Vec<NodeId> = chains.into_iter().flat_map(|c| c.nodes.iter().copied()).collect();
        FunctionLayout { blocks, hot_cold_boundary: boundary }
    }
}

//! Candidate chain merges (`spec.md` §3 "Node-Chain Assembly", §4.3.3).

use std::collections::HashSet;

use crate::cfg::{ControlFlowGraph, NodeId};
use crate::options::PropellerOptions;

use super::chain::NodeChain;
use super::exttsp::{distance, edge_score};

/// How the three (or two) node slices of an assembly are concatenated.
/// `X1`/`X2` are the prefix/suffix of the split chain around `split_pos`;
/// `Y` is the whole unsplit chain. When `split_pos == 0` there is no real
/// split and only `X1Y`/`YX1` are meaningful (`X1` stands for the whole
/// split chain in that case).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOrder {
    X1Y,
    YX1,
    X2X1Y,
    X1YX2,
    X2YX1,
    YX2X1,
}

/// A candidate merge of a `split_chain` (possibly cut at `split_pos`) with
/// an `unsplit_chain`, fully laid out and scored.
#[derive(Debug, Clone)]
pub struct NodeChainAssembly {
    pub split_pos: usize,
    pub order: MergeOrder,
    /// The merged node sequence, in final order.
    pub merged_nodes: Vec<NodeId>,
    pub score: f64,
    pub gain: f64,
}

fn build_merged_nodes(split: &[NodeId], unsplit: &[NodeId], pos: usize, order: MergeOrder) -> Vec<NodeId> {
    let mut out = Vec::with_capacity(split.len() + unsplit.len());
    match order {
        MergeOrder::X1Y => {
            out.extend_from_slice(split);
            out.extend_from_slice(unsplit);
        }
        MergeOrder::YX1 => {
            out.extend_from_slice(unsplit);
            out.extend_from_slice(split);
        }
        MergeOrder::X2X1Y => {
            out.extend_from_slice(&split[pos..]);
            out.extend_from_slice(&split[..pos]);
            out.extend_from_slice(unsplit);
        }
        MergeOrder::X1YX2 => {
            out.extend_from_slice(&split[..pos]);
            out.extend_from_slice(unsplit);
            out.extend_from_slice(&split[pos..]);
        }
        MergeOrder::X2YX1 => {
            out.extend_from_slice(&split[pos..]);
            out.extend_from_slice(unsplit);
            out.extend_from_slice(&split[..pos]);
        }
        MergeOrder::YX2X1 => {
            out.extend_from_slice(unsplit);
            out.extend_from_slice(&split[pos..]);
            out.extend_from_slice(&split[..pos]);
        }
    }
    out
}

/// Score an arbitrary node ordering by summing every intra-function edge
/// whose endpoints are both within `members` (`spec.md` §4.3.3: "iterating
/// edges incident to nodes in the three slices").
fn score_ordering(
    cfg: &ControlFlowGraph,
    ordering: &[NodeId],
    members: &HashSet<NodeId>,
    options: &PropellerOptions,
) -> f64 {
    let mut offset = std::collections::HashMap::with_capacity(ordering.len());
    let mut running = 0u64;
    for &n in ordering {
        offset.insert(n, running);
        running += cfg.node(n).size;
    }

    let mut score = 0.0;
    for &n in ordering {
        let node = cfg.node(n);
        for &eid in &node.out_intra {
            let edge = cfg.edge(eid);
            if edge.weight == 0 || !members.contains(&edge.sink) {
                continue;
            }
            let src_end = offset[&n] + node.size;
            let sink_start = offset[&edge.sink];
            let d = distance(src_end, sink_start);
            score += edge_score(edge.weight, d, options);
        }
    }
    score
}

/// The ExtTSP score of a chain's current node sequence, counting only
/// edges whose source and sink both fall within it (`spec.md` §4.3.1,
/// "a chain's score is the sum over all intra-chain edges").
pub fn compute_chain_score(cfg: &ControlFlowGraph, nodes: &[NodeId], options: &PropellerOptions) -> f64 {
    let members: HashSet<NodeId> = nodes.iter().copied().collect();
    score_ordering(cfg, nodes, &members, options)
}

/// Enumerate every legal (split position, merge order) combination for the
/// pair and return the one with maximum gain, if positive.
pub fn best_assembly(
    cfg: &ControlFlowGraph,
    split_chain: &NodeChain,
    unsplit_chain: &NodeChain,
    mutually_forced_out: &HashSet<NodeId>,
    entry: NodeId,
    options: &PropellerOptions,
) -> Option<NodeChainAssembly> {
    let baseline = split_chain.score + unsplit_chain.score;
    let members: HashSet<NodeId> = split_chain
        .nodes
        .iter()
        .chain(unsplit_chain.nodes.iter())
        .copied()
        .collect();
    let entry_constrained = options.function_entry_first && members.contains(&entry);

    let mut best: Option<NodeChainAssembly> = None;
    let mut consider = |pos: usize, order: MergeOrder| {
        let merged = build_merged_nodes(&split_chain.nodes, &unsplit_chain.nodes, pos, order);
        if entry_constrained && merged.first() != Some(&entry) {
            return;
        }
        let score = score_ordering(cfg, &merged, &members, options);
        let gain = score - baseline;
        if best.as_ref().map(|b| gain > b.gain).unwrap_or(true) {
            best = Some(NodeChainAssembly {
                split_pos: pos,
                order,
                merged_nodes: merged,
                score,
                gain,
            });
        }
    };

    // No-split: the entire split chain stands in for X1.
    consider(0, MergeOrder::X1Y);
    consider(0, MergeOrder::YX1);

    let do_split = split_chain.size <= options.chain_split_threshold;
    if do_split {
        for pos in 1..split_chain.nodes.len() {
            let prev = split_chain.nodes[pos - 1];
            if mutually_forced_out.contains(&prev) {
                continue; // splitting here would separate a forced edge
            }
            consider(pos, MergeOrder::X2X1Y);
            consider(pos, MergeOrder::X1YX2);
            consider(pos, MergeOrder::X2YX1);
            consider(pos, MergeOrder::YX2X1);
        }
    }

    best.filter(|a| a.gain > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::{ControlFlowGraph, Edge, EdgeKind, Node, NodeFlags};
    use smallvec::SmallVec;

    fn diamond_cfg() -> ControlFlowGraph {
        let mut nodes = Vec::new();
        for i in 0..4u32 {
            nodes.push(Node {
                id: NodeId(i),
                name: format!("b{i}"),
                size: 16,
                address: 0x1000 + (i as u64) * 16,
                flags: NodeFlags::default(),
                freq: 0,
                out_intra: SmallVec::new(),
                in_intra: SmallVec::new(),
                call_outs: SmallVec::new(),
                call_ins: SmallVec::new(),
                ft_edge: None,
            });
        }
        let edges = vec![
            Edge { id: EdgeId(0), src: NodeId(0), sink: NodeId(1), kind: EdgeKind::IntraFallthrough, weight: 1000, sink_function: None },
            Edge { id: EdgeId(1), src: NodeId(1), sink: NodeId(3), kind: EdgeKind::IntraBranch, weight: 1000, sink_function: None },
        ];
        nodes[0].out_intra.push(EdgeId(0));
        nodes[1].in_intra.push(EdgeId(0));
        nodes[1].out_intra.push(EdgeId(1));
        nodes[3].in_intra.push(EdgeId(1));
        ControlFlowGraph { name: "f".into(), entry: NodeId(0), nodes, edges }
    }

    use crate::cfg::EdgeId;

    #[test]
    fn merging_chains_in_fallthrough_order_gains_positive() {
        let cfg = diamond_cfg();
        let options = PropellerOptions::default();
        let a = NodeChain::singleton(NodeId(0), 16, 0);
        let b = NodeChain::singleton(NodeId(1), 16, 0);
        let forced = HashSet::new();
        let assembly = best_assembly(&cfg, &a, &b, &forced, NodeId(0), &options).unwrap();
        assert_eq!(assembly.merged_nodes, vec![NodeId(0), NodeId(1)]);
        assert!(assembly.gain > 0.0);
    }

    #[test]
    fn reversed_order_scores_lower_than_fallthrough_order() {
        let cfg = diamond_cfg();
        let options = PropellerOptions::default();
        let a = NodeChain::singleton(NodeId(0), 16, 0);
        let b = NodeChain::singleton(NodeId(1), 16, 0);
        let forced = HashSet::new();
        let best = best_assembly(&cfg, &a, &b, &forced, NodeId(0), &options).unwrap();
        // The fallthrough order (X1Y = [a, b]) must win over (YX1 = [b, a]).
        assert_eq!(best.order, MergeOrder::X1Y);
    }
}

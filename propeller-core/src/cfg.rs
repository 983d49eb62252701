//! Control-Flow Graph data model.
//!
//! The CFG owns its nodes and edges in flat arena storage; edges refer to
//! nodes by index (`NodeId`), not by owning pointer, so cycles in the
//! control-flow graph never become reference cycles in the host language.
//! A `ControlFlowGraph` is treated as value data: it is built once in S1,
//! mutated in place (edge weights, node frequencies) by S2, and then frozen
//! — nothing after S2 ever changes its node/edge set, only the bookkeeping
//! the chain builder keeps alongside it.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// A reference to an edge owned by another function's CFG, used for the
/// callee side of an inter-function edge (the edge itself lives once, in
/// the caller's arena).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignEdgeRef {
    pub function: u32,
    pub edge: EdgeId,
}

/// Stable identity of a basic block within its function (arena index into
/// `ControlFlowGraph::nodes`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Arena index into `ControlFlowGraph::edges`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub u32);

/// Edge classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EdgeKind {
    /// Source and sink are consecutive in the original layout.
    IntraFallthrough = 0,
    /// Any other intra-function control transfer present in the static CFG.
    IntraBranch = 1,
    /// Intra-function edge inferred from the profile with no static counterpart.
    IntraDynamic = 2,
    /// Inter-function edge originating at a call site.
    Call = 3,
    /// Inter-function edge originating at a return.
    Return = 4,
}

impl EdgeKind {
    pub fn is_intra(self) -> bool {
        matches!(
            self,
            EdgeKind::IntraFallthrough | EdgeKind::IntraBranch | EdgeKind::IntraDynamic
        )
    }

    pub fn is_inter(self) -> bool {
        !self.is_intra()
    }
}

/// Per-block metadata bits carried from the address map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFlags {
    pub is_return: bool,
    pub is_landing_pad: bool,
    pub is_thunk: bool,
}

/// A basic block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub size: u64,
    pub address: u64,
    pub flags: NodeFlags,
    /// Profiled execution frequency. Populated by S2; zero means cold.
    pub freq: u64,
    /// Outgoing intra-function edges.
    pub out_intra: SmallVec<[EdgeId; 2]>,
    /// Incoming intra-function edges.
    pub in_intra: SmallVec<[EdgeId; 2]>,
    /// Outgoing call edges (this block ends in a call). Local to this CFG's
    /// edge arena.
    pub call_outs: SmallVec<[EdgeId; 2]>,
    /// Incoming call/return edges from other functions. These reference a
    /// *foreign* CFG's edge arena, since an inter-function edge is stored
    /// once, on the caller's side.
    pub call_ins: SmallVec<[ForeignEdgeRef; 2]>,
    /// The static fallthrough successor, if any (mirrors the original
    /// layout's `FTEdge`, always also present in `out_intra`).
    pub ft_edge: Option<EdgeId>,
}

impl Node {
    pub fn is_cold(&self) -> bool {
        self.freq == 0
    }
}

/// A directed CFG edge (`spec.md` §3 "CFG Edge").
///
/// `sink` is always an index into the *source*'s own CFG node arena for
/// intra-function edges. For inter-function edges (`Call`/`Return`),
/// `sink` indexes the node arena of `sink_function` instead — the edge is
/// stored once, in the source's arena, per the "every edge appears exactly
/// once" invariant (`spec.md` §3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub src: NodeId,
    pub sink: NodeId,
    pub kind: EdgeKind,
    pub weight: u64,
    /// `Some(function)` for inter-function edges; `None` for intra-function
    /// edges, where sink shares the source's CFG.
    pub sink_function: Option<u32>,
}

/// A function's control-flow graph.
///
/// Nodes are stored in original-layout order; `nodes[i].id == NodeId(i as u32)`
/// is an invariant maintained by `CfgBuilder`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlFlowGraph {
    pub name: String,
    pub entry: NodeId,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl ControlFlowGraph {
    pub fn entry_node(&self) -> &Node {
        &self.nodes[self.entry.0 as usize]
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id.0 as usize]
    }

    /// Total size in bytes of the function (sum of all block sizes).
    pub fn total_size(&self) -> u64 {
        self.nodes.iter().map(|n| n.size).sum()
    }

    /// Intra-function edges with nonzero weight (candidates for chain-to-chain
    /// linkage in S3; see `spec.md` §4.3.2 step 4).
    pub fn hot_intra_edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges
            .iter()
            .filter(|e| e.kind.is_intra() && e.weight > 0)
    }

    pub fn intra_edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(|e| e.kind.is_intra())
    }

    pub fn inter_edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(|e| e.kind.is_inter())
    }

    /// Mutable access to an edge's weight; used only by S2.
    pub fn add_weight(&mut self, id: EdgeId, delta: u64) {
        self.edges[id.0 as usize].weight += delta;
    }

    pub fn add_freq(&mut self, id: NodeId, delta: u64) {
        self.nodes[id.0 as usize].freq += delta;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_cfg() -> ControlFlowGraph {
        let nodes = vec![
            Node {
                id: NodeId(0),
                name: "B0".into(),
                size: 16,
                address: 0x1000,
                flags: NodeFlags::default(),
                freq: 0,
                out_intra: SmallVec::from_slice(&[EdgeId(0)]),
                in_intra: SmallVec::new(),
                call_outs: SmallVec::new(),
                call_ins: SmallVec::new(),
                ft_edge: Some(EdgeId(0)),
            },
            Node {
                id: NodeId(1),
                name: "B1".into(),
                size: 16,
                address: 0x1010,
                flags: NodeFlags::default(),
                freq: 0,
                out_intra: SmallVec::new(),
                in_intra: SmallVec::from_slice(&[EdgeId(0)]),
                call_outs: SmallVec::new(),
                call_ins: SmallVec::new(),
                ft_edge: None,
            },
        ];
        let edges = vec![Edge {
            id: EdgeId(0),
            src: NodeId(0),
            sink: NodeId(1),
            kind: EdgeKind::IntraFallthrough,
            weight: 0,
            sink_function: None,
        }];
        ControlFlowGraph {
            name: "f".into(),
            entry: NodeId(0),
            nodes,
            edges,
        }
    }

    #[test]
    fn entry_node_is_block_zero() {
        let cfg = tiny_cfg();
        assert_eq!(cfg.entry_node().id, NodeId(0));
    }

    #[test]
    fn total_size_sums_blocks() {
        let cfg = tiny_cfg();
        assert_eq!(cfg.total_size(), 32);
    }

    #[test]
    fn add_weight_and_freq_mutate_in_place() {
        let mut cfg = tiny_cfg();
        cfg.add_weight(EdgeId(0), 5);
        cfg.add_freq(NodeId(1), 5);
        assert_eq!(cfg.edge(EdgeId(0)).weight, 5);
        assert_eq!(cfg.node(NodeId(1)).freq, 5);
    }

    #[test]
    fn hot_intra_edges_filters_zero_weight() {
        let mut cfg = tiny_cfg();
        assert_eq!(cfg.hot_intra_edges().count(), 0);
        cfg.add_weight(EdgeId(0), 1);
        assert_eq!(cfg.hot_intra_edges().count(), 1);
    }
}

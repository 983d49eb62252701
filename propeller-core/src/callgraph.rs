//! Global call graph over functions (`spec.md` §4.4, step 0).
//!
//! One point per function, one link per unordered pair of functions with at
//! least one inter-function edge between them, weight the sum of every
//! `Call`/`Return` edge weight observed in either direction. Grounded in
//! `original_source/lld/ELF/PLOFuncOrdering.cpp`'s `PLOFuncOrdering`
//! constructor: `FindOrCreatePoint` keyed by CFG identity, `FindOrCreateLink`
//! deduped by the unordered pair of function ids so that `A->B` and `B->A`
//! edges collapse onto the same link.
//!
//! A link also remembers which side is the dominant caller: a `Call` edge's
//! source function is the caller, while a `Return` edge's source function is
//! the callee returning to its caller (the edge's `sink_function`). Summing
//! both directions separately and keeping the heavier one as `caller` is
//! what lets S4 honor `spec.md` §4.4's "caller prefix before callee" merge
//! order without re-deriving direction from scratch at every cluster merge.

use std::collections::{HashMap, HashSet};

use crate::cfg::EdgeKind;
use crate::program::{FunctionId, Program};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CgPointId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CgLinkId(pub u32);

/// A function as a node in the call graph.
#[derive(Debug, Clone)]
pub struct CgPoint {
    pub id: CgPointId,
    pub function: FunctionId,
}

/// A weighted call-graph edge between two functions.
///
/// `a`/`b` are the two endpoints in no particular order (kept for existing
/// adjacency queries); `caller`/`callee` name the direction the combined
/// `caller_weight`/`callee_weight` favors, ties going to the lower point id.
#[derive(Debug, Clone)]
pub struct CgLink {
    pub id: CgLinkId,
    pub a: CgPointId,
    pub b: CgPointId,
    /// Total weight in either direction; this is what the greedy CCC merge
    /// in `s4_clustering` picks the heaviest link by.
    pub weight: u64,
    pub caller: CgPointId,
    pub callee: CgPointId,
    /// Weight attributable to `caller` calling/returning-to `callee`.
    pub caller_weight: u64,
    /// Weight attributable to the opposite direction.
    pub callee_weight: u64,
}

/// The program's global call graph, built once after S2.
#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    pub points: Vec<CgPoint>,
    pub links: Vec<CgLink>,
    point_by_function: HashMap<u32, CgPointId>,
}

impl CallGraph {
    pub fn build(program: &Program) -> Self {
        let mut cg = CallGraph::default();
        for (i, _) in program.cfgs.iter().enumerate() {
            let fid = FunctionId(i as u32);
            cg.find_or_create_point(fid);
        }

        // Directed call weight keyed by (caller function, callee function).
        // A `Call` edge's source is the caller; a `Return` edge's source is
        // the callee returning to its `sink_function`, the caller.
        let mut directed: HashMap<(u32, u32), u64> = HashMap::new();
        for (i, cfg) in program.cfgs.iter().enumerate() {
            let src_fn = FunctionId(i as u32);
            for edge in cfg.inter_edges() {
                let Some(sink_fn_idx) = edge.sink_function else {
                    continue;
                };
                let sink_fn = FunctionId(sink_fn_idx);
                if sink_fn == src_fn {
                    continue;
                }
                let (caller, callee) = match edge.kind {
                    EdgeKind::Call => (src_fn, sink_fn),
                    EdgeKind::Return => (sink_fn, src_fn),
                    _ => continue,
                };
                *directed.entry((caller.0, callee.0)).or_insert(0) += edge.weight;
            }
        }

        let mut pairs: HashSet<(u32, u32)> = HashSet::new();
        for &(x, y) in directed.keys() {
            pairs.insert(if x <= y { (x, y) } else { (y, x) });
        }

        let mut ordered_pairs: Vec<(u32, u32)> = pairs.into_iter().collect();
        ordered_pairs.sort_unstable();
        for (lo, hi) in ordered_pairs {
            let lo_calls_hi = *directed.get(&(lo, hi)).unwrap_or(&0);
            let hi_calls_lo = *directed.get(&(hi, lo)).unwrap_or(&0);
            let weight = lo_calls_hi + hi_calls_lo;
            if weight == 0 {
                continue;
            }
            let p_lo = *cg.point_by_function.get(&lo).unwrap();
            let p_hi = *cg.point_by_function.get(&hi).unwrap();
            // Tie goes to the lower function id, matching the deterministic
            // tie-breaks used elsewhere in this crate.
            let (caller, callee, caller_weight, callee_weight) = if lo_calls_hi >= hi_calls_lo {
                (p_lo, p_hi, lo_calls_hi, hi_calls_lo)
            } else {
                (p_hi, p_lo, hi_calls_lo, lo_calls_hi)
            };
            let id = CgLinkId(cg.links.len() as u32);
            cg.links.push(CgLink {
                id,
                a: p_lo,
                b: p_hi,
                weight,
                caller,
                callee,
                caller_weight,
                callee_weight,
            });
        }

        cg
    }

    fn find_or_create_point(&mut self, function: FunctionId) -> CgPointId {
        if let Some(&id) = self.point_by_function.get(&function.0) {
            return id;
        }
        let id = CgPointId(self.points.len() as u32);
        self.points.push(CgPoint { id, function });
        self.point_by_function.insert(function.0, id);
        id
    }

    pub fn point(&self, id: CgPointId) -> &CgPoint {
        &self.points[id.0 as usize]
    }
}

//! S4 — Chain Clustering / global function order (`spec.md` §4.4).
//!
//! Call-Chain-Clustering: greedily merge the heaviest remaining call-graph
//! link's two endpoints into one cluster, fold parallel edges into the
//! survivor, and repeat until no positive-weight link remains. Each merge
//! orders the survivor's functions caller-prefix-before-callee per §4.4,
//! using the directional weight [`crate::callgraph::CgLink`] carries; a tie
//! keeps the lower cluster id first. The final global order concatenates
//! clusters by descending execution density, cold clusters last. Grounded in
//! `PLOFuncOrdering.cpp`'s point/link construction (reused via
//! [`crate::callgraph::CallGraph`]); the greedy merge loop itself is
//! `spec.md`'s own description, since the original's CCC pass lives outside
//! the excerpted source.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::callgraph::CallGraph;
use crate::program::{FunctionId, Program};
use crate::stats::Stats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterId(pub u32);

#[derive(Debug, Clone)]
struct Cluster {
    functions: Vec<FunctionId>,
    size: u64,
    freq: u64,
}

/// Directional link weight between two clusters, keyed by `key(a, b)`.
///
/// `lo_caller`/`hi_caller` are the weight attributable to the lower/higher
/// cluster id (by the key's own ordering) acting as the caller side; their
/// sum is the link's total weight, the quantity the greedy step maximizes.
#[derive(Debug, Clone, Copy, Default)]
struct LinkWeight {
    lo_caller: u64,
    hi_caller: u64,
}

impl LinkWeight {
    fn total(&self) -> u64 {
        self.lo_caller + self.hi_caller
    }
}

impl Cluster {
    fn exec_density(&self) -> f64 {
        if self.size == 0 {
            0.0
        } else {
            self.freq as f64 / self.size as f64
        }
    }

    fn is_cold(&self) -> bool {
        self.freq == 0
    }
}

fn key(a: ClusterId, b: ClusterId) -> (u32, u32) {
    if a.0 <= b.0 {
        (a.0, b.0)
    } else {
        (b.0, a.0)
    }
}

/// Greedily clusters functions by call-graph weight and emits the global
/// function order that S5 writes as the symbol-order profile.
pub struct ChainClustering;

impl ChainClustering {
    pub fn run(program: &Program, cg: &CallGraph, stats: &mut Stats) -> Vec<FunctionId> {
        let n = program.len();
        let mut clusters: HashMap<ClusterId, Cluster> = HashMap::with_capacity(n);
        let mut owner: HashMap<u32, ClusterId> = HashMap::with_capacity(n);

        for i in 0..n {
            let fid = FunctionId(i as u32);
            let cfg = program.cfg(fid);
            let size = cfg.total_size();
            let freq: u64 = cfg.nodes.iter().map(|node| node.freq).sum();
            let id = ClusterId(i as u32);
            clusters.insert(
                id,
                Cluster {
                    functions: vec![fid],
                    size,
                    freq,
                },
            );
            owner.insert(i as u32, id);
        }

        let mut links: BTreeMap<(u32, u32), LinkWeight> = BTreeMap::new();
        for link in &cg.links {
            let fa = cg.point(link.a).function;
            let fb = cg.point(link.b).function;
            let (Some(&ca), Some(&cb)) = (owner.get(&fa.0), owner.get(&fb.0)) else {
                stats.unresolved_call_edges += 1;
                continue;
            };
            if ca == cb {
                continue;
            }
            let k = key(ca, cb);
            // `link.caller`/`link.callee` name one of `link.a`/`link.b`;
            // translate that into which side of the normalized key (lo, hi)
            // is the caller.
            let caller_is_a = link.caller == link.a;
            let (a_weight, b_weight) = if caller_is_a {
                (link.caller_weight, link.callee_weight)
            } else {
                (link.callee_weight, link.caller_weight)
            };
            let (lo_contrib, hi_contrib) = if k.0 == ca.0 { (a_weight, b_weight) } else { (b_weight, a_weight) };
            let entry = links.entry(k).or_default();
            entry.lo_caller += lo_contrib;
            entry.hi_caller += hi_contrib;
        }

        let mut next_id = n as u32;
        loop {
            let best = links
                .iter()
                .filter(|&(_, w)| w.total() > 0)
                .max_by(|a, b| a.1.total().cmp(&b.1.total()).then_with(|| b.0.cmp(a.0)))
                .map(|(&k, _)| k);
            let Some((a_raw, b_raw)) = best else { break };
            let best_weight = links.remove(&(a_raw, b_raw)).unwrap();
            let a = ClusterId(a_raw);
            let b = ClusterId(b_raw);

            let ca = clusters.remove(&a).unwrap();
            let cb = clusters.remove(&b).unwrap();
            let merged_id = ClusterId(next_id);
            next_id += 1;

            // §4.4: caller prefix before callee. `a_raw` is always the lower
            // id by `key`'s construction, so `best_weight.lo_caller` is the
            // weight of `a` calling `b`; a tie keeps `a` first.
            let mut functions = if best_weight.lo_caller >= best_weight.hi_caller {
                let mut f = ca.functions;
                f.extend(cb.functions);
                f
            } else {
                let mut f = cb.functions;
                f.extend(ca.functions);
                f
            };
            functions.shrink_to_fit();
            let merged = Cluster {
                functions,
                size: ca.size + cb.size,
                freq: ca.freq + cb.freq,
            };

            let touching: Vec<(u32, u32)> = links
                .keys()
                .copied()
                .filter(|&(x, y)| x == a.0 || x == b.0 || y == a.0 || y == b.0)
                .collect();
            for k in touching {
                let w = links.remove(&k).unwrap();
                let k_inside_is_lo = k.0 == a.0 || k.0 == b.0;
                let other = if k_inside_is_lo { k.1 } else { k.0 };
                if other == a.0 || other == b.0 {
                    continue; // self-loop created by merging a and b together
                }
                // `w.lo_caller`/`w.hi_caller` name the `key.0`/`key.1` side;
                // pick out which names "inside" (the cluster being merged
                // away) vs. "other" so the contribution lands on the right
                // side of the new `(other, merged_id)` key, which always
                // orders `other` first since `merged_id` is a freshly
                // allocated, strictly larger id.
                let (inside_caller_over_other, other_caller_over_inside) =
                    if k_inside_is_lo { (w.lo_caller, w.hi_caller) } else { (w.hi_caller, w.lo_caller) };
                let new_key = key(merged_id, ClusterId(other));
                debug_assert_eq!(new_key.0, other);
                let entry = links.entry(new_key).or_default();
                entry.lo_caller += other_caller_over_inside;
                entry.hi_caller += inside_caller_over_other;
            }

            clusters.insert(merged_id, merged);
        }

        let mut ordered: Vec<(ClusterId, Cluster)> = clusters.into_iter().collect();
        ordered.sort_by(|(id_a, a), (id_b, b)| {
            let a_cold = a.is_cold();
            let b_cold = b.is_cold();
            if a_cold != b_cold {
                return if a_cold { Ordering::Greater } else { Ordering::Less };
            }
            b.exec_density()
                .partial_cmp(&a.exec_density())
                .unwrap_or(Ordering::Equal)
                .then_with(|| id_a.0.cmp(&id_b.0))
        });

        ordered.into_iter().flat_map(|(_, c)| c.functions).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::NodeFlags;
    use crate::s1_builder::{BlockRecord, FunctionRecord, ProgramCfgBuilder, Terminator};
    use crate::s2_aggregator::{BranchAggregator, BranchSample, LbrRecord};

    fn leaf(name: &str, entry: u64) -> FunctionRecord {
        FunctionRecord {
            name: name.into(),
            entry_address: entry,
            blocks: vec![BlockRecord {
                offset: 0,
                size: 16,
                flags: NodeFlags::default(),
                terminator: Terminator::Return,
                calls: vec![],
            }],
        }
    }

    #[test]
    fn two_tightly_coupled_functions_cluster_together_first() {
        let funcs = vec![
            FunctionRecord {
                name: "hub".into(),
                entry_address: 0x1000,
                blocks: vec![BlockRecord {
                    offset: 0,
                    size: 16,
                    flags: NodeFlags::default(),
                    terminator: Terminator::Return,
                    calls: vec![0x2000, 0x3000],
                }],
            },
            leaf("heavy", 0x2000),
            leaf("light", 0x3000),
        ];
        let mut program = ProgramCfgBuilder::build(&funcs).unwrap();
        let mut agg = BranchAggregator::new();
        let mut samples = vec![BranchSample { from: 0x1000, to: 0x2000 }; 50];
        samples.push(BranchSample { from: 0x1000, to: 0x3000 });
        agg.process(&mut program, &[LbrRecord { samples }]);

        let cg = CallGraph::build(&program);
        let mut stats = Stats::default();
        let order = ChainClustering::run(&program, &cg, &mut stats);
        assert_eq!(order.len(), 3);
        let hub = program.find_by_name("hub").unwrap();
        let heavy = program.find_by_name("heavy").unwrap();
        let pos = |f| order.iter().position(|&x| x == f).unwrap();
        assert!((pos(hub) as i64 - pos(heavy) as i64).abs() == 1);
    }

    #[test]
    fn merge_order_places_caller_before_callee_through_multiple_merges() {
        // hub -(100)-> mid -(50)-> leaf, none of the call sites
        // return-terminated, so every inter edge here classifies as `Call`
        // and the caller is unambiguous at each link.
        fn caller(name: &str, entry: u64, target: u64) -> FunctionRecord {
            FunctionRecord {
                name: name.into(),
                entry_address: entry,
                blocks: vec![
                    BlockRecord {
                        offset: 0,
                        size: 8,
                        flags: NodeFlags::default(),
                        terminator: Terminator::Fallthrough,
                        calls: vec![target],
                    },
                    BlockRecord {
                        offset: 8,
                        size: 8,
                        flags: NodeFlags::default(),
                        terminator: Terminator::Return,
                        calls: vec![],
                    },
                ],
            }
        }

        let funcs = vec![
            caller("hub", 0x1000, 0x2000),
            caller("mid", 0x2000, 0x3000),
            leaf("leaf", 0x3000),
        ];
        let mut program = ProgramCfgBuilder::build(&funcs).unwrap();
        let mut agg = BranchAggregator::new();
        agg.process(
            &mut program,
            &[
                LbrRecord { samples: vec![BranchSample { from: 0x1000, to: 0x2000 }; 100] },
                LbrRecord { samples: vec![BranchSample { from: 0x2000, to: 0x3000 }; 50] },
            ],
        );

        let cg = CallGraph::build(&program);
        let mut stats = Stats::default();
        let order = ChainClustering::run(&program, &cg, &mut stats);

        let hub = program.find_by_name("hub").unwrap();
        let mid = program.find_by_name("mid").unwrap();
        let leaf_fn = program.find_by_name("leaf").unwrap();
        assert_eq!(order, vec![hub, mid, leaf_fn]);
    }

    #[test]
    fn isolated_functions_still_get_a_total_order() {
        let funcs = vec![leaf("a", 0x1000), leaf("b", 0x2000), leaf("c", 0x3000)];
        let program = ProgramCfgBuilder::build(&funcs).unwrap();
        let cg = CallGraph::build(&program);
        let mut stats = Stats::default();
        let order = ChainClustering::run(&program, &cg, &mut stats);
        assert_eq!(order.len(), 3);
    }
}

//! End-to-end orchestration of S1–S5 (`spec.md` §2's pipeline table).
//!
//! This is the one place that wires every stage together; `propeller-cli`
//! calls only this module. Each stage consumes the frozen output of the
//! previous one, exactly as `spec.md` §2 specifies: S1 and S2 run once
//! over the whole program, S3 runs per function across a worker pool
//! (`spec.md` §5, `SPEC_FULL.md` §5a — serialized instead when
//! `options.reorder_ip` is set, per `spec.md` §9's parallelism note), and
//! S4/S5 run once more, globally, at the end.

use crate::callgraph::CallGraph;
use crate::cfg::ControlFlowGraph;
use crate::error::{PropellerError, Result};
use crate::options::PropellerOptions;
use crate::program::{FunctionId, Program};
use crate::s1_builder::{FunctionRecord, ProgramCfgBuilder};
use crate::s2_aggregator::{BranchAggregator, LbrRecord};
use crate::s3_chains::{ChainBuilder, FunctionLayout};
use crate::s4_clustering::ChainClustering;
use crate::s5_emitter::{emit_cluster_profile, emit_symbol_order};
use crate::stats::Stats;
use crate::worker_pool;

/// Everything the collaborator (the CLI) needs to write the two output
/// files and report on the run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub cluster_profile: String,
    pub symbol_order_profile: String,
    pub stats: Stats,
}

/// Run the full pipeline. `workers` overrides the S3 worker-pool size;
/// `None` uses [`worker_pool::default_worker_count`]. `options.reorder_ip`
/// forces single-threaded S3 execution (`spec.md` §9: cross-function
/// merges under `reorder_ip` need a shared chain map this crate does not
/// implement locking for, so it falls back to serial per-function runs
/// with no actual cross-function merging — equivalent to `reorder_ip`
/// being off, but still serial as the design note requires).
pub fn run_pipeline(
    functions: &[FunctionRecord],
    records: &[LbrRecord],
    options: &PropellerOptions,
    workers: Option<usize>,
) -> Result<PipelineOutput> {
    let mut program = ProgramCfgBuilder::build(functions)?;

    let mut stats = BranchAggregator::new().process(&mut program, records);

    let layouts = build_layouts(&program, options, workers)?;

    let cg = CallGraph::build(&program);
    let order = ChainClustering::run(&program, &cg, &mut stats);

    let cluster_inputs: Vec<(&ControlFlowGraph, &FunctionLayout)> = (0..program.len())
        .map(|i| (program.cfg(FunctionId(i as u32)), &layouts[i]))
        .collect();
    let cluster_profile = emit_cluster_profile(&cluster_inputs, options.split_funcs);

    let names: Vec<&str> = order.iter().map(|&fid| program.cfg(fid).name.as_str()).collect();
    let symbol_order_profile = emit_symbol_order(&names);

    Ok(PipelineOutput { cluster_profile, symbol_order_profile, stats })
}

/// Run S3 across every function's CFG, in parallel unless `reorder_ip` is
/// set, and return each function's layout in `Program` index order.
fn build_layouts(
    program: &Program,
    options: &PropellerOptions,
    workers: Option<usize>,
) -> Result<Vec<FunctionLayout>> {
    let worker_count = if options.reorder_ip {
        1
    } else {
        workers.unwrap_or_else(worker_pool::default_worker_count)
    };

    let cfgs: Vec<&ControlFlowGraph> = program.cfgs.iter().collect();
    let results: Vec<Result<FunctionLayout>> =
        worker_pool::run_indexed(cfgs.len(), worker_count, |i| ChainBuilder::run_layout(cfgs[i], options));

    let mut layouts = Vec::with_capacity(results.len());
    for r in results {
        layouts.push(r?);
    }
    Ok(layouts)
}

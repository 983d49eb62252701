//! propeller-core: the Propeller layout engine.
//!
//! Five stages, run in order, each consuming the frozen output of the last
//! (`spec.md` §2): [`s1_builder`] materializes per-function CFGs from a
//! basic-block address map, [`s2_aggregator`] streams LBR branch samples
//! onto those CFGs, [`s3_chains`] runs Extended-TSP chain building per
//! function, [`callgraph`]/[`s4_clustering`] run Call-Chain-Clustering
//! globally, and [`s5_emitter`] serializes both results to the two text
//! profiles the linker consumes.
//!
//! The core accepts already-parsed input structs (`s1_builder::FunctionRecord`,
//! `s2_aggregator::LbrRecord`) and produces already-structured output
//! (`s3_chains::FunctionLayout`, a function order `Vec`); the narrow text
//! readers in [`formats`] are a convenience adapter, not a general
//! DWARF/perf-event decoder (`spec.md` §1's scope boundary).

pub mod callgraph;
pub mod cfg;
pub mod error;
pub mod formats;
pub mod options;
pub mod pipeline;
pub mod program;
pub mod s1_builder;
pub mod s2_aggregator;
pub mod s3_chains;
pub mod s4_clustering;
pub mod s5_emitter;
pub mod stats;
pub mod worker_pool;

pub use cfg::{ControlFlowGraph, EdgeKind, NodeId};
pub use error::{PropellerError, Result};
pub use options::PropellerOptions;
pub use pipeline::{run_pipeline, PipelineOutput};
pub use program::{FunctionId, Program};
pub use stats::Stats;

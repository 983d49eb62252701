//! Statistics
//!
//! Discard-and-count error handling (`spec.md` §7.2/§7.4) never aborts the
//! pipeline; instead every dropped record or unresolved symbol increments a
//! counter here. The collaborator (CLI) logs and optionally serializes this
//! struct; the core never treats a nonzero counter as fatal.

use serde::{Deserialize, Serialize};

/// Running counters exposed by S2 (branch aggregation) and S4 (clustering).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Branch samples resolved to a single function (intra-function transition).
    pub intra_function_mapped: u64,
    /// Branch samples resolved across two functions (call/return transition).
    pub inter_function_mapped: u64,
    /// Fallthrough paths within one function that could not be walked
    /// (no straight-line path existed between consecutive samples).
    pub unmarked_intra: u64,
    /// Fallthrough paths across functions that could not be walked.
    pub unmarked_inter: u64,
    /// Profile records dropped entirely: malformed, addresses outside any
    /// known function, or crossing loadable modules.
    pub dropped_records: u64,
    /// Call-graph edges dropped because a symbol could not be resolved.
    pub unresolved_call_edges: u64,
}

impl Stats {
    pub fn merge(&mut self, other: &Stats) {
        self.intra_function_mapped += other.intra_function_mapped;
        self.inter_function_mapped += other.inter_function_mapped;
        self.unmarked_intra += other.unmarked_intra;
        self.unmarked_inter += other.unmarked_inter;
        self.dropped_records += other.dropped_records;
        self.unresolved_call_edges += other.unresolved_call_edges;
    }
}

//! Tunable Options
//!
//! `PropellerOptions` backs the tunables table in `spec.md` §6.4. It is
//! constructed once by the collaborator (the CLI) and passed by reference
//! into every pipeline stage; the core itself holds no global state (see
//! the "Global state" design note in `spec.md` §9).

use serde::{Deserialize, Serialize};

/// Immutable configuration shared by every stage of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropellerOptions {
    /// Reject merges that would combine a hot chain with a cold chain.
    pub separate_hot_cold: bool,
    /// Keep the function's entry block at offset 0 of its chain.
    pub function_entry_first: bool,
    /// `F_w`: weight of a fallthrough edge.
    pub fallthrough_weight: f64,
    /// `FW_w`: weight of a short forward jump.
    pub forward_weight: f64,
    /// `BW_w`: weight of a short backward jump.
    pub backward_weight: f64,
    /// `FW_d`: maximum distance (bytes) of a short forward jump.
    pub forward_distance: u64,
    /// `BW_d`: maximum distance (bytes) of a short backward jump.
    pub backward_distance: u64,
    /// Maximum chain size (bytes) eligible for mid-split.
    pub chain_split_threshold: u64,
    /// Extend chain merging across function boundaries.
    pub reorder_ip: bool,
    /// Emit a separate cold partition per function.
    pub split_funcs: bool,
}

impl Default for PropellerOptions {
    fn default() -> Self {
        Self {
            separate_hot_cold: true,
            function_entry_first: true,
            fallthrough_weight: 1.0,
            forward_weight: 0.1,
            backward_weight: 0.1,
            forward_distance: 1024,
            backward_distance: 640,
            chain_split_threshold: 128,
            reorder_ip: false,
            split_funcs: true,
        }
    }
}

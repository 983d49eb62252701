//! S5 — Profile Emitter (`spec.md` §4.5).
//!
//! Purely a serializer: by the time this stage runs, S3 has already
//! decided every function's block order and S4 has already decided the
//! global function order, so nothing here makes a layout decision. Two
//! text artifacts are produced for the linker collaborator, grounded in
//! `original_source/lld/tools/layout/layout.cpp`'s `--layout-dump` (one
//! symbol name per line) for the symbol-order side; the cluster profile's
//! concrete framing (`!name` / `!!blocks`) is this crate's own choice since
//! the excerpted source stops short of dumping per-function cluster text
//! (see `DESIGN.md`'s Open Question on this).

use std::fmt::Write as _;

use crate::cfg::ControlFlowGraph;
use crate::s3_chains::FunctionLayout;

/// Serialize the cluster profile: for each hot function (one with at
/// least one nonzero-frequency block), a `!name` header line followed by
/// a `!!` line listing block names in layout order, hot and cold blocks
/// separated by `|` when the layout has a nontrivial cold partition and
/// `split_funcs` asks for a separate cold partition (`spec.md` §6.4 /
/// `SPEC_FULL.md` §6b). When `split_funcs` is off the boundary is never
/// drawn: S3 has already placed every cold block after every hot one, so
/// the blocks still print in that order, just without the `| ` marker.
pub fn emit_cluster_profile(functions: &[(&ControlFlowGraph, &FunctionLayout)], split_funcs: bool) -> String {
    let mut out = String::new();
    for (cfg, layout) in functions {
        let is_hot = cfg.nodes.iter().any(|n| n.freq > 0);
        if !is_hot {
            continue;
        }
        let _ = writeln!(out, "!{}", cfg.name);
        out.push_str("!!");
        for (i, &node_id) in layout.blocks.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            if split_funcs && i == layout.hot_cold_boundary && i != 0 && i != layout.blocks.len() {
                out.push_str("| ");
            }
            out.push_str(&cfg.node(node_id).name);
        }
        out.push('\n');
    }
    out
}

/// Serialize the symbol-order profile: one function name per line, in
/// S4's global order (`original_source/lld/tools/layout/layout.cpp`'s
/// `--layout-dump`).
pub fn emit_symbol_order(function_names: &[&str]) -> String {
    let mut out = String::new();
    for name in function_names {
        out.push_str(name);
        out.push('\n');
    }
    out
}

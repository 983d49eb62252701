//! Options loading: start from `PropellerOptions::default()`, fold in an
//! optional TOML file, then fold in explicit CLI overrides.
//!
//! Grounded in `SPEC_FULL.md` §6b: the core itself holds no global
//! configuration state, so this module's only job is to assemble one
//! immutable `PropellerOptions` value before the pipeline runs.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use propeller_core::PropellerOptions;

use crate::Cli;

/// Build the run's `PropellerOptions` from defaults, an optional TOML
/// file, and any CLI flags the user set explicitly.
pub fn build_options(cli: &Cli) -> Result<PropellerOptions> {
    let mut options = match &cli.options_file {
        Some(path) => load_toml(path)?,
        None => PropellerOptions::default(),
    };

    if let Some(v) = cli.separate_hot_cold {
        options.separate_hot_cold = v;
    }
    if let Some(v) = cli.function_entry_first {
        options.function_entry_first = v;
    }
    if let Some(v) = cli.fallthrough_weight {
        options.fallthrough_weight = v;
    }
    if let Some(v) = cli.forward_weight {
        options.forward_weight = v;
    }
    if let Some(v) = cli.backward_weight {
        options.backward_weight = v;
    }
    if let Some(v) = cli.forward_distance {
        options.forward_distance = v;
    }
    if let Some(v) = cli.backward_distance {
        options.backward_distance = v;
    }
    if let Some(v) = cli.chain_split_threshold {
        options.chain_split_threshold = v;
    }
    if let Some(v) = cli.reorder_ip {
        options.reorder_ip = v;
    }
    if let Some(v) = cli.split_funcs {
        options.split_funcs = v;
    }

    Ok(options)
}

fn load_toml(path: &Path) -> Result<PropellerOptions> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read options file: {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("failed to parse options file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn defaults_round_trip_with_no_overrides() {
        let cli = Cli::parse_from([
            "propeller",
            "--bb-addr-map",
            "a.map",
            "--profile",
            "perf_lbr:p.lbr",
            "--cc-profile-out",
            "cc.txt",
            "--ld-profile-out",
            "ld.txt",
        ]);
        let options = build_options(&cli).unwrap();
        assert_eq!(options, PropellerOptions::default());
    }

    #[test]
    fn cli_override_wins_over_default() {
        let cli = Cli::parse_from([
            "propeller",
            "--bb-addr-map",
            "a.map",
            "--profile",
            "perf_lbr:p.lbr",
            "--cc-profile-out",
            "cc.txt",
            "--ld-profile-out",
            "ld.txt",
            "--chain-split-threshold",
            "256",
            "--reorder-ip",
            "true",
        ]);
        let options = build_options(&cli).unwrap();
        assert_eq!(options.chain_split_threshold, 256);
        assert!(options.reorder_ip);
    }
}

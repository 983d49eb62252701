// CLI command handlers
use std::fs;

use anyhow::{Context, Result};
use propeller_core::error::ProfileFormat;
use propeller_core::formats::{read_bb_address_map, read_lbr_profile};
use propeller_core::s2_aggregator::LbrRecord;
use propeller_core::{PropellerError, Stats};

use crate::config::build_options;
use crate::Cli;

/// Read inputs, run the pipeline, write both output profiles, and return
/// the run's `Stats` for the caller to report.
pub fn run(cli: &Cli) -> Result<Stats> {
    let map_text = fs::read_to_string(&cli.bb_addr_map)
        .with_context(|| format!("failed to read address map: {}", cli.bb_addr_map.display()))?;
    let functions = read_bb_address_map(&map_text)
        .with_context(|| format!("failed to parse address map: {}", cli.bb_addr_map.display()))?;

    let options = build_options(cli)?;

    let mut stats = Stats::default();
    let mut records: Vec<LbrRecord> = Vec::new();
    for profile in &cli.profiles {
        if profile.format != ProfileFormat::PerfLbr {
            return Err(PropellerError::UnsupportedProfileFormat(profile.format).into());
        }
        let text = fs::read_to_string(&profile.path)
            .with_context(|| format!("failed to read profile: {}", profile.path.display()))?;
        records.extend(read_lbr_profile(&text, &mut stats));
    }

    let output = propeller_core::run_pipeline(&functions, &records, &options, cli.workers)
        .context("layout pipeline failed")?;
    stats.merge(&output.stats);

    fs::write(&cli.cc_profile_out, &output.cluster_profile)
        .with_context(|| format!("failed to write cluster profile: {}", cli.cc_profile_out.display()))?;
    fs::write(&cli.ld_profile_out, &output.symbol_order_profile)
        .with_context(|| format!("failed to write symbol order profile: {}", cli.ld_profile_out.display()))?;

    if let Some(path) = &cli.dump_stats {
        let json = serde_json::to_string_pretty(&stats).context("failed to serialize stats")?;
        fs::write(path, json).with_context(|| format!("failed to write stats dump: {}", path.display()))?;
    }

    Ok(stats)
}

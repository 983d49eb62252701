// CLI application
use std::path::PathBuf;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

mod commands;
mod config;
mod profile_arg;

use commands::run;
use profile_arg::ProfileArg;

/// Reorder a binary's basic blocks for instruction-cache locality using a
/// recorded branch profile (`spec.md` §1).
#[derive(Parser)]
#[command(name = "propeller")]
#[command(about = "Post-link basic-block layout optimizer")]
#[command(version)]
struct Cli {
    /// Path to the basic-block address map (`spec.md` §6.1).
    #[arg(long)]
    bb_addr_map: PathBuf,

    /// A branch profile, tagged `<format>:<path>`. Repeatable; formats are
    /// `perf_lbr`, `perf_spe`, `frequencies_proto` (`spec.md` §6.3). Only
    /// `perf_lbr` is decodable today; the others are accepted here and
    /// rejected by the core with `UnsupportedProfileFormat` so the failure
    /// names the offending file instead of failing generically.
    #[arg(long = "profile", required = true)]
    profiles: Vec<ProfileArg>,

    /// Where to write the cluster (`cc_profile`) text output.
    #[arg(long)]
    cc_profile_out: PathBuf,

    /// Where to write the symbol-order (`ld_profile`) text output.
    #[arg(long)]
    ld_profile_out: PathBuf,

    /// Optional TOML file of `PropellerOptions` overrides (`SPEC_FULL.md` §6b).
    #[arg(long = "options")]
    options_file: Option<PathBuf>,

    /// Optional path to dump the run's `Stats` as JSON.
    #[arg(long)]
    dump_stats: Option<PathBuf>,

    /// Number of S3 worker threads. Defaults to available parallelism.
    #[arg(long)]
    workers: Option<usize>,

    #[arg(long)]
    separate_hot_cold: Option<bool>,
    #[arg(long)]
    function_entry_first: Option<bool>,
    #[arg(long)]
    fallthrough_weight: Option<f64>,
    #[arg(long)]
    forward_weight: Option<f64>,
    #[arg(long)]
    backward_weight: Option<f64>,
    #[arg(long)]
    forward_distance: Option<u64>,
    #[arg(long)]
    backward_distance: Option<u64>,
    #[arg(long)]
    chain_split_threshold: Option<u64>,
    #[arg(long)]
    reorder_ip: Option<bool>,
    #[arg(long)]
    split_funcs: Option<bool>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    let pb = create_progress_bar("Building basic-block layout...");
    let stats = run(&cli)?;
    pb.finish_with_message("Layout complete");

    log::info!(
        "mapped {} intra + {} inter branch samples, dropped {} records, {} unresolved call edges",
        stats.intra_function_mapped,
        stats.inter_function_mapped,
        stats.dropped_records,
        stats.unresolved_call_edges,
    );

    Ok(())
}

fn create_progress_bar(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(message.to_string());
    pb
}

//! Text reader for an LBR profile (`spec.md` §6.1, `SPEC_FULL.md` §4b).
//!
//! One record per line, samples space-separated, each sample
//! `from/to/predicted/cycles` — directly grounded in
//! `original_source/lld/ELF/PLO.cpp`'s `LBREntry::CreateEntry` /
//! `PLO::InitProfile`. `predicted` (`M`/`P`/`-`) and `cycles` are parsed
//! for format fidelity but are not consumed by the aggregator (`spec.md`
//! §4.2 only uses `from`/`to`). Malformed lines are dropped and counted
//! rather than treated as fatal, matching the original's `Invalid entry`
//! diagnostic-and-skip behavior.

use crate::s2_aggregator::{BranchSample, LbrRecord};
use crate::stats::Stats;

fn parse_addr(s: &str) -> Option<u64> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        s.parse::<u64>().ok()
    }
}

fn parse_entry(entry: &str) -> Option<BranchSample> {
    let mut fields = entry.split('/');
    let from = parse_addr(fields.next()?)?;
    let to = parse_addr(fields.next()?)?;
    let predicted = fields.next()?;
    if !matches!(predicted, "M" | "P" | "-") {
        return None;
    }
    let cycles = fields.next()?;
    if cycles.parse::<u64>().is_err() {
        return None;
    }
    if fields.next().is_some() {
        return None; // trailing garbage
    }
    Some(BranchSample { from, to })
}

/// Parse every line of the profile into an `LbrRecord`. A line that
/// contains at least one malformed sample is dropped wholesale (counted
/// in `stats.dropped_records`); a record with zero parseable samples is
/// likewise dropped. This mirrors `spec.md` §4.2's "discard-and-count"
/// policy rather than failing the whole read.
pub fn read_lbr_profile(text: &str, stats: &mut Stats) -> Vec<LbrRecord> {
    let mut records = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut samples = Vec::new();
        let mut malformed = false;
        for entry in line.split_whitespace() {
            match parse_entry(entry) {
                Some(sample) => samples.push(sample),
                None => {
                    malformed = true;
                    break;
                }
            }
        }
        if malformed || samples.is_empty() {
            stats.dropped_records += 1;
            continue;
        }
        records.push(LbrRecord { samples });
    }
    records
}

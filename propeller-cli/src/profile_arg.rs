//! `--profile <format>:<path>` parsing for the CLI surface.

use std::path::PathBuf;
use std::str::FromStr;

use propeller_core::error::ProfileFormat;

#[derive(Debug, Clone)]
pub struct ProfileArg {
    pub format: ProfileFormat,
    pub path: PathBuf,
}

impl FromStr for ProfileArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tag, path) = s
            .split_once(':')
            .ok_or_else(|| format!("expected <format>:<path>, got {s:?}"))?;
        let format = match tag {
            "perf_lbr" => ProfileFormat::PerfLbr,
            "perf_spe" => ProfileFormat::PerfSpe,
            "frequencies_proto" => ProfileFormat::FrequenciesProto,
            other => return Err(format!("unknown profile format {other:?} (expected perf_lbr, perf_spe, or frequencies_proto)")),
        };
        if path.is_empty() {
            return Err(format!("missing path in {s:?}"));
        }
        Ok(ProfileArg { format, path: PathBuf::from(path) })
    }
}

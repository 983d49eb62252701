//! Extended-TSP scoring (`spec.md` §4.3.1).
//!
//! Grounded in `PropellerNodeChainBuilder.cpp`'s `getEdgeExtTSPScore`: a
//! fallthrough (zero distance) scores highest, short forward and backward
//! jumps score a distance-decayed fraction, and anything beyond the
//! configured thresholds scores zero.

use crate::options::PropellerOptions;

/// Score contribution of one edge with the given weight and signed
/// byte-distance `d` (end of source to start of sink; negative is backward).
pub fn edge_score(weight: u64, d: i64, options: &PropellerOptions) -> f64 {
    if weight == 0 {
        return 0.0;
    }
    let w = weight as f64;
    if d == 0 {
        return w * options.fallthrough_weight;
    }
    if d > 0 {
        let fw_d = options.forward_distance as f64;
        if (d as f64) < fw_d {
            return w * options.forward_weight * (1.0 - d as f64 / fw_d);
        }
        return 0.0;
    }
    let bw_d = options.backward_distance as f64;
    let neg_d = (-d) as f64;
    if neg_d < bw_d {
        return w * options.backward_weight * (1.0 - neg_d / bw_d);
    }
    0.0
}

/// Signed distance from the end of a node ending at `src_end` to the start
/// of a node starting at `sink_start`, both given as byte offsets along the
/// same linear placement axis.
pub fn distance(src_end: u64, sink_start: u64) -> i64 {
    sink_start as i64 - src_end as i64
}

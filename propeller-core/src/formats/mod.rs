//! Narrow text-format adapters at the S1/S2 input boundary
//! (`SPEC_FULL.md` §4a/§4b).
//!
//! Binary/DWARF parsing and perf-event decoding are out of scope for this
//! core (`spec.md` §1); these readers exist only so the crate is runnable
//! end-to-end on plain text fixtures without a linked-in object-file
//! parser. Production callers are expected to populate
//! [`crate::s1_builder::FunctionRecord`] and [`crate::s2_aggregator::LbrRecord`]
//! directly from their own DWARF/perf-event front end instead.

pub mod address_map;
pub mod profile;

pub use address_map::read_bb_address_map;
pub use profile::read_lbr_profile;

//! Text reader for a basic-block address-map dump (`spec.md` §6.1,
//! `SPEC_FULL.md` §4a).
//!
//! One function per `FUNC` line, followed by its blocks as `BB` lines:
//!
//! ```text
//! FUNC f 0x1000
//! BB 0 16 - C 0x1030
//! BB 16 16 - F
//! BB 32 16 R R
//! BB 48 16 - B 0x1020 calls=0x2000
//! ```
//!
//! `BB <offset> <size> <flags> <term> [<target>] [calls=<addr>,<addr>,...]`.
//! `flags` is `-` or any combination of `R` (return), `L` (landing pad),
//! `T` (thunk). `term` is one of `F` (fallthrough), `B <target>`
//! (unconditional branch), `C <target>` (conditional branch, implicit
//! fallthrough to the next block), `R` (return), `D` (dynamic/indirect,
//! no statically known target). Addresses are hex (`0x...`) or decimal,
//! matching the original's `getAsInteger(0, ...)` autosensing
//! (`original_source/lld/ELF/PLO.cpp`'s `LBREntry::CreateEntry`).

use crate::cfg::NodeFlags;
use crate::error::{PropellerError, Result};
use crate::s1_builder::{BlockRecord, FunctionRecord, Terminator};

fn parse_addr(s: &str) -> Result<u64> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
            .map_err(|e| PropellerError::AddressMapParse(format!("bad address {s:?}: {e}")))
    } else {
        s.parse::<u64>()
            .map_err(|e| PropellerError::AddressMapParse(format!("bad address {s:?}: {e}")))
    }
}

fn parse_flags(s: &str) -> NodeFlags {
    let mut flags = NodeFlags::default();
    if s == "-" {
        return flags;
    }
    for c in s.chars() {
        match c {
            'R' => flags.is_return = true,
            'L' => flags.is_landing_pad = true,
            'T' => flags.is_thunk = true,
            _ => {}
        }
    }
    flags
}

fn parse_calls(token: &str) -> Result<Vec<u64>> {
    let Some(rest) = token.strip_prefix("calls=") else {
        return Err(PropellerError::AddressMapParse(format!(
            "expected calls=... token, found {token:?}"
        )));
    };
    rest.split(',')
        .filter(|s| !s.is_empty())
        .map(parse_addr)
        .collect()
}

/// Parse the whole dump into an ordered list of `FunctionRecord`s, in the
/// order `FUNC` lines appear.
pub fn read_bb_address_map(text: &str) -> Result<Vec<FunctionRecord>> {
    let mut functions: Vec<FunctionRecord> = Vec::new();

    for (lineno, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let Some(tag) = parts.next() else { continue };

        match tag {
            "FUNC" => {
                let name = parts.next().ok_or_else(|| {
                    PropellerError::AddressMapParse(format!("line {}: FUNC missing name", lineno + 1))
                })?;
                let entry = parts.next().ok_or_else(|| {
                    PropellerError::AddressMapParse(format!("line {}: FUNC missing entry address", lineno + 1))
                })?;
                functions.push(FunctionRecord {
                    name: name.to_string(),
                    entry_address: parse_addr(entry)?,
                    blocks: Vec::new(),
                });
            }
            "BB" => {
                let f = functions.last_mut().ok_or_else(|| {
                    PropellerError::AddressMapParse(format!("line {}: BB before any FUNC", lineno + 1))
                })?;
                let offset = parts
                    .next()
                    .ok_or_else(|| PropellerError::AddressMapParse(format!("line {}: BB missing offset", lineno + 1)))
                    .and_then(parse_addr)?;
                let size = parts
                    .next()
                    .ok_or_else(|| PropellerError::AddressMapParse(format!("line {}: BB missing size", lineno + 1)))
                    .and_then(parse_addr)?;
                let flags_tok = parts.next().ok_or_else(|| {
                    PropellerError::AddressMapParse(format!("line {}: BB missing flags", lineno + 1))
                })?;
                let term_tok = parts.next().ok_or_else(|| {
                    PropellerError::AddressMapParse(format!("line {}: BB missing terminator", lineno + 1))
                })?;

                let mut rest: Vec<&str> = parts.collect();
                let terminator = match term_tok {
                    "F" => Terminator::Fallthrough,
                    "R" => Terminator::Return,
                    "D" => Terminator::Dynamic,
                    "B" | "C" => {
                        if rest.is_empty() {
                            return Err(PropellerError::AddressMapParse(format!(
                                "line {}: terminator {term_tok} requires a target address",
                                lineno + 1
                            )));
                        }
                        let target = parse_addr(rest.remove(0))?;
                        if term_tok == "B" {
                            Terminator::Branch(target)
                        } else {
                            Terminator::ConditionalBranch(target)
                        }
                    }
                    other => {
                        return Err(PropellerError::AddressMapParse(format!(
                            "line {}: unknown terminator {other:?}",
                            lineno + 1
                        )))
                    }
                };

                let calls = match rest.first() {
                    Some(tok) if tok.starts_with("calls=") => parse_calls(tok)?,
                    Some(other) => {
                        return Err(PropellerError::AddressMapParse(format!(
                            "line {}: unexpected trailing token {other:?}",
                            lineno + 1
                        )))
                    }
                    None => Vec::new(),
                };

                f.blocks.push(BlockRecord {
                    offset,
                    size,
                    flags: parse_flags(flags_tok),
                    terminator,
                    calls,
                });
            }
            other => {
                return Err(PropellerError::AddressMapParse(format!(
                    "line {}: unknown tag {other:?}",
                    lineno + 1
                )))
            }
        }
    }

    if functions.is_empty() {
        return Err(PropellerError::AddressMapParse(
            "address map contains no FUNC entries".into(),
        ));
    }
    Ok(functions)
}

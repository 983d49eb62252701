//! Program-level container: every function's CFG plus a fast address index.
//!
//! Mirrors the role of the teacher's `ELFView`/`Plo.Syms.AddrMap` combination
//! (`original_source/lld/ELF/PLOELFCfg.h`, `PLOProfile.cpp`): a flat list of
//! CFGs, each addressable by name, plus a sorted address table so S2 can
//! resolve an arbitrary branch-sample address back to `(function, block)`.

use std::collections::HashMap;

use crate::cfg::{ControlFlowGraph, NodeId};

/// Stable identity of a function within a `Program` (arena index into
/// `Program::cfgs`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FunctionId(pub u32);

/// All functions recovered from the binary, frozen after S1/S2.
#[derive(Debug, Clone)]
pub struct Program {
    pub cfgs: Vec<ControlFlowGraph>,
    name_index: HashMap<String, FunctionId>,
    addr_index: AddressIndex,
}

impl Program {
    pub fn new(cfgs: Vec<ControlFlowGraph>) -> Self {
        let name_index = cfgs
            .iter()
            .enumerate()
            .map(|(i, cfg)| (cfg.name.clone(), FunctionId(i as u32)))
            .collect();
        let addr_index = AddressIndex::build(&cfgs);
        Self {
            cfgs,
            name_index,
            addr_index,
        }
    }

    pub fn cfg(&self, id: FunctionId) -> &ControlFlowGraph {
        &self.cfgs[id.0 as usize]
    }

    pub fn cfg_mut(&mut self, id: FunctionId) -> &mut ControlFlowGraph {
        &mut self.cfgs[id.0 as usize]
    }

    pub fn find_by_name(&self, name: &str) -> Option<FunctionId> {
        self.name_index.get(name).copied()
    }

    /// Resolve a virtual address to its containing `(function, block)`.
    pub fn resolve(&self, addr: u64) -> Option<(FunctionId, NodeId)> {
        self.addr_index.resolve(addr, &self.cfgs)
    }

    pub fn len(&self) -> usize {
        self.cfgs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cfgs.is_empty()
    }
}

/// A sorted table of block start addresses, supporting the "largest address
/// not greater than the query" lookup used by the original's
/// `AddrMap.upper_bound` plus a containment check.
#[derive(Debug, Clone)]
struct AddressIndex {
    /// Sorted by address; `(address, function, node, size)`.
    entries: Vec<(u64, FunctionId, NodeId, u64)>,
}

impl AddressIndex {
    fn build(cfgs: &[ControlFlowGraph]) -> Self {
        let mut entries = Vec::new();
        for (fi, cfg) in cfgs.iter().enumerate() {
            for node in &cfg.nodes {
                entries.push((node.address, FunctionId(fi as u32), node.id, node.size));
            }
        }
        entries.sort_by_key(|e| e.0);
        Self { entries }
    }

    fn resolve(&self, addr: u64, _cfgs: &[ControlFlowGraph]) -> Option<(FunctionId, NodeId)> {
        // Binary search for the last entry whose address is <= addr.
        let idx = match self.entries.binary_search_by_key(&addr, |e| e.0) {
            Ok(i) => i,
            Err(0) => return None,
            Err(i) => i - 1,
        };
        let (start, func, node, size) = self.entries[idx];
        if addr >= start && addr < start + size.max(1) {
            Some((func, node))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::{Node, NodeFlags};
    use smallvec::SmallVec;

    fn single_block_cfg(name: &str, addr: u64, size: u64) -> ControlFlowGraph {
        ControlFlowGraph {
            name: name.into(),
            entry: NodeId(0),
            nodes: vec![Node {
                id: NodeId(0),
                name: format!("{name}.bb.0"),
                size,
                address: addr,
                flags: NodeFlags::default(),
                freq: 0,
                out_intra: SmallVec::new(),
                in_intra: SmallVec::new(),
                call_outs: SmallVec::new(),
                call_ins: SmallVec::new(),
                ft_edge: None,
            }],
            edges: vec![],
        }
    }

    #[test]
    fn resolves_address_inside_block() {
        let program = Program::new(vec![single_block_cfg("f", 0x1000, 16), single_block_cfg("g", 0x2000, 32)]);
        let (func, node) = program.resolve(0x1008).unwrap();
        assert_eq!(program.cfg(func).name, "f");
        assert_eq!(node, NodeId(0));
    }

    #[test]
    fn rejects_address_outside_any_block() {
        let program = Program::new(vec![single_block_cfg("f", 0x1000, 16)]);
        assert!(program.resolve(0x5000).is_none());
        assert!(program.resolve(0x0).is_none());
    }

    #[test]
    fn find_by_name_round_trips() {
        let program = Program::new(vec![single_block_cfg("f", 0x1000, 16)]);
        let id = program.find_by_name("f").unwrap();
        assert_eq!(program.cfg(id).name, "f");
        assert!(program.find_by_name("missing").is_none());
    }

}

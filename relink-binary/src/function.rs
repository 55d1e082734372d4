use std::collections::BTreeMap;

use bitflags::bitflags;

use crate::block::{BinaryBasicBlock, BlockId};
use crate::context::SymbolId;
use crate::demangle;
use crate::hash::{self, HashFunction};
use crate::instruction::{Instruction, InstructionKind};
use crate::COUNT_NO_PROFILE;

bitflags! {
    /// Kinds of profile data attached to a function.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ProfileFlags: u8 {
        /// Profile built from taken-branch records, with edge counts.
        const LBR = 1 << 0;
        /// Interval-sample profile without branch data.
        const SAMPLE = 1 << 1;
    }
}

/// A call site recorded on a function during profile attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
    pub callee: Option<SymbolId>,
    pub count: u64,
    pub mispreds: u64,
    pub offset: u64,
}

/// A function recovered from the target binary, with its CFG and
/// disassembled instructions keyed by input byte offset.
#[derive(Debug, Clone)]
pub struct BinaryFunction {
    names: Vec<String>,
    size: u64,
    blocks: Vec<BinaryBasicBlock>,
    instructions: BTreeMap<u64, Instruction>,
    entry_symbols: Vec<SymbolId>,
    call_sites: Vec<CallSite>,
    hash: Option<u64>,
    execution_count: u64,
    raw_branch_count: u64,
    profile_flags: ProfileFlags,
    ignored: bool,
}

impl BinaryFunction {
    pub(crate) fn new(names: Vec<String>, size: u64) -> Self {
        Self {
            names,
            size,
            blocks: Vec::new(),
            instructions: BTreeMap::new(),
            entry_symbols: Vec::new(),
            call_sites: Vec::new(),
            hash: None,
            execution_count: COUNT_NO_PROFILE,
            raw_branch_count: 0,
            profile_flags: ProfileFlags::empty(),
            ignored: false,
        }
    }

    /// Primary symbol name.
    pub fn name(&self) -> &str {
        &self.names[0]
    }

    /// All symbol names, primary first.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn demangled_name(&self) -> String {
        demangle::demangle_or_original(self.name())
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    // CFG construction, used by the front end and by tests.

    /// Append a block in layout order. The first block becomes the entry.
    pub fn push_block(&mut self, input_offset: u64, original_size: u64) -> BlockId {
        let id = self.blocks.len();
        self.blocks
            .push(BinaryBasicBlock::new(input_offset, original_size, id == 0));
        id
    }

    /// Mark a block as an additional entry point.
    pub fn mark_entry_point(&mut self, block: BlockId) {
        self.blocks[block].set_entry_point();
    }

    /// Add a CFG edge with zeroed branch counts.
    pub fn connect(&mut self, from: BlockId, to: BlockId) {
        self.blocks[from].add_successor(to);
    }

    pub fn insert_instruction(&mut self, offset: u64, kind: InstructionKind) {
        self.instructions.insert(offset, Instruction::new(kind));
    }

    pub fn block(&self, id: BlockId) -> &BinaryBasicBlock {
        &self.blocks[id]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BinaryBasicBlock {
        &mut self.blocks[id]
    }

    pub fn blocks(&self) -> &[BinaryBasicBlock] {
        &self.blocks
    }

    /// Block ids in layout order.
    pub fn layout_order(&self) -> Vec<BlockId> {
        (0..self.blocks.len()).collect()
    }

    /// Block ids in DFS pre-order from the entry block, first successor
    /// visited first. Blocks unreachable from the entry follow in layout
    /// order so the result always covers the function.
    pub fn dfs_order(&self) -> Vec<BlockId> {
        let mut order = Vec::with_capacity(self.blocks.len());
        let mut visited = vec![false; self.blocks.len()];
        let mut stack = Vec::new();
        if !self.blocks.is_empty() {
            stack.push(0);
        }
        while let Some(id) = stack.pop() {
            if visited[id] {
                continue;
            }
            visited[id] = true;
            order.push(id);
            for succ in self.blocks[id].successors().iter().rev() {
                if !visited[succ.block] {
                    stack.push(succ.block);
                }
            }
        }
        for id in 0..self.blocks.len() {
            if !visited[id] {
                order.push(id);
            }
        }
        order
    }

    pub fn instruction_at_offset(&self, offset: u64) -> Option<&Instruction> {
        self.instructions.get(&offset)
    }

    pub fn instruction_at_offset_mut(&mut self, offset: u64) -> Option<&mut Instruction> {
        self.instructions.get_mut(&offset)
    }

    /// Instructions whose offsets fall inside the given block.
    pub fn instructions_in_block(
        &self,
        block: BlockId,
    ) -> impl Iterator<Item = (u64, &Instruction)> {
        let start = self.blocks[block].input_offset();
        let end = start + self.blocks[block].original_size();
        self.instructions
            .range(start..end)
            .map(|(&offset, inst)| (offset, inst))
    }

    pub fn num_non_pseudo_instructions(&self, block: BlockId) -> u64 {
        self.instructions_in_block(block)
            .filter(|(_, inst)| !inst.is_pseudo())
            .count() as u64
    }

    pub fn num_calls(&self, block: BlockId) -> u64 {
        self.instructions_in_block(block)
            .filter(|(_, inst)| inst.is_call())
            .count() as u64
    }

    // Entry points.

    pub(crate) fn add_entry_symbol(&mut self, symbol: SymbolId) {
        self.entry_symbols.push(symbol);
    }

    /// Symbol of the entry identified by `discriminator`; 0 is the primary
    /// entry, larger values address secondary entries of multi-entry
    /// functions.
    pub fn symbol_for_entry_id(&self, discriminator: u32) -> Option<SymbolId> {
        self.entry_symbols.get(discriminator as usize).copied()
    }

    // Profile state.

    /// Fingerprint of the CFG, computed once and cached; the first caller's
    /// ordering and hash-function choice win.
    pub fn compute_hash(&mut self, use_dfs: bool, hash_function: HashFunction) -> u64 {
        if let Some(hash) = self.hash {
            return hash;
        }
        let hash = hash::fingerprint(self, use_dfs, hash_function);
        self.hash = Some(hash);
        hash
    }

    pub fn hash(&self) -> Option<u64> {
        self.hash
    }

    pub fn record_call_site(
        &mut self,
        callee: Option<SymbolId>,
        count: u64,
        mispreds: u64,
        offset: u64,
    ) {
        self.call_sites.push(CallSite {
            callee,
            count,
            mispreds,
            offset,
        });
    }

    pub fn call_sites(&self) -> &[CallSite] {
        &self.call_sites
    }

    pub fn execution_count(&self) -> u64 {
        self.execution_count
    }

    pub fn set_execution_count(&mut self, count: u64) {
        self.execution_count = count;
    }

    pub fn raw_branch_count(&self) -> u64 {
        self.raw_branch_count
    }

    pub fn set_raw_branch_count(&mut self, count: u64) {
        self.raw_branch_count = count;
    }

    pub fn has_profile(&self) -> bool {
        self.execution_count != COUNT_NO_PROFILE
    }

    pub fn mark_profiled(&mut self, flags: ProfileFlags) {
        self.profile_flags |= flags;
    }

    pub fn profile_flags(&self) -> ProfileFlags {
        self.profile_flags
    }

    pub fn set_ignored(&mut self) {
        self.ignored = true;
    }

    pub fn is_ignored(&self) -> bool {
        self.ignored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> BinaryFunction {
        // b0 -> b1, b0 -> b2, b1 -> b3, b2 -> b3
        let mut func = BinaryFunction::new(vec!["diamond".to_string()], 32);
        let b0 = func.push_block(0, 8);
        let b1 = func.push_block(8, 8);
        let b2 = func.push_block(16, 8);
        let b3 = func.push_block(24, 8);
        func.connect(b0, b1);
        func.connect(b0, b2);
        func.connect(b1, b3);
        func.connect(b2, b3);
        func
    }

    #[test]
    fn test_dfs_order_prefers_first_successor() {
        let func = diamond();
        assert_eq!(func.dfs_order(), vec![0, 1, 3, 2]);
        assert_eq!(func.layout_order(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_dfs_order_covers_unreachable_blocks() {
        let mut func = BinaryFunction::new(vec!["orphan".to_string()], 16);
        let b0 = func.push_block(0, 8);
        let b1 = func.push_block(8, 4);
        let _cold = func.push_block(12, 4);
        func.connect(b0, b1);
        assert_eq!(func.dfs_order(), vec![0, 1, 2]);
    }

    #[test]
    fn test_block_instruction_queries() {
        let mut func = diamond();
        func.insert_instruction(0, InstructionKind::Other);
        func.insert_instruction(2, InstructionKind::Pseudo);
        func.insert_instruction(
            4,
            InstructionKind::Call {
                indirect: false,
                conditional_tail: false,
            },
        );
        func.insert_instruction(8, InstructionKind::Other);

        assert_eq!(func.num_non_pseudo_instructions(0), 2);
        assert_eq!(func.num_calls(0), 1);
        assert_eq!(func.num_calls(1), 0);
    }

    #[test]
    fn test_hash_is_cached() {
        let mut func = diamond();
        let first = func.compute_hash(false, HashFunction::Xxh3);
        let again = func.compute_hash(true, HashFunction::StdHash);
        assert_eq!(first, again);
        assert_eq!(func.hash(), Some(first));
    }

    #[test]
    fn test_has_profile_tracks_execution_count() {
        let mut func = diamond();
        assert!(!func.has_profile());
        func.set_execution_count(0);
        assert!(func.has_profile());
    }
}

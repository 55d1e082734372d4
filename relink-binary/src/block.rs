use crate::COUNT_NO_PROFILE;

/// Index of a basic block within its owning function's layout order.
pub type BlockId = usize;

/// Execution counts attached to a CFG edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BranchInfo {
    pub count: u64,
    pub mispredicted_count: u64,
}

/// Outgoing CFG edge of a basic block.
#[derive(Debug, Clone)]
pub struct Successor {
    pub block: BlockId,
    pub branch_info: BranchInfo,
}

/// A basic block recovered from the target binary.
#[derive(Debug, Clone)]
pub struct BinaryBasicBlock {
    input_offset: u64,
    original_size: u64,
    execution_count: u64,
    is_entry: bool,
    successors: Vec<Successor>,
}

impl BinaryBasicBlock {
    pub(crate) fn new(input_offset: u64, original_size: u64, is_entry: bool) -> Self {
        Self {
            input_offset,
            original_size,
            execution_count: COUNT_NO_PROFILE,
            is_entry,
            successors: Vec::new(),
        }
    }

    /// Byte offset of the block from the function start in the input binary.
    pub fn input_offset(&self) -> u64 {
        self.input_offset
    }

    /// Size of the block in the input binary, in bytes.
    pub fn original_size(&self) -> u64 {
        self.original_size
    }

    pub fn execution_count(&self) -> u64 {
        self.execution_count
    }

    pub fn set_execution_count(&mut self, count: u64) {
        self.execution_count = count;
    }

    pub fn is_entry_point(&self) -> bool {
        self.is_entry
    }

    pub(crate) fn set_entry_point(&mut self) {
        self.is_entry = true;
    }

    pub fn successors(&self) -> &[Successor] {
        &self.successors
    }

    pub(crate) fn add_successor(&mut self, block: BlockId) {
        self.successors.push(Successor {
            block,
            branch_info: BranchInfo::default(),
        });
    }

    pub fn has_successor(&self, block: BlockId) -> bool {
        self.successors.iter().any(|succ| succ.block == block)
    }

    pub fn branch_info(&self, block: BlockId) -> Option<&BranchInfo> {
        self.successors
            .iter()
            .find(|succ| succ.block == block)
            .map(|succ| &succ.branch_info)
    }

    pub fn branch_info_mut(&mut self, block: BlockId) -> Option<&mut BranchInfo> {
        self.successors
            .iter_mut()
            .find(|succ| succ.block == block)
            .map(|succ| &mut succ.branch_info)
    }

    /// Successor taken when the terminating conditional branch evaluates to
    /// `condition`. Only meaningful for two-successor blocks; the fallthrough
    /// edge is the `false` side.
    pub fn conditional_successor(&self, condition: bool) -> Option<BlockId> {
        if self.successors.len() != 2 {
            return None;
        }
        Some(self.successors[if condition { 0 } else { 1 }].block)
    }
}

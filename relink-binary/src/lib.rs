pub mod demangle;
pub mod names;

mod block;
mod context;
mod function;
mod hash;
mod instruction;

pub use block::{BinaryBasicBlock, BlockId, BranchInfo, Successor};
pub use context::{BinaryContext, BinaryContextStats, BinaryData, FunctionId, SymbolId};
pub use function::{BinaryFunction, CallSite, ProfileFlags};
pub use hash::HashFunction;
pub use instruction::{
    AnnotationValue, CallProfileEntry, Instruction, InstructionKind, ANNOTATION_CALL_PROFILE,
    ANNOTATION_COUNT, ANNOTATION_CTC_MISPRED_COUNT, ANNOTATION_CTC_TAKEN_COUNT,
};

/// Sentinel execution count for functions and blocks that carry no profile.
pub const COUNT_NO_PROFILE: u64 = u64::MAX;

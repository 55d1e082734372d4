//! Disassembled-instruction surface needed by profile attachment:
//! capability predicates and the per-instruction annotation bag.

use std::collections::HashMap;

use crate::context::SymbolId;

/// Annotation key carrying per-callee counts of an indirect call site.
pub const ANNOTATION_CALL_PROFILE: &str = "CallProfile";
/// Annotation key carrying the taken count of a conditional tail call.
pub const ANNOTATION_CTC_TAKEN_COUNT: &str = "CTCTakenCount";
/// Annotation key carrying the mispredict count of a conditional tail call.
pub const ANNOTATION_CTC_MISPRED_COUNT: &str = "CTCMispredCount";
/// Annotation key carrying the execution count of a direct call.
pub const ANNOTATION_COUNT: &str = "Count";

/// Classification of a machine instruction, reduced to what count
/// propagation needs to know.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionKind {
    Call { indirect: bool, conditional_tail: bool },
    IndirectBranch,
    Branch,
    Pseudo,
    Other,
}

impl InstructionKind {
    pub(crate) fn tag(self) -> u8 {
        match self {
            InstructionKind::Call {
                indirect,
                conditional_tail,
            } => 0x10 | (indirect as u8) | ((conditional_tail as u8) << 1),
            InstructionKind::IndirectBranch => 0x20,
            InstructionKind::Branch => 0x30,
            InstructionKind::Pseudo => 0x40,
            InstructionKind::Other => 0x50,
        }
    }
}

/// One observed callee of an indirect call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallProfileEntry {
    pub symbol: Option<SymbolId>,
    pub count: u64,
    pub mispreds: u64,
}

/// Value stored under an annotation key: either a scalar count or an
/// append-only list of per-callee counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationValue {
    Count(u64),
    CallProfile(Vec<CallProfileEntry>),
}

#[derive(Debug, Clone)]
pub struct Instruction {
    kind: InstructionKind,
    annotations: HashMap<String, AnnotationValue>,
}

impl Instruction {
    pub fn new(kind: InstructionKind) -> Self {
        Self {
            kind,
            annotations: HashMap::new(),
        }
    }

    pub fn kind(&self) -> InstructionKind {
        self.kind
    }

    pub fn is_call(&self) -> bool {
        matches!(self.kind, InstructionKind::Call { .. })
    }

    pub fn is_indirect_call(&self) -> bool {
        matches!(self.kind, InstructionKind::Call { indirect: true, .. })
    }

    pub fn is_indirect_branch(&self) -> bool {
        matches!(self.kind, InstructionKind::IndirectBranch)
    }

    pub fn is_conditional_tail_call(&self) -> bool {
        matches!(
            self.kind,
            InstructionKind::Call {
                conditional_tail: true,
                ..
            }
        )
    }

    pub fn is_pseudo(&self) -> bool {
        matches!(self.kind, InstructionKind::Pseudo)
    }

    pub fn has_annotation(&self, name: &str) -> bool {
        self.annotations.contains_key(name)
    }

    pub fn annotation(&self, name: &str) -> Option<&AnnotationValue> {
        self.annotations.get(name)
    }

    /// Scalar count stored under `name`, if any.
    pub fn count_annotation(&self, name: &str) -> Option<u64> {
        match self.annotations.get(name) {
            Some(AnnotationValue::Count(count)) => Some(*count),
            _ => None,
        }
    }

    /// Store a scalar count under `name`. Returns false without touching the
    /// existing value when the key is already present.
    pub fn set_count_annotation(&mut self, name: &str, value: u64) -> bool {
        if self.annotations.contains_key(name) {
            return false;
        }
        self.annotations
            .insert(name.to_string(), AnnotationValue::Count(value));
        true
    }

    /// Per-callee counts recorded on an indirect call site, if any.
    pub fn call_profile(&self) -> Option<&[CallProfileEntry]> {
        match self.annotations.get(ANNOTATION_CALL_PROFILE) {
            Some(AnnotationValue::CallProfile(entries)) => Some(entries),
            _ => None,
        }
    }

    /// The call-profile list for this instruction, created on first touch.
    pub fn call_profile_mut(&mut self) -> &mut Vec<CallProfileEntry> {
        let value = self
            .annotations
            .entry(ANNOTATION_CALL_PROFILE.to_string())
            .or_insert_with(|| AnnotationValue::CallProfile(Vec::new()));
        if let AnnotationValue::Count(_) = value {
            *value = AnnotationValue::CallProfile(Vec::new());
        }
        match value {
            AnnotationValue::CallProfile(entries) => entries,
            AnnotationValue::Count(_) => unreachable!(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicates() {
        let call = Instruction::new(InstructionKind::Call {
            indirect: false,
            conditional_tail: false,
        });
        assert!(call.is_call());
        assert!(!call.is_indirect_call());
        assert!(!call.is_conditional_tail_call());

        let indirect = Instruction::new(InstructionKind::Call {
            indirect: true,
            conditional_tail: false,
        });
        assert!(indirect.is_call());
        assert!(indirect.is_indirect_call());

        let ctc = Instruction::new(InstructionKind::Call {
            indirect: false,
            conditional_tail: true,
        });
        assert!(ctc.is_call());
        assert!(ctc.is_conditional_tail_call());

        let jump_table = Instruction::new(InstructionKind::IndirectBranch);
        assert!(!jump_table.is_call());
        assert!(jump_table.is_indirect_branch());
    }

    #[test]
    fn test_scalar_annotation_written_once() {
        let mut inst = Instruction::new(InstructionKind::Call {
            indirect: false,
            conditional_tail: false,
        });
        assert!(inst.set_count_annotation(ANNOTATION_COUNT, 7));
        assert!(!inst.set_count_annotation(ANNOTATION_COUNT, 99));
        assert_eq!(inst.count_annotation(ANNOTATION_COUNT), Some(7));
    }

    #[test]
    fn test_call_profile_appends_in_order() {
        let mut inst = Instruction::new(InstructionKind::Call {
            indirect: true,
            conditional_tail: false,
        });
        inst.call_profile_mut().push(CallProfileEntry {
            symbol: Some(1),
            count: 10,
            mispreds: 1,
        });
        inst.call_profile_mut().push(CallProfileEntry {
            symbol: Some(2),
            count: 20,
            mispreds: 0,
        });

        let entries = inst.call_profile().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].symbol, Some(1));
        assert_eq!(entries[1].symbol, Some(2));
    }
}

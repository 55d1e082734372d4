//! Structural CFG fingerprints used to recognize identical functions
//! across renames.

use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

use crate::function::BinaryFunction;

/// Hash function for fingerprints, chosen by the profile producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HashFunction {
    #[default]
    #[serde(rename = "std-hash")]
    StdHash,
    #[serde(rename = "xxh3")]
    Xxh3,
}

/// Fingerprint a function's CFG. Block ordering (layout or DFS), successor
/// shape, and instruction kinds all contribute, so two functions hash equal
/// exactly when their structure matches under the chosen ordering.
pub(crate) fn fingerprint(
    func: &BinaryFunction,
    use_dfs: bool,
    hash_function: HashFunction,
) -> u64 {
    let order = if use_dfs {
        func.dfs_order()
    } else {
        func.layout_order()
    };
    let mut position = vec![u32::MAX; func.num_blocks()];
    for (pos, &block) in order.iter().enumerate() {
        position[block] = pos as u32;
    }

    let mut bytes = Vec::new();
    for &block_id in &order {
        let block = func.block(block_id);
        bytes.extend_from_slice(&(block.successors().len() as u32).to_le_bytes());
        for succ in block.successors() {
            bytes.extend_from_slice(&position[succ.block].to_le_bytes());
        }
        for (_, inst) in func.instructions_in_block(block_id) {
            bytes.push(inst.kind().tag());
        }
        // Block separator.
        bytes.push(0xfe);
    }

    match hash_function {
        HashFunction::StdHash => {
            let mut hasher = DefaultHasher::new();
            hasher.write(&bytes);
            hasher.finish()
        }
        HashFunction::Xxh3 => xxh3_64(&bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::InstructionKind;

    fn branchy(names: &[&str]) -> BinaryFunction {
        let mut func = BinaryFunction::new(names.iter().map(|s| s.to_string()).collect(), 24);
        let b0 = func.push_block(0, 8);
        let b1 = func.push_block(8, 8);
        let b2 = func.push_block(16, 8);
        func.connect(b0, b1);
        func.connect(b0, b2);
        func.insert_instruction(0, InstructionKind::Other);
        func.insert_instruction(4, InstructionKind::Branch);
        func
    }

    #[test]
    fn test_fingerprint_ignores_names() {
        let hash_a = fingerprint(&branchy(&["f_old"]), false, HashFunction::Xxh3);
        let hash_b = fingerprint(&branchy(&["f_new"]), false, HashFunction::Xxh3);
        assert_eq!(hash_a, hash_b);
    }

    #[test]
    fn test_fingerprint_sees_structure() {
        let plain = branchy(&["f"]);
        let mut extra = branchy(&["f"]);
        extra.connect(1, 2);
        assert_ne!(
            fingerprint(&plain, false, HashFunction::Xxh3),
            fingerprint(&extra, false, HashFunction::Xxh3)
        );
    }

    #[test]
    fn test_hash_functions_disagree() {
        let func = branchy(&["f"]);
        assert_ne!(
            fingerprint(&func, false, HashFunction::StdHash),
            fingerprint(&func, false, HashFunction::Xxh3)
        );
    }
}

#![allow(dead_code)]

//! Shared helpers: synthetic binary contexts and profile documents written
//! to temporary files and run through the full reader.

use relink_binary::{BinaryContext, FunctionId, InstructionKind};
use relink_profile::{
    BlockProfile, FunctionProfile, ProfileDocument, ProfileHeader, ProfileReader, ReaderOptions,
    SuccessorProfile,
};
use tempfile::TempDir;

pub const FLAG_LBR: u8 = 1;
pub const FLAG_SAMPLE: u8 = 2;

/// Three blocks, `b0 -> b1` and `b0 -> b2`, two instructions in `b0`.
pub fn add_branchy_function(ctx: &mut BinaryContext, name: &str) -> FunctionId {
    let func = ctx.add_function([name], 24);
    let function = ctx.function_mut(func);
    let b0 = function.push_block(0, 8);
    let b1 = function.push_block(8, 8);
    let b2 = function.push_block(16, 8);
    function.connect(b0, b1);
    function.connect(b0, b2);
    function.insert_instruction(0, InstructionKind::Other);
    function.insert_instruction(4, InstructionKind::Branch);
    func
}

/// Function with no recovered blocks.
pub fn add_empty_function(ctx: &mut BinaryContext, name: &str) -> FunctionId {
    ctx.add_function([name], 0)
}

pub fn header(flags: u8) -> ProfileHeader {
    ProfileHeader {
        version: 1,
        flags,
        ..Default::default()
    }
}

/// Record shaped like [`add_branchy_function`]: 100 executions split 70/30.
pub fn branchy_record(name: &str, id: u32, hash: u64) -> FunctionProfile {
    FunctionProfile {
        name: name.to_string(),
        id,
        hash,
        exec_count: 0,
        num_basic_blocks: 3,
        blocks: vec![
            BlockProfile {
                index: 0,
                exec_count: 100,
                successors: vec![
                    SuccessorProfile {
                        index: 1,
                        count: 70,
                        mispreds: 2,
                    },
                    SuccessorProfile {
                        index: 2,
                        count: 30,
                        mispreds: 0,
                    },
                ],
                ..Default::default()
            },
            BlockProfile {
                index: 1,
                exec_count: 70,
                ..Default::default()
            },
            BlockProfile {
                index: 2,
                exec_count: 30,
                ..Default::default()
            },
        ],
    }
}

pub fn to_yaml(doc: &ProfileDocument) -> String {
    format!("---\n{}", serde_yaml::to_string(doc).unwrap())
}

/// Write `doc` to a temporary file and run preprocess + read against `ctx`.
pub fn run_reader(
    doc: &ProfileDocument,
    ctx: &mut BinaryContext,
    opts: ReaderOptions,
) -> ProfileReader {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("profile.yaml");
    std::fs::write(&path, to_yaml(doc)).unwrap();
    let mut reader = ProfileReader::new(&path, opts);
    reader.preprocess_profile(ctx).unwrap();
    reader.read_profile(ctx).unwrap();
    reader
}

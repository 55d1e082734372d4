//! Profile-attachment core of the relink post-link optimizer.
//!
//! Reads a recorded execution profile, matches each profiled function to a
//! function recovered from the target binary, and propagates block, edge,
//! and call-site counts onto the binary's control-flow graph.

pub mod document;
pub mod options;

mod propagate;
mod reader;
mod similarity;

pub use document::{
    is_yaml, BlockProfile, CallSiteProfile, FunctionProfile, ProfileDocument, ProfileHeader,
    SuccessorProfile,
};
pub use options::{ReaderOptions, StaleInference};
pub use reader::{MatchStats, ProfileReader};

pub use relink_binary::{HashFunction, ProfileFlags};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("cannot open profile: {0}")]
    Io(#[from] std::io::Error),

    #[error("syntax error parsing profile: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("cannot read profile: unsupported version {0}")]
    UnsupportedVersion(u32),

    #[error("multiple events in profile are not supported: {0}")]
    MultipleEvents(String),
}

pub type Result<T> = std::result::Result<T, ProfileError>;

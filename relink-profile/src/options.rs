//! Reader configuration and the stale-profile inference seam.

use relink_binary::{BinaryContext, FunctionId};

use crate::document::FunctionProfile;

/// Reconciles a profile whose shape no longer matches the function it was
/// bound to. Implemented by the downstream inference pass; returns whether
/// the profile could be applied after all.
pub trait StaleInference {
    fn infer(&self, ctx: &mut BinaryContext, func: FunctionId, profile: &FunctionProfile) -> bool;
}

/// Configuration surface of the profile reader.
#[derive(Default)]
pub struct ReaderOptions {
    /// Skip hash computation and comparison; block count alone determines
    /// an exact match.
    pub ignore_hash: bool,

    /// Match leftover profiles against every binary function by CFG
    /// fingerprint, recovering renamed functions.
    pub match_with_function_hash: bool,

    /// Treat block indices as DFS pre-order even when the header does not
    /// say so.
    pub use_dfs: bool,

    /// Invoke the stale-inference hook on functions whose profile did not
    /// apply cleanly.
    pub infer_stale_profile: bool,

    /// Together with `match_with_function_hash`, mark functions that ended
    /// up without a profile as ignored.
    pub lite: bool,

    /// Edit-distance threshold for namespace-bucketed name-similarity
    /// matching; zero disables it.
    pub name_similarity_threshold: u32,

    /// Gates diagnostic warnings; never affects matching outcomes.
    pub verbosity: u32,

    /// Hook invoked when `infer_stale_profile` is set.
    pub stale_inference: Option<Box<dyn StaleInference>>,
}

impl std::fmt::Debug for ReaderOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderOptions")
            .field("ignore_hash", &self.ignore_hash)
            .field("match_with_function_hash", &self.match_with_function_hash)
            .field("use_dfs", &self.use_dfs)
            .field("infer_stale_profile", &self.infer_stale_profile)
            .field("lite", &self.lite)
            .field("name_similarity_threshold", &self.name_similarity_threshold)
            .field("verbosity", &self.verbosity)
            .field("stale_inference", &self.stale_inference.is_some())
            .finish()
    }
}

//! Profile reader: loads a recorded profile document, matches its records
//! to binary functions through an ordered cascade of strategies, and
//! drives count propagation for every bound pair.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::PathBuf;

use relink_binary::{names, BinaryContext, BinaryFunction, FunctionId, HashFunction, COUNT_NO_PROFILE};
use tracing::{info, warn};

use crate::document::ProfileDocument;
use crate::options::ReaderOptions;
use crate::Result;

/// Per-strategy match counts reported at the end of a run.
#[derive(Debug, Default, Clone, Copy)]
pub struct MatchStats {
    pub matched_with_exact_name: u64,
    pub matched_with_hash: u64,
    pub matched_with_lto_common_name: u64,
    pub matched_with_name_similarity: u64,
    pub unused_profiles: u64,
}

/// Reads one profile document and attaches it to a `BinaryContext`.
///
/// Call `preprocess_profile` first (loads and validates the document and
/// builds the name indexes), then `read_profile` (matches and propagates).
pub struct ProfileReader {
    path: PathBuf,
    pub(crate) opts: ReaderOptions,
    pub(crate) doc: ProfileDocument,

    /// Cleaned profile function names.
    profile_function_names: HashSet<String>,
    /// Name-lookup result per record, index-aligned with the document.
    profile_bfs: Vec<Option<FunctionId>>,
    /// LTO common name -> record indexes.
    lto_common_name_map: BTreeMap<String, Vec<usize>>,
    /// LTO common name -> binary functions.
    lto_common_name_function_map: BTreeMap<String, BTreeSet<FunctionId>>,

    /// Result map, keyed by record id.
    pub(crate) profile_to_function: Vec<Option<FunctionId>>,
    /// Binary functions already claimed by some record.
    pub(crate) profiled_functions: HashSet<FunctionId>,
    /// Claim state per record, index-aligned with the document.
    pub(crate) used: Vec<bool>,

    pub(crate) normalize_by_insn_count: bool,
    pub(crate) normalize_by_calls: bool,

    stats: MatchStats,
}

impl ProfileReader {
    pub fn new(path: impl Into<PathBuf>, opts: ReaderOptions) -> Self {
        Self {
            path: path.into(),
            opts,
            doc: ProfileDocument::default(),
            profile_function_names: HashSet::new(),
            profile_bfs: Vec::new(),
            lto_common_name_map: BTreeMap::new(),
            lto_common_name_function_map: BTreeMap::new(),
            profile_to_function: Vec::new(),
            profiled_functions: HashSet::new(),
            used: Vec::new(),
            normalize_by_insn_count: false,
            normalize_by_calls: false,
            stats: MatchStats::default(),
        }
    }

    pub fn document(&self) -> &ProfileDocument {
        &self.doc
    }

    pub fn stats(&self) -> &MatchStats {
        &self.stats
    }

    /// Whether the recorded event set contains `name`.
    pub fn uses_event(&self, name: &str) -> bool {
        self.doc.header.event_names.contains(name)
    }

    /// Whether any profiled name looks like a local symbol uniquified with
    /// its defining file name.
    pub fn has_locals_with_file_name(&self) -> bool {
        self.profile_function_names
            .iter()
            .any(|name| names::is_file_uniquified_local(name))
    }

    /// Whether `func` could plausibly have a record in this profile: one
    /// of its names is profiled, one of its LTO common names collides with
    /// a profiled one, or the run trusts hash matching alone.
    pub fn may_have_profile_data(&self, func: &BinaryFunction) -> bool {
        if self.opts.match_with_function_hash {
            return true;
        }
        for name in func.names() {
            if self.profile_function_names.contains(name.as_str()) {
                return true;
            }
        }
        for name in func.names() {
            if let Some(common) = names::lto_common_name(name) {
                if self.lto_common_name_map.contains_key(common) {
                    return true;
                }
            }
        }
        false
    }

    /// Load and validate the document, resolve record names against the
    /// binary, and assign preliminary execution counts.
    pub fn preprocess_profile(&mut self, ctx: &mut BinaryContext) -> Result<()> {
        let doc = ProfileDocument::load(&self.path)?;
        doc.validate()?;
        self.doc = doc;

        self.build_name_maps(ctx);

        // Preliminary counts double as duplicate detection: a second record
        // resolving to the same function sees it already counted.
        for index in 0..self.doc.functions.len() {
            let Some(func) = self.profile_bfs[index] else {
                continue;
            };
            if !ctx.function(func).has_profile() {
                let exec_count = self.doc.functions[index].exec_count;
                ctx.function_mut(func).set_execution_count(exec_count);
            } else {
                if self.opts.verbosity >= 1 {
                    warn!(
                        "dropping duplicate profile for {}",
                        self.doc.functions[index].name
                    );
                }
                self.profile_bfs[index] = None;
            }
        }

        Ok(())
    }

    fn build_name_maps(&mut self, ctx: &BinaryContext) {
        self.profile_bfs.reserve(self.doc.functions.len());

        for (index, record) in self.doc.functions.iter().enumerate() {
            let name = names::strip_disambiguator(&record.name);
            self.profile_function_names.insert(name.to_string());
            let func = ctx
                .get_binary_data_by_name(name)
                .and_then(|data| ctx.get_function_for_symbol(data.symbol()));
            self.profile_bfs.push(func);
            if let Some(common) = names::lto_common_name(name) {
                self.lto_common_name_map
                    .entry(common.to_string())
                    .or_default()
                    .push(index);
            }
        }

        for (name, func) in ctx.function_symbols() {
            if let Some(common) = names::lto_common_name(name) {
                self.lto_common_name_function_map
                    .entry(common.to_string())
                    .or_default()
                    .insert(func);
            }
        }
    }

    /// Bind a record to a binary function.
    pub(crate) fn claim(&mut self, record_index: usize, func: FunctionId) {
        debug_assert!(!self.profiled_functions.contains(&func));
        let id = self.doc.functions[record_index].id as usize;
        if id >= self.profile_to_function.len() {
            self.profile_to_function.resize(id + 1, None);
        }
        self.profile_to_function[id] = Some(func);
        self.used[record_index] = true;
        self.profiled_functions.insert(func);
    }

    fn profile_matches(
        &self,
        record_index: usize,
        ctx: &mut BinaryContext,
        func: FunctionId,
        is_dfs: bool,
        hash_function: HashFunction,
    ) -> bool {
        let record = &self.doc.functions[record_index];
        if self.opts.ignore_hash {
            return record.num_basic_blocks as usize == ctx.function(func).num_blocks();
        }
        record.hash == ctx.function_mut(func).compute_hash(is_dfs, hash_function)
    }

    /// Run the matcher cascade and propagate counts onto every bound pair.
    pub fn read_profile(&mut self, ctx: &mut BinaryContext) -> Result<()> {
        info!(
            "reading profile with {} hash function",
            match self.doc.header.hash_function {
                HashFunction::StdHash => "std",
                HashFunction::Xxh3 => "xxh3",
            }
        );

        let num_records = self.doc.functions.len();
        self.profile_to_function = vec![None; num_records + 1];
        self.used = vec![false; num_records];

        let is_dfs = self.opts.use_dfs || self.doc.header.is_dfs_order;
        let hash_function = self.doc.header.hash_function;

        if self.opts.match_with_function_hash {
            for func in 0..ctx.num_functions() {
                ctx.function_mut(func).compute_hash(is_dfs, hash_function);
            }
        } else if !self.opts.ignore_hash {
            for index in 0..num_records {
                if let Some(func) = self.profile_bfs[index] {
                    ctx.function_mut(func).compute_hash(is_dfs, hash_function);
                }
            }
        }

        self.match_exact(ctx, is_dfs, hash_function);
        if self.opts.match_with_function_hash {
            self.match_with_hash(ctx);
        }
        self.match_lto_common_names(ctx, is_dfs, hash_function);
        self.match_residual();
        if self.opts.name_similarity_threshold > 0 {
            self.stats.matched_with_name_similarity = self.match_with_name_similarity(ctx);
        }

        if self.opts.verbosity >= 1 {
            for index in 0..num_records {
                if !self.used[index] {
                    warn!(
                        "profile ignored for function {}",
                        self.doc.functions[index].name
                    );
                }
            }
        }

        info!(
            "matched {} functions with identical names, {} with hash, {} with LTO common names, {} with similar names",
            self.stats.matched_with_exact_name,
            self.stats.matched_with_hash,
            self.stats.matched_with_lto_common_name,
            self.stats.matched_with_name_similarity
        );

        self.normalize_by_insn_count = self.uses_event("cycles") || self.uses_event("instructions");
        self.normalize_by_calls = self.uses_event("branches");

        let mut num_unused = 0;
        for index in 0..num_records {
            let id = self.doc.functions[index].id as usize;
            if id >= self.profile_to_function.len() {
                num_unused += 1;
                continue;
            }
            match self.profile_to_function[id] {
                Some(func) => {
                    let record = &self.doc.functions[index];
                    self.attach_function_profile(ctx, func, record);
                }
                None => num_unused += 1,
            }
        }
        self.stats.unused_profiles = num_unused;
        ctx.set_num_unused_profiled_objects(num_unused);

        if self.opts.lite && self.opts.match_with_function_hash {
            for func in 0..ctx.num_functions() {
                if !ctx.function(func).has_profile() {
                    ctx.function_mut(func).set_ignored();
                }
            }
        }

        Ok(())
    }

    /// Records whose name resolved to a function, matched by fingerprint
    /// (or block count). The preliminary count is cleared first so only
    /// propagation decides the final value.
    fn match_exact(&mut self, ctx: &mut BinaryContext, is_dfs: bool, hash_function: HashFunction) {
        for index in 0..self.doc.functions.len() {
            let Some(func) = self.profile_bfs[index] else {
                continue;
            };
            ctx.function_mut(func).set_execution_count(COUNT_NO_PROFILE);
            if self.profile_matches(index, ctx, func, is_dfs, hash_function) {
                self.claim(index, func);
                self.stats.matched_with_exact_name += 1;
            }
        }
    }

    /// Leftover records matched to the first binary function with the same
    /// fingerprint; recovers identical, renamed functions. Colliding
    /// fingerprints keep the last function seen.
    fn match_with_hash(&mut self, ctx: &mut BinaryContext) {
        let mut hash_to_function: HashMap<u64, FunctionId> =
            HashMap::with_capacity(ctx.num_functions());
        for (func, function) in ctx.functions() {
            if let Some(hash) = function.hash() {
                hash_to_function.insert(hash, func);
            }
        }

        for index in 0..self.doc.functions.len() {
            if self.used[index] {
                continue;
            }
            let Some(&func) = hash_to_function.get(&self.doc.functions[index].hash) else {
                continue;
            };
            if self.profiled_functions.contains(&func) {
                continue;
            }
            self.claim(index, func);
            self.stats.matched_with_hash += 1;
        }
    }

    /// Name-ambiguous matching for LTO-privatized functions: records and
    /// functions sharing an LTO common name are paired by fingerprint, or
    /// unconditionally when the bucket is one-to-one.
    fn match_lto_common_names(
        &mut self,
        ctx: &mut BinaryContext,
        is_dfs: bool,
        hash_function: HashFunction,
    ) {
        let buckets: Vec<(String, Vec<usize>)> = self
            .lto_common_name_map
            .iter()
            .map(|(common, records)| (common.clone(), records.clone()))
            .collect();

        for (common, records) in buckets {
            let Some(funcs) = self.lto_common_name_function_map.get(&common) else {
                continue;
            };
            let funcs: Vec<FunctionId> = funcs.iter().copied().collect();

            let mut bucket_matched = false;
            for &index in &records {
                if self.used[index] {
                    continue;
                }
                let mut chosen = None;
                for &func in &funcs {
                    if self.profiled_functions.contains(&func) {
                        continue;
                    }
                    if self.profile_matches(index, ctx, func, is_dfs, hash_function) {
                        chosen = Some(func);
                        break;
                    }
                }
                if let Some(func) = chosen {
                    self.claim(index, func);
                    self.stats.matched_with_lto_common_name += 1;
                    bucket_matched = true;
                    break;
                }
            }

            // A one-to-one bucket binds even without a fingerprint match.
            if !bucket_matched && records.len() == 1 && funcs.len() == 1 {
                let index = records[0];
                let func = funcs[0];
                if !self.used[index] && !self.profiled_functions.contains(&func) {
                    self.claim(index, func);
                    self.stats.matched_with_lto_common_name += 1;
                }
            }
        }
    }

    /// Remaining name-resolved pairs bind on the name alone; shape
    /// mismatches are left for stale-profile inference to reconcile.
    fn match_residual(&mut self) {
        for index in 0..self.doc.functions.len() {
            let Some(func) = self.profile_bfs[index] else {
                continue;
            };
            if self.used[index] || self.profiled_functions.contains(&func) {
                continue;
            }
            self.claim(index, func);
        }
    }
}

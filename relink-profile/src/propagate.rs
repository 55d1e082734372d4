//! Count propagation: stamps one matched record's execution, branch, and
//! call-site counts onto the bound function's CFG.

use relink_binary::{
    BinaryContext, CallProfileEntry, FunctionId, InstructionKind, ANNOTATION_COUNT,
    ANNOTATION_CTC_MISPRED_COUNT, ANNOTATION_CTC_TAKEN_COUNT, COUNT_NO_PROFILE,
};
use tracing::warn;

use crate::document::FunctionProfile;
use crate::reader::ProfileReader;

impl ProfileReader {
    /// Propagate `profile` onto `func`. Returns whether the profile applied
    /// cleanly, possibly after stale-profile inference. Empty functions are
    /// trivially matched.
    pub fn attach_function_profile(
        &self,
        ctx: &mut BinaryContext,
        func: FunctionId,
        profile: &FunctionProfile,
    ) -> bool {
        let is_dfs = self.opts.use_dfs || self.doc.header.is_dfs_order;
        let hash_function = self.doc.header.hash_function;
        let sample_mode = self.doc.header.is_sample();
        let func_name = ctx.function(func).name().to_string();

        let mut profile_matched = true;
        let mut mismatched_blocks = 0u64;
        let mut mismatched_calls = 0u64;
        let mut mismatched_edges = 0u64;
        let mut function_execution_count = 0u64;

        ctx.function_mut(func).set_execution_count(profile.exec_count);

        let raw_branch_count = profile
            .blocks
            .iter()
            .flat_map(|block| block.successors.iter())
            .map(|succ| succ.count)
            .sum();
        ctx.function_mut(func).set_raw_branch_count(raw_branch_count);

        if ctx.function(func).is_empty() {
            return true;
        }

        if !self.opts.ignore_hash {
            let hash = ctx.function_mut(func).compute_hash(is_dfs, hash_function);
            if profile.hash != hash {
                if self.opts.verbosity >= 1 {
                    warn!("function hash mismatch for {func_name}");
                }
                profile_matched = false;
            }
        }

        if profile.num_basic_blocks as usize != ctx.function(func).num_blocks() {
            if self.opts.verbosity >= 1 {
                warn!("number of basic blocks mismatch for {func_name}");
            }
            profile_matched = false;
        }

        let order = if is_dfs {
            ctx.function(func).dfs_order()
        } else {
            ctx.function(func).layout_order()
        };

        for yaml_block in &profile.blocks {
            let index = yaml_block.index as usize;
            if index >= order.len() {
                if self.opts.verbosity >= 2 {
                    warn!(
                        "block index {} out of bounds in {func_name}",
                        yaml_block.index
                    );
                }
                mismatched_blocks += 1;
                continue;
            }
            let block = order[index];

            // Sample profiles carry no branch data; scale events into a
            // block count instead.
            if sample_mode {
                if yaml_block.event_count == 0 {
                    ctx.function_mut(func).block_mut(block).set_execution_count(0);
                    continue;
                }
                let mut samples = yaml_block.event_count * 1000;
                let non_pseudos = ctx.function(func).num_non_pseudo_instructions(block);
                if self.normalize_by_insn_count && non_pseudos > 0 {
                    samples /= non_pseudos;
                } else if self.normalize_by_calls {
                    samples /= ctx.function(func).num_calls(block) + 1;
                }
                ctx.function_mut(func)
                    .block_mut(block)
                    .set_execution_count(samples);
                if ctx.function(func).block(block).is_entry_point() {
                    function_execution_count += samples;
                }
                continue;
            }

            ctx.function_mut(func)
                .block_mut(block)
                .set_execution_count(yaml_block.exec_count);

            for call_site in &yaml_block.call_sites {
                let callee = if (call_site.dest_id as usize) < self.profile_to_function.len() {
                    self.profile_to_function[call_site.dest_id as usize]
                } else {
                    None
                };
                let callee_symbol = callee.and_then(|callee| {
                    ctx.function(callee)
                        .symbol_for_entry_id(call_site.entry_discriminator)
                });

                ctx.function_mut(func).record_call_site(
                    callee_symbol,
                    call_site.count,
                    call_site.mispreds,
                    call_site.offset as u64,
                );

                let (input_offset, original_size) = {
                    let bb = ctx.function(func).block(block);
                    (bb.input_offset(), bb.original_size())
                };
                if call_site.offset as u64 >= original_size {
                    if self.opts.verbosity >= 2 {
                        warn!(
                            "call offset {} out of bounds in {func_name}",
                            call_site.offset
                        );
                    }
                    mismatched_calls += 1;
                    continue;
                }

                let offset = input_offset + call_site.offset as u64;
                let Some(kind) = ctx
                    .function(func)
                    .instruction_at_offset(offset)
                    .map(|inst| inst.kind())
                else {
                    if self.opts.verbosity >= 2 {
                        warn!("no instruction at offset {} in {func_name}", call_site.offset);
                    }
                    mismatched_calls += 1;
                    continue;
                };

                let is_call = matches!(kind, InstructionKind::Call { .. });
                let is_indirect_branch = matches!(kind, InstructionKind::IndirectBranch);
                if !is_call && !is_indirect_branch {
                    if self.opts.verbosity >= 2 {
                        warn!("expected call at offset {} in {func_name}", call_site.offset);
                    }
                    mismatched_calls += 1;
                    continue;
                }

                let indirect = is_indirect_branch
                    || matches!(kind, InstructionKind::Call { indirect: true, .. });
                let conditional_tail = matches!(
                    kind,
                    InstructionKind::Call {
                        conditional_tail: true,
                        ..
                    }
                );

                if let Some(inst) = ctx.function_mut(func).instruction_at_offset_mut(offset) {
                    if indirect {
                        inst.call_profile_mut().push(CallProfileEntry {
                            symbol: callee_symbol,
                            count: call_site.count,
                            mispreds: call_site.mispreds,
                        });
                    } else if conditional_tail {
                        for (name, value) in [
                            (ANNOTATION_CTC_TAKEN_COUNT, call_site.count),
                            (ANNOTATION_CTC_MISPRED_COUNT, call_site.mispreds),
                        ] {
                            if !inst.set_count_annotation(name, value) && self.opts.verbosity >= 1 {
                                warn!(
                                    "ignoring duplicate {name} info for offset {:#x} in function {func_name}",
                                    call_site.offset
                                );
                            }
                        }
                    } else if !inst.set_count_annotation(ANNOTATION_COUNT, call_site.count)
                        && self.opts.verbosity >= 1
                    {
                        warn!(
                            "ignoring duplicate {ANNOTATION_COUNT} info for offset {:#x} in function {func_name}",
                            call_site.offset
                        );
                    }
                }
            }

            for successor in &yaml_block.successors {
                let index = successor.index as usize;
                if index >= order.len() {
                    if self.opts.verbosity >= 1 {
                        warn!("successor index {} out of bounds in {func_name}", successor.index);
                    }
                    mismatched_edges += 1;
                    continue;
                }

                let mut to_block = order[index];
                if !ctx.function(func).block(block).has_successor(to_block) {
                    // The recorded edge no longer exists directly; allow a
                    // single-successor fallthrough block to pass it through.
                    let fallthrough = ctx.function(func).block(block).conditional_successor(false);
                    let pass_through = fallthrough.filter(|&ft| {
                        let ft_block = ctx.function(func).block(ft);
                        ft_block.successors().len() == 1 && ft_block.has_successor(to_block)
                    });
                    let Some(ft) = pass_through else {
                        if self.opts.verbosity >= 1 {
                            warn!(
                                "no successor of block {} matches index {} in {func_name}",
                                yaml_block.index, successor.index
                            );
                        }
                        mismatched_edges += 1;
                        continue;
                    };
                    if let Some(info) = ctx.function_mut(func).block_mut(ft).branch_info_mut(to_block)
                    {
                        info.count += successor.count;
                        info.mispredicted_count += successor.mispreds;
                    }
                    to_block = ft;
                }

                match ctx
                    .function_mut(func)
                    .block_mut(block)
                    .branch_info_mut(to_block)
                {
                    Some(info) => {
                        info.count += successor.count;
                        info.mispredicted_count += successor.mispreds;
                    }
                    None => mismatched_edges += 1,
                }
            }
        }

        // Blocks the profile never mentioned count as never executed.
        for block in 0..ctx.function(func).num_blocks() {
            if ctx.function(func).block(block).execution_count() == COUNT_NO_PROFILE {
                ctx.function_mut(func).block_mut(block).set_execution_count(0);
            }
        }

        if sample_mode {
            ctx.function_mut(func)
                .set_execution_count(function_execution_count);
        }

        profile_matched &=
            mismatched_blocks == 0 && mismatched_calls == 0 && mismatched_edges == 0;

        if !profile_matched {
            if self.opts.verbosity >= 1 {
                warn!(
                    "{mismatched_blocks} blocks, {mismatched_calls} calls, and {mismatched_edges} edges in profile did not match function {func_name}"
                );
            }

            if profile.num_basic_blocks as usize != ctx.function(func).num_blocks() {
                ctx.stats.num_stale_funcs_with_equal_block_count += 1;
            }

            if self.opts.infer_stale_profile {
                if let Some(inference) = &self.opts.stale_inference {
                    if inference.infer(ctx, func, profile) {
                        profile_matched = true;
                    }
                }
            }
        }

        if profile_matched {
            ctx.function_mut(func)
                .mark_profiled(self.doc.header.profile_flags());
        }

        profile_matched
    }
}

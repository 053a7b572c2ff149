//! Body splicing
//!
//! Sequences are inserted immediately before an anchor instruction. Anchors
//! are instruction identities, so existing branches and handler boundaries
//! keep pointing at the same instructions. New locals are appended to the
//! slot pool and `max_stack` is recomputed after every insertion.
//!
//! A method is instrumented in two phases: [`plan_method`] synthesizes every
//! sequence and collects every anchor, then [`apply_plan`] validates all
//! anchors before splicing any of them. A failure in either phase leaves the
//! method untouched.
//!
//! A return that closes a protected region or handler is not an exit site:
//! code spliced before it would sit inside the region, after the `leave` or
//! `endfinally` that skips to it, and never run.

use crate::error::{HelperError, SpliceError, WeaveError, WeaveResult};
use crate::synth::{build_entry_sequence, build_exit_sequence, InjectionSequence};
use logweave_il::{compute_max_stack, FieldRef, InstrId, MethodBody, MethodDef, MethodRef};
use rustc_hash::FxHashSet;
use tracing::{debug, trace};

/// Locals are addressed by a 16-bit slot index
const MAX_LOCALS: usize = u16::MAX as usize + 1;

/// Insert `sequence` immediately before `anchor` in `method`'s body
pub fn insert_before(
    method: &mut MethodDef,
    anchor: InstrId,
    sequence: InjectionSequence,
) -> Result<(), SpliceError> {
    let returns_value = method.returns_value();
    let name = method.name.clone();
    let body = method
        .body
        .as_mut()
        .ok_or_else(|| SpliceError::NoBody {
            method: name.clone(),
        })?;

    if !body.instructions.contains(anchor) {
        return Err(SpliceError::UnknownAnchor {
            method: name,
            anchor,
        });
    }
    if body.locals.len() + sequence.new_locals.len() > MAX_LOCALS {
        return Err(SpliceError::TooManyLocals { method: name });
    }

    let added_depth = sequence.max_depth()?;
    for local in sequence.new_locals {
        body.add_local(local)?;
    }
    body.instructions
        .insert_all_before(anchor, sequence.instructions)?;

    body.max_stack = match compute_max_stack(body, returns_value) {
        Ok(required) => body.max_stack.max(required),
        Err(err) => {
            // The sequence is balanced, so the old bound plus its own peak
            // still covers every path.
            trace!(method = %name, error = %err, "flow analysis failed, widening max stack");
            body.max_stack
                .saturating_add(u16::try_from(added_depth).unwrap_or(u16::MAX))
        }
    };
    Ok(())
}

/// Exit logging availability for a pass
#[derive(Debug, Clone, Copy)]
pub enum ExitMode<'a> {
    /// Entry logging only
    Disabled,
    /// Log before every return
    Enabled {
        empty_array: &'a MethodRef,
        message: &'a str,
    },
    /// Exit logging was requested but its helper could not be resolved
    Unavailable(&'a HelperError),
}

/// Every sequence for one method, with its anchor
#[derive(Debug, Clone)]
pub struct MethodPlan {
    /// Entry sequence, anchored at the first original instruction
    pub entry: (InstrId, InjectionSequence),
    /// One exit sequence per original return
    pub exits: Vec<(InstrId, InjectionSequence)>,
}

/// Instructions that end a protected region or a handler
fn region_ends(body: &MethodBody) -> FxHashSet<InstrId> {
    body.handlers
        .iter()
        .flat_map(|handler| handler.try_end.into_iter().chain(handler.handler_end))
        .collect()
}

/// Synthesize every sequence for `method` without modifying it
///
/// Return sites are collected here, before any insertion, so the sequences
/// spliced later are never rescanned. Returns that end a region are left
/// alone.
pub fn plan_method(
    method: &MethodDef,
    logger: &FieldRef,
    callable: &MethodRef,
    exit: ExitMode<'_>,
) -> WeaveResult<MethodPlan> {
    let body = method.body.as_ref().ok_or_else(|| SpliceError::NoBody {
        method: method.name.clone(),
    })?;
    let first = body
        .instructions
        .first()
        .ok_or_else(|| SpliceError::EmptyBody {
            method: method.name.clone(),
        })?;

    let entry = (first, build_entry_sequence(method, logger, callable)?);

    let exits = match exit {
        ExitMode::Disabled => Vec::new(),
        ExitMode::Unavailable(err) => return Err(WeaveError::Helper(err.clone())),
        ExitMode::Enabled {
            empty_array,
            message,
        } => {
            let region_ends = region_ends(body);
            body.return_sites()
                .into_iter()
                .filter(|site| {
                    let closes_region = region_ends.contains(site);
                    if closes_region {
                        debug!(
                            method = %method.name,
                            site = %site,
                            "return ends an exception region, no exit log"
                        );
                    }
                    !closes_region
                })
                .map(|site| {
                    (
                        site,
                        build_exit_sequence(logger, callable, empty_array, message),
                    )
                })
                .collect()
        }
    };

    Ok(MethodPlan { entry, exits })
}

/// What [`apply_plan`] inserted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    pub entry: bool,
    pub exit_sites: usize,
}

/// Splice a plan into `method`
///
/// Every anchor is checked before the first insertion. The entry sequence
/// goes in first, so when the first instruction is also a return the entry
/// log precedes the exit log.
pub fn apply_plan(method: &mut MethodDef, plan: MethodPlan) -> Result<Applied, SpliceError> {
    {
        let body = method.body.as_ref().ok_or_else(|| SpliceError::NoBody {
            method: method.name.clone(),
        })?;
        let anchors = std::iter::once(plan.entry.0).chain(plan.exits.iter().map(|(id, _)| *id));
        for anchor in anchors {
            if !body.instructions.contains(anchor) {
                return Err(SpliceError::UnknownAnchor {
                    method: method.name.clone(),
                    anchor,
                });
            }
        }
        let new_locals = plan.entry.1.new_locals.len()
            + plan.exits.iter().map(|(_, s)| s.new_locals.len()).sum::<usize>();
        if body.locals.len() + new_locals > MAX_LOCALS {
            return Err(SpliceError::TooManyLocals {
                method: method.name.clone(),
            });
        }
    }

    let (entry_anchor, entry) = plan.entry;
    insert_before(method, entry_anchor, entry)?;

    let exit_sites = plan.exits.len();
    for (anchor, sequence) in plan.exits {
        insert_before(method, anchor, sequence)?;
    }

    Ok(Applied {
        entry: true,
        exit_sites,
    })
}

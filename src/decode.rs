//! The decode driver: walks a format spec against an input, populating a
//! result builder tree, then freezes it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;

use crate::builder::ResultBuilder;
use crate::codec::InputDecodeCache;
use crate::context::ContextStack;
use crate::err::Result;
use crate::input::ScanInput;
use crate::result::{ResultType, ScanResult};
use crate::scanner::Format;
use crate::spec::FormatSpec;

/// Cooperative cancellation flag shared between a decode job and its owner.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(crate::err::ScanError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Per-decode driver state threaded through `spec_decode`.
pub struct DecodeState<'a> {
    pub(crate) scopes: ContextStack,
    cache: &'a InputDecodeCache,
    cancel: CancelToken,
}

impl<'a> DecodeState<'a> {
    pub fn new(cache: &'a InputDecodeCache, cancel: CancelToken) -> Self {
        DecodeState {
            scopes: ContextStack::new(),
            cache,
            cancel,
        }
    }

    pub fn scopes(&self) -> &ContextStack {
        &self.scopes
    }

    pub fn scopes_mut(&mut self) -> &mut ContextStack {
        &mut self.scopes
    }

    pub fn cache(&self) -> &InputDecodeCache {
        self.cache
    }

    pub fn cancel(&self) -> &CancelToken {
        &self.cancel
    }
}

/// Decode `format` at `position` of `input` into a frozen result tree.
///
/// A fatal decode status is data on the returned tree, not an error; only
/// I/O failures and cancellation surface as `Err`.
pub fn decode_format(
    format: &Format,
    input: &Arc<ScanInput>,
    position: u64,
    cache: &InputDecodeCache,
    cancel: &CancelToken,
) -> Result<ScanResult> {
    let mut builder = ResultBuilder::new(
        ResultType::Format,
        Arc::clone(input),
        format.order(),
        position,
        format.name().to_owned(),
        Some(Arc::clone(format.spec())),
    );
    let mut state = DecodeState::new(cache, cancel.clone());
    let decoded = setup_and_decode(format.spec(), &mut state, &mut builder, position)?;
    debug!(
        "format `{}` decoded {} bytes at offset {} of `{}` (fatal: {})",
        format.name(),
        decoded,
        position,
        input.path(),
        builder.is_fatal()
    );
    Ok(builder.to_result())
}

/// Run a result spec's decode inside a fresh context scope.
///
/// The scope is popped on every exit path; on success the builder end is
/// pushed out to cover the consumed range, the late-bound title is
/// evaluated, and the scope is snapshotted onto the builder and merged into
/// the enclosing scope.
pub(crate) fn setup_and_decode(
    spec: &Arc<dyn FormatSpec>,
    state: &mut DecodeState<'_>,
    builder: &mut ResultBuilder,
    position: u64,
) -> Result<u64> {
    state.scopes.push_scope();
    let outcome = spec.spec_decode(state, builder, position);
    if let Ok(decoded) = &outcome {
        builder.update_end(builder.end().max(position + decoded));
        match spec.title(&state.scopes) {
            Ok(Some(title)) => builder.update_title(title),
            Ok(None) => {}
            Err(err) => builder.update_decode_status(crate::result::DecodeStatus::warning(
                format!("failed to evaluate result title: {err}"),
            )),
        }
    }
    let scope = state.scopes.pop_scope();
    builder.set_context(state.scopes.snapshot_with(&scope));
    state.scopes.merge_child(scope);
    outcome
}

/// Shared child step for composite specs.
///
/// Result children decode through a nested builder whose fatal status is
/// copied onto the parent; in-place children decode directly and get a
/// `ResultSection` recorded. Returns `None` once the builder has turned
/// fatal, in which case the child's consumption does not count.
pub(crate) fn decode_child(
    spec: &Arc<dyn FormatSpec>,
    state: &mut DecodeState<'_>,
    builder: &mut ResultBuilder,
    position: u64,
) -> Result<Option<u64>> {
    state.cancel.check()?;
    let decoded = if spec.is_result() {
        let (decoded, fatal) = {
            let child = builder.add_result(spec.result_type(), position, Arc::clone(spec));
            let decoded = setup_and_decode(spec, state, child, position)?;
            (decoded, child.fatal_status().cloned())
        };
        if let Some(status) = fatal {
            builder.update_decode_status(status);
        }
        decoded
    } else {
        spec.spec_decode(state, builder, position)?
    };
    if builder.is_fatal() {
        return Ok(None);
    }
    if !spec.is_result() {
        builder.add_section(Arc::clone(spec), position, position + decoded);
    }
    Ok(Some(decoded))
}

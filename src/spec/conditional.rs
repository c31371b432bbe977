//! Conditional spec: a predicate over the active context selects a branch.

use std::sync::Arc;

use crate::builder::ResultBuilder;
use crate::context::ContextStack;
use crate::decode::{decode_child, DecodeState};
use crate::err::{Result, ScanError};
use crate::input::Endianness;
use crate::render::{RenderMode, Renderer};
use crate::result::{DecodeStatus, ScanResult};
use crate::spec::FormatSpec;

type Predicate = Box<dyn Fn(&ContextStack) -> Result<bool> + Send + Sync>;

pub struct ConditionalSpec {
    predicate: Predicate,
    then_spec: Arc<dyn FormatSpec>,
    else_spec: Option<Arc<dyn FormatSpec>>,
}

impl ConditionalSpec {
    pub fn new(
        predicate: impl Fn(&ContextStack) -> Result<bool> + Send + Sync + 'static,
        then_spec: Arc<dyn FormatSpec>,
    ) -> Self {
        ConditionalSpec {
            predicate: Box::new(predicate),
            then_spec,
            else_spec: None,
        }
    }

    pub fn or_else(mut self, else_spec: Arc<dyn FormatSpec>) -> Self {
        self.else_spec = Some(else_spec);
        self
    }

    fn branch(&self, scopes: &ContextStack) -> Result<Option<&Arc<dyn FormatSpec>>> {
        if (self.predicate)(scopes)? {
            Ok(Some(&self.then_spec))
        } else {
            Ok(self.else_spec.as_ref())
        }
    }
}

impl FormatSpec for ConditionalSpec {
    // Branch selection needs context, which prefix matching does not have.
    fn match_size(&self) -> usize {
        0
    }

    fn matches(&self, _buf: &[u8], _order: Endianness) -> bool {
        false
    }

    fn is_fixed_size(&self) -> bool {
        false
    }

    fn spec_decode(
        &self,
        state: &mut DecodeState<'_>,
        builder: &mut ResultBuilder,
        position: u64,
    ) -> Result<u64> {
        let branch = match self.branch(state.scopes()) {
            Ok(branch) => branch.cloned(),
            Err(ScanError::UnboundAttribute { name }) => {
                builder.update_decode_status(DecodeStatus::fatal(format!(
                    "conditional depends on unbound attribute `{name}`"
                )));
                return Ok(0);
            }
            Err(err) => return Err(err),
        };
        match branch {
            Some(spec) => Ok(decode_child(&spec, state, builder, position)?.unwrap_or(0)),
            None => Ok(0),
        }
    }

    fn spec_render(
        &self,
        result: &ScanResult,
        start: u64,
        end: u64,
        scopes: &ContextStack,
        renderer: &mut Renderer<'_>,
    ) -> Result<()> {
        match self.branch(scopes) {
            Ok(Some(spec)) if !spec.is_result() => {
                spec.spec_render(result, start, end, scopes, renderer)
            }
            Ok(_) => Ok(()),
            // A missing context value is reported inline, never a crash.
            Err(err) => {
                renderer.write_text(RenderMode::Error, format!("warning: {err}"))?;
                renderer.write_break()
            }
        }
    }
}

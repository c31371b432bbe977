//! Union spec: ordered alternatives, first prefix match wins.

use std::sync::Arc;

use crate::builder::ResultBuilder;
use crate::context::ContextStack;
use crate::decode::{decode_child, DecodeState};
use crate::err::Result;
use crate::input::Endianness;
use crate::render::{RenderMode, Renderer};
use crate::result::{DecodeStatus, ScanResult};
use crate::spec::FormatSpec;

pub struct UnionSpec {
    alternatives: Vec<Arc<dyn FormatSpec>>,
}

impl UnionSpec {
    pub fn new() -> Self {
        UnionSpec {
            alternatives: Vec::new(),
        }
    }

    pub fn alternative(mut self, spec: Arc<dyn FormatSpec>) -> Self {
        assert!(
            spec.match_size() > 0,
            "union alternatives must be prefix-matchable"
        );
        self.alternatives.push(spec);
        self
    }

    /// The alternative selected at `position`, if any. Pure, so decode and
    /// render agree on the choice.
    fn select<'a>(
        &'a self,
        result_input: &crate::input::ScanInput,
        position: u64,
        order: Endianness,
    ) -> Option<&'a Arc<dyn FormatSpec>> {
        self.alternatives.iter().find(|alternative| {
            let match_size = alternative.match_size();
            let prefix = result_input.read_prefix(position, match_size);
            prefix.len() >= match_size && alternative.matches(prefix, order)
        })
    }
}

impl Default for UnionSpec {
    fn default() -> Self {
        UnionSpec::new()
    }
}

impl FormatSpec for UnionSpec {
    /// The smallest alternative window; `matches` re-checks each
    /// alternative against its own window.
    fn match_size(&self) -> usize {
        self.alternatives
            .iter()
            .map(|alternative| alternative.match_size())
            .min()
            .unwrap_or(0)
    }

    fn matches(&self, buf: &[u8], order: Endianness) -> bool {
        self.alternatives.iter().any(|alternative| {
            let match_size = alternative.match_size();
            buf.len() >= match_size && alternative.matches(&buf[..match_size], order)
        })
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
        let input = Arc::clone(builder.input());
        let selected = self.select(&input, position, builder.order()).cloned();
        match selected {
            Some(alternative) => {
                Ok(decode_child(&alternative, state, builder, position)?.unwrap_or(0))
            }
            None => {
                builder.update_decode_status(DecodeStatus::fatal(format!(
                    "no union alternative matches at offset {position}"
                )));
                Ok(0)
            }
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
        match self.select(result.input(), start, result.order()) {
            Some(alternative) if !alternative.is_result() => {
                alternative.spec_render(result, start, end, scopes, renderer)
            }
            // Result alternatives render through their own `render` calls.
            Some(_) => Ok(()),
            None => {
                renderer.write_text(
                    RenderMode::Error,
                    "warning: no union alternative matches this region",
                )?;
                renderer.write_break()
            }
        }
    }
}

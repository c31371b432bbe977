//! The immutable result tree produced by a finished decode.

use std::fmt;
use std::sync::Arc;

use crate::context::{ContextStack, ResultContext};
use crate::err::Result;
use crate::input::{Endianness, ScanInput};
use crate::render::{render_hex_view, RenderMode, Renderer};
use crate::spec::FormatSpec;

/// Bytes of a result shown by the default hex view before eliding.
const DEFAULT_RENDER_LIMIT: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultType {
    Format,
    EncodedInput,
    Input,
}

/// Decode anomaly attached to a result. Fatal statuses short-circuit the
/// enclosing sequence; warnings are rendered but do not alter consumption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeStatus {
    fatal: bool,
    message: String,
}

impl DecodeStatus {
    pub fn fatal(message: impl Into<String>) -> Self {
        DecodeStatus {
            fatal: true,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        DecodeStatus {
            fatal: false,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for DecodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fatal {
            write!(f, "decode failed: {}", self.message)
        } else {
            write!(f, "warning: {}", self.message)
        }
    }
}

/// Span recorded for a spec that is not itself a result but still renders a
/// contribution.
#[derive(Clone)]
pub struct ResultSection {
    pub(crate) spec: Arc<dyn FormatSpec>,
    pub start: u64,
    pub end: u64,
}

impl ResultSection {
    pub fn render(
        &self,
        result: &ScanResult,
        scopes: &ContextStack,
        renderer: &mut Renderer<'_>,
    ) -> Result<()> {
        self.spec
            .spec_render(result, self.start, self.end, scopes, renderer)
    }
}

impl fmt::Debug for ResultSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultSection")
            .field("start", &self.start)
            .field("end", &self.end)
            .finish()
    }
}

/// One frozen node of the result hierarchy.
pub struct ScanResult {
    pub(crate) result_type: ResultType,
    pub(crate) input: Arc<ScanInput>,
    pub(crate) order: Endianness,
    pub(crate) start: u64,
    pub(crate) end: u64,
    pub(crate) title: String,
    pub(crate) statuses: Vec<DecodeStatus>,
    pub(crate) children: Vec<ScanResult>,
    pub(crate) context: ResultContext,
    pub(crate) sections: Vec<ResultSection>,
    pub(crate) renderable: Option<Arc<dyn FormatSpec>>,
}

impl ScanResult {
    pub fn result_type(&self) -> ResultType {
        self.result_type
    }

    pub fn input(&self) -> &Arc<ScanInput> {
        &self.input
    }

    pub fn order(&self) -> Endianness {
        self.order
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn size(&self) -> u64 {
        self.end - self.start
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn children(&self) -> &[ScanResult] {
        &self.children
    }

    pub fn context(&self) -> &ResultContext {
        &self.context
    }

    pub fn sections(&self) -> &[ResultSection] {
        &self.sections
    }

    pub fn decode_statuses(&self) -> &[DecodeStatus] {
        &self.statuses
    }

    pub fn is_fatal(&self) -> bool {
        self.statuses.iter().any(DecodeStatus::is_fatal)
    }

    /// First section recorded for `spec` that starts inside `[from, to)`.
    /// Identity-based: repeated uses of one spec are disambiguated by the
    /// position bound the caller maintains.
    pub fn find_section(
        &self,
        spec: &Arc<dyn FormatSpec>,
        from: u64,
        to: u64,
    ) -> Option<&ResultSection> {
        self.sections.iter().find(|section| {
            Arc::ptr_eq(&section.spec, spec) && section.start >= from && section.end <= to
        })
    }

    /// First non-INPUT child starting at or after `from`.
    pub fn find_child(&self, from: u64) -> Option<&ScanResult> {
        self.children
            .iter()
            .find(|child| child.result_type != ResultType::Input && child.start >= from)
    }

    /// Render this result: re-enter the snapshot context, invoke the
    /// renderable, fall back to a hex view when nothing was emitted, and
    /// always emit the decode status last.
    pub fn render(&self, renderer: &mut Renderer<'_>) -> Result<()> {
        let scopes = ContextStack::for_render(&self.context);
        if let Some(renderable) = &self.renderable {
            renderable.spec_render(self, self.start, self.end, &scopes, renderer)?;
        }
        if !renderer.has_output() {
            self.render_default(renderer)?;
        }
        self.render_decode_status(renderer)?;
        renderer.close()
    }

    /// The hex view fallback.
    pub fn render_default(&self, renderer: &mut Renderer<'_>) -> Result<()> {
        render_hex_view(
            &self.input,
            self.start,
            self.end,
            DEFAULT_RENDER_LIMIT,
            renderer,
        )
    }

    pub fn render_decode_status(&self, renderer: &mut Renderer<'_>) -> Result<()> {
        for status in &self.statuses {
            renderer.write_text(RenderMode::Error, status.to_string())?;
            renderer.write_break()?;
        }
        Ok(())
    }
}

// The renderable is a spec trait object without Debug; summarize the rest.
impl fmt::Debug for ScanResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanResult")
            .field("type", &self.result_type)
            .field("title", &self.title)
            .field("start", &self.start)
            .field("end", &self.end)
            .field("statuses", &self.statuses)
            .field("children", &self.children)
            .finish()
    }
}

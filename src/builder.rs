//! Mutable accumulator for the result hierarchy of a single decode.
//!
//! Builders are never handed to renderers; `to_result` freezes the tree into
//! immutable `ScanResult` nodes once decoding is done.

use std::fmt;
use std::sync::Arc;

use crate::context::ResultContext;
use crate::input::{Endianness, ScanInput};
use crate::result::{DecodeStatus, ResultSection, ResultType, ScanResult};
use crate::spec::FormatSpec;

pub struct ResultBuilder {
    result_type: ResultType,
    input: Arc<ScanInput>,
    order: Endianness,
    start: u64,
    end: u64,
    title: String,
    renderable: Option<Arc<dyn FormatSpec>>,
    statuses: Vec<DecodeStatus>,
    children: Vec<ResultBuilder>,
    sections: Vec<ResultSection>,
    context: ResultContext,
}

impl ResultBuilder {
    pub(crate) fn new(
        result_type: ResultType,
        input: Arc<ScanInput>,
        order: Endianness,
        start: u64,
        title: String,
        renderable: Option<Arc<dyn FormatSpec>>,
    ) -> Self {
        ResultBuilder {
            result_type,
            input,
            order,
            start,
            end: start,
            title,
            renderable,
            statuses: Vec::new(),
            children: Vec::new(),
            sections: Vec::new(),
            context: ResultContext::default(),
        }
    }

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

    /// Effective end: children push the end out past any explicit update.
    pub fn end(&self) -> u64 {
        self.end.max(self.children_end())
    }

    pub fn size(&self) -> u64 {
        self.end() - self.start
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn update_end(&mut self, end: u64) {
        assert!(end >= self.start, "end {} precedes start {}", end, self.start);
        self.end = end;
    }

    pub fn update_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    /// INPUT children live in their own coordinate space and do not count.
    fn children_end(&self) -> u64 {
        self.children
            .iter()
            .filter(|child| child.result_type != ResultType::Input)
            .map(ResultBuilder::end)
            .max()
            .unwrap_or(self.start)
    }

    /// Record or escalate the decode status. At most one fatal status is
    /// kept; warnings accumulate.
    pub fn update_decode_status(&mut self, status: DecodeStatus) {
        if status.is_fatal() && self.is_fatal() {
            return;
        }
        self.statuses.push(status);
    }

    pub fn decode_statuses(&self) -> &[DecodeStatus] {
        &self.statuses
    }

    pub fn fatal_status(&self) -> Option<&DecodeStatus> {
        self.statuses.iter().find(|status| status.is_fatal())
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal_status().is_some()
    }

    /// Open a nested FORMAT or ENCODED_INPUT result at `start`.
    pub fn add_result(
        &mut self,
        result_type: ResultType,
        start: u64,
        renderable: Arc<dyn FormatSpec>,
    ) -> &mut ResultBuilder {
        assert!(
            self.result_type != ResultType::Input,
            "INPUT results do not take nested results"
        );
        assert!(
            matches!(result_type, ResultType::Format | ResultType::EncodedInput),
            "nested results must be FORMAT or ENCODED_INPUT"
        );
        assert!(
            start >= self.start,
            "child start {} precedes parent start {}",
            start,
            self.start
        );
        self.children.push(ResultBuilder::new(
            result_type,
            Arc::clone(&self.input),
            self.order,
            start,
            String::new(),
            Some(renderable),
        ));
        self.children.last_mut().expect("child was just appended")
    }

    /// Attach a decoded or sliced input as an INPUT child spanning the whole
    /// derived input.
    pub fn add_input(&mut self, input: Arc<ScanInput>) {
        let size = input.size();
        let title = input.path().to_owned();
        let mut child = ResultBuilder::new(
            ResultType::Input,
            input,
            self.order,
            0,
            title,
            None,
        );
        child.update_end(size);
        self.children.push(child);
    }

    /// Record a render contribution for an in-place (non-result) spec.
    pub fn add_section(&mut self, spec: Arc<dyn FormatSpec>, start: u64, end: u64) {
        assert!(start <= end, "section end {} precedes start {}", end, start);
        self.sections.push(ResultSection { spec, start, end });
    }

    pub(crate) fn set_context(&mut self, context: ResultContext) {
        self.context = context;
    }

    /// Freeze the builder tree. Children of size zero are dropped; the node
    /// this is called on is always produced, so a failed root keeps its
    /// status. Non-consuming, and idempotent up to structural equality.
    pub fn to_result(&self) -> ScanResult {
        ScanResult {
            result_type: self.result_type,
            input: Arc::clone(&self.input),
            order: self.order,
            start: self.start,
            end: self.end(),
            title: self.title.clone(),
            statuses: self.statuses.clone(),
            children: self
                .children
                .iter()
                .filter(|child| child.size() > 0)
                .map(ResultBuilder::to_result)
                .collect(),
            context: self.context.clone(),
            sections: self.sections.clone(),
            renderable: self.renderable.clone(),
        }
    }
}

impl fmt::Debug for ResultBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultBuilder")
            .field("type", &self.result_type)
            .field("title", &self.title)
            .field("start", &self.start)
            .field("end", &self.end())
            .field("children", &self.children)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> ResultBuilder {
        let input = ScanInput::from_bytes("mem", vec![0u8; 64]);
        ResultBuilder::new(
            ResultType::Format,
            input,
            Endianness::Little,
            8,
            "root".to_owned(),
            None,
        )
    }

    #[test]
    fn test_end_tracks_children() {
        let mut root = builder();
        root.update_end(16);
        let spec: Arc<dyn FormatSpec> = Arc::new(crate::spec::ByteRangeSpec::fixed("pad", 4));
        let child = root.add_result(ResultType::Format, 12, spec);
        child.update_end(24);
        assert_eq!(root.end(), 24);
        root.update_end(32);
        assert_eq!(root.end(), 32);
    }

    #[test]
    #[should_panic(expected = "precedes start")]
    fn test_end_before_start_is_refused() {
        let mut root = builder();
        root.update_end(4);
    }

    #[test]
    #[should_panic(expected = "INPUT results do not take nested results")]
    fn test_input_builders_refuse_results() {
        let mut root = builder();
        root.add_input(ScanInput::from_bytes("decoded", &b"xyz"[..]));
        let spec: Arc<dyn FormatSpec> = Arc::new(crate::spec::ByteRangeSpec::fixed("pad", 4));
        root.children[0].add_result(ResultType::Format, 0, spec);
    }

    #[test]
    fn test_empty_children_are_dropped_but_root_is_kept() {
        let mut root = builder();
        let spec: Arc<dyn FormatSpec> = Arc::new(crate::spec::ByteRangeSpec::fixed("pad", 4));
        root.add_result(ResultType::Format, 8, Arc::clone(&spec));
        let kept = root.add_result(ResultType::Format, 8, spec);
        kept.update_end(10);
        root.update_decode_status(DecodeStatus::fatal("boom"));

        let result = root.to_result();
        assert_eq!(result.children().len(), 1);
        assert_eq!(result.children()[0].size(), 2);
        assert!(result.is_fatal());
        // An empty root is still produced.
        let empty = builder().to_result();
        assert_eq!(empty.size(), 0);
    }

    #[test]
    fn test_to_result_is_idempotent() {
        let mut root = builder();
        root.update_end(20);
        root.update_decode_status(DecodeStatus::warning("odd padding"));
        let first = root.to_result();
        let second = root.to_result();
        assert_eq!(format!("{first:?}"), format!("{second:?}"));
    }
}

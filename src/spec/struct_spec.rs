//! Struct spec: a consecutive list of format specs.

use std::sync::Arc;

use crate::builder::ResultBuilder;
use crate::context::ContextStack;
use crate::decode::{decode_child, DecodeState};
use crate::err::Result;
use crate::input::Endianness;
use crate::render::Renderer;
use crate::result::{ResultType, ScanResult};
use crate::spec::{FormatSpec, ValueExpression};

pub struct StructSpec {
    specs: Vec<Arc<dyn FormatSpec>>,
    result: bool,
    result_type: ResultType,
    title: Option<ValueExpression<String>>,
}

impl StructSpec {
    pub fn new() -> Self {
        StructSpec {
            specs: Vec::new(),
            result: false,
            result_type: ResultType::Format,
            title: None,
        }
    }

    pub fn append(mut self, spec: Arc<dyn FormatSpec>) -> Self {
        self.specs.push(spec);
        self
    }

    /// Mark this struct as producing a FORMAT child result with a
    /// late-bound title.
    pub fn as_result(mut self, title: impl Into<ValueExpression<String>>) -> Self {
        self.result = true;
        self.title = Some(title.into());
        self
    }
}

impl Default for StructSpec {
    fn default() -> Self {
        StructSpec::new()
    }
}

impl FormatSpec for StructSpec {
    /// Prefix sizes accumulate up to and including the first non-fixed-size
    /// spec, and stop (exclusive) at the first spec that opts out of
    /// matching. Downstream formats depend on exactly this probing window.
    fn match_size(&self) -> usize {
        let mut match_size = 0;
        for spec in &self.specs {
            let spec_match_size = spec.match_size();
            if spec_match_size == 0 {
                break;
            }
            match_size += spec_match_size;
            if !spec.is_fixed_size() {
                break;
            }
        }
        match_size
    }

    fn matches(&self, buf: &[u8], order: Endianness) -> bool {
        let mut matches = false;
        let mut offset = 0;
        for spec in &self.specs {
            let spec_match_size = spec.match_size();
            if spec_match_size == 0 {
                break;
            }
            if buf.len() < offset + spec_match_size {
                return false;
            }
            matches = spec.matches(&buf[offset..offset + spec_match_size], order);
            if !matches {
                break;
            }
            if !spec.is_fixed_size() {
                break;
            }
            offset += spec_match_size;
        }
        matches
    }

    fn is_fixed_size(&self) -> bool {
        self.specs.iter().all(|spec| spec.is_fixed_size())
    }

    fn is_result(&self) -> bool {
        self.result
    }

    fn result_type(&self) -> ResultType {
        self.result_type
    }

    fn title(&self, scopes: &ContextStack) -> Result<Option<String>> {
        match &self.title {
            Some(title) => title.eval(scopes).map(Some),
            None => Ok(None),
        }
    }

    fn spec_decode(
        &self,
        state: &mut DecodeState<'_>,
        builder: &mut ResultBuilder,
        position: u64,
    ) -> Result<u64> {
        let mut decoded = 0;
        let mut spec_position = position;
        for spec in &self.specs {
            match decode_child(spec, state, builder, spec_position)? {
                Some(spec_decoded) => {
                    decoded += spec_decoded;
                    spec_position += spec_decoded;
                }
                None => break,
            }
        }
        Ok(decoded)
    }

    fn spec_render(
        &self,
        result: &ScanResult,
        start: u64,
        end: u64,
        scopes: &ContextStack,
        renderer: &mut Renderer<'_>,
    ) -> Result<()> {
        let mut cursor = start;
        for spec in &self.specs {
            if spec.is_result() {
                // Child results render through their own `render` calls.
                if let Some(child) = result.find_child(cursor) {
                    cursor = child.end();
                }
                continue;
            }
            if let Some(section) = result.find_section(spec, cursor, end) {
                let section_end = section.end;
                section.render(result, scopes, renderer)?;
                cursor = section_end;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{spec, ByteRangeSpec, NumberAttribute, StringAttribute};

    #[test]
    fn test_match_size_stops_at_first_non_fixed_spec_inclusive() {
        let chunk = spec(NumberAttribute::<u32>::new("chunk length"));
        let composed = StructSpec::new()
            .append(spec(NumberAttribute::<u32>::new("signature").final_value(1)))
            .append(spec(crate::spec::ArraySpec::while_matches(chunk)))
            .append(spec(NumberAttribute::<u32>::new("trailer")));
        // 4, plus the non-fixed array's own probe window, and no further.
        assert_eq!(composed.match_size(), 8);
        assert!(!composed.is_fixed_size());
    }

    #[test]
    fn test_variable_payload_stops_probing() {
        let len = Arc::new(NumberAttribute::<u16>::new("length").bind());
        let composed = StructSpec::new()
            .append(spec(NumberAttribute::<u32>::new("signature").final_value(1)))
            .append(len.clone())
            .append(spec(ByteRangeSpec::fixed("reserved", 8)))
            .append(spec(ByteRangeSpec::sized("payload", len.value_expr())))
            .append(spec(NumberAttribute::<u32>::new("trailer")));
        // 4 + 2 + 8, then the late-bound payload opts out of probing.
        assert_eq!(composed.match_size(), 14);
        assert!(!composed.is_fixed_size());
    }

    #[test]
    fn test_match_size_stops_exclusive_at_zero_match_size() {
        let name = StringAttribute::new("name", 4u64, encoding_rs::UTF_8);
        // Strings never prefix-match, so accumulation stops before them.
        let composed = StructSpec::new()
            .append(spec(NumberAttribute::<u16>::new("tag")))
            .append(spec(name))
            .append(spec(NumberAttribute::<u16>::new("after")));
        assert_eq!(composed.match_size(), 2);
    }

    #[test]
    fn test_matches_walks_fixed_prefix() {
        let composed = StructSpec::new()
            .append(spec(NumberAttribute::<u16>::new("magic").final_value(0xCAFE)))
            .append(spec(NumberAttribute::<u16>::new("version")));
        assert_eq!(composed.match_size(), 4);
        assert!(composed.matches(&[0xFE, 0xCA, 0x01, 0x00], Endianness::Little));
        assert!(!composed.matches(&[0xFE, 0xCB, 0x01, 0x00], Endianness::Little));
    }
}

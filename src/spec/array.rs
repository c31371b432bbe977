//! Array spec: repeat an element spec a counted number of times, or for as
//! long as its prefix keeps matching.

use std::sync::Arc;

use crate::builder::ResultBuilder;
use crate::context::ContextStack;
use crate::decode::{decode_child, DecodeState};
use crate::err::{Result, ScanError};
use crate::input::Endianness;
use crate::render::Renderer;
use crate::result::{DecodeStatus, ScanResult};
use crate::spec::{FormatSpec, ValueExpression};

enum ArrayLength {
    Count(ValueExpression<u64>),
    WhileMatches,
}

pub struct ArraySpec {
    element: Arc<dyn FormatSpec>,
    length: ArrayLength,
}

impl ArraySpec {
    pub fn counted(element: Arc<dyn FormatSpec>, count: impl Into<ValueExpression<u64>>) -> Self {
        ArraySpec {
            element,
            length: ArrayLength::Count(count.into()),
        }
    }

    /// Repeat while the element's prefix matches; stops at the first
    /// non-match or when fewer prefix bytes remain.
    pub fn while_matches(element: Arc<dyn FormatSpec>) -> Self {
        assert!(
            element.match_size() > 0,
            "a while-matches array needs a prefix-matchable element"
        );
        ArraySpec {
            element,
            length: ArrayLength::WhileMatches,
        }
    }
}

impl FormatSpec for ArraySpec {
    fn match_size(&self) -> usize {
        self.element.match_size()
    }

    fn matches(&self, buf: &[u8], order: Endianness) -> bool {
        self.element.matches(buf, order)
    }

    // Element count is late-bound in general; probing stops here.
    fn is_fixed_size(&self) -> bool {
        false
    }

    fn spec_decode(
        &self,
        state: &mut DecodeState<'_>,
        builder: &mut ResultBuilder,
        position: u64,
    ) -> Result<u64> {
        let count = match &self.length {
            ArrayLength::Count(expr) => match expr.eval(state.scopes()) {
                Ok(count) => Some(count),
                Err(ScanError::UnboundAttribute { name }) => {
                    builder.update_decode_status(DecodeStatus::fatal(format!(
                        "array count depends on unbound attribute `{name}`"
                    )));
                    return Ok(0);
                }
                Err(err) => return Err(err),
            },
            ArrayLength::WhileMatches => None,
        };

        let mut decoded = 0;
        let mut element_position = position;
        let mut index = 0u64;
        loop {
            match count {
                Some(count) => {
                    if index >= count {
                        break;
                    }
                }
                None => {
                    let match_size = self.element.match_size();
                    let prefix = builder.input().read_prefix(element_position, match_size);
                    if prefix.len() < match_size
                        || !self.element.matches(prefix, builder.order())
                    {
                        break;
                    }
                }
            }
            match decode_child(&self.element, state, builder, element_position)? {
                // A zero-size element would never advance; stop.
                Some(0) => break,
                Some(element_decoded) => {
                    decoded += element_decoded;
                    element_position += element_decoded;
                    index += 1;
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
        if self.element.is_result() {
            // Element results render through their own `render` calls.
            return Ok(());
        }
        let mut cursor = start;
        while let Some(section) = result.find_section(&self.element, cursor, end) {
            let section_end = section.end;
            section.render(result, scopes, renderer)?;
            if section_end <= cursor {
                break;
            }
            cursor = section_end;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::InputDecodeCache;
    use crate::decode::CancelToken;
    use crate::input::ScanInput;
    use crate::result::ResultType;
    use crate::spec::{spec, NumberAttribute};

    fn decode_over(bytes: &'static [u8], array: &ArraySpec) -> (ResultBuilder, u64) {
        let cache = InputDecodeCache::new();
        let mut state = DecodeState::new(&cache, CancelToken::new());
        state.scopes_mut().push_scope();
        let mut builder = ResultBuilder::new(
            ResultType::Format,
            ScanInput::from_bytes("mem", bytes),
            Endianness::Little,
            0,
            "test".to_owned(),
            None,
        );
        let decoded = array.spec_decode(&mut state, &mut builder, 0).unwrap();
        (builder, decoded)
    }

    #[test]
    fn test_counted_array_decodes_each_element() {
        let element = spec(NumberAttribute::<u16>::new("value"));
        let array = ArraySpec::counted(element, 3u64);
        let (builder, decoded) = decode_over(&[1, 0, 2, 0, 3, 0, 4, 0], &array);
        assert_eq!(decoded, 6);
        assert!(!builder.is_fatal());
    }

    #[test]
    fn test_counted_array_stops_at_truncation() {
        let element = spec(NumberAttribute::<u16>::new("value"));
        let array = ArraySpec::counted(element, 4u64);
        let (builder, decoded) = decode_over(&[1, 0, 2, 0, 3], &array);
        // Two whole elements, then the third turns the builder fatal.
        assert_eq!(decoded, 4);
        assert!(builder.is_fatal());
    }

    #[test]
    fn test_while_matches_stops_at_the_first_non_match() {
        let element = spec(NumberAttribute::<u8>::new("tag").final_value(0xAA));
        let array = ArraySpec::while_matches(element);
        let (builder, decoded) = decode_over(&[0xAA, 0xAA, 0xAA, 0xBB, 0xAA], &array);
        assert_eq!(decoded, 3);
        assert!(!builder.is_fatal());
    }
}

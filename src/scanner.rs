//! Top-level scanning: probe registered formats against an input, decode
//! the matches, and follow every decoded input that surfaces.

use std::sync::Arc;

use log::debug;

use crate::codec::InputDecodeCache;
use crate::decode::{decode_format, CancelToken};
use crate::err::Result;
use crate::input::{Endianness, ScanInput};
use crate::result::{ResultType, ScanResult};
use crate::spec::FormatSpec;

/// Descriptor bootstrapping a decode: a name, a byte order, and the top
/// spec of the format.
pub struct Format {
    name: String,
    order: Endianness,
    spec: Arc<dyn FormatSpec>,
}

impl Format {
    pub fn new(name: impl Into<String>, order: Endianness, spec: Arc<dyn FormatSpec>) -> Self {
        Format {
            name: name.into(),
            order,
            spec,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn order(&self) -> Endianness {
        self.order
    }

    pub fn spec(&self) -> &Arc<dyn FormatSpec> {
        &self.spec
    }

    pub fn match_size(&self) -> usize {
        self.spec.match_size()
    }

    pub fn matches(&self, prefix: &[u8]) -> bool {
        let match_size = self.match_size();
        match_size > 0 && prefix.len() >= match_size && self.spec.matches(prefix, self.order)
    }
}

/// The scan of one input: the formats decoded at its start, and the scans
/// of every input those decodes produced.
#[derive(Debug)]
pub struct InputScan {
    pub input: Arc<ScanInput>,
    pub results: Vec<ScanResult>,
    pub nested: Vec<InputScan>,
}

#[derive(Default)]
pub struct FileScanner {
    formats: Vec<Format>,
    cache: InputDecodeCache,
    cancel: CancelToken,
}

impl FileScanner {
    pub fn new() -> Self {
        FileScanner::default()
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.formats.push(format);
        self
    }

    /// The token a caller keeps to interrupt running scans.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn decode_cache(&self) -> &InputDecodeCache {
        &self.cache
    }

    /// Probe every registered format at the start of `input`; decode the
    /// matches and recurse into the decoded inputs they produce.
    pub fn scan(&self, input: &Arc<ScanInput>) -> Result<InputScan> {
        self.cancel.check()?;
        let mut results = Vec::new();
        for format in &self.formats {
            let match_size = format.match_size();
            if match_size == 0 {
                continue;
            }
            let prefix = input.read_prefix(0, match_size);
            if !format.matches(prefix) {
                continue;
            }
            debug!("input `{}` matches format `{}`", input.path(), format.name());
            results.push(decode_format(format, input, 0, &self.cache, &self.cancel)?);
        }

        let mut nested_inputs = Vec::new();
        for result in &results {
            collect_decoded_inputs(result, &mut nested_inputs);
        }
        let mut nested = Vec::new();
        for nested_input in nested_inputs {
            nested.push(self.scan(&nested_input)?);
        }
        Ok(InputScan {
            input: Arc::clone(input),
            results,
            nested,
        })
    }
}

fn collect_decoded_inputs(result: &ScanResult, out: &mut Vec<Arc<ScanInput>>) {
    for child in result.children() {
        if child.result_type() == ResultType::Input {
            out.push(Arc::clone(child.input()));
        }
        collect_decoded_inputs(child, out);
    }
}

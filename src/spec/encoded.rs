//! Encoded section spec: a region whose bytes must be decoded (or sliced)
//! to yield a nested input.

use std::sync::Arc;

use log::warn;

use crate::builder::ResultBuilder;
use crate::codec::DecodeParams;
use crate::context::ContextStack;
use crate::decode::DecodeState;
use crate::err::{Result, ScanError};
use crate::input::Endianness;
use crate::render::Renderer;
use crate::result::{DecodeStatus, ResultType, ScanResult};
use crate::spec::{FormatSpec, ValueExpression};

pub struct EncodedFormatSpec {
    params: ValueExpression<DecodeParams>,
}

impl EncodedFormatSpec {
    pub fn new(params: impl Into<ValueExpression<DecodeParams>>) -> Self {
        EncodedFormatSpec {
            params: params.into(),
        }
    }
}

impl FormatSpec for EncodedFormatSpec {
    fn match_size(&self) -> usize {
        0
    }

    fn matches(&self, _buf: &[u8], _order: Endianness) -> bool {
        false
    }

    fn is_fixed_size(&self) -> bool {
        false
    }

    fn is_result(&self) -> bool {
        true
    }

    fn result_type(&self) -> ResultType {
        ResultType::EncodedInput
    }

    fn title(&self, scopes: &ContextStack) -> Result<Option<String>> {
        self.params
            .eval(scopes)
            .map(|params| Some(params.encoded_name().to_owned()))
    }

    fn spec_decode(
        &self,
        state: &mut DecodeState<'_>,
        builder: &mut ResultBuilder,
        position: u64,
    ) -> Result<u64> {
        let params = match self.params.eval(state.scopes()) {
            Ok(params) => params,
            Err(ScanError::UnboundAttribute { name }) => {
                builder.update_decode_status(DecodeStatus::fatal(format!(
                    "encoded section depends on unbound attribute `{name}`"
                )));
                return Ok(0);
            }
            Err(err) => return Err(err),
        };
        let input = Arc::clone(builder.input());
        let encoded_size = params.encoded_size();
        let decoded;
        let decoded_input = match params.new_decoder() {
            Some(mut decoder) => {
                let outcome = state.cache().decode_input(
                    &input,
                    position,
                    decoder.as_mut(),
                    params.decoded_path(),
                    state.cancel(),
                );
                match outcome {
                    Ok((decoded_input, total_in)) => {
                        decoded = total_in.max(encoded_size.unwrap_or(0));
                        decoded_input
                    }
                    Err(ScanError::DecoderFailed { name, source }) => {
                        builder.update_decode_status(DecodeStatus::fatal(format!(
                            "decoder `{name}` failed at offset {position}: {source}"
                        )));
                        return Ok(0);
                    }
                    Err(err) => return Err(err),
                }
            }
            None => {
                decoded = encoded_size.unwrap_or(0);
                let slice_end = position.checked_add(decoded);
                match slice_end.map(|end| input.slice(position, end, params.decoded_path())) {
                    Some(Ok(sliced)) => sliced,
                    Some(Err(ScanError::InvalidSlice { .. })) | None => {
                        builder.update_decode_status(DecodeStatus::fatal(format!(
                            "encoded section ({decoded} bytes) truncated at offset {position}"
                        )));
                        return Ok(0);
                    }
                    Some(Err(err)) => return Err(err),
                }
            }
        };
        if let Some(encoded_size) = encoded_size {
            if decoded > encoded_size {
                warn!(
                    "decoding exceeded the declared encoded size; {} additional bytes read",
                    decoded - encoded_size
                );
                builder.update_decode_status(DecodeStatus::warning(format!(
                    "decoding exceeded the declared encoded size; {} additional bytes read",
                    decoded - encoded_size
                )));
            }
        }
        builder.add_input(decoded_input);
        Ok(decoded)
    }

    fn spec_render(
        &self,
        _result: &ScanResult,
        _start: u64,
        _end: u64,
        scopes: &ContextStack,
        renderer: &mut Renderer<'_>,
    ) -> Result<()> {
        match self.params.eval(scopes) {
            Ok(params) => params.render(renderer),
            Err(err) => {
                renderer.write_text(
                    crate::render::RenderMode::Error,
                    format!("warning: {err}"),
                )?;
                renderer.write_break()
            }
        }
    }
}

#![deny(unused_must_use)]
#![forbid(unsafe_code)]
// Don't allow dbg! prints in release.
#![cfg_attr(not(debug_assertions), deny(clippy::dbg_macro))]

pub use builder::ResultBuilder;
pub use codec::{
    DecodeParams, Decoder, DecoderFactory, DeflateDecoder, InputDecodeCache, ZlibDecoder,
};
pub use context::{AttrValue, AttributeId, ContextStack, ResultContext};
pub use decode::{decode_format, CancelToken, DecodeState};
pub use input::{Endianness, InputReader, ScanInput};
pub use render::{
    HtmlRenderSink, InputStreamHandler, MediaStore, RenderMode, RenderSink, Renderer,
    StreamHandler, TextRenderSink,
};
pub use result::{DecodeStatus, ResultSection, ResultType, ScanResult};
pub use scanner::{FileScanner, Format, InputScan};

pub mod err;
pub mod formats;
pub mod spec;

mod builder;
mod codec;
mod context;
mod decode;
mod input;
mod render;
mod result;
mod scanner;

// For tests, we only initialize logging once.
#[cfg(test)]
use std::sync::Once;

#[cfg(test)]
static LOGGER_INIT: Once = Once::new();

use crc32fast::Hasher;

#[inline]
pub fn checksum_ieee(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

// Rust runs the tests concurrently, so unless we synchronize logging access
// it will crash when attempting to run `cargo test` with some logging facilities.
#[cfg(test)]
pub fn ensure_env_logger_initialized() {
    use std::io::Write;

    LOGGER_INIT.call_once(|| {
        let mut builder = env_logger::Builder::from_default_env();
        builder
            .format(|buf, record| writeln!(buf, "[{}] - {}", record.level(), record.args()))
            .init();
    });
}

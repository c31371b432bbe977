//! The codec bridge: streaming decoders behind a uniform contract, decode
//! parameters for encoded sections, and the fingerprint-keyed cache that
//! turns an encoded region into a derived input exactly once.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};

use log::trace;

use crate::decode::CancelToken;
use crate::err::{Result, ScanError};
use crate::input::ScanInput;

const COPY_CHUNK: usize = 64 * 1024;

/// A streaming decompressor. `decode` drains `src` into `sink` and reports
/// how many encoded bytes were consumed.
pub trait Decoder: Send {
    fn name(&self) -> &'static str;

    fn decode(
        &mut self,
        src: &mut dyn Read,
        sink: &mut dyn Write,
        cancel: &CancelToken,
    ) -> Result<u64>;
}

pub type DecoderFactory = Arc<dyn Fn() -> Box<dyn Decoder> + Send + Sync>;

/// Parameters of one encoded section, usually produced lazily from bound
/// attributes (method, sizes, entry name).
#[derive(Clone)]
pub struct DecodeParams {
    encoded_name: String,
    encoded_size: Option<u64>,
    decoder: Option<DecoderFactory>,
    decoded_path: String,
}

impl DecodeParams {
    pub fn new(
        encoded_name: impl Into<String>,
        encoded_size: Option<u64>,
        decoder: Option<DecoderFactory>,
        decoded_path: impl Into<String>,
    ) -> Self {
        DecodeParams {
            encoded_name: encoded_name.into(),
            encoded_size,
            decoder,
            decoded_path: decoded_path.into(),
        }
    }

    /// A section that is not compressed at all; the decoded input is a
    /// plain slice of the encoded bytes.
    pub fn stored(
        encoded_name: impl Into<String>,
        encoded_size: u64,
        decoded_path: impl Into<String>,
    ) -> Self {
        DecodeParams::new(encoded_name, Some(encoded_size), None, decoded_path)
    }

    pub fn encoded_name(&self) -> &str {
        &self.encoded_name
    }

    pub fn encoded_size(&self) -> Option<u64> {
        self.encoded_size
    }

    pub fn decoded_path(&self) -> &str {
        &self.decoded_path
    }

    pub fn new_decoder(&self) -> Option<Box<dyn Decoder>> {
        self.decoder.as_ref().map(|factory| factory())
    }

    pub(crate) fn render(
        &self,
        renderer: &mut crate::render::Renderer<'_>,
    ) -> Result<()> {
        use crate::render::RenderMode;
        renderer.write_text(RenderMode::Keyword, &self.encoded_name)?;
        match self.encoded_size {
            Some(size) => {
                renderer.write_text(RenderMode::Operator, ", ")?;
                renderer.write_text(RenderMode::Value, format!("{size} bytes"))?;
            }
            None => {
                renderer.write_text(RenderMode::Comment, " (unknown encoded size)")?;
            }
        }
        renderer.write_break()?;
        Ok(())
    }
}

impl std::fmt::Debug for DecodeParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeParams")
            .field("encoded_name", &self.encoded_name)
            .field("encoded_size", &self.encoded_size)
            .field("has_decoder", &self.decoder.is_some())
            .field("decoded_path", &self.decoded_path)
            .finish()
    }
}

fn copy_cancellable(
    name: &'static str,
    src: &mut dyn Read,
    sink: &mut dyn Write,
    cancel: &CancelToken,
) -> Result<()> {
    let mut buf = vec![0u8; COPY_CHUNK];
    loop {
        cancel.check()?;
        let n = match src.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(source) => return Err(ScanError::DecoderFailed { name, source }),
        };
        sink.write_all(&buf[..n])?;
    }
}

/// Raw DEFLATE.
#[derive(Debug, Default)]
pub struct DeflateDecoder;

impl Decoder for DeflateDecoder {
    fn name(&self) -> &'static str {
        "deflate"
    }

    fn decode(
        &mut self,
        src: &mut dyn Read,
        sink: &mut dyn Write,
        cancel: &CancelToken,
    ) -> Result<u64> {
        let mut decoder = flate2::read::DeflateDecoder::new(src);
        copy_cancellable(self.name(), &mut decoder, sink, cancel)?;
        Ok(decoder.total_in())
    }
}

/// DEFLATE wrapped in a zlib header/checksum.
#[derive(Debug, Default)]
pub struct ZlibDecoder;

impl Decoder for ZlibDecoder {
    fn name(&self) -> &'static str {
        "zlib"
    }

    fn decode(
        &mut self,
        src: &mut dyn Read,
        sink: &mut dyn Write,
        cancel: &CancelToken,
    ) -> Result<u64> {
        let mut decoder = flate2::read::ZlibDecoder::new(src);
        copy_cancellable(self.name(), &mut decoder, sink, cancel)?;
        Ok(decoder.total_in())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    path: String,
    position: u64,
    decoder: &'static str,
}

#[derive(Clone)]
struct CachedDecode {
    input: Arc<ScanInput>,
    total_in: u64,
}

/// Memoizes decoded inputs per (input path, position, decoder) fingerprint,
/// so replays during render observe the same derived input and the same
/// consumed count. The lock is held across the decode, which also keeps
/// concurrent decodes of one fingerprint from racing.
#[derive(Default)]
pub struct InputDecodeCache {
    entries: Mutex<HashMap<CacheKey, CachedDecode>>,
}

impl InputDecodeCache {
    pub fn new() -> Self {
        InputDecodeCache::default()
    }

    pub fn decode_input(
        &self,
        parent: &Arc<ScanInput>,
        position: u64,
        decoder: &mut dyn Decoder,
        decoded_path: &str,
        cancel: &CancelToken,
    ) -> Result<(Arc<ScanInput>, u64)> {
        let key = CacheKey {
            path: parent.path().to_owned(),
            position,
            decoder: decoder.name(),
        };
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(hit) = entries.get(&key) {
            trace!(
                "decode cache hit for `{}` at offset {} ({})",
                key.path,
                key.position,
                key.decoder
            );
            return Ok((Arc::clone(&hit.input), hit.total_in));
        }

        let mut src = parent.reader_at(position);
        let mut decoded = Vec::new();
        let total_in = decoder.decode(&mut src, &mut decoded, cancel)?;
        trace!(
            "decoded `{}` at offset {}: {} encoded -> {} decoded bytes",
            key.path,
            key.position,
            total_in,
            decoded.len()
        );
        let input = ScanInput::from_bytes(decoded_path, decoded);
        entries.insert(
            key,
            CachedDecode {
                input: Arc::clone(&input),
                total_in,
            },
        );
        Ok((input, total_in))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Raw deflate stream of b"hello world, hello scanner" (26 bytes).
    const DEFLATE_STREAM: &[u8] = &[
        0xcb, 0x48, 0xcd, 0xc9, 0xc9, 0x57, 0x28, 0xcf, 0x2f, 0xca, 0x49, 0xd1, 0x51, 0xc8, 0x00,
        0x73, 0x8a, 0x93, 0x13, 0xf3, 0xf2, 0x52, 0x8b, 0x00,
    ];

    #[test]
    fn test_deflate_decoder_reports_total_in() {
        let mut decoder = DeflateDecoder;
        let mut out = Vec::new();
        let total_in = decoder
            .decode(&mut &DEFLATE_STREAM[..], &mut out, &CancelToken::new())
            .unwrap();
        assert_eq!(out, b"hello world, hello scanner");
        assert_eq!(total_in, DEFLATE_STREAM.len() as u64);
    }

    #[test]
    fn test_cache_replays_the_same_input() {
        let mut bytes = DEFLATE_STREAM.to_vec();
        bytes.extend_from_slice(b"trailing");
        let input = ScanInput::from_bytes("outer", bytes);
        let cache = InputDecodeCache::new();
        let cancel = CancelToken::new();

        let (first, total_in) = cache
            .decode_input(&input, 0, &mut DeflateDecoder, "outer:deflate", &cancel)
            .unwrap();
        let (second, replay_total_in) = cache
            .decode_input(&input, 0, &mut DeflateDecoder, "outer:deflate", &cancel)
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(total_in, replay_total_in);
        assert_eq!(first.bytes(), b"hello world, hello scanner");
    }

    #[test]
    fn test_cancelled_decode_is_refused() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut out = Vec::new();
        assert!(matches!(
            DeflateDecoder.decode(&mut &DEFLATE_STREAM[..], &mut out, &cancel),
            Err(ScanError::Cancelled)
        ));
    }
}

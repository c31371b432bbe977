#![allow(dead_code)]

use std::sync::Once;

use binscan::{
    HtmlRenderSink, Renderer, ResultType, ScanInput, ScanResult, TextRenderSink,
};
use std::sync::Arc;

static LOGGER_INIT: Once = Once::new();

// Rust runs the tests concurrently, so unless we synchronize logging access
// it will crash when attempting to run `cargo test` with some logging facilities.
pub fn ensure_env_logger_initialized() {
    use std::io::Write;

    LOGGER_INIT.call_once(|| {
        let mut builder = env_logger::Builder::from_default_env();
        builder
            .format(|buf, record| writeln!(buf, "[{}] - {}", record.level(), record.args()))
            .init();
    });
}

/// Raw DEFLATE stream of `DEFLATE_PAYLOAD`.
pub const DEFLATE_STREAM: &[u8] = &[
    0xcb, 0x48, 0xcd, 0xc9, 0xc9, 0x57, 0x28, 0xcf, 0x2f, 0xca, 0x49, 0xd1, 0x51, 0xc8, 0x00,
    0x73, 0x8a, 0x93, 0x13, 0xf3, 0xf2, 0x52, 0x8b, 0x00,
];

pub const DEFLATE_PAYLOAD: &[u8] = b"hello world, hello scanner";

/// 1x1 grayscale PNG: signature, IHDR, IDAT, IEND.
pub const PNG_SAMPLE: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x00, 0x00, 0x00, 0x00, 0x3a,
    0x7e, 0x9b, 0x55, 0x00, 0x00, 0x00, 0x0a, 0x49, 0x44, 0x41, 0x54, 0x78, 0xda, 0x63, 0x68,
    0x00, 0x00, 0x00, 0x82, 0x00, 0x81, 0xda, 0x45, 0x08, 0x3b, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

/// A ZIP local file header with a stored (uncompressed) payload.
pub fn stored_zip_entry(name: &str, data: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(30 + name.len() + data.len());
    bytes.extend_from_slice(&0x0403_4b50u32.to_le_bytes());
    bytes.extend_from_slice(&20u16.to_le_bytes()); // version needed
    bytes.extend_from_slice(&0u16.to_le_bytes()); // flags
    bytes.extend_from_slice(&0u16.to_le_bytes()); // stored
    bytes.extend_from_slice(&0x6020u16.to_le_bytes()); // 12:01:00
    bytes.extend_from_slice(&0x5a21u16.to_le_bytes()); // 2025-01-01
    bytes.extend_from_slice(&binscan::checksum_ieee(data).to_le_bytes());
    bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&(name.len() as u16).to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes()); // no extra field
    bytes.extend_from_slice(name.as_bytes());
    bytes.extend_from_slice(data);
    bytes
}

/// A ZIP local file header with a DEFLATE payload.
pub fn deflated_zip_entry(name: &str, stream: &[u8], uncompressed: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(30 + name.len() + stream.len());
    bytes.extend_from_slice(&0x0403_4b50u32.to_le_bytes());
    bytes.extend_from_slice(&20u16.to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(&8u16.to_le_bytes()); // deflated
    bytes.extend_from_slice(&0x6020u16.to_le_bytes());
    bytes.extend_from_slice(&0x5a21u16.to_le_bytes());
    bytes.extend_from_slice(&binscan::checksum_ieee(uncompressed).to_le_bytes());
    bytes.extend_from_slice(&(stream.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&(uncompressed.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&(name.len() as u16).to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(name.as_bytes());
    bytes.extend_from_slice(stream);
    bytes
}

pub fn input_from(path: &str, bytes: impl Into<Vec<u8>>) -> Arc<ScanInput> {
    ScanInput::from_bytes(path, bytes.into())
}

pub fn render_to_text(result: &ScanResult) -> String {
    let mut sink = TextRenderSink::new(Vec::new());
    let mut renderer = Renderer::new(&mut sink);
    result.render(&mut renderer).unwrap();
    String::from_utf8(sink.into_inner()).unwrap()
}

pub fn render_to_html(result: &ScanResult) -> String {
    let mut sink = HtmlRenderSink::new(Vec::new());
    let mut renderer = Renderer::new(&mut sink);
    result.render(&mut renderer).unwrap();
    String::from_utf8(sink.into_inner()).unwrap()
}

/// Frozen-tree invariants: spans nest, non-INPUT children are strictly
/// ordered by start, and a parent's end covers its children.
pub fn assert_tree_invariants(result: &ScanResult) {
    assert!(
        result.start() <= result.end(),
        "span inverted on `{}`",
        result.title()
    );
    let mut previous_start: Option<u64> = None;
    for child in result.children() {
        if child.result_type() != ResultType::Input {
            assert!(
                child.start() >= result.start(),
                "child `{}` starts before its parent",
                child.title()
            );
            assert!(
                child.end() <= result.end(),
                "child `{}` ends past its parent",
                child.title()
            );
            if let Some(previous) = previous_start {
                assert!(
                    child.start() > previous,
                    "children of `{}` are not strictly ordered",
                    result.title()
                );
            }
            previous_start = Some(child.start());
        }
        assert_tree_invariants(child);
    }
}

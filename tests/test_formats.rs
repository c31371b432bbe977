mod fixtures;
use fixtures::*;

use binscan::{checksum_ieee, FileScanner, InputDecodeCache, ResultType};
use binscan::{decode_format, CancelToken};
use pretty_assertions::assert_eq;

#[test]
fn test_zip_stored_entry_produces_an_input_grandchild() {
    ensure_env_logger_initialized();
    let input = input_from("hello.zip", stored_zip_entry("hello.txt", b"hello"));
    let format = binscan::formats::zip::format();
    let result = decode_format(
        &format,
        &input,
        0,
        &InputDecodeCache::new(),
        &CancelToken::new(),
    )
    .unwrap();

    assert!(!result.is_fatal());
    assert_eq!(result.title(), "ZIP archive");
    assert_eq!(result.result_type(), ResultType::Format);
    assert_eq!(result.end(), input.size());
    assert_tree_invariants(&result);

    let entry = &result.children()[0];
    assert_eq!(entry.title(), "local file header \"hello.txt\"");
    let encoded = &entry.children()[0];
    assert_eq!(encoded.result_type(), ResultType::EncodedInput);
    assert_eq!(encoded.title(), "stored data");
    assert!(encoded.decode_statuses().is_empty());

    let decoded = &encoded.children()[0];
    assert_eq!(decoded.result_type(), ResultType::Input);
    assert_eq!(decoded.size(), 5);
    assert_eq!(decoded.input().bytes(), b"hello");
    assert_eq!(decoded.input().path(), "hello.txt");
}

#[test]
fn test_zip_deflated_entry_decodes_and_checksums() {
    ensure_env_logger_initialized();
    let input = input_from(
        "greeting.zip",
        deflated_zip_entry("greeting.txt", DEFLATE_STREAM, DEFLATE_PAYLOAD),
    );
    let format = binscan::formats::zip::format();
    let result = decode_format(
        &format,
        &input,
        0,
        &InputDecodeCache::new(),
        &CancelToken::new(),
    )
    .unwrap();

    assert!(!result.is_fatal());
    assert_eq!(result.end(), input.size());
    assert_tree_invariants(&result);

    let entry = &result.children()[0];
    assert_eq!(entry.title(), "local file header \"greeting.txt\"");
    let encoded = &entry.children()[0];
    assert_eq!(encoded.title(), "deflated data");
    // The declared compressed size matches what the decoder consumed.
    assert!(encoded.decode_statuses().is_empty());

    let decoded = &encoded.children()[0];
    assert_eq!(decoded.input().bytes(), DEFLATE_PAYLOAD);
    // The stored CRC covers the decoded payload.
    let stored_crc = u32::from_le_bytes(input.bytes()[14..18].try_into().unwrap());
    assert_eq!(checksum_ieee(decoded.input().bytes()), stored_crc);
}

#[test]
fn test_zip_entry_titles_rebind_per_entry() {
    ensure_env_logger_initialized();
    let mut bytes = stored_zip_entry("a.txt", b"first");
    bytes.extend_from_slice(&stored_zip_entry("b.txt", b"second"));
    let input = input_from("two.zip", bytes);
    let result = decode_format(
        &binscan::formats::zip::format(),
        &input,
        0,
        &InputDecodeCache::new(),
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(result.children().len(), 2);
    assert_eq!(result.children()[0].title(), "local file header \"a.txt\"");
    assert_eq!(result.children()[1].title(), "local file header \"b.txt\"");
    assert_tree_invariants(&result);
}

#[test]
fn test_png_decodes_all_chunks() {
    ensure_env_logger_initialized();
    let input = input_from("pixel.png", PNG_SAMPLE.to_vec());
    let result = decode_format(
        &binscan::formats::png::format(),
        &input,
        0,
        &InputDecodeCache::new(),
        &CancelToken::new(),
    )
    .unwrap();

    assert!(!result.is_fatal());
    assert_eq!(result.title(), "PNG image data");
    assert_eq!(result.end(), input.size());
    assert_tree_invariants(&result);

    let text = render_to_text(&result);
    assert!(text.contains("width = 1"));
    assert!(text.contains("height = 1"));
    assert!(text.contains("(grayscale)"));
    assert!(text.contains("\"IDAT\""));
    assert!(text.contains("\"IEND\""));
}

#[test]
fn test_scanner_follows_decoded_inputs() {
    ensure_env_logger_initialized();
    let input = input_from(
        "nested.zip",
        stored_zip_entry("pixel.png", PNG_SAMPLE),
    );
    let scanner = FileScanner::new()
        .with_format(binscan::formats::zip::format())
        .with_format(binscan::formats::png::format());

    let scan = scanner.scan(&input).unwrap();
    assert_eq!(scan.results.len(), 1);
    assert_eq!(scan.results[0].title(), "ZIP archive");
    assert_tree_invariants(&scan.results[0]);

    // The stored PNG surfaced as a decoded input and was scanned in turn.
    assert_eq!(scan.nested.len(), 1);
    let nested = &scan.nested[0];
    assert_eq!(nested.input.path(), "pixel.png");
    assert_eq!(nested.results.len(), 1);
    assert_eq!(nested.results[0].title(), "PNG image data");
    assert!(nested.nested.is_empty());
}

//! ZIP local file headers.
//!
//! Little-endian: a run of `PK\x03\x04` entries, each carrying a bound
//! compression method, sizes, and file name, followed by the entry payload
//! as an encoded section (stored slice or DEFLATE stream). The run stops at
//! the central directory, whose signature no longer matches.

use std::sync::Arc;

use bitflags::bitflags;
use chrono::{NaiveDate, NaiveTime};

use crate::codec::{DecodeParams, Decoder, DecoderFactory, DeflateDecoder};
use crate::context::ContextStack;
use crate::err::Result;
use crate::input::Endianness;
use crate::render::{RenderMode, Renderer};
use crate::scanner::Format;
use crate::spec::{
    spec, ArraySpec, ByteRangeSpec, EncodedFormatSpec, NumberAttribute, StringAttribute,
    StructSpec, SymbolAttribute, ValueExpression,
};

const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x0403_4b50;

const METHOD_STORED: u16 = 0;
const METHOD_DEFLATED: u16 = 8;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GpFlags: u16 {
        const ENCRYPTED = 0x0001;
        const COMPRESSION_OPTION_1 = 0x0002;
        const COMPRESSION_OPTION_2 = 0x0004;
        const DATA_DESCRIPTOR = 0x0008;
        const STRONG_ENCRYPTION = 0x0040;
        const UTF8 = 0x0800;
    }
}

fn render_gp_flags(value: &u16, renderer: &mut Renderer<'_>) -> Result<()> {
    let flags = GpFlags::from_bits_truncate(*value);
    if flags.is_empty() {
        return Ok(());
    }
    let names: Vec<&str> = flags.iter_names().map(|(name, _)| name).collect();
    renderer.write_text(RenderMode::Comment, format!(" ({})", names.join(" | ")))
}

fn render_dos_time(value: &u16, renderer: &mut Renderer<'_>) -> Result<()> {
    let hour = u32::from(value >> 11);
    let minute = u32::from((value >> 5) & 0x3f);
    let second = u32::from(value & 0x1f) * 2;
    match NaiveTime::from_hms_opt(hour, minute, second) {
        Some(time) => renderer.write_text(RenderMode::Comment, format!(" ({time})")),
        None => renderer.write_text(RenderMode::Comment, " (invalid time)"),
    }
}

fn render_dos_date(value: &u16, renderer: &mut Renderer<'_>) -> Result<()> {
    let year = 1980 + i32::from(value >> 9);
    let month = u32::from((value >> 5) & 0x0f);
    let day = u32::from(value & 0x1f);
    match NaiveDate::from_ymd_opt(year, month, day) {
        Some(date) => renderer.write_text(RenderMode::Comment, format!(" ({date})")),
        None => renderer.write_text(RenderMode::Comment, " (invalid date)"),
    }
}

fn local_file_header() -> StructSpec {
    let method = Arc::new(
        SymbolAttribute::<u16>::new("compression method")
            .symbol(METHOD_STORED, "stored")
            .symbol(1, "shrunk")
            .symbol(6, "imploded")
            .symbol(METHOD_DEFLATED, "deflated")
            .symbol(9, "deflate64")
            .symbol(12, "bzip2")
            .symbol(14, "lzma")
            .symbol(93, "zstd")
            .symbol(99, "AES encrypted")
            .bind(),
    );
    let compressed_size = Arc::new(NumberAttribute::<u32>::new("compressed size").bind());
    let name_length = Arc::new(NumberAttribute::<u16>::new("file name length").bind());
    let extra_length = Arc::new(NumberAttribute::<u16>::new("extra field length").bind());
    let file_name = Arc::new(
        StringAttribute::new("file name", name_length.value_expr(), encoding_rs::UTF_8).bind(),
    );

    let decode_params = {
        let method = Arc::clone(&method);
        let compressed_size = Arc::clone(&compressed_size);
        let file_name = Arc::clone(&file_name);
        ValueExpression::lazy(move |scopes: &ContextStack| {
            let method_value = method.get(scopes)?;
            let encoded_size = u64::from(compressed_size.get(scopes)?);
            let decoded_path = file_name.get(scopes)?;
            let encoded_name = match method_value {
                METHOD_STORED => "stored data".to_owned(),
                METHOD_DEFLATED => "deflated data".to_owned(),
                other => format!("compressed data (method {other})"),
            };
            // Methods without a decoder come through as a raw slice of the
            // declared compressed size.
            let decoder: Option<DecoderFactory> = match method_value {
                METHOD_DEFLATED => Some(Arc::new(|| {
                    Box::new(DeflateDecoder) as Box<dyn Decoder>
                })),
                _ => None,
            };
            Ok(DecodeParams::new(
                encoded_name,
                Some(encoded_size),
                decoder,
                decoded_path.as_ref(),
            ))
        })
    };

    let title = {
        let file_name = Arc::clone(&file_name);
        ValueExpression::lazy(move |scopes: &ContextStack| {
            Ok(format!("local file header \"{}\"", file_name.get(scopes)?))
        })
    };

    StructSpec::new()
        .append(spec(
            NumberAttribute::<u32>::new("signature")
                .final_value(LOCAL_FILE_HEADER_SIGNATURE)
                .hex(),
        ))
        .append(spec(NumberAttribute::<u16>::new(
            "version needed to extract",
        )))
        .append(spec(
            NumberAttribute::<u16>::new("general purpose bit flag")
                .hex()
                .with_renderer(render_gp_flags),
        ))
        .append(method.clone())
        .append(spec(
            NumberAttribute::<u16>::new("last modified time").with_renderer(render_dos_time),
        ))
        .append(spec(
            NumberAttribute::<u16>::new("last modified date").with_renderer(render_dos_date),
        ))
        .append(spec(NumberAttribute::<u32>::new("crc-32").hex()))
        .append(compressed_size.clone())
        .append(spec(NumberAttribute::<u32>::new("uncompressed size")))
        .append(name_length.clone())
        .append(extra_length.clone())
        .append(file_name.clone())
        .append(spec(ByteRangeSpec::sized(
            "extra field",
            extra_length.value_expr(),
        )))
        .append(spec(EncodedFormatSpec::new(decode_params)))
        .as_result(title)
}

pub fn format() -> Format {
    let entries = ArraySpec::while_matches(spec(local_file_header()));
    Format::new("ZIP archive", Endianness::Little, spec(entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_window_is_the_fixed_header_prefix() {
        let format = format();
        // Everything up to the late-bound file name is probe material.
        assert_eq!(format.match_size(), 30);
    }

    #[test]
    fn test_header_prefix_matches_on_signature_and_known_method() {
        let format = format();
        let mut prefix = vec![0u8; 30];
        prefix[..4].copy_from_slice(&LOCAL_FILE_HEADER_SIGNATURE.to_le_bytes());
        assert!(format.matches(&prefix));
        // Central directory signature must not match.
        prefix[..4].copy_from_slice(&0x0201_4b50u32.to_le_bytes());
        assert!(!format.matches(&prefix));
        // An unknown compression method is rejected by the symbol table.
        prefix[..4].copy_from_slice(&LOCAL_FILE_HEADER_SIGNATURE.to_le_bytes());
        prefix[8] = 0x55;
        assert!(!format.matches(&prefix));
    }
}

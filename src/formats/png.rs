//! PNG image data.
//!
//! Big-endian: an 8-byte signature, the fixed IHDR chunk, then a run of
//! length-prefixed chunks up to and including IEND.

use std::sync::Arc;

use crate::input::Endianness;
use crate::scanner::Format;
use crate::spec::{
    spec, ArraySpec, ByteRangeSpec, NumberAttribute, StringAttribute, StructSpec, SymbolAttribute,
};

const PNG_SIGNATURE: u64 = 0x8950_4e47_0d0a_1a0a;
const IHDR_TYPE: u32 = 0x4948_4452;

pub fn format() -> Format {
    let ihdr = StructSpec::new()
        .append(spec(
            NumberAttribute::<u32>::new("IHDR length").final_value(13),
        ))
        .append(spec(
            NumberAttribute::<u32>::new("chunk type")
                .final_value(IHDR_TYPE)
                .hex(),
        ))
        .append(spec(NumberAttribute::<u32>::new("width").bind()))
        .append(spec(NumberAttribute::<u32>::new("height").bind()))
        .append(spec(NumberAttribute::<u8>::new("bit depth")))
        .append(spec(
            SymbolAttribute::<u8>::new("color type")
                .symbol(0, "grayscale")
                .symbol(2, "truecolor")
                .symbol(3, "indexed-color")
                .symbol(4, "grayscale with alpha")
                .symbol(6, "truecolor with alpha"),
        ))
        .append(spec(NumberAttribute::<u8>::new("compression method")))
        .append(spec(NumberAttribute::<u8>::new("filter method")))
        .append(spec(
            SymbolAttribute::<u8>::new("interlace method")
                .symbol(0, "no interlace")
                .symbol(1, "Adam7"),
        ))
        .append(spec(NumberAttribute::<u32>::new("crc-32").hex()));

    let chunk_length = Arc::new(NumberAttribute::<u32>::new("chunk length").bind());
    let chunk = StructSpec::new()
        .append(chunk_length.clone())
        .append(spec(StringAttribute::new(
            "chunk type",
            4u64,
            encoding_rs::UTF_8,
        )))
        .append(spec(ByteRangeSpec::sized(
            "chunk data",
            chunk_length.value_expr(),
        )))
        .append(spec(NumberAttribute::<u32>::new("crc-32").hex()));

    let png = StructSpec::new()
        .append(spec(
            NumberAttribute::<u64>::new("signature")
                .final_value(PNG_SIGNATURE)
                .hex(),
        ))
        .append(spec(ihdr))
        .append(spec(ArraySpec::while_matches(spec(chunk))));

    Format::new("PNG image data", Endianness::Big, spec(png))
}

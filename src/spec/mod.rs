//! The declarative format-spec tree.
//!
//! A format is described as a composition of primitive attributes and
//! structural specs, all implementing the uniform [`FormatSpec`] contract.
//! Specs are shared as `Arc<dyn FormatSpec>`; the graph is immutable once
//! built, and all decode-time state lives in the builder tree and the
//! context stack.

use std::sync::Arc;

use crate::builder::ResultBuilder;
use crate::context::ContextStack;
use crate::decode::DecodeState;
use crate::err::Result;
use crate::input::Endianness;
use crate::render::Renderer;
use crate::result::{ResultType, ScanResult};

mod array;
mod attribute;
mod conditional;
mod encoded;
mod expression;
mod struct_spec;
mod union;

pub use array::ArraySpec;
pub use attribute::{
    AttributeRenderer, ByteRangeSpec, NumberAttribute, NumberValue, StringAttribute,
    SymbolAttribute, U8Attribute, U16Attribute, U32Attribute, U64Attribute,
};
pub use conditional::ConditionalSpec;
pub use encoded::EncodedFormatSpec;
pub use expression::ValueExpression;
pub use struct_spec::StructSpec;
pub use union::UnionSpec;

/// The contract every format spec implements.
pub trait FormatSpec: Send + Sync {
    /// Bytes required for prefix matching. Zero opts out of prefix matching
    /// entirely (the spec is decode-only).
    fn match_size(&self) -> usize;

    /// Pure prefix test over a buffer of at least `match_size` bytes at the
    /// prospective position.
    fn matches(&self, buf: &[u8], order: Endianness) -> bool;

    /// True iff decoding always consumes exactly `match_size` bytes on
    /// success.
    fn is_fixed_size(&self) -> bool;

    /// Whether decoding this spec opens a new child result.
    fn is_result(&self) -> bool {
        false
    }

    fn result_type(&self) -> ResultType {
        ResultType::Format
    }

    /// Late-bound result title, evaluated against the scope the decode
    /// populated.
    fn title(&self, scopes: &ContextStack) -> Result<Option<String>> {
        let _ = scopes;
        Ok(None)
    }

    /// Decode into `builder` starting at `position`; returns bytes consumed.
    /// Undecodable bytes are recorded as a fatal `DecodeStatus` on the
    /// builder, not returned as an error.
    fn spec_decode(
        &self,
        state: &mut DecodeState<'_>,
        builder: &mut ResultBuilder,
        position: u64,
    ) -> Result<u64>;

    /// Emit styled output for this spec's contribution over `[start, end)`.
    fn spec_render(
        &self,
        result: &ScanResult,
        start: u64,
        end: u64,
        scopes: &ContextStack,
        renderer: &mut Renderer<'_>,
    ) -> Result<()>;
}

/// Convenience upcast used throughout format definitions.
pub fn spec(spec: impl FormatSpec + 'static) -> Arc<dyn FormatSpec> {
    Arc::new(spec)
}

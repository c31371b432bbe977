//! Leaf specs: typed, named attributes that read a value from the input and
//! optionally publish it to the active context, plus raw byte ranges.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use encoding_rs::Encoding;

use crate::builder::ResultBuilder;
use crate::context::{AttrValue, AttributeId, ContextStack};
use crate::decode::DecodeState;
use crate::err::{Result, ScanError};
use crate::input::Endianness;
use crate::render::{render_hex_view, RenderMode, Renderer};
use crate::result::{DecodeStatus, ScanResult};
use crate::spec::{FormatSpec, ValueExpression};

/// Bytes of a raw range shown inline before eliding.
const BYTE_RANGE_RENDER_LIMIT: usize = 64;

/// Fixed-size numeric value readable from an input.
pub trait NumberValue:
    Copy + PartialEq + fmt::Display + fmt::Debug + Send + Sync + 'static
{
    const SIZE: usize;
    const TYPE_NAME: &'static str;

    fn read(buf: &[u8], order: Endianness) -> Self;
    fn to_attr_value(self) -> AttrValue;
    fn from_attr_value(value: &AttrValue) -> Option<Self>;

    fn to_hex(self) -> String;
}

macro_rules! impl_number_value {
    ($t:ty, $variant:ident, $read:ident) => {
        impl NumberValue for $t {
            const SIZE: usize = std::mem::size_of::<$t>();
            const TYPE_NAME: &'static str = stringify!($t);

            fn read(buf: &[u8], order: Endianness) -> Self {
                match order {
                    Endianness::Little => LittleEndian::$read(buf) as $t,
                    Endianness::Big => BigEndian::$read(buf) as $t,
                }
            }

            fn to_attr_value(self) -> AttrValue {
                AttrValue::$variant(self)
            }

            fn from_attr_value(value: &AttrValue) -> Option<Self> {
                match value {
                    AttrValue::$variant(v) => Some(*v),
                    _ => None,
                }
            }

            fn to_hex(self) -> String {
                format!("{:#0width$x}", self, width = Self::SIZE * 2 + 2)
            }
        }
    };
}

macro_rules! impl_number_value_byte {
    ($t:ty, $variant:ident) => {
        impl NumberValue for $t {
            const SIZE: usize = 1;
            const TYPE_NAME: &'static str = stringify!($t);

            fn read(buf: &[u8], _order: Endianness) -> Self {
                buf[0] as $t
            }

            fn to_attr_value(self) -> AttrValue {
                AttrValue::$variant(self)
            }

            fn from_attr_value(value: &AttrValue) -> Option<Self> {
                match value {
                    AttrValue::$variant(v) => Some(*v),
                    _ => None,
                }
            }

            fn to_hex(self) -> String {
                format!("{:#04x}", self)
            }
        }
    };
}

impl_number_value_byte!(u8, U8);
impl_number_value_byte!(i8, I8);
impl_number_value!(u16, U16, read_u16);
impl_number_value!(u32, U32, read_u32);
impl_number_value!(u64, U64, read_u64);
impl_number_value!(i16, I16, read_i16);
impl_number_value!(i32, I32, read_i32);
impl_number_value!(i64, I64, read_i64);

/// Extra rendering hook attached to an attribute: given the decoded value,
/// emit supplementary styled output after the raw value.
pub trait AttributeRenderer<T>: Send + Sync {
    fn render_value(&self, value: &T, renderer: &mut Renderer<'_>) -> Result<()>;
}

impl<T, F> AttributeRenderer<T> for F
where
    F: Fn(&T, &mut Renderer<'_>) -> Result<()> + Send + Sync,
{
    fn render_value(&self, value: &T, renderer: &mut Renderer<'_>) -> Result<()> {
        self(value, renderer)
    }
}

/// Name, identity, binding flag, and extra renderers shared by all
/// attribute kinds.
struct AttributeCore<T> {
    name: Cow<'static, str>,
    id: AttributeId,
    bound: bool,
    extra: Vec<Box<dyn AttributeRenderer<T>>>,
}

impl<T> AttributeCore<T> {
    fn new(name: impl Into<Cow<'static, str>>) -> Self {
        AttributeCore {
            name: name.into(),
            id: AttributeId::next(),
            bound: false,
            extra: Vec::new(),
        }
    }

    fn bind(&mut self) {
        assert!(!self.bound, "attribute `{}` is already bound", self.name);
        self.bound = true;
    }
}

fn render_attr_prefix(name: &str, renderer: &mut Renderer<'_>) -> Result<()> {
    renderer.write_text(RenderMode::Normal, name)?;
    renderer.write_text(RenderMode::Operator, " = ")
}

/// Fixed-size numeric attribute. May carry a *final value* (prefix matching
/// accepts only an equal read), may be *bound* (the value is published to
/// the context), and may render in hexadecimal.
pub struct NumberAttribute<T: NumberValue> {
    core: AttributeCore<T>,
    final_value: Option<T>,
    hex: bool,
}

pub type U8Attribute = NumberAttribute<u8>;
pub type U16Attribute = NumberAttribute<u16>;
pub type U32Attribute = NumberAttribute<u32>;
pub type U64Attribute = NumberAttribute<u64>;

impl<T: NumberValue> NumberAttribute<T> {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        NumberAttribute {
            core: AttributeCore::new(name),
            final_value: None,
            hex: false,
        }
    }

    pub fn bind(mut self) -> Self {
        self.core.bind();
        self
    }

    pub fn final_value(mut self, value: T) -> Self {
        self.final_value = Some(value);
        self
    }

    pub fn hex(mut self) -> Self {
        self.hex = true;
        self
    }

    pub fn with_renderer(mut self, renderer: impl AttributeRenderer<T> + 'static) -> Self {
        self.core.extra.push(Box::new(renderer));
        self
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn is_bound(&self) -> bool {
        self.core.bound
    }

    /// Resolve the bound value against the nearest enclosing scope.
    pub fn get(&self, scopes: &ContextStack) -> Result<T> {
        assert!(
            self.core.bound,
            "attribute `{}` was never bound",
            self.core.name
        );
        scopes
            .get(self.core.id)
            .and_then(T::from_attr_value)
            .ok_or_else(|| ScanError::UnboundAttribute {
                name: self.core.name.to_string(),
            })
    }

    fn format_value(&self, value: T) -> String {
        if self.hex {
            value.to_hex()
        } else {
            value.to_string()
        }
    }
}

impl<T: NumberValue + Into<u64>> NumberAttribute<T> {
    /// A `u64` expression reading this attribute's bound value, for sizes
    /// and counts referenced by later specs.
    pub fn value_expr(self: &Arc<Self>) -> ValueExpression<u64> {
        let attr = Arc::clone(self);
        ValueExpression::lazy(move |scopes: &ContextStack| attr.get(scopes).map(Into::into))
    }
}

impl<T: NumberValue> FormatSpec for NumberAttribute<T> {
    fn match_size(&self) -> usize {
        T::SIZE
    }

    fn matches(&self, buf: &[u8], order: Endianness) -> bool {
        if buf.len() < T::SIZE {
            return false;
        }
        let value = T::read(buf, order);
        self.final_value.map_or(true, |expected| value == expected)
    }

    fn is_fixed_size(&self) -> bool {
        true
    }

    fn spec_decode(
        &self,
        state: &mut DecodeState<'_>,
        builder: &mut ResultBuilder,
        position: u64,
    ) -> Result<u64> {
        let input = Arc::clone(builder.input());
        let order = builder.order();
        let buf = match input.cached_read(position, T::SIZE, T::TYPE_NAME) {
            Ok(buf) => buf,
            Err(ScanError::FailedToRead { .. }) => {
                builder.update_decode_status(DecodeStatus::fatal(format!(
                    "attribute `{}` ({}) truncated at offset {}",
                    self.core.name,
                    T::TYPE_NAME,
                    position
                )));
                return Ok(0);
            }
            Err(err) => return Err(err),
        };
        // Final values constrain prefix matching only; decode reads and
        // binds unconditionally.
        let value = T::read(buf, order);
        if self.core.bound {
            state.scopes_mut().set(self.core.id, value.to_attr_value());
        }
        Ok(T::SIZE as u64)
    }

    fn spec_render(
        &self,
        result: &ScanResult,
        start: u64,
        _end: u64,
        _scopes: &ContextStack,
        renderer: &mut Renderer<'_>,
    ) -> Result<()> {
        let value = match result.input().cached_read(start, T::SIZE, T::TYPE_NAME) {
            Ok(buf) => T::read(buf, result.order()),
            Err(_) => {
                renderer.write_text(
                    RenderMode::Error,
                    format!("warning: attribute `{}` is unreadable", self.core.name),
                )?;
                return renderer.write_break();
            }
        };
        render_attr_prefix(&self.core.name, renderer)?;
        renderer.write_text(RenderMode::Value, self.format_value(value))?;
        for extra in &self.core.extra {
            extra.render_value(&value, renderer)?;
        }
        renderer.write_break()
    }
}

/// Numeric attribute restricted to a value→name table; prefix matching
/// accepts only table members, which makes it a natural union discriminator.
pub struct SymbolAttribute<T: NumberValue> {
    core: AttributeCore<T>,
    symbols: Vec<(T, Cow<'static, str>)>,
}

impl<T: NumberValue> SymbolAttribute<T> {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        SymbolAttribute {
            core: AttributeCore::new(name),
            symbols: Vec::new(),
        }
    }

    pub fn symbol(mut self, value: T, name: impl Into<Cow<'static, str>>) -> Self {
        self.symbols.push((value, name.into()));
        self
    }

    pub fn bind(mut self) -> Self {
        self.core.bind();
        self
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn lookup(&self, value: T) -> Option<&str> {
        self.symbols
            .iter()
            .find(|(candidate, _)| *candidate == value)
            .map(|(_, name)| name.as_ref())
    }

    pub fn get(&self, scopes: &ContextStack) -> Result<T> {
        assert!(
            self.core.bound,
            "attribute `{}` was never bound",
            self.core.name
        );
        scopes
            .get(self.core.id)
            .and_then(T::from_attr_value)
            .ok_or_else(|| ScanError::UnboundAttribute {
                name: self.core.name.to_string(),
            })
    }
}

impl<T: NumberValue> FormatSpec for SymbolAttribute<T> {
    fn match_size(&self) -> usize {
        T::SIZE
    }

    fn matches(&self, buf: &[u8], order: Endianness) -> bool {
        if buf.len() < T::SIZE {
            return false;
        }
        self.lookup(T::read(buf, order)).is_some()
    }

    fn is_fixed_size(&self) -> bool {
        true
    }

    fn spec_decode(
        &self,
        state: &mut DecodeState<'_>,
        builder: &mut ResultBuilder,
        position: u64,
    ) -> Result<u64> {
        let input = Arc::clone(builder.input());
        let buf = match input.cached_read(position, T::SIZE, T::TYPE_NAME) {
            Ok(buf) => buf,
            Err(ScanError::FailedToRead { .. }) => {
                builder.update_decode_status(DecodeStatus::fatal(format!(
                    "attribute `{}` ({}) truncated at offset {}",
                    self.core.name,
                    T::TYPE_NAME,
                    position
                )));
                return Ok(0);
            }
            Err(err) => return Err(err),
        };
        let value = T::read(buf, builder.order());
        if self.core.bound {
            state.scopes_mut().set(self.core.id, value.to_attr_value());
        }
        Ok(T::SIZE as u64)
    }

    fn spec_render(
        &self,
        result: &ScanResult,
        start: u64,
        _end: u64,
        _scopes: &ContextStack,
        renderer: &mut Renderer<'_>,
    ) -> Result<()> {
        let value = match result.input().cached_read(start, T::SIZE, T::TYPE_NAME) {
            Ok(buf) => T::read(buf, result.order()),
            Err(_) => {
                renderer.write_text(
                    RenderMode::Error,
                    format!("warning: attribute `{}` is unreadable", self.core.name),
                )?;
                return renderer.write_break();
            }
        };
        render_attr_prefix(&self.core.name, renderer)?;
        renderer.write_text(RenderMode::Value, value.to_string())?;
        match self.lookup(value) {
            Some(symbol) => renderer.write_text(RenderMode::Comment, format!(" ({symbol})"))?,
            None => renderer.write_text(RenderMode::Comment, " (unknown)")?,
        }
        renderer.write_break()
    }
}

/// Byte string of a known (possibly late-bound) length, decoded with a
/// fixed text encoding.
pub struct StringAttribute {
    core: AttributeCore<Arc<str>>,
    size: ValueExpression<u64>,
    encoding: &'static Encoding,
}

impl StringAttribute {
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        size: impl Into<ValueExpression<u64>>,
        encoding: &'static Encoding,
    ) -> Self {
        StringAttribute {
            core: AttributeCore::new(name),
            size: size.into(),
            encoding,
        }
    }

    pub fn bind(mut self) -> Self {
        self.core.bind();
        self
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn get(&self, scopes: &ContextStack) -> Result<Arc<str>> {
        assert!(
            self.core.bound,
            "attribute `{}` was never bound",
            self.core.name
        );
        scopes
            .get(self.core.id)
            .and_then(|value| match value {
                AttrValue::Str(s) => Some(Arc::clone(s)),
                _ => None,
            })
            .ok_or_else(|| ScanError::UnboundAttribute {
                name: self.core.name.to_string(),
            })
    }

    fn decode_text(&self, bytes: &[u8]) -> Arc<str> {
        let (text, _, _) = self.encoding.decode(bytes);
        Arc::from(text.as_ref())
    }
}

impl FormatSpec for StringAttribute {
    fn match_size(&self) -> usize {
        0
    }

    fn matches(&self, _buf: &[u8], _order: Endianness) -> bool {
        false
    }

    fn is_fixed_size(&self) -> bool {
        false
    }

    fn spec_decode(
        &self,
        state: &mut DecodeState<'_>,
        builder: &mut ResultBuilder,
        position: u64,
    ) -> Result<u64> {
        let size = match self.size.eval(state.scopes()) {
            Ok(size) => size,
            Err(ScanError::UnboundAttribute { name }) => {
                builder.update_decode_status(DecodeStatus::fatal(format!(
                    "string `{}` depends on unbound attribute `{}`",
                    self.core.name, name
                )));
                return Ok(0);
            }
            Err(err) => return Err(err),
        };
        let input = Arc::clone(builder.input());
        let bytes = match input.cached_read(position, size as usize, "string") {
            Ok(bytes) => bytes,
            Err(ScanError::FailedToRead { .. }) => {
                builder.update_decode_status(DecodeStatus::fatal(format!(
                    "string `{}` ({} bytes) truncated at offset {}",
                    self.core.name, size, position
                )));
                return Ok(0);
            }
            Err(err) => return Err(err),
        };
        if self.core.bound {
            let text = self.decode_text(bytes);
            state.scopes_mut().set(self.core.id, AttrValue::Str(text));
        }
        Ok(size)
    }

    fn spec_render(
        &self,
        result: &ScanResult,
        start: u64,
        end: u64,
        _scopes: &ContextStack,
        renderer: &mut Renderer<'_>,
    ) -> Result<()> {
        let len = (end - start) as usize;
        let text = match result.input().cached_read(start, len, "string") {
            Ok(bytes) => self.decode_text(bytes),
            Err(_) => {
                renderer.write_text(
                    RenderMode::Error,
                    format!("warning: string `{}` is unreadable", self.core.name),
                )?;
                return renderer.write_break();
            }
        };
        render_attr_prefix(&self.core.name, renderer)?;
        renderer.write_text(
            RenderMode::Value,
            format!("\"{}\"", text.escape_debug()),
        )?;
        renderer.write_break()
    }
}

/// Raw range of bytes: padding, reserved fields, payloads rendered as hex.
pub struct ByteRangeSpec {
    name: Cow<'static, str>,
    size: ValueExpression<u64>,
}

impl ByteRangeSpec {
    pub fn fixed(name: impl Into<Cow<'static, str>>, size: u64) -> Self {
        ByteRangeSpec {
            name: name.into(),
            size: size.into(),
        }
    }

    pub fn sized(name: impl Into<Cow<'static, str>>, size: impl Into<ValueExpression<u64>>) -> Self {
        ByteRangeSpec {
            name: name.into(),
            size: size.into(),
        }
    }
}

impl FormatSpec for ByteRangeSpec {
    fn match_size(&self) -> usize {
        self.size
            .constant()
            .map(|size| usize::try_from(*size).unwrap_or(0))
            .unwrap_or(0)
    }

    fn matches(&self, buf: &[u8], _order: Endianness) -> bool {
        buf.len() >= self.match_size()
    }

    fn is_fixed_size(&self) -> bool {
        self.size.constant().is_some()
    }

    fn spec_decode(
        &self,
        state: &mut DecodeState<'_>,
        builder: &mut ResultBuilder,
        position: u64,
    ) -> Result<u64> {
        let size = match self.size.eval(state.scopes()) {
            Ok(size) => size,
            Err(ScanError::UnboundAttribute { name }) => {
                builder.update_decode_status(DecodeStatus::fatal(format!(
                    "range `{}` depends on unbound attribute `{}`",
                    self.name, name
                )));
                return Ok(0);
            }
            Err(err) => return Err(err),
        };
        match position.checked_add(size) {
            Some(end) if end <= builder.input().size() => Ok(size),
            _ => {
                builder.update_decode_status(DecodeStatus::fatal(format!(
                    "range `{}` ({} bytes) truncated at offset {}",
                    self.name, size, position
                )));
                Ok(0)
            }
        }
    }

    fn spec_render(
        &self,
        result: &ScanResult,
        start: u64,
        end: u64,
        _scopes: &ContextStack,
        renderer: &mut Renderer<'_>,
    ) -> Result<()> {
        render_attr_prefix(&self.name, renderer)?;
        renderer.write_text(RenderMode::Value, format!("{} bytes", end - start))?;
        renderer.write_break()?;
        render_hex_view(result.input(), start, end, BYTE_RANGE_RENDER_LIMIT, renderer)
    }
}

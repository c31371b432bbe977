//! Rendering: an abstract styled-output sink plus the driver that manages
//! mode transitions, lazy preambles, and cancellation.
//!
//! Two sinks are provided: a plain-text sink (deterministic, used heavily by
//! tests) and an HTML sink that mirrors what a result viewer embeds.

use std::fmt::Write as _;
use std::io::{self, Read, Write};
use std::sync::Arc;

use quick_xml::escape::escape;

use crate::decode::CancelToken;
use crate::err::Result;
use crate::input::ScanInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Normal,
    Keyword,
    Operator,
    Value,
    Comment,
    Label,
    Error,
}

impl RenderMode {
    pub fn css_class(self) -> &'static str {
        match self {
            RenderMode::Normal => "normal",
            RenderMode::Keyword => "keyword",
            RenderMode::Operator => "operator",
            RenderMode::Value => "value",
            RenderMode::Comment => "comment",
            RenderMode::Label => "label",
            RenderMode::Error => "error",
        }
    }
}

/// Opens the byte stream behind an embedded image or video.
pub trait StreamHandler: Send + Sync {
    fn open(&self) -> io::Result<Box<dyn Read + Send + '_>>;

    fn size(&self) -> Option<u64> {
        None
    }
}

/// A `StreamHandler` over a range of an input.
pub struct InputStreamHandler {
    input: Arc<ScanInput>,
    start: u64,
    end: u64,
}

impl InputStreamHandler {
    pub fn new(input: Arc<ScanInput>, start: u64, end: u64) -> Self {
        assert!(start <= end, "stream end {} precedes start {}", end, start);
        InputStreamHandler { input, start, end }
    }
}

impl StreamHandler for InputStreamHandler {
    fn open(&self) -> io::Result<Box<dyn Read + Send + '_>> {
        let reader = self.input.reader_at(self.start);
        Ok(Box::new(reader.take(self.end - self.start)))
    }

    fn size(&self) -> Option<u64> {
        Some(self.end - self.start)
    }
}

/// The low-level output contract a concrete renderer implements.
pub trait RenderSink {
    fn write_preamble(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn write_epilogue(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn write_begin_mode(&mut self, _mode: RenderMode) -> io::Result<()> {
        Ok(())
    }

    fn write_end_mode(&mut self, _mode: RenderMode) -> io::Result<()> {
        Ok(())
    }

    fn write_text(&mut self, mode: RenderMode, text: &str) -> io::Result<()>;

    fn write_ref_text(&mut self, mode: RenderMode, text: &str, position: u64) -> io::Result<()>;

    fn write_break(&mut self) -> io::Result<()>;

    fn write_image(&mut self, mode: RenderMode, stream: &dyn StreamHandler) -> io::Result<()>;

    fn write_ref_image(
        &mut self,
        mode: RenderMode,
        stream: &dyn StreamHandler,
        position: u64,
    ) -> io::Result<()>;

    fn write_video(&mut self, mode: RenderMode, stream: &dyn StreamHandler) -> io::Result<()>;

    fn write_ref_video(
        &mut self,
        mode: RenderMode,
        stream: &dyn StreamHandler,
        position: u64,
    ) -> io::Result<()>;
}

/// Driver over a sink: writes the preamble lazily, tracks the current mode
/// and whether any output was produced, and observes cancellation.
pub struct Renderer<'a> {
    sink: &'a mut dyn RenderSink,
    cancel: CancelToken,
    mode: Option<RenderMode>,
    has_output: bool,
    open: bool,
    closed: bool,
}

impl<'a> Renderer<'a> {
    pub fn new(sink: &'a mut dyn RenderSink) -> Self {
        Renderer::with_cancel(sink, CancelToken::new())
    }

    pub fn with_cancel(sink: &'a mut dyn RenderSink, cancel: CancelToken) -> Self {
        Renderer {
            sink,
            cancel,
            mode: None,
            has_output: false,
            open: false,
            closed: false,
        }
    }

    fn prepare(&mut self, mode: RenderMode) -> Result<()> {
        self.cancel.check()?;
        assert!(!self.closed, "renderer already closed");
        if !self.open {
            self.sink.write_preamble()?;
            self.open = true;
        }
        if self.mode != Some(mode) {
            if let Some(previous) = self.mode {
                self.sink.write_end_mode(previous)?;
            }
            self.sink.write_begin_mode(mode)?;
            self.mode = Some(mode);
        }
        Ok(())
    }

    pub fn write_text(&mut self, mode: RenderMode, text: impl AsRef<str>) -> Result<()> {
        self.prepare(mode)?;
        self.sink.write_text(mode, text.as_ref())?;
        self.has_output = true;
        Ok(())
    }

    pub fn write_ref_text(
        &mut self,
        mode: RenderMode,
        text: impl AsRef<str>,
        position: u64,
    ) -> Result<()> {
        self.prepare(mode)?;
        self.sink.write_ref_text(mode, text.as_ref(), position)?;
        self.has_output = true;
        Ok(())
    }

    pub fn write_break(&mut self) -> Result<()> {
        self.cancel.check()?;
        if !self.open {
            self.sink.write_preamble()?;
            self.open = true;
        }
        self.sink.write_break()?;
        self.has_output = true;
        Ok(())
    }

    pub fn write_image(&mut self, mode: RenderMode, stream: &dyn StreamHandler) -> Result<()> {
        self.prepare(mode)?;
        self.sink.write_image(mode, stream)?;
        self.has_output = true;
        Ok(())
    }

    pub fn write_ref_image(
        &mut self,
        mode: RenderMode,
        stream: &dyn StreamHandler,
        position: u64,
    ) -> Result<()> {
        self.prepare(mode)?;
        self.sink.write_ref_image(mode, stream, position)?;
        self.has_output = true;
        Ok(())
    }

    pub fn write_video(&mut self, mode: RenderMode, stream: &dyn StreamHandler) -> Result<()> {
        self.prepare(mode)?;
        self.sink.write_video(mode, stream)?;
        self.has_output = true;
        Ok(())
    }

    pub fn write_ref_video(
        &mut self,
        mode: RenderMode,
        stream: &dyn StreamHandler,
        position: u64,
    ) -> Result<()> {
        self.prepare(mode)?;
        self.sink.write_ref_video(mode, stream, position)?;
        self.has_output = true;
        Ok(())
    }

    pub fn has_output(&self) -> bool {
        self.has_output
    }

    /// End the open mode and write the epilogue. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if let Some(mode) = self.mode.take() {
            self.sink.write_end_mode(mode)?;
        }
        if self.open {
            self.sink.write_epilogue()?;
        }
        self.closed = true;
        Ok(())
    }
}

/// Plain-text sink. Modes are dropped, references render as their text, and
/// media render as placeholders.
pub struct TextRenderSink<W: Write> {
    out: W,
}

impl<W: Write> TextRenderSink<W> {
    pub fn new(out: W) -> Self {
        TextRenderSink { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> RenderSink for TextRenderSink<W> {
    fn write_text(&mut self, _mode: RenderMode, text: &str) -> io::Result<()> {
        self.out.write_all(text.as_bytes())
    }

    fn write_ref_text(&mut self, _mode: RenderMode, text: &str, _position: u64) -> io::Result<()> {
        self.out.write_all(text.as_bytes())
    }

    fn write_break(&mut self) -> io::Result<()> {
        self.out.write_all(b"\n")
    }

    fn write_image(&mut self, _mode: RenderMode, _stream: &dyn StreamHandler) -> io::Result<()> {
        self.out.write_all(b"[image]")
    }

    fn write_ref_image(
        &mut self,
        _mode: RenderMode,
        _stream: &dyn StreamHandler,
        position: u64,
    ) -> io::Result<()> {
        write!(self.out, "[image @{position:x}h]")
    }

    fn write_video(&mut self, _mode: RenderMode, _stream: &dyn StreamHandler) -> io::Result<()> {
        self.out.write_all(b"[video]")
    }

    fn write_ref_video(
        &mut self,
        _mode: RenderMode,
        _stream: &dyn StreamHandler,
        position: u64,
    ) -> io::Result<()> {
        write!(self.out, "[video @{position:x}h]")
    }
}

/// Stores media streams somewhere a browser can fetch them, yielding a URL.
pub trait MediaStore {
    fn store(&mut self, stream: &dyn StreamHandler) -> io::Result<String>;
}

/// HTML sink: one `<span>` per mode run, `<a href="#hex">` references,
/// media through an optional `MediaStore`.
pub struct HtmlRenderSink<W: Write> {
    out: W,
    media: Option<Box<dyn MediaStore>>,
}

impl<W: Write> HtmlRenderSink<W> {
    pub fn new(out: W) -> Self {
        HtmlRenderSink { out, media: None }
    }

    pub fn with_media_store(out: W, media: Box<dyn MediaStore>) -> Self {
        HtmlRenderSink {
            out,
            media: Some(media),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn media_url(&mut self, stream: &dyn StreamHandler) -> io::Result<Option<String>> {
        match self.media.as_mut() {
            Some(store) => store.store(stream).map(Some),
            None => Ok(None),
        }
    }
}

impl<W: Write> RenderSink for HtmlRenderSink<W> {
    fn write_preamble(&mut self) -> io::Result<()> {
        self.out.write_all(
            b"<!DOCTYPE HTML>\n<html>\n<head>\n<meta charset=\"utf-8\">\n</head>\n<body>\n",
        )
    }

    fn write_epilogue(&mut self) -> io::Result<()> {
        self.out.write_all(b"</body>\n</html>\n")
    }

    fn write_begin_mode(&mut self, mode: RenderMode) -> io::Result<()> {
        write!(self.out, "<span class=\"{}\">", mode.css_class())
    }

    fn write_end_mode(&mut self, _mode: RenderMode) -> io::Result<()> {
        self.out.write_all(b"</span>")
    }

    fn write_text(&mut self, _mode: RenderMode, text: &str) -> io::Result<()> {
        self.out.write_all(escape(text).as_bytes())
    }

    fn write_ref_text(&mut self, _mode: RenderMode, text: &str, position: u64) -> io::Result<()> {
        write!(self.out, "<a href=\"#{position:x}\">{}</a>", escape(text))
    }

    fn write_break(&mut self) -> io::Result<()> {
        self.out.write_all(b"<br/>\n")
    }

    fn write_image(&mut self, _mode: RenderMode, stream: &dyn StreamHandler) -> io::Result<()> {
        match self.media_url(stream)? {
            Some(url) => write!(self.out, "<img src=\"{}\"/>", escape(&url)),
            None => self.out.write_all(b"[image]"),
        }
    }

    // Referenced media have no defined appearance upstream; emit the anchor
    // around a placeholder (or the stored image) rather than guessing more.
    fn write_ref_image(
        &mut self,
        mode: RenderMode,
        stream: &dyn StreamHandler,
        position: u64,
    ) -> io::Result<()> {
        write!(self.out, "<a href=\"#{position:x}\">")?;
        self.write_image(mode, stream)?;
        self.out.write_all(b"</a>")
    }

    fn write_video(&mut self, _mode: RenderMode, stream: &dyn StreamHandler) -> io::Result<()> {
        match self.media_url(stream)? {
            Some(url) => write!(self.out, "<video src=\"{}\"/>", escape(&url)),
            None => self.out.write_all(b"[video]"),
        }
    }

    fn write_ref_video(
        &mut self,
        mode: RenderMode,
        stream: &dyn StreamHandler,
        position: u64,
    ) -> io::Result<()> {
        write!(self.out, "<a href=\"#{position:x}\">")?;
        self.write_video(mode, stream)?;
        self.out.write_all(b"</a>")
    }
}

/// Canonical hex view: 16 bytes per line, address anchored to its offset,
/// ASCII column, bounded by `limit`.
pub(crate) fn render_hex_view(
    input: &ScanInput,
    start: u64,
    end: u64,
    limit: usize,
    renderer: &mut Renderer<'_>,
) -> Result<()> {
    let len = usize::try_from(end.saturating_sub(start)).unwrap_or(usize::MAX);
    let shown = len.min(limit);
    let bytes = input.read_prefix(start, shown);
    for (index, line) in bytes.chunks(16).enumerate() {
        let address = start + (index * 16) as u64;
        renderer.write_ref_text(RenderMode::Label, format!("{address:08x}h"), address)?;
        let mut hex = String::with_capacity(line.len() * 3);
        for byte in line {
            let _ = write!(hex, " {byte:02x}");
        }
        renderer.write_text(RenderMode::Value, hex)?;
        let ascii: String = line
            .iter()
            .map(|&byte| {
                if (0x20..0x7f).contains(&byte) {
                    byte as char
                } else {
                    '.'
                }
            })
            .collect();
        renderer.write_text(RenderMode::Comment, format!("  {ascii}"))?;
        renderer.write_break()?;
    }
    if len > shown {
        renderer.write_text(RenderMode::Comment, format!("... {} more bytes", len - shown))?;
        renderer.write_break()?;
    }
    Ok(())
}

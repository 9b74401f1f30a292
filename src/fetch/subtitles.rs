//! Timed-text subtitle conversion.
//!
//! Broadcasters publish subtitles as EBU-TT timed-text XML. Players want
//! SRT, so the document is converted: one SRT cue per `<tt:p>` line, with
//! styled spans rendered as inline `<font color>` markup. Cue numbers are
//! 1-based, derived from the digits of the line's `xml:id`.

use crate::error::{Error, Result};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;
use std::fmt::Write as _;

/// `00:00:01.000` → `00:00:01,000`; a missing fraction becomes `,000`.
fn srt_time(timestamp: &str) -> String {
    match timestamp.split_once('.') {
        Some((whole, fraction)) => format!("{whole},{fraction:0<3.3}"),
        None => format!("{timestamp},000"),
    }
}

fn attribute(element: &BytesStart<'_>, name: &str) -> Result<Option<String>> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| Error::InvalidSubtitles(e.to_string()))?;
        if attr.key.as_ref() == name.as_bytes() {
            let value = attr
                .unescape_value()
                .map_err(|e| Error::InvalidSubtitles(e.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// One subtitle line under construction.
struct Cue {
    sequence: usize,
    begin: String,
    end: String,
    lines: Vec<String>,
}

struct Converter {
    /// Style name → color, from the document head.
    styles: HashMap<String, String>,
    cue: Option<Cue>,
    span_style: Option<String>,
    text: String,
    /// Fallback numbering for lines whose identifier carries no digits.
    counter: usize,
    output: String,
}

impl Converter {
    fn new() -> Self {
        Self {
            styles: HashMap::new(),
            cue: None,
            span_style: None,
            text: String::new(),
            counter: 0,
            output: String::new(),
        }
    }

    fn open(&mut self, element: &BytesStart<'_>) -> Result<()> {
        match element.name().local_name().as_ref() {
            b"style" => {
                if let (Some(id), Some(color)) = (
                    attribute(element, "xml:id")?,
                    attribute(element, "tts:color")?,
                ) {
                    self.styles.insert(id, color);
                }
            }
            b"p" => {
                self.counter += 1;
                let sequence = attribute(element, "xml:id")?
                    .map(|id| id.chars().filter(char::is_ascii_digit).collect::<String>())
                    .and_then(|digits| digits.parse::<usize>().ok())
                    .map(|n| n + 1)
                    .unwrap_or(self.counter);
                self.cue = Some(Cue {
                    sequence,
                    begin: attribute(element, "begin")?.unwrap_or_default(),
                    end: attribute(element, "end")?.unwrap_or_default(),
                    lines: Vec::new(),
                });
            }
            b"span" => {
                self.flush_line();
                self.span_style = attribute(element, "style")?;
            }
            b"br" => self.flush_line(),
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self, local_name: &[u8]) {
        match local_name {
            b"span" => {
                self.flush_line();
                self.span_style = None;
            }
            b"p" => {
                self.flush_line();
                if let Some(cue) = self.cue.take() {
                    if !cue.lines.is_empty() {
                        let _ = write!(
                            self.output,
                            "{}\n{} --> {}\n{}\n\n",
                            cue.sequence,
                            srt_time(&cue.begin),
                            srt_time(&cue.end),
                            cue.lines.join("\n"),
                        );
                    }
                }
            }
            _ => {}
        }
    }

    fn flush_line(&mut self) {
        if self.text.trim().is_empty() {
            self.text.clear();
            return;
        }
        let text = std::mem::take(&mut self.text);
        let text = text.trim();
        if let Some(cue) = self.cue.as_mut() {
            let color = self
                .span_style
                .as_ref()
                .and_then(|style| self.styles.get(style));
            cue.lines.push(match color {
                Some(color) => format!("<font color=\"{color}\">{text}</font>"),
                None => text.to_string(),
            });
        }
    }
}

/// Convert a timed-text XML document to SRT.
pub(crate) fn convert_to_srt(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut converter = Converter::new();
    loop {
        match reader
            .read_event()
            .map_err(|e| Error::InvalidSubtitles(e.to_string()))?
        {
            Event::Start(element) => converter.open(&element)?,
            Event::Empty(element) => {
                converter.open(&element)?;
                converter.close(element.name().local_name().as_ref());
            }
            Event::End(element) => converter.close(element.name().local_name().as_ref()),
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| Error::InvalidSubtitles(e.to_string()))?;
                converter.text.push_str(&text);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(converter.output)
}

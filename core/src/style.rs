//! In-band color tags.
//!
//! Engine-visible strings may carry `{x` tags (one letter after the brace)
//! that the I/O layer renders to ANSI, or strips for color-off clients.
//! `{{` is a literal brace. The engine itself treats tagged strings as
//! opaque; this module is the one place that understands the encoding, so
//! width math never miscounts tag bytes.

use std::fmt;

/// A string that may contain in-band color tags.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StyledString(String);

impl StyledString {
    pub fn new(raw: impl Into<String>) -> Self {
        StyledString(raw.into())
    }

    pub fn raw(&self) -> &str {
        &self.0
    }

    /// Number of characters a client will actually see: tags collapse to
    /// nothing, `{{` collapses to one brace.
    pub fn visible_len(&self) -> usize {
        let mut len = 0;
        let mut chars = self.0.chars();
        while let Some(c) = chars.next() {
            if c == '{' {
                match chars.next() {
                    Some('{') => len += 1,
                    Some(_) | None => {}
                }
            } else {
                len += 1;
            }
        }
        len
    }

    /// Render tags to ANSI escape sequences. Always appends a reset when any
    /// color was emitted, so lines cannot bleed into the prompt.
    pub fn render_ansi(&self) -> String {
        let mut out = String::with_capacity(self.0.len() + 8);
        let mut colored = false;
        let mut chars = self.0.chars();
        while let Some(c) = chars.next() {
            if c == '{' {
                match chars.next() {
                    Some('{') => out.push('{'),
                    Some(code) => {
                        if let Some(seq) = ansi_for(code) {
                            out.push_str(seq);
                            colored = code != 'd';
                        }
                        // Unknown codes are swallowed, same as strip().
                    }
                    None => {}
                }
            } else {
                out.push(c);
            }
        }
        if colored {
            out.push_str(RESET);
        }
        out
    }

    /// Remove all tags, keeping visible text only.
    pub fn strip(&self) -> String {
        let mut out = String::with_capacity(self.0.len());
        let mut chars = self.0.chars();
        while let Some(c) = chars.next() {
            if c == '{' {
                if let Some('{') = chars.next() {
                    out.push('{');
                }
            } else {
                out.push(c);
            }
        }
        out
    }
}

impl fmt::Display for StyledString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for StyledString {
    fn from(raw: String) -> Self {
        StyledString(raw)
    }
}

impl From<&str> for StyledString {
    fn from(raw: &str) -> Self {
        StyledString(raw.to_string())
    }
}

const RESET: &str = "\x1b[0m";

fn ansi_for(code: char) -> Option<&'static str> {
    match code {
        'r' => Some("\x1b[31m"),
        'g' => Some("\x1b[32m"),
        'y' => Some("\x1b[33m"),
        'b' => Some("\x1b[34m"),
        'm' => Some("\x1b[35m"),
        'c' => Some("\x1b[36m"),
        'w' => Some("\x1b[37m"),
        'd' => Some(RESET),
        _ => None,
    }
}

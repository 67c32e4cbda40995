//! Slot-based harness templates
//!
//! Templates are trusted files with `{{slot}}` markers. They are parsed into
//! segments once and rendered in a single pass, so text substituted into one
//! slot is never scanned for further markers.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TemplateError {
    #[error("unterminated slot starting at byte {0}")]
    Unterminated(usize),
    #[error("invalid slot name {0:?}")]
    InvalidSlot(String),
    #[error("no value supplied for slot {0}")]
    MissingSlot(String),
}

/// A value for one slot, with its rendering rule
#[derive(Debug, Clone)]
pub enum Fragment<'a> {
    /// Inserted byte for byte (user source)
    Verbatim(&'a str),
    /// Rendered as a double-quoted, escaped string literal.
    ///
    /// JSON string syntax is accepted as-is by JavaScript, Python and Go.
    StringLiteral(&'a str),
    /// Code generated by the engine itself
    Code(String),
}

impl Fragment<'_> {
    fn render_into(&self, out: &mut String) {
        match self {
            Fragment::Verbatim(text) => out.push_str(text),
            Fragment::StringLiteral(text) => {
                out.push_str(&Value::String((*text).to_string()).to_string())
            }
            Fragment::Code(code) => out.push_str(code),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Slot(String),
}

#[derive(Debug, Clone)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Text(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or(TemplateError::Unterminated(offset + start))?;
            let name = &after[..end];
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_lowercase() || c == '_') {
                return Err(TemplateError::InvalidSlot(name.to_string()));
            }
            segments.push(Segment::Slot(name.to_string()));

            let consumed = start + 2 + end + 2;
            offset += consumed;
            rest = &rest[consumed..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_string()));
        }

        Ok(Self { segments })
    }

    pub fn render(&self, values: &[(&str, Fragment<'_>)]) -> Result<String, TemplateError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Slot(name) => {
                    let (_, fragment) = values
                        .iter()
                        .find(|(slot, _)| slot == name)
                        .ok_or_else(|| TemplateError::MissingSlot(name.clone()))?;
                    fragment.render_into(&mut out);
                }
            }
        }
        Ok(out)
    }
}

//! Line-oriented parser for the diagram source language.
//!
//! Each non-blank, non-comment line is one statement. The parser builds a
//! [`Diagram`] and runs the compute pass, so a successful parse always
//! yields a renderable [`ComputedDiagram`].
//!
//! Statements:
//!
//! ```text
//! title Payment flow
//! participant "Auth service" as Auth
//! participant Client
//! t0: Client -> Auth: hello [duration=2, advance=3]
//! Auth -->> Client
//! Client@t0 <<-->> Auth: both ways
//! note Auth: check the cache
//! advance 2
//! loop until accepted
//! end
//! set auto_number
//! # full-line comment
//! ```

use std::fmt;
use std::sync::LazyLock;

use log::debug;
use regex::Regex;
use thiserror::Error;

use crate::ast::{Arrow, BlockKind, ComputedDiagram, Diagram, Head, MessageOptions, ModelError};

/// A malformed statement, located by 1-based line and column.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("line {line}, column {column}: {message}")]
pub struct SyntaxError {
    pub line: u32,
    pub column: usize,
    pub message: String,
}

impl SyntaxError {
    /// Byte offset of the error location within `source`, for span-based
    /// reporting.
    pub fn offset(&self, source: &str) -> usize {
        let mut offset = 0;
        for (i, line) in source.split('\n').enumerate() {
            if i + 1 == self.line as usize {
                return offset + (self.column - 1).min(line.len());
            }
            offset += line.len() + 1;
        }
        offset.saturating_sub(1)
    }

    /// Renders the offending line with a caret under the error column.
    pub fn snippet(&self, source: &str) -> String {
        let line = source
            .lines()
            .nth(self.line as usize - 1)
            .unwrap_or_default();
        format!("{self}\n  {line}\n  {caret:>width$}", caret = '^', width = self.column)
    }
}

/// Errors raised while parsing: either a malformed line or a structural
/// model error attributed to the line that caused it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error("line {line}: {source}")]
    Model { line: u32, source: ModelError },

    /// Structural errors from the compute pass, which has no single
    /// offending line (the steps involved carry their own).
    #[error(transparent)]
    Compute(ModelError),
}

static PARTICIPANT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*participant\s+(?:"([^"]*)"\s+as\s+([A-Za-z0-9_']+)|([A-Za-z0-9_']+))\s*$"#)
        .unwrap()
});
static ADVANCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*advance\s+(\d+)\s*$").unwrap());
static SET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*set\s+([A-Za-z0-9_]+)(?:\s+(.*?))?\s*$").unwrap());
static BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(loop|opt|block)(?:\s+(.*?))?\s*$").unwrap());
static NOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*note\s+([A-Za-z0-9_']+)\s*:\s*(.*?)\s*$").unwrap());
static MESSAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^\s*
        (?: ([A-Za-z0-9_']+) \s* : \s* )?          # leading timepoint
        ([A-Za-z0-9_']+) (?: @ ([A-Za-z0-9_']+) )? # from endpoint
        \s* (<<|<)? (--|-) (>>|>|\#) \s*           # arrow
        ([A-Za-z0-9_']+) (?: @ ([A-Za-z0-9_']+) )? # to endpoint
        (?: \s* : \s* ([^\[]*?) )?                 # text
        \s* (?: \[ ([^\]]*) \] )? \s*$             # options
        ",
    )
    .unwrap()
});

struct Parser<'a> {
    diagram: Diagram,
    source: &'a str,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            diagram: Diagram::new(),
            source,
        }
    }

    fn parse(mut self) -> Result<ComputedDiagram, ParseError> {
        for (i, raw) in self.source.lines().enumerate() {
            let line = (i + 1) as u32;
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            self.statement(line, raw, trimmed)?;
        }
        debug!(steps = self.diagram.steps().len(); "parsed diagram, running compute");
        self.diagram.compute().map_err(ParseError::Compute)
    }

    fn statement(&mut self, line: u32, raw: &str, trimmed: &str) -> Result<(), ParseError> {
        let keyword = trimmed.split_whitespace().next().unwrap_or_default();
        match keyword {
            "title" => {
                let text = trimmed["title".len()..].trim();
                if text.is_empty() {
                    return Err(self.error(line, raw, "expected text after `title`").into());
                }
                self.model(line, |d| d.set_title(text))
            }
            "participant" => {
                let caps = PARTICIPANT_RE.captures(raw).ok_or_else(|| {
                    self.error(line, raw, "expected `participant \"Description\" as Name` or `participant Name`")
                })?;
                match (caps.get(1), caps.get(2), caps.get(3)) {
                    (Some(desc), Some(name), _) => {
                        let (desc, name) = (desc.as_str(), name.as_str());
                        self.model(line, |d| d.add_participant(name, Some(desc)))
                    }
                    (_, _, Some(name)) => {
                        let name = name.as_str();
                        self.model(line, |d| d.add_participant(name, None))
                    }
                    _ => unreachable!("participant regex matched without captures"),
                }
            }
            "advance" => {
                let caps = ADVANCE_RE
                    .captures(raw)
                    .ok_or_else(|| self.error(line, raw, "expected a number after `advance`"))?;
                let distance = caps[1].parse::<i32>().map_err(|_| {
                    self.error(line, raw, "advance distance does not fit in an integer")
                })?;
                self.diagram.add_advance(line, distance);
                Ok(())
            }
            "set" => {
                let caps = SET_RE
                    .captures(raw)
                    .ok_or_else(|| self.error(line, raw, "expected `set <name> [value]`"))?;
                let name = caps[1].to_owned();
                let value = caps.get(2).map_or("", |m| m.as_str());
                self.model(line, |d| d.set_prop(&name, value))
            }
            "loop" | "opt" | "block" => {
                let caps = BLOCK_RE
                    .captures(raw)
                    .ok_or_else(|| self.error(line, raw, "malformed block header"))?;
                let kind = match &caps[1] {
                    "loop" => BlockKind::Loop,
                    "opt" => BlockKind::Opt,
                    _ => BlockKind::Simple,
                };
                let text = caps.get(2).map(|m| m.as_str().to_owned());
                self.diagram.open_block(line, kind, text);
                Ok(())
            }
            "end" if trimmed == "end" => self.model(line, |d| d.close_block(line)),
            "note" => {
                let caps = NOTE_RE.captures(raw).ok_or_else(|| {
                    self.error(line, raw, "expected `note Participant: text`")
                })?;
                let name = caps[1].to_owned();
                let text = caps[2].to_owned();
                let at = self.diagram.endpoint(&name, None);
                self.diagram.add_note(line, at, text);
                Ok(())
            }
            _ => self.message(line, raw),
        }
    }

    fn message(&mut self, line: u32, raw: &str) -> Result<(), ParseError> {
        let caps = MESSAGE_RE.captures(raw).ok_or_else(|| {
            self.error(line, raw, "unrecognized statement")
        })?;

        let begin = caps.get(4).map(|m| match m.as_str() {
            "<" => Head::Closed,
            _ => Head::Open,
        });
        let dashed = &caps[5] == "--";
        let end = match &caps[6] {
            ">" => Head::Closed,
            ">>" => Head::Open,
            _ => Head::Half,
        };
        let arrow = Arrow::new(begin, dashed, end);

        let timepoint = caps.get(1).map(|m| m.as_str().to_owned());
        let from = self
            .diagram
            .endpoint(&caps[2], caps.get(3).map(|m| m.as_str()));
        let to = self
            .diagram
            .endpoint(&caps[7], caps.get(8).map(|m| m.as_str()));
        let text = caps.get(9).map(|m| m.as_str().to_owned());
        let opts = match caps.get(10) {
            Some(m) => message_options(line, m.start(), m.as_str())?,
            None => MessageOptions::default(),
        };

        self.diagram
            .add_message(line, timepoint, from, arrow, to, text, opts);
        Ok(())
    }

    fn error(&self, line: u32, raw: &str, message: impl fmt::Display) -> SyntaxError {
        let column = raw.len() - raw.trim_start().len() + 1;
        SyntaxError {
            line,
            column,
            message: message.to_string(),
        }
    }

    fn model<T>(
        &mut self,
        line: u32,
        f: impl FnOnce(&mut Diagram) -> Result<T, ModelError>,
    ) -> Result<(), ParseError> {
        f(&mut self.diagram)
            .map(|_| ())
            .map_err(|source| ParseError::Model { line, source })
    }
}

fn message_options(line: u32, offset: usize, body: &str) -> Result<MessageOptions, SyntaxError> {
    let mut opts = MessageOptions::default();
    let mut pos = offset;
    for part in body.split(',') {
        let column = pos + 1 + (part.len() - part.trim_start().len());
        pos += part.len() + 1;
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let located = |message: String| SyntaxError {
            line,
            column,
            message,
        };
        let (key, value) = part
            .split_once('=')
            .ok_or_else(|| located(format!("expected `key=value` in message options, got {part:?}")))?;
        let value = value
            .trim()
            .parse::<i32>()
            .map_err(|_| located(format!("option {:?} needs an integer value", key.trim())))?;
        match key.trim() {
            "duration" => opts.duration = Some(value),
            "advance" => opts.advance = Some(value),
            other => return Err(located(format!("unknown message option {other:?}"))),
        }
    }
    Ok(opts)
}

/// Parses diagram source and runs the compute pass.
pub fn parse(source: &str) -> Result<ComputedDiagram, ParseError> {
    Parser::new(source).parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Step;

    fn steps(source: &str) -> ComputedDiagram {
        parse(source).unwrap()
    }

    #[test]
    fn minimal_message() {
        let d = steps("A->B");
        let d = d.diagram();
        assert_eq!(d.parts().len(), 2);
        assert_eq!(d.steps().len(), 1);
        assert!(matches!(d.steps()[0], Step::Message(_)));
        assert!(d.max_tick() >= 2);
    }

    #[test]
    fn full_message_form() {
        let d = steps("t0: A@t0 <<-->> B: hello there [duration=2, advance=3]");
        match &d.diagram().steps()[0] {
            Step::Message(m) => {
                assert_eq!(m.timepoint.as_deref(), Some("t0"));
                assert_eq!(m.arrow.to_string(), "<<-->>");
                assert_eq!(m.text.as_deref(), Some("hello there"));
                assert_eq!(m.opts.duration, Some(2));
                assert_eq!(m.opts.advance, Some(3));
            }
            other => panic!("unexpected step {other:?}"),
        }
    }

    #[test]
    fn half_arrow_and_self_message() {
        let d = steps("A-#B\nA->A: me");
        let d = d.diagram();
        match &d.steps()[0] {
            Step::Message(m) => assert_eq!(m.arrow.end, Head::Half),
            other => panic!("unexpected step {other:?}"),
        }
        assert!(matches!(d.steps()[1], Step::SelfMessage(_)));
    }

    #[test]
    fn title_participants_and_notes() {
        let d = steps(concat!(
            "title The plan\n",
            "participant \"Alice the admin\" as Alice\n",
            "participant Bob\n",
            "note Alice: thinking\n",
            "Alice->Bob\n",
        ));
        let d = d.diagram();
        assert_eq!(d.title(), Some("The plan"));
        assert_eq!(
            d.parts().get("Alice").map(|p| p.desc.as_str()),
            Some("Alice the admin")
        );
        assert!(matches!(d.steps()[0], Step::Note { .. }));
    }

    #[test]
    fn blocks_and_advance() {
        let d = steps("loop three times\nA->B\nadvance 2\nend");
        let d = d.diagram();
        assert_eq!(d.blocks().len(), 1);
        assert_eq!(d.blocks()[0].kind, BlockKind::Loop);
        assert_eq!(d.blocks()[0].text.as_deref(), Some("three times"));
        assert!(matches!(d.steps()[0], Step::BlockBegin { .. }));
        assert!(matches!(d.steps()[3], Step::BlockEnd { .. }));
    }

    #[test]
    fn block_keyword_maps_to_simple() {
        let d = steps("block\nA->B\nend");
        assert_eq!(d.diagram().blocks()[0].kind, BlockKind::Simple);
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let d = steps("# a comment\n\n   # another\nA->B\n");
        assert_eq!(d.diagram().steps().len(), 1);
    }

    #[test]
    fn set_without_value_means_true() {
        let d = steps("set auto_number\nA->B: one");
        match &d.diagram().steps()[0] {
            Step::Message(m) => assert_eq!(m.text.as_deref(), Some("[0] one")),
            other => panic!("unexpected step {other:?}"),
        }
    }

    #[test]
    fn unknown_property_is_a_model_error_with_line() {
        let err = parse("A->B\nset bogus_property 1").unwrap_err();
        match err {
            ParseError::Model { line, source } => {
                assert_eq!(line, 2);
                assert_eq!(source, ModelError::UnknownProperty("bogus_property".to_owned()));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn unrecognized_statement_reports_location() {
        let err = parse("A->B\n   what is this").unwrap_err();
        match err {
            ParseError::Syntax(e) => {
                assert_eq!(e.line, 2);
                assert_eq!(e.column, 4);
                assert!(e.message.contains("unrecognized"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn bad_advance_distance() {
        let err = parse("advance lots").unwrap_err();
        assert!(matches!(err, ParseError::Syntax(_)));
    }

    #[test]
    fn bad_message_option() {
        let err = parse("A->B: hi [colour=3]").unwrap_err();
        match err {
            ParseError::Syntax(e) => assert!(e.message.contains("colour")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn unclosed_block_is_a_compute_error() {
        let err = parse("loop forever\nA->B").unwrap_err();
        assert!(matches!(
            err,
            ParseError::Compute(ModelError::UnclosedBlocks(_))
        ));
    }

    #[test]
    fn snippet_points_at_the_column() {
        let source = "A->B\n  advance lots";
        let err = parse(source).unwrap_err();
        let ParseError::Syntax(e) = err else {
            panic!("expected a syntax error");
        };
        let snippet = e.snippet(source);
        assert!(snippet.contains("advance lots"));
        assert!(snippet.lines().last().unwrap().trim_end().ends_with('^'));
    }

    #[test]
    fn offset_maps_line_and_column_to_bytes() {
        let source = "A->B\nxx yy";
        let e = SyntaxError {
            line: 2,
            column: 4,
            message: "nope".to_owned(),
        };
        assert_eq!(e.offset(source), 8);
        assert_eq!(&source[e.offset(source)..e.offset(source) + 2], "yy");
    }
}

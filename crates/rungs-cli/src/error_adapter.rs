//! Error adapter for converting [`RungsError`] to miette diagnostics.
//!
//! Parse errors carry their source text and a location, so they render as
//! rich diagnostics with a labeled span. Everything else renders as a plain
//! coded error.

use std::fmt;

use miette::{Diagnostic as MietteDiagnostic, LabeledSpan, SourceSpan};

use rungs::RungsError;
use rungs::parser::ParseError;

/// A reportable error that can be rendered by miette.
pub struct Reportable<'a> {
    err: &'a RungsError,
}

impl<'a> Reportable<'a> {
    pub fn new(err: &'a RungsError) -> Self {
        Self { err }
    }

    fn parse_parts(&self) -> Option<(&ParseError, &String)> {
        match self.err {
            RungsError::Parse { err, src } => Some((err, src)),
            _ => None,
        }
    }
}

impl fmt::Debug for Reportable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.err, f)
    }
}

impl fmt::Display for Reportable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.err, f)
    }
}

impl std::error::Error for Reportable<'_> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.err.source()
    }
}

impl MietteDiagnostic for Reportable<'_> {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let code = match self.err {
            RungsError::Io(_) => "rungs::io",
            RungsError::Parse { .. } => "rungs::parse",
            RungsError::Model(_) => "rungs::model",
            RungsError::InvalidOutputType(_) => "rungs::output_type",
            RungsError::Render(_) => "rungs::render",
        };
        Some(Box::new(code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        match self.err {
            RungsError::InvalidOutputType(_) => {
                Some(Box::new("expected one of: svg, pdf, json"))
            }
            _ => None,
        }
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        let (_, src) = self.parse_parts()?;
        Some(src as &dyn miette::SourceCode)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let (err, src) = self.parse_parts()?;
        let (offset, message) = match err {
            ParseError::Syntax(syntax) => {
                (syntax.offset(src), syntax.message.clone())
            }
            ParseError::Model { line, source } => {
                (line_offset(src, *line), source.to_string())
            }
            ParseError::Compute(_) => return None,
        };
        let span = SourceSpan::new(offset.into(), 1);
        Some(Box::new(std::iter::once(
            LabeledSpan::new_primary_with_span(Some(message), span),
        )))
    }
}

/// Byte offset of the start of a 1-based line.
fn line_offset(src: &str, line: u32) -> usize {
    src.split('\n')
        .take(line.saturating_sub(1) as usize)
        .map(|l| l.len() + 1)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_error(source: &str) -> RungsError {
        let mut out = Vec::new();
        rungs::render(source, &rungs::RenderOptions::default(), &mut out).unwrap_err()
    }

    #[test]
    fn syntax_errors_carry_a_labeled_span() {
        let err = parse_error("A->B\nadvance x");
        let reportable = Reportable::new(&err);
        assert!(reportable.source_code().is_some());
        let labels: Vec<_> = reportable.labels().unwrap().collect();
        assert_eq!(labels.len(), 1);
        assert!(labels[0].primary());
        // The error points into the second line.
        assert!(labels[0].inner().offset() >= 5);
    }

    #[test]
    fn non_parse_errors_render_plainly() {
        let err = RungsError::InvalidOutputType("gif".to_owned());
        let reportable = Reportable::new(&err);
        assert!(reportable.source_code().is_none());
        assert!(reportable.labels().is_none());
        assert_eq!(reportable.to_string(), "invalid output type: \"gif\"");
    }

    #[test]
    fn line_offsets_are_line_starts() {
        assert_eq!(line_offset("ab\ncd\nef", 1), 0);
        assert_eq!(line_offset("ab\ncd\nef", 2), 3);
        assert_eq!(line_offset("ab\ncd\nef", 3), 6);
    }
}

//! Crate-level error type.

use thiserror::Error;

use crate::ast::ModelError;
use crate::export::RenderError;
use crate::parser::ParseError;

/// Everything that can go wrong between reading source text and writing a
/// finished document.
#[derive(Debug, Error)]
pub enum RungsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A parse failure, carrying the source text so reporters can show
    /// the offending span.
    #[error("{err}")]
    Parse { err: ParseError, src: String },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("invalid output type: {0:?}")]
    InvalidOutputType(String),

    #[error(transparent)]
    Render(#[from] RenderError),
}

impl RungsError {
    pub(crate) fn parse(err: ParseError, src: &str) -> Self {
        RungsError::Parse {
            err,
            src: src.to_owned(),
        }
    }
}

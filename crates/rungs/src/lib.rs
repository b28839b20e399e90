//! Rungs - sequence-of-events diagrams from a small text language.
//!
//! Source text is parsed into a diagram model, a deterministic compute pass
//! resolves every message to concrete ticks, and a render driver walks the
//! result through one of the output backends: SVG, PDF, or a JSON dump of
//! the computed model.
//!
//! # Examples
//!
//! ```rust
//! use rungs::{render, RenderOptions};
//!
//! let source = "title Greeting\nAlice -> Bob: hello";
//! let opts = RenderOptions::default();
//! let mut out = Vec::new();
//! render(source, &opts, &mut out).expect("render failed");
//! assert!(out.starts_with(b"<svg"));
//! ```

pub mod ast;
pub mod geometry;
pub mod parser;

mod driver;
mod error;
mod export;

pub use driver::{Driver, surface_size};
pub use error::RungsError;
pub use export::json::JsonBackend;
pub use export::pdf::PdfBackend;
pub use export::svg::{DEFAULT_CSS, SvgBackend, expand_css};
pub use export::{Backend, OutputKind, PathCmd, RenderError, path_data};

use log::info;

use ast::ComputedDiagram;

/// Options shared by every render entry point.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Output format to produce.
    pub output: OutputKind,
    /// `name=value` property overrides, applied in order after the source's
    /// own `set` statements. A bare `name` sets the property to true.
    pub properties: Vec<String>,
    /// Leave out the project link in the bottom corner.
    pub no_link: bool,
    /// Replacement stylesheet for the SVG backend.
    pub css: Option<String>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            output: OutputKind::Svg,
            properties: Vec::new(),
            no_link: false,
            css: None,
        }
    }
}

/// Parses `source` and renders it to `out` in the requested format.
pub fn render(
    source: &str,
    opts: &RenderOptions,
    out: &mut dyn std::io::Write,
) -> Result<(), RungsError> {
    let mut diag = parser::parse(source).map_err(|err| RungsError::parse(err, source))?;
    render_diagram(&mut diag, opts, out)
}

/// Renders an already-computed diagram. Property overrides from `opts` are
/// applied before the backend sees the diagram.
pub fn render_diagram(
    diag: &mut ComputedDiagram,
    opts: &RenderOptions,
    out: &mut dyn std::io::Write,
) -> Result<(), RungsError> {
    for prop in &opts.properties {
        let (name, value) = match prop.split_once('=') {
            Some((name, value)) => (name.trim(), value.trim()),
            None => (prop.trim(), ""),
        };
        diag.set_prop(name, value)?;
    }

    let (width, height) = surface_size(diag);
    info!(output = opts.output.extension(), width = width, height = height; "rendering diagram");
    match opts.output {
        OutputKind::Svg => {
            let backend = SvgBackend::new(diag, width, height, opts.css.as_deref());
            Driver::new(diag, backend, opts.no_link).draw(out)?;
        }
        OutputKind::Pdf => {
            let backend = PdfBackend::new(diag, width, height);
            Driver::new(diag, backend, opts.no_link).draw(out)?;
        }
        OutputKind::Json => {
            let backend = JsonBackend::new(diag)?;
            Driver::new(diag, backend, opts.no_link).draw(out)?;
        }
    }
    Ok(())
}

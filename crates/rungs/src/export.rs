//! Backend abstraction shared by every output format.
//!
//! The render driver walks the computed diagram and issues drawing calls
//! through the [`Backend`] trait. Backends that genuinely draw (SVG, PDF)
//! implement the whole surface; the JSON backend serializes the model and
//! ignores the drawing calls.

pub mod json;
pub mod pdf;
pub mod svg;

use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

use thiserror::Error;

use crate::error::RungsError;
use crate::geometry::{InvalidCoordinate, Point};

/// Errors raised while driving a backend.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A required backend operation was not supplied.
    #[error("backend does not implement `{0}`")]
    NotImplemented(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Coordinate(#[from] InvalidCoordinate),
}

/// The supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Svg,
    Pdf,
    Json,
}

impl OutputKind {
    /// File extension for outputs of this kind.
    pub fn extension(self) -> &'static str {
        match self {
            OutputKind::Svg => "svg",
            OutputKind::Pdf => "pdf",
            OutputKind::Json => "json",
        }
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputKind {
    type Err = RungsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "svg" => Ok(OutputKind::Svg),
            "pdf" => Ok(OutputKind::Pdf),
            // `js` is a historical alias for the JSON dump.
            "json" | "js" => Ok(OutputKind::Json),
            other => Err(RungsError::InvalidOutputType(other.to_owned())),
        }
    }
}

/// One segment of a path outline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathCmd {
    Move(Point),
    Line(Point),
    Close,
}

/// Renders path segments in SVG path-data syntax, which doubles as the
/// driver's backend-neutral path description.
pub fn path_data(cmds: &[PathCmd]) -> String {
    let mut out = String::new();
    for cmd in cmds {
        if !out.is_empty() {
            out.push(' ');
        }
        match cmd {
            PathCmd::Move(p) => out.push_str(&format!("M {} {}", p.x(), p.y())),
            PathCmd::Line(p) => out.push_str(&format!("L {} {}", p.x(), p.y())),
            PathCmd::Close => out.push('Z'),
        }
    }
    out
}

/// A render target.
///
/// `meta`, `home_link`, the transform pair, and `finish` are required:
/// their defaults fail with [`RenderError::NotImplemented`]. The remaining
/// hooks default to doing nothing so data-only backends can skip them.
pub trait Backend {
    /// Records document metadata (title, generator, date).
    fn meta(&mut self, title: Option<&str>) -> Result<(), RenderError> {
        let _ = title;
        Err(RenderError::NotImplemented("meta"))
    }

    /// Draws the project link in the bottom-right corner.
    fn home_link(&mut self) -> Result<(), RenderError> {
        Err(RenderError::NotImplemented("home_link"))
    }

    /// Enters a coordinate frame translated to `origin` and rotated by
    /// `theta` radians. Must be balanced by [`Backend::end_transform`].
    fn begin_transform(&mut self, origin: Point, theta: f32) -> Result<(), RenderError> {
        let _ = (origin, theta);
        Err(RenderError::NotImplemented("transform"))
    }

    fn end_transform(&mut self) -> Result<(), RenderError> {
        Err(RenderError::NotImplemented("transform"))
    }

    /// Serializes the finished document to `out`.
    fn finish(&mut self, out: &mut dyn Write) -> Result<(), RenderError> {
        let _ = out;
        Err(RenderError::NotImplemented("finish"))
    }

    /// Fills the surface with the background color.
    fn clear(&mut self) -> Result<(), RenderError> {
        Ok(())
    }

    /// Opens a named group of drawing operations.
    fn begin_group(&mut self, name: Option<&str>) -> Result<(), RenderError> {
        let _ = name;
        Ok(())
    }

    fn end_group(&mut self) -> Result<(), RenderError> {
        Ok(())
    }

    /// Draws a text label. `classes` carries both styling tags and the
    /// text alignment tag (`start`, `center`, `end`, ...). A rotated label
    /// supplies the rotation angle in radians.
    fn draw_label(
        &mut self,
        at: Point,
        text: &str,
        classes: &str,
        angle: Option<f32>,
    ) -> Result<(), RenderError> {
        let _ = (at, text, classes, angle);
        Ok(())
    }

    /// Draws a path styled by the given class tags.
    fn draw_path(&mut self, cmds: &[PathCmd], classes: &str) -> Result<(), RenderError> {
        let _ = (cmds, classes);
        Ok(())
    }
}

impl<B: Backend + ?Sized> Backend for &mut B {
    fn meta(&mut self, title: Option<&str>) -> Result<(), RenderError> {
        (**self).meta(title)
    }

    fn home_link(&mut self) -> Result<(), RenderError> {
        (**self).home_link()
    }

    fn begin_transform(&mut self, origin: Point, theta: f32) -> Result<(), RenderError> {
        (**self).begin_transform(origin, theta)
    }

    fn end_transform(&mut self) -> Result<(), RenderError> {
        (**self).end_transform()
    }

    fn finish(&mut self, out: &mut dyn Write) -> Result<(), RenderError> {
        (**self).finish(out)
    }

    fn clear(&mut self) -> Result<(), RenderError> {
        (**self).clear()
    }

    fn begin_group(&mut self, name: Option<&str>) -> Result<(), RenderError> {
        (**self).begin_group(name)
    }

    fn end_group(&mut self) -> Result<(), RenderError> {
        (**self).end_group()
    }

    fn draw_label(
        &mut self,
        at: Point,
        text: &str,
        classes: &str,
        angle: Option<f32>,
    ) -> Result<(), RenderError> {
        (**self).draw_label(at, text, classes, angle)
    }

    fn draw_path(&mut self, cmds: &[PathCmd], classes: &str) -> Result<(), RenderError> {
        (**self).draw_path(cmds, classes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_kind_parsing() {
        assert_eq!("svg".parse::<OutputKind>().unwrap(), OutputKind::Svg);
        assert_eq!("pdf".parse::<OutputKind>().unwrap(), OutputKind::Pdf);
        assert_eq!("json".parse::<OutputKind>().unwrap(), OutputKind::Json);
        assert_eq!("js".parse::<OutputKind>().unwrap(), OutputKind::Json);
        assert!(matches!(
            "gif".parse::<OutputKind>(),
            Err(RungsError::InvalidOutputType(kind)) if kind == "gif"
        ));
    }

    #[test]
    fn path_data_round_numbers_have_no_fraction() {
        let p1 = Point::new(10.0, 20.0).unwrap();
        let p2 = Point::new(30.5, -4.25).unwrap();
        let d = path_data(&[PathCmd::Move(p1), PathCmd::Line(p2), PathCmd::Close]);
        assert_eq!(d, "M 10 20 L 30.5 -4.25 Z");
    }

    struct Bare;
    impl Backend for Bare {}

    #[test]
    fn required_operations_fail_loudly_by_default() {
        let mut b = Bare;
        assert!(matches!(
            b.meta(None),
            Err(RenderError::NotImplemented("meta"))
        ));
        assert!(matches!(
            b.home_link(),
            Err(RenderError::NotImplemented("home_link"))
        ));
        assert!(matches!(
            b.finish(&mut Vec::new()),
            Err(RenderError::NotImplemented("finish"))
        ));
    }

    #[test]
    fn optional_hooks_default_to_no_ops() {
        let mut b = Bare;
        assert!(b.clear().is_ok());
        assert!(b.begin_group(Some("g")).is_ok());
        assert!(b.end_group().is_ok());
        assert!(b.draw_path(&[], "solid").is_ok());
    }
}

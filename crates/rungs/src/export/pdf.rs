//! PDF backend built on [`lopdf`].
//!
//! PDF puts the origin at the bottom-left with y growing upward, while the
//! diagram model uses screen coordinates (origin top-left, y down). Outside
//! any transform, points are mapped to device space as `(x, height - y)`.
//! `begin_transform` installs a translate/rotate/flip matrix chain so that
//! code drawing inside the transform (arrowheads) keeps using screen-style
//! local coordinates.
//!
//! Text metrics are approximated: the built-in Helvetica font is used
//! without an embedded width table, so label widths are estimated from an
//! average glyph width. Alignment is close but not glyph-exact.

use std::io::Write;

use chrono::Utc;
use log::warn;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream, dictionary};

use crate::ast::{ComputedDiagram, Props};
use crate::export::{Backend, PathCmd, RenderError};
use crate::geometry::Point;

// Fraction of the font size from the top of a line box down to the
// baseline, and the line box height itself. Rough Helvetica values.
const ASCENT: f32 = 0.8;
const LINE_HEIGHT: f32 = 1.15;
const AVG_GLYPH_WIDTH: f32 = 0.5;

const FONT_NAME: &str = "F1";

pub struct PdfBackend {
    props: Props,
    width: f32,
    height: f32,
    ops: Vec<Operation>,
    annotations: Vec<Dictionary>,
    transform_depth: usize,
    title: Option<String>,
    creator: Option<String>,
}

/// How a resolved path style is painted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrawStyle {
    Stroke,
    Fill,
    FillAndStroke,
}

/// Resolved drawing state for one space-separated class list.
struct PathStyle {
    stroke: (f32, f32, f32),
    fill: Option<(f32, f32, f32)>,
    line_width: f32,
    dash: Option<Vec<f32>>,
    round_cap: bool,
    round_join: bool,
    draw: DrawStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Start,
    Center,
    End,
}

fn hex_channel(s: &str) -> Option<f32> {
    u8::from_str_radix(s, 16).ok().map(|v| f32::from(v) / 255.0)
}

/// Parses a CSS-style color into RGB components in 0..=1.
fn color_rgb(color: &str) -> (f32, f32, f32) {
    let c = color.trim().to_ascii_lowercase();
    if let Some(hex) = c.strip_prefix('#') {
        let parsed = match hex.len() {
            3 => {
                let ch = |i: usize| {
                    let d = &hex[i..=i];
                    hex_channel(&format!("{d}{d}"))
                };
                ch(0).zip(ch(1)).zip(ch(2)).map(|((r, g), b)| (r, g, b))
            }
            6 => hex_channel(&hex[0..2])
                .zip(hex_channel(&hex[2..4]))
                .zip(hex_channel(&hex[4..6]))
                .map(|((r, g), b)| (r, g, b)),
            _ => None,
        };
        if let Some(rgb) = parsed {
            return rgb;
        }
        warn!(color = color; "unparseable hex color, using black");
        return (0.0, 0.0, 0.0);
    }
    match c.as_str() {
        "black" => (0.0, 0.0, 0.0),
        "white" => (1.0, 1.0, 1.0),
        "red" => (1.0, 0.0, 0.0),
        "green" => (0.0, 0.5, 0.0),
        "blue" => (0.0, 0.0, 1.0),
        "yellow" => (1.0, 1.0, 0.0),
        "cyan" => (0.0, 1.0, 1.0),
        "magenta" => (1.0, 0.0, 1.0),
        "orange" => (1.0, 0.65, 0.0),
        "purple" => (0.5, 0.0, 0.5),
        "gray" | "grey" => (0.5, 0.5, 0.5),
        "silver" => (0.75, 0.75, 0.75),
        _ => {
            warn!(color = color; "unknown color name, using black");
            (0.0, 0.0, 0.0)
        }
    }
}

/// Estimated width of a string at the given font size.
fn text_width(s: &str, size: f32) -> f32 {
    AVG_GLYPH_WIDTH * size * s.chars().count() as f32
}

impl PdfBackend {
    pub fn new(diag: &ComputedDiagram, width: f32, height: f32) -> Self {
        Self {
            props: diag.diagram().props().clone(),
            width,
            height,
            ops: Vec::new(),
            annotations: Vec::new(),
            transform_depth: 0,
            title: None,
            creator: None,
        }
    }

    /// Maps a screen point into the current drawing space. Inside a
    /// transform the flip matrix already made local coordinates
    /// screen-style, so they pass through untouched.
    fn dev(&self, p: Point) -> (f32, f32) {
        if self.transform_depth == 0 {
            (p.x(), self.height - p.y())
        } else {
            (p.x(), p.y())
        }
    }

    fn op(&mut self, operator: &str, operands: Vec<Object>) {
        self.ops.push(Operation::new(operator, operands));
    }

    /// Resolves a class list against the property map, mirroring the CSS
    /// rules the SVG backend ships.
    fn path_style(&self, classes: &str) -> PathStyle {
        let p = &self.props;
        let mut style = PathStyle {
            stroke: color_rgb(&p.line_color),
            fill: None,
            line_width: p.line_width,
            dash: None,
            round_cap: false,
            round_join: false,
            draw: DrawStyle::Stroke,
        };
        for class in classes.split_whitespace() {
            match class {
                "rung" => {
                    style.stroke = color_rgb(&p.rung_color);
                    style.line_width = p.rung_width;
                }
                "open" => {
                    style.stroke = color_rgb(&p.arrow_color);
                    style.round_cap = true;
                }
                "closed" => {
                    let c = color_rgb(&p.arrow_color);
                    style.stroke = c;
                    style.fill = Some(c);
                    style.draw = DrawStyle::FillAndStroke;
                }
                "dashed" => style.dash = Some(vec![6.0, 2.0]),
                "solid" => style.dash = None,
                "block" => {
                    style.stroke = color_rgb(&p.block_stroke);
                    style.dash = Some(vec![2.0, 1.0]);
                    style.round_join = true;
                }
                "block_tab" => {
                    style.fill = Some(color_rgb(&p.block_tab_fill));
                    style.draw = DrawStyle::Fill;
                }
                // Shape tags carry no paint of their own.
                "closed_forward" | "open_forward" | "closed_back" | "open_back" | "self" => {}
                other => warn!(class = other; "unknown style class"),
            }
        }
        style
    }

    fn text_align(classes: &str) -> Align {
        let mut align = Align::Center;
        for class in classes.split_whitespace() {
            match class {
                "start" => align = Align::Start,
                "center" => align = Align::Center,
                "end" => align = Align::End,
                _ => {}
            }
        }
        align
    }

    /// Emits text with its baseline at `(x, y)` in the current space.
    fn show_text(&mut self, x: f32, y: f32, text: &str, fill: (f32, f32, f32)) {
        let size = self.props.text_size;
        self.op("BT", vec![]);
        self.op("Tf", vec![FONT_NAME.into(), size.into()]);
        self.op("rg", vec![fill.0.into(), fill.1.into(), fill.2.into()]);
        self.op("Td", vec![x.into(), y.into()]);
        self.op("Tj", vec![Object::string_literal(text)]);
        self.op("ET", vec![]);
    }

    /// Draws an aligned string anchored at a screen point, the anchor being
    /// the bottom of the line box. Returns the estimated extent.
    fn draw_string(
        &mut self,
        p: Point,
        text: &str,
        align: Align,
        fill: (f32, f32, f32),
    ) -> (f32, f32) {
        let size = self.props.text_size;
        let w = text_width(text, size);
        let h = LINE_HEIGHT * size;
        let dx = match align {
            Align::Start => 0.0,
            Align::Center => -w / 2.0,
            Align::End => -w,
        };
        let x = p.x() + dx;
        let baseline = p.y() - h + ASCENT * size;
        let y = self.height - baseline;
        self.show_text(x, y, text, fill);
        (w, h)
    }

    fn stroke_line(&mut self, from: (f32, f32), to: (f32, f32), color: (f32, f32, f32)) {
        self.op("q", vec![]);
        self.op("RG", vec![color.0.into(), color.1.into(), color.2.into()]);
        self.op("w", vec![1.0_f32.into()]);
        self.op("m", vec![from.0.into(), from.1.into()]);
        self.op("l", vec![to.0.into(), to.1.into()]);
        self.op("S", vec![]);
        self.op("Q", vec![]);
    }

    fn push_link(&mut self, rect: [f32; 4], uri: &str) {
        self.annotations.push(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Link",
            "Rect" => rect.iter().map(|v| Object::Real(*v)).collect::<Vec<_>>(),
            "Border" => vec![0.into(), 0.into(), 0.into()],
            "A" => dictionary! {
                "Type" => "Action",
                "S" => "URI",
                "URI" => Object::string_literal(uri),
            },
        });
    }
}

impl Backend for PdfBackend {
    fn meta(&mut self, title: Option<&str>) -> Result<(), RenderError> {
        self.title = title.map(str::to_owned);
        self.creator = Some(format!(
            "{}: {}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_HOMEPAGE"),
        ));
        Ok(())
    }

    fn home_link(&mut self) -> Result<(), RenderError> {
        let text_color = color_rgb(&self.props.text_color);
        let corner = Point::new(self.width - 5.0, self.height - 5.0)
            .map_err(RenderError::Coordinate)?;

        let version = format!("v{}", env!("CARGO_PKG_VERSION"));
        let (vw, _) = self.draw_string(corner, &version, Align::End, text_color);

        let name = env!("CARGO_PKG_NAME");
        let homepage = env!("CARGO_PKG_HOMEPAGE");
        let blue = color_rgb("blue");
        let anchor = corner.adjust(-vw - 3.0, 0.0);
        let (w, h) = self.draw_string(anchor, name, Align::End, blue);

        // Underline and a link annotation over the project name.
        let left = anchor.x() - w;
        let bottom = self.height - anchor.y();
        self.stroke_line((left, bottom - 1.0), (left + w, bottom - 1.0), blue);
        self.push_link([left, bottom, left + w, bottom + h], homepage);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), RenderError> {
        let bg = color_rgb(&self.props.background);
        self.op("q", vec![]);
        self.op("rg", vec![bg.0.into(), bg.1.into(), bg.2.into()]);
        self.op(
            "re",
            vec![
                0.0_f32.into(),
                0.0_f32.into(),
                self.width.into(),
                self.height.into(),
            ],
        );
        self.op("f", vec![]);
        self.op("Q", vec![]);
        Ok(())
    }

    fn begin_transform(&mut self, origin: Point, theta: f32) -> Result<(), RenderError> {
        let (x, y) = self.dev(origin);
        self.op("q", vec![]);
        self.op(
            "cm",
            vec![
                1.0_f32.into(),
                0.0_f32.into(),
                0.0_f32.into(),
                1.0_f32.into(),
                x.into(),
                y.into(),
            ],
        );
        if theta != 0.0 {
            // Screen angles are clockwise-positive; device space rotates
            // counter-clockwise, so negate.
            let (sin, cos) = (-theta).sin_cos();
            self.op(
                "cm",
                vec![
                    cos.into(),
                    sin.into(),
                    (-sin).into(),
                    cos.into(),
                    0.0_f32.into(),
                    0.0_f32.into(),
                ],
            );
        }
        // Flip the local y axis so nested drawing stays screen-style.
        self.op(
            "cm",
            vec![
                1.0_f32.into(),
                0.0_f32.into(),
                0.0_f32.into(),
                (-1.0_f32).into(),
                0.0_f32.into(),
                0.0_f32.into(),
            ],
        );
        self.transform_depth += 1;
        Ok(())
    }

    fn end_transform(&mut self) -> Result<(), RenderError> {
        self.op("Q", vec![]);
        self.transform_depth = self.transform_depth.saturating_sub(1);
        Ok(())
    }

    fn draw_label(
        &mut self,
        at: Point,
        text: &str,
        classes: &str,
        angle: Option<f32>,
    ) -> Result<(), RenderError> {
        if text.is_empty() {
            return Ok(());
        }
        let align = Self::text_align(classes);
        let fill = color_rgb(&self.props.text_color);
        match angle.filter(|a| *a != 0.0) {
            None => {
                self.draw_string(at, text, align, fill);
            }
            Some(theta) => {
                // Rotate about the anchor, then lay the string out in the
                // rotated frame.
                let size = self.props.text_size;
                let (x, y) = (at.x(), self.height - at.y());
                let (sin, cos) = (-theta).sin_cos();
                self.op("q", vec![]);
                self.op(
                    "cm",
                    vec![
                        cos.into(),
                        sin.into(),
                        (-sin).into(),
                        cos.into(),
                        x.into(),
                        y.into(),
                    ],
                );
                let w = text_width(text, size);
                let dx = match align {
                    Align::Start => 0.0,
                    Align::Center => -w / 2.0,
                    Align::End => -w,
                };
                let dy = (LINE_HEIGHT - ASCENT) * size;
                self.show_text(dx, dy, text, fill);
                self.op("Q", vec![]);
            }
        }
        Ok(())
    }

    fn draw_path(&mut self, cmds: &[PathCmd], classes: &str) -> Result<(), RenderError> {
        let style = self.path_style(classes);
        self.op("q", vec![]);
        let (r, g, b) = style.stroke;
        self.op("RG", vec![r.into(), g.into(), b.into()]);
        if let Some((r, g, b)) = style.fill {
            self.op("rg", vec![r.into(), g.into(), b.into()]);
        }
        self.op("w", vec![style.line_width.into()]);
        if let Some(dash) = &style.dash {
            let pattern = dash.iter().map(|v| Object::Real(*v)).collect::<Vec<_>>();
            self.op("d", vec![pattern.into(), 0.into()]);
        }
        if style.round_cap {
            self.op("J", vec![1.into()]);
        }
        if style.round_join {
            self.op("j", vec![1.into()]);
        }
        for cmd in cmds {
            match cmd {
                PathCmd::Move(p) => {
                    let (x, y) = self.dev(*p);
                    self.op("m", vec![x.into(), y.into()]);
                }
                PathCmd::Line(p) => {
                    let (x, y) = self.dev(*p);
                    self.op("l", vec![x.into(), y.into()]);
                }
                PathCmd::Close => self.op("h", vec![]),
            }
        }
        match style.draw {
            DrawStyle::Stroke => self.op("S", vec![]),
            DrawStyle::Fill => self.op("f", vec![]),
            DrawStyle::FillAndStroke => self.op("B", vec![]),
        }
        self.op("Q", vec![]);
        Ok(())
    }

    fn finish(&mut self, mut out: &mut dyn Write) -> Result<(), RenderError> {
        let mut doc = Document::with_version("1.5");

        let content = Content {
            operations: std::mem::take(&mut self.ops),
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { FONT_NAME => font_id },
        });

        let annots = std::mem::take(&mut self.annotations)
            .into_iter()
            .map(|a| Object::Reference(doc.add_object(a)))
            .collect::<Vec<_>>();

        let pages_id = doc.new_object_id();
        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                0.into(),
                0.into(),
                Object::Real(self.width),
                Object::Real(self.height),
            ],
            "Contents" => content_id,
            "Resources" => resources_id,
        };
        if !annots.is_empty() {
            page.set("Annots", annots);
        }
        let page_id = doc.add_object(page);

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut info = Dictionary::new();
        if let Some(title) = &self.title {
            info.set("Title", Object::string_literal(title.as_str()));
        }
        if let Some(creator) = &self.creator {
            info.set("Creator", Object::string_literal(creator.as_str()));
        }
        info.set(
            "CreationDate",
            Object::string_literal(Utc::now().format("D:%Y%m%d%H%M%SZ").to_string()),
        );
        let info_id = doc.add_object(info);
        doc.trailer.set("Info", info_id);

        doc.save_to(&mut out)?;
        Ok(())
    }
}

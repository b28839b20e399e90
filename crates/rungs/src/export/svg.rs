//! SVG backend.
//!
//! Produces a standalone `<svg>` document styled by a CSS stylesheet whose
//! `[property]` placeholders are expanded from the diagram property map.
//! Callers can substitute their own stylesheet; the placeholders work the
//! same way there.

use std::io::Write;
use std::sync::LazyLock;

use chrono::Utc;
use regex::{Captures, Regex};
use svg::Document;
use svg::Node;
use svg::node::element as svg_element;

use crate::ast::{ComputedDiagram, Props};
use crate::export::{Backend, PathCmd, RenderError, path_data};
use crate::geometry::Point;

/// Bundled stylesheet, in pre-expanded form.
pub const DEFAULT_CSS: &str = include_str!("svg.css");

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([a-z_]+)\]").unwrap());

/// Replaces `[property]` placeholders with values from the property map.
/// Unknown names are left untouched.
pub fn expand_css(css: &str, props: &Props) -> String {
    PLACEHOLDER_RE
        .replace_all(css, |caps: &Captures<'_>| {
            props.lookup(&caps[1]).unwrap_or_else(|| caps[0].to_owned())
        })
        .into_owned()
}

pub struct SvgBackend {
    doc: Document,
    stack: Vec<svg_element::Group>,
    path_count: usize,
    width: f32,
    height: f32,
    background: String,
    text_color: String,
}

impl SvgBackend {
    pub fn new(diag: &ComputedDiagram, width: f32, height: f32, css: Option<&str>) -> Self {
        let props = diag.diagram().props();
        let css = expand_css(css.unwrap_or(DEFAULT_CSS), props);
        let doc = Document::new()
            .set("baseProfile", "full")
            .set("xmlns:xl", "http://www.w3.org/1999/xlink")
            .set("width", width)
            .set("height", height)
            .add(svg_element::Definitions::new().add(
                svg_element::Style::new(css).set("type", "text/css"),
            ));
        Self {
            doc,
            stack: Vec::new(),
            path_count: 0,
            width,
            height,
            background: props.background.clone(),
            text_color: props.text_color.clone(),
        }
    }

    fn append<N: svg::Node>(&mut self, node: N) {
        match self.stack.last_mut() {
            Some(top) => {
                let group = std::mem::replace(top, svg_element::Group::new());
                *top = group.add(node);
            }
            None => {
                let doc = std::mem::replace(&mut self.doc, Document::new());
                self.doc = doc.add(node);
            }
        }
    }

    fn pop_group(&mut self) {
        if let Some(group) = self.stack.pop() {
            self.append(group);
        }
    }
}

/// Builds an element that only holds character data (`<title>`, `<desc>`,
/// `<tspan>`, ...).
fn text_element(tag: &str, content: &str) -> svg_element::Element {
    let mut el = svg_element::Element::new(tag);
    el.append(svg::node::Text::new(content));
    el
}

fn degrees(theta: f32) -> f32 {
    theta * 180.0 / std::f32::consts::PI
}

impl Backend for SvgBackend {
    fn meta(&mut self, title: Option<&str>) -> Result<(), RenderError> {
        let mut metadata = svg_element::Element::new("metadata");
        metadata.assign("xmlns:dc", "http://purl.org/dc/elements/1.1/");
        metadata.append(text_element("dc:date", &Utc::now().to_rfc3339()));
        metadata.append(svg::node::Comment::new(format!(
            "Produced by {}: {}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_HOMEPAGE"),
        )));
        self.append(metadata);
        if let Some(title) = title {
            self.append(text_element("title", title));
        }
        Ok(())
    }

    fn home_link(&mut self) -> Result<(), RenderError> {
        let homepage = env!("CARGO_PKG_HOMEPAGE");
        let mut link_span = text_element("tspan", homepage);
        link_span.assign("baseline-shift", "100%");
        link_span.assign("fill", "blue");
        link_span.assign("text-decoration", "underline");
        let mut anchor = svg_element::Anchor::new().add(link_span);
        anchor.assign("xl:href", homepage);
        let mut version_span = text_element("tspan", &format!("v{}", env!("CARGO_PKG_VERSION")));
        version_span.assign("baseline-shift", "100%");
        version_span.assign("fill", self.text_color.as_str());
        let text = svg_element::Text::new("")
            .set("text-anchor", "end")
            .set("x", self.width)
            .set("y", self.height)
            .add(anchor)
            .add(version_span);
        self.append(text);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), RenderError> {
        let rect = svg_element::Rectangle::new()
            .set("x", 0)
            .set("y", 0)
            .set("width", self.width)
            .set("height", self.height)
            .set("fill", self.background.as_str());
        self.append(rect);
        Ok(())
    }

    fn begin_group(&mut self, name: Option<&str>) -> Result<(), RenderError> {
        let mut group = svg_element::Group::new();
        if let Some(name) = name {
            group = group.add(text_element("desc", name));
        }
        self.stack.push(group);
        Ok(())
    }

    fn end_group(&mut self) -> Result<(), RenderError> {
        self.pop_group();
        Ok(())
    }

    fn begin_transform(&mut self, origin: Point, theta: f32) -> Result<(), RenderError> {
        let mut parts = Vec::new();
        if origin.x() != 0.0 || origin.y() != 0.0 {
            parts.push(format!("translate({}, {})", origin.x(), origin.y()));
        }
        if theta != 0.0 {
            parts.push(format!("rotate({})", degrees(theta)));
        }
        let mut group = svg_element::Group::new();
        if !parts.is_empty() {
            group = group.set("transform", parts.join(", "));
        }
        self.stack.push(group);
        Ok(())
    }

    fn end_transform(&mut self) -> Result<(), RenderError> {
        self.pop_group();
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
        let mut node = svg_element::Text::new(text)
            .set("class", classes)
            .set("x", at.x())
            .set("y", at.y());
        if let Some(angle) = angle.filter(|a| *a != 0.0) {
            node = node.set(
                "transform",
                format!("rotate({}, {}, {})", degrees(angle), at.x(), at.y()),
            );
        }
        self.append(node);
        Ok(())
    }

    fn draw_path(&mut self, cmds: &[PathCmd], classes: &str) -> Result<(), RenderError> {
        let path = svg_element::Path::new()
            .set("d", path_data(cmds))
            .set("id", format!("p_{}", self.path_count))
            .set("class", classes);
        self.path_count += 1;
        self.append(path);
        Ok(())
    }

    fn finish(&mut self, out: &mut dyn Write) -> Result<(), RenderError> {
        // Balanced group calls leave the stack empty by now.
        while !self.stack.is_empty() {
            self.pop_group();
        }
        let doc = std::mem::replace(&mut self.doc, Document::new());
        svg::write(out, &doc)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{Driver, surface_size};
    use crate::parser::parse;

    fn render(source: &str) -> String {
        let diag = parse(source).unwrap();
        let (width, height) = surface_size(&diag);
        let backend = SvgBackend::new(&diag, width, height, None);
        let mut out = Vec::new();
        Driver::new(&diag, backend, false).draw(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn css_placeholders_expand_from_props() {
        let mut props = Props::default();
        props.set("line_color", "red").unwrap();
        let css = expand_css("path { stroke: [line_color]; width: [line_width] }", &props);
        assert_eq!(css, "path { stroke: red; width: 1 }");
    }

    #[test]
    fn unknown_placeholders_are_left_alone() {
        let css = expand_css("a { b: [who_knows] }", &Props::default());
        assert_eq!(css, "a { b: [who_knows] }");
    }

    #[test]
    fn document_is_well_formed_xml() {
        let out = render("title Hi\nA->B: hello\nA->A: me\nloop twice\nB-->>A\nend");
        let doc = roxmltree::Document::parse(&out).unwrap();
        assert_eq!(doc.root_element().tag_name().name(), "svg");
    }

    #[test]
    fn root_carries_size_and_stylesheet() {
        let out = render("A->B");
        let doc = roxmltree::Document::parse(&out).unwrap();
        let root = doc.root_element();
        assert_eq!(root.attribute("width"), Some("375"));
        let style = doc
            .descendants()
            .find(|n| n.has_tag_name("style"))
            .unwrap();
        let css = style.text().unwrap();
        assert!(css.contains("font-family: Helvetica"));
        assert!(css.contains("font-size: 13px"));
        assert!(!css.contains('['), "unexpanded placeholder in: {css}");
    }

    #[test]
    fn paths_get_sequential_ids_and_classes() {
        let out = render("A->B\nB-->>A");
        let doc = roxmltree::Document::parse(&out).unwrap();
        let ids: Vec<_> = doc
            .descendants()
            .filter(|n| n.has_tag_name("path"))
            .filter_map(|n| n.attribute("id"))
            .collect();
        assert!(ids.contains(&"p_0"));
        assert!(ids.contains(&"p_1"));
        assert!(
            doc.descendants()
                .filter(|n| n.has_tag_name("path"))
                .any(|n| n.attribute("class") == Some("dashed open_forward"))
        );
    }

    #[test]
    fn groups_carry_descriptions() {
        let out = render("A->B");
        let doc = roxmltree::Document::parse(&out).unwrap();
        let descs: Vec<_> = doc
            .descendants()
            .filter(|n| n.has_tag_name("desc"))
            .filter_map(|n| n.text())
            .collect();
        assert!(descs.contains(&"participants"));
        assert!(descs.contains(&"participant: A"));
    }

    #[test]
    fn background_rect_unless_no_clear() {
        let with = render("A->B");
        assert!(with.contains("rect"));
        let without = render("set no_clear\nA->B");
        assert!(!without.contains("rect"));
    }

    #[test]
    fn home_link_has_xlink_href() {
        let out = render("A->B");
        assert!(out.contains("xl:href"));
        let without = render("set no_link\nA->B");
        assert!(!without.contains("xl:href"));
    }

    #[test]
    fn rotated_labels_use_a_rotate_transform() {
        // A message over unequal ticks makes a sloped line, so the label
        // rotates to follow it.
        let out = render("A->B: slanted [duration=2]");
        assert!(out.contains("rotate("));
    }
}

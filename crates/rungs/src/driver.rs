//! Backend-agnostic render driver.
//!
//! The driver owns all layout math: it converts (column, tick) pairs to
//! surface coordinates and walks the computed diagram, issuing drawing
//! calls through the [`Backend`] trait. Backends never see ticks or
//! columns, only points, class tags, and label text.

use std::f32::consts::{FRAC_PI_2, PI};
use std::io::Write;

use log::debug;

use crate::ast::{Block, BlockKind, ComputedDiagram, Endpoint, Head, MessageStep, Props, Step};
use crate::export::{Backend, PathCmd, RenderError};
use crate::geometry::{Point, Position};

/// X coordinate of a (possibly fractional) column center.
pub fn column_to_x(props: &Props, col: f32) -> f32 {
    (col + 0.5) * props.column_width
}

/// Y coordinate of a (possibly fractional, possibly negative) tick.
pub fn time_to_y(props: &Props, tick: f32) -> f32 {
    (tick + 5.0) * props.time_height
}

/// Total surface size for a computed diagram.
pub fn surface_size(diag: &ComputedDiagram) -> (f32, f32) {
    let d = diag.diagram();
    let props = d.props();
    (
        column_to_x(props, d.parts().len() as f32),
        time_to_y(props, (d.max_tick() + 5) as f32),
    )
}

/// Walks a computed diagram and drives a backend.
pub struct Driver<'a, B> {
    diag: &'a ComputedDiagram,
    backend: B,
    suppress_link: bool,
}

impl<'a, B: Backend> Driver<'a, B> {
    pub fn new(diag: &'a ComputedDiagram, backend: B, suppress_link: bool) -> Self {
        Self {
            diag,
            backend,
            suppress_link,
        }
    }

    fn props(&self) -> &Props {
        self.diag.diagram().props()
    }

    fn position(&self, col: f32, tick: f32) -> Result<Position, RenderError> {
        let props = self.props();
        let point = Point::new(column_to_x(props, col), time_to_y(props, tick))?;
        Ok(Position::new(point, col, tick))
    }

    fn endpoint_position(&self, ep: &Endpoint) -> Result<Position, RenderError> {
        self.position(ep.col as f32, ep.tick() as f32)
    }

    /// Renders the whole diagram and serializes the backend's document.
    pub fn draw(mut self, out: &mut dyn Write) -> Result<(), RenderError> {
        let d = self.diag.diagram();
        debug!(
            participants = d.parts().len(),
            steps = d.steps().len();
            "drawing diagram"
        );

        self.backend.meta(d.title())?;
        if !self.props().no_clear {
            self.backend.clear()?;
        }

        if let Some(title) = d.title() {
            let at = self.position((d.parts().len() as f32 - 1.0) / 2.0, -4.0)?;
            self.backend.draw_label(at.point(), title, "title", None)?;
        }

        if !self.props().no_link && !self.suppress_link {
            self.backend.home_link()?;
        }

        self.draw_participants()?;

        for step in d.steps() {
            match step {
                Step::Message(m) => self.draw_arrow(m)?,
                Step::SelfMessage(m) => self.draw_self_arrow(m)?,
                Step::Note { from, text, .. } => self.draw_note(from, text)?,
                Step::BlockBegin { block, .. } => self.draw_block(&d.blocks()[*block])?,
                Step::Advance { .. } | Step::BlockEnd { .. } => {}
            }
        }

        self.backend.finish(out)
    }

    fn draw_line(&mut self, p1: Point, p2: Point, classes: &str) -> Result<(), RenderError> {
        self.backend
            .draw_path(&[PathCmd::Move(p1), PathCmd::Line(p2)], classes)
    }

    fn draw_participants(&mut self) -> Result<(), RenderError> {
        let d = self.diag.diagram();
        let max_tick = d.max_tick() as f32;
        self.backend.begin_group(Some("participants"))?;
        for part in d.parts().iter() {
            let col = part.col as f32;
            let desc = part.desc.clone();
            self.backend
                .begin_group(Some(&format!("participant: {desc}")))?;
            let head = self.position(col, -2.0)?;
            self.backend
                .draw_label(head.point(), &desc, "rung_label", None)?;
            let top = self.position(col, -1.0)?.point();
            let bottom = self.position(col, max_tick + 1.0)?.point();
            self.draw_line(top, bottom, "rung")?;
            if !self.props().no_feet {
                let foot = self.position(col, max_tick + 3.0)?;
                self.backend
                    .draw_label(foot.point(), &desc, "rung_label", None)?;
            }
            self.backend.end_group()?;
        }
        self.backend.end_group()
    }

    fn draw_arrow(&mut self, m: &MessageStep) -> Result<(), RenderError> {
        let props = self.props();
        let half_rung = props.rung_width / 2.0;
        let half_arrow = props.arrow_height / 2.0;
        let line_width = props.line_width;
        let label_space_x = props.label_space_x;

        let mut p1 = self.endpoint_position(&m.from)?.point();
        let mut p2 = self.endpoint_position(&m.to)?.point();
        let p2o = p2;

        let left_to_right = m.to.col > m.from.col;
        let dir: f32 = if left_to_right { -1.0 } else { 1.0 };
        let mut begin_adj = 0.0;
        let mut end_adj = dir;
        let mut begin_angle = 0.0;
        let mut end_angle = 0.0;

        // Bring each end of the line to the edge of the rung.
        p1 = p1.adjust(-dir * half_rung, 0.0);
        p2 = p2.adjust(dir * half_rung, 0.0);

        let mut text_align;
        let mut text_anchor;
        if left_to_right {
            text_align = "start";
            text_anchor = p1.adjust(label_space_x, 0.0);
            begin_angle = PI;
        } else {
            text_align = "end";
            text_anchor = p1.adjust(-label_space_x, 0.0);
            end_angle = PI;
        }

        let rangle = p1.angle(p2);
        if m.arrow.end == Head::Half {
            end_adj *= half_arrow;
            if m.from.col.abs_diff(m.to.col) == 1 {
                // Adjacent columns: the head sits midway. Can't be zero
                // columns apart, that would be a self-message.
                p2 = p1.midpoint(p2);
            } else {
                // Otherwise half a notch up from the midpoint between the
                // end and its adjacent column. The subtraction vanishes
                // for flat lines.
                let tick = m.to.tick() as f32
                    - if m.to.tick() == m.from.tick() { 0.0 } else { 0.5 };
                let near = self.position(m.to.col as f32 + dir, tick)?.point();
                p2 = near.midpoint(p2o);
            }
            p2 = p2.polar_adjust(-dir * half_arrow, rangle);
        } else {
            p2 = p2.polar_adjust(dir * (line_width - 1.0), rangle);
        }

        if m.arrow.begin.is_some() {
            begin_adj = -2.0 * dir;
            text_align = "center";
            text_anchor = p1.midpoint(p2);
            p1 = p1.polar_adjust(-dir * (line_width - 1.0), rangle);
        }

        self.draw_line(
            p1.polar_adjust(begin_adj, rangle),
            p2.polar_adjust(end_adj, rangle),
            &m.arrow.classes(),
        )?;

        self.arrow_head(p2, rangle + end_angle, m.arrow.end)?;
        if let Some(begin) = m.arrow.begin {
            self.arrow_head(p1, rangle + begin_angle, begin)?;
        }

        if let Some(text) = &m.text {
            // Ooch the label up a little, normal to the line.
            let at = text_anchor.polar_adjust(line_width / 2.0 + 2.0, rangle - FRAC_PI_2);
            self.backend.draw_label(at, text, text_align, Some(rangle))?;
        }
        Ok(())
    }

    fn draw_self_arrow(&mut self, m: &MessageStep) -> Result<(), RenderError> {
        let props = self.props();
        let self_width = props.column_width / 4.0;
        let half_rung = props.rung_width / 2.0;
        let label_space_x = props.label_space_x;
        let label_space_y = props.label_space_y;

        let p1 = self.endpoint_position(&m.from)?.point();
        let p2 = self.endpoint_position(&m.to)?.point();
        let mut end = p2;
        let begin_adj = if m.arrow.begin.is_some() { 1.0 } else { 0.0 };
        let mut end_adj = 1.0;

        if m.arrow.end == Head::Half {
            end = p2.adjust(self_width / 2.0, 0.0);
            end_adj *= 5.0;
        }

        self.backend
            .begin_group(Some(&format!("message: {m}")))?;
        self.backend.draw_path(
            &[
                PathCmd::Move(p1.adjust(half_rung + begin_adj, 0.0)),
                PathCmd::Line(p1.adjust(self_width, 0.0)),
                PathCmd::Line(p2.adjust(self_width, 0.0)),
                PathCmd::Line(end.adjust(half_rung + end_adj, 0.0)),
            ],
            &format!("{} self", m.arrow.classes()),
        )?;

        self.arrow_head(end.adjust(half_rung, 0.0), PI, m.arrow.end)?;
        if let Some(begin) = m.arrow.begin {
            self.arrow_head(p1.adjust(half_rung, 0.0), PI, begin)?;
        }

        if let Some(text) = &m.text {
            let at = p1
                .midpoint(p2)
                .adjust(self_width + label_space_x, -label_space_y);
            self.backend.draw_label(at, text, "start", None)?;
        }
        self.backend.end_group()
    }

    fn draw_note(&mut self, from: &Endpoint, text: &str) -> Result<(), RenderError> {
        let props = self.props();
        let rung_width = props.rung_width;
        let time_height = props.time_height;
        let p = self.endpoint_position(from)?.point();

        let last_col = self.diag.diagram().parts().len() - 1;
        let (dir, align) = if from.col == last_col {
            (-1.0, "end")
        } else {
            (1.0, "start")
        };

        let at = p.adjust(dir * (3.0 + rung_width / 2.0), time_height / 4.0);
        self.backend.draw_label(at, text, align, None)
    }

    fn draw_block(&mut self, block: &Block) -> Result<(), RenderError> {
        let props = self.props();
        let pad = (block.depth as f32 + 1.0) * 5.0 + props.rung_width / 2.0;
        let start = block.start_tick() as f32;
        let end = block.end_tick() as f32;
        let lt = self.position(0.0, start)?.point().adjust(-pad, 0.0);
        let right = self.diag.diagram().parts().len() as f32 - 1.0;
        let rs = self.position(right, start)?.point().adjust(pad, 0.0);
        let re = self.position(right, end)?.point().adjust(pad, 0.0);
        let le = self.position(0.0, end)?.point().adjust(-pad, 0.0);

        let name = match &block.text {
            Some(text) => format!("{}: {text}", block.kind),
            None => block.kind.to_string(),
        };
        self.backend.begin_group(Some(&name))?;

        let mut label_offset = 0.0;
        if block.kind != BlockKind::Simple {
            // Tab in the top-left corner, carrying the block kind.
            self.backend.draw_path(
                &[
                    PathCmd::Move(lt.adjust(0.0, -15.0)),
                    PathCmd::Line(lt.adjust(35.0, -15.0)),
                    PathCmd::Line(lt.adjust(35.0, 0.0)),
                    PathCmd::Line(lt),
                    PathCmd::Close,
                ],
                "block_tab",
            )?;
            self.backend.draw_label(
                lt.adjust(5.0, -2.0),
                &block.kind.to_string(),
                "start",
                None,
            )?;
            label_offset = 40.0;
        }

        if let Some(text) = &block.text {
            self.backend
                .draw_label(lt.adjust(label_offset, -2.0), text, "start", None)?;
        }

        let outline = if block.kind == BlockKind::Simple {
            vec![
                PathCmd::Move(lt),
                PathCmd::Line(rs),
                PathCmd::Line(re),
                PathCmd::Line(le),
                PathCmd::Close,
            ]
        } else {
            vec![
                PathCmd::Move(lt.adjust(0.0, -15.0)),
                PathCmd::Line(lt.adjust(35.0, -15.0)),
                PathCmd::Line(lt.adjust(35.0, 0.0)),
                PathCmd::Line(rs),
                PathCmd::Line(re),
                PathCmd::Line(le),
                PathCmd::Close,
            ]
        };
        self.backend.draw_path(&outline, "block")?;
        self.backend.end_group()
    }

    fn arrow_head(&mut self, p: Point, theta: f32, head: Head) -> Result<(), RenderError> {
        let h = self.props().arrow_height;
        let w = self.props().arrow_width;
        // Local coordinates, tip at the origin pointing along +x.
        let pt = |x: f32, y: f32| Point::new(x, y).map_err(RenderError::from);

        self.backend.begin_transform(p, theta)?;
        match head {
            Head::Closed => self.backend.draw_path(
                &[
                    PathCmd::Move(pt(-h, w)?),
                    PathCmd::Line(pt(-1.0, 0.0)?),
                    PathCmd::Line(pt(-h, -w)?),
                    PathCmd::Line(pt(-(h - 1.0), 0.0)?),
                    PathCmd::Close,
                ],
                "closed",
            )?,
            Head::Half => {
                self.backend.draw_path(
                    &[PathCmd::Move(pt(-h, w)?), PathCmd::Line(pt(-1.0, -w)?)],
                    "open",
                )?;
                self.backend.draw_path(
                    &[PathCmd::Move(pt(-h, -w)?), PathCmd::Line(pt(-1.0, w)?)],
                    "open",
                )?;
            }
            Head::Open => self.backend.draw_path(
                &[
                    PathCmd::Move(pt(-h, w)?),
                    PathCmd::Line(pt(-1.0, 0.0)?),
                    PathCmd::Line(pt(-h, -w)?),
                ],
                "open",
            )?,
        }
        self.backend.end_transform()
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;

    use super::*;
    use crate::parser::parse;

    #[test]
    fn surface_size_covers_columns_and_watermark() {
        let diag = parse("A->B").unwrap();
        let (w, h) = surface_size(&diag);
        let props = diag.diagram().props();
        assert_approx_eq!(f32, w, 2.5 * props.column_width);
        let max = diag.diagram().max_tick() as f32;
        assert_approx_eq!(f32, h, (max + 10.0) * props.time_height);
    }

    #[test]
    fn coordinate_mapping() {
        let props = Props::default();
        assert_approx_eq!(f32, column_to_x(&props, 0.0), 75.0);
        assert_approx_eq!(f32, column_to_x(&props, 1.0), 225.0);
        assert_approx_eq!(f32, time_to_y(&props, -5.0), 0.0);
        assert_approx_eq!(f32, time_to_y(&props, 1.0), 120.0);
    }

    /// Backend that records the calls it receives.
    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl Backend for Recorder {
        fn meta(&mut self, title: Option<&str>) -> Result<(), RenderError> {
            self.calls.push(format!("meta {title:?}"));
            Ok(())
        }

        fn home_link(&mut self) -> Result<(), RenderError> {
            self.calls.push("home_link".to_owned());
            Ok(())
        }

        fn begin_transform(&mut self, origin: Point, theta: f32) -> Result<(), RenderError> {
            self.calls
                .push(format!("transform {} {} {theta}", origin.x(), origin.y()));
            Ok(())
        }

        fn end_transform(&mut self) -> Result<(), RenderError> {
            self.calls.push("end_transform".to_owned());
            Ok(())
        }

        fn finish(&mut self, _out: &mut dyn Write) -> Result<(), RenderError> {
            self.calls.push("finish".to_owned());
            Ok(())
        }

        fn begin_group(&mut self, name: Option<&str>) -> Result<(), RenderError> {
            self.calls.push(format!("group {}", name.unwrap_or("")));
            Ok(())
        }

        fn end_group(&mut self) -> Result<(), RenderError> {
            self.calls.push("end_group".to_owned());
            Ok(())
        }

        fn draw_label(
            &mut self,
            _at: Point,
            text: &str,
            classes: &str,
            _angle: Option<f32>,
        ) -> Result<(), RenderError> {
            self.calls.push(format!("label [{classes}] {text}"));
            Ok(())
        }

        fn draw_path(&mut self, _cmds: &[PathCmd], classes: &str) -> Result<(), RenderError> {
            self.calls.push(format!("path [{classes}]"));
            Ok(())
        }
    }

    fn calls(source: &str) -> Vec<String> {
        let diag = parse(source).unwrap();
        let mut rec = Recorder::default();
        let mut sink = Vec::new();
        // Borrow trick: drive a &mut Recorder so we keep the recording.
        Driver::new(&diag, &mut rec, false).draw(&mut sink).unwrap();
        rec.calls
    }

    #[test]
    fn walk_order_starts_with_meta_and_ends_with_finish() {
        let calls = calls("title T\nA->B: hi");
        assert_eq!(calls[0], "meta Some(\"T\")");
        assert_eq!(calls[1], "label [title] T");
        assert_eq!(calls[2], "home_link");
        assert_eq!(calls[3], "group participants");
        assert_eq!(calls.last().unwrap(), "finish");
    }

    #[test]
    fn each_participant_draws_label_rung_and_foot() {
        let calls = calls("A->B");
        let a_group = calls
            .iter()
            .position(|c| c == "group participant: A")
            .unwrap();
        assert_eq!(calls[a_group + 1], "label [rung_label] A");
        assert_eq!(calls[a_group + 2], "path [rung]");
        assert_eq!(calls[a_group + 3], "label [rung_label] A");
    }

    #[test]
    fn no_feet_suppresses_bottom_labels() {
        let calls = calls("set no_feet\nA->B");
        let rung_labels = calls.iter().filter(|c| c.contains("rung_label")).count();
        assert_eq!(rung_labels, 2);
    }

    #[test]
    fn arrowheads_are_drawn_inside_a_transform() {
        let calls = calls("A->B");
        let t = calls.iter().position(|c| c.starts_with("transform")).unwrap();
        assert_eq!(calls[t + 1], "path [closed]");
        assert_eq!(calls[t + 2], "end_transform");
    }

    #[test]
    fn half_head_draws_two_strokes() {
        let calls = calls("A-#B");
        let t = calls.iter().position(|c| c.starts_with("transform")).unwrap();
        assert_eq!(calls[t + 1], "path [open]");
        assert_eq!(calls[t + 2], "path [open]");
        assert_eq!(calls[t + 3], "end_transform");
    }

    #[test]
    fn bidirectional_arrow_draws_two_heads_and_centers_label() {
        let calls = calls("A<->B: both");
        let transforms = calls.iter().filter(|c| c.starts_with("transform")).count();
        assert_eq!(transforms, 2);
        assert!(calls.iter().any(|c| c == "label [center] both"));
    }

    #[test]
    fn self_message_is_grouped_and_tagged_self() {
        let calls = calls("A->A: me");
        assert!(calls.iter().any(|c| c == "group message: A -> A: me"));
        assert!(calls.iter().any(|c| c == "path [solid closed_forward self]"));
    }

    #[test]
    fn tabbed_block_draws_tab_kind_label_and_outline() {
        let calls = calls("loop retry\nA->B\nend");
        assert!(calls.iter().any(|c| c == "group loop: retry"));
        assert!(calls.iter().any(|c| c == "path [block_tab]"));
        assert!(calls.iter().any(|c| c == "label [start] loop"));
        assert!(calls.iter().any(|c| c == "label [start] retry"));
        assert!(calls.iter().any(|c| c == "path [block]"));
    }

    #[test]
    fn simple_block_has_no_tab() {
        let calls = calls("block\nA->B\nend");
        assert!(calls.iter().any(|c| c == "group simple"));
        assert!(!calls.iter().any(|c| c == "path [block_tab]"));
    }

    #[test]
    fn note_aligns_away_from_the_last_column() {
        let calls = calls("A->B\nnote A: left\nnote B: right");
        assert!(calls.iter().any(|c| c == "label [start] left"));
        assert!(calls.iter().any(|c| c == "label [end] right"));
    }

    #[test]
    fn no_link_property_suppresses_home_link() {
        let calls = calls("set no_link\nA->B");
        assert!(!calls.iter().any(|c| c == "home_link"));
    }
}

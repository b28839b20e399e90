//! Diagram entity model and the tick-resolving compute pass.
//!
//! A [`Diagram`] is built up by a parser (or programmatically): participants,
//! an append-only list of [`Step`]s, a block arena, named timepoints, and a
//! closed property map. [`Diagram::compute`] then runs a single forward pass
//! that resolves every endpoint to a concrete tick and produces a
//! [`ComputedDiagram`], the only thing the render driver accepts.

use std::fmt;
use std::mem;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structural errors raised while building or computing a diagram.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("duplicate participant: {0}")]
    DuplicateParticipant(String),

    #[error("duplicate timepoint: {0}")]
    DuplicateTimepoint(String),

    #[error("unknown timepoint: {0}")]
    UnknownTimepoint(String),

    #[error("unmatched `end` on line {line}")]
    UnmatchedEnd { line: u32 },

    #[error("{}", unclosed_message(.0))]
    UnclosedBlocks(Vec<UnclosedBlock>),

    #[error("unknown property: {0}")]
    UnknownProperty(String),

    #[error("invalid value {value:?} for property {name:?}")]
    InvalidPropertyValue { name: String, value: String },

    #[error("title already specified as: {existing}")]
    DuplicateTitle { existing: String },
}

/// A block left open when compute starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnclosedBlock {
    pub kind: BlockKind,
    pub line: u32,
}

fn unclosed_message(blocks: &[UnclosedBlock]) -> String {
    let list = blocks
        .iter()
        .map(|b| format!("`{}` opened on line {}", b.kind, b.line))
        .collect::<Vec<_>>()
        .join(", ");
    if blocks.len() == 1 {
        format!("unended block: {list}")
    } else {
        format!("unended blocks: {list}")
    }
}

/// A named vertical line in the diagram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub col: usize,
    pub name: String,
    pub desc: String,
}

/// Registry of participants in first-appearance column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Participants {
    order: IndexMap<String, Participant>,
}

impl Participants {
    /// Explicitly declares a participant, optionally with a long description.
    pub fn add(&mut self, name: &str, desc: Option<&str>) -> Result<&Participant, ModelError> {
        if self.order.contains_key(name) {
            return Err(ModelError::DuplicateParticipant(name.to_owned()));
        }
        let part = Participant {
            col: self.order.len(),
            name: name.to_owned(),
            desc: desc.unwrap_or(name).to_owned(),
        };
        Ok(self.order.entry(name.to_owned()).or_insert(part))
    }

    /// Returns the column for `name`, registering it on first use.
    pub fn find_or_create(&mut self, name: &str) -> usize {
        if let Some(part) = self.order.get(name) {
            return part.col;
        }
        let col = self.order.len();
        self.order.insert(
            name.to_owned(),
            Participant {
                col,
                name: name.to_owned(),
                desc: name.to_owned(),
            },
        );
        col
    }

    pub fn get(&self, name: &str) -> Option<&Participant> {
        self.order.get(name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.order.values()
    }
}

/// A time reference attached to an endpoint.
///
/// Parsers produce `Unset` or `Symbolic`; compute rewrites every reference
/// to `Resolved` before a [`ComputedDiagram`] exists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Time {
    #[default]
    Unset,
    Symbolic(String),
    Resolved(i32),
}

/// One end of a message: a participant name, its column, and a time
/// reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub name: String,
    pub col: usize,
    #[serde(default)]
    pub time: Time,
}

impl Endpoint {
    /// The resolved tick of this endpoint.
    pub fn tick(&self) -> i32 {
        match self.time {
            Time::Resolved(t) => t,
            // Compute resolves every endpoint before the driver can see one.
            _ => unreachable!("endpoint tick read before compute"),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Arrowhead shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Head {
    Closed,
    Open,
    Half,
}

/// An arrow between two endpoints: optional back head, solid or dashed
/// shaft, mandatory forward head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arrow {
    pub begin: Option<Head>,
    pub dashed: bool,
    pub end: Head,
}

impl Arrow {
    pub fn new(begin: Option<Head>, dashed: bool, end: Head) -> Self {
        Self { begin, dashed, end }
    }

    /// Canonical style-tag string shared by every backend, in a fixed
    /// order: back head, shaft, forward head. The half head contributes no
    /// tag of its own.
    pub fn classes(&self) -> String {
        let mut tags = Vec::with_capacity(3);
        match self.begin {
            Some(Head::Closed) => tags.push("closed_back"),
            Some(Head::Open) => tags.push("open_back"),
            _ => {}
        }
        tags.push(if self.dashed { "dashed" } else { "solid" });
        match self.end {
            Head::Closed => tags.push("closed_forward"),
            Head::Open => tags.push("open_forward"),
            Head::Half => {}
        }
        tags.join(" ")
    }
}

impl fmt::Display for Arrow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.begin {
            Some(Head::Closed) => f.write_str("<")?,
            Some(Head::Open) => f.write_str("<<")?,
            Some(Head::Half) | None => {}
        }
        f.write_str(if self.dashed { "--" } else { "-" })?;
        f.write_str(match self.end {
            Head::Closed => ">",
            Head::Open => ">>",
            Head::Half => "#",
        })
    }
}

/// Per-message layout options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advance: Option<i32>,
}

/// A message between two endpoints (or one endpoint and itself).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageStep {
    pub line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timepoint: Option<String>,
    pub from: Endpoint,
    pub arrow: Arrow,
    pub to: Endpoint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub opts: MessageOptions,
    /// Tick bound to the declared timepoint, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at: Option<i32>,
}

impl fmt::Display for MessageStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.from, self.arrow, self.to)?;
        if let Some(text) = &self.text {
            write!(f, ": {text}")?;
        }
        Ok(())
    }
}

/// Kind of grouping block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Loop,
    Opt,
    Simple,
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BlockKind::Loop => "loop",
            BlockKind::Opt => "opt",
            BlockKind::Simple => "simple",
        })
    }
}

/// A block of steps, stored in the diagram's arena and referenced by index
/// from its begin/end steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub line: u32,
    pub kind: BlockKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Nesting depth, in the sense of "how many blocks opened inside me";
    /// drives the horizontal padding of the drawn rectangle.
    pub depth: u32,
    pub start: Option<i32>,
    pub end: Option<i32>,
}

impl Block {
    pub fn start_tick(&self) -> i32 {
        match self.start {
            Some(t) => t,
            _ => unreachable!("block start read before compute"),
        }
    }

    pub fn end_tick(&self) -> i32 {
        match self.end {
            Some(t) => t,
            _ => unreachable!("block end read before compute"),
        }
    }
}

/// One entry in the diagram's ordered step list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Step {
    #[serde(rename = "ADVANCE")]
    Advance { line: u32, distance: i32 },
    #[serde(rename = "MESSAGE")]
    Message(MessageStep),
    #[serde(rename = "SELF")]
    SelfMessage(MessageStep),
    #[serde(rename = "NOTE")]
    Note {
        line: u32,
        from: Endpoint,
        text: String,
    },
    #[serde(rename = "BLOCK")]
    BlockBegin { line: u32, block: usize },
    #[serde(rename = "END_BLOCK")]
    BlockEnd { line: u32, block: usize },
}

/// The closed diagram property schema with its defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Props {
    pub arrow_color: String,
    pub arrow_height: f32,
    pub arrow_width: f32,
    pub auto_number: bool,
    pub background: String,
    pub block_tab_fill: String,
    pub block_stroke: String,
    pub column_width: f32,
    pub font: String,
    pub label_space_x: f32,
    pub label_space_y: f32,
    pub line_color: String,
    pub line_width: f32,
    pub no_clear: bool,
    pub no_feet: bool,
    pub no_link: bool,
    pub rung_color: String,
    pub rung_width: f32,
    pub text_color: String,
    pub text_size: f32,
    pub time_height: f32,
}

impl Default for Props {
    fn default() -> Self {
        Self {
            arrow_color: "black".to_owned(),
            arrow_height: 10.0,
            arrow_width: 15.0,
            auto_number: false,
            background: "white".to_owned(),
            block_tab_fill: "gray".to_owned(),
            block_stroke: "gray".to_owned(),
            column_width: 150.0,
            font: "Helvetica".to_owned(),
            label_space_x: 3.0,
            label_space_y: -3.0,
            line_color: "black".to_owned(),
            line_width: 1.0,
            no_clear: false,
            no_feet: false,
            no_link: false,
            rung_color: "black".to_owned(),
            rung_width: 1.0,
            text_color: "black".to_owned(),
            text_size: 13.0,
            time_height: 20.0,
        }
    }
}

fn parse_number(name: &str, value: &str) -> Result<f32, ModelError> {
    value
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ModelError::InvalidPropertyValue {
            name: name.to_owned(),
            value: value.to_owned(),
        })
}

fn parse_flag(name: &str, value: &str) -> Result<bool, ModelError> {
    match value {
        "" | "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ModelError::InvalidPropertyValue {
            name: name.to_owned(),
            value: value.to_owned(),
        }),
    }
}

fn format_number(v: f32) -> String {
    if v.fract() == 0.0 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}

impl Props {
    /// Sets a property from its textual form, coercing by the schema type.
    /// An empty value means boolean `true`.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), ModelError> {
        let value = value.trim();
        match name {
            "arrow_color" => self.arrow_color = value.to_owned(),
            "arrow_height" => self.arrow_height = parse_number(name, value)?,
            "arrow_width" => self.arrow_width = parse_number(name, value)?,
            "auto_number" => self.auto_number = parse_flag(name, value)?,
            "background" => self.background = value.to_owned(),
            "block_tab_fill" => self.block_tab_fill = value.to_owned(),
            "block_stroke" => self.block_stroke = value.to_owned(),
            "column_width" => self.column_width = parse_number(name, value)?,
            "font" => self.font = value.to_owned(),
            "label_space_x" => self.label_space_x = parse_number(name, value)?,
            "label_space_y" => self.label_space_y = parse_number(name, value)?,
            "line_color" => self.line_color = value.to_owned(),
            "line_width" => self.line_width = parse_number(name, value)?,
            "no_clear" => self.no_clear = parse_flag(name, value)?,
            "no_feet" => self.no_feet = parse_flag(name, value)?,
            "no_link" => self.no_link = parse_flag(name, value)?,
            "rung_color" => self.rung_color = value.to_owned(),
            "rung_width" => self.rung_width = parse_number(name, value)?,
            "text_color" => self.text_color = value.to_owned(),
            "text_size" => self.text_size = parse_number(name, value)?,
            "time_height" => self.time_height = parse_number(name, value)?,
            _ => return Err(ModelError::UnknownProperty(name.to_owned())),
        }
        Ok(())
    }

    /// Textual form of a property, for stylesheet placeholder expansion.
    pub fn lookup(&self, name: &str) -> Option<String> {
        let s = match name {
            "arrow_color" => self.arrow_color.clone(),
            "arrow_height" => format_number(self.arrow_height),
            "arrow_width" => format_number(self.arrow_width),
            "auto_number" => self.auto_number.to_string(),
            "background" => self.background.clone(),
            "block_tab_fill" => self.block_tab_fill.clone(),
            "block_stroke" => self.block_stroke.clone(),
            "column_width" => format_number(self.column_width),
            "font" => self.font.clone(),
            "label_space_x" => format_number(self.label_space_x),
            "label_space_y" => format_number(self.label_space_y),
            "line_color" => self.line_color.clone(),
            "line_width" => format_number(self.line_width),
            "no_clear" => self.no_clear.to_string(),
            "no_feet" => self.no_feet.to_string(),
            "no_link" => self.no_link.to_string(),
            "rung_color" => self.rung_color.clone(),
            "rung_width" => format_number(self.rung_width),
            "text_color" => self.text_color.clone(),
            "text_size" => format_number(self.text_size),
            "time_height" => format_number(self.time_height),
            _ => return None,
        };
        Some(s)
    }
}

/// A diagram under construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagram {
    title: Option<String>,
    parts: Participants,
    timepoints: IndexMap<String, i32>,
    steps: Vec<Step>,
    blocks: Vec<Block>,
    props: Props,
    current_tick: i32,
    max_tick: i32,
    #[serde(skip)]
    open: Vec<usize>,
    #[serde(skip)]
    next_number: u32,
}

impl Default for Diagram {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagram {
    pub fn new() -> Self {
        Self {
            title: None,
            parts: Participants::default(),
            timepoints: IndexMap::new(),
            steps: Vec::new(),
            blocks: Vec::new(),
            props: Props::default(),
            current_tick: 1,
            max_tick: 0,
            open: Vec::new(),
            next_number: 0,
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn parts(&self) -> &Participants {
        &self.parts
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    pub fn current_tick(&self) -> i32 {
        self.current_tick
    }

    pub fn max_tick(&self) -> i32 {
        self.max_tick
    }

    /// Sets the diagram title. Only one title is allowed.
    pub fn set_title(&mut self, title: &str) -> Result<(), ModelError> {
        if let Some(existing) = &self.title {
            return Err(ModelError::DuplicateTitle {
                existing: existing.clone(),
            });
        }
        self.title = Some(title.trim().to_owned());
        Ok(())
    }

    /// Explicitly declares a participant.
    pub fn add_participant(&mut self, name: &str, desc: Option<&str>) -> Result<(), ModelError> {
        self.parts.add(name, desc)?;
        Ok(())
    }

    /// Builds an endpoint, registering the participant on first use. An
    /// empty timepoint name means "no time reference".
    pub fn endpoint(&mut self, name: &str, timepoint: Option<&str>) -> Endpoint {
        let col = self.parts.find_or_create(name);
        let time = match timepoint {
            Some(tp) if !tp.is_empty() => Time::Symbolic(tp.to_owned()),
            _ => Time::Unset,
        };
        Endpoint {
            name: name.to_owned(),
            col,
            time,
        }
    }

    pub fn add_advance(&mut self, line: u32, distance: i32) {
        self.steps.push(Step::Advance { line, distance });
    }

    /// Appends a message step; a message from a participant to itself
    /// becomes a self-message.
    pub fn add_message(
        &mut self,
        line: u32,
        timepoint: Option<String>,
        from: Endpoint,
        arrow: Arrow,
        to: Endpoint,
        text: Option<String>,
        opts: MessageOptions,
    ) {
        let text = text
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty());
        let message = MessageStep {
            line,
            timepoint: timepoint.filter(|t| !t.is_empty()),
            from,
            arrow,
            to,
            text,
            opts,
            at: None,
        };
        if message.from.name == message.to.name {
            self.steps.push(Step::SelfMessage(message));
        } else {
            self.steps.push(Step::Message(message));
        }
    }

    pub fn add_note(&mut self, line: u32, from: Endpoint, text: String) {
        self.steps.push(Step::Note { line, from, text });
    }

    /// Opens a block: deepens every still-open ancestor, then pushes the
    /// new block on the open stack.
    pub fn open_block(&mut self, line: u32, kind: BlockKind, text: Option<String>) {
        let open_count = self.open.len() as u32;
        for (i, &idx) in self.open.iter().enumerate() {
            let block = &mut self.blocks[idx];
            block.depth = block.depth.max(open_count - i as u32);
        }
        let idx = self.blocks.len();
        self.blocks.push(Block {
            line,
            kind,
            text: text.filter(|t| !t.is_empty()),
            depth: 0,
            start: None,
            end: None,
        });
        self.open.push(idx);
        self.steps.push(Step::BlockBegin { line, block: idx });
    }

    /// Closes the innermost open block.
    pub fn close_block(&mut self, line: u32) -> Result<(), ModelError> {
        let idx = self
            .open
            .pop()
            .ok_or(ModelError::UnmatchedEnd { line })?;
        self.steps.push(Step::BlockEnd { line, block: idx });
        Ok(())
    }

    pub fn set_prop(&mut self, name: &str, value: &str) -> Result<(), ModelError> {
        self.props.set(name, value)
    }

    /// Binds `name` to the current tick. Names bind exactly once.
    pub fn add_time(&mut self, name: &str) -> Result<i32, ModelError> {
        if self.timepoints.contains_key(name) {
            return Err(ModelError::DuplicateTimepoint(name.to_owned()));
        }
        self.timepoints.insert(name.to_owned(), self.current_tick);
        Ok(self.current_tick)
    }

    /// Looks up a previously bound timepoint.
    pub fn find_time(&self, name: &str) -> Result<i32, ModelError> {
        self.timepoints
            .get(name)
            .copied()
            .ok_or_else(|| ModelError::UnknownTimepoint(name.to_owned()))
    }

    /// Advances the current tick past `max(start, end)` and grows the
    /// watermark. The watermark never shrinks, so backward time references
    /// cannot reduce the rendered extent.
    fn incr_time(&mut self, start: i32, end: i32, increment: Option<i32>) {
        let later = start.max(end);
        self.current_tick = later + increment.unwrap_or(1);
        self.max_tick = self.max_tick.max(self.current_tick);
    }

    /// Prefixes `[n]` when auto-numbering is on. The counter is zero-based
    /// and shared by messages and notes.
    fn auto_number(&mut self, text: Option<String>) -> Option<String> {
        if !self.props.auto_number {
            return text;
        }
        let n = self.next_number;
        self.next_number += 1;
        let numbered = format!("[{n}] {}", text.as_deref().unwrap_or(""));
        Some(numbered.trim().to_owned())
    }

    fn resolve(&self, ep: &mut Endpoint, start: Option<i32>, duration: i32) -> Result<(), ModelError> {
        match &ep.time {
            Time::Symbolic(name) => ep.time = Time::Resolved(self.find_time(name)?),
            Time::Resolved(_) => {}
            Time::Unset => {
                ep.time = Time::Resolved(start.unwrap_or(self.current_tick) + duration);
            }
        }
        Ok(())
    }

    fn compute_message(&mut self, m: &mut MessageStep, min_duration: i32) -> Result<(), ModelError> {
        if let Some(tp) = m.timepoint.clone() {
            m.at = Some(self.add_time(&tp)?);
        }
        self.resolve(&mut m.from, None, 0)?;
        let duration = m.opts.duration.unwrap_or(0).max(min_duration);
        let from_tick = m.from.tick();
        self.resolve(&mut m.to, Some(from_tick), duration)?;
        m.text = self.auto_number(m.text.take());
        self.incr_time(from_tick, m.to.tick(), m.opts.advance);
        Ok(())
    }

    /// Runs the single forward compute pass, consuming the diagram.
    ///
    /// Fails up front if any block is still open, naming every one of
    /// them. After this, every endpoint time is `Resolved` and every block
    /// has start and end ticks.
    pub fn compute(mut self) -> Result<ComputedDiagram, ModelError> {
        if !self.open.is_empty() {
            let unclosed = self
                .open
                .iter()
                .map(|&idx| UnclosedBlock {
                    kind: self.blocks[idx].kind,
                    line: self.blocks[idx].line,
                })
                .collect();
            return Err(ModelError::UnclosedBlocks(unclosed));
        }

        let mut steps = mem::take(&mut self.steps);
        for step in &mut steps {
            match step {
                Step::Advance { distance, .. } => self.current_tick += *distance,
                Step::Message(m) => self.compute_message(m, 0)?,
                Step::SelfMessage(m) => self.compute_message(m, 1)?,
                Step::Note { from, text, .. } => {
                    self.resolve(from, None, 0)?;
                    if let Some(numbered) = self.auto_number(Some(mem::take(text))) {
                        *text = numbered;
                    }
                    let t = from.tick();
                    self.incr_time(t, t, None);
                }
                Step::BlockBegin { block, .. } => {
                    let t = self.current_tick;
                    self.blocks[*block].start = Some(t);
                    self.incr_time(t, t, None);
                }
                Step::BlockEnd { block, .. } => {
                    let t = self.current_tick;
                    self.blocks[*block].end = Some(t);
                    self.incr_time(t, t, None);
                }
            }
        }
        self.steps = steps;
        Ok(ComputedDiagram(self))
    }
}

/// A diagram whose compute pass has run: every endpoint tick is resolved
/// and every block has its extent. This is the only input the render
/// driver accepts; consuming the builder makes double-compute
/// unrepresentable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComputedDiagram(Diagram);

impl ComputedDiagram {
    pub fn diagram(&self) -> &Diagram {
        &self.0
    }

    /// Applies a rendering-time property override. Compute has already
    /// run, so properties that feed it (`auto_number`) only affect future
    /// styling, not numbering.
    pub fn set_prop(&mut self, name: &str, value: &str) -> Result<(), ModelError> {
        self.0.props.set(name, value)
    }
}

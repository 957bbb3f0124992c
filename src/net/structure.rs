//! Petri 网静态结构元素：坐标、库所、迁移、弧以及它们的 PNML 片段.
use std::fmt::{self, Write as FmtWrite};
use std::str::FromStr;

use quick_xml::escape::escape;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::net::core::NetError;
use crate::net::ids::ElementId;

pub type Weight = u64;

pub(crate) type ArcList = SmallVec<[ElementId; 4]>;

/// Non-negative canvas coordinate of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawPosition")]
pub struct Position {
    x: i32,
    y: i32,
}

#[derive(Deserialize)]
struct RawPosition {
    x: i32,
    y: i32,
}

impl TryFrom<RawPosition> for Position {
    type Error = NetError;

    fn try_from(raw: RawPosition) -> Result<Self, Self::Error> {
        Position::new(raw.x, raw.y)
    }
}

impl Position {
    pub const ORIGIN: Position = Position { x: 0, y: 0 };

    pub fn new(x: i32, y: i32) -> Result<Self, NetError> {
        if x < 0 || y < 0 {
            return Err(NetError::InvalidArgument(format!(
                "position ({x}, {y}) has a negative coordinate"
            )));
        }
        Ok(Self { x, y })
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn y(&self) -> i32 {
        self.y
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl FromStr for Position {
    type Err = NetError;

    /// Accepts `(x, y)` as printed by `Display`, parentheses optional.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let inner = trimmed
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .unwrap_or(trimmed);
        let (x, y) = inner
            .split_once(',')
            .ok_or_else(|| NetError::InvalidArgument(format!("malformed position `{s}`")))?;
        let parse = |raw: &str| {
            raw.trim()
                .parse::<i32>()
                .map_err(|err| NetError::InvalidArgument(format!("malformed position `{s}`: {err}")))
        };
        Self::new(parse(x)?, parse(y)?)
    }
}

/// Data shared by places and transitions.
///
/// The adjacency lists hold arc ids only; the owning net keeps them consistent
/// with each arc's endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    name: String,
    position: Position,
    #[serde(skip)]
    input_arcs: ArcList,
    #[serde(skip)]
    output_arcs: ArcList,
}

impl Node {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    /// Arcs ending in this node.
    pub fn input_arcs(&self) -> &[ElementId] {
        &self.input_arcs
    }

    /// Arcs starting at this node.
    pub fn output_arcs(&self) -> &[ElementId] {
        &self.output_arcs
    }

    pub(crate) fn arcs_mut(&mut self, direction: ArcDirection) -> &mut ArcList {
        match direction {
            ArcDirection::Input => &mut self.input_arcs,
            ArcDirection::Output => &mut self.output_arcs,
        }
    }

    pub(crate) fn arcs(&self, direction: ArcDirection) -> &ArcList {
        match direction {
            ArcDirection::Input => &self.input_arcs,
            ArcDirection::Output => &self.output_arcs,
        }
    }

    fn write_name_and_graphics(&self, out: &mut String, extra: impl FnOnce(&mut String)) {
        let _ = write!(out, "<name><value>{}</value></name>", escape(self.name.as_str()));
        extra(out);
        let _ = write!(
            out,
            "<graphics><position x=\"{}\" y=\"{}\" /></graphics>",
            self.position.x, self.position.y
        );
    }
}

/// Which adjacency list of a node an arc lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArcDirection {
    /// The node is the arc's target.
    Input,
    /// The node is the arc's source.
    Output,
}

impl ArcDirection {
    pub fn opposite(self) -> Self {
        match self {
            ArcDirection::Input => ArcDirection::Output,
            ArcDirection::Output => ArcDirection::Input,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Place {
    id: ElementId,
    node: Node,
    marking: Weight,
}

impl Place {
    pub fn new(id: impl Into<ElementId>) -> Self {
        Self {
            id: id.into(),
            node: Node::default(),
            marking: 0,
        }
    }

    pub fn with_marking(id: impl Into<ElementId>, marking: Weight) -> Self {
        Self {
            marking,
            ..Self::new(id)
        }
    }

    pub fn id(&self) -> &ElementId {
        &self.id
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn node_mut(&mut self) -> &mut Node {
        &mut self.node
    }

    pub fn marking(&self) -> Weight {
        self.marking
    }

    pub fn set_marking(&mut self, marking: i64) -> Result<(), NetError> {
        if marking < 0 {
            return Err(NetError::InvalidArgument(format!(
                "marking of place {} cannot be negative ({marking})",
                self.id
            )));
        }
        self.marking = marking as Weight;
        Ok(())
    }

    pub(crate) fn take_token(&mut self) {
        self.marking = self.marking.saturating_sub(1);
    }

    pub(crate) fn put_tokens(&mut self, tokens: Weight) {
        self.marking = self.marking.saturating_add(tokens);
    }

    pub fn to_pnml(&self) -> String {
        let mut out = String::new();
        let _ = write!(out, "<place id=\"{}\">", escape(self.id.as_str()));
        self.node.write_name_and_graphics(&mut out, |out| {
            let _ = write!(
                out,
                "<initialMarking><token><value>{}</value></token></initialMarking>",
                self.marking
            );
        });
        out.push_str("</place>");
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    id: ElementId,
    node: Node,
}

impl Transition {
    pub fn new(id: impl Into<ElementId>) -> Self {
        Self {
            id: id.into(),
            node: Node::default(),
        }
    }

    pub fn id(&self) -> &ElementId {
        &self.id
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn node_mut(&mut self) -> &mut Node {
        &mut self.node
    }

    pub fn to_pnml(&self) -> String {
        let mut out = String::new();
        let _ = write!(out, "<transition id=\"{}\">", escape(self.id.as_str()));
        self.node.write_name_and_graphics(&mut out, |_| {});
        out.push_str("</transition>");
        out
    }
}

/// Directed edge between a place and a transition, in either direction.
///
/// Endpoints are only empty while an arc is being assembled or after one of
/// its nodes dropped it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arc {
    id: ElementId,
    source: Option<ElementId>,
    target: Option<ElementId>,
}

impl Arc {
    pub fn new(id: impl Into<ElementId>) -> Self {
        Self {
            id: id.into(),
            source: None,
            target: None,
        }
    }

    pub fn between(
        id: impl Into<ElementId>,
        source: impl Into<ElementId>,
        target: impl Into<ElementId>,
    ) -> Self {
        Self::new(id).with_source(source).with_target(target)
    }

    pub fn with_source(mut self, source: impl Into<ElementId>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<ElementId>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn id(&self) -> &ElementId {
        &self.id
    }

    pub fn source(&self) -> Option<&ElementId> {
        self.source.as_ref()
    }

    pub fn target(&self) -> Option<&ElementId> {
        self.target.as_ref()
    }

    /// The node holding this arc in its `direction` list: target for
    /// [`ArcDirection::Input`], source for [`ArcDirection::Output`].
    pub(crate) fn endpoint(&self, direction: ArcDirection) -> Option<&ElementId> {
        match direction {
            ArcDirection::Input => self.target.as_ref(),
            ArcDirection::Output => self.source.as_ref(),
        }
    }

    pub(crate) fn set_endpoint(&mut self, direction: ArcDirection, node: Option<ElementId>) {
        match direction {
            ArcDirection::Input => self.target = node,
            ArcDirection::Output => self.source = node,
        }
    }

    pub fn to_pnml(&self) -> String {
        let endpoint = |node: &Option<ElementId>| {
            node.as_ref()
                .map(|id| escape(id.as_str()).into_owned())
                .unwrap_or_default()
        };
        format!(
            "<arc id=\"{}\" source=\"{}\" target=\"{}\"> </arc>",
            escape(self.id.as_str()),
            endpoint(&self.source),
            endpoint(&self.target)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Place,
    Transition,
    Arc,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ElementKind::Place => "place",
            ElementKind::Transition => "transition",
            ElementKind::Arc => "arc",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Element {
    Place(Place),
    Transition(Transition),
    Arc(Arc),
}

impl Element {
    pub fn id(&self) -> &ElementId {
        match self {
            Element::Place(place) => place.id(),
            Element::Transition(transition) => transition.id(),
            Element::Arc(arc) => arc.id(),
        }
    }

    pub fn kind(&self) -> ElementKind {
        match self {
            Element::Place(_) => ElementKind::Place,
            Element::Transition(_) => ElementKind::Transition,
            Element::Arc(_) => ElementKind::Arc,
        }
    }

    pub fn node(&self) -> Option<&Node> {
        match self {
            Element::Place(place) => Some(place.node()),
            Element::Transition(transition) => Some(transition.node()),
            Element::Arc(_) => None,
        }
    }

    pub fn node_mut(&mut self) -> Option<&mut Node> {
        match self {
            Element::Place(place) => Some(place.node_mut()),
            Element::Transition(transition) => Some(transition.node_mut()),
            Element::Arc(_) => None,
        }
    }

    pub fn as_place(&self) -> Option<&Place> {
        match self {
            Element::Place(place) => Some(place),
            _ => None,
        }
    }

    pub fn as_transition(&self) -> Option<&Transition> {
        match self {
            Element::Transition(transition) => Some(transition),
            _ => None,
        }
    }

    pub fn as_arc(&self) -> Option<&Arc> {
        match self {
            Element::Arc(arc) => Some(arc),
            _ => None,
        }
    }

    pub(crate) fn as_arc_mut(&mut self) -> Option<&mut Arc> {
        match self {
            Element::Arc(arc) => Some(arc),
            _ => None,
        }
    }

    pub fn to_pnml(&self) -> String {
        match self {
            Element::Place(place) => place.to_pnml(),
            Element::Transition(transition) => transition.to_pnml(),
            Element::Arc(arc) => arc.to_pnml(),
        }
    }
}

impl From<Place> for Element {
    fn from(value: Place) -> Self {
        Element::Place(value)
    }
}

impl From<Transition> for Element {
    fn from(value: Transition) -> Self {
        Element::Transition(value)
    }
}

impl From<Arc> for Element {
    fn from(value: Arc) -> Self {
        Element::Arc(value)
    }
}

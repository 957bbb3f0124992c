//! 运行时: 网元素仓库、弧端点一致性维护与发生语义.
use std::fmt::{self, Write as FmtWrite};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::NetConfig;
use crate::net::ids::{ArcIdSequence, ElementId};
use crate::net::structure::{
    Arc, ArcDirection, Element, ElementKind, Node, Place, Position, Transition, Weight,
};

pub const PNML_HEADER: &str = "<?xml version=\"1.0\" encoding=\"utf-8\" standalone=\"no\"?>";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("an element with id {0} already exists")]
    DuplicateId(ElementId),
    #[error("no element with id {0}")]
    NotFound(ElementId),
    #[error("{from} is already connected to {to}")]
    DuplicateConnection { from: ElementId, to: ElementId },
}

/// Aggregate root owning every place, transition and arc by id.
///
/// Nodes and arcs refer to each other by [`ElementId`]; all endpoint changes go
/// through the net so that `arc ∈ node.output_arcs ⟺ arc.source == node` and
/// `arc ∈ node.input_arcs ⟺ arc.target == node` hold after every call.
#[derive(Clone, Serialize, Deserialize)]
#[serde(into = "NetDocument", try_from = "NetDocument")]
pub struct PetriNet {
    elements: IndexMap<ElementId, Element>,
    arc_ids: ArcIdSequence,
}

/// Serialized shape of a net: elements in insertion order, adjacency rebuilt on load.
#[derive(Serialize, Deserialize)]
struct NetDocument {
    #[serde(default = "default_arc_prefix")]
    arc_id_prefix: String,
    elements: Vec<Element>,
}

fn default_arc_prefix() -> String {
    ArcIdSequence::default().prefix().to_owned()
}

impl From<PetriNet> for NetDocument {
    fn from(net: PetriNet) -> Self {
        Self {
            arc_id_prefix: net.arc_ids.prefix().to_owned(),
            elements: net.elements.into_values().collect(),
        }
    }
}

impl TryFrom<NetDocument> for PetriNet {
    type Error = NetError;

    /// Elements go in detached first, so arcs whose endpoint was removed, or
    /// whose endpoint comes later in the document, load as they were saved.
    fn try_from(document: NetDocument) -> Result<Self, Self::Error> {
        let mut net = PetriNet::with_arc_prefix(document.arc_id_prefix);
        let mut endpoints = Vec::new();
        for element in document.elements {
            net.ensure_new_id(element.id())?;
            let element = match element {
                Element::Arc(arc) => {
                    endpoints.push((arc.id().clone(), arc.source().cloned(), arc.target().cloned()));
                    Element::Arc(Arc::new(arc.id().clone()))
                }
                node => node,
            };
            net.insert_detached(element);
        }
        for (arc, source, target) in endpoints {
            net.set_arc_endpoint(&arc, ArcDirection::Output, source)?;
            net.set_arc_endpoint(&arc, ArcDirection::Input, target)?;
        }
        Ok(net)
    }
}

impl fmt::Debug for PetriNet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PetriNet")
            .field("places", &self.places().collect::<Vec<_>>())
            .field("transitions", &self.transitions().collect::<Vec<_>>())
            .field("arcs", &self.arcs().collect::<Vec<_>>())
            .finish()
    }
}

impl PetriNet {
    pub fn new() -> Self {
        Self {
            elements: IndexMap::new(),
            arc_ids: ArcIdSequence::default(),
        }
    }

    pub fn with_arc_prefix(prefix: impl Into<String>) -> Self {
        Self {
            elements: IndexMap::new(),
            arc_ids: ArcIdSequence::new(prefix),
        }
    }

    pub fn with_config(config: &NetConfig) -> Self {
        Self::with_arc_prefix(config.arc_id_prefix.clone())
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Registers a standalone element.
    ///
    /// Arcs must name two existing nodes of different kinds that are not yet
    /// connected in the same direction; they are linked into both adjacency lists.
    pub fn add_element(&mut self, element: impl Into<Element>) -> Result<(), NetError> {
        let element = element.into();
        let id = element.id().clone();
        self.ensure_new_id(&id)?;

        let endpoints = match &element {
            Element::Arc(arc) => Some(self.validate_new_arc(arc)?),
            Element::Place(_) | Element::Transition(_) => None,
        };
        self.insert_detached(element);
        if let Some((source, target)) = endpoints {
            self.link(&source, ArcDirection::Output, &id);
            self.link(&target, ArcDirection::Input, &id);
        }
        Ok(())
    }

    fn ensure_new_id(&self, id: &ElementId) -> Result<(), NetError> {
        if id.is_blank() {
            return Err(NetError::InvalidArgument(
                "element id cannot be blank".to_owned(),
            ));
        }
        if self.elements.contains_key(id) {
            return Err(NetError::DuplicateId(id.clone()));
        }
        Ok(())
    }

    /// Inserts without linking; a node's own adjacency lists are cleared.
    fn insert_detached(&mut self, mut element: Element) {
        let id = element.id().clone();
        if let Some(node) = element.node_mut() {
            if !node.input_arcs().is_empty() || !node.output_arcs().is_empty() {
                log::debug!("dropping stale adjacency of node {id} before insertion");
                node.arcs_mut(ArcDirection::Input).clear();
                node.arcs_mut(ArcDirection::Output).clear();
            }
        }
        self.elements.insert(id, element);
    }

    fn validate_new_arc(&self, arc: &Arc) -> Result<(ElementId, ElementId), NetError> {
        let missing = |role: &str| {
            NetError::InvalidArgument(format!("arc {} has no {role}", arc.id()))
        };
        let source = arc.source().ok_or_else(|| missing("source"))?.clone();
        let target = arc.target().ok_or_else(|| missing("target"))?.clone();
        if self.node_kind(&source)? == self.node_kind(&target)? {
            return Err(NetError::InvalidArgument(format!(
                "arc {}: source cannot be of same type as target",
                arc.id()
            )));
        }
        self.ensure_unconnected(&source, ArcDirection::Output, &target, None)?;
        Ok((source, target))
    }

    pub fn element(&self, id: &str) -> Option<&Element> {
        self.elements.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.elements.contains_key(id)
    }

    /// Element ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = &ElementId> {
        self.elements.keys()
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.values()
    }

    pub fn places(&self) -> impl Iterator<Item = &Place> {
        self.elements.values().filter_map(Element::as_place)
    }

    pub fn transitions(&self) -> impl Iterator<Item = &Transition> {
        self.elements.values().filter_map(Element::as_transition)
    }

    pub fn arcs(&self) -> impl Iterator<Item = &Arc> {
        self.elements.values().filter_map(Element::as_arc)
    }

    pub fn place(&self, id: &str) -> Option<&Place> {
        self.elements.get(id).and_then(Element::as_place)
    }

    pub fn transition(&self, id: &str) -> Option<&Transition> {
        self.elements.get(id).and_then(Element::as_transition)
    }

    pub fn arc(&self, id: &str) -> Option<&Arc> {
        self.elements.get(id).and_then(Element::as_arc)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.elements.get(id).and_then(Element::node)
    }

    pub fn clear(&mut self) {
        self.elements.clear();
    }

    pub fn set_name(&mut self, id: &str, name: impl Into<String>) -> Result<(), NetError> {
        self.node_checked_mut(id)?.set_name(name);
        Ok(())
    }

    pub fn set_position(&mut self, id: &str, position: Position) -> Result<(), NetError> {
        self.node_checked_mut(id)?.set_position(position);
        Ok(())
    }

    pub fn set_marking(&mut self, id: &str, marking: i64) -> Result<(), NetError> {
        match self.elements.get_mut(id) {
            Some(Element::Place(place)) => place.set_marking(marking),
            Some(other) => Err(NetError::InvalidArgument(format!(
                "{id} is a {}, only places carry a marking",
                other.kind()
            ))),
            None => Err(NetError::NotFound(id.into())),
        }
    }

    /// Removes an element. Removing a node first removes every arc touching it.
    pub fn remove_element(&mut self, id: &str) -> Result<Element, NetError> {
        let element = self
            .elements
            .get(id)
            .ok_or_else(|| NetError::NotFound(id.into()))?;

        if let Some(node) = element.node() {
            let attached: Vec<ElementId> = node
                .input_arcs()
                .iter()
                .chain(node.output_arcs())
                .cloned()
                .collect();
            for arc in attached {
                self.remove_arc(&arc);
            }
            return self
                .elements
                .shift_remove(id)
                .ok_or_else(|| NetError::NotFound(id.into()));
        }

        self.remove_arc(id)
            .ok_or_else(|| NetError::NotFound(id.into()))
    }

    fn remove_arc(&mut self, id: &str) -> Option<Element> {
        let arc = self.arc(id)?;
        let source = arc.source().cloned();
        let target = arc.target().cloned();
        if let Some(source) = source {
            self.unlink(&source, ArcDirection::Output, id);
        }
        if let Some(target) = target {
            self.unlink(&target, ArcDirection::Input, id);
        }
        self.elements.shift_remove(id)
    }

    pub fn add_input_arc(&mut self, node: &str, arc: &str) -> Result<(), NetError> {
        self.attach_arc(node, ArcDirection::Input, arc)
    }

    pub fn add_output_arc(&mut self, node: &str, arc: &str) -> Result<(), NetError> {
        self.attach_arc(node, ArcDirection::Output, arc)
    }

    pub fn remove_input_arc(&mut self, node: &str, arc: &str) -> Result<(), NetError> {
        self.detach_arc(node, ArcDirection::Input, arc)
    }

    pub fn remove_output_arc(&mut self, node: &str, arc: &str) -> Result<(), NetError> {
        self.detach_arc(node, ArcDirection::Output, arc)
    }

    pub fn set_arc_source(&mut self, arc: &str, node: Option<&str>) -> Result<(), NetError> {
        self.set_arc_endpoint(arc, ArcDirection::Output, node.map(ElementId::from))
    }

    pub fn set_arc_target(&mut self, arc: &str, node: Option<&str>) -> Result<(), NetError> {
        self.set_arc_endpoint(arc, ArcDirection::Input, node.map(ElementId::from))
    }

    /// Creates an arc `from -> to` with a freshly generated id.
    pub fn connect_to_node(&mut self, from: &str, to: &str) -> Result<ElementId, NetError> {
        let elements = &self.elements;
        let id = self.arc_ids.next_free(|candidate| elements.contains_key(candidate));
        self.add_element(Arc::between(id.clone(), from, to))?;
        Ok(id)
    }

    /// Creates an arc `from -> node` with a freshly generated id.
    pub fn connect_from_node(&mut self, node: &str, from: &str) -> Result<ElementId, NetError> {
        self.connect_to_node(from, node)
    }

    /// Connects `from` to each node in order. Stops at the first failure;
    /// arcs created before it stay in the net.
    pub fn connect_to_nodes<S: AsRef<str>>(
        &mut self,
        from: &str,
        targets: &[S],
    ) -> Result<Vec<ElementId>, NetError> {
        targets
            .iter()
            .map(|target| self.connect_to_node(from, target.as_ref()))
            .collect()
    }

    pub fn connect_from_nodes<S: AsRef<str>>(
        &mut self,
        node: &str,
        sources: &[S],
    ) -> Result<Vec<ElementId>, NetError> {
        sources
            .iter()
            .map(|source| self.connect_from_node(node, source.as_ref()))
            .collect()
    }

    fn attach_arc(&mut self, node: &str, direction: ArcDirection, arc: &str) -> Result<(), NetError> {
        let holder = self.node_checked(node)?;
        let arc_ref = self.arc_checked(arc)?;
        if holder.arcs(direction).iter().any(|held| held == arc) {
            log::warn!("arc {arc} is already attached to node {node}");
            return Ok(());
        }
        if let Some(other) = arc_ref.endpoint(direction.opposite()) {
            self.ensure_unconnected(node, direction, other, Some(arc))?;
        }
        if arc_ref.endpoint(direction).is_some_and(|current| current == node) {
            self.link(node, direction, arc);
            return Ok(());
        }
        self.set_arc_endpoint(arc, direction, Some(node.into()))
    }

    fn detach_arc(&mut self, node: &str, direction: ArcDirection, arc: &str) -> Result<(), NetError> {
        let holder = self.node_checked(node)?;
        if !holder.arcs(direction).iter().any(|held| held == arc) {
            log::debug!("arc {arc} is not attached to node {node}, nothing to remove");
            return Ok(());
        }
        self.unlink(node, direction, arc);
        if let Some(arc_mut) = self.elements.get_mut(arc).and_then(Element::as_arc_mut) {
            if arc_mut.endpoint(direction).is_some_and(|current| current == node) {
                arc_mut.set_endpoint(direction, None);
            }
        }
        Ok(())
    }

    /// `direction` names the list of `node` that will hold the arc:
    /// `Output` sets the source, `Input` the target.
    fn set_arc_endpoint(
        &mut self,
        arc: &str,
        direction: ArcDirection,
        node: Option<ElementId>,
    ) -> Result<(), NetError> {
        let arc_ref = self.arc_checked(arc)?;
        let current = arc_ref.endpoint(direction).cloned();
        if current == node {
            return Ok(());
        }
        if let Some(new) = &node {
            let kind = self.node_kind(new)?;
            if let Some(other) = arc_ref.endpoint(direction.opposite()) {
                if self.node_kind(other)? == kind {
                    let (role, other_role) = match direction {
                        ArcDirection::Output => ("source", "target"),
                        ArcDirection::Input => ("target", "source"),
                    };
                    return Err(NetError::InvalidArgument(format!(
                        "arc {arc}: {role} cannot be of same type as {other_role}"
                    )));
                }
                self.ensure_unconnected(new, direction, other, Some(arc))?;
            }
        }

        if let Some(old) = &current {
            self.unlink(old, direction, arc);
        }
        if let Some(arc_mut) = self.elements.get_mut(arc).and_then(Element::as_arc_mut) {
            arc_mut.set_endpoint(direction, node.clone());
        }
        if let Some(new) = &node {
            self.link(new, direction, arc);
        }
        Ok(())
    }

    /// Fails if `node` already holds, in `direction`, an arc whose other end is `other`.
    fn ensure_unconnected(
        &self,
        node: &str,
        direction: ArcDirection,
        other: &str,
        ignore: Option<&str>,
    ) -> Result<(), NetError> {
        let Some(holder) = self.node(node) else {
            return Ok(());
        };
        let parallel = holder
            .arcs(direction)
            .iter()
            .filter(|held| ignore.is_none_or(|ignored| held.as_str() != ignored))
            .filter_map(|held| self.arc(held))
            .any(|held| held.endpoint(direction.opposite()).is_some_and(|end| end == other));
        if parallel {
            let (from, to) = match direction {
                ArcDirection::Output => (node, other),
                ArcDirection::Input => (other, node),
            };
            return Err(NetError::DuplicateConnection {
                from: from.into(),
                to: to.into(),
            });
        }
        Ok(())
    }

    fn link(&mut self, node: &str, direction: ArcDirection, arc: &str) {
        if let Some(holder) = self.elements.get_mut(node).and_then(Element::node_mut) {
            let list = holder.arcs_mut(direction);
            if !list.iter().any(|held| held == arc) {
                list.push(arc.into());
            }
        }
    }

    fn unlink(&mut self, node: &str, direction: ArcDirection, arc: &str) {
        if let Some(holder) = self.elements.get_mut(node).and_then(Element::node_mut) {
            holder.arcs_mut(direction).retain(|held| held.as_str() != arc);
        }
    }

    fn node_kind(&self, id: &str) -> Result<ElementKind, NetError> {
        match self.elements.get(id) {
            Some(Element::Arc(_)) => Err(NetError::InvalidArgument(format!(
                "{id} is an arc, not a place or transition"
            ))),
            Some(element) => Ok(element.kind()),
            None => Err(NetError::NotFound(id.into())),
        }
    }

    fn node_checked(&self, id: &str) -> Result<&Node, NetError> {
        self.node_kind(id)?;
        self.node(id).ok_or_else(|| NetError::NotFound(id.into()))
    }

    fn node_checked_mut(&mut self, id: &str) -> Result<&mut Node, NetError> {
        self.node_kind(id)?;
        self.elements
            .get_mut(id)
            .and_then(Element::node_mut)
            .ok_or_else(|| NetError::NotFound(id.into()))
    }

    fn arc_checked(&self, id: &str) -> Result<&Arc, NetError> {
        match self.elements.get(id) {
            Some(Element::Arc(arc)) => Ok(arc),
            Some(other) => Err(NetError::InvalidArgument(format!(
                "{id} is a {}, not an arc",
                other.kind()
            ))),
            None => Err(NetError::NotFound(id.into())),
        }
    }

    fn transition_checked(&self, id: &str) -> Result<&Transition, NetError> {
        match self.elements.get(id) {
            Some(Element::Transition(transition)) => Ok(transition),
            Some(other) => Err(NetError::InvalidArgument(format!(
                "{id} is a {}, not a transition",
                other.kind()
            ))),
            None => Err(NetError::NotFound(id.into())),
        }
    }

    /// A transition is enabled when every input arc starts at a place holding a token.
    pub fn is_enabled(&self, transition: &str) -> Result<bool, NetError> {
        let transition = self.transition_checked(transition)?;
        Ok(self.enabled(transition))
    }

    fn enabled(&self, transition: &Transition) -> bool {
        transition.node().input_arcs().iter().all(|arc| {
            self.arc(arc)
                .and_then(Arc::source)
                .and_then(|source| self.place(source))
                .is_some_and(|place| place.marking() >= 1)
        })
    }

    pub fn enabled_transitions(&self) -> Vec<ElementId> {
        self.transitions()
            .filter(|transition| self.enabled(transition))
            .map(|transition| transition.id().clone())
            .collect()
    }

    /// Fires `transition`.
    ///
    /// One token is taken from the source place of every input arc and every
    /// output place receives the number of tokens taken. Returns `false`, without
    /// touching any marking, when the transition is disabled or has no output arcs.
    pub fn occur(&mut self, transition: &str) -> Result<bool, NetError> {
        let fired = self.transition_checked(transition)?;
        if !self.enabled(fired) {
            log::info!("transition {transition} is not enabled, ignoring fire request");
            return Ok(false);
        }
        if fired.node().output_arcs().is_empty() {
            log::info!("transition {transition} has no output arcs, ignoring fire request");
            return Ok(false);
        }

        let inputs = self.arc_endpoints(fired.node().input_arcs(), ArcDirection::Output);
        let outputs = self.arc_endpoints(fired.node().output_arcs(), ArcDirection::Input);

        let mut consumed: Weight = 0;
        for place in &inputs {
            if let Some(Element::Place(place)) = self.elements.get_mut(place) {
                place.take_token();
                consumed += 1;
            }
        }
        for place in &outputs {
            if let Some(Element::Place(place)) = self.elements.get_mut(place) {
                place.put_tokens(consumed);
            }
        }
        log::debug!(
            "transition {transition} fired: {consumed} token(s) from {} input(s) to {} output(s)",
            inputs.len(),
            outputs.len()
        );
        Ok(true)
    }

    fn arc_endpoints(&self, arcs: &[ElementId], direction: ArcDirection) -> Vec<ElementId> {
        arcs.iter()
            .filter_map(|arc| self.arc(arc))
            .filter_map(|arc| arc.endpoint(direction).cloned())
            .collect()
    }

    /// Current token count of every place, in insertion order.
    pub fn markings(&self) -> IndexMap<ElementId, Weight> {
        self.places()
            .map(|place| (place.id().clone(), place.marking()))
            .collect()
    }

    pub fn to_pnml(&self) -> String {
        let mut pnml = String::new();
        let _ = writeln!(&mut pnml, "{PNML_HEADER}");
        let _ = writeln!(&mut pnml, "<pnml>");
        let _ = writeln!(&mut pnml, "<net>");
        for element in self.elements.values() {
            let _ = writeln!(&mut pnml, "{}", element.to_pnml());
        }
        let _ = writeln!(&mut pnml, "</net>");
        let _ = writeln!(&mut pnml, "</pnml>");
        pnml
    }
}

impl Default for PetriNet {
    fn default() -> Self {
        Self::new()
    }
}

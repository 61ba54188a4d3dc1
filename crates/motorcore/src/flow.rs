use crate::{FlowError, Map, NodeKind, Value};
use serde::{Deserialize, Serialize};

pub type FlowId = String;
pub type NodeId = String;

/// A flow graph as authored in the visual editor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowDefinition {
    #[serde(default)]
    pub id: FlowId,

    #[serde(default, alias = "nombre")]
    pub name: String,

    #[serde(default)]
    pub nodes: Vec<NodeSpec>,

    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
}

impl FlowDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Parse the stored JSON text of a flow
    pub fn parse(text: &str) -> Result<Self, FlowError> {
        serde_json::from_str(text).map_err(|e| FlowError::Malformed(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, FlowError> {
        serde_json::to_string(self).map_err(|e| FlowError::Malformed(e.to_string()))
    }

    pub fn add_node(&mut self, node: NodeSpec) -> NodeId {
        let id = node.id.clone();
        self.nodes.push(node);
        id
    }

    /// Add a normal edge
    pub fn connect(&mut self, source: impl Into<String>, target: impl Into<String>) {
        self.push_edge(EdgeSpec::new(source, target));
    }

    /// Add an edge taken only when the source node fails
    pub fn connect_on_error(&mut self, source: impl Into<String>, target: impl Into<String>) {
        self.push_edge(EdgeSpec::new(source, target).with_kind(EdgeKind::Error));
    }

    /// Add an edge leaving a condition node through its `true`/`false` handle
    pub fn connect_branch(
        &mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        branch: bool,
    ) {
        self.push_edge(EdgeSpec::new(source, target).with_handle(branch.to_string()));
    }

    fn push_edge(&mut self, mut edge: EdgeSpec) {
        if edge.id.is_empty() {
            edge.id = format!("e{}-{}-{}", self.edges.len(), edge.source, edge.target);
        }
        self.edges.push(edge);
    }

    pub fn find_node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn find_node_mut(&mut self, id: &str) -> Option<&mut NodeSpec> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }
}

/// Node as stored: identity, type tag and free-form configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,

    #[serde(rename = "type")]
    pub node_type: String,

    #[serde(default)]
    pub data: Map,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl NodeSpec {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            data: Map::new(),
            position: None,
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.position = Some(Position { x, y });
        self
    }

    pub fn kind(&self) -> NodeKind {
        NodeKind::from(self.node_type.as_str())
    }

    /// Display label, falling back to the node id
    pub fn label(&self) -> String {
        self.data
            .get("label")
            .and_then(Value::as_str)
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.id.clone())
    }
}

/// Node position in the visual editor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

/// Whether an edge is followed on success or on failure of its source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum EdgeKind {
    #[default]
    Normal,
    Error,
}

impl From<Option<String>> for EdgeKind {
    fn from(raw: Option<String>) -> Self {
        match raw.as_deref() {
            Some("error") => EdgeKind::Error,
            _ => EdgeKind::Normal,
        }
    }
}

impl From<EdgeKind> for String {
    fn from(kind: EdgeKind) -> Self {
        match kind {
            EdgeKind::Normal => "normal".to_string(),
            EdgeKind::Error => "error".to_string(),
        }
    }
}

/// Directed edge between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSpec {
    #[serde(default)]
    pub id: String,

    pub source: NodeId,

    pub target: NodeId,

    #[serde(rename = "type", default)]
    pub kind: EdgeKind,

    #[serde(rename = "sourceHandle", default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
}

impl EdgeSpec {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            source: source.into(),
            target: target.into(),
            kind: EdgeKind::Normal,
            source_handle: None,
        }
    }

    pub fn with_kind(mut self, kind: EdgeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.source_handle = Some(handle.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.kind == EdgeKind::Error
    }

    /// Edge is followed given whether its source node errored
    pub fn follows(&self, errored: bool) -> bool {
        self.is_error() == errored
    }
}

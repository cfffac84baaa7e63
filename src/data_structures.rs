/*!
# Graph data structures

Типы, общие для всех этапов запуска, и небольшой граф внутри крейта,
выполняющий внешний контракт графа:

- **`NodeId` / `Position` / `EdgeRecord`** - словарь укладки
- **`GraphDataProvider`** - что движку нужно от любого графа: упорядоченные
  узлы, ребра, существующие координаты и атомарная запись только `x`/`y`
- **`Graph` / `GraphBuilder`** - граф на списках смежности, узлы которого несут
  необязательные координаты и произвольные атрибуты

*/

use crate::error::{LayoutError, Result};
use crate::snapshot::PositionsView;
use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smallvec::SmallVec;
use std::borrow::Borrow;
use std::fmt;

/// Непрозрачный идентификатор узла, уникален в пределах запуска
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Координата узла на плоскости
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Ребро в том виде, как его перечисляет провайдер
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub id: String,
    pub source: NodeId,
    pub target: NodeId,
    /// Отсутствующий вес заменяется на 1 при снятии снимка
    pub weight: Option<f64>,
}

/// Контракт, который движок использует от внешнего графа
pub trait GraphDataProvider {
    /// Узлы в стабильном порядке; порядок задает плотную индексацию запуска
    fn node_ids(&self) -> Vec<NodeId>;

    fn edge_records(&self) -> Vec<EdgeRecord>;

    /// Существующие координаты узла, если есть и `x`, и `y`
    fn node_position(&self, id: &NodeId) -> Option<Position>;

    /// Координаты всех узлов в порядке `node_ids`
    fn node_positions(&self) -> Vec<Option<Position>> {
        self.node_ids()
            .iter()
            .map(|id| self.node_position(id))
            .collect()
    }

    /// Записывает `x`/`y` каждого узла из представления и больше ничего.
    ///
    /// Реализация обязана быть атомарной: записываются все позиции, либо при
    /// ошибке ни одной.
    fn update_node_positions(&mut self, positions: &PositionsView<'_>) -> Result<()>;
}

/// Атрибуты узла: необязательные координаты и любые данные вызывающего
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NodeAttributes {
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            extra: Map::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEntry {
    pub id: NodeId,

    #[serde(flatten)]
    pub attributes: NodeAttributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Назначается как `e<index>`, если пусто
    #[serde(default)]
    pub id: String,

    pub source: NodeId,

    pub target: NodeId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GraphEdge {
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            id: String::new(),
            source: source.into(),
            target: target.into(),
            weight: None,
            extra: Map::new(),
        }
    }

    pub fn weighted(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }
}

/// Сериализованная форма графа: `{"nodes": [...], "edges": [...]}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default)]
    pub nodes: Vec<NodeEntry>,

    #[serde(default)]
    pub edges: Vec<GraphEdge>,
}

/// Граф с упорядоченными узлами и ребрами с атрибутами
#[derive(Debug, Clone, Default)]
pub struct Graph {
    /// ID -> индекс
    vertex_map: HashMap<NodeId, usize>,

    /// Узлы в порядке вставки
    nodes: Vec<NodeEntry>,

    adjacency_out: Vec<SmallVec<[usize; 4]>>,

    adjacency_in: Vec<SmallVec<[usize; 4]>>,

    edges: Vec<GraphEdge>,

    /// Атрибут ребра с весом, если это не `weight`
    weight_attribute: Option<String>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_document(document: GraphDocument) -> Result<Self> {
        let mut graph = Self::new();
        for node in document.nodes {
            graph.add_node(node.id, node.attributes)?;
        }
        for edge in document.edges {
            graph.add_edge(edge)?;
        }
        Ok(graph)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let document: GraphDocument = serde_json::from_str(json)
            .map_err(|e| LayoutError::invalid_input(format!("malformed graph JSON: {e}")))?;
        Self::from_document(document)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeEntry> {
        self.nodes.iter()
    }

    pub fn edges(&self) -> impl Iterator<Item = &GraphEdge> {
        self.edges.iter()
    }

    pub fn node(&self, id: &str) -> Option<&NodeEntry> {
        self.vertex_map.get(id).map(|&idx| &self.nodes[idx])
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.vertex_map.contains_key(id)
    }

    pub fn contains_edge(&self, source: &str, target: &str) -> bool {
        match (self.vertex_map.get(source), self.vertex_map.get(target)) {
            (Some(&source_idx), Some(&target_idx)) => {
                self.adjacency_out[source_idx].contains(&target_idx)
            }
            _ => false,
        }
    }

    /// Читает веса ребер из `attribute` вместо поля `weight`
    pub fn set_weight_attribute(&mut self, attribute: impl Into<String>) {
        let attribute = attribute.into();
        self.weight_attribute = (attribute != "weight").then_some(attribute);
    }

    pub fn add_node(&mut self, id: impl Into<NodeId>, attributes: NodeAttributes) -> Result<usize> {
        let id = id.into();
        if self.vertex_map.contains_key(&id) {
            return Err(LayoutError::invalid_input(format!("duplicate node id '{id}'")));
        }

        let idx = self.nodes.len();
        self.vertex_map.insert(id.clone(), idx);
        self.nodes.push(NodeEntry { id, attributes });
        self.adjacency_out.push(SmallVec::new());
        self.adjacency_in.push(SmallVec::new());
        Ok(idx)
    }

    /// Добавляет ребро между существующими узлами. Петли разрешены.
    pub fn add_edge(&mut self, mut edge: GraphEdge) -> Result<()> {
        let source_idx = *self.vertex_map.get(&edge.source).ok_or_else(|| {
            LayoutError::invalid_input(format!("edge source '{}' is not a node", edge.source))
        })?;
        let target_idx = *self.vertex_map.get(&edge.target).ok_or_else(|| {
            LayoutError::invalid_input(format!("edge target '{}' is not a node", edge.target))
        })?;

        if edge.id.is_empty() {
            edge.id = format!("e{}", self.edges.len());
        }

        self.adjacency_out[source_idx].push(target_idx);
        self.adjacency_in[target_idx].push(source_idx);
        self.edges.push(edge);
        Ok(())
    }

    pub fn connect(
        &mut self,
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
        weight: Option<f64>,
    ) -> Result<()> {
        let mut edge = GraphEdge::new(source, target);
        edge.weight = weight;
        self.add_edge(edge)
    }

    /// Число инцидентных концов ребер, петля считается дважды
    pub fn degree(&self, id: &str) -> usize {
        self.vertex_map
            .get(id)
            .map(|&idx| self.adjacency_out[idx].len() + self.adjacency_in[idx].len())
            .unwrap_or(0)
    }

    pub fn isolated_nodes(&self) -> Vec<&NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(idx, _)| self.adjacency_out[*idx].is_empty() && self.adjacency_in[*idx].is_empty())
            .map(|(_, node)| &node.id)
            .collect()
    }

    pub fn statistics(&self) -> GraphStatistics {
        let node_count = self.node_count();
        let self_loops = self.edges.iter().filter(|e| e.source == e.target).count();

        let density = if node_count > 1 {
            self.edge_count() as f64 / (node_count * (node_count - 1)) as f64
        } else {
            0.0
        };

        GraphStatistics {
            node_count,
            edge_count: self.edge_count(),
            self_loops,
            isolated_nodes: self.isolated_nodes().len(),
            density,
        }
    }

    fn edge_weight(&self, edge: &GraphEdge) -> Option<f64> {
        match &self.weight_attribute {
            Some(attribute) => edge.extra.get(attribute).and_then(Value::as_f64),
            None => edge.weight,
        }
    }
}

impl GraphDataProvider for Graph {
    fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|node| node.id.clone()).collect()
    }

    fn edge_records(&self) -> Vec<EdgeRecord> {
        self.edges
            .iter()
            .map(|edge| EdgeRecord {
                id: edge.id.clone(),
                source: edge.source.clone(),
                target: edge.target.clone(),
                weight: self.edge_weight(edge),
            })
            .collect()
    }

    fn node_position(&self, id: &NodeId) -> Option<Position> {
        let node = self.node(id.as_str())?;
        match (node.attributes.x, node.attributes.y) {
            (Some(x), Some(y)) => Some(Position::new(x, y)),
            _ => None,
        }
    }

    fn update_node_positions(&mut self, positions: &PositionsView<'_>) -> Result<()> {
        let mut targets = Vec::with_capacity(positions.len());
        for (id, position) in positions.iter() {
            let idx = *self.vertex_map.get(id).ok_or_else(|| {
                LayoutError::invalid_input(format!("cannot assign position to unknown node '{id}'"))
            })?;
            targets.push((idx, position));
        }

        for (idx, position) in targets {
            let attributes = &mut self.nodes[idx].attributes;
            attributes.x = Some(position.x);
            attributes.y = Some(position.y);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphStatistics {
    pub node_count: usize,
    pub edge_count: usize,
    pub self_loops: usize,
    pub isolated_nodes: usize,
    pub density: f64,
}

/// Строит граф из ребер, регистрируя концы при первой встрече
pub struct GraphBuilder {
    order: Vec<NodeId>,
    seen: HashSet<NodeId>,
    edges: Vec<(NodeId, NodeId, Option<f64>)>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            seen: HashSet::new(),
            edges: Vec::new(),
        }
    }

    pub fn add_node(&mut self, id: impl Into<NodeId>) -> &mut Self {
        let id = id.into();
        if self.seen.insert(id.clone()) {
            self.order.push(id);
        }
        self
    }

    pub fn add_edge(&mut self, source: impl Into<NodeId>, target: impl Into<NodeId>, weight: f64) -> &mut Self {
        self.push_edge(source.into(), target.into(), Some(weight))
    }

    pub fn add_unweighted_edge(&mut self, source: impl Into<NodeId>, target: impl Into<NodeId>) -> &mut Self {
        self.push_edge(source.into(), target.into(), None)
    }

    fn push_edge(&mut self, source: NodeId, target: NodeId, weight: Option<f64>) -> &mut Self {
        self.add_node(source.clone());
        self.add_node(target.clone());
        self.edges.push((source, target, weight));
        self
    }

    pub fn build(&self) -> Result<Graph> {
        let mut graph = Graph::new();
        for id in &self.order {
            graph.add_node(id.clone(), NodeAttributes::default())?;
        }
        for (source, target, weight) in &self.edges {
            graph.connect(source.clone(), target.clone(), *weight)?;
        }
        Ok(graph)
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

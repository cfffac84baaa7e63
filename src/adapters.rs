/*!
# petgraph adapter

Позволяет укладывать `petgraph::Graph` напрямую. Веса узлов реализуют
[`LayoutNode`] (id и координаты), веса ребер реализуют [`LayoutEdge`]
(необязательный вес).
*/

use crate::data_structures::{EdgeRecord, GraphDataProvider, NodeId, Position};
use crate::error::{LayoutError, Result};
use crate::snapshot::PositionsView;
use hashbrown::HashMap;
use petgraph::graph::{Graph, IndexType, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::EdgeType;
use serde::{Deserialize, Serialize};

/// Вес узла, пригодный для укладки
pub trait LayoutNode {
    fn layout_id(&self) -> NodeId;

    fn position(&self) -> Option<Position> {
        None
    }

    fn set_position(&mut self, position: Position);
}

/// Вес ребра, пригодный для укладки
pub trait LayoutEdge {
    fn layout_weight(&self) -> Option<f64> {
        None
    }
}

impl LayoutEdge for () {}

impl LayoutEdge for f64 {
    fn layout_weight(&self) -> Option<f64> {
        Some(*self)
    }
}

impl LayoutEdge for Option<f64> {
    fn layout_weight(&self) -> Option<f64> {
        *self
    }
}

/// Готовый вес узла: id и необязательные координаты
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutVertex {
    pub id: NodeId,
    pub position: Option<Position>,
}

impl LayoutVertex {
    pub fn new(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            position: None,
        }
    }

    pub fn at(id: impl Into<NodeId>, x: f64, y: f64) -> Self {
        Self {
            id: id.into(),
            position: Some(Position::new(x, y)),
        }
    }
}

impl LayoutNode for LayoutVertex {
    fn layout_id(&self) -> NodeId {
        self.id.clone()
    }

    fn position(&self) -> Option<Position> {
        self.position
    }

    fn set_position(&mut self, position: Position) {
        self.position = Some(position);
    }
}

impl<N, E, Ty, Ix> GraphDataProvider for Graph<N, E, Ty, Ix>
where
    N: LayoutNode,
    E: LayoutEdge,
    Ty: EdgeType,
    Ix: IndexType,
{
    fn node_ids(&self) -> Vec<NodeId> {
        self.node_indices().map(|idx| self[idx].layout_id()).collect()
    }

    fn edge_records(&self) -> Vec<EdgeRecord> {
        self.edge_references()
            .map(|edge| EdgeRecord {
                id: format!("e{}", edge.id().index()),
                source: self[edge.source()].layout_id(),
                target: self[edge.target()].layout_id(),
                weight: edge.weight().layout_weight(),
            })
            .collect()
    }

    fn node_position(&self, id: &NodeId) -> Option<Position> {
        self.node_indices()
            .map(|idx| &self[idx])
            .find(|node| node.layout_id() == *id)
            .and_then(|node| node.position())
    }

    fn node_positions(&self) -> Vec<Option<Position>> {
        self.node_indices().map(|idx| self[idx].position()).collect()
    }

    fn update_node_positions(&mut self, positions: &PositionsView<'_>) -> Result<()> {
        let index: HashMap<NodeId, NodeIndex<Ix>> = self
            .node_indices()
            .map(|idx| (self[idx].layout_id(), idx))
            .collect();

        let mut targets = Vec::with_capacity(positions.len());
        for (id, position) in positions.iter() {
            let idx = *index.get(id).ok_or_else(|| {
                LayoutError::invalid_input(format!("cannot assign position to unknown node '{id}'"))
            })?;
            targets.push((idx, position));
        }

        for (idx, position) in targets {
            self[idx].set_position(position);
        }
        Ok(())
    }
}

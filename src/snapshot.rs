/*!
# Graph snapshots and result projection

Запуск работает с плотными индексами. Модуль связывает два представления
одной укладки:

- [`NodeProjection`]: неизменяемая таблица `index <-> id`, строится раз за запуск
- [`GraphSnapshot`]: узлы, ребра и координаты провайдера в индексной форме
- [`PositionsView`] / [`PositionMapping`]: чтение по id поверх плотного буфера
- [`ResultProjector`]: переводит плотный результат обратно в форму по id или
  записывает его в провайдер

*/

use crate::algorithms::{IndexedEdge, SimulationInput, SimulationOptions};
use crate::data_structures::{GraphDataProvider, NodeId, Position};
use crate::error::{LayoutError, Result};
use hashbrown::HashMap;
use ndarray::{Array2, ArrayView2};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::sync::Arc;
use tracing::debug;

/// Биекция между плотными индексами и id узлов
#[derive(Debug, Clone, PartialEq)]
pub struct NodeProjection {
    ids: Vec<NodeId>,
    index: HashMap<NodeId, usize>,
}

impl NodeProjection {
    pub fn new(ids: Vec<NodeId>) -> Result<Self> {
        let mut index = HashMap::with_capacity(ids.len());
        for (idx, id) in ids.iter().enumerate() {
            if index.insert(id.clone(), idx).is_some() {
                return Err(LayoutError::invalid_input(format!("duplicate node id '{id}'")));
            }
        }
        Ok(Self { ids, index })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn id(&self, idx: usize) -> Option<&NodeId> {
        self.ids.get(idx)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn ids(&self) -> &[NodeId] {
        &self.ids
    }
}

/// Представление только для чтения по id поверх буфера позиций `(n, 2)`
#[derive(Debug, Clone, Copy)]
pub struct PositionsView<'a> {
    projection: &'a Arc<NodeProjection>,
    coords: ArrayView2<'a, f64>,
}

impl<'a> PositionsView<'a> {
    /// Форму проверяет вызывающий; несовпадение является ошибкой в этом крейте.
    pub(crate) fn new(projection: &'a Arc<NodeProjection>, coords: ArrayView2<'a, f64>) -> Self {
        assert_eq!(
            coords.dim(),
            (projection.len(), 2),
            "positions buffer does not match the node projection"
        );
        Self { projection, coords }
    }

    pub fn len(&self) -> usize {
        self.projection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projection.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<Position> {
        let idx = self.projection.index_of(id)?;
        Some(self.at(idx))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a NodeId, Position)> + 'a {
        let view = *self;
        let ids: &'a [NodeId] = view.projection.ids();
        ids.iter().enumerate().map(move |(idx, id)| (id, view.at(idx)))
    }

    pub fn coords(&self) -> ArrayView2<'a, f64> {
        self.coords
    }

    /// Копирует представление во владеющее отображение
    pub fn to_mapping(&self) -> PositionMapping {
        PositionMapping {
            projection: Arc::clone(self.projection),
            coords: self.coords.to_owned(),
        }
    }

    fn at(&self, idx: usize) -> Position {
        Position::new(self.coords[[idx, 0]], self.coords[[idx, 1]])
    }
}

/// Итоговая укладка: одна позиция на id узла
#[derive(Debug, Clone)]
pub struct PositionMapping {
    projection: Arc<NodeProjection>,
    coords: Array2<f64>,
}

impl PositionMapping {
    pub fn new(projection: Arc<NodeProjection>, coords: Array2<f64>) -> Result<Self> {
        if coords.dim() != (projection.len(), 2) {
            return Err(LayoutError::invalid_input(format!(
                "positions buffer has shape {:?}, expected ({}, 2)",
                coords.dim(),
                projection.len()
            )));
        }
        Ok(Self { projection, coords })
    }

    pub fn len(&self) -> usize {
        self.projection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projection.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<Position> {
        self.view().get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, Position)> + '_ {
        self.projection
            .ids()
            .iter()
            .enumerate()
            .map(move |(idx, id)| (id, Position::new(self.coords[[idx, 0]], self.coords[[idx, 1]])))
    }

    pub fn view(&self) -> PositionsView<'_> {
        PositionsView {
            projection: &self.projection,
            coords: self.coords.view(),
        }
    }

    pub fn coords(&self) -> ArrayView2<'_, f64> {
        self.coords.view()
    }

    /// Наибольшее расстояние по узлам до `other`, `None` при разных наборах узлов
    pub fn max_deviation(&self, other: &PositionMapping) -> Option<f64> {
        if self.len() != other.len() {
            return None;
        }
        let mut worst: f64 = 0.0;
        for (id, position) in self.iter() {
            let theirs = other.get(id.as_str())?;
            worst = worst.max(position.distance_to(&theirs));
        }
        Some(worst)
    }
}

impl PartialEq for PositionMapping {
    fn eq(&self, other: &Self) -> bool {
        self.projection.ids() == other.projection.ids() && self.coords == other.coords
    }
}

impl Serialize for PositionMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (id, position) in self.iter() {
            map.serialize_entry(id, &position)?;
        }
        map.end()
    }
}

/// Все, что нужно запуску от провайдера, снимается один раз до старта
#[derive(Debug, Clone)]
pub struct GraphSnapshot {
    projection: Arc<NodeProjection>,
    edges: Vec<IndexedEdge>,
    existing: Vec<Option<Position>>,
}

impl GraphSnapshot {
    pub fn extract<G: GraphDataProvider + ?Sized>(graph: &G) -> Result<Self> {
        let projection = Arc::new(NodeProjection::new(graph.node_ids())?);

        let records = graph.edge_records();
        let mut edges = Vec::with_capacity(records.len());
        for record in records {
            let endpoint = |id: &NodeId| {
                projection.index_of(id.as_str()).ok_or_else(|| {
                    LayoutError::invalid_input(format!(
                        "edge '{}' references unknown node '{id}'",
                        record.id
                    ))
                })
            };
            let source = endpoint(&record.source)?;
            let target = endpoint(&record.target)?;

            let weight = match record.weight {
                None => 1.0,
                Some(w) if w == 0.0 => 1.0,
                Some(w) if w.is_finite() && w > 0.0 => w,
                Some(w) => {
                    return Err(LayoutError::invalid_input(format!(
                        "edge '{}' has weight {w}, expected a positive finite number",
                        record.id
                    )))
                }
            };

            edges.push(IndexedEdge {
                source,
                target,
                weight,
            });
        }

        let existing = graph.node_positions();
        if existing.len() != projection.len() {
            return Err(LayoutError::invalid_input(format!(
                "provider returned {} positions for {} nodes",
                existing.len(),
                projection.len()
            )));
        }

        debug!(
            "📸 Снимок графа: {} узлов, {} ребер",
            projection.len(),
            edges.len()
        );

        Ok(Self {
            projection,
            edges,
            existing,
        })
    }

    pub fn projection(&self) -> &Arc<NodeProjection> {
        &self.projection
    }

    pub fn node_count(&self) -> usize {
        self.projection.len()
    }

    pub fn edges(&self) -> &[IndexedEdge] {
        &self.edges
    }

    /// Координаты вызывающего в порядке индексов
    pub fn existing_positions(&self) -> &[Option<Position>] {
        &self.existing
    }

    pub fn to_input(&self, options: SimulationOptions) -> Result<SimulationInput> {
        SimulationInput::new(self.node_count(), self.edges.clone(), options)
    }

    pub fn projector(&self) -> ResultProjector {
        ResultProjector::new(Arc::clone(&self.projection))
    }
}

/// Отображает плотный результат запуска обратно на id узлов
#[derive(Debug, Clone)]
pub struct ResultProjector {
    projection: Arc<NodeProjection>,
}

impl ResultProjector {
    pub fn new(projection: Arc<NodeProjection>) -> Self {
        Self { projection }
    }

    pub fn projection(&self) -> &Arc<NodeProjection> {
        &self.projection
    }

    pub(crate) fn view<'a>(&'a self, coords: ArrayView2<'a, f64>) -> PositionsView<'a> {
        PositionsView::new(&self.projection, coords)
    }

    pub fn project(&self, coords: Array2<f64>) -> Result<PositionMapping> {
        PositionMapping::new(Arc::clone(&self.projection), coords)
    }

    /// Записывает `coords` в атрибуты `x`/`y` провайдера
    pub fn assign<G: GraphDataProvider + ?Sized>(&self, graph: &mut G, coords: ArrayView2<'_, f64>) -> Result<()> {
        if coords.dim() != (self.projection.len(), 2) {
            return Err(LayoutError::invalid_input(format!(
                "positions buffer has shape {:?}, expected ({}, 2)",
                coords.dim(),
                self.projection.len()
            )));
        }
        graph.update_node_positions(&self.view(coords.reborrow()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::{EdgeRecord, GraphBuilder};
    use ndarray::array;

    fn ids(names: &[&str]) -> Vec<NodeId> {
        names.iter().map(|name| NodeId::from(*name)).collect()
    }

    #[test]
    fn projection_rejects_duplicates() {
        assert!(NodeProjection::new(ids(&["a", "b", "a"])).is_err());

        let projection = NodeProjection::new(ids(&["a", "b"])).unwrap();
        assert_eq!(projection.index_of("b"), Some(1));
        assert_eq!(projection.id(0).map(NodeId::as_str), Some("a"));
        assert_eq!(projection.index_of("c"), None);
    }

    #[test]
    fn snapshot_defaults_missing_and_zero_weights() -> Result<()> {
        let mut builder = GraphBuilder::new();
        builder
            .add_node("a")
            .add_node("b")
            .add_node("c")
            .add_unweighted_edge("a", "b")
            .add_edge("b", "c", 0.0)
            .add_edge("c", "a", 2.5);
        let graph = builder.build()?;

        let snapshot = GraphSnapshot::extract(&graph)?;
        let weights: Vec<f64> = snapshot.edges().iter().map(|e| e.weight).collect();
        assert_eq!(weights, vec![1.0, 1.0, 2.5]);
        assert_eq!(snapshot.edges()[2].source, 2);
        assert_eq!(snapshot.edges()[2].target, 0);
        Ok(())
    }

    #[test]
    fn snapshot_rejects_negative_weight() -> Result<()> {
        let mut builder = GraphBuilder::new();
        builder.add_node("a").add_node("b").add_edge("a", "b", -1.0);
        let graph = builder.build()?;

        let err = GraphSnapshot::extract(&graph).unwrap_err();
        assert!(matches!(err, LayoutError::InvalidInput { .. }));
        Ok(())
    }

    struct DanglingProvider;

    impl GraphDataProvider for DanglingProvider {
        fn node_ids(&self) -> Vec<NodeId> {
            ids(&["a"])
        }

        fn edge_records(&self) -> Vec<EdgeRecord> {
            vec![EdgeRecord {
                id: "e0".into(),
                source: "a".into(),
                target: "ghost".into(),
                weight: None,
            }]
        }

        fn node_position(&self, _id: &NodeId) -> Option<Position> {
            None
        }

        fn update_node_positions(&mut self, _positions: &PositionsView<'_>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn snapshot_rejects_dangling_edges() {
        let err = GraphSnapshot::extract(&DanglingProvider).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn mapping_is_keyed_by_id() -> Result<()> {
        let projection = Arc::new(NodeProjection::new(ids(&["a", "b"]))?);
        let mapping = PositionMapping::new(Arc::clone(&projection), array![[1.0, 2.0], [3.0, 4.0]])?;

        assert_eq!(mapping.get("b"), Some(Position::new(3.0, 4.0)));
        assert_eq!(mapping.get("z"), None);

        let json = serde_json::to_value(&mapping).unwrap();
        assert_eq!(json["a"]["x"], 1.0);
        assert_eq!(json["b"]["y"], 4.0);

        let shifted = PositionMapping::new(projection, array![[1.0, 2.0], [3.0, 4.5]])?;
        assert_eq!(mapping.max_deviation(&shifted), Some(0.5));
        Ok(())
    }

    #[test]
    fn mapping_rejects_wrong_shape() -> Result<()> {
        let projection = Arc::new(NodeProjection::new(ids(&["a", "b"]))?);
        assert!(PositionMapping::new(projection, Array2::zeros((3, 2))).is_err());
        Ok(())
    }

    #[test]
    fn projector_assigns_into_graph() -> Result<()> {
        let mut builder = GraphBuilder::new();
        builder.add_node("a").add_node("b").add_unweighted_edge("a", "b");
        let mut graph = builder.build()?;

        let snapshot = GraphSnapshot::extract(&graph)?;
        assert_eq!(snapshot.existing_positions(), &[None, None]);

        let coords = array![[0.25, -0.25], [0.5, 0.75]];
        snapshot.projector().assign(&mut graph, coords.view())?;

        let refreshed = GraphSnapshot::extract(&graph)?;
        assert_eq!(
            refreshed.existing_positions(),
            &[Some(Position::new(0.25, -0.25)), Some(Position::new(0.5, 0.75))]
        );
        Ok(())
    }

    #[test]
    fn projector_views_borrowed_progress_buffers() -> Result<()> {
        let projector = ResultProjector::new(Arc::new(NodeProjection::new(ids(&["a", "b"]))?));
        let mut seen = Vec::new();

        let mut observe = |coords: ArrayView2<'_, f64>, iteration: usize| {
            let view = projector.view(coords.reborrow());
            seen.push((iteration, view.get("b")));
        };
        for iteration in 0..2 {
            let buffer = array![[0.0, 0.0], [iteration as f64, 1.0]];
            observe(buffer.view(), iteration);
        }

        assert_eq!(
            seen,
            vec![(0, Some(Position::new(0.0, 1.0))), (1, Some(Position::new(1.0, 1.0)))]
        );
        Ok(())
    }

    #[test]
    fn projector_rejects_mismatched_buffer_without_panicking() -> Result<()> {
        let mut builder = GraphBuilder::new();
        builder.add_node("a").add_node("b");
        let mut graph = builder.build()?;

        let snapshot = GraphSnapshot::extract(&graph)?;
        let err = snapshot
            .projector()
            .assign(&mut graph, Array2::<f64>::zeros((3, 2)).view())
            .unwrap_err();
        assert!(matches!(err, LayoutError::InvalidInput { .. }));
        assert_eq!(GraphSnapshot::extract(&graph)?.existing_positions(), &[None, None]);
        Ok(())
    }
}

/*!
# Force-directed layout algorithms

Симуляция Fruchterman-Reingold с учетом весов ребер, гравитацией к началу
координат и множителем скорости.

## Архитектура

```text
┌─────────────────┐    ┌─────────────────┐    ┌─────────────────┐
│ Graph snapshot  │───▶│ Initial         │───▶│ Force           │
│ (dense indices) │    │ placement       │    │ simulation      │
└─────────────────┘    └─────────────────┘    └─────────────────┘
                                                  │         ▲
                                                  ▼         │
┌─────────────────┐    ┌─────────────────┐    ┌─────────────────┐
│ PositionMapping │◀───│ Result          │    │ Cooling         │
│ (id -> x, y)    │    │ projector       │    │ scheduler       │
└─────────────────┘    └─────────────────┘    └─────────────────┘
```

Весь модуль работает с плотными индексами узлов; идентификаторы возвращаются
только в [`crate::snapshot`].
*/

pub mod cooling;
pub mod fruchterman_reingold;
pub mod initial_placement;
pub mod parallel_processing;

pub use cooling::CoolingScheduler;
pub use fruchterman_reingold::{ForceSimulation, SimulationState};
pub use initial_placement::InitialPlacement;
pub use parallel_processing::ParallelForceProcessor;

use crate::error::{LayoutError, Result};
use serde::{Deserialize, Serialize};

/// Размер рамки, в которой остаются позиции
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FrameSize {
    /// `width = length = n`, площадь растет с числом узлов
    ScaleWithNodes,
    Fixed { width: f64, length: f64 },
}

impl FrameSize {
    /// Рамка 1 x 1 с центром в начале координат
    pub const UNIT: FrameSize = FrameSize::Fixed {
        width: 1.0,
        length: 1.0,
    };

    pub fn resolve(&self, node_count: usize) -> Frame {
        match *self {
            FrameSize::ScaleWithNodes => Frame {
                width: node_count as f64,
                length: node_count as f64,
            },
            FrameSize::Fixed { width, length } => Frame { width, length },
        }
    }
}

impl Default for FrameSize {
    fn default() -> Self {
        FrameSize::ScaleWithNodes
    }
}

/// Вычисленная рамка `[-width/2, width/2] x [-length/2, length/2]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub width: f64,
    pub length: f64,
}

impl Frame {
    pub fn half_width(&self) -> f64 {
        self.width / 2.0
    }

    pub fn half_length(&self) -> f64 {
        self.length / 2.0
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x.abs() <= self.half_width() && y.abs() <= self.half_length()
    }

    pub fn clamp(&self, x: f64, y: f64) -> (f64, f64) {
        (
            x.clamp(-self.half_width(), self.half_width()),
            y.clamp(-self.half_length(), self.half_length()),
        )
    }

    pub fn initial_temperature(&self) -> f64 {
        self.width / 10.0
    }
}

/// Параметры запуска симуляции. Отсутствующие поля берут значения по умолчанию.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimulationOptions {
    pub iterations: usize,

    /// Показатель степени для весов ребер в притяжении
    pub edge_weight_influence: f64,

    /// Множитель смещения и ограничения температуры
    pub speed: f64,

    /// Притяжение к началу координат
    pub gravity: f64,

    /// Масштаб характерного расстояния `k`
    #[serde(rename = "C")]
    pub repulsion_constant: f64,

    pub frame: FrameSize,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            iterations: 10,
            edge_weight_influence: 1.0,
            speed: 1.0,
            gravity: 10.0,
            repulsion_constant: 1.0,
            frame: FrameSize::default(),
        }
    }
}

impl SimulationOptions {
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_gravity(mut self, gravity: f64) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_edge_weight_influence(mut self, influence: f64) -> Self {
        self.edge_weight_influence = influence;
        self
    }

    pub fn with_repulsion_constant(mut self, c: f64) -> Self {
        self.repulsion_constant = c;
        self
    }

    pub fn with_frame(mut self, frame: FrameSize) -> Self {
        self.frame = frame;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.repulsion_constant.is_finite() && self.repulsion_constant > 0.0) {
            return Err(LayoutError::invalid_input(format!(
                "C must be a positive finite number, got {}",
                self.repulsion_constant
            )));
        }
        if !(self.speed.is_finite() && self.speed >= 0.0) {
            return Err(LayoutError::invalid_input(format!(
                "speed must be a non-negative finite number, got {}",
                self.speed
            )));
        }
        if !self.gravity.is_finite() {
            return Err(LayoutError::invalid_input(format!(
                "gravity must be finite, got {}",
                self.gravity
            )));
        }
        if !self.edge_weight_influence.is_finite() {
            return Err(LayoutError::invalid_input(format!(
                "edgeWeightInfluence must be finite, got {}",
                self.edge_weight_influence
            )));
        }
        if let FrameSize::Fixed { width, length } = self.frame {
            if !(width.is_finite() && width > 0.0 && length.is_finite() && length > 0.0) {
                return Err(LayoutError::invalid_input(format!(
                    "frame dimensions must be positive and finite, got {width} x {length}"
                )));
            }
        }
        Ok(())
    }
}

/// Ребро между плотными индексами, вес уже подставлен
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexedEdge {
    pub source: usize,
    pub target: usize,
    pub weight: f64,
}

/// Проверенный вход ядра: число узлов, ребра и параметры
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationInput {
    node_count: usize,
    edges: Vec<IndexedEdge>,
    options: SimulationOptions,
}

impl SimulationInput {
    pub fn new(node_count: usize, edges: Vec<IndexedEdge>, options: SimulationOptions) -> Result<Self> {
        options.validate()?;

        for (idx, edge) in edges.iter().enumerate() {
            if edge.source >= node_count || edge.target >= node_count {
                return Err(LayoutError::invalid_input(format!(
                    "edge #{idx} ({} -> {}) is out of range for {node_count} nodes",
                    edge.source, edge.target
                )));
            }
            if !(edge.weight.is_finite() && edge.weight > 0.0) {
                return Err(LayoutError::invalid_input(format!(
                    "edge #{idx} has weight {}, expected a positive finite number",
                    edge.weight
                )));
            }
        }

        Ok(Self {
            node_count,
            edges,
            options,
        })
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn edges(&self) -> &[IndexedEdge] {
        &self.edges
    }

    pub fn options(&self) -> &SimulationOptions {
        &self.options
    }

    pub fn frame(&self) -> Frame {
        self.options.frame.resolve(self.node_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let options = SimulationOptions::default();
        assert_eq!(options.iterations, 10);
        assert_eq!(options.edge_weight_influence, 1.0);
        assert_eq!(options.speed, 1.0);
        assert_eq!(options.gravity, 10.0);
        assert_eq!(options.repulsion_constant, 1.0);
        assert_eq!(options.frame, FrameSize::ScaleWithNodes);
    }

    #[test]
    fn partial_options_fill_in_defaults() {
        let options: SimulationOptions =
            serde_json::from_str(r#"{"iterations": 3, "C": 2.0}"#).unwrap();
        assert_eq!(options.iterations, 3);
        assert_eq!(options.repulsion_constant, 2.0);
        assert_eq!(options.gravity, 10.0);

        let fixed: SimulationOptions =
            serde_json::from_str(r#"{"frame": {"kind": "fixed", "width": 1.0, "length": 1.0}}"#).unwrap();
        assert_eq!(fixed.frame, FrameSize::UNIT);
    }

    #[test]
    fn invalid_options_are_rejected() {
        let base = SimulationOptions::default();
        assert!(base.clone().with_repulsion_constant(0.0).validate().is_err());
        assert!(base.clone().with_speed(f64::NAN).validate().is_err());
        assert!(base.clone().with_gravity(f64::INFINITY).validate().is_err());
        assert!(base
            .clone()
            .with_frame(FrameSize::Fixed { width: -1.0, length: 1.0 })
            .validate()
            .is_err());
        assert!(base.with_gravity(0.0).with_speed(0.0).validate().is_ok());
    }

    #[test]
    fn frame_scales_with_node_count() {
        let frame = FrameSize::ScaleWithNodes.resolve(4);
        assert_eq!(frame.half_width(), 2.0);
        assert_eq!(frame.initial_temperature(), 0.4);
        assert!(frame.contains(-2.0, 2.0));
        assert!(!frame.contains(2.01, 0.0));
        assert_eq!(frame.clamp(5.0, -5.0), (2.0, -2.0));
    }

    #[test]
    fn input_rejects_dangling_indices_and_bad_weights() {
        let options = SimulationOptions::default();
        let dangling = vec![IndexedEdge { source: 0, target: 2, weight: 1.0 }];
        assert!(SimulationInput::new(2, dangling, options.clone()).is_err());

        let zero = vec![IndexedEdge { source: 0, target: 1, weight: 0.0 }];
        assert!(SimulationInput::new(2, zero, options.clone()).is_err());

        let self_loop = vec![IndexedEdge { source: 1, target: 1, weight: 1.0 }];
        assert!(SimulationInput::new(2, self_loop, options).is_ok());
    }
}

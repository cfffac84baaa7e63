/*!
# Offloaded worker protocol

Сообщения между хостом и изолированным рабочим потоком. Каждое сообщение
сериализуется через serde в JSON вида:

```text
host   -> worker  {"action": "DATA", "data": {"nodeCount", "edges", "initialPositions", "options"}}
worker -> host    {"type": "RUNNING"}
                  {"type": "DATA", "data": {"positions": [x0, y0, x1, y1, ...], "i": 0}}
                  {"type": "FINISHED", "data": [x0, y0, ...]}
                  {"type": "ERROR", "data": "description"}
```

Буферы позиций плоские, построчные; каждое сообщение владеет своей копией.
*/

use crate::algorithms::{IndexedEdge, SimulationInput, SimulationOptions};
use crate::error::{LayoutError, Result};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// Тело стартового сообщения
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationPayload {
    pub node_count: usize,
    pub edges: Vec<IndexedEdge>,
    pub initial_positions: Vec<f64>,
    pub options: SimulationOptions,
}

impl SimulationPayload {
    /// Копирует `input` и `initial` в самодостаточный payload
    pub fn new(input: &SimulationInput, initial: ArrayView2<'_, f64>) -> Self {
        Self {
            node_count: input.node_count(),
            edges: input.edges().to_vec(),
            initial_positions: flatten(initial),
            options: input.options().clone(),
        }
    }

    /// Повторная проверка payload на принимающей стороне
    pub fn into_parts(self) -> Result<(SimulationInput, Array2<f64>)> {
        let initial = unflatten(self.initial_positions, self.node_count)?;
        let input = SimulationInput::new(self.node_count, self.edges, self.options)?;
        Ok((input, initial))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    Data(SimulationPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// Рабочий поток принял стартовое сообщение
    Running,

    /// Позиции после итерации `iteration` (с нуля)
    Data {
        positions: Vec<f64>,
        #[serde(rename = "i")]
        iteration: usize,
    },

    Finished(Vec<f64>),

    Error(String),
}

impl WorkerMessage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerMessage::Finished(_) | WorkerMessage::Error(_))
    }
}

/// Построчная копия буфера `(n, 2)`
pub fn flatten(positions: ArrayView2<'_, f64>) -> Vec<f64> {
    positions.iter().copied().collect()
}

pub fn unflatten(flat: Vec<f64>, node_count: usize) -> Result<Array2<f64>> {
    let len = flat.len();
    Array2::from_shape_vec((node_count, 2), flat).map_err(|_| {
        LayoutError::invalid_input(format!(
            "position buffer holds {len} values, expected {} for {node_count} nodes",
            node_count * 2
        ))
    })
}

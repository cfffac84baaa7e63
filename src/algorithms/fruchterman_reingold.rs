/*!
# Fruchterman-Reingold force simulation

Одна итерация, по порядку:

1. **Repulsion**: каждая упорядоченная пара `(v, u)`, `v != u`, отталкивает `v`
   от `u` на `k² / d`
2. **Attraction**: каждое ребро стягивает концы на
   `d² / k · weight^edgeWeightInfluence`
3. **Gravity**: каждый узел тянется к началу координат на
   `0.01 · k · gravity · |pos|`
4. **Move**: смещение умножается на `speed`, ограничивается
   `temperature · speed`, результат зажимается в рамку
5. **Cool**: `temperature ← temperature / (iterations + 1)`

где `k = C · sqrt(width · length / n)`.

Совпадающие узлы не действуют друг на друга, узел в начале координат не
чувствует гравитации, узел с неконечным смещением остается на месте.
*/

use super::{CoolingScheduler, Frame, ParallelForceProcessor, SimulationInput};
use crate::error::{LayoutError, Result};
use ndarray::{Array2, ArrayView2};
use tracing::{debug, trace};

/// Доля `k`, применяемая как гравитация на единицу расстояния до начала координат
const GRAVITY_SCALE: f64 = 0.01;

/// Изменяемое состояние одного запуска. Принадлежит запуску, не разделяется.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationState {
    positions: Array2<f64>,
    temperature: f64,
    iteration: usize,
}

impl SimulationState {
    pub fn positions(&self) -> ArrayView2<'_, f64> {
        self.positions.view()
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Завершенные итерации
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn into_positions(self) -> Array2<f64> {
        self.positions
    }
}

/// Силовая симуляция над проверенным [`SimulationInput`]
pub struct ForceSimulation<'a> {
    input: &'a SimulationInput,
    frame: Frame,
    k: f64,
    edge_scales: Vec<f64>,
    cooling: CoolingScheduler,
    parallel: Option<&'a ParallelForceProcessor>,
}

impl<'a> ForceSimulation<'a> {
    pub fn new(input: &'a SimulationInput) -> Self {
        let options = input.options();
        let node_count = input.node_count();
        let frame = input.frame();

        let k = if node_count == 0 {
            0.0
        } else {
            options.repulsion_constant * (frame.width * frame.length / node_count as f64).sqrt()
        };

        // Веса положительны, степень конечна при любом конечном показателе
        let edge_scales = input
            .edges()
            .iter()
            .map(|edge| edge.weight.powf(options.edge_weight_influence))
            .collect();

        Self {
            input,
            frame,
            k,
            edge_scales,
            cooling: CoolingScheduler::new(frame.initial_temperature(), options.iterations),
            parallel: None,
        }
    }

    /// Проход отталкивания на `processor`, если граф достаточно велик
    pub fn with_parallelism(mut self, processor: &'a ParallelForceProcessor) -> Self {
        self.parallel = Some(processor);
        self
    }

    pub fn frame(&self) -> Frame {
        self.frame
    }

    pub fn cooling(&self) -> &CoolingScheduler {
        &self.cooling
    }

    /// Оборачивает стартовые координаты в новое состояние.
    ///
    /// Буфер должен быть `(n, 2)`, конечным и внутри рамки.
    pub fn initial_state(&self, positions: Array2<f64>) -> Result<SimulationState> {
        let expected = (self.input.node_count(), 2);
        if positions.dim() != expected {
            return Err(LayoutError::invalid_input(format!(
                "initial positions have shape {:?}, expected {:?}",
                positions.dim(),
                expected
            )));
        }

        for (idx, row) in positions.rows().into_iter().enumerate() {
            let (x, y) = (row[0], row[1]);
            if !(x.is_finite() && y.is_finite()) {
                return Err(LayoutError::invalid_input(format!(
                    "initial position of node #{idx} is not finite: ({x}, {y})"
                )));
            }
            if !self.frame.contains(x, y) {
                return Err(LayoutError::invalid_input(format!(
                    "initial position of node #{idx} ({x}, {y}) is outside the {} x {} frame",
                    self.frame.width, self.frame.length
                )));
            }
        }

        Ok(SimulationState {
            positions,
            temperature: self.cooling.initial(),
            iteration: 0,
        })
    }

    /// Выполняет все итерации и после каждой вызывает `observer` с
    /// представлением позиций только для чтения и номером итерации (с нуля).
    pub fn run<F>(&self, mut state: SimulationState, mut observer: F) -> Array2<f64>
    where
        F: FnMut(ArrayView2<'_, f64>, usize),
    {
        let iterations = self.input.options().iterations;
        debug!(
            "🚀 Запуск симуляции: {} узлов, {} ребер, {} итераций, k = {:.4}, t0 = {:.4}",
            self.input.node_count(),
            self.input.edges().len(),
            iterations,
            self.k,
            state.temperature
        );

        for index in 0..iterations {
            self.step(&mut state);
            observer(state.positions.view(), index);
        }

        state.into_positions()
    }

    /// Продвигает `state` на одну итерацию
    pub fn step(&self, state: &mut SimulationState) {
        let node_count = state.positions.nrows();
        let mut displacement = Array2::<f64>::zeros((node_count, 2));
        let k_squared = self.k * self.k;

        match self.parallel {
            Some(processor) if processor.should_parallelize(node_count) => {
                processor.accumulate_repulsion(state.positions.view(), k_squared, &mut displacement);
            }
            _ => {
                for v in 0..node_count {
                    let (dx, dy) = repulsion_on(state.positions.view(), v, k_squared);
                    displacement[[v, 0]] += dx;
                    displacement[[v, 1]] += dy;
                }
            }
        }

        self.accumulate_attraction(state.positions.view(), &mut displacement);
        self.apply_displacement(state, &displacement);

        trace!(
            "Итерация {} завершена при температуре {:.6}",
            state.iteration,
            state.temperature
        );
        state.temperature = self.cooling.next(state.temperature);
        state.iteration += 1;
    }

    fn accumulate_attraction(&self, positions: ArrayView2<'_, f64>, displacement: &mut Array2<f64>) {
        for (edge, scale) in self.input.edges().iter().zip(&self.edge_scales) {
            let (s, t) = (edge.source, edge.target);
            let dx = positions[[s, 0]] - positions[[t, 0]];
            let dy = positions[[s, 1]] - positions[[t, 1]];
            let delta = (dx * dx + dy * dy).sqrt();
            if delta == 0.0 {
                continue;
            }

            let force = delta * delta / self.k;
            let fx = (dx / delta) * force * scale;
            let fy = (dy / delta) * force * scale;
            displacement[[s, 0]] -= fx;
            displacement[[s, 1]] -= fy;
            displacement[[t, 0]] += fx;
            displacement[[t, 1]] += fy;
        }
    }

    fn apply_displacement(&self, state: &mut SimulationState, displacement: &Array2<f64>) {
        let options = self.input.options();
        let (gravity, speed) = (options.gravity, options.speed);
        let cap = state.temperature * speed;

        for v in 0..state.positions.nrows() {
            let (x, y) = (state.positions[[v, 0]], state.positions[[v, 1]]);
            let (mut dx, mut dy) = (displacement[[v, 0]], displacement[[v, 1]]);

            let radius = (x * x + y * y).sqrt();
            if radius != 0.0 {
                let pull = GRAVITY_SCALE * self.k * gravity * radius;
                dx -= (x / radius) * pull;
                dy -= (y / radius) * pull;
            }

            dx *= speed;
            dy *= speed;

            let delta = (dx * dx + dy * dy).sqrt();
            if delta == 0.0 || !delta.is_finite() {
                continue;
            }

            let limited = delta.min(cap);
            let (nx, ny) = self
                .frame
                .clamp(x + (dx / delta) * limited, y + (dy / delta) * limited);
            state.positions[[v, 0]] = nx;
            state.positions[[v, 1]] = ny;
        }
    }
}

/// Отталкивание узла `v` от всех остальных, суммируется по порядку индексов
pub(crate) fn repulsion_on(positions: ArrayView2<'_, f64>, v: usize, k_squared: f64) -> (f64, f64) {
    let (vx, vy) = (positions[[v, 0]], positions[[v, 1]]);
    let (mut sum_x, mut sum_y) = (0.0, 0.0);

    for u in 0..positions.nrows() {
        if u == v {
            continue;
        }
        let dx = vx - positions[[u, 0]];
        let dy = vy - positions[[u, 1]];
        let delta = (dx * dx + dy * dy).sqrt();
        if delta != 0.0 {
            let force = k_squared / delta;
            sum_x += (dx / delta) * force;
            sum_y += (dy / delta) * force;
        }
    }

    (sum_x, sum_y)
}

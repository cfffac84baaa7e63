/*!
# Initial placement

Стартовые координаты запуска. Координаты вызывающего используются, если у
каждого узла есть конечная пара; иначе все узлы равномерно разбрасываются во
внутренней половине рамки.
*/

use super::Frame;
use crate::data_structures::Position;
use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct InitialPlacement {
    frame: Frame,
    seed: Option<u64>,
}

impl InitialPlacement {
    pub fn new(frame: Frame) -> Self {
        Self { frame, seed: None }
    }

    /// Фиксирует случайную расстановку; `None` берет энтропию
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Плотный буфер `(n, 2)`, по строке на узел, все строки конечны и в рамке
    pub fn place(&self, existing: &[Option<Position>]) -> Array2<f64> {
        let complete = existing
            .iter()
            .all(|position| position.map_or(false, |p| p.is_finite()));

        if complete {
            debug!("📍 Используем координаты вызывающего для {} узлов", existing.len());
            let mut positions = Array2::zeros((existing.len(), 2));
            for (idx, position) in existing.iter().flatten().enumerate() {
                let (x, y) = self.frame.clamp(position.x, position.y);
                positions[[idx, 0]] = x;
                positions[[idx, 1]] = y;
            }
            positions
        } else {
            debug!(
                "🎲 Координаты есть не у всех {} узлов, случайная расстановка (seed: {:?})",
                existing.len(),
                self.seed
            );
            self.random(existing.len())
        }
    }

    /// Равномерные координаты в `[-width/4, width/4) x [-length/4, length/4)`
    pub fn random(&self, node_count: usize) -> Array2<f64> {
        let mut rng = match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let (width, length) = (self.frame.width, self.frame.length);

        Array2::from_shape_fn((node_count, 2), |(_, axis)| {
            let extent = if axis == 0 { width } else { length };
            (rng.gen::<f64>() * extent - extent / 2.0) / 2.0
        })
    }
}

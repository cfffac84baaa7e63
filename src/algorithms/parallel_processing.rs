/*!
# Parallel repulsion pass

Попарное отталкивание занимает `O(n^2)` и доминирует в итерации. Процессор
делит его на отдельном пуле Rayon:

- **Per-node ownership**: каждый поток пишет только строку смещения своего
  узла, блокировки не нужны
- **Fixed summation order**: внутренний цикл обходит узлы по индексу,
  результат побитово совпадает с последовательным проходом
- **Adaptive parallelism** в зависимости от размера графа

*/

use super::fruchterman_reingold::repulsion_on;
use crate::error::{LayoutError, Result};
use ndarray::{Array2, ArrayView2, Zip};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Параллельный процессор отталкивания со своим пулом потоков
#[derive(Debug)]
pub struct ParallelForceProcessor {
    pool: rayon::ThreadPool,

    /// Количество рабочих потоков
    worker_count: usize,

    /// Минимальное число узлов для параллельного пути
    threshold: usize,

    /// Выполнено параллельных проходов
    passes: AtomicUsize,
}

impl ParallelForceProcessor {
    pub fn new(worker_count: usize, threshold: usize) -> Result<Self> {
        let worker_count = worker_count.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_count)
            .thread_name(|idx| format!("force-layout-rayon-{idx}"))
            .build()
            .map_err(|e| LayoutError::configuration(format!("failed to build thread pool: {e}")))?;

        Ok(Self {
            pool,
            worker_count,
            threshold,
            passes: AtomicUsize::new(0),
        })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn should_parallelize(&self, node_count: usize) -> bool {
        self.worker_count > 1 && node_count >= self.threshold
    }

    /// Добавляет отталкивание каждого узла в его строку `displacement`
    pub fn accumulate_repulsion(
        &self,
        positions: ArrayView2<'_, f64>,
        k_squared: f64,
        displacement: &mut Array2<f64>,
    ) {
        self.pool.install(|| {
            Zip::indexed(displacement.rows_mut()).par_for_each(|v, mut row| {
                let (dx, dy) = repulsion_on(positions, v, k_squared);
                row[0] += dx;
                row[1] += dy;
            });
        });
        self.passes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn parallel_passes(&self) -> usize {
        self.passes.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_gates_parallel_path() -> Result<()> {
        let processor = ParallelForceProcessor::new(4, 100)?;
        assert!(!processor.should_parallelize(99));
        assert!(processor.should_parallelize(100));

        let single = ParallelForceProcessor::new(1, 0)?;
        assert!(!single.should_parallelize(1_000));
        Ok(())
    }

    #[test]
    fn parallel_repulsion_matches_sequential() -> Result<()> {
        let processor = ParallelForceProcessor::new(4, 0)?;
        let positions = Array2::from_shape_fn((64, 2), |(i, axis)| {
            ((i * 37 + axis * 11) % 29) as f64 * 0.5 - 7.0
        });

        let mut parallel = Array2::zeros((64, 2));
        processor.accumulate_repulsion(positions.view(), 2.0, &mut parallel);

        for v in 0..64 {
            let (dx, dy) = repulsion_on(positions.view(), v, 2.0);
            assert_eq!(parallel[[v, 0]], dx);
            assert_eq!(parallel[[v, 1]], dy);
        }
        assert_eq!(processor.parallel_passes(), 1);
        Ok(())
    }
}

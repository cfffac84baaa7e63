/*!
# Force layout engine

Точка входа, связывающая этапы для одного графа:

1. **Snapshot**: id, ребра и координаты копируются из провайдера и проверяются
2. **Placement**: координаты вызывающего или случайный старт
3. **Simulation**: на прямом хосте или в изолированном рабочем потоке
4. **Projection**: плотный результат становится [`PositionMapping`] или
   записывается обратно в провайдер

Каждый запуск владеет своим состоянием, один движок обслуживает параллельные запуски.
*/

use crate::algorithms::{InitialPlacement, ParallelForceProcessor, SimulationInput, SimulationOptions};
use crate::config::Config;
use crate::data_structures::GraphDataProvider;
use crate::error::Result;
use crate::host::{DirectHost, ExecutionHost, OffloadedHost, OffloadedRun};
use crate::metrics::{MetricsCollector, RunTimer};
use crate::snapshot::{GraphSnapshot, PositionMapping, PositionsView, ResultProjector};
use ndarray::Array2;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Подготовленный запуск: проверенный вход, стартовый буфер и обратная проекция на id
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub input: SimulationInput,
    pub initial: Array2<f64>,
    pub projector: ResultProjector,
}

/// Движок укладки Fruchterman-Reingold
#[derive(Debug, Clone, Default)]
pub struct ForceLayoutEngine {
    options: SimulationOptions,
    seed: Option<u64>,
    parallel: Option<Arc<ParallelForceProcessor>>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl ForceLayoutEngine {
    pub fn new(options: SimulationOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            ..Self::default()
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let engine = Self::new(config.simulation.options())?
            .with_seed(config.simulation.seed)
            .with_parallelism(config.execution.parallel_processor()?);
        Ok(engine)
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_parallelism(mut self, processor: Option<Arc<ParallelForceProcessor>>) -> Self {
        self.parallel = processor;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn options(&self) -> &SimulationOptions {
        &self.options
    }

    pub fn direct_host(&self) -> DirectHost {
        DirectHost::new().with_parallelism(self.parallel.clone())
    }

    pub fn offloaded_host(&self) -> OffloadedHost {
        OffloadedHost::new().with_parallelism(self.parallel.clone())
    }

    /// Снимок, проверка и начальная расстановка до создания состояния
    pub fn prepare<G: GraphDataProvider + ?Sized>(&self, graph: &G) -> Result<PreparedRun> {
        let snapshot = GraphSnapshot::extract(graph)?;
        let input = snapshot.to_input(self.options.clone())?;
        let initial = InitialPlacement::new(input.frame())
            .with_seed(self.seed)
            .place(snapshot.existing_positions());

        Ok(PreparedRun {
            input,
            initial,
            projector: snapshot.projector(),
        })
    }

    /// Укладывает `graph` в контексте вызывающего
    #[instrument(skip_all)]
    pub fn layout<G: GraphDataProvider + ?Sized>(&self, graph: &G) -> Result<PositionMapping> {
        self.layout_with_observer(graph, |_, _| {})
    }

    /// Как [`Self::layout`], с вызовом `observer` после каждой итерации
    pub fn layout_with_observer<G, F>(&self, graph: &G, mut observer: F) -> Result<PositionMapping>
    where
        G: GraphDataProvider + ?Sized,
        F: FnMut(&PositionsView<'_>, usize),
    {
        let run = self.prepare(graph)?;
        let timer = self.start_run("direct", &run.input);
        let projector = &run.projector;

        let result = self
            .direct_host()
            .run(&run.input, run.initial, |coords, iteration| {
                observer(&projector.view(coords.reborrow()), iteration)
            });
        self.finish_run(timer, run.input.options().iterations, &result);

        projector.project(result?)
    }

    /// Укладывает `graph` и записывает в него итоговые `x`/`y`
    #[instrument(skip_all)]
    pub fn assign<G: GraphDataProvider + ?Sized>(&self, graph: &mut G) -> Result<PositionMapping> {
        let mapping = self.layout(&*graph)?;
        graph.update_node_positions(&mapping.view())?;
        Ok(mapping)
    }

    /// Запускает вынесенный запуск и возвращает его дескриптор вместе с
    /// проектором результатов.
    pub fn spawn_offloaded<G: GraphDataProvider + ?Sized>(&self, graph: &G) -> Result<(OffloadedRun, ResultProjector)> {
        let run = self.prepare(graph)?;
        let handle = self.offloaded_host().dispatch(&run.input, run.initial.view())?;
        info!(
            "🚀 Offloaded run {} started: {} nodes, {} edges",
            handle.id(),
            run.input.node_count(),
            run.input.edges().len()
        );
        Ok((handle, run.projector))
    }

    /// Укладывает `graph` в изолированном рабочем потоке
    #[instrument(skip_all)]
    pub async fn layout_offloaded<G: GraphDataProvider + ?Sized>(&self, graph: &G) -> Result<PositionMapping> {
        let run = self.prepare(graph)?;
        self.execute(&self.offloaded_host(), run, |_, _| {}).await
    }

    /// Укладывает `graph` в изолированном рабочем потоке, записывая в него
    /// каждый снимок прогресса и итоговые позиции.
    #[instrument(skip_all)]
    pub async fn assign_offloaded<G: GraphDataProvider + ?Sized>(&self, graph: &mut G) -> Result<PositionMapping> {
        let PreparedRun {
            input,
            initial,
            projector,
        } = self.prepare(&*graph)?;
        let timer = self.start_run("offloaded", &input);

        let outcome = match self.offloaded_host().dispatch(&input, initial.view()) {
            Ok(handle) => {
                let mut write_error = None;
                let result = handle
                    .wait(|coords, _| {
                        if write_error.is_none() {
                            write_error = projector.assign(graph, coords).err();
                        }
                    })
                    .await;
                match (result, write_error) {
                    (Ok(coords), None) => projector.assign(graph, coords.view()).map(|_| coords),
                    (Ok(_), Some(e)) | (Err(e), _) => Err(e),
                }
            }
            Err(e) => Err(e),
        };

        self.finish_run(timer, input.options().iterations, &outcome);
        projector.project(outcome?)
    }

    /// Укладывает `graph` на любом хосте выполнения
    pub async fn layout_on<G, F>(&self, host: &dyn ExecutionHost, graph: &G, observer: F) -> Result<PositionMapping>
    where
        G: GraphDataProvider + ?Sized,
        F: FnMut(&PositionsView<'_>, usize) + Send,
    {
        let run = self.prepare(graph)?;
        self.execute(host, run, observer).await
    }

    async fn execute<F>(&self, host: &dyn ExecutionHost, run: PreparedRun, mut observer: F) -> Result<PositionMapping>
    where
        F: FnMut(&PositionsView<'_>, usize) + Send,
    {
        let PreparedRun {
            input,
            initial,
            projector,
        } = run;
        let iterations = input.options().iterations;
        let timer = self.start_run(host.name(), &input);

        let result = host
            .execute(input, initial, &mut |coords, iteration| {
                observer(&projector.view(coords.reborrow()), iteration)
            })
            .await;
        self.finish_run(timer, iterations, &result);

        projector.project(result?)
    }

    fn start_run(&self, host: &'static str, input: &SimulationInput) -> Option<RunTimer> {
        info!(
            "🧮 Укладка на хосте {}: {} узлов, {} ребер, {} итераций",
            host,
            input.node_count(),
            input.edges().len(),
            input.options().iterations
        );
        self.metrics
            .as_ref()
            .map(|metrics| metrics.run_started(host, input.node_count(), input.edges().len()))
    }

    fn finish_run<T>(&self, timer: Option<RunTimer>, iterations: usize, result: &Result<T>) {
        match result {
            Ok(_) => info!("✅ Укладка завершена"),
            Err(e) => error!("❌ Ошибка укладки: {}", e),
        }

        if let (Some(metrics), Some(timer)) = (&self.metrics, timer) {
            match result {
                Ok(_) => metrics.run_succeeded(timer, iterations),
                Err(_) => metrics.run_failed(timer),
            }
        }
    }
}

/*!
# Execution hosts

Где выполняется симуляция:

- **DirectHost**: в контексте вызывающего; прогресс приходит синхронно, вызывающий
  заблокирован до конца запуска
- **OffloadedHost**: в изолированном рабочем потоке; прогресс приходит
  сообщениями, вызывающий ждет только терминального

Оба хоста получают одинаковый подготовленный вход и стартовые позиции и дают
одинаковый результат.
*/

use crate::algorithms::{ForceSimulation, ParallelForceProcessor, SimulationInput};
use crate::error::{LayoutError, Result};
use crate::worker::protocol::unflatten;
use crate::worker::{spawn_worker, ClientMessage, SimulationPayload, WorkerMessage};
use async_trait::async_trait;
use ndarray::{Array2, ArrayView2};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, warn};
use uuid::Uuid;

/// Обратный вызов прогресса: позиции после итерации и ее номер (с нуля)
pub type ProgressFn<'a> = dyn FnMut(ArrayView2<'_, f64>, usize) + Send + 'a;

#[async_trait]
pub trait ExecutionHost: Send + Sync {
    fn name(&self) -> &'static str;

    /// Выполняет все итерации `input` от `initial` и возвращает итоговые
    /// позиции.
    async fn execute(
        &self,
        input: SimulationInput,
        initial: Array2<f64>,
        progress: &mut ProgressFn<'_>,
    ) -> Result<Array2<f64>>;
}

/// Синхронный запуск ядра в контексте вызывающего
#[derive(Debug, Clone, Default)]
pub struct DirectHost {
    parallel: Option<Arc<ParallelForceProcessor>>,
}

impl DirectHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parallelism(mut self, processor: Option<Arc<ParallelForceProcessor>>) -> Self {
        self.parallel = processor;
        self
    }

    pub fn run<F>(&self, input: &SimulationInput, initial: Array2<f64>, observer: F) -> Result<Array2<f64>>
    where
        F: FnMut(ArrayView2<'_, f64>, usize),
    {
        let mut simulation = ForceSimulation::new(input);
        if let Some(processor) = self.parallel.as_deref() {
            simulation = simulation.with_parallelism(processor);
        }
        let state = simulation.initial_state(initial)?;
        Ok(simulation.run(state, observer))
    }
}

#[async_trait]
impl ExecutionHost for DirectHost {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn execute(
        &self,
        input: SimulationInput,
        initial: Array2<f64>,
        progress: &mut ProgressFn<'_>,
    ) -> Result<Array2<f64>> {
        self.run(&input, initial, |positions, iteration| progress(positions, iteration))
    }
}

/// Запуск ядра в отдельном рабочем потоке на каждый запуск
#[derive(Debug, Clone, Default)]
pub struct OffloadedHost {
    parallel: Option<Arc<ParallelForceProcessor>>,
}

impl OffloadedHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parallelism(mut self, processor: Option<Arc<ParallelForceProcessor>>) -> Self {
        self.parallel = processor;
        self
    }

    /// Копирует вход в стартовое сообщение и передает новому рабочему потоку
    pub fn dispatch(&self, input: &SimulationInput, initial: ArrayView2<'_, f64>) -> Result<OffloadedRun> {
        let expected = (input.node_count(), 2);
        if initial.dim() != expected {
            return Err(LayoutError::invalid_input(format!(
                "initial positions have shape {:?}, expected {:?}",
                initial.dim(),
                expected
            )));
        }

        let id = Uuid::new_v4();
        let channels = spawn_worker(id, self.parallel.clone())?;
        let payload = SimulationPayload::new(input, initial);
        channels
            .inbox
            .send(ClientMessage::Data(payload))
            .map_err(|_| LayoutError::worker("worker exited before receiving its input"))?;

        debug!(
            "📤 Вынесенный запуск {}: {} узлов, {} итераций",
            id,
            input.node_count(),
            input.options().iterations
        );

        Ok(OffloadedRun {
            id,
            node_count: input.node_count(),
            iterations: input.options().iterations,
            messages: channels.outbox,
            cancel: channels.cancel,
        })
    }
}

#[async_trait]
impl ExecutionHost for OffloadedHost {
    fn name(&self) -> &'static str {
        "offloaded"
    }

    async fn execute(
        &self,
        input: SimulationInput,
        initial: Array2<f64>,
        progress: &mut ProgressFn<'_>,
    ) -> Result<Array2<f64>> {
        let run = self.dispatch(&input, initial.view())?;
        drop(initial);
        run.wait(|positions, iteration| progress(positions, iteration)).await
    }
}

/// Дескриптор вызывающего для одного вынесенного запуска
#[derive(Debug)]
pub struct OffloadedRun {
    id: Uuid,
    node_count: usize,
    iterations: usize,
    messages: UnboundedReceiver<WorkerMessage>,
    cancel: Arc<AtomicBool>,
}

impl OffloadedRun {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Следующее сырое сообщение, `None` после ухода рабочего потока
    pub async fn next_message(&mut self) -> Option<WorkerMessage> {
        self.messages.recv().await
    }

    /// Сырые сообщения как поток. Удаление потока останавливает рабочий поток
    /// на следующем отчете.
    pub fn into_stream(self) -> UnboundedReceiverStream<WorkerMessage> {
        UnboundedReceiverStream::new(self.messages)
    }

    /// Ждет терминальное сообщение, передавая каждый снимок прогресса в
    /// `progress`. Порядок сообщений: RUNNING, DATA 0..iterations, FINISHED.
    pub async fn wait<F>(mut self, mut progress: F) -> Result<Array2<f64>>
    where
        F: FnMut(ArrayView2<'_, f64>, usize),
    {
        let mut running = false;
        let mut expected = 0;

        loop {
            let message = self.messages.recv().await.ok_or_else(|| {
                LayoutError::worker(format!(
                    "worker for run {} exited without a terminal message",
                    self.id
                ))
            })?;

            match message {
                WorkerMessage::Running if !running && expected == 0 => running = true,
                WorkerMessage::Running => {
                    return Err(self.protocol_error("duplicate RUNNING message"));
                }
                WorkerMessage::Data { .. } | WorkerMessage::Finished(_) if !running => {
                    return Err(self.protocol_error("progress before RUNNING"));
                }
                WorkerMessage::Data { positions, iteration } => {
                    if iteration != expected || expected >= self.iterations {
                        return Err(self.protocol_error(&format!(
                            "DATA for iteration {iteration} while expecting {expected}"
                        )));
                    }
                    let positions = self.decode(positions)?;
                    progress(positions.view(), iteration);
                    expected += 1;
                }
                WorkerMessage::Finished(positions) => {
                    if expected != self.iterations {
                        return Err(self.protocol_error(&format!(
                            "FINISHED after {expected} of {} iterations",
                            self.iterations
                        )));
                    }
                    debug!("✅ Запуск {} завершен", self.id);
                    return self.decode(positions);
                }
                WorkerMessage::Error(reason) => {
                    warn!("❌ Запуск {} упал в рабочем потоке: {}", self.id, reason);
                    return Err(LayoutError::worker(reason));
                }
            }
        }
    }

    /// Прекращает наблюдение за запуском. Рабочий поток бросает работу на
    /// границе следующей итерации.
    pub fn terminate(self) {
        self.cancel.store(true, Ordering::Relaxed);
        debug!("🛑 Запуск {} остановлен хостом", self.id);
    }

    fn decode(&self, positions: Vec<f64>) -> Result<Array2<f64>> {
        unflatten(positions, self.node_count).map_err(|e| LayoutError::worker(e.to_string()))
    }

    fn protocol_error(&self, detail: &str) -> LayoutError {
        LayoutError::worker(format!("run {}: out-of-order message: {detail}", self.id))
    }
}

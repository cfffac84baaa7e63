/*!
# Isolated layout worker

Каждый вынесенный запуск получает свой поток ОС. Поток владеет копией входа,
принимает ровно одно стартовое сообщение, сообщает прогресс и завершается.

```text
        host                                  worker thread
 ┌──────────────────┐   ClientMessage   ┌──────────────────────┐
 │ OffloadedHost    │──────────────────▶│ decode + validate    │
 │                  │                   │ RUNNING              │
 │ OffloadedRun     │◀──────────────────│ DATA x iterations    │
 │ (ordering check) │   WorkerMessage   │ FINISHED | ERROR     │
 └──────────────────┘                   └──────────────────────┘
```

Паника внутри ядра перехватывается и отправляется как ERROR: хост не ждет
мертвый рабочий поток.
*/

pub mod protocol;

pub use protocol::{ClientMessage, SimulationPayload, WorkerMessage};

use crate::algorithms::{ForceSimulation, ParallelForceProcessor};
use crate::error::{LayoutError, Result};
use protocol::flatten;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Концы каналов нового рабочего потока на стороне хоста
#[derive(Debug)]
pub struct WorkerChannels {
    pub inbox: UnboundedSender<ClientMessage>,
    pub outbox: UnboundedReceiver<WorkerMessage>,
    /// Хост выставляет флаг, чтобы остановить поток между итерациями
    pub cancel: Arc<AtomicBool>,
}

/// Запускает рабочий поток `force-layout-worker-<id>`
pub fn spawn_worker(id: Uuid, parallel: Option<Arc<ParallelForceProcessor>>) -> Result<WorkerChannels> {
    let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
    let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
    let cancel = Arc::new(AtomicBool::new(false));
    let worker_cancel = Arc::clone(&cancel);

    thread::Builder::new()
        .name(format!("force-layout-worker-{id}"))
        .spawn(move || worker_main(id, inbox_rx, outbox_tx, worker_cancel, parallel))
        .map_err(|e| LayoutError::worker(format!("failed to spawn worker thread: {e}")))?;

    debug!("🧵 Рабочий поток {} запущен", id);
    Ok(WorkerChannels {
        inbox: inbox_tx,
        outbox: outbox_rx,
        cancel,
    })
}

fn worker_main(
    id: Uuid,
    mut inbox: UnboundedReceiver<ClientMessage>,
    outbox: UnboundedSender<WorkerMessage>,
    cancel: Arc<AtomicBool>,
    parallel: Option<Arc<ParallelForceProcessor>>,
) {
    let Some(ClientMessage::Data(payload)) = inbox.blocking_recv() else {
        debug!("Рабочий поток {} закрыт до стартового сообщения", id);
        return;
    };

    if outbox.send(WorkerMessage::Running).is_err() {
        return;
    }

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        simulate(payload, &outbox, &cancel, parallel.as_deref())
    }));

    let terminal = match outcome {
        Ok(Ok(Some(positions))) => WorkerMessage::Finished(positions),
        Ok(Ok(None)) => {
            debug!("Рабочий поток {} остановлен досрочно, хост больше не слушает", id);
            return;
        }
        Ok(Err(e)) => {
            warn!("⚠️ Рабочий поток {} отклонил вход: {}", id, e);
            WorkerMessage::Error(e.to_string())
        }
        Err(payload) => {
            let reason = panic_reason(payload.as_ref());
            error!("💥 Паника в рабочем потоке {}: {}", id, reason);
            WorkerMessage::Error(format!("worker panicked: {reason}"))
        }
    };

    if outbox.send(terminal).is_err() {
        debug!("Рабочий поток {} завершен после ухода хоста", id);
    } else {
        debug!("✅ Рабочий поток {} завершен", id);
    }
}

/// Выполняет симуляцию и публикует копию позиций после каждой итерации.
/// `None` означает, что хост ушел до конца запуска.
fn simulate(
    payload: SimulationPayload,
    outbox: &UnboundedSender<WorkerMessage>,
    cancel: &AtomicBool,
    parallel: Option<&ParallelForceProcessor>,
) -> Result<Option<Vec<f64>>> {
    let (input, initial) = payload.into_parts()?;

    let mut simulation = ForceSimulation::new(&input);
    if let Some(processor) = parallel {
        simulation = simulation.with_parallelism(processor);
    }
    let mut state = simulation.initial_state(initial)?;

    for iteration in 0..input.options().iterations {
        if cancel.load(Ordering::Relaxed) {
            return Ok(None);
        }
        simulation.step(&mut state);

        let message = WorkerMessage::Data {
            positions: flatten(state.positions()),
            iteration,
        };
        if outbox.send(message).is_err() {
            return Ok(None);
        }
    }

    Ok(Some(flatten(state.positions())))
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

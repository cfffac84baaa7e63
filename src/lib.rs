/*!
# Force Layout Engine Library

Силовая укладка графов (Fruchterman-Reingold) на плоскости.

## Модули

- `algorithms` - Симуляция сил, график охлаждения и начальная расстановка
- `data_structures` - Модель графа и контракт `GraphDataProvider`
- `adapters` - `GraphDataProvider` для графов `petgraph`
- `snapshot` - Проекция индекс/id между графом и плотными буферами
- `worker` - Изолированный рабочий поток и его протокол сообщений
- `host` - Прямое и вынесенное выполнение
- `layout` - Фасад `ForceLayoutEngine`
- `gml` - Чтение и запись GML
- `metrics` - Метрики Prometheus

## Пример

```no_run
use force_layout_engine::{ForceLayoutEngine, GraphBuilder, SimulationOptions};

# fn main() -> anyhow::Result<()> {
let mut builder = GraphBuilder::new();
builder.add_unweighted_edge("a", "b").add_edge("b", "c", 2.0);
let mut graph = builder.build()?;

let engine = ForceLayoutEngine::new(SimulationOptions::default().with_iterations(50))?;
let positions = engine.assign(&mut graph)?;
println!("{}", serde_json::to_string_pretty(&positions)?);
# Ok(())
# }
```
*/

pub mod adapters;
pub mod algorithms;
pub mod config;
pub mod data_structures;
pub mod error;
pub mod gml;
pub mod host;
pub mod layout;
pub mod metrics;
pub mod snapshot;
pub mod test_layout;
pub mod worker;

// Re-export основных типов
pub use adapters::{LayoutEdge, LayoutNode, LayoutVertex};
pub use algorithms::{FrameSize, SimulationOptions};
pub use config::Config;
pub use data_structures::{Graph, GraphBuilder, GraphDataProvider, NodeId, Position};
pub use error::{LayoutError, Result};
pub use host::{DirectHost, ExecutionHost, OffloadedHost, OffloadedRun};
pub use layout::ForceLayoutEngine;
pub use metrics::MetricsCollector;
pub use snapshot::{PositionMapping, PositionsView};
pub use worker::WorkerMessage;

// Версия API
pub const API_VERSION: &str = env!("CARGO_PKG_VERSION");

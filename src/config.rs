/*!
# Configuration

Слоистые настройки движка: файл TOML, затем переопределения из окружения
`FORCE_LAYOUT__<SECTION>__<KEY>`. У каждой секции есть значения по умолчанию,
пустой или отсутствующий файл является валидной конфигурацией.
*/

use crate::algorithms::{FrameSize, ParallelForceProcessor, SimulationOptions};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Префикс переменных окружения для переопределений
pub const ENV_PREFIX: &str = "FORCE_LAYOUT";

/// Конфигурация движка
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub simulation: SimulationConfig,
    pub execution: ExecutionConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

/// Параметры симуляции по умолчанию
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub iterations: usize,
    pub edge_weight_influence: f64,
    pub speed: f64,
    pub gravity: f64,

    /// `C` силовой модели
    pub repulsion_constant: f64,

    pub frame: FrameSize,

    /// Seed случайной расстановки; без него берется энтропия
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::from_options(&SimulationOptions::default())
    }
}

impl SimulationConfig {
    pub fn from_options(options: &SimulationOptions) -> Self {
        Self {
            iterations: options.iterations,
            edge_weight_influence: options.edge_weight_influence,
            speed: options.speed,
            gravity: options.gravity,
            repulsion_constant: options.repulsion_constant,
            frame: options.frame,
            seed: None,
        }
    }

    pub fn options(&self) -> SimulationOptions {
        SimulationOptions {
            iterations: self.iterations,
            edge_weight_influence: self.edge_weight_influence,
            speed: self.speed,
            gravity: self.gravity,
            repulsion_constant: self.repulsion_constant,
            frame: self.frame,
        }
    }
}

/// Хост по умолчанию, если вызывающий его не выбрал
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Direct,
    Offloaded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub mode: ExecutionMode,

    /// Размер пула потоков отталкивания
    pub worker_threads: usize,

    /// Число узлов, начиная с которого отталкивание идет в пуле
    pub parallel_threshold: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Direct,
            worker_threads: num_cpus::get(),
            parallel_threshold: 512,
        }
    }
}

impl ExecutionConfig {
    /// Пул потоков для отталкивания, `None` при одном рабочем потоке
    pub fn parallel_processor(&self) -> Result<Option<Arc<ParallelForceProcessor>>> {
        if self.worker_threads <= 1 {
            return Ok(None);
        }
        let processor = ParallelForceProcessor::new(self.worker_threads, self.parallel_threshold)?;
        Ok(Some(Arc::new(processor)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Фильтр по умолчанию, если `RUST_LOG` не задан
    pub level: String,

    /// Каталог для файла логов и файла ошибок; без него логи идут только в
    /// консоль
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,

    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            ansi: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,

    /// Префикс имен всех метрик
    pub namespace: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            namespace: "force_layout".to_string(),
        }
    }
}

impl Config {
    /// Загружает `path` (необязательный) и применяет переопределения окружения
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("failed to read configuration from {}", path.display()))?;

        let config: Config = settings
            .try_deserialize()
            .with_context(|| format!("invalid configuration in {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.simulation.options().validate()?;

        if self.execution.worker_threads == 0 {
            return Err(anyhow::anyhow!("execution.worker_threads должен быть не меньше 1"));
        }

        if self.logging.level.trim().is_empty() {
            return Err(anyhow::anyhow!("logging.level не может быть пустым"));
        }

        if self.metrics.namespace.is_empty() {
            return Err(anyhow::anyhow!("metrics.namespace не может быть пустым"));
        }

        Ok(())
    }
}

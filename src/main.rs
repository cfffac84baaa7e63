/*!
# force-layout

Интерфейс командной строки движка силовой укладки.

## Режимы

- **layout**: укладка графа JSON или GML, вывод позиций (JSON) или графа с
  координатами (GML)
- **stream**: запуск в рабочем потоке, каждое сообщение печатается одной
  строкой JSON
- **test**: укладка демо-графа (или файла GML) на обоих хостах и проверка
  совпадения

*/

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_stream::StreamExt;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use force_layout_engine::config::{Config, ExecutionMode, LoggingConfig};
use force_layout_engine::gml::{read_gml_file, write_gml_file};
use force_layout_engine::{ForceLayoutEngine, Graph, MetricsCollector, API_VERSION};

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[cfg(all(feature = "jemalloc", not(feature = "mimalloc")))]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

/// Аргументы командной строки
#[derive(Parser, Debug)]
#[command(name = "force-layout")]
#[command(about = "Fruchterman-Reingold force-directed graph layout")]
#[command(version)]
struct Args {
    /// Путь к файлу конфигурации
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Фильтр логирования, переопределяет конфигурацию
    #[arg(short, long)]
    log_level: Option<String>,

    /// Режим работы
    #[arg(short, long, value_enum, default_value = "layout")]
    mode: RunMode,

    /// Входной граф (JSON, или GML по расширению); по умолчанию stdin
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Выходной файл (позиции JSON, или GML по расширению); по умолчанию stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Запуск в вынесенном рабочем потоке
    #[arg(long)]
    offloaded: bool,

    #[arg(long)]
    iterations: Option<usize>,

    #[arg(long)]
    gravity: Option<f64>,

    #[arg(long)]
    speed: Option<f64>,

    /// Seed случайной начальной расстановки
    #[arg(long)]
    seed: Option<u64>,

    /// Напечатать итоговую конфигурацию в TOML и выйти
    #[arg(long)]
    print_config: bool,

    /// Напечатать метрики Prometheus в stderr по завершении
    #[arg(long)]
    metrics: bool,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum RunMode {
    /// Укладка графа
    Layout,
    /// Сообщения рабочего потока в NDJSON
    Stream,
    /// Самопроверка на демо-графе
    Test,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if self.offloaded {
            config.execution.mode = ExecutionMode::Offloaded;
        }
        if let Some(iterations) = self.iterations {
            config.simulation.iterations = iterations;
        }
        if let Some(gravity) = self.gravity {
            config.simulation.gravity = gravity;
        }
        if let Some(speed) = self.speed {
            config.simulation.speed = speed;
        }
        if self.seed.is_some() {
            config.simulation.seed = self.seed;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)?;
    args.apply(&mut config);
    config.validate()?;

    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    init_logging(&config.logging)?;
    info!("🦀 Запуск force-layout v{}", API_VERSION);
    info!("📋 Конфигурация загружена из {}", args.config.display());

    let metrics = if config.metrics.enabled {
        Some(Arc::new(MetricsCollector::new(&config.metrics)?))
    } else {
        None
    };

    let mut engine = ForceLayoutEngine::from_config(&config)?;
    if let Some(metrics) = &metrics {
        engine = engine.with_metrics(Arc::clone(metrics));
    }

    info!("🎯 Режим работы: {:?}", args.mode);
    let outcome = match args.mode {
        RunMode::Layout => run_layout(&engine, &args, config.execution.mode).await,
        RunMode::Stream => run_stream(&engine, &args).await,
        RunMode::Test => run_tests(&args, &config).await,
    };

    if let Err(e) = &outcome {
        error!("❌ {:#}", e);
    }

    if let Some(metrics) = &metrics {
        info!("📊 Метрики: {}", serde_json::to_string(&metrics.summary())?);
        if args.metrics {
            eprint!("{}", metrics.export_metrics()?);
        }
    }

    outcome
}

/// Инициализация системы логирования: консоль в stderr, файлы по желанию
fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.level))
        .map_err(|e| anyhow::anyhow!("Неверный уровень логирования '{}': {}", config.level, e))?;

    // В stdout идут результаты, логи в stderr
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(config.ansi);

    let (file_layer, error_layer) = match &config.directory {
        Some(directory) => {
            std::fs::create_dir_all(directory)
                .with_context(|| format!("Не удалось создать директорию логов {directory}"))?;

            let file_appender = tracing_appender::rolling::never(directory, "force_layout.log");
            let error_appender = tracing_appender::rolling::never(directory, "force_layout_error.log");

            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(file_appender)
                .with_target(true)
                .with_ansi(false);

            let error_layer = tracing_subscriber::fmt::layer()
                .with_writer(error_appender)
                .with_target(true)
                .with_ansi(false)
                .with_filter(tracing_subscriber::filter::LevelFilter::ERROR);

            (Some(file_layer), Some(error_layer))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .with(error_layer)
        .init();

    Ok(())
}

fn is_gml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("gml"))
}

fn load_graph(input: Option<&Path>) -> Result<Graph> {
    match input {
        Some(path) if is_gml(path) => read_gml_file(path),
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Не удалось прочитать {}", path.display()))?;
            Ok(Graph::from_json(&json)?)
        }
        None => {
            let mut json = String::new();
            std::io::stdin().read_to_string(&mut json)?;
            Ok(Graph::from_json(&json)?)
        }
    }
}

/// Укладка одного графа
async fn run_layout(engine: &ForceLayoutEngine, args: &Args, mode: ExecutionMode) -> Result<()> {
    let mut graph = load_graph(args.input.as_deref())?;
    info!("📥 Граф загружен: {} узлов, {} ребер", graph.node_count(), graph.edge_count());

    let positions = match mode {
        ExecutionMode::Direct => engine.assign(&mut graph)?,
        ExecutionMode::Offloaded => engine.assign_offloaded(&mut graph).await?,
    };

    match &args.output {
        Some(path) if is_gml(path) => {
            write_gml_file(&graph, path)?;
            info!("💾 Граф с координатами записан в {}", path.display());
        }
        Some(path) => {
            std::fs::write(path, serde_json::to_string_pretty(&positions)?)
                .with_context(|| format!("Не удалось записать {}", path.display()))?;
            info!("💾 Позиции записаны в {}", path.display());
        }
        None => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            serde_json::to_writer_pretty(&mut out, &positions)?;
            writeln!(out)?;
        }
    }

    Ok(())
}

/// Сырые сообщения рабочего потока в NDJSON на stdout
async fn run_stream(engine: &ForceLayoutEngine, args: &Args) -> Result<()> {
    let graph = load_graph(args.input.as_deref())?;
    let (run, _projector) = engine.spawn_offloaded(&graph)?;
    let mut messages = run.into_stream();

    let stdout = std::io::stdout();
    while let Some(message) = messages.next().await {
        let terminal = message.is_terminal();
        let mut out = stdout.lock();
        serde_json::to_writer(&mut out, &message)?;
        writeln!(out)?;
        if terminal {
            break;
        }
    }

    Ok(())
}

/// Самопроверка
async fn run_tests(args: &Args, config: &Config) -> Result<()> {
    info!("🧪 Самопроверка укладки...");
    let options = config.simulation.options();

    match args.input.as_deref() {
        Some(path) => force_layout_engine::test_layout::test_layout_from_gml(path, options).await?,
        None => force_layout_engine::test_layout::test_layout(options).await?,
    }

    println!("✅ Самопроверка пройдена");
    Ok(())
}

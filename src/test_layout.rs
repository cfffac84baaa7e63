//! Самопроверка движка укладки
//!
//! Укладывает небольшой демо-граф (или файл GML) на обоих хостах, проверяет
//! совпадение результатов и рамку, печатает ASCII-картинку укладки.

use crate::algorithms::SimulationOptions;
use crate::data_structures::{Graph, GraphBuilder, GraphDataProvider};
use crate::gml::read_gml_file;
use crate::layout::ForceLayoutEngine;
use crate::snapshot::PositionMapping;
use anyhow::Result;
use std::path::Path;

/// Seed самопроверки, оба хоста стартуют с одной расстановки
pub const SELF_CHECK_SEED: u64 = 42;

/// Допустимое расхождение прямого и вынесенного результатов
pub const AGREEMENT_TOLERANCE: f64 = 1e-9;

/// Создание демо-графа
///
/// Фигуры, которые тянут укладку в разные стороны:
/// - Цепочка
/// - Треугольник
/// - Звезда с тяжелым лучом
/// - Изолированный узел
pub fn create_test_graph() -> Result<Graph> {
    let mut builder = GraphBuilder::new();
    builder
        // Цепочка: A - B - C - D - E
        .add_unweighted_edge("A", "B")
        .add_unweighted_edge("B", "C")
        .add_unweighted_edge("C", "D")
        .add_unweighted_edge("D", "E")
        // Треугольник, подвешенный к цепочке
        .add_unweighted_edge("C", "F")
        .add_unweighted_edge("F", "G")
        .add_unweighted_edge("G", "C")
        // Звезда вокруг H, один тяжелый луч
        .add_unweighted_edge("H", "I")
        .add_unweighted_edge("H", "J")
        .add_edge("H", "K", 3.0)
        .add_unweighted_edge("E", "H")
        // Изолированный
        .add_node("Z");
    Ok(builder.build()?)
}

/// Самопроверка на файле GML
pub async fn test_layout_from_gml<P: AsRef<Path>>(path: P, options: SimulationOptions) -> Result<()> {
    println!("📁 Загрузка {}", path.as_ref().display());
    let graph = read_gml_file(path)?;
    run_self_check(&graph, options).await
}

/// Самопроверка на демо-графе
pub async fn test_layout(options: SimulationOptions) -> Result<()> {
    let graph = create_test_graph()?;
    run_self_check(&graph, options).await
}

async fn run_self_check(graph: &Graph, options: SimulationOptions) -> Result<()> {
    let stats = graph.statistics();
    println!("📊 Граф: {} узлов, {} ребер, {} изолированных", stats.node_count, stats.edge_count, stats.isolated_nodes);

    let engine = ForceLayoutEngine::new(options)?.with_seed(Some(SELF_CHECK_SEED));

    let mut snapshots = 0;
    let mut last_snapshot = None;
    let direct = engine.layout_with_observer(graph, |view, _| {
        snapshots += 1;
        last_snapshot = Some(view.to_mapping());
    })?;
    println!("✅ Прямой запуск: {} снимков прогресса", snapshots);

    if let Some(last) = last_snapshot {
        if last != direct {
            return Err(anyhow::anyhow!("Последний снимок прогресса отличается от результата"));
        }
    }

    let offloaded = engine.layout_offloaded(graph).await?;
    println!("✅ Вынесенный запуск завершен");

    let deviation = direct
        .max_deviation(&offloaded)
        .ok_or_else(|| anyhow::anyhow!("Хосты вернули разные наборы узлов"))?;
    if deviation > AGREEMENT_TOLERANCE {
        return Err(anyhow::anyhow!("Хосты расходятся на {deviation:e}"));
    }
    println!("🔍 Хосты совпадают (макс. расхождение {deviation:e})");

    let frame = engine.options().frame.resolve(graph.node_ids().len());
    if let Some((id, _)) = direct.iter().find(|(_, p)| !frame.contains(p.x, p.y)) {
        return Err(anyhow::anyhow!("Узел {id} вышел за рамку"));
    }

    visualize_ascii(&direct, 48, 20);
    Ok(())
}

/// ASCII-картинка укладки, метки это первые символы id узлов
pub fn visualize_ascii(mapping: &PositionMapping, width: usize, height: usize) {
    if mapping.is_empty() || width < 2 || height < 2 {
        return;
    }

    let (mut min_x, mut max_x, mut min_y, mut max_y) = (f64::MAX, f64::MIN, f64::MAX, f64::MIN);
    for (_, p) in mapping.iter() {
        min_x = min_x.min(p.x);
        max_x = max_x.max(p.x);
        min_y = min_y.min(p.y);
        max_y = max_y.max(p.y);
    }
    let span_x = (max_x - min_x).max(f64::EPSILON);
    let span_y = (max_y - min_y).max(f64::EPSILON);

    let mut canvas = vec![vec![' '; width]; height];
    for (id, p) in mapping.iter() {
        let col = ((p.x - min_x) / span_x * (width - 1) as f64).round() as usize;
        let row = ((max_y - p.y) / span_y * (height - 1) as f64).round() as usize;
        canvas[row][col] = id.as_str().chars().next().unwrap_or('*');
    }

    println!("┌{}┐", "─".repeat(width));
    for row in canvas {
        println!("│{}│", row.into_iter().collect::<String>());
    }
    println!("└{}┘", "─".repeat(width));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_structure() -> Result<()> {
        let graph = create_test_graph()?;
        assert_eq!(graph.node_count(), 12);
        assert_eq!(graph.edge_count(), 11);
        assert_eq!(graph.statistics().isolated_nodes, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_layout_execution() -> Result<()> {
        test_layout(SimulationOptions::default().with_iterations(20)).await
    }
}

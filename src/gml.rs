/*!
# GML reader and writer

Читает подмножество GML, которое графовые редакторы экспортируют для простых графов:

```text
graph [
    node [ id 0 label "A" graphics [ x 1.0 y 2.0 ] ]
    edge [ source 0 target 1 weight 2.5 ]
]
```

Узлы идентифицируются по `label`, если он есть, иначе по `id`. Координаты
берутся из `graphics.x`/`graphics.y`, веса ребер из `weight` или `value`.
*/

use crate::data_structures::{Graph, GraphEdge, NodeAttributes, NodeId};
use crate::error::{LayoutError, Result};
use hashbrown::HashMap;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open,
    Close,
    Word(String),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
enum GmlValue {
    Number(f64),
    Text(String),
    List(Vec<(String, GmlValue)>),
}

impl GmlValue {
    fn as_key(&self) -> Option<String> {
        match self {
            GmlValue::Number(n) if n.fract() == 0.0 => Some(format!("{}", *n as i64)),
            GmlValue::Number(n) => Some(n.to_string()),
            GmlValue::Text(text) => Some(text.clone()),
            GmlValue::List(_) => None,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            GmlValue::Number(n) => Some(*n),
            GmlValue::Text(text) => text.parse().ok(),
            GmlValue::List(_) => None,
        }
    }
}

fn lookup<'a>(items: &'a [(String, GmlValue)], key: &str) -> Option<&'a GmlValue> {
    items.iter().find(|(k, _)| k == key).map(|(_, v)| v)
}

fn tokenize(content: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = content.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            '[' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ']' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some(ch) => text.push(ch),
                        None => return Err(LayoutError::invalid_input("GML: unterminated string")),
                    }
                }
                tokens.push(Token::Text(text));
            }
            '#' => {
                for ch in chars.by_ref() {
                    if ch == '\n' {
                        break;
                    }
                }
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            _ => {
                let mut word = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_whitespace() || ch == '[' || ch == ']' || ch == '"' {
                        break;
                    }
                    word.push(ch);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }

    Ok(tokens)
}

fn parse_list(tokens: &[Token], pos: &mut usize, nested: bool) -> Result<Vec<(String, GmlValue)>> {
    let mut items = Vec::new();

    loop {
        let key = match tokens.get(*pos) {
            None if nested => return Err(LayoutError::invalid_input("GML: missing ']'")),
            None => return Ok(items),
            Some(Token::Close) if nested => {
                *pos += 1;
                return Ok(items);
            }
            Some(Token::Word(word)) => word.clone(),
            Some(other) => {
                return Err(LayoutError::invalid_input(format!(
                    "GML: expected a key, found {other:?}"
                )))
            }
        };
        *pos += 1;

        let value = match tokens.get(*pos) {
            Some(Token::Open) => {
                *pos += 1;
                GmlValue::List(parse_list(tokens, pos, true)?)
            }
            Some(Token::Text(text)) => {
                *pos += 1;
                GmlValue::Text(text.clone())
            }
            Some(Token::Word(word)) => {
                *pos += 1;
                match word.parse::<f64>() {
                    Ok(number) => GmlValue::Number(number),
                    Err(_) => GmlValue::Text(word.clone()),
                }
            }
            _ => {
                return Err(LayoutError::invalid_input(format!(
                    "GML: key '{key}' has no value"
                )))
            }
        };
        items.push((key, value));
    }
}

/// Разбирает документ GML в [`Graph`]
pub fn parse_gml(content: &str) -> Result<Graph> {
    let tokens = tokenize(content)?;
    let mut pos = 0;
    let document = parse_list(&tokens, &mut pos, false)?;

    let items = match lookup(&document, "graph") {
        Some(GmlValue::List(items)) => items,
        _ => return Err(LayoutError::invalid_input("GML: no graph block")),
    };

    let mut graph = Graph::new();
    let mut ids: HashMap<String, NodeId> = HashMap::new();

    for (key, value) in items {
        let (true, GmlValue::List(node)) = (key == "node", value) else {
            continue;
        };
        let raw_id = lookup(node, "id")
            .and_then(GmlValue::as_key)
            .ok_or_else(|| LayoutError::invalid_input("GML: node without id"))?;
        let id = match lookup(node, "label") {
            Some(GmlValue::Text(label)) if !label.is_empty() => NodeId::new(label.clone()),
            _ => NodeId::new(raw_id.clone()),
        };

        let mut attributes = NodeAttributes::default();
        if let Some(GmlValue::List(graphics)) = lookup(node, "graphics") {
            attributes.x = lookup(graphics, "x").and_then(GmlValue::as_number);
            attributes.y = lookup(graphics, "y").and_then(GmlValue::as_number);
        }

        graph.add_node(id.clone(), attributes)?;
        ids.insert(raw_id, id);
    }

    for (key, value) in items {
        let (true, GmlValue::List(edge)) = (key == "edge", value) else {
            continue;
        };
        let endpoint = |field: &str| -> Result<NodeId> {
            let raw = lookup(edge, field)
                .and_then(GmlValue::as_key)
                .ok_or_else(|| LayoutError::invalid_input(format!("GML: edge without {field}")))?;
            ids.get(&raw).cloned().ok_or_else(|| {
                LayoutError::invalid_input(format!("GML: edge {field} {raw} is not a node"))
            })
        };

        let mut graph_edge = GraphEdge::new(endpoint("source")?, endpoint("target")?);
        graph_edge.weight = lookup(edge, "weight")
            .or_else(|| lookup(edge, "value"))
            .and_then(GmlValue::as_number);
        graph.add_edge(graph_edge)?;
    }

    Ok(graph)
}

pub fn read_gml_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Graph> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_gml(&content)?)
}

/// Записывает `graph` в GML с координатами тех узлов, у которых они есть
pub fn write_gml<W: Write>(graph: &Graph, mut out: W) -> std::io::Result<()> {
    writeln!(out, "Creator\t\"force-layout\"")?;
    writeln!(out, "graph")?;
    writeln!(out, "[")?;
    writeln!(out, "\tdirected\t1")?;

    let mut index = HashMap::new();
    for (idx, node) in graph.nodes().enumerate() {
        index.insert(node.id.as_str(), idx);

        writeln!(out, "\tnode")?;
        writeln!(out, "\t[")?;
        writeln!(out, "\t\tid\t{idx}")?;
        writeln!(out, "\t\tlabel\t\"{}\"", node.id)?;
        if let (Some(x), Some(y)) = (node.attributes.x, node.attributes.y) {
            writeln!(out, "\t\tgraphics")?;
            writeln!(out, "\t\t[")?;
            writeln!(out, "\t\t\tx\t{x:.6}")?;
            writeln!(out, "\t\t\ty\t{y:.6}")?;
            writeln!(out, "\t\t]")?;
        }
        writeln!(out, "\t]")?;
    }

    for edge in graph.edges() {
        let (Some(source), Some(target)) = (index.get(edge.source.as_str()), index.get(edge.target.as_str())) else {
            continue;
        };
        writeln!(out, "\tedge")?;
        writeln!(out, "\t[")?;
        writeln!(out, "\t\tsource\t{source}")?;
        writeln!(out, "\t\ttarget\t{target}")?;
        if let Some(weight) = edge.weight {
            writeln!(out, "\t\tweight\t{weight}")?;
        }
        writeln!(out, "\t]")?;
    }

    writeln!(out, "]")?;
    Ok(())
}

pub fn write_gml_file<P: AsRef<Path>>(graph: &Graph, path: P) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)?;
    write_gml(graph, std::io::BufWriter::new(file))?;
    Ok(())
}

use super::load_view;
use crate::cli::OutputFormat;
use crate::graph::{BuiltGraph, GraphStatistics};
use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Table};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ViewStatistics {
    Explicit(GraphStatistics),
    Similarity {
        nodes: usize,
        dimensions: usize,
        lower: Vec<f64>,
        upper: Vec<f64>,
        median_support: f64,
        max_support: f64,
    },
}

fn statistics(graph: &BuiltGraph) -> ViewStatistics {
    match graph {
        BuiltGraph::Explicit(g) => ViewStatistics::Explicit(g.statistics()),
        BuiltGraph::Similarity(g) => {
            let (lower, upper) = g.coordinate_bounds().unwrap_or_default();
            let scale = g.support_scale();
            ViewStatistics::Similarity {
                nodes: g.node_count(),
                dimensions: lower.len(),
                lower,
                upper,
                median_support: scale.median(),
                max_support: scale.maximum(),
            }
        }
    }
}

fn render(view: &str, stats: &ViewStatistics) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Statistic", "Value"]);
    let rows: Vec<(&str, String)> = match stats {
        ViewStatistics::Explicit(s) => vec![
            ("Nodes", s.nodes.to_string()),
            ("Edges", s.edges.to_string()),
            ("Components", s.components.to_string()),
            ("Largest components", format!("{:?}", s.largest_components)),
            (
                "Edge weight (min / mean / max)",
                format!("{:.3} / {:.3} / {:.3}", s.min_weight, s.mean_weight, s.max_weight),
            ),
            (
                "Support (min / mean / max)",
                format!(
                    "{:.3} / {:.3} / {:.3}",
                    s.min_support, s.mean_support, s.max_support
                ),
            ),
        ],
        ViewStatistics::Similarity {
            nodes,
            dimensions,
            lower,
            upper,
            median_support,
            max_support,
        } => vec![
            ("Nodes", nodes.to_string()),
            ("Dimensions", dimensions.to_string()),
            ("Lower bounds", format!("{:?}", lower)),
            ("Upper bounds", format!("{:?}", upper)),
            (
                "Support (median / max)",
                format!("{:.3} / {:.3}", median_support, max_support),
            ),
        ],
    };
    for (name, value) in rows {
        table.add_row(vec![name.to_string(), value]);
    }
    format!("View '{}'\n{}", view, table)
}

pub fn show_stats(repo: &str, view: &str, data_dir: &Path, format: OutputFormat) -> Result<()> {
    let graph = load_view(data_dir, repo, view)?;
    let stats = statistics(&graph);
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
        OutputFormat::Terminal => println!("{}", render(view, &stats)),
    }
    Ok(())
}

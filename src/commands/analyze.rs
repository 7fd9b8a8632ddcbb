use crate::analysis::{
    AnalysisSettings, DisagreementAnalyzer, ExecutionMode, NodeFilterMode, PairFilter,
    PathKindFilter, ViewRegistry,
};
use crate::cli::OutputFormat;
use crate::config::CouplingmapConfig;
use crate::core::Pattern;
use crate::distributed::ProcessLauncher;
use crate::progress::ProgressManager;
use crate::results::{sort_weights_for, BoundedResultSet, ResultStore, WeightingMode};
use anyhow::{bail, Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

/// Everything `couplingmap analyze` was asked to do
#[derive(Debug, Clone)]
pub struct AnalyzeConfig {
    pub repo: String,
    pub views: Vec<String>,
    pub filter: Option<NodeFilterMode>,
    pub patterns: Vec<String>,
    pub weights: Option<Vec<f64>>,
    pub squared: bool,
    pub keep_size: Option<usize>,
    pub min_support: Option<f64>,
    pub min_module_distance: Option<usize>,
    pub workers: Option<usize>,
    pub distributed: bool,
    pub in_process: bool,
    pub seed: Option<u64>,
    pub top: usize,
    pub format: OutputFormat,
    pub output: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub no_cache: bool,
}

#[derive(Debug, Serialize)]
struct MatchReport {
    first: String,
    second: String,
    coupling: Vec<f64>,
    support: f64,
    errors: Vec<f64>,
    score: f64,
}

#[derive(Debug, Serialize)]
struct PatternReport {
    pattern: String,
    label: String,
    views: Vec<String>,
    raw_results: u64,
    kept: usize,
    weights: Vec<f64>,
    matches: Vec<MatchReport>,
}

pub fn analyze(config: AnalyzeConfig, file_config: &CouplingmapConfig) -> Result<()> {
    let views = if config.views.is_empty() {
        file_config.analysis.views.clone()
    } else {
        config.views.clone()
    };
    if views.is_empty() {
        bail!("no views given; pass --views or set analysis.views in the config");
    }

    let patterns: Vec<Pattern> = if config.patterns.is_empty() {
        file_config.patterns()?
    } else {
        config
            .patterns
            .iter()
            .map(|p| p.parse::<Pattern>())
            .collect::<crate::errors::Result<_>>()?
    };

    let settings = merged_settings(&config, file_config)?;
    let filter = config.filter.unwrap_or(file_config.analysis.filter);
    let data_dir = config
        .data_dir
        .clone()
        .unwrap_or_else(|| file_config.storage.resolved_data_dir());

    let mut analyzer = DisagreementAnalyzer::new(
        config.repo.clone(),
        Arc::new(ViewRegistry::new(&data_dir)),
        Arc::new(PathKindFilter),
    )
    .with_settings(settings)
    .with_data_dir(&data_dir);

    if !config.no_cache {
        let store = match &config.cache_dir {
            Some(dir) => ResultStore::new(dir),
            None => file_config.storage.result_store(),
        };
        analyzer = analyzer.with_store(store);
    }

    let distributed = (config.distributed || file_config.parallel.distributed) && !config.in_process;
    if distributed {
        let mut master = file_config.parallel.master_settings();
        if let Some(workers) = config.workers {
            master.max_workers = workers.max(1);
        }
        if config.seed.is_some() {
            master.seed = config.seed;
        }
        let launcher = ProcessLauncher::current_exe().context("Failed to locate the executable")?;
        analyzer = analyzer.with_mode(ExecutionMode::Distributed {
            launcher: Arc::new(launcher),
            settings: master,
        });
    }

    let sets = analyzer
        .analyze_disagreements(&views, &patterns, filter)
        .with_context(|| format!("Analysis of {} failed", config.repo))?;

    let mode = if config.squared {
        WeightingMode::Squared
    } else {
        WeightingMode::Linear
    };
    let reports = patterns
        .iter()
        .zip(&sets)
        .map(|(pattern, set)| report(pattern, set, &views, &config, mode))
        .collect::<Result<Vec<_>>>()?;

    if let Some(manager) = ProgressManager::global() {
        let _ = manager.clear();
    }
    let rendered = match config.format {
        OutputFormat::Json => serde_json::to_string_pretty(&reports)?,
        OutputFormat::Terminal => render_terminal(&reports),
    };
    match &config.output {
        Some(path) => std::fs::write(path, rendered)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}", rendered)?;
        }
    }
    Ok(())
}

/// File settings overridden by the command line, validated
fn merged_settings(
    config: &AnalyzeConfig,
    file_config: &CouplingmapConfig,
) -> Result<AnalysisSettings> {
    let file = &file_config.analysis;
    let settings = AnalysisSettings {
        keep_size: config.keep_size.unwrap_or(file.keep_size),
        min_support: config.min_support.unwrap_or(file.min_support),
        trim_factor: file.trim_factor,
        pair_filter: PairFilter {
            min_module_distance: config.min_module_distance.or(file.min_module_distance),
        },
    };
    settings.validate().context("Invalid analysis settings")?;
    Ok(settings)
}

fn report(
    pattern: &Pattern,
    set: &BoundedResultSet,
    views: &[String],
    config: &AnalyzeConfig,
    mode: WeightingMode,
) -> Result<PatternReport> {
    let pattern = pattern.truncated(views.len());
    let weights = match &config.weights {
        Some(weights) => weights.clone(),
        None => sort_weights_for(&pattern),
    };
    if weights.len() != set.dimensions() {
        bail!(
            "pattern {} ranks {} dimensions but {} weights were given",
            pattern,
            set.dimensions(),
            weights.len()
        );
    }

    let matches = set
        .get_best_sorted(&weights, mode)
        .into_iter()
        .take(config.top)
        .map(|c| MatchReport {
            first: c.payload.first.to_string(),
            second: c.payload.second.to_string(),
            coupling: c.payload.coupling.clone(),
            support: c.payload.support,
            errors: c.errors.clone(),
            score: c.weighted_score(&weights, mode),
        })
        .collect();

    Ok(PatternReport {
        pattern: pattern.signature(),
        label: pattern.label().to_string(),
        views: views.to_vec(),
        raw_results: set.total_amount(),
        kept: set.len(),
        weights,
        matches,
    })
}

fn render_terminal(reports: &[PatternReport]) -> String {
    let mut out = String::new();
    for report in reports {
        let title = if report.label.is_empty() {
            format!("Pattern [{}]", report.pattern)
        } else {
            format!("Pattern [{}] {}", report.pattern, report.label)
        };
        out.push_str(&format!(
            "{} - {} raw results, {} kept\n",
            title, report.raw_results, report.kept
        ));
        if report.matches.is_empty() {
            out.push_str("  no matches\n\n");
            continue;
        }

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        let mut header = vec![Cell::new("#"), Cell::new("First"), Cell::new("Second")];
        header.extend(report.views.iter().map(Cell::new));
        header.push(Cell::new("Support"));
        header.push(Cell::new("Score"));
        table.set_header(header);

        for (rank, m) in report.matches.iter().enumerate() {
            let mut row = vec![
                Cell::new(rank + 1),
                Cell::new(&m.first),
                Cell::new(&m.second),
            ];
            row.extend(m.coupling.iter().map(|c| Cell::new(format!("{:.3}", c))));
            row.push(Cell::new(format!("{:.3}", m.support)));
            row.push(Cell::new(format!("{:.4}", m.score)));
            table.add_row(row);
        }
        out.push_str(&table.to_string());
        out.push_str("\n\n");
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::{CandidatePayload, ScoredCandidate};

    fn config() -> AnalyzeConfig {
        AnalyzeConfig {
            repo: "r".into(),
            views: vec!["references".into(), "evolutionary".into()],
            filter: None,
            patterns: vec![],
            weights: None,
            squared: false,
            keep_size: None,
            min_support: None,
            min_module_distance: None,
            workers: None,
            distributed: false,
            in_process: true,
            seed: None,
            top: 1,
            format: OutputFormat::Terminal,
            output: None,
            data_dir: None,
            cache_dir: None,
            no_cache: true,
        }
    }

    fn set() -> BoundedResultSet {
        let mut set = BoundedResultSet::new(3, 10);
        for (first, error) in [("a/X", 0.1), ("a/Y", 0.6)] {
            set.add(ScoredCandidate::new(
                vec![error, 0.0, -0.5],
                CandidatePayload {
                    first: first.into(),
                    second: "b/Z".into(),
                    coupling: vec![1.0 - error, 0.0],
                    support: 0.5,
                },
            ));
        }
        set
    }

    #[test]
    fn test_report_takes_top_matches() {
        let pattern: Pattern = "1,0:Hidden".parse().unwrap();
        let report = report(
            &pattern,
            &set(),
            &config().views,
            &config(),
            WeightingMode::Linear,
        )
        .unwrap();
        assert_eq!(report.raw_results, 2);
        assert_eq!(report.matches.len(), 1);
        assert_eq!(report.matches[0].first, "a/X");
        assert_eq!(report.weights.len(), 3);

        let text = render_terminal(&[report]);
        assert!(text.contains("Pattern [1,0] Hidden"));
        assert!(text.contains("a/X"));
    }

    #[test]
    fn test_command_line_settings_are_validated() {
        let file_config = CouplingmapConfig::default();
        let mut config = config();
        config.min_module_distance = Some(6);
        let settings = merged_settings(&config, &file_config).unwrap();
        assert_eq!(settings.keep_size, file_config.analysis.keep_size);
        assert_eq!(settings.pair_filter, PairFilter::min_module_distance(6));

        config.keep_size = Some(0);
        assert!(merged_settings(&config, &file_config).is_err());
        config.keep_size = None;
        config.min_support = Some(2.0);
        assert!(merged_settings(&config, &file_config).is_err());
    }

    #[test]
    fn test_wrong_weight_count_is_rejected() {
        let mut config = config();
        config.weights = Some(vec![1.0]);
        let pattern: Pattern = "1,0".parse().unwrap();
        assert!(report(&pattern, &set(), &config.views, &config, WeightingMode::Linear).is_err());
    }
}

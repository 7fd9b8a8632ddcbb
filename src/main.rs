use anyhow::Result;
use couplingmap::cli::{configure_thread_pool, init_tracing, Commands};
use couplingmap::commands::analyze::{analyze, AnalyzeConfig};
use couplingmap::config::{load_config, parse_config, CouplingmapConfig};
use couplingmap::progress::{ProgressConfig, ProgressManager};
use std::path::Path;

fn main() -> Result<()> {
    let cli = couplingmap::cli::parse_args();
    init_tracing(cli.verbose);
    ProgressManager::init_global(ProgressConfig::from_env(cli.quiet, cli.verbose));

    let config = match &cli.config {
        Some(path) => load_explicit_config(path)?,
        None => load_config(),
    };

    match cli.command {
        Commands::Analyze {
            repo,
            views,
            filter,
            patterns,
            weights,
            squared,
            keep_size,
            min_support,
            min_module_distance,
            workers,
            distributed,
            in_process,
            seed,
            top,
            format,
            output,
            data_dir,
            cache_dir,
            no_cache,
        } => {
            if !distributed {
                configure_thread_pool(workers.unwrap_or(config.parallel.thread_count()));
            }
            let analyze_config = AnalyzeConfig {
                repo,
                views,
                filter,
                patterns,
                weights,
                squared,
                keep_size,
                min_support,
                min_module_distance,
                workers,
                distributed,
                in_process,
                seed,
                top,
                format,
                output,
                data_dir,
                cache_dir,
                no_cache,
            };
            analyze(analyze_config, &config)
        }
        Commands::Stats {
            repo,
            view,
            data_dir,
            format,
        } => {
            let data_dir = data_dir.unwrap_or_else(|| config.storage.resolved_data_dir());
            couplingmap::commands::stats::show_stats(&repo, &view, &data_dir, format)
        }
        Commands::Export {
            repo,
            view,
            data_dir,
            output,
        } => {
            let data_dir = data_dir.unwrap_or_else(|| config.storage.resolved_data_dir());
            couplingmap::commands::export::export_view(&repo, &view, &data_dir, output.as_deref())
        }
        Commands::Worker { spec } => {
            configure_thread_pool(1);
            couplingmap::commands::worker::run_worker(&spec)
        }
    }
}

fn load_explicit_config(path: &Path) -> Result<CouplingmapConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
    Ok(parse_config(&contents)?)
}

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use chrono::Local;
use schemap_cli::inputs::{load_descriptions, load_method_results, load_schema};
use schemap_match::export::default_output_name;
use schemap_match::{
    ChatArbiter, ExportFormat, MatchInputs, MatchPipeline, TableAggregator, read_column_records,
    write_report,
};
use schemap_model::{
    ColumnDescriptions, ColumnDocument, EnsembleConfig, MatchReport, TableMatchResult,
};
use tracing::{info, info_span, warn};

use crate::cli::{AggregateArgs, BandPreset, ConfigArgs, InspectArgs, RunArgs};

/// What `schemap run` produced.
pub struct RunOutcome {
    pub report: MatchReport,
    pub bands: BandPreset,
    /// Where the report was written; `None` for dry runs.
    pub output: Option<PathBuf>,
}

pub fn run_match(args: &RunArgs) -> Result<RunOutcome> {
    let span = info_span!("run");
    let _guard = span.enter();
    let start = Instant::now();

    let config = resolve_config(&args.config)?;
    let descriptions = match &args.descriptions {
        Some(path) => load_descriptions(path)?,
        None => ColumnDescriptions::default(),
    };
    let source_columns = match &args.source_schema {
        Some(path) => load_schema(path)?.columns(),
        None => Vec::new(),
    };

    let mut method_results = Vec::with_capacity(args.methods.len());
    for file in &args.methods {
        method_results.push(load_method_results(file)?);
    }

    let mut inputs = MatchInputs::new(method_results)
        .with_source_columns(source_columns)
        .with_descriptions(descriptions);
    if let Some(path) = &args.target_schema {
        let target = load_schema(path)?.columns();
        if inputs.source_columns.is_empty() {
            warn!("BM25 needs --source-schema; skipping lexical scoring");
        } else {
            inputs = inputs.with_lexical_results(&target);
        }
    }
    if inputs.method_results.is_empty() && inputs.source_columns.is_empty() {
        bail!("nothing to match: pass --method files or --source-schema");
    }

    let arbiter = if config.arbitration.enabled {
        Some(
            ChatArbiter::from_config(&config.arbitration)
                .context("set up the arbitration client")?,
        )
    } else {
        None
    };
    let mut pipeline = MatchPipeline::new(config).context("invalid configuration")?;
    if let Some(arbiter) = &arbiter {
        pipeline = pipeline.with_arbiter(arbiter);
    }
    let report = pipeline.run(&inputs);

    let output = if args.dry_run {
        None
    } else {
        let format = ExportFormat::from(args.output.format);
        let path = args
            .output
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from(default_output_name(format, Local::now())));
        write_report(&report, &path, format)
            .with_context(|| format!("write report {}", path.display()))?;
        Some(path)
    };

    info!(
        columns = report.column_match_count,
        tables = report.table_match_count,
        duration_ms = start.elapsed().as_millis(),
        "run complete"
    );
    Ok(RunOutcome {
        report,
        bands: args.bands,
        output,
    })
}

/// Loads the configuration file, if any, then applies flag overrides.
pub fn resolve_config(args: &ConfigArgs) -> Result<EnsembleConfig> {
    let mut config = match &args.config {
        Some(path) => EnsembleConfig::load(path)?,
        None => EnsembleConfig::default(),
    };
    for (method, weight) in &args.weights {
        config.weights.set(method.clone(), *weight);
    }
    if args.arbitrate {
        config.arbitration.enabled = true;
    }
    if let Some(top_n) = args.top_n {
        config.arbitration.top_n = top_n;
    }
    if let Some(timeout_secs) = args.timeout_secs {
        config.arbitration.timeout_secs = timeout_secs;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

pub fn run_aggregate(args: &AggregateArgs) -> Result<Vec<TableMatchResult>> {
    let records = read_column_records(&args.report)?;
    let tables = TableAggregator::default().aggregate(&records);
    if let Some(path) = &args.output {
        write_tables(&tables, path)?;
    }
    Ok(tables)
}

fn write_tables(tables: &[TableMatchResult], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(tables)?;
    fs::write(path, json).with_context(|| format!("write {}", path.display()))
}

pub fn run_inspect(args: &InspectArgs) -> Result<(Vec<ColumnDocument>, ColumnDescriptions)> {
    let columns = load_schema(&args.schema)?.columns();
    if columns.is_empty() {
        warn!(path = %args.schema.display(), "schema has no usable columns");
    }
    let descriptions = match &args.descriptions {
        Some(path) => load_descriptions(path)?,
        None => ColumnDescriptions::default(),
    };
    Ok((columns, descriptions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Command};
    use clap::Parser;

    fn config_args(extra: &[&str]) -> ConfigArgs {
        let mut argv = vec!["schemap", "run"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Command::Run(args) => args.config,
            _ => unreachable!(),
        }
    }

    #[test]
    fn flags_override_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schemap.toml");
        fs::write(
            &path,
            "[weights]\nbm25 = 0.1\nmpnet = 0.9\n\n[arbitration]\ntop_n = 8\n",
        )
        .unwrap();
        let path_arg = path.to_str().unwrap();
        let config = resolve_config(&config_args(&[
            "--config",
            path_arg,
            "--weight",
            "mpnet=0.6",
            "--top-n",
            "2",
        ]))
        .unwrap();

        let weight = |name: &str| {
            config
                .weights
                .weight(&schemap_model::MethodName::new(name).unwrap())
        };
        assert_eq!(weight("bm25"), 0.1);
        assert_eq!(weight("mpnet"), 0.6);
        assert_eq!(config.arbitration.top_n, 2);
        assert!(!config.arbitration.enabled);
    }

    #[test]
    fn invalid_override_fails_before_work() {
        let error = resolve_config(&config_args(&["--arbitrate", "--top-n", "0"])).unwrap_err();
        assert!(format!("{error:#}").contains("top_n"));
    }

    #[test]
    fn missing_config_file_is_reported() {
        let error = resolve_config(&config_args(&["--config", "/nonexistent/schemap.toml"]))
            .unwrap_err();
        assert!(format!("{error:#}").contains("/nonexistent/schemap.toml"));
    }
}

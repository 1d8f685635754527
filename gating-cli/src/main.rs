use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use flow_gating::{
    Evaluator, GatingConfig, GatingReport, GatingResults, GatingStrategy, HierarchyFormat, Sample,
};
use flow_transforms::ChannelMap;
use ndarray::Array2;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// flowgate - evaluate a gating strategy against flow cytometry event tables
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "flowgate")]
struct Cli {
    /// CSV event table(s): a header row of channel labels, one event per row
    #[arg(value_name = "EVENT_CSV", required = true)]
    input: Vec<PathBuf>,

    /// Gating strategy definition (JSON)
    #[arg(short, long, value_name = "STRATEGY_JSON")]
    strategy: PathBuf,

    /// Fluorescence channels (comma-separated). If not specified, every
    /// channel not named FSC/SSC/Time is treated as fluorescence
    #[arg(short, long, value_delimiter = ',')]
    fluoro: Option<Vec<String>>,

    /// Save the gating report as JSON (an array when several inputs are given)
    #[arg(long, value_name = "REPORT_PATH")]
    report: Option<PathBuf>,

    /// Write per-gate membership (0/1 columns) for each input into this directory
    #[arg(long, value_name = "DIR")]
    membership_dir: Option<PathBuf>,

    /// Print the gate hierarchy (ascii or json)
    #[arg(long, value_name = "FORMAT")]
    hierarchy: Option<HierarchyFormat>,

    /// Event count at which gates are evaluated on all cores
    #[arg(long, default_value = "50000")]
    parallel_threshold: usize,

    /// Extract every gate's columns separately instead of sharing them
    #[arg(long)]
    no_cache: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Read a CSV event table with a header of channel labels
fn read_events(path: &Path, fluoro: Option<&[String]>) -> Result<Sample> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut lines = content.lines().filter(|l| !l.trim().is_empty());

    let header = lines
        .next()
        .ok_or_else(|| anyhow!("{} is empty", path.display()))?;
    let labels: Vec<String> = header
        .split(',')
        .map(|s| s.trim().trim_matches('"').to_string())
        .collect();

    let mut values = Vec::new();
    let mut rows = 0;
    for (line_no, line) in lines.enumerate() {
        let row: Vec<f64> = line
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .with_context(|| format!("{}: invalid number on row {}", path.display(), line_no + 2))?;
        if row.len() != labels.len() {
            bail!(
                "{}: row {} has {} values but the header has {} channels",
                path.display(),
                line_no + 2,
                row.len(),
                labels.len()
            );
        }
        values.extend(row);
        rows += 1;
    }

    let events = Array2::from_shape_vec((rows, labels.len()), values)?;
    let mut channels = ChannelMap::new(labels)?;
    if let Some(fluoro) = fluoro {
        channels = channels.with_fluoro_labels(fluoro)?;
    }
    let id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("sample")
        .to_string();
    debug!("Read {} events x {} channels from {}", rows, channels.len(), path.display());
    Ok(Sample::new(id, events, channels))
}

fn write_membership(dir: &Path, results: &GatingResults) -> Result<PathBuf> {
    let ids: Vec<&str> = results.gate_ids().collect();
    let columns = ids
        .iter()
        .map(|id| results.get_gate_membership(id))
        .collect::<flow_gating::Result<Vec<_>>>()?;

    let mut out = ids.join(",");
    out.push('\n');
    for i in 0..results.event_count() {
        let row: Vec<&str> = columns
            .iter()
            .map(|c| if c[i] { "1" } else { "0" })
            .collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }

    let path = dir.join(format!("{}_membership.csv", results.sample_id()));
    std::fs::write(&path, out)?;
    Ok(path)
}

fn main() -> Result<()> {
    let args = Cli::parse();

    // Initialize tracing subscriber with environment filter
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let start_time = Instant::now();

    let definition = std::fs::read_to_string(&args.strategy)
        .with_context(|| format!("Failed to read strategy {}", args.strategy.display()))?;
    let strategy = GatingStrategy::from_json(&definition)
        .with_context(|| format!("Invalid strategy {}", args.strategy.display()))?;
    info!(
        "Loaded strategy with {} gate(s) from {}",
        strategy.gate_ids().len(),
        args.strategy.display()
    );

    if let Some(format) = args.hierarchy {
        println!("{}\n", strategy.get_gate_hierarchy(format)?);
    }

    let samples = args
        .input
        .par_iter()
        .map(|path| read_events(path, args.fluoro.as_deref()))
        .collect::<Result<Vec<_>>>()?;

    let config = GatingConfig {
        parallel_threshold: args.parallel_threshold,
        cache_dimensions: !args.no_cache,
    };
    let evaluator = Evaluator::with_config(&strategy, config);
    let results = evaluator.evaluate_samples(&samples);

    let mut reports: Vec<GatingReport> = Vec::new();
    let mut failed = 0;
    for (sample, result) in samples.iter().zip(&results) {
        match result {
            Ok(result) => {
                println!("{}", result.report());
                reports.push(result.report().clone());
                if let Some(dir) = &args.membership_dir {
                    std::fs::create_dir_all(dir)?;
                    let path = write_membership(dir, result)?;
                    info!("Wrote membership to {}", path.display());
                }
            }
            Err(e) => {
                failed += 1;
                warn!("{}: {}", sample.id, e);
                eprintln!("Error: {}: {}", sample.id, e);
            }
        }
    }

    if let Some(report_path) = &args.report {
        let json = match reports.as_slice() {
            [single] if args.input.len() == 1 => single.to_json()?,
            all => serde_json::to_string_pretty(all)?,
        };
        std::fs::write(report_path, json)
            .with_context(|| format!("Failed to write report {}", report_path.display()))?;
        info!("Saved report to {}", report_path.display());
    }

    info!(
        "Gated {} sample(s), {} failed, in {:.2}s",
        samples.len(),
        failed,
        start_time.elapsed().as_secs_f64()
    );

    // Exit with error code if any sample failed
    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

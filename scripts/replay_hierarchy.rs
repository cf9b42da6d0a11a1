use std::env;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result, anyhow, bail};
use taxon_classifier::observability;
use taxon_classifier::replay::{ReplayConfig, replay_dataset};

fn main() -> Result<()> {
    observability::init().context("failed to initialize tracing")?;
    let config = parse_args()?;
    let report = replay_dataset(&config)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("failed to serialize replay report")?
    );
    Ok(())
}

fn parse_args() -> Result<ReplayConfig> {
    let mut dataset = None;
    let mut beta = None;
    let mut show_predictions = false;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--dataset" => {
                let value = args.next().context("--dataset requires a path argument")?;
                dataset = Some(PathBuf::from(value));
            }
            "--beta" => {
                let value = args.next().context("--beta requires a number")?;
                let parsed = value.parse::<f64>().context("--beta must be a number")?;
                if !parsed.is_finite() || parsed <= 0.0 {
                    bail!("--beta must be a positive number");
                }
                beta = Some(parsed);
            }
            "--show-predictions" => {
                show_predictions = true;
            }
            "--help" => {
                print_usage();
                process::exit(0);
            }
            _ => {
                bail!("unknown argument: {}", arg);
            }
        }
    }

    let dataset = dataset.ok_or_else(|| anyhow!("--dataset is required"))?;

    Ok(ReplayConfig {
        dataset,
        beta: beta.unwrap_or(1.0),
        show_predictions,
    })
}

fn print_usage() {
    eprintln!(
        "Usage: replay_hierarchy --dataset <path.json> [--beta 1.0] [--show-predictions]\n\
         Classifier parameters are read from HIER_* environment variables (HIER_CONFIG for a YAML file)."
    );
}

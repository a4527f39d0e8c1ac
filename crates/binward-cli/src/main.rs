use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use rayon::prelude::*;

use binward_core::policy::Policy;
use binward_core::report::{render, Report};
use binward_core::AuditOptions;

mod args;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = args::Args::parse();

    // A broken policy is a configuration error, not a failing binary;
    // keep its exit code distinct from verdict exit codes.
    let policy = match load_policy(&args) {
        Ok(policy) => policy,
        Err(error) => {
            eprintln!("binward: {error:#}");
            std::process::exit(2);
        }
    };

    let options = AuditOptions {
        symbol_search_paths: args.symbol_search_paths.clone(),
    };

    let mut pool = rayon::ThreadPoolBuilder::new();
    if let Some(jobs) = args.jobs {
        pool = pool.num_threads(jobs);
    }
    let pool = pool.build().context("building worker pool")?;

    // Cancellation is coarse: already-started targets run to completion,
    // fail-fast only stops new ones from starting.
    let stop = AtomicBool::new(false);
    let reports: Vec<Report> = pool.install(|| {
        args.targets
            .par_iter()
            .filter_map(|path| {
                if args.fail_fast && stop.load(Ordering::Relaxed) {
                    return None;
                }
                let report = binward_core::audit_target(path, &policy, &options);
                if report.verdict.exit_code != 0 {
                    stop.store(true, Ordering::Relaxed);
                }
                Some(report)
            })
            .collect()
    });

    let output = match args.format {
        args::OutputFormat::Json => {
            if reports.len() == 1 {
                serde_json::to_string_pretty(&reports[0])?
            } else {
                serde_json::to_string_pretty(&reports)?
            }
        }
        args::OutputFormat::Text => reports.iter().map(render::render_text).collect(),
    };

    match args.out {
        Some(path) => std::fs::write(path, &output)?,
        None => print!("{output}"),
    }

    let exit_code = reports
        .iter()
        .map(|report| report.verdict.exit_code)
        .max()
        .unwrap_or(0);
    std::process::exit(exit_code);
}

fn load_policy(args: &args::Args) -> Result<Policy> {
    match &args.policy {
        Some(path) => Policy::from_file(path)
            .with_context(|| format!("loading policy {}", path.display())),
        None => Ok(Policy::default()),
    }
}

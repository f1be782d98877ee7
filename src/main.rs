use anyhow::Context;
use combo_sharpe::io::{load_run_config, load_universe, write_report};
use combo_sharpe::search::{run, SearchControl};
use dotenv::dotenv;
use std::env;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // positional arguments win over the environment
    let mut args = env::args().skip(1);
    let mut path_from = |variable: &str| args.next().or_else(|| env::var(variable).ok());

    let universe_path: PathBuf = path_from("COMBO_SHARPE_UNIVERSE")
        .context("Pass a universe file or set COMBO_SHARPE_UNIVERSE")?
        .into();
    let config_path: PathBuf = path_from("COMBO_SHARPE_CONFIG")
        .context("Pass a run config file or set COMBO_SHARPE_CONFIG")?
        .into();
    let output_path: Option<PathBuf> = path_from("COMBO_SHARPE_OUTPUT").map(PathBuf::from);

    let universe = load_universe(&universe_path)?;
    let config = load_run_config(&config_path)?;

    let start = Instant::now();
    let report = run(&universe, &config, &SearchControl::new())?;
    let elapsed = start.elapsed();

    let best = &report.best;
    println!("Best combination: {}", best.tickers.join(", "));
    for (ticker, weight) in best.tickers.iter().zip(best.result.weights.iter()) {
        println!("  {:<8} {:>7.2}%", ticker, weight * 100.);
    }
    println!(
        "Sharpe ratio {:.4} (return {:.2}%, volatility {:.2}%, risk-free {:.2}%)",
        best.result.sharpe,
        best.result.annualized_return * 100.,
        best.result.annualized_volatility * 100.,
        best.result.risk_free_rate * 100.
    );
    let skipped = report
        .summary
        .skipped
        .map_or_else(|| "unknown".to_string(), |skipped| skipped.to_string());
    println!(
        "{} completed, {} failed, {} skipped in {:.2?}",
        report.summary.completed, report.summary.failed, skipped, elapsed
    );

    if let Some(path) = output_path {
        write_report(&path, &report)?;
        println!("Report written to {}", path.display());
    }
    Ok(())
}

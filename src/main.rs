//! backpressure-viz - command line entry point
//!
//! Runs one pipe with the given (or default) configuration and renders the
//! buffers as they fill and drain.
//!
//! ```text
//! backpressure-viz [CONFIG.toml] [--json] [--quiet] [--no-color]
//! ```

use anyhow::Context;
use backpressure_viz::observer::render::RenderOptions;
use backpressure_viz::pipeline::PipelineError;
use backpressure_viz::{Observer, OutputMode, PipeBuilder, PipeConfig, RunReport};
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "backpressure-viz")]
#[command(about = "Watch a bounded source and sink exert backpressure", long_about = None)]
struct Cli {
    /// Pipe configuration (TOML); defaults are used when omitted
    config: Option<PathBuf>,

    #[arg(long, conflicts_with = "quiet", help = "Print snapshots as JSON lines")]
    json: bool,

    #[arg(long, help = "Print events only, no buffer bars")]
    quiet: bool,

    #[arg(long = "no-color", help = "Disable colored output")]
    no_color: bool,
}

impl Cli {
    fn mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else if self.quiet {
            OutputMode::Events
        } else {
            OutputMode::Pretty
        }
    }

    fn color(&self) -> bool {
        !self.no_color
    }
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout belongs to the renderer.
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,backpressure_viz=debug")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => PipeConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => PipeConfig::default(),
    };
    tracing::info!(
        source_capacity = config.source_capacity_bytes,
        sink_capacity = config.sink_capacity_bytes,
        chunk_size = config.chunk_size_bytes,
        total_chunks = config.total_chunks_to_produce,
        total_bytes = config.total_bytes(),
        "Starting pipe"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;
    let report = runtime.block_on(run(config, &cli))?;

    print_summary(&report, &cli)?;
    Ok(())
}

async fn run(config: PipeConfig, cli: &Cli) -> anyhow::Result<RunReport> {
    let interval = config.poll_interval();
    let (runner, handle) = PipeBuilder::new(config).build()?;
    let task = runner.spawn();

    let options = RenderOptions {
        color: cli.color(),
        ..RenderOptions::default()
    };
    let mut observer = Observer::new(handle, interval, std::io::stdout())
        .mode(cli.mode())
        .render_options(options);
    observer.watch().await?;

    let report = task.await.map_err(PipelineError::from)??;
    Ok(report)
}

fn print_summary(report: &RunReport, cli: &Cli) -> anyhow::Result<()> {
    if cli.mode() == OutputMode::Json {
        println!("{}", serde_json::to_string(report)?);
        return Ok(());
    }

    let outcome = format!("{:?}", report.outcome);
    let outcome = match (cli.color(), report.outcome.is_success()) {
        (false, _) => outcome,
        (true, true) => outcome.green().bold().to_string(),
        (true, false) => outcome.red().bold().to_string(),
    };
    let stats = &report.stats;
    println!("outcome    {outcome} after {} ms", report.duration.as_millis());
    println!(
        "chunks     generated {} transferred {} processed {}",
        stats.generated, stats.transferred, stats.processed
    );
    println!(
        "flow       suspended {} resumed {} drained {} rejected {}",
        stats.suspensions, stats.resumes, stats.drains, stats.rejected_transfers
    );
    println!(
        "peaks      source {} B sink {} B",
        stats.peak_source_bytes, stats.peak_sink_bytes
    );
    if stats.discarded > 0 {
        println!("discarded  {} chunk(s)", stats.discarded);
    }
    Ok(())
}

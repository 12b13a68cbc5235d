use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use batch_iterator::{
    rate_limit, static_batch, BatchIterator, BatchSource, Context, IteratorConfig, Offset,
    RateLimitConfig, RateLimiter,
};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "batchiter", about = "Iterate batched sources one item at a time")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the non-empty lines of a file, fetched in offset/limit chunks.
    Lines {
        /// Input file.
        path: PathBuf,
        /// Lines fetched per batch.
        #[arg(long, default_value_t = 100)]
        batch_size: usize,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Print the given items from a single static batch.
    Echo {
        /// Items to print.
        items: Vec<String>,
        #[command(flatten)]
        run: RunArgs,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Maximum fetches per second (unlimited when omitted).
    #[arg(long)]
    rate: Option<f64>,
    /// Fetches allowed back to back before the rate applies.
    #[arg(long, default_value_t = 1)]
    burst: usize,
    /// Abort when iteration takes longer than this many milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Fail after this many consecutive empty batches.
    #[arg(long)]
    max_empty_batches: Option<usize>,
}

impl RunArgs {
    fn limiter(&self) -> Result<Arc<RateLimiter>> {
        let config = match self.rate {
            Some(rate) => RateLimitConfig::per_second(rate).with_burst(self.burst),
            None => RateLimitConfig::every(Duration::ZERO).with_burst(self.burst),
        };
        let limiter = RateLimiter::from_config(&config).context("invalid rate limit")?;
        Ok(Arc::new(limiter))
    }

    fn iterator_config(&self) -> IteratorConfig {
        match self.max_empty_batches {
            Some(limit) => IteratorConfig::default().with_max_empty_batches(limit),
            None => IteratorConfig::unbounded(),
        }
    }

    fn context(&self) -> Context {
        let ctx = Context::background();
        let ctx = match self.timeout_ms {
            Some(ms) => ctx.with_timeout(Duration::from_millis(ms)),
            None => ctx,
        };

        let on_interrupt = ctx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_interrupt.cancel();
            }
        });
        ctx
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Lines {
            path,
            batch_size,
            run,
        } => run_lines(path, batch_size, run).await?,
        Commands::Echo { items, run } => {
            let limiter = run.limiter()?;
            print_all(rate_limit(Some(limiter), static_batch(items)), &run).await?
        }
    }

    Ok(())
}

async fn run_lines(path: PathBuf, batch_size: usize, run: RunArgs) -> Result<()> {
    let contents = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let lines: Arc<Vec<String>> = Arc::new(
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect(),
    );
    info!(lines = lines.len(), batch_size, "loaded input");

    let source = Offset::new(batch_size, move |_ctx, offset: usize, limit: usize| {
        let chunk: Vec<String> = lines.iter().skip(offset).take(limit).cloned().collect();
        async move { Ok(chunk) }
    })
    .context("invalid batch size")?;

    let limiter = run.limiter()?;
    print_all(rate_limit(Some(limiter), source), &run).await
}

async fn print_all<S>(source: S, run: &RunArgs) -> Result<()>
where
    S: BatchSource<String> + 'static,
{
    let ctx = run.context();
    let mut iter = BatchIterator::new(source).with_config(run.iterator_config());

    while iter.advance(&ctx).await {
        if let Some(item) = iter.current() {
            println!("{}", item);
        }
    }
    if let Some(err) = iter.last_error() {
        return Err(err.clone()).context("iteration stopped");
    }

    info!(fetches = iter.fetches(), "done");
    Ok(())
}

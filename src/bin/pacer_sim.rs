//! Drive a simulated compaction or flush through a pacer
//!
//! Usage: pacer_sim --mode compaction --level-sizes 8388608,20971520 --total-bytes 268435456
//!
//! Exit codes:
//!   0 - Operation completed
//!   1 - Pacer aborted the operation (cancelled, deadline, limiter error)
//!   2 - Invalid configuration

use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use lsm_pacer::config::{DEFAULT_MEM_TABLE_SIZE, DEFAULT_RATE_LIMIT};
use lsm_pacer::levels::LevelSizes;
use lsm_pacer::{
    new_compaction_pacer, new_flush_pacer, CancelSignal, CompactionPacerEnv, CompactionPacing,
    FlushPacerEnv, FlushPacerInfo, NoopPacer, Pacer, PacerConfig, PacerMetrics,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Debt-based compaction pacing
    Compaction,
    /// Self-tuning compaction pacing
    AutoTuned,
    /// Dirty-byte flush pacing
    Flush,
    /// No pacing
    Noop,
}

#[derive(Parser)]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Simulate background I/O pacing")]
struct Cli {
    #[arg(long, value_enum, default_value_t = Mode::Compaction)]
    mode: Mode,

    /// Bytes the simulated operation produces
    #[arg(long, default_value_t = 256 << 20)]
    total_bytes: u64,

    /// Bytes produced per iteration step
    #[arg(long, default_value_t = 1 << 20)]
    chunk_bytes: u64,

    /// Shared limiter rate (bytes/sec)
    #[arg(long, default_value_t = DEFAULT_RATE_LIMIT, env = "PACER_RATE_LIMIT")]
    rate_limit: u64,

    #[arg(long, default_value_t = DEFAULT_MEM_TABLE_SIZE, env = "PACER_MEM_TABLE_SIZE")]
    mem_table_size: u64,

    /// Bytes per LSM level, L0 first (compaction mode)
    #[arg(long, value_delimiter = ',', default_value = "0")]
    level_sizes: Vec<u64>,

    /// Bytes resident across all memtables (flush mode)
    #[arg(long, default_value_t = 0)]
    memtable_bytes: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = PacerConfig::new()
        .with_mem_table_size(cli.mem_table_size)
        .with_rate_limit(cli.rate_limit)
        .with_compaction_pacing(match cli.mode {
            Mode::Compaction => CompactionPacing::DebtBased,
            Mode::AutoTuned => CompactionPacing::AutoTuned,
            Mode::Flush | Mode::Noop => CompactionPacing::Disabled,
        })
        .with_flush_pacing(cli.mode == Mode::Flush);

    if let Err(e) = config.validate() {
        eprintln!("ERROR: {}", e);
        std::process::exit(2);
    }
    if cli.chunk_bytes == 0 {
        eprintln!("ERROR: --chunk-bytes must be non-zero");
        std::process::exit(2);
    }

    let limiter = Arc::new(config.build_limiter());
    let metrics = Arc::new(PacerMetrics::new());

    let (shutdown_tx, cancel) = CancelSignal::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling throttle waits");
            let _ = shutdown_tx.send(true);
        }
    });

    let mut pacer: Box<dyn Pacer> = match cli.mode {
        Mode::Compaction | Mode::AutoTuned => {
            let levels = LevelSizes::new(cli.level_sizes.clone());
            let mem_table_size = config.mem_table_size;
            let env = CompactionPacerEnv::new(limiter.clone(), mem_table_size, move || {
                levels.pacer_info(mem_table_size)
            })
            .with_cancel(cancel)
            .with_metrics(metrics.clone());
            match new_compaction_pacer(&config, env) {
                Ok(pacer) => pacer,
                Err(e) => {
                    eprintln!("ERROR: {}", e);
                    std::process::exit(2);
                }
            }
        }
        Mode::Flush => {
            let total_bytes = cli.memtable_bytes;
            let env = FlushPacerEnv::new(limiter.clone(), config.mem_table_size, move || {
                FlushPacerInfo { total_bytes }
            })
            .with_cancel(cancel)
            .with_metrics(metrics.clone());
            new_flush_pacer(&config, env)
        }
        Mode::Noop => Box::new(NoopPacer),
    };

    tracing::info!(
        mode = ?cli.mode,
        total_bytes = cli.total_bytes,
        chunk_bytes = cli.chunk_bytes,
        rate_limit = config.rate_limit,
        "Starting simulated operation"
    );

    let start = Instant::now();
    let mut done = 0u64;
    while done < cli.total_bytes {
        done = (done + cli.chunk_bytes).min(cli.total_bytes);
        if let Err(e) = pacer.maybe_throttle(done).await {
            eprintln!("ERROR: operation aborted after {} bytes: {}", done, e);
            std::process::exit(1);
        }
    }

    let elapsed = start.elapsed();
    let snap = metrics.snapshot();
    println!("bytes:             {}", done);
    println!("elapsed:           {:?}", elapsed);
    println!(
        "throughput:        {:.1} MiB/s",
        done as f64 / elapsed.as_secs_f64().max(f64::EPSILON) / (1 << 20) as f64
    );
    println!("throttled bytes:   {}", snap.throttled_bytes);
    println!("best-effort bytes: {}", snap.best_effort_bytes);
    println!("blocking waits:    {}", snap.blocking_waits);
    println!("time waiting:      {:?}", snap.wait_time);
    println!("info refreshes:    {}", snap.info_refreshes);
    println!(
        "rate changes:      +{} / -{}",
        snap.rate_increases, snap.rate_decreases
    );
    println!("limiter tokens:    {:.0}", limiter.available_tokens());
}

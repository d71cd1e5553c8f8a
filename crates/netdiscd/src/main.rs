//! Network discovery command-line front end.
//!
//! Loads the configuration and device inventory, runs one discovery job in
//! blocking or queued mode, and prints the job summary as JSON on stdout.
//! Logs go to stderr.

mod fixtures;

use anyhow::{anyhow, Context};
use clap::Parser;
use fixtures::FixtureTransport;
use netdisc_cache::MemoryStore;
use netdisc_core::{
    DeviceTransport, DiscoveryConfig, DiscoveryOrchestrator, DiscoveryRequest, ExecutionMode,
    JobId, JobState, JobSummary, JobTracker, ShellTransport, StaticInventory,
};
use netdisc_types::{DataType, DataTypeSet, DeviceId};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Discover interfaces, addresses, routes, neighbors and MAC/ARP tables
#[derive(Parser, Debug)]
#[command(name = "netdiscd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Device inventory (TOML list of [[device]] entries)
    #[arg(short = 'i', long)]
    inventory: PathBuf,

    /// Configuration file; defaults apply when it does not exist
    #[arg(short = 'c', long, default_value = "/etc/netdisc/netdisc.toml")]
    config: PathBuf,

    /// Device to discover; repeatable. Defaults to every inventory device
    #[arg(short = 'd', long = "device")]
    devices: Vec<String>,

    /// Data types to collect, comma separated. Defaults to all
    #[arg(short = 't', long = "data-type", value_delimiter = ',')]
    data_types: Vec<String>,

    /// Execution mode (blocking, queued)
    #[arg(short = 'm', long, default_value = "blocking")]
    mode: ExecutionMode,

    /// Do not write the raw or structured caches
    #[arg(long)]
    no_cache: bool,

    /// Serve command output from DIR/<device>/<command>.json instead of the devices
    #[arg(long, value_name = "DIR")]
    fixtures: Option<PathBuf>,

    /// Progress poll interval in queued mode, in milliseconds
    #[arg(long, default_value = "500")]
    poll_ms: u64,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(&args.log_level, args.log_json) {
        eprintln!("netdiscd: {:#}", e);
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(JobState::Completed) => ExitCode::SUCCESS,
        Ok(state) => {
            warn!(state = %state, "job did not complete");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %format!("{:#}", e), "netdiscd failed");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str, json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level '{}'", level))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
    installed.map_err(|e| anyhow!("failed to set logger: {}", e))
}

async fn run(args: Args) -> anyhow::Result<JobState> {
    let config = DiscoveryConfig::load_or_default(&args.config)?;
    let inventory = StaticInventory::load(&args.inventory)?;
    info!(
        devices = inventory.len(),
        inventory = %args.inventory.display(),
        "inventory loaded"
    );

    let device_ids = if args.devices.is_empty() {
        inventory.device_ids().to_vec()
    } else {
        args.devices
            .iter()
            .map(|d| DeviceId::new(d.as_str()))
            .collect::<Result<Vec<_>, _>>()?
    };
    let data_types = if args.data_types.is_empty() {
        DataTypeSet::all()
    } else {
        args.data_types
            .iter()
            .map(|t| t.parse::<DataType>())
            .collect::<Result<DataTypeSet, _>>()?
    };

    let transport: Arc<dyn DeviceTransport> = match &args.fixtures {
        Some(dir) => {
            info!(dir = %dir.display(), "serving command output from fixtures");
            Arc::new(FixtureTransport::new(dir))
        }
        None => Arc::new(ShellTransport::new(
            config.transport.command_template.clone(),
            config.transport_timeout(),
        )?),
    };

    let orchestrator = DiscoveryOrchestrator::new(
        &config,
        transport,
        Arc::new(inventory),
        Arc::new(MemoryStore::new()),
        Arc::new(JobTracker::new()),
    )?;

    let request = DiscoveryRequest {
        device_ids,
        data_types,
        mode: args.mode,
        cache_results: !args.no_cache,
    };
    let handle = orchestrator.submit(request).await?;
    info!(job_id = %handle.job_id, mode = %handle.mode, "job submitted");

    let summary = match handle.mode {
        ExecutionMode::Blocking => handle.summary,
        ExecutionMode::Queued => {
            poll_until_settled(&orchestrator, handle.job_id, Duration::from_millis(args.poll_ms))
                .await?
        }
    };

    info!(
        job_id = %summary.job_id,
        status = %summary.status,
        successful = summary.successful_devices,
        failed = summary.failed_devices,
        skipped = summary.skipped_devices,
        "job finished"
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(summary.status)
}

/// Polls a queued job until it settles. The first Ctrl-C cancels the job.
async fn poll_until_settled(
    orchestrator: &DiscoveryOrchestrator,
    job_id: JobId,
    interval: Duration,
) -> anyhow::Result<JobSummary> {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(10)));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let job = orchestrator.job(job_id)?;
                if job.is_settled() {
                    return Ok(job.summary());
                }
                let progress = job.progress();
                info!(
                    status = %progress.status,
                    completed = progress.completed_devices,
                    total = progress.total_devices,
                    "job progress"
                );
            }
            signal = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                if let Err(e) = signal {
                    warn!(error = %e, "cannot listen for interrupts");
                    continue;
                }
                warn!(job_id = %job_id, "interrupted, cancelling job");
                if let Err(e) = orchestrator.cancel(job_id) {
                    warn!(error = %e, "cancel rejected");
                }
            }
        }
    }
}

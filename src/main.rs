use clap::{Args, Parser, Subcommand};
use pktchain::capture::{CaptureBatchBuffer, CaptureSource, DrawStatus, PcapFileSource, SourceStats};
use pktchain::config::{self, Config, SourceSpec};
use pktchain::packet::{hex_dump, render_summary, Packet};
use pktchain::telemetry::{init_logging, CaptureObserver, MetricsRegistry, TracingObserver};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Packets queued between the capture thread and the printer
const PRINT_QUEUE: usize = 256;

#[derive(Parser)]
#[command(name = "pktchain")]
#[command(about = "Batched packet capture with header chain decoding")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture and print one summary line per packet
    Run(RunArgs),
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Path to a config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Capture live on this interface
    #[arg(short, long, conflicts_with = "read")]
    interface: Option<String>,

    /// Replay this pcap file
    #[arg(short, long)]
    read: Option<PathBuf>,

    /// Stop after this many packets
    #[arg(short = 'n', long)]
    count: Option<u64>,

    /// Print each frame's bytes after its summary
    #[arg(short = 'x', long)]
    hex: bool,

    /// Do not print counters on exit
    #[arg(long)]
    no_stats: bool,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Check a config file and report problems
    Validate {
        #[arg(short, long, default_value = "pktchain.toml")]
        config: PathBuf,
    },
    /// Write a starter config file
    Init {
        #[arg(short, long, default_value = "pktchain.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => cmd_run(args),
        Commands::Config { action } => {
            init_logging(None);
            match action {
                ConfigAction::Validate { config } => cmd_config_validate(&config),
                ConfigAction::Init { output, force } => cmd_config_init(&output, force),
            }
        }
    };

    if let Err(e) = result {
        eprintln!("[ERROR] {}", e);
        std::process::exit(1);
    }
}

/// Config file (or defaults) with command-line overrides applied
fn resolve_config(args: &RunArgs) -> Result<Config, String> {
    let mut cfg = match &args.config {
        Some(path) => config::load(path).map_err(|e| format!("Failed to load config: {}", e))?,
        None => Config::default(),
    };

    if let Some(interface) = &args.interface {
        cfg.capture.interface = Some(interface.clone());
        cfg.capture.file = None;
    }
    if let Some(file) = &args.read {
        cfg.capture.file = Some(file.clone());
        cfg.capture.interface = None;
    }
    if args.count.is_some() {
        cfg.output.count = args.count;
    }
    if args.hex {
        cfg.output.hex_dump = true;
    }
    if args.no_stats {
        cfg.output.stats = false;
    }

    Ok(cfg)
}

fn cmd_run(args: RunArgs) -> Result<(), String> {
    let cfg = resolve_config(&args)?;
    init_logging(Some(&cfg.logging));

    let validation = config::validate(&cfg);
    validation.print_diagnostics();
    if validation.has_errors() {
        return Err("Validation failed".to_string());
    }

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to create runtime: {}", e))?;
    rt.block_on(run_capture(cfg))
}

async fn run_capture(cfg: Config) -> Result<(), String> {
    let metrics = Arc::new(MetricsRegistry::new());
    let observer: Arc<dyn CaptureObserver> = Arc::new((TracingObserver, metrics.clone()));
    let stop = Arc::new(AtomicBool::new(false));
    let (tx, mut rx) = mpsc::channel::<Packet>(PRINT_QUEUE);
    let (recycle_tx, recycle_rx) = mpsc::channel::<Packet>(PRINT_QUEUE);

    let source = cfg
        .capture
        .source()
        .ok_or_else(|| "No capture source; pass -i or -r".to_string())?;
    let capacity = cfg.capture.batch_capacity;

    let capture = match source {
        SourceSpec::File(path) => {
            info!(path = %path.display(), "Replaying capture file");
            let source = PcapFileSource::open(&path)
                .map_err(|e| format!("Failed to open {}: {}", path.display(), e))?;
            spawn_capture(source, capacity, observer, tx, recycle_rx, stop.clone())
        }
        #[cfg(target_os = "linux")]
        SourceSpec::Interface(name) => {
            use pktchain::capture::AfPacketSource;
            let source = AfPacketSource::open(&name, cfg.capture.snaplen, cfg.capture.read_timeout())
                .map_err(|e| {
                    format!("Failed to open {}: {}. Run with root privileges.", name, e)
                })?;
            spawn_capture(source, capacity, observer, tx, recycle_rx, stop.clone())
        }
        #[cfg(not(target_os = "linux"))]
        SourceSpec::Interface(name) => {
            return Err(format!("Live capture on {} needs Linux", name));
        }
    };

    let ctrl_c_stop = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping capture");
            ctrl_c_stop.store(true, Ordering::Relaxed);
        }
    });

    let mut printed: u64 = 0;
    while cfg.output.count.map_or(true, |limit| printed < limit) {
        let Some(packet) = rx.recv().await else {
            break;
        };
        println!("{}", render_summary(&packet));
        if cfg.output.hex_dump {
            println!("{}\n", hex_dump(&packet));
        }
        printed += 1;
        // Full or closed means the record is simply dropped
        let _ = recycle_tx.try_send(packet);
    }

    // Unblocks the capture thread if it is waiting on a full queue
    stop.store(true, Ordering::Relaxed);
    drop(rx);

    let outcome = capture
        .await
        .map_err(|e| format!("Capture task failed: {}", e))?;

    if cfg.output.stats {
        let source_stats = outcome.as_ref().ok().copied().flatten();
        print_stats(printed, &metrics, source_stats);
    }

    outcome.map(|_| ()).map_err(|e| e.to_string())
}

/// Record for the next draw: the one a `Retry` left behind, else one the
/// printer handed back
fn reusable_packet(spare: &mut Option<Packet>, recycle: &mut mpsc::Receiver<Packet>) -> Option<Packet> {
    spare.take().or_else(|| recycle.try_recv().ok())
}

/// Drain `source` on a blocking thread, forwarding delivered packets
fn spawn_capture<S: CaptureSource + 'static>(
    source: S,
    capacity: usize,
    observer: Arc<dyn CaptureObserver>,
    tx: mpsc::Sender<Packet>,
    mut recycle: mpsc::Receiver<Packet>,
    stop: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<pktchain::Result<Option<SourceStats>>> {
    tokio::task::spawn_blocking(move || {
        let mut buffer = CaptureBatchBuffer::with_capacity(source, capacity).with_observer(observer);
        info!(
            link_type = buffer.link_type().description(),
            capacity = buffer.capacity(),
            "Capture started"
        );

        let mut spare: Option<Packet> = None;
        while !stop.load(Ordering::Relaxed) {
            let (packet, status) = buffer.draw(reusable_packet(&mut spare, &mut recycle))?;
            match status {
                DrawStatus::Delivered => {
                    if tx.blocking_send(packet).is_err() {
                        debug!("Printer gone, stopping capture");
                        break;
                    }
                }
                DrawStatus::Retry => spare = Some(packet),
                DrawStatus::EndOfStream => break,
            }
        }

        Ok(buffer.source_stats())
    })
}

fn print_stats(printed: u64, metrics: &MetricsRegistry, source: Option<SourceStats>) {
    eprintln!();
    eprintln!("{} packets printed", printed);
    if let Some(stats) = source {
        eprintln!("{} frames received by source", stats.received);
        eprintln!("{} frames dropped by source", stats.dropped);
    }
    for (name, value) in metrics.export() {
        if value > 0 {
            eprintln!("  {:<24} {}", name, value);
        }
    }
}

fn cmd_config_validate(config_path: &Path) -> Result<(), String> {
    println!("[INFO] Validating {}...", config_path.display());

    let cfg = config::load(config_path).map_err(|e| format!("Failed to parse config: {}", e))?;

    let validation = config::validate(&cfg);
    validation.print_diagnostics();

    if validation.has_errors() {
        Err("Validation failed".to_string())
    } else {
        println!("[INFO] Configuration is valid");
        Ok(())
    }
}

fn cmd_config_init(output_path: &Path, force: bool) -> Result<(), String> {
    if output_path.exists() && !force {
        return Err(format!(
            "{} already exists; pass --force to overwrite",
            output_path.display()
        ));
    }

    let text = config::to_toml(&Config::template()).map_err(|e| e.to_string())?;
    let output = format!("# pktchain configuration\n\n{}", text);
    std::fs::write(output_path, output).map_err(|e| format!("Failed to write config: {}", e))?;

    if Config::template().capture.interface.is_some() {
        warn!("Template captures on eth0; edit capture.interface or set capture.file");
    }
    println!("[INFO] Wrote {}", output_path.display());
    Ok(())
}

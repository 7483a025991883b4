use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use forge_scan::external::Nmap;
use forge_scan::ports::{self, PortSet};
use forge_scan::scan_log::ScanLog;
use forge_scan::scanner;
use forge_scan::{Engine, ScanCoordinator, ScanOptions, ScanResult};

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// forge-scan — quick TCP port scanner that prefers nmap and falls back to concurrent connect probes.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "forge-scan",
    version,
    about = "Quick TCP port scanner: delegates to nmap when installed, otherwise probes with concurrent TCP connects.",
    long_about = None
)]
struct Cli {
    /// Target hostname or IP address.
    #[arg(env = "FORGE_SCAN_TARGET")]
    target: Option<String>,

    /// Ports to scan, e.g. `22,80,443` or `8000-8100`. Invalid tokens are skipped.
    #[arg(short, long)]
    ports: Option<String>,

    /// Path to ports list file (one port or range per line, `#` comments).
    #[arg(long, conflicts_with = "ports")]
    ports_file: Option<PathBuf>,

    /// Port preset used when neither --ports nor --ports-file is given.
    #[arg(long, value_enum, default_value_t = Preset::Top)]
    preset: Preset,

    /// Per-port connect timeout in milliseconds.
    #[arg(long = "timeout-ms", env = "FORGE_SCAN_TIMEOUT_MS", default_value_t = 450)]
    timeout_ms: u64,

    /// Max concurrent TCP connect attempts.
    #[arg(long, env = "FORGE_SCAN_WORKERS", default_value_t = 120)]
    concurrency: usize,

    /// Never delegate to nmap, even if it is installed.
    #[arg(long = "no-external", default_value_t = false)]
    no_external: bool,

    /// Extra argument passed through to nmap (repeatable).
    #[arg(long = "nmap-arg", value_name = "ARG", allow_hyphen_values = true)]
    nmap_args: Vec<String>,

    /// Scan log location (defaults to ~/.forge_scan.log).
    #[arg(long = "log-file", env = "FORGE_SCAN_LOG")]
    log_file: Option<PathBuf>,

    /// Write the result as pretty JSON to this path (optional).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Print the last N scan log lines and exit.
    #[arg(long = "show-log", value_name = "N")]
    show_log: Option<usize>,

    /// Log scan progress to stderr.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Preset {
    /// A handful of commonly exposed services.
    Top,
    /// Ports 1 through 1024.
    WellKnown,
}

impl Preset {
    fn ports(self) -> PortSet {
        match self {
            Preset::Top => ports::top_ports(),
            Preset::WellKnown => ports::well_known_ports(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let log = ScanLog::new(cli.log_file.clone().unwrap_or_else(ScanLog::default_path));

    if let Some(n) = cli.show_log {
        print_log_tail(&log, n)?;
        return Ok(());
    }

    let Some(target) = cli.target.as_deref() else {
        bail!("no target specified (pass it as an argument or set FORGE_SCAN_TARGET)");
    };

    let (port_spec, file_dropped) = match (&cli.ports, &cli.ports_file) {
        (Some(spec), _) => (spec.clone(), 0),
        (None, Some(path)) => {
            let parsed = ports::load_ports_from_path(path)?;
            (parsed.ports.to_spec_string(), parsed.dropped)
        }
        (None, None) => (cli.preset.ports().to_spec_string(), 0),
    };

    let options = ScanOptions {
        timeout_per_port: Duration::from_millis(cli.timeout_ms),
        max_concurrency: cli.concurrency,
        prefer_external_engine: !cli.no_external,
        external_args: cli.nmap_args.clone(),
    };

    println!("forge-scan configuration:");
    println!("  target       : {}", target);
    println!("  ports        : {}", summarize_spec(&port_spec));
    println!("  concurrency  : {}", options.max_concurrency);
    println!("  timeout_ms   : {}", cli.timeout_ms);
    let nmap = Nmap::new();
    if options.prefer_external_engine {
        println!(
            "  engine       : {} if installed, else socket probes",
            nmap.program().display()
        );
    } else {
        println!("  engine       : socket probes");
    }
    println!("  log          : {}", log.path().display());

    let cancel = CancellationToken::new();
    scanner::cancel_on_ctrl_c(cancel.clone());

    let coordinator = ScanCoordinator::new(nmap, log);
    let result = coordinator
        .scan_with_cancel(target, &port_spec, &options, cancel)
        .await?;

    let dropped = result.dropped_tokens + file_dropped;
    if dropped > 0 {
        eprintln!("Warning: skipped {dropped} invalid port token(s)");
    }
    print_results(&result);

    if let Some(path) = cli.output.as_deref() {
        if let Err(e) = write_results_json(path, &result) {
            eprintln!("Failed to write JSON to {}: {}", path.display(), e);
        } else {
            println!("Wrote JSON results to {}", path.display());
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn summarize_spec(spec: &str) -> String {
    if spec.chars().count() > 60 {
        let head: String = spec.chars().take(60).collect();
        format!("{head}…")
    } else {
        spec.to_string()
    }
}

fn print_results(result: &ScanResult) {
    println!(
        "\nScan of {} finished in {} ms (engine: {}{})",
        result.target,
        result.duration.as_millis(),
        result.engine_used,
        if result.partial { ", interrupted" } else { "" }
    );

    if result.engine_used == Engine::External {
        match result.external_exit_code {
            Some(0) => println!("See the nmap report above for open ports."),
            Some(code) => println!("nmap exited with status {code}; see its output above."),
            None => println!("nmap did not finish; see its output above."),
        }
        return;
    }

    println!(
        "Open ports: {} (requested: {})",
        result.open_ports.len(),
        result.ports_requested
    );
    if result.open_ports.is_empty() {
        println!("No open ports detected.");
        return;
    }

    let port_w = 5usize;
    let state_w = 5usize;
    println!("{:>port_w$}  {:<state_w$}", "port", "state");
    println!("{:->port_w$}  {:-<state_w$}", "", "");
    for port in &result.open_ports {
        println!("{:>port_w$}  {:<state_w$}", port, "open");
    }
}

fn print_log_tail(log: &ScanLog, n: usize) -> Result<()> {
    let lines = log.tail(n)?;
    if lines.is_empty() {
        println!("No scans logged yet at {}", log.path().display());
        return Ok(());
    }
    println!("===== Scan log (last {}) =====", lines.len());
    for line in lines {
        println!("{line}");
    }
    Ok(())
}

fn write_results_json(path: &Path, result: &ScanResult) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, result)?;
    Ok(())
}

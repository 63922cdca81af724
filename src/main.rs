use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use strata::output::{self, DocWriter, OutputFormat, SeverityTally};
use strata::{Engine, Options, ScanRequest, ScanStatus};

#[derive(Parser)]
#[command(
    name = "strata",
    about = "Scan filesystem trees and container image layers for secrets",
    version
)]
struct Cli {
    /// Name of the image (name:tag) to scan for secrets
    #[arg(long = "image-name")]
    image_name: Option<String>,

    /// Local directory (absolute path) to scan recursively
    #[arg(long)]
    local: Option<PathBuf>,

    /// Id of an existing container to scan
    #[arg(long = "container-id")]
    container_id: Option<String>,

    /// Namespace of the container; empty for the docker runtime
    #[arg(long = "container-ns", default_value = "")]
    container_ns: String,

    /// Host mount path, stripped from reported paths when scanning a
    /// mounted host root
    #[arg(long = "host-mount-path", default_value = "")]
    host_mount_path: String,

    /// Extra rule file; may be given multiple times
    #[arg(long = "config-path")]
    config_path: Vec<PathBuf>,

    /// Append the rule files given with --config-path to the default
    /// catalog instead of replacing it
    #[arg(long = "merge-configs")]
    merge_configs: bool,

    /// Maximum file size to process, in KB
    #[arg(long = "maximum-file-size", default_value_t = 256)]
    maximum_file_size: u64,

    /// Maximum number of secrets to report per scan
    #[arg(long = "max-secrets", default_value_t = 1000)]
    max_secrets: u64,

    /// Report multiple matches of the same rule in one file
    #[arg(long = "multi-match")]
    multi_match: bool,

    /// Matches of one rule reported per file when --multi-match is on
    #[arg(long = "max-multi-match", default_value_t = 3)]
    max_multi_match: u32,

    /// Output format: json or table
    #[arg(long, default_value = "table")]
    output: OutputFormat,

    /// Number of concurrent scan threads (0 = logical CPUs)
    #[arg(long, default_value_t = 0)]
    threads: usize,

    /// Concurrent workers within one scan
    #[arg(long = "workers-per-scan", default_value_t = 1)]
    workers_per_scan: usize,

    /// Seconds without output before an idle scan aborts itself
    #[arg(long = "inactive-threshold", default_value_t = 600)]
    inactive_threshold: u64,

    /// Directory for per-scan workspaces
    #[arg(long = "temp-directory")]
    temp_directory: Option<PathBuf>,

    /// Exit 1 when total findings reach this count (-1 disables)
    #[arg(long = "fail-on-count", default_value_t = -1)]
    fail_on_count: i64,

    /// Exit 1 when high findings reach this count (-1 disables)
    #[arg(long = "fail-on-high-count", default_value_t = -1)]
    fail_on_high_count: i64,

    /// Exit 1 when medium findings reach this count (-1 disables)
    #[arg(long = "fail-on-medium-count", default_value_t = -1)]
    fail_on_medium_count: i64,

    /// Exit 1 when low findings reach this count (-1 disables)
    #[arg(long = "fail-on-low-count", default_value_t = -1)]
    fail_on_low_count: i64,

    /// Enable debug logs
    #[arg(long)]
    debug: bool,
}

impl Cli {
    fn into_options(self) -> (Options, ScanTarget, OutputFormat) {
        let target = if let Some(path) = &self.local {
            ScanTarget::Local(path.clone())
        } else if let Some(name) = &self.image_name {
            ScanTarget::Image(name.clone())
        } else if let Some(id) = &self.container_id {
            ScanTarget::Container(id.clone(), self.container_ns.clone())
        } else {
            ScanTarget::Missing
        };
        let options = Options {
            threads: self.threads,
            maximum_file_size: self.maximum_file_size,
            temp_directory: self.temp_directory.unwrap_or_else(std::env::temp_dir),
            host_mount_path: self.host_mount_path,
            config_paths: self.config_path,
            merge_configs: self.merge_configs,
            multi_match: self.multi_match,
            max_multi_match: self.max_multi_match,
            max_secrets: self.max_secrets,
            workers_per_scan: self.workers_per_scan,
            inactive_threshold: self.inactive_threshold,
            fail_on_count: self.fail_on_count,
            fail_on_high_count: self.fail_on_high_count,
            fail_on_medium_count: self.fail_on_medium_count,
            fail_on_low_count: self.fail_on_low_count,
            ..Options::default()
        };
        (options, target, self.output)
    }
}

enum ScanTarget {
    Local(PathBuf),
    Image(String),
    Container(String, String),
    Missing,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);
    match run(cli) {
        Ok(exceeded) => {
            if exceeded {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(1)
        }
    }
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Returns whether a fail-on threshold was met.
fn run(cli: Cli) -> Result<bool> {
    let (options, target, format) = cli.into_options();

    let scan_id = format!("cli-{}", std::process::id());
    let request = match target {
        ScanTarget::Local(path) => ScanRequest::Path {
            scan_id: scan_id.clone(),
            path,
        },
        ScanTarget::Image(name) => ScanRequest::Image {
            scan_id: scan_id.clone(),
            name,
        },
        ScanTarget::Container(id, namespace) => ScanRequest::Container {
            scan_id: scan_id.clone(),
            id,
            namespace,
        },
        ScanTarget::Missing => {
            bail!("one of --local, --image-name or --container-id is required")
        }
    };

    let fail_on = (
        options.fail_on_count,
        options.fail_on_high_count,
        options.fail_on_medium_count,
        options.fail_on_low_count,
    );
    let host_mount_path = options.host_mount_path.clone();
    let mut doc_writer = DocWriter::create(&options.temp_directory, &scan_id, &host_mount_path)
        .context("cannot open scan output file")?;

    let engine = Engine::new(options).context("engine setup failed")?;
    let running = engine.start_scan(request).context("scan failed")?;

    let mut findings = Vec::new();
    let mut tally = SeverityTally::default();
    for finding in running.findings.iter() {
        let mut finding = finding;
        tally.add(finding.severity);
        doc_writer.append(&finding)?;
        output::strip_host_mount(&mut finding, &host_mount_path);
        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(&finding)?);
            }
            OutputFormat::Table => findings.push(finding),
        }
    }
    doc_writer.flush()?;

    let status = running.wait();
    match status {
        ScanStatus::Complete => {}
        ScanStatus::Cancelled => info!("scan cancelled; partial findings reported"),
        ScanStatus::Error(message) => bail!("scan failed: {message}"),
    }

    if format == OutputFormat::Table {
        print!("{}", output::format_table(&findings));
    }
    info!(
        total = tally.total(),
        high = tally.high,
        medium = tally.medium,
        low = tally.low,
        "scan summary"
    );

    let (on_total, on_high, on_medium, on_low) = fail_on;
    Ok(threshold_met(tally.total(), on_total)
        || threshold_met(tally.high, on_high)
        || threshold_met(tally.medium, on_medium)
        || threshold_met(tally.low, on_low))
}

fn threshold_met(count: u64, threshold: i64) -> bool {
    threshold >= 0 && count >= threshold as u64
}

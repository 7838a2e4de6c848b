use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use freewipe::config::AppSettings;
use freewipe::drives::{resolve_disk, DiskInventory, SysinfoInventory};
use freewipe::io::{BufferPool, LocalVolume};
use freewipe::logging::init_tracing;
use freewipe::maintenance::{plan_by_name, plan_names, predefined_plans, ReportStatus, SystemPhaseExecutor};
use freewipe::wipe::{progress_channel, ProgressSnapshot, SystemDiskOptIn};
use freewipe::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

#[cfg(feature = "color-output")]
use colored::Colorize;

#[derive(Parser)]
#[command(name = "freewipe")]
#[command(about = "Secure free-space wiping with scheduled maintenance plans")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (TOML, YAML or JSON)
    #[arg(short, long, global = true, env = "FREEWIPE_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter, overrides the configured level
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List mounted volumes that can be wiped
    Disks,

    /// List the predefined maintenance plans
    Plans,

    /// Overwrite the free space of the volume holding PATH
    Wipe {
        /// Directory on the target volume where filler files are written
        path: PathBuf,

        /// Performance profile (safe, balanced, aggressive, fast, sdelete)
        #[arg(short, long)]
        profile: Option<WipeProfile>,

        /// Engine (internal, sdelete, cipher)
        #[arg(short, long)]
        engine: Option<WipeEngine>,

        /// Overwrite method (random, zero, dod5220, sdelete_compatible)
        #[arg(short, long)]
        method: Option<WipeMethod>,

        /// Permit wiping the system disk under restricted limits
        #[arg(long)]
        allow_system_disk: bool,

        /// Permit overwriting a solid-state system disk
        #[arg(long)]
        force_ssd: bool,

        /// Physically verify the volume afterwards
        #[arg(long)]
        verify: bool,

        /// Print the operation record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a maintenance plan
    Maintain {
        /// Plan name (see `plans`)
        plan: String,

        /// Report what would be cleaned without deleting or wiping
        #[arg(long)]
        dry_run: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Verify a completed wipe from its saved operation record
    Verify {
        /// Volume the operation ran against
        path: PathBuf,

        /// JSON file written by `wipe --json`
        #[arg(long)]
        operation: PathBuf,

        /// Verification level (basic, physical, aggressive)
        #[arg(short, long)]
        level: Option<VerificationLevel>,

        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = AppSettings::load(cli.config.as_deref()).context("failed to load settings")?;
    if let Some(level) = &cli.log_level {
        settings.logging.level = level.clone();
    }
    if cli.json_logs {
        settings.logging.json = true;
    }
    let log_guard = init_tracing(&settings.logging)?;

    let token = CancelToken::new();
    setup_signal_handlers(token.clone())?;

    let code = match cli.command {
        Commands::Disks => list_disks()?,
        Commands::Plans => list_plans(),
        Commands::Wipe {
            path,
            profile,
            engine,
            method,
            allow_system_disk,
            force_ssd,
            verify,
            json,
        } => {
            if let Some(profile) = profile {
                settings.wipe.apply_profile(profile);
            }
            if let Some(engine) = engine {
                settings.wipe.engine = engine;
            }
            if let Some(method) = method {
                settings.wipe.method = method;
            }
            settings.wipe.validate()?;
            let opt_in = SystemDiskOptIn {
                allow_system_disk: allow_system_disk || settings.security.allow_system_disk,
                force_wipe_ssd: force_ssd || settings.security.force_wipe_ssd,
            };
            wipe_volume(&settings, &path, opt_in, verify, json, token).await?
        }
        Commands::Maintain { plan, dry_run, json } => {
            run_maintenance(&settings, &plan, dry_run, json, token).await?
        }
        Commands::Verify {
            path,
            operation,
            level,
            json,
        } => {
            let level = level.unwrap_or(settings.verification.level);
            verify_operation(&path, &operation, level, json, token).await?
        }
    };

    // Flush the file writer; process::exit skips destructors
    drop(log_guard);
    std::process::exit(code);
}

/// Process exit code for a finished operation
fn exit_code(status: OperationStatus) -> i32 {
    match status {
        OperationStatus::Completed | OperationStatus::Running => 0,
        OperationStatus::Failed => 1,
        OperationStatus::Partial | OperationStatus::Cancelled => 2,
    }
}

fn heading(text: &str) -> String {
    #[cfg(feature = "color-output")]
    {
        text.bold().to_string()
    }
    #[cfg(not(feature = "color-output"))]
    {
        text.to_string()
    }
}

fn status_label(text: &str, ok: bool) -> String {
    #[cfg(feature = "color-output")]
    {
        if ok {
            text.green().to_string()
        } else {
            text.red().to_string()
        }
    }
    #[cfg(not(feature = "color-output"))]
    {
        let _ = ok;
        text.to_string()
    }
}

fn list_disks() -> Result<i32> {
    let disks = SysinfoInventory::new().disks()?;
    if disks.is_empty() {
        println!("No volumes detected.");
        return Ok(0);
    }

    println!(
        "{}",
        heading(&format!(
            "{:<30} {:<8} {:>12} {:>12} {:<8} {:<8}",
            "Volume", "Type", "Size", "Free", "System", "Writable"
        ))
    );
    println!("{}", "-".repeat(84));
    for disk in disks {
        println!(
            "{:<30} {:<8} {:>12} {:>12} {:<8} {:<8}",
            truncate_string(&disk.name(), 30),
            disk.class.to_string(),
            format!("{:.1} GB", disk.total_bytes as f64 / GIB as f64),
            format!("{:.1} GB", disk.free_bytes as f64 / GIB as f64),
            if disk.is_system { "yes" } else { "no" },
            if disk.is_writable { "yes" } else { "no" },
        );
    }
    Ok(0)
}

fn list_plans() -> i32 {
    for plan in predefined_plans() {
        let phases: Vec<&str> = plan.phases.iter().map(|p| p.as_str()).collect();
        println!("{}", heading(&plan.name));
        println!("  {}", plan.description);
        println!(
            "  phases: {}  timeout: {}  parallel: {}  admin: {}",
            phases.join(", "),
            humantime::format_duration(plan.timeout),
            plan.parallel,
            plan.require_admin
        );
    }
    0
}

/// Pick the artifact directory, redirecting system-disk wipes to the allow-list.
fn artifact_dir(
    runner: &WipeRunner,
    inventory: &dyn DiskInventory,
    disk: &DiskTarget,
    requested: &Path,
) -> PathBuf {
    if disk.is_system && !runner.policy().is_allowed_dir(requested) {
        if let Some(dir) = runner.policy().artifact_dir(disk, inventory) {
            tracing::info!(requested = %requested.display(), using = %dir.display(), "Redirecting system-disk artifacts");
            return dir;
        }
    }
    requested.to_path_buf()
}

async fn wipe_volume(
    settings: &AppSettings,
    path: &Path,
    opt_in: SystemDiskOptIn,
    verify: bool,
    json: bool,
    token: CancelToken,
) -> Result<i32> {
    if !path.is_dir() {
        bail!("{} is not a directory", path.display());
    }

    let inventory: Arc<dyn DiskInventory> = Arc::new(SysinfoInventory::new());
    let disk = resolve_disk(inventory.as_ref(), path)?;

    let (sink, rx) = progress_channel(wipe::progress::DEFAULT_PROGRESS_CAPACITY);
    let runner = WipeRunner::new(Arc::new(BufferPool::new())).with_progress(sink);
    let volume = LocalVolume::new(artifact_dir(&runner, inventory.as_ref(), &disk, path), disk.class);
    let progress_task = tokio::spawn(render_progress(rx, json));

    let config = settings.wipe.clone();
    let ctx = RunContext::new(token.clone());
    let op = tokio::task::spawn_blocking(move || {
        let op = runner.run(&disk, &volume, &config, opt_in, &ctx);
        // Closing the sink ends the progress task
        drop(runner);
        op
    })
    .await
    .context("wipe task failed")?;
    let _ = progress_task.await;

    let mut code = exit_code(op.status);
    if json {
        println!("{}", serde_json::to_string_pretty(&op)?);
    } else {
        print_operation(&op);
    }

    if verify && op.status == OperationStatus::Completed {
        let level = settings.verification.level;
        let report = run_verifier(inventory, op, level, token).await?;
        print_verification(&report, json)?;
        if !report.wipe_verified {
            code = code.max(1);
        }
    }

    Ok(code)
}

fn print_operation(op: &WipeOperation) {
    let ok = op.status == OperationStatus::Completed;
    println!();
    println!("{} {}", heading("Wipe"), status_label(&op.status.to_string(), ok));
    println!("  Volume:   {} ({})", op.disk, op.disk_class);
    println!("  Engine:   {} / {}", op.engine, op.strategy);
    println!("  Passes:   {}/{}", op.passes, op.target_passes);
    println!(
        "  Written:  {:.1} MB at {:.1} MB/s",
        op.bytes_wiped as f64 / MIB as f64,
        op.speed_mbps
    );
    if op.trimmed {
        println!("  TRIM:     issued");
    }
    if let Some(warning) = &op.warning {
        println!("  Warning:  {}", warning);
    }
    if let Some(error) = &op.error {
        println!("  Error:    {}", error);
    }
}

#[cfg(feature = "progress-bars")]
async fn render_progress(mut rx: mpsc::Receiver<ProgressSnapshot>, quiet: bool) {
    use indicatif::{ProgressBar, ProgressStyle};

    if quiet {
        while rx.recv().await.is_some() {}
        return;
    }

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    while let Some(snapshot) = rx.recv().await {
        bar.set_position(snapshot.percentage.clamp(0.0, 100.0) as u64);
        bar.set_message(format!(
            "pass {}/{} {:.0} MB {:.1} MB/s",
            snapshot.pass,
            snapshot.total_passes,
            snapshot.bytes_written as f64 / MIB as f64,
            snapshot.speed_mbps
        ));
    }
    bar.finish_and_clear();
}

#[cfg(not(feature = "progress-bars"))]
async fn render_progress(mut rx: mpsc::Receiver<ProgressSnapshot>, _quiet: bool) {
    while let Some(snapshot) = rx.recv().await {
        tracing::debug!(
            pass = snapshot.pass,
            bytes = snapshot.bytes_written,
            percentage = snapshot.percentage,
            "Progress"
        );
    }
}

async fn run_maintenance(
    settings: &AppSettings,
    plan_name: &str,
    dry_run: bool,
    json: bool,
    token: CancelToken,
) -> Result<i32> {
    let Some(plan) = plan_by_name(plan_name) else {
        bail!(
            "unknown plan '{}', expected one of: {}",
            plan_name,
            plan_names().join(", ")
        );
    };

    let executor = SystemPhaseExecutor::new(Arc::new(SysinfoInventory::new()), settings).dry_run(dry_run);
    let report = MaintenanceOrchestrator::new(Arc::new(executor))
        .execute_plan(&plan, token)
        .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!();
        println!(
            "{} {} {}",
            heading("Plan"),
            report.plan_name,
            status_label(&format!("{:?}", report.status), report.status == ReportStatus::Completed)
        );
        for result in &report.phase_results {
            println!(
                "  {:<20} {:<10} {:>10.1} MB  {}",
                result.phase.as_str(),
                format!("{:?}", result.status),
                result.bytes_cleaned as f64 / MIB as f64,
                result.error.as_deref().unwrap_or("")
            );
        }
        println!(
            "  {} completed, {} failed, {} skipped, {:.1} MB cleaned in {}",
            report.success_count,
            report.failure_count,
            report.skipped_count,
            report.total_cleaned as f64 / MIB as f64,
            humantime::format_duration(std::time::Duration::from_secs(report.total_duration.as_secs()))
        );
    }

    Ok(match report.status {
        ReportStatus::Completed => 0,
        ReportStatus::Failed => 1,
        ReportStatus::Partial | ReportStatus::Cancelled => 2,
    })
}

async fn run_verifier(
    inventory: Arc<dyn DiskInventory>,
    op: WipeOperation,
    level: VerificationLevel,
    token: CancelToken,
) -> Result<VerificationReport> {
    let report = tokio::task::spawn_blocking(move || {
        PhysicalVerifier::new(inventory, level).verify(&op, &RunContext::new(token))
    })
    .await
    .context("verification task failed")??;
    Ok(report)
}

async fn verify_operation(
    path: &Path,
    operation: &Path,
    level: VerificationLevel,
    json: bool,
    token: CancelToken,
) -> Result<i32> {
    let raw = std::fs::read_to_string(operation)
        .with_context(|| format!("failed to read {}", operation.display()))?;
    let mut op: WipeOperation = serde_json::from_str(&raw).context("invalid operation record")?;
    op.disk = path.display().to_string();

    let report = run_verifier(Arc::new(SysinfoInventory::new()), op, level, token).await?;
    print_verification(&report, json)?;
    Ok(if report.wipe_verified { 0 } else { 1 })
}

fn print_verification(report: &VerificationReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let verdict = if report.wipe_verified { "VERIFIED" } else { "NOT VERIFIED" };
    println!();
    println!(
        "{} {} ({:.1}%)",
        heading("Verification"),
        status_label(verdict, report.wipe_verified),
        report.success_rate
    );
    println!(
        "  Level: {}  attempts: {}  recovered: {} bytes",
        report.verification_level, report.recovery_attempts, report.recovered_data
    );
    for anomaly in &report.anomalies {
        println!(
            "  [{:?}] {:?} at {}: {}",
            anomaly.severity, anomaly.kind, anomaly.location, anomaly.description
        );
    }
    if !report.compliance.is_empty() {
        let standards: Vec<String> = report.compliance.iter().map(|c| format!("{:?}", c)).collect();
        println!("  Compliance: {}", standards.join(", "));
    }
    Ok(())
}

fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Cancel the shared token on SIGINT/SIGTERM so running work winds down cleanly.
#[cfg(unix)]
fn setup_signal_handlers(token: CancelToken) -> Result<()> {
    use signal_hook::{
        consts::{SIGINT, SIGTERM},
        iterator::Signals,
    };

    let mut signals = Signals::new([SIGINT, SIGTERM])?;

    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            eprintln!("\nSignal {} received, stopping after the current chunk...", sig);
            token.cancel();
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(token: CancelToken) -> Result<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupt received, stopping after the current chunk...");
            token.cancel();
        }
    });
    Ok(())
}

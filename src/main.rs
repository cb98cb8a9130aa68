use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

use seatgrab::acquire::{CommandAcquirer, CommandAcquirerConfig};
use seatgrab::catalog;
use seatgrab::domain::{GrabEvent, GrabTask, Resource, ResourceId, RunStatus, TaskStatus};
use seatgrab::queue::TaskQueue;
use seatgrab::scheduler::Scheduler;

mod cli;
mod config;

use cli::Cli;
use cli::commands::Commands;
use config::Config;

fn setup_logging(default_level: &str) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(env!("CARGO_PKG_NAME"))
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join(format!("{}.log", env!("CARGO_PKG_NAME")));

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

/// Catalog plus the queue rehydrated against it
struct Session {
    catalog: Vec<Resource>,
    queue: Arc<TaskQueue>,
}

fn open_session(config: &Config) -> Result<Session> {
    let catalog = catalog::load(&config.storage.catalog_file)
        .context(format!("Failed to load catalog from {}", config.storage.catalog_file.display()))?;
    let queue = TaskQueue::open(&config.storage.queue_file);
    let report = queue.rebuild_from_catalog(&catalog);
    if report.dropped > 0 {
        println!(
            "{} {} queued task(s) no longer in the catalog were dropped",
            "Note:".yellow(),
            report.dropped
        );
    }
    Ok(Session {
        catalog,
        queue: Arc::new(queue),
    })
}

fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    let session = open_session(config)?;

    match &cli.command {
        Commands::Catalog => handle_catalog_command(&session),
        Commands::Add { id, priority } => handle_add_command(&session, *id, *priority),
        Commands::Remove { id } => handle_remove_command(&session, *id),
        Commands::Priority { id, priority } => handle_priority_command(&session, *id, *priority),
        Commands::List { pending } => handle_list_command(&session, *pending),
        Commands::Status => handle_status_command(&session),
        Commands::ClearCompleted => {
            session.queue.clear_completed();
            println!("{}", "Cleared completed tasks".green());
            Ok(())
        }
        Commands::ResetFailed => {
            session.queue.reset_failed();
            println!("{}", "Failed tasks reset to pending".green());
            Ok(())
        }
        Commands::Run { at, interval } => handle_run_command(session, at.as_deref(), *interval, config),
    }
}

fn colored_status(status: TaskStatus) -> ColoredString {
    match status {
        TaskStatus::Pending => status.as_str().normal(),
        TaskStatus::Running => status.as_str().cyan(),
        TaskStatus::Success => status.as_str().green(),
        TaskStatus::Failed => status.as_str().red(),
    }
}

fn print_task(position: usize, task: &GrabTask) {
    println!(
        "{:>3}. {} (priority {}, {}, attempts {})",
        position,
        task.resource,
        task.priority,
        colored_status(task.status),
        task.attempts
    );
}

fn handle_catalog_command(session: &Session) -> Result<()> {
    if session.catalog.is_empty() {
        println!("{}", "Catalog is empty".yellow());
        return Ok(());
    }
    for resource in &session.catalog {
        let marker = if session.queue.contains(resource.id) {
            "*".green()
        } else {
            " ".normal()
        };
        println!("{} {}", marker, resource);
    }
    Ok(())
}

fn handle_add_command(session: &Session, id: u64, priority: i32) -> Result<()> {
    info!("Adding resource {} with priority {}", id, priority);
    let resource = catalog::find(&session.catalog, ResourceId(id))
        .cloned()
        .ok_or_else(|| eyre!("Resource {} is not in the catalog", id))?;

    if session.queue.add(resource.clone(), priority) {
        println!("{} {}", "Queued:".green(), resource);
    } else {
        println!("{} {} is already queued", "Skipped:".yellow(), resource);
    }
    Ok(())
}

fn handle_remove_command(session: &Session, id: u64) -> Result<()> {
    info!("Removing resource {}", id);
    if session.queue.remove(ResourceId(id)) {
        println!("{} {}", "Removed:".red(), id);
        Ok(())
    } else {
        Err(eyre!("Resource {} is not queued", id))
    }
}

fn handle_priority_command(session: &Session, id: u64, priority: i32) -> Result<()> {
    info!("Setting priority of {} to {}", id, priority);
    if session.queue.update_priority(ResourceId(id), priority) {
        println!("{} {} -> {}", "Priority:".green(), id, priority);
        Ok(())
    } else {
        Err(eyre!("Resource {} is not queued", id))
    }
}

fn handle_list_command(session: &Session, pending_only: bool) -> Result<()> {
    let tasks = if pending_only {
        session.queue.pending()
    } else {
        session.queue.all()
    };
    if tasks.is_empty() {
        println!("{}", "Queue is empty".yellow());
        return Ok(());
    }
    for (i, task) in tasks.iter().enumerate() {
        print_task(i + 1, task);
    }
    Ok(())
}

fn handle_status_command(session: &Session) -> Result<()> {
    let counts = session.queue.counts();
    println!("{} {}", "Total:".bold(), counts.total);
    println!("  {} {}", "pending:".normal(), counts.pending);
    println!("  {} {}", "running:".cyan(), counts.running);
    println!("  {} {}", "success:".green(), counts.success);
    println!("  {} {}", "failed:".red(), counts.failed);
    Ok(())
}

fn handle_run_command(session: Session, at: Option<&str>, interval: Option<f64>, config: &Config) -> Result<()> {
    if config.acquirer.command.trim().is_empty() {
        return Err(eyre!("No acquirer command configured (acquirer.command)"));
    }

    let mut scheduler_config = config.grab.scheduler_config()?;
    if let Some(secs) = interval {
        scheduler_config.grab_interval =
            Duration::try_from_secs_f64(secs).map_err(|e| eyre!("Invalid interval {}: {}", secs, e))?;
    }
    let start_at = at
        .map(|s| cli::parse_start_time(s, config.grab.utc_offset()?))
        .transpose()?;

    let acquirer_config = config.acquirer.env.iter().fold(
        CommandAcquirerConfig::new(config.acquirer.command.clone()).timeout_ms(config.acquirer.timeout_ms),
        |acquirer_config, (key, value)| acquirer_config.env(key.clone(), value.clone()),
    );
    let acquirer = Arc::new(CommandAcquirer::new(acquirer_config));

    let recovered = session.queue.recover_interrupted();
    if recovered > 0 {
        println!(
            "{} {} task(s) interrupted mid-attempt were put back to pending",
            "Note:".yellow(),
            recovered
        );
    }
    let grab_interval = scheduler_config.grab_interval;
    let scheduler = Scheduler::new(session.queue, acquirer, scheduler_config)?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(async {
        let mut events = scheduler.subscribe();
        match start_at {
            Some(target) => scheduler.schedule(target, grab_interval)?,
            None => {
                scheduler.start_immediate();
            }
        }
        drive(&scheduler, &mut events).await;
        Ok::<(), eyre::Report>(())
    })?;

    let status = scheduler.status();
    println!(
        "{} {} succeeded, {} pending, {} failed",
        "Summary:".bold(),
        status.success_count,
        status.pending_count,
        status.failed_count
    );
    Ok(())
}

/// Print events until the scheduler is idle with nothing armed, or Ctrl-C.
async fn drive(scheduler: &Scheduler, events: &mut tokio::sync::broadcast::Receiver<GrabEvent>) {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut idle_check = tokio::time::interval(Duration::from_millis(200));

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(n)) => log::warn!("Dropped {} events", n),
                Err(RecvError::Closed) => break,
            },
            _ = &mut ctrl_c => {
                println!("{}", "Interrupted, stopping...".yellow());
                scheduler.cancel_schedule();
                scheduler.stop().await;
                break;
            }
            _ = idle_check.tick() => {
                if !scheduler.is_running() && scheduler.scheduled_at().is_none() {
                    break;
                }
            }
        }
    }

    while let Ok(event) = events.try_recv() {
        print_event(&event);
    }
}

fn print_event(event: &GrabEvent) {
    match event {
        GrabEvent::Log(line) => println!("{}", line),
        GrabEvent::Status(status) => {
            let label = match status {
                RunStatus::Scheduled => status.to_string().cyan(),
                RunStatus::Grabbing => status.to_string().yellow(),
                RunStatus::Completed => status.to_string().green(),
                RunStatus::Stopped => status.to_string().red(),
            };
            println!("{} {}", "Status:".bold(), label);
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    let level = if cli.is_verbose() {
        "debug"
    } else {
        config.log_level.as_deref().unwrap_or("info")
    };
    setup_logging(level).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    run_application(&cli, &config).context("Application failed")?;

    Ok(())
}

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use chronoflow::board::BoardEvent;
use chronoflow::categorize::{Categorizer, HttpFetcher, SuggestionTracker, TaskDetails};
use chronoflow::cli::{Cli, Command};
use chronoflow::config::Config;
use chronoflow::domain::{NewTask, Task, TaskEdit, TaskStatus, short_id};
use chronoflow::llm::create_client;
use chronoflow::prompts::PromptLoader;
use chronoflow::timer::{PomodoroTimer, TimerPool, TimerState, format_clock};
use chronoflow::TaskBoard;
use kvstore::{FileBackend, Lease, StoreBackend};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .ok_or_else(|| eyre!("Could not determine local data directory"))?
        .join("chronoflow")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("chronoflow.log");
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)
        .context("Failed to open log file")?;

    // CLI flag wins over config, which wins over INFO
    let level_str = cli_log_level.or(config_log_level).unwrap_or("INFO");
    let level = match level_str.to_uppercase().as_str() {
        "TRACE" => tracing::Level::TRACE,
        "DEBUG" => tracing::Level::DEBUG,
        "INFO" => tracing::Level::INFO,
        "WARN" | "WARNING" => tracing::Level::WARN,
        "ERROR" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_writer(file)
        .with_ansi(false)
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!(level = %level, "Logging initialized");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    debug!(command = ?cli.command, "main: dispatching");

    let (board, files) = open_board(&config, cli.store);
    let files = files.as_deref();
    let result = match cli.command {
        Command::Add {
            title,
            description,
            date,
            duration,
            category,
            suggest,
        } => cmd_add(&config, &board, title, description, date, duration, category, suggest).await,
        Command::List { date, all } => cmd_list(&board, if all { None } else { Some(date.unwrap_or_else(today)) }).await,
        Command::Show { id } => cmd_show(&board, &id).await,
        Command::Edit {
            id,
            title,
            description,
            date,
            duration,
            category,
        } => {
            let edit = TaskEdit {
                title,
                description,
                date,
                duration,
                category,
            };
            cmd_edit(&board, &id, edit).await
        }
        Command::Delete { id } => cmd_delete(&board, &id).await,
        Command::Start { id } => cmd_start(&config, &board, files, &id).await,
        Command::Pause { id } => cmd_pause(&board, files, &id).await,
        Command::Reset { id } => cmd_reset(&board, files, &id).await,
        Command::Suggest {
            id,
            title,
            description,
            tags,
            apply,
        } => cmd_suggest(&config, &board, id, title, description, tags, apply).await,
    };

    // Timer progress still queued lands before exit
    if let Err(e) = board.shutdown().await {
        warn!(error = %e, "Task board did not shut down cleanly");
    }
    result
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Open the task store, falling back to an in-memory board
///
/// The file backend is returned too, for taking timer leases.
fn open_board(config: &Config, store: Option<PathBuf>) -> (TaskBoard, Option<Arc<FileBackend>>) {
    let store_dir = store.unwrap_or_else(|| PathBuf::from(&config.storage.store_dir));
    debug!(store_dir = %store_dir.display(), "open_board: called");

    match FileBackend::open(&store_dir) {
        Ok(backend) => {
            let files = Arc::new(backend);
            let backend: Arc<dyn StoreBackend> = files.clone();
            let board = TaskBoard::spawn(config.storage.tasks_key.clone(), Some(backend));
            (board, Some(files))
        }
        Err(e) => {
            warn!(error = %e, "Task store unavailable");
            eprintln!(
                "{} Task store at {} is unavailable ({}); changes will not be saved",
                "⚠".yellow(),
                store_dir.display(),
                e
            );
            (TaskBoard::spawn(config.storage.tasks_key.clone(), None), None)
        }
    }
}

/// Claim a task's countdown for this process
///
/// Only one `cf` process at a time may run or change a task's timer. Without
/// a file store there is nobody to share with.
fn claim_timer(files: Option<&FileBackend>, task: &Task) -> Result<Option<Lease>> {
    let Some(files) = files else {
        return Ok(None);
    };
    match files.try_lease(&format!("timer-{}", task.id))? {
        Some(lease) => Ok(Some(lease)),
        None => Err(eyre!(
            "{} is running in another cf process; pause it there with Ctrl-C",
            task.title
        )),
    }
}

/// Resolve `reference` and claim its timer, returning the freshest record
async fn find_and_claim(board: &TaskBoard, files: Option<&FileBackend>, reference: &str) -> Result<(Task, Option<Lease>)> {
    let found = board.find_task(reference).await?;
    let lease = claim_timer(files, &found)?;
    let task = board
        .get_task(&found.id)
        .await?
        .ok_or_else(|| eyre!("Task {} was deleted", short_id(&found.id)))?;
    Ok((task, lease))
}

fn build_categorizer(config: &Config) -> Result<Categorizer> {
    let llm = create_client(&config.llm).context("Failed to create LLM client")?;
    let fetcher = HttpFetcher::from_config(&config.scrape).context("Failed to create page fetcher")?;
    let prompts = PromptLoader::new(config.prompts.dir.as_ref());
    Ok(Categorizer::new(llm, Arc::new(fetcher), prompts))
}

fn status_label(status: TaskStatus) -> ColoredString {
    match status {
        TaskStatus::Running => "running".green().bold(),
        TaskStatus::NotStarted => "not started".normal(),
        TaskStatus::Completed => "completed".dimmed(),
    }
}

fn print_task_line(task: &Task) {
    println!(
        "{}  {:<11}  {}  {:>3} min  {:<12}  {}",
        short_id(&task.id).cyan(),
        status_label(task.status),
        format_clock(task.remaining_seconds()),
        task.duration,
        task.category,
        task.title
    );
}

#[allow(clippy::too_many_arguments)]
async fn cmd_add(
    config: &Config,
    board: &TaskBoard,
    title: String,
    description: String,
    date: Option<NaiveDate>,
    duration: Option<u32>,
    category: Option<String>,
    suggest: bool,
) -> Result<()> {
    let mut category = category;
    if suggest && category.is_none() {
        let details = TaskDetails::new(title.clone(), description.clone());
        match build_categorizer(config) {
            Ok(categorizer) => match categorizer.categorize_task(&details).await {
                Ok(suggestion) => {
                    println!("{} Suggested category: {}", "→".blue(), suggestion.category.bold());
                    category = Some(suggestion.category);
                }
                Err(e) => eprintln!("{} No suggestion: {}", "⚠".yellow(), e),
            },
            Err(e) => eprintln!("{} No suggestion: {:#}", "⚠".yellow(), e),
        }
    }

    let mut input = NewTask::new(title, date.unwrap_or_else(today)).description(description);
    if let Some(minutes) = duration {
        input = input.duration(minutes);
    }
    if let Some(category) = category {
        input = input.category(category);
    }

    let task = board.add_task(input).await?;
    println!(
        "{} Added {} {} ({} min, {})",
        "✓".green(),
        short_id(&task.id).cyan(),
        task.title.bold(),
        task.duration,
        task.category
    );
    Ok(())
}

async fn cmd_list(board: &TaskBoard, date: Option<NaiveDate>) -> Result<()> {
    let tasks = board.list_tasks(date).await?;
    if tasks.is_empty() {
        match date {
            Some(date) => println!("No tasks for {}", date),
            None => println!("No tasks found"),
        }
        return Ok(());
    }

    if let Some(date) = date {
        println!("{}", date.format("%A, %B %-d, %Y").to_string().bold());
    }
    for task in &tasks {
        if date.is_none() {
            print!("{}  ", task.date);
        }
        print_task_line(task);
    }

    let total: u32 = tasks.iter().map(|t| t.duration).sum();
    let done = tasks.iter().filter(|t| t.status == TaskStatus::Completed).count();
    println!("{} of {} completed, {} min planned", done, tasks.len(), total);
    Ok(())
}

async fn cmd_show(board: &TaskBoard, reference: &str) -> Result<()> {
    let task = board.find_task(reference).await?;
    println!("{}", task.title.bold());
    println!("  id:        {}", task.id);
    println!("  date:      {}", task.date);
    println!("  category:  {}", task.category);
    println!("  status:    {}", status_label(task.status));
    println!(
        "  time left: {} of {}",
        format_clock(task.remaining_seconds()),
        format_clock(task.full_seconds())
    );
    if !task.description.is_empty() {
        println!();
        println!("{}", task.description);
    }
    Ok(())
}

async fn cmd_edit(board: &TaskBoard, reference: &str, edit: TaskEdit) -> Result<()> {
    if edit.is_empty() {
        return Err(eyre!("Nothing to change; pass at least one field"));
    }
    let task = board.find_task(reference).await?;
    let task = board.edit_task(&task.id, edit).await?;
    println!("{} Updated {}", "✓".green(), short_id(&task.id).cyan());
    print_task_line(&task);
    Ok(())
}

async fn cmd_delete(board: &TaskBoard, reference: &str) -> Result<()> {
    let task = board.find_task(reference).await?;
    let task = board.delete_task(&task.id).await?;
    println!("{} Deleted {} {}", "✓".green(), short_id(&task.id).cyan(), task.title);
    Ok(())
}

async fn cmd_start(config: &Config, board: &TaskBoard, files: Option<&FileBackend>, reference: &str) -> Result<()> {
    let (task, _lease) = find_and_claim(board, files, reference).await?;
    if task.status == TaskStatus::Completed {
        println!(
            "{} {} is already completed; it restarts from {}",
            "→".blue(),
            task.title,
            format_clock(task.full_seconds())
        );
    }

    let mut events = board.subscribe();
    let pool = TimerPool::new(Arc::new(board.clone()), config.timer.tick());
    let handle = pool.mount(task.clone());
    if !handle.is_available() {
        return Err(eyre!("Timer could not be scheduled"));
    }
    if !matches!(handle.snapshot().state, TimerState::Running { .. }) {
        handle.toggle()?;
    }

    println!("{} {} (Ctrl-C pauses)", "▶".green(), task.title.bold());
    let mut snapshots = handle.subscribe();
    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                match snapshot.state {
                    TimerState::Completed => {
                        println!("\r{} {} completed", "✓".green(), task.title.bold());
                        break;
                    }
                    state => print!("\r  {}  ", format_clock(state.remaining())),
                }
                std::io::stdout().flush().ok();
            }
            event = events.recv() => match event {
                Ok(BoardEvent::Edited(edited)) if edited.id == task.id => {
                    handle.sync(edited)?;
                }
                Ok(BoardEvent::Deleted(id)) if id == task.id => {
                    println!("\r{} Task was deleted", "✗".red());
                    break;
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!(task_id = %task.id, "Interrupted, pausing timer");
                if matches!(handle.snapshot().state, TimerState::Running { .. }) {
                    handle.toggle()?;
                    let paused = handle
                        .wait_until(|s| !matches!(s.state, TimerState::Running { .. }))
                        .await?;
                    println!("\r{} Paused at {}", "⏸".yellow(), paused.clock());
                }
                break;
            }
        }
    }

    handle.unmount();
    // Progress queued by the timer lands before the lease is released
    board.get_task(&task.id).await?;
    Ok(())
}

async fn cmd_pause(board: &TaskBoard, files: Option<&FileBackend>, reference: &str) -> Result<()> {
    let (task, _lease) = find_and_claim(board, files, reference).await?;
    let mut timer = PomodoroTimer::mount(task);
    if !timer.is_running() {
        println!("{} is not running", timer.task().title);
        return Ok(());
    }

    if let Some(update) = timer.toggle() {
        board.update_task(update).await?;
    }
    println!("{} Paused at {}", "⏸".yellow(), format_clock(timer.remaining()));
    Ok(())
}

async fn cmd_reset(board: &TaskBoard, files: Option<&FileBackend>, reference: &str) -> Result<()> {
    let (task, _lease) = find_and_claim(board, files, reference).await?;
    let mut timer = PomodoroTimer::mount(task);
    if let Some(update) = timer.reset() {
        board.update_task(update).await?;
    }
    println!(
        "{} Reset {} to {}",
        "✓".green(),
        timer.task().title,
        format_clock(timer.remaining())
    );
    Ok(())
}

async fn cmd_suggest(
    config: &Config,
    board: &TaskBoard,
    reference: Option<String>,
    title: Option<String>,
    description: Option<String>,
    tags: Vec<String>,
    apply: bool,
) -> Result<()> {
    if apply && reference.is_none() {
        return Err(eyre!("--apply needs a task ID to store the category on"));
    }
    let stored = match &reference {
        Some(reference) => Some(board.find_task(reference).await?),
        None => None,
    };
    let details = match (&stored, title) {
        (Some(task), _) => TaskDetails::new(task.title.clone(), task.description.clone()),
        (None, Some(title)) => TaskDetails::new(title, description.unwrap_or_default()),
        (None, None) => return Err(eyre!("Give a task ID or --title")),
    }
    .with_tags(tags);

    let categorizer = build_categorizer(config)?;
    let tracker = SuggestionTracker::new();
    let ticket = tracker.issue();

    let suggestion = tokio::select! {
        result = categorizer.suggest_details(&details) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracker.abandon();
            info!("Suggestion abandoned");
            return Ok(());
        }
    };
    let Some(suggestion) = ticket.accept(suggestion) else {
        return Ok(());
    };

    println!("{} {}", "Category:".bold(), suggestion.category);
    if !suggestion.tags.is_empty() {
        let tags: Vec<String> = suggestion.tags.iter().map(|t| format!("#{}", t)).collect();
        println!("{} {}", "Tags:".bold(), tags.join(" "));
    }

    if apply && let Some(task) = stored {
        let edit = TaskEdit {
            category: Some(suggestion.category),
            ..Default::default()
        };
        let task = board.edit_task(&task.id, edit).await?;
        println!("{} Category of {} set to {}", "✓".green(), short_id(&task.id).cyan(), task.category);
    }
    Ok(())
}

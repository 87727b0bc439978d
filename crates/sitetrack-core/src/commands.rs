use std::sync::Arc;

use anyhow::{Context, anyhow};
use chrono::{Local, NaiveDate, TimeDelta, Utc};
use tracing::{debug, info, instrument, warn};

use crate::cli::Invocation;
use crate::config::SyncSettings;
use crate::engine::SyncEngine;
use crate::filter::{TaskFilter, areas};
use crate::render::Renderer;
use crate::stats::{Stats, overall_progress, progress};
use crate::task::{Priority, Task, TaskDraft, parse_deadline};

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "list", "info", "add", "modify", "done", "comment", "sync", "watch", "stats", "areas",
        "export", "reset", "help", "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

/// Commands that work on the task list and so need the startup load first.
pub fn needs_task_list(command: &str) -> bool {
    !matches!(command, "reset" | "help" | "version")
}

/// Commands that change tasks locally and push them.
pub fn mutates_tasks(command: &str) -> bool {
    matches!(command, "add" | "modify" | "done" | "comment")
}

#[instrument(skip(engine, settings, renderer, inv))]
pub async fn dispatch(
    engine: &Arc<SyncEngine>,
    settings: &SyncSettings,
    renderer: &mut Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    let today = Local::now().date_naive();
    let command = inv.command.as_str();
    let args = inv.args.as_slice();

    debug!(command, ?args, "dispatching command");

    match command {
        "list" => cmd_list(engine, renderer, args, today),
        "info" => cmd_info(engine, renderer, args),
        "add" => cmd_add(engine, args, today).await,
        "modify" => cmd_modify(engine, args, today).await,
        "done" => cmd_done(engine, args).await,
        "comment" => cmd_comment(engine, args).await,
        "sync" => cmd_sync(engine).await,
        "watch" => cmd_watch(engine, settings).await,
        "stats" => cmd_stats(engine, settings, renderer, today),
        "areas" => cmd_areas(engine, renderer),
        "export" => cmd_export(engine, args),
        "reset" => cmd_reset(engine),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

#[instrument(skip(engine, renderer, args, today))]
fn cmd_list(
    engine: &SyncEngine,
    renderer: &mut Renderer,
    args: &[String],
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command list");
    let filter = TaskFilter::parse(args)?;
    let rows = filter.apply(&engine.tasks());
    debug!(shown = rows.len(), "filtered task list");
    renderer.print_task_table(&rows, today)
}

#[instrument(skip(engine, renderer, args))]
fn cmd_info(engine: &SyncEngine, renderer: &mut Renderer, args: &[String]) -> anyhow::Result<()> {
    info!("command info");
    let (id, _) = split_target(args, "info")?;
    let task = find_task(engine, id)?;
    renderer.print_task_info(&task)
}

#[instrument(skip(engine, args, today))]
async fn cmd_add(engine: &SyncEngine, args: &[String], today: NaiveDate) -> anyhow::Result<()> {
    info!("command add");

    let (description, mods) = parse_desc_and_mods(args, today)?;
    let mut draft = TaskDraft {
        description: description.unwrap_or_default(),
        ..TaskDraft::default()
    };
    apply_mods(&mut draft, mods);

    let (task, pushed) = engine.create_and_push(draft, Utc::now()).await?;
    if let Err(err) = pushed {
        debug!(error = %err, "push after add did not reach the sheet");
    }
    println!("Created task {}.", task.id);
    Ok(())
}

#[instrument(skip(engine, args, today))]
async fn cmd_modify(engine: &SyncEngine, args: &[String], today: NaiveDate) -> anyhow::Result<()> {
    info!("command modify");

    let (id, rest) = split_target(args, "modify")?;
    let current = find_task(engine, id)?;
    let (description, mods) = parse_desc_and_mods(rest, today)?;
    if description.is_none() && mods.is_empty() {
        return Err(anyhow!("modify: nothing to change"));
    }

    let mut draft = TaskDraft::from_task(&current);
    if let Some(description) = description {
        draft.description = description;
    }
    apply_mods(&mut draft, mods);

    let (task, pushed) = engine.update_and_push(&current.id, draft).await?;
    if let Err(err) = pushed {
        debug!(error = %err, "push after modify did not reach the sheet");
    }
    println!("Modified task {}.", task.id);
    Ok(())
}

#[instrument(skip(engine, args))]
async fn cmd_done(engine: &SyncEngine, args: &[String]) -> anyhow::Result<()> {
    info!("command done");

    let (id, _) = split_target(args, "done")?;
    let (task, push) = engine.toggle_and_push(id)?;
    println!(
        "Task {} is now {}.",
        task.id,
        if task.completed { "completed" } else { "open" }
    );
    finish_push(push).await;
    Ok(())
}

#[instrument(skip(engine, args))]
async fn cmd_comment(engine: &SyncEngine, args: &[String]) -> anyhow::Result<()> {
    info!("command comment");

    let (id, rest) = split_target(args, "comment")?;
    if rest.is_empty() {
        return Err(anyhow!("comment requires text argument"));
    }
    let (task, push) = engine.comment_and_push(id, &rest.join(" "), Utc::now())?;
    println!("Task {} has {} comment(s).", task.id, task.comments.len());
    finish_push(push).await;
    Ok(())
}

async fn finish_push(push: crate::engine::BackgroundPush) {
    if push.was_rejected() {
        return;
    }
    if let Err(err) = push.finish().await {
        debug!(error = %err, "background push did not reach the sheet");
    }
}

#[instrument(skip(engine))]
async fn cmd_sync(engine: &SyncEngine) -> anyhow::Result<()> {
    info!("command sync");
    let report = engine.sync().await?;
    println!("Pulled {} task(s).", report.count);
    Ok(())
}

#[instrument(skip(engine, settings))]
async fn cmd_watch(engine: &Arc<SyncEngine>, settings: &SyncSettings) -> anyhow::Result<()> {
    info!(
        interval_secs = settings.auto_interval.as_secs(),
        "command watch"
    );

    println!(
        "Syncing every {}s; press Ctrl-C to stop.",
        settings.auto_interval.as_secs()
    );
    let ticker = engine.spawn_auto_sync(settings.auto_interval);
    let stopped = tokio::signal::ctrl_c().await;
    ticker.abort();
    stopped.context("failed to listen for Ctrl-C")?;

    info!("watch stopped");
    Ok(())
}

#[instrument(skip(engine, settings, renderer, today))]
fn cmd_stats(
    engine: &SyncEngine,
    settings: &SyncSettings,
    renderer: &mut Renderer,
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command stats");

    let tasks = engine.tasks();
    let stats = Stats::compute(&tasks, today);
    let mut bars: Vec<_> = settings
        .progress_areas
        .iter()
        .map(|needle| progress(&tasks, needle))
        .collect();
    bars.push(overall_progress(&tasks));

    renderer.print_stats(&stats, &bars)
}

#[instrument(skip(engine, renderer))]
fn cmd_areas(engine: &SyncEngine, renderer: &mut Renderer) -> anyhow::Result<()> {
    info!("command areas");
    renderer.print_lines(&areas(&engine.tasks()))
}

#[instrument(skip(engine, args))]
fn cmd_export(engine: &SyncEngine, args: &[String]) -> anyhow::Result<()> {
    info!("command export");
    let filter = TaskFilter::parse(args)?;
    let rows = filter.apply(&engine.tasks());
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

#[instrument(skip(engine))]
fn cmd_reset(engine: &SyncEngine) -> anyhow::Result<()> {
    info!("command reset");
    engine.cache().clear()?;
    engine.reset();
    println!("Local cache cleared.");
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!(
        "Usage: sitetrack [options] [command] [args]\n\
         \n\
         Commands:\n  \
         list [filters]          show tasks (default)\n  \
         info <id>               show one task with its comments\n  \
         add <text> [mods]       create a task\n  \
         modify <id> [mods]      edit a task\n  \
         done <id>               toggle completion\n  \
         comment <id> <text>     add a comment\n  \
         sync                    pull the sheet now\n  \
         watch                   keep pulling on the configured interval\n  \
         stats                   counters and progress\n  \
         areas                   distinct areas\n  \
         export [filters]        JSON dump\n  \
         reset                   clear the local cache\n\
         \n\
         Filters: area:<x> priority:<low|medium|high> status:<completed|pending> <search words>\n\
         Modifiers: area:<x> status:<x> due:<YYYY-MM-DD|today|tomorrow|+Nd> priority:<p> notes:<x> done:<yes|no>"
    );
    Ok(())
}

fn split_target<'a>(args: &'a [String], command: &str) -> anyhow::Result<(&'a str, &'a [String])> {
    match args.split_first() {
        Some((id, rest)) => Ok((id.as_str(), rest)),
        None => Err(anyhow!("{command} requires a task id")),
    }
}

fn find_task(engine: &SyncEngine, id: &str) -> anyhow::Result<Task> {
    engine
        .task(id)
        .ok_or_else(|| anyhow!("no task with id {id}"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mod {
    Area(String),
    Status(String),
    Due(NaiveDate),
    Priority(Priority),
    Notes(String),
    Completed(bool),
}

/// Splits arguments into free description words and `key:value` modifiers.
/// Everything after `--` is description.
fn parse_desc_and_mods(
    args: &[String],
    today: NaiveDate,
) -> anyhow::Result<(Option<String>, Vec<Mod>)> {
    let mut desc_parts = Vec::new();
    let mut mods = Vec::new();

    let mut literal = false;
    for arg in args {
        if arg == "--" {
            literal = true;
            continue;
        }

        if !literal && let Some(one_mod) = parse_one_mod(arg, today)? {
            mods.push(one_mod);
            continue;
        }

        desc_parts.push(arg.as_str());
    }

    let description = if desc_parts.is_empty() {
        None
    } else {
        Some(desc_parts.join(" "))
    };
    Ok((description, mods))
}

fn parse_one_mod(tok: &str, today: NaiveDate) -> anyhow::Result<Option<Mod>> {
    let Some((key, value)) = tok.split_once(':') else {
        return Ok(None);
    };

    match key.to_ascii_lowercase().as_str() {
        "area" => Ok(Some(Mod::Area(value.to_string()))),
        "status" => Ok(Some(Mod::Status(value.to_string()))),
        "notes" => Ok(Some(Mod::Notes(value.to_string()))),
        "pri" | "priority" => {
            let priority = Priority::parse_strict(value)
                .ok_or_else(|| anyhow!("unknown priority: {value}"))?;
            Ok(Some(Mod::Priority(priority)))
        }
        "due" => Ok(Some(Mod::Due(parse_due(value, today)?))),
        "done" => Ok(Some(Mod::Completed(parse_done(value)?))),
        _ => {
            warn!(token = %tok, "unrecognized modifier treated as description");
            Ok(None)
        }
    }
}

fn apply_mods(draft: &mut TaskDraft, mods: Vec<Mod>) {
    for one_mod in mods {
        match one_mod {
            Mod::Area(area) => draft.area = area,
            Mod::Status(status) => draft.status = status,
            Mod::Due(date) => draft.deadline = Some(date),
            Mod::Priority(priority) => draft.priority = priority,
            Mod::Notes(notes) => draft.notes = notes,
            Mod::Completed(done) => draft.completed = done,
        }
    }
}

fn parse_done(raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "yes" | "y" | "true" | "1" => Ok(true),
        "no" | "n" | "false" | "0" => Ok(false),
        other => Err(anyhow!("invalid done value: {other} (use yes or no)")),
    }
}

/// `YYYY-MM-DD`, `today`, `tomorrow` or `+Nd`.
fn parse_due(raw: &str, today: NaiveDate) -> anyhow::Result<NaiveDate> {
    let lower = raw.trim().to_ascii_lowercase();
    let days = match lower.as_str() {
        "today" => Some(0),
        "tomorrow" => Some(1),
        other => other
            .strip_prefix('+')
            .and_then(|s| s.strip_suffix('d'))
            .map(|n| {
                n.parse::<i64>()
                    .with_context(|| format!("invalid relative date: {raw}"))
            })
            .transpose()?,
    };

    if let Some(days) = days {
        return TimeDelta::try_days(days)
            .and_then(|delta| today.checked_add_signed(delta))
            .ok_or_else(|| anyhow!("invalid relative date: {raw} (out of range)"));
    }

    parse_deadline(raw).ok_or_else(|| anyhow!("invalid date: {raw} (expected YYYY-MM-DD)"))
}

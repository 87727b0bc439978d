pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod guard;
pub mod notify;
pub mod remote;
pub mod render;
pub mod sheet;
pub mod stats;
pub mod task;

use std::ffi::OsString;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};

use crate::config::PushMode;
use crate::notify::{LogNotifier, Notifier};
use crate::remote::{ScriptWriter, SheetBackend, SheetWriter, SheetsClient, TaskWriter};

#[tracing::instrument(skip_all)]
pub fn run(raw_args: Vec<OsString>) -> anyhow::Result<()> {
    let pre = cli::preprocess_args(&raw_args)?;
    let cli = cli::GlobalCli::parse_from(pre.cleaned_args);

    cli::init_tracing(cli.verbose, cli.quiet)?;

    info!(
        verbose = cli.verbose,
        quiet = cli.quiet,
        "starting sitetrack CLI"
    );
    debug!(?pre.rc_overrides, "preprocessed rc overrides");

    let mut cfg = config::Config::load(cli.config.as_deref())?;
    cfg.apply_overrides(
        pre.rc_overrides
            .into_iter()
            .chain(cli.rc_overrides.into_iter().map(|kv| (kv.key, kv.value))),
    );
    let settings = config::SyncSettings::from_config(&cfg)?;

    let data_dir = config::resolve_data_dir(&cfg, cli.data.as_deref())
        .context("failed to resolve data directory")?;
    let cache = cache::LocalCache::open(&data_dir)
        .with_context(|| format!("failed to open cache at {}", data_dir.display()))?;

    let backend: Arc<dyn SheetBackend> = Arc::new(SheetsClient::new(settings.sheets.clone())?);
    let writer: Arc<dyn TaskWriter> = match settings.push_mode {
        PushMode::Sheet => Arc::new(SheetWriter::new(backend.clone())),
        PushMode::Script => Arc::new(ScriptWriter::new(
            settings.script_url.clone(),
            settings.sheets.timeout,
        )?),
    };
    debug!(push_mode = ?settings.push_mode, "selected push strategy");

    let notifier: Arc<dyn Notifier> = if cli.quiet > 0 {
        Arc::new(LogNotifier)
    } else {
        Arc::new(render::ConsoleNotifier::new(&cfg))
    };
    let engine = Arc::new(engine::SyncEngine::new(cache, backend, writer, notifier));

    let mut renderer = render::Renderer::new(&cfg)?;
    let inv = cli::Invocation::parse(cli.rest);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(async {
        let mut startup = if commands::needs_task_list(&inv.command) {
            let startup = engine.start().await;
            debug!(source = ?startup.source, "task list loaded");
            Some(startup)
        } else {
            None
        };
        if commands::mutates_tasks(&inv.command)
            && let Some(startup) = startup.as_mut()
        {
            startup.settle().await;
        }

        let auto = (settings.auto_sync && inv.command != "watch")
            .then(|| engine.spawn_auto_sync(settings.auto_interval));

        let outcome = commands::dispatch(&engine, &settings, &mut renderer, inv).await;

        if let Some(auto) = auto {
            auto.abort();
        }
        if let Some(mut startup) = startup {
            startup.settle().await;
        }

        outcome
    })?;

    info!("done");
    Ok(())
}

//! `cadence`: play a file, a search result, or the whole library under a queue policy.

use std::sync::Arc;

use anyhow::{Context, Result};
use cadence::catalog::{Catalog, CatalogError, SymphoniaProber, TrackRecord};
use cadence::cli::{Args, Target};
use cadence::config::Config;
use cadence::controller::{Controller, ControllerConfig};
use cadence::playback::Playback;
use cadence::sequencer::Sequencer;
use cadence::session::{self, SessionCommand, SessionHandle};
use cadence_player::{ClockTime, Player, PlayerConfig};
use clap::Parser;

fn main() -> Result<()> {
    let args = Args::parse();

    if args.list_devices {
        for name in cadence_player::device::output_device_names()? {
            println!("{name}");
        }
        return Ok(());
    }

    let cfg = Config::load_or_init(args.config.as_deref())?;
    let log_rx = cadence::logging::init(&cfg.system.log_file, &cfg.system.log_level)?;
    tracing::info!(version = cadence::VERSION, "starting");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;

    let player = Player::new(PlayerConfig {
        buffer_seconds: cfg.playback.buffer_seconds,
        device: args.device.clone().or_else(|| cfg.playback.device.clone()),
        initial_volume: cfg.playback.volume,
        ..PlayerConfig::default()
    })
    .context("start player")?;
    let playback: Arc<dyn Playback> = Arc::new(player);

    let catalog = Catalog::open(&cfg.library.database_path, Arc::new(SymphoniaProber))
        .with_context(|| format!("open catalog {:?}", cfg.library.database_path))?;

    let policy = args.policy.unwrap_or(cfg.playback.policy);
    let controller = Controller::new(
        Sequencer::new(catalog.clone(), policy),
        playback.clone(),
        ControllerConfig {
            seek_step: ClockTime::from_secs_f64(cfg.playback.seek_step_secs),
            fade: ClockTime::from_secs_f64(cfg.playback.fade_secs),
        },
    );

    let (ev_tx, ev_rx) = crossbeam_channel::unbounded();
    let (handle, session_task) = session::spawn_session(runtime.handle(), controller, ev_tx);

    runtime.block_on(start(&args, &cfg, &catalog, &handle))?;

    let quit = handle.clone();
    let res = cadence::ui::run_tui(playback, handle, ev_rx, log_rx, cfg.appearance.clone());
    // Already gone after a normal exit; needed when the UI itself failed.
    let _ = quit.send(SessionCommand::Quit);
    if let Err(e) = runtime.block_on(session_task) {
        tracing::warn!("session task: {e}");
    }
    res
}

/// Queue up whatever the command line asked for and kick off playback.
async fn start(args: &Args, cfg: &Config, catalog: &Catalog, session: &SessionHandle) -> Result<()> {
    let send = |cmd: SessionCommand| session.send(cmd).context("session task stopped");

    match args.target() {
        Target::File(path) => {
            let path = std::fs::canonicalize(&path).unwrap_or(path);
            let key = path.to_string_lossy().into_owned();
            let track = match catalog.track_by_path(&key).await {
                Ok(track) => track,
                Err(CatalogError::NotExactlyOne { .. }) => TrackRecord::new(key),
                Err(e) => return Err(e).context("look up target file"),
            };
            send(SessionCommand::Enqueue(vec![track]))?;
            send(SessionCommand::Next)?;
            spawn_index(args, cfg, catalog, session);
        }
        Target::Search(query) => {
            if !args.no_index {
                catalog.index_roots(&cfg.library.index_paths).await;
            }
            let hits = catalog
                .search(&query)
                .await
                .with_context(|| format!("search {query:?}"))?;
            tracing::info!(query = %query, count = hits.len(), "search");
            anyhow::ensure!(!hits.is_empty(), "no tracks match {query:?}");
            send(SessionCommand::Enqueue(hits))?;
            send(SessionCommand::Next)?;
        }
        Target::Dynamic => {
            send(SessionCommand::Next)?;
            spawn_index(args, cfg, catalog, session);
        }
    }
    Ok(())
}

fn spawn_index(args: &Args, cfg: &Config, catalog: &Catalog, session: &SessionHandle) {
    if args.no_index {
        return;
    }
    let catalog = catalog.clone();
    let roots = cfg.library.index_paths.clone();
    let session = session.clone();
    tokio::spawn(async move {
        let report = catalog.index_roots(&roots).await;
        let _ = session.send(SessionCommand::IndexFinished(report));
    });
}

use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use finder_core::{sorted_by_followers, update, AppState, AppViewModel, Msg, SessionState};
use finder_engine::{
    export_results, CredentialStore, Credentials, ExportOptions, HttpCatalogConnector,
    JsonFileCredentialStore, Pipeline,
};
use finder_logging::{finder_info, finder_warn};
use log::LevelFilter;

use super::effects::{to_record, EffectRunner, RunOutputs};
use super::render::{results_table, ProgressRenderer};
use super::{logging, settings};
use crate::cli::{Cli, OutputMode};

const TICK_INTERVAL: Duration = Duration::from_millis(75);

pub fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    logging::initialize(cli.log, &cli.log_file, level);

    let mut app_settings = settings::load(&cli.settings)?;
    app_settings.apply_cli(&cli);
    if cli.save_settings {
        settings::save(&cli.settings, &app_settings)?;
    }

    let store = JsonFileCredentialStore::new(&app_settings.credentials_path);
    if cli.save_credentials {
        return save_credentials(&store, &cli);
    }
    if cli.show_credentials {
        return show_credentials(&store);
    }

    let pipeline = Pipeline::new(
        app_settings.pipeline_config(),
        Arc::new(store),
        Arc::new(HttpCatalogConnector::new(app_settings.catalog_settings())),
    );
    let outputs = RunOutputs {
        stream_to: cli.stream_to.clone(),
        text_to_stdout: cli.output == OutputMode::Text,
    };

    let (msg_tx, msg_rx) = mpsc::channel::<Msg>();
    let mut runner = EffectRunner::new(pipeline, msg_tx.clone(), outputs);
    spawn_interrupt_listener(msg_tx.clone())?;

    // Background tick to throttle rendering.
    let tick_tx = msg_tx.clone();
    thread::spawn(move || {
        while tick_tx.send(Msg::Tick).is_ok() {
            thread::sleep(TICK_INTERVAL);
        }
    });

    let _ = msg_tx.send(Msg::GenresChanged(app_settings.genres.join(", ")));
    let _ = msg_tx.send(Msg::SearchClicked);
    drop(msg_tx);

    let mut renderer = ProgressRenderer::new(io::stderr());
    let mut state = AppState::new();
    let mut started = false;

    let view = loop {
        let msg = msg_rx
            .recv()
            .context("message channel closed before the search finished")?;
        let is_tick = matches!(msg, Msg::Tick);
        let is_search = matches!(msg, Msg::SearchClicked);

        let (next, effects) = update(state, msg);
        state = next;
        runner.enqueue(effects);

        let session = state.session();
        started |= is_search && session.is_active();
        let settled = !session.is_active() && (started || is_search);

        if (is_tick || settled) && state.consume_dirty() {
            renderer.render(&state.view())?;
        }
        if settled {
            break state.view();
        }
    };
    renderer.end_progress()?;

    if cli.output == OutputMode::Table && !view.rows.is_empty() {
        let mut stdout = io::stdout().lock();
        stdout.write_all(results_table(&sorted_by_followers(&view.rows)).as_bytes())?;
        stdout.flush()?;
    }
    if let Some(dir) = &app_settings.export_dir {
        export_view(dir, &view)?;
    }

    Ok(exit_code(&view))
}

fn show_credentials(store: &JsonFileCredentialStore) -> anyhow::Result<ExitCode> {
    let credentials = store
        .load()
        .with_context(|| format!("could not read credentials from {:?}", store.path()))?;
    println!("Client ID:     {}", credentials.client_id);
    println!("Client Secret: {}", credentials.masked_secret());
    println!(
        "Redirect URI:  {}",
        credentials.redirect_uri.as_deref().unwrap_or("(none)")
    );
    Ok(ExitCode::SUCCESS)
}

fn save_credentials(store: &JsonFileCredentialStore, cli: &Cli) -> anyhow::Result<ExitCode> {
    let mut credentials = Credentials::new(
        cli.client_id.clone().unwrap_or_default(),
        cli.client_secret.clone().unwrap_or_default(),
    );
    credentials.redirect_uri = cli.redirect_uri.clone();
    let path = store.save(&credentials)?;
    finder_info!("Credentials saved to {:?}", path);
    println!("Credentials saved to {}", path.display());
    Ok(ExitCode::SUCCESS)
}

/// Turns Ctrl-C into `StopClicked`; the core ignores repeats while stopping.
fn spawn_interrupt_listener(msg_tx: mpsc::Sender<Msg>) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build signal runtime")?;
    thread::Builder::new()
        .name("finder-interrupt".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                while tokio::signal::ctrl_c().await.is_ok() {
                    finder_info!("Interrupt received");
                    if msg_tx.send(Msg::StopClicked).is_err() {
                        break;
                    }
                }
            });
        })
        .context("failed to spawn signal listener")?;
    Ok(())
}

fn export_view(dir: &std::path::Path, view: &AppViewModel) -> anyhow::Result<()> {
    let records: Vec<_> = sorted_by_followers(&view.rows)
        .iter()
        .map(to_record)
        .collect();
    let options = ExportOptions {
        generated_utc: Utc::now().to_rfc3339(),
        ..ExportOptions::default()
    };
    let summary = export_results(dir, &records, &options)
        .with_context(|| format!("failed to export results to {:?}", dir))?;
    eprintln!(
        "Exported {} playlists to {}",
        summary.record_count,
        summary.output_path.display()
    );
    Ok(())
}

fn exit_code(view: &AppViewModel) -> ExitCode {
    match view.session {
        SessionState::Completed => ExitCode::SUCCESS,
        SessionState::Cancelled => ExitCode::from(130),
        SessionState::Failed => ExitCode::from(1),
        SessionState::Idle | SessionState::Running | SessionState::Stopping => {
            finder_warn!("Search did not start: {:?}", view.status);
            ExitCode::from(2)
        }
    }
}

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

pub mod commands;
pub mod plugins;
pub mod services;

use commands::{parse_command, CommandError, Reply, TerminalRenderer, Workspace};
use plugins::store::{shared, EntityStore, JsonFileBacking, KeyValueBacking, PersistError};
use services::ai::{ReqwestTransport, SessionController, SessionError};
use services::config::{EnvDefaults, SettingsStore};
use services::export::TarGzExporter;
use services::render::Renderer;

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Directory holding `state.json`.
    pub data_dir: PathBuf,
    /// Model id to select before the first prompt.
    pub model: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Storage unavailable: {0}")]
    Persist(#[from] PersistError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Command(#[from] CommandError),
}

pub fn run(options: RunOptions) -> Result<(), AppError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run_repl(options))
}

fn build_workspace(options: &RunOptions) -> Result<Workspace, AppError> {
    let backing: Arc<dyn KeyValueBacking> = Arc::new(JsonFileBacking::open(&options.data_dir)?);
    let renderer: Arc<dyn Renderer> = Arc::new(TerminalRenderer::new());

    let mut store = EntityStore::load(backing.clone(), renderer.clone());
    store.bootstrap();
    let store = shared(store);

    let settings = Arc::new(SettingsStore::load(backing, &EnvDefaults::from_env()));
    if let Some(model) = options.model.as_deref() {
        settings.set_model(model)?;
    }

    let session = SessionController::new(
        store.clone(),
        settings.clone(),
        Arc::new(ReqwestTransport::default()),
        renderer.clone(),
    );

    Ok(Workspace::new(
        store,
        settings,
        session,
        Box::new(TarGzExporter),
        renderer,
    ))
}

fn prompt() {
    let mut out = std::io::stdout().lock();
    let _ = write!(out, "> ");
    let _ = out.flush();
}

async fn run_repl(options: RunOptions) -> Result<(), AppError> {
    let workspace = build_workspace(&options)?;
    log::info!("Data directory: {}", options.data_dir.display());
    println!("Agent Studio. Type /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt();
        // Ctrl-C at the prompt exits; during a reply it only stops the stream.
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                println!("! {message}");
                continue;
            }
        };

        let execution = workspace.execute(command);
        tokio::pin!(execution);
        let result = loop {
            tokio::select! {
                result = &mut execution => break result,
                _ = tokio::signal::ctrl_c() => {
                    if !workspace.cancel() {
                        log::debug!("Ctrl-C with nothing to cancel");
                    }
                }
            }
        };

        match result {
            Ok(Reply::Quit) => break,
            Ok(Reply::Lines(output)) => {
                for text in output {
                    println!("{text}");
                }
            }
            // Already shown as a status line.
            Err(CommandError::Session(SessionError::MissingCredential { .. })) => {}
            Err(err) => println!("! {err}"),
        }
    }

    workspace.shutdown()?;
    Ok(())
}

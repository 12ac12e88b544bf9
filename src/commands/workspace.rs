//! Executes parsed commands against the store, settings and session.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use crate::plugins::store::{lock_store, PersistError, SharedStore, StoreError};
use crate::services::ai::{SessionController, SessionError, SessionOutcome};
use crate::services::composer::{Attachment, Composer};
use crate::services::config::SettingsStore;
use crate::services::export::{ExportError, ProjectExporter};
use crate::services::render::{RenderEvent, Renderer};

use super::parse::{Command, HELP_TEXT};

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Session(#[from] SessionError),
    #[error("Settings not saved: {0}")]
    Persist(#[from] PersistError),
    #[error("{0}")]
    Export(#[from] ExportError),
    #[error("Cannot read attachment: {0}")]
    Attachment(#[from] std::io::Error),
}

/// What the REPL should do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Lines(Vec<String>),
    Quit,
}

impl Reply {
    fn line(text: impl Into<String>) -> Self {
        Self::Lines(vec![text.into()])
    }

    fn none() -> Self {
        Self::Lines(Vec::new())
    }
}

pub struct Workspace {
    store: SharedStore,
    settings: Arc<SettingsStore>,
    session: SessionController,
    exporter: Box<dyn ProjectExporter>,
    renderer: Arc<dyn Renderer>,
    composer: Mutex<Composer>,
}

fn marker(active: bool) -> &'static str {
    if active { "*" } else { " " }
}

fn on_off(flag: bool) -> &'static str {
    if flag { "on" } else { "off" }
}

impl Workspace {
    pub fn new(
        store: SharedStore,
        settings: Arc<SettingsStore>,
        session: SessionController,
        exporter: Box<dyn ProjectExporter>,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        Self {
            store,
            settings,
            session,
            exporter,
            renderer,
            composer: Mutex::new(Composer::new()),
        }
    }

    /// Stop the streaming reply, if any.
    pub fn cancel(&self) -> bool {
        self.session.cancel()
    }

    /// Write both collections; called once on exit.
    pub fn shutdown(&self) -> Result<(), CommandError> {
        lock_store(&self.store)?.flush()?;
        Ok(())
    }

    fn composer(&self) -> std::sync::MutexGuard<'_, Composer> {
        self.composer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn execute(&self, command: Command) -> Result<Reply, CommandError> {
        let reply = match command {
            Command::Send(text) => return self.send(&text).await,
            Command::Quit => return Ok(Reply::Quit),
            Command::Help => Reply::line(HELP_TEXT),
            Command::Settings => self.show_settings(),
            Command::System(text) => {
                let text = text.trim();
                self.settings.set_system_prompt(text)?;
                if text.is_empty() {
                    Reply::line("System prompt off.")
                } else {
                    Reply::line("System saved.")
                }
            }
            Command::Model(model) => {
                self.settings.set_model(&model)?;
                Reply::line(format!("Model: {}", self.settings.snapshot().model))
            }
            Command::Key(key) => {
                self.settings.set_api_key(&key)?;
                Reply::line("Settings saved.")
            }
            Command::Dark(flag) => {
                let dark = flag.unwrap_or(!self.settings.snapshot().dark);
                self.settings.set_dark(dark)?;
                Reply::line(format!("Dark theme: {}", on_off(dark)))
            }
            Command::SpeechLang(lang) => {
                self.settings.set_speech_lang(&lang)?;
                Reply::line(format!(
                    "Speech language: {}",
                    self.settings.snapshot().speech_lang
                ))
            }
            Command::AutoSpeak(flag) => {
                let on = flag.unwrap_or(!self.settings.snapshot().auto_speak);
                self.settings.set_auto_speak(on)?;
                Reply::line(format!("Auto-speak: {}", on_off(on)))
            }
            Command::Attach(path) => self.attach(&path)?,
            Command::Detach => {
                self.composer().clear();
                Reply::line("Attachments cleared.")
            }
            Command::Export(dir) => self.export(&dir)?,
            other => self.execute_store(other)?,
        };
        self.report_unsaved();
        Ok(reply)
    }

    async fn send(&self, text: &str) -> Result<Reply, CommandError> {
        let attachments = self.composer().attachments().to_vec();
        let outcome = self.session.submit(text, &attachments).await?;
        self.composer().clear();
        self.report_unsaved();

        Ok(match outcome {
            SessionOutcome::Completed | SessionOutcome::Cancelled => Reply::none(),
            SessionOutcome::Failed(err) => {
                log::debug!("Send failed: {}", err);
                Reply::none()
            }
        })
    }

    fn attach(&self, path: &Path) -> Result<Reply, CommandError> {
        let attachment = Attachment::from_path(path)?;
        let mut composer = self.composer();
        composer.attach(attachment);
        Ok(Reply::line(format!(
            "Attached {} file(s).",
            composer.attachments().len()
        )))
    }

    fn export(&self, dir: &Path) -> Result<Reply, CommandError> {
        let project = lock_store(&self.store)?.ensure_active_project().clone();
        match self.exporter.export(&project, dir) {
            Ok(path) => Ok(Reply::line(format!("Exported to {}", path.display()))),
            Err(err) => {
                log::warn!("Export of {} failed: {}", project.id, err);
                Err(err.into())
            }
        }
    }

    fn show_settings(&self) -> Reply {
        let public = self.settings.public();
        match serde_json::to_string_pretty(&public) {
            Ok(json) => Reply::line(json),
            Err(err) => Reply::line(format!("Cannot show settings: {err}")),
        }
    }

    fn report_unsaved(&self) {
        let unsaved = match lock_store(&self.store) {
            Ok(mut store) => store.take_persist_error(),
            Err(_) => None,
        };
        if let Some(err) = unsaved {
            self.renderer
                .render(&RenderEvent::error(format!("Changes not saved: {err}")));
        }
    }

    fn execute_store(&self, command: Command) -> Result<Reply, CommandError> {
        let mut store = lock_store(&self.store)?;
        let reply = match command {
            Command::NewChat => {
                let id = store.create_conversation().id.clone();
                Reply::line(format!("New chat {id}"))
            }
            Command::Chats(filter) => {
                let rows = store.list_conversations(filter.as_deref());
                if rows.is_empty() {
                    return Ok(Reply::line("No chats."));
                }
                Reply::Lines(
                    rows.into_iter()
                        .map(|c| {
                            format!(
                                "{} {}  {}  ({} msgs)",
                                marker(c.is_active),
                                c.id,
                                c.title,
                                c.message_count
                            )
                        })
                        .collect(),
                )
            }
            Command::SwitchChat(id) => {
                store.select_conversation(&id)?;
                Reply::line(format!("Active chat: {}", store.ensure_active_conversation().title))
            }
            Command::ShowChat => {
                let conversation = store.ensure_active_conversation();
                let mut lines = vec![format!("# {}", conversation.title)];
                lines.extend(
                    conversation
                        .messages
                        .iter()
                        .map(|m| format!("[{}] {}", m.role.as_str(), m.content)),
                );
                Reply::Lines(lines)
            }
            Command::RenameChat(title) => {
                let id = store.ensure_active_conversation().id.clone();
                store.rename_conversation(&id, &title)?;
                Reply::line(format!("Renamed to {}", store.ensure_active_conversation().title))
            }
            Command::DeleteChat(id) => {
                store.delete_conversation(&id)?;
                Reply::line("Chat deleted.")
            }
            Command::ClearChat => {
                let id = store.ensure_active_conversation().id.clone();
                store.clear_conversation(&id)?;
                Reply::line("Chat cleared.")
            }
            Command::Projects(filter) => {
                let rows = store.list_projects(filter.as_deref());
                if rows.is_empty() {
                    return Ok(Reply::line("No projects."));
                }
                Reply::Lines(
                    rows.into_iter()
                        .map(|p| {
                            format!(
                                "{} {}  {}  ({} files)",
                                marker(p.is_active),
                                p.id,
                                p.name,
                                p.file_count
                            )
                        })
                        .collect(),
                )
            }
            Command::NewProject(name) => {
                let project = store.create_project(&name);
                Reply::line(format!("New project {} ({})", project.name, project.id))
            }
            Command::SwitchProject(id) => {
                store.select_project(&id)?;
                Reply::line(format!("Active project: {}", store.ensure_active_project().name))
            }
            Command::RenameProject(name) => {
                let id = store.ensure_active_project().id.clone();
                store.rename_project(&id, &name)?;
                Reply::line(format!("Renamed to {}", store.ensure_active_project().name))
            }
            Command::DeleteProject(id) => {
                store.delete_project(&id)?;
                Reply::line("Project deleted.")
            }
            Command::Files => Reply::Lines(store.file_paths()),
            Command::AddFile(path) => {
                let path = store.add_file(&path)?;
                Reply::line(format!("Added {path}"))
            }
            Command::ShowFile(path) => {
                let entry = store.read_file(&path)?;
                Reply::Lines(vec![format!("--- {} ({})", path, entry.mime_type), entry.content])
            }
            Command::WriteFile { path, content } => {
                store.mutate_file(&path, &content)?;
                Reply::line(format!("Saved {path}"))
            }
            Command::Preview => Reply::line(store.preview_html()),
            Command::Send(_)
            | Command::Quit
            | Command::Help
            | Command::Settings
            | Command::System(_)
            | Command::Model(_)
            | Command::Key(_)
            | Command::Dark(_)
            | Command::SpeechLang(_)
            | Command::AutoSpeak(_)
            | Command::Attach(_)
            | Command::Detach
            | Command::Export(_) => Reply::none(),
        };
        Ok(reply)
    }
}

//! In-memory conversations and projects, written through to a key-value
//! backing after every mutation.
//!
//! Each collection carries an optional active id. Whenever an entity is added
//! or removed the active id is re-resolved: keep it if still present, else the
//! first entity in stored order, else a freshly inserted default entity.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::services::render::{RenderEvent, Renderer};

use super::backing::{keys, KeyValueBacking};
use super::codec::{decode_active_id, decode_collection, encode_collection};
use super::title::{
    derive_title, is_placeholder_title, normalize_name, UNTITLED_CONVERSATION, UNTITLED_PROJECT,
};
use super::types::{
    Conversation, ConversationSummary, FileEntry, Message, Project, ProjectSummary, Role,
    DEFAULT_PROJECT_NAME, INDEX_HTML_PATH,
};
use super::{PersistError, StoreError};

const NO_INDEX_HTML: &str = "<h2>No index.html</h2>";

pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn new_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4())
}

trait Entity {
    fn id(&self) -> &str;
}

impl Entity for Conversation {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for Project {
    fn id(&self) -> &str {
        &self.id
    }
}

fn matches_filter(text: &str, needle: &str) -> bool {
    needle.is_empty() || text.to_lowercase().contains(needle)
}

fn normalize_filter(filter: Option<&str>) -> String {
    filter.unwrap_or("").trim().to_lowercase()
}

/// Read one collection and its active id. Any failure resets just this
/// collection.
fn load_collection<T: DeserializeOwned + Entity>(
    backing: &dyn KeyValueBacking,
    items_key: &str,
    active_key: &str,
) -> (Vec<T>, Option<String>) {
    let raw = match backing.get(items_key) {
        Ok(raw) => raw,
        Err(err) => {
            log::warn!("Failed to read {}: {}", items_key, err);
            return (Vec::new(), None);
        }
    };

    let items = match decode_collection::<T>(raw.as_deref()) {
        Ok(items) => items,
        Err(err) => {
            log::warn!("Discarding corrupted {}: {}", items_key, err);
            return (Vec::new(), None);
        }
    };

    let mut seen = HashSet::new();
    let total = items.len();
    let items: Vec<T> = items
        .into_iter()
        .filter(|item| !item.id().is_empty() && seen.insert(item.id().to_string()))
        .collect();
    if items.len() != total {
        log::warn!(
            "Dropped {} entries with blank or duplicate ids from {}",
            total - items.len(),
            items_key
        );
    }

    let active = match backing.get(active_key) {
        Ok(raw) => decode_active_id(raw),
        Err(err) => {
            log::warn!("Failed to read {}: {}", active_key, err);
            None
        }
    };

    (items, active)
}

pub struct EntityStore {
    backing: Arc<dyn KeyValueBacking>,
    renderer: Arc<dyn Renderer>,
    clock: Clock,
    conversations: Vec<Conversation>,
    active_conversation_id: Option<String>,
    projects: Vec<Project>,
    active_project_id: Option<String>,
    unsaved: Option<PersistError>,
}

impl EntityStore {
    /// Hydrate both collections from `backing`. Never fails.
    pub fn load(backing: Arc<dyn KeyValueBacking>, renderer: Arc<dyn Renderer>) -> Self {
        let (conversations, active_conversation_id) = load_collection::<Conversation>(
            backing.as_ref(),
            keys::CONVERSATIONS,
            keys::ACTIVE_CONVERSATION,
        );
        let (projects, active_project_id) =
            load_collection::<Project>(backing.as_ref(), keys::PROJECTS, keys::ACTIVE_PROJECT);

        log::info!(
            "Loaded {} conversations and {} projects",
            conversations.len(),
            projects.len()
        );

        Self {
            backing,
            renderer,
            clock: Arc::new(now_ms),
            conversations,
            active_conversation_id,
            projects,
            active_project_id,
            unsaved: None,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Resolve both active selections, creating defaults where needed.
    pub fn bootstrap(&mut self) {
        self.ensure_active_conversation();
        self.ensure_active_project();
    }

    fn now(&self) -> u64 {
        (self.clock)()
    }

    fn notify(&self, event: RenderEvent) {
        self.renderer.render(&event);
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    pub fn save_conversations(&self) -> Result<(), PersistError> {
        let encoded = encode_collection(&self.conversations)?;
        self.backing.set_many(&[
            (keys::CONVERSATIONS, encoded.as_str()),
            (
                keys::ACTIVE_CONVERSATION,
                self.active_conversation_id.as_deref().unwrap_or(""),
            ),
        ])
    }

    pub fn save_projects(&self) -> Result<(), PersistError> {
        let encoded = encode_collection(&self.projects)?;
        self.backing.set_many(&[
            (keys::PROJECTS, encoded.as_str()),
            (
                keys::ACTIVE_PROJECT,
                self.active_project_id.as_deref().unwrap_or(""),
            ),
        ])
    }

    /// Write both collections; used on shutdown.
    pub fn flush(&mut self) -> Result<(), PersistError> {
        self.save_conversations()?;
        self.save_projects()?;
        self.unsaved = None;
        Ok(())
    }

    /// Most recent write-through failure since the last call, if any.
    pub fn take_persist_error(&mut self) -> Option<PersistError> {
        self.unsaved.take()
    }

    fn persist_conversations(&mut self) {
        if let Err(err) = self.save_conversations() {
            log::warn!("Conversations not saved: {}", err);
            self.unsaved = Some(err);
        }
    }

    fn persist_projects(&mut self) {
        if let Err(err) = self.save_projects() {
            log::warn!("Projects not saved: {}", err);
            self.unsaved = Some(err);
        }
    }

    // ------------------------------------------------------------------
    // Conversations
    // ------------------------------------------------------------------

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn conversation(&self, conversation_id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == conversation_id)
    }

    fn conversation_mut(&mut self, conversation_id: &str) -> Result<&mut Conversation, StoreError> {
        self.conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
            .ok_or_else(|| StoreError::not_found("Conversation not found"))
    }

    pub fn active_conversation_id(&self) -> Option<&str> {
        self.active_conversation_id.as_deref()
    }

    fn resolve_active_conversation_index(&mut self) -> usize {
        let current = self
            .active_conversation_id
            .as_deref()
            .and_then(|id| self.conversations.iter().position(|c| c.id == id));
        if let Some(index) = current {
            return index;
        }

        if self.conversations.is_empty() {
            let conversation = Conversation::new(new_id("chat"), self.now());
            log::debug!("Creating default conversation {}", conversation.id);
            self.conversations.insert(0, conversation);
            self.notify(RenderEvent::ConversationsChanged);
        }

        let id = self.conversations[0].id.clone();
        self.active_conversation_id = Some(id.clone());
        self.persist_conversations();
        self.notify(RenderEvent::ActiveConversationChanged {
            conversation_id: id,
        });
        0
    }

    /// The active conversation, resolved through the fallback chain.
    pub fn ensure_active_conversation(&mut self) -> &Conversation {
        let index = self.resolve_active_conversation_index();
        &self.conversations[index]
    }

    pub fn create_conversation(&mut self) -> &Conversation {
        let conversation = Conversation::new(new_id("chat"), self.now());
        let id = conversation.id.clone();
        self.conversations.insert(0, conversation);
        self.active_conversation_id = Some(id.clone());
        self.persist_conversations();
        self.notify(RenderEvent::ConversationsChanged);
        self.notify(RenderEvent::ActiveConversationChanged {
            conversation_id: id,
        });
        &self.conversations[0]
    }

    pub fn select_conversation(&mut self, conversation_id: &str) -> Result<(), StoreError> {
        if self.conversation(conversation_id).is_none() {
            return Err(StoreError::not_found("Conversation not found"));
        }
        self.active_conversation_id = Some(conversation_id.to_string());
        self.persist_conversations();
        self.notify(RenderEvent::ActiveConversationChanged {
            conversation_id: conversation_id.to_string(),
        });
        Ok(())
    }

    /// Append to the active conversation. Returns the conversation id.
    pub fn append_message(&mut self, role: Role, content: &str) -> String {
        let id = self.ensure_active_conversation().id.clone();
        // The conversation was just resolved, so this lookup cannot miss.
        if let Err(err) = self.append_message_to(&id, role, content) {
            log::error!("Append to active conversation failed: {}", err);
        }
        id
    }

    pub fn append_message_to(
        &mut self,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> Result<(), StoreError> {
        let now = self.now();
        let conversation = self.conversation_mut(conversation_id)?;
        conversation.messages.push(Message::new(role, content));
        conversation.updated_at = now;

        let mut retitled = false;
        if role == Role::User && is_placeholder_title(&conversation.title) {
            if let Some(title) = derive_title(content) {
                conversation.title = title;
                retitled = true;
            }
        }

        self.persist_conversations();
        self.notify(RenderEvent::MessagesChanged {
            conversation_id: conversation_id.to_string(),
        });
        if retitled {
            self.notify(RenderEvent::ConversationsChanged);
        }
        Ok(())
    }

    /// Append streamed text to the newest assistant message of a conversation.
    pub fn append_to_last_assistant(
        &mut self,
        conversation_id: &str,
        delta: &str,
    ) -> Result<(), StoreError> {
        let now = self.now();
        let conversation = self.conversation_mut(conversation_id)?;
        let message = conversation
            .last_assistant_mut()
            .ok_or_else(|| StoreError::not_found("No assistant message to update"))?;
        message.content.push_str(delta);
        conversation.updated_at = now;

        self.persist_conversations();
        self.notify(RenderEvent::MessagesChanged {
            conversation_id: conversation_id.to_string(),
        });
        Ok(())
    }

    pub fn rename_conversation(
        &mut self,
        conversation_id: &str,
        title: &str,
    ) -> Result<(), StoreError> {
        let now = self.now();
        let conversation = self.conversation_mut(conversation_id)?;
        conversation.title = normalize_name(title, UNTITLED_CONVERSATION);
        conversation.updated_at = now;
        self.persist_conversations();
        self.notify(RenderEvent::ConversationsChanged);
        Ok(())
    }

    pub fn clear_conversation(&mut self, conversation_id: &str) -> Result<(), StoreError> {
        let now = self.now();
        let conversation = self.conversation_mut(conversation_id)?;
        conversation.messages.clear();
        conversation.updated_at = now;
        self.persist_conversations();
        self.notify(RenderEvent::MessagesChanged {
            conversation_id: conversation_id.to_string(),
        });
        self.notify(RenderEvent::ConversationsChanged);
        Ok(())
    }

    pub fn delete_conversation(&mut self, conversation_id: &str) -> Result<(), StoreError> {
        let before = self.conversations.len();
        self.conversations.retain(|c| c.id != conversation_id);
        if self.conversations.len() == before {
            return Err(StoreError::not_found("Conversation not found"));
        }
        if self.active_conversation_id.as_deref() == Some(conversation_id) {
            self.active_conversation_id = None;
        }
        self.notify(RenderEvent::ConversationsChanged);
        self.ensure_active_conversation();
        self.persist_conversations();
        Ok(())
    }

    /// Conversations by `updated_at` descending, optionally filtered by a
    /// case-insensitive title substring.
    pub fn list_conversations(&self, filter: Option<&str>) -> Vec<ConversationSummary> {
        let needle = normalize_filter(filter);
        let mut items: Vec<&Conversation> = self
            .conversations
            .iter()
            .filter(|c| matches_filter(&c.title, &needle))
            .collect();
        items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        items
            .into_iter()
            .map(|c| ConversationSummary {
                id: c.id.clone(),
                title: c.title.clone(),
                updated_at: c.updated_at,
                message_count: c.messages.len() as u32,
                is_active: self.active_conversation_id.as_deref() == Some(c.id.as_str()),
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Projects
    // ------------------------------------------------------------------

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn project(&self, project_id: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == project_id)
    }

    fn project_mut(&mut self, project_id: &str) -> Result<&mut Project, StoreError> {
        self.projects
            .iter_mut()
            .find(|p| p.id == project_id)
            .ok_or_else(|| StoreError::not_found("Project not found"))
    }

    pub fn active_project_id(&self) -> Option<&str> {
        self.active_project_id.as_deref()
    }

    fn resolve_active_project_index(&mut self) -> usize {
        let current = self
            .active_project_id
            .as_deref()
            .and_then(|id| self.projects.iter().position(|p| p.id == id));
        if let Some(index) = current {
            return index;
        }

        if self.projects.is_empty() {
            let project = Project::new(new_id("proj"), DEFAULT_PROJECT_NAME.to_string(), self.now());
            log::debug!("Creating default project {}", project.id);
            self.projects.insert(0, project);
            self.notify(RenderEvent::ProjectsChanged);
        }

        let id = self.projects[0].id.clone();
        self.active_project_id = Some(id.clone());
        self.persist_projects();
        self.notify(RenderEvent::ActiveProjectChanged { project_id: id });
        0
    }

    pub fn ensure_active_project(&mut self) -> &Project {
        let index = self.resolve_active_project_index();
        &self.projects[index]
    }

    pub fn create_project(&mut self, name: &str) -> &Project {
        let name = normalize_name(name, DEFAULT_PROJECT_NAME);
        let project = Project::new(new_id("proj"), name, self.now());
        let id = project.id.clone();
        self.projects.insert(0, project);
        self.active_project_id = Some(id.clone());
        self.persist_projects();
        self.notify(RenderEvent::ProjectsChanged);
        self.notify(RenderEvent::ActiveProjectChanged { project_id: id });
        &self.projects[0]
    }

    pub fn select_project(&mut self, project_id: &str) -> Result<(), StoreError> {
        if self.project(project_id).is_none() {
            return Err(StoreError::not_found("Project not found"));
        }
        self.active_project_id = Some(project_id.to_string());
        self.persist_projects();
        self.notify(RenderEvent::ActiveProjectChanged {
            project_id: project_id.to_string(),
        });
        Ok(())
    }

    pub fn rename_project(&mut self, project_id: &str, name: &str) -> Result<(), StoreError> {
        let now = self.now();
        let project = self.project_mut(project_id)?;
        project.name = normalize_name(name, UNTITLED_PROJECT);
        project.updated_at = now;
        self.persist_projects();
        self.notify(RenderEvent::ProjectsChanged);
        Ok(())
    }

    pub fn delete_project(&mut self, project_id: &str) -> Result<(), StoreError> {
        let before = self.projects.len();
        self.projects.retain(|p| p.id != project_id);
        if self.projects.len() == before {
            return Err(StoreError::not_found("Project not found"));
        }
        if self.active_project_id.as_deref() == Some(project_id) {
            self.active_project_id = None;
        }
        self.notify(RenderEvent::ProjectsChanged);
        self.ensure_active_project();
        self.persist_projects();
        Ok(())
    }

    /// Add an empty file to the active project. Returns the stored path.
    pub fn add_file(&mut self, path: &str) -> Result<String, StoreError> {
        let path = path.trim();
        if path.is_empty() {
            return Err(StoreError::invalid_input("File path is empty"));
        }
        let now = self.now();
        let index = self.resolve_active_project_index();
        let project = &mut self.projects[index];
        if project.files.contains_key(path) {
            return Err(StoreError::invalid_input("File exists."));
        }

        let mime_type = mime_guess::from_path(path).first_or_text_plain();
        project
            .files
            .insert(path.to_string(), FileEntry::new(mime_type.essence_str(), ""));
        project.updated_at = now;
        let project_id = project.id.clone();

        self.persist_projects();
        self.notify(RenderEvent::FileChanged {
            project_id,
            path: path.to_string(),
        });
        self.notify(RenderEvent::ProjectsChanged);
        Ok(path.to_string())
    }

    /// Replace the content of an existing file in the active project.
    pub fn mutate_file(&mut self, path: &str, content: &str) -> Result<(), StoreError> {
        let now = self.now();
        let index = self.resolve_active_project_index();
        let project = &mut self.projects[index];
        let entry = project
            .files
            .get_mut(path)
            .ok_or_else(|| StoreError::not_found(format!("File not found: {}", path)))?;
        entry.content = content.to_string();
        project.updated_at = now;
        let project_id = project.id.clone();

        self.persist_projects();
        self.notify(RenderEvent::FileChanged {
            project_id,
            path: path.to_string(),
        });
        self.notify(RenderEvent::ProjectsChanged);
        Ok(())
    }

    pub fn read_file(&mut self, path: &str) -> Result<FileEntry, StoreError> {
        self.ensure_active_project()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("File not found: {}", path)))
    }

    /// Paths of the active project, sorted.
    pub fn file_paths(&mut self) -> Vec<String> {
        self.ensure_active_project().files.keys().cloned().collect()
    }

    /// Document shown in the live preview.
    pub fn preview_html(&mut self) -> String {
        self.ensure_active_project()
            .files
            .get(INDEX_HTML_PATH)
            .map(|f| f.content.clone())
            .unwrap_or_else(|| NO_INDEX_HTML.to_string())
    }

    pub fn list_projects(&self, filter: Option<&str>) -> Vec<ProjectSummary> {
        let needle = normalize_filter(filter);
        let mut items: Vec<&Project> = self
            .projects
            .iter()
            .filter(|p| matches_filter(&p.name, &needle))
            .collect();
        items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        items
            .into_iter()
            .map(|p| ProjectSummary {
                id: p.id.clone(),
                name: p.name.clone(),
                updated_at: p.updated_at,
                file_count: p.files.len() as u32,
                is_active: self.active_project_id.as_deref() == Some(p.id.as_str()),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;
    use crate::plugins::store::MemoryBacking;
    use crate::services::render::{NoopRenderer, RecordingRenderer};

    fn ticking_clock() -> Clock {
        let tick = Arc::new(AtomicU64::new(1_000));
        Arc::new(move || tick.fetch_add(1, Ordering::SeqCst))
    }

    fn store_with(backing: Arc<MemoryBacking>) -> EntityStore {
        EntityStore::load(backing, Arc::new(NoopRenderer)).with_clock(ticking_clock())
    }

    #[test]
    fn test_ensure_creates_default_and_is_idempotent() {
        let mut store = store_with(Arc::new(MemoryBacking::new()));
        let first = store.ensure_active_conversation().clone();
        let second = store.ensure_active_conversation().clone();
        assert_eq!(first, second);
        assert_eq!(first.title, "New chat");
        assert_eq!(store.conversations().len(), 1);
    }

    #[test]
    fn test_stale_active_id_falls_back_to_first_in_stored_order() {
        let backing = Arc::new(MemoryBacking::new());
        let mut store = store_with(backing.clone());
        let older = store.create_conversation().id.clone();
        let newer = store.create_conversation().id.clone();
        // Stored order is newest first; make the older one most recently updated.
        store.append_message_to(&older, Role::User, "bump").unwrap();
        backing.set(keys::ACTIVE_CONVERSATION, "chat_gone").unwrap();

        let mut reloaded = store_with(backing);
        assert_eq!(reloaded.ensure_active_conversation().id, newer);
    }

    #[test]
    fn test_append_message_titles_placeholder_only() {
        let mut store = store_with(Arc::new(MemoryBacking::new()));
        let id = store.append_message(Role::Assistant, "ignored for titles");
        assert_eq!(store.conversation(&id).unwrap().title, "New chat");

        store.append_message(Role::User, "  What is a monad?  ");
        assert_eq!(store.conversation(&id).unwrap().title, "What is a monad?");

        store.append_message(Role::User, "Second question");
        assert_eq!(store.conversation(&id).unwrap().title, "What is a monad?");
    }

    #[test]
    fn test_each_delta_is_one_backing_write() {
        let backing = Arc::new(MemoryBacking::new());
        let mut store = store_with(backing.clone());
        let id = store.append_message(Role::User, "hi");
        store.append_message_to(&id, Role::Assistant, "").unwrap();

        let before = backing.write_count();
        store.append_to_last_assistant(&id, "Hel").unwrap();
        store.append_to_last_assistant(&id, "lo").unwrap();
        assert_eq!(backing.write_count(), before + 2);
        assert_eq!(
            backing.raw(keys::ACTIVE_CONVERSATION).as_deref(),
            Some(id.as_str())
        );
    }

    #[test]
    fn test_updated_at_refreshes_on_mutation() {
        let mut store = store_with(Arc::new(MemoryBacking::new()));
        let id = store.create_conversation().id.clone();
        let before = store.conversation(&id).unwrap().updated_at;
        store.rename_conversation(&id, "Renamed").unwrap();
        assert!(store.conversation(&id).unwrap().updated_at > before);
    }

    #[test]
    fn test_delete_only_conversation_creates_new_default() {
        let mut store = store_with(Arc::new(MemoryBacking::new()));
        let id = store.ensure_active_conversation().id.clone();
        store.delete_conversation(&id).unwrap();

        assert_eq!(store.conversations().len(), 1);
        let active = store.ensure_active_conversation();
        assert_ne!(active.id, id);
        assert_eq!(active.title, "New chat");
    }

    #[test]
    fn test_delete_inactive_keeps_active() {
        let mut store = store_with(Arc::new(MemoryBacking::new()));
        let a = store.create_conversation().id.clone();
        let b = store.create_conversation().id.clone();
        store.delete_conversation(&a).unwrap();
        assert_eq!(store.active_conversation_id(), Some(b.as_str()));
        assert!(store.delete_conversation(&a).is_err());
    }

    #[test]
    fn test_list_conversations_sorted_and_filtered() {
        let mut store = store_with(Arc::new(MemoryBacking::new()));
        let a = store.create_conversation().id.clone();
        store.rename_conversation(&a, "Rust lifetimes").unwrap();
        let b = store.create_conversation().id.clone();
        store.rename_conversation(&b, "Cooking").unwrap();
        store.append_message_to(&a, Role::User, "again").unwrap();

        let all = store.list_conversations(None);
        assert_eq!(all[0].id, a);
        assert_eq!(all[1].id, b);
        assert_eq!(all[0].message_count, 1);

        let filtered = store.list_conversations(Some("RUST"));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].title, "Rust lifetimes");
        // Stored order is untouched by listing.
        assert_eq!(store.conversations()[0].id, b);
    }

    #[test]
    fn test_corrupted_conversations_do_not_affect_projects() {
        let seed = MemoryBacking::new();
        let mut good = store_with(Arc::new(MemoryBacking::new()));
        let project_id = good.create_project("Keep me").id.clone();
        seed.set(keys::PROJECTS, &encode_collection(good.projects()).unwrap())
            .unwrap();
        seed.set(keys::ACTIVE_PROJECT, &project_id).unwrap();
        seed.set(keys::CONVERSATIONS, "{{{ not json").unwrap();
        seed.set(keys::ACTIVE_CONVERSATION, "chat_x").unwrap();

        let store = store_with(Arc::new(seed));
        assert!(store.conversations().is_empty());
        assert_eq!(store.active_conversation_id(), None);
        assert_eq!(store.projects().len(), 1);
        assert_eq!(store.active_project_id(), Some(project_id.as_str()));
    }

    #[test]
    fn test_duplicate_ids_are_dropped_on_load() {
        let raw = r#"[{"id":"c1","title":"a","updatedAt":1,"messages":[]},{"id":"c1","title":"b","updatedAt":2,"messages":[]}]"#;
        let backing = Arc::new(MemoryBacking::with_entries([(keys::CONVERSATIONS, raw)]));
        let store = store_with(backing);
        assert_eq!(store.conversations().len(), 1);
        assert_eq!(store.conversations()[0].title, "a");
    }

    #[test]
    fn test_persist_failure_keeps_memory_and_reports() {
        let backing = Arc::new(MemoryBacking::new());
        let mut store = store_with(backing.clone());
        store.ensure_active_conversation();
        backing.set_reject_writes(true);

        let id = store.append_message(Role::User, "not saved");
        assert_eq!(store.conversation(&id).unwrap().messages.len(), 1);
        assert!(matches!(
            store.take_persist_error(),
            Some(PersistError::QuotaExceeded { .. })
        ));
        assert!(store.take_persist_error().is_none());
    }

    #[test]
    fn test_new_project_has_index_html() {
        let mut store = store_with(Arc::new(MemoryBacking::new()));
        let project = store.create_project("   ");
        assert_eq!(project.name, "My Project");
        assert_eq!(project.files.len(), 1);
        let index = &project.files["index.html"];
        assert_eq!(index.mime_type, "text/html");
        assert!(index.content.starts_with("<!doctype html>"));
    }

    #[test]
    fn test_add_file_validation() {
        let mut store = store_with(Arc::new(MemoryBacking::new()));
        store.ensure_active_project();

        assert!(matches!(
            store.add_file("   "),
            Err(StoreError::InvalidInput { .. })
        ));
        assert!(matches!(
            store.add_file("index.html"),
            Err(StoreError::InvalidInput { .. })
        ));
        assert_eq!(store.file_paths(), vec!["index.html".to_string()]);

        let path = store.add_file(" style.css ").unwrap();
        assert_eq!(path, "style.css");
        assert_eq!(store.read_file("style.css").unwrap().mime_type, "text/css");
    }

    #[test]
    fn test_mutate_file_and_preview() {
        let mut store = store_with(Arc::new(MemoryBacking::new()));
        store.mutate_file("index.html", "<p>hi</p>").unwrap();
        assert_eq!(store.preview_html(), "<p>hi</p>");
        assert!(matches!(
            store.mutate_file("missing.js", "x"),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_delete_active_project_falls_back() {
        let mut store = store_with(Arc::new(MemoryBacking::new()));
        let a = store.create_project("A").id.clone();
        let b = store.create_project("B").id.clone();
        store.delete_project(&b).unwrap();
        assert_eq!(store.active_project_id(), Some(a.as_str()));

        store.delete_project(&a).unwrap();
        assert_eq!(store.projects().len(), 1);
        assert_eq!(store.ensure_active_project().name, "My Project");
    }

    #[test]
    fn test_mutations_notify_renderer() {
        let renderer = Arc::new(RecordingRenderer::new());
        let mut store = EntityStore::load(Arc::new(MemoryBacking::new()), renderer.clone());
        let id = store.append_message(Role::User, "hello");
        let events = renderer.events();
        assert!(events.contains(&RenderEvent::ActiveConversationChanged {
            conversation_id: id.clone()
        }));
        assert!(events.contains(&RenderEvent::MessagesChanged {
            conversation_id: id
        }));
        assert!(events.contains(&RenderEvent::ConversationsChanged));
    }

    #[test]
    fn test_reload_restores_state() {
        let backing = Arc::new(MemoryBacking::new());
        let (conversation_id, project_id) = {
            let mut store = store_with(backing.clone());
            let id = store.append_message(Role::User, "persist me");
            let project = store.create_project("Site").id.clone();
            store.add_file("app.js").unwrap();
            (id, project)
        };

        let mut reloaded = store_with(backing);
        assert_eq!(reloaded.active_conversation_id(), Some(conversation_id.as_str()));
        assert_eq!(
            reloaded.ensure_active_conversation().messages[0].content,
            "persist me"
        );
        assert_eq!(reloaded.ensure_active_project().id, project_id);
        assert!(reloaded.file_paths().contains(&"app.js".to_string()));
    }
}

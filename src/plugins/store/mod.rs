//! Conversations and projects, persisted through a key-value backing.
//!
//! The async surface (streaming, CLI) shares one [`EntityStore`] through
//! [`SharedStore`]. The lock is never held across `.await`.

mod backing;
mod codec;
mod error;
mod entity_store;
mod title;
mod types;

use std::sync::{Arc, Mutex, MutexGuard};

pub use backing::{keys, JsonFileBacking, KeyValueBacking, MemoryBacking};
pub use error::{PersistError, StoreError};
pub use entity_store::{Clock, EntityStore};
pub use types::{
    Conversation, ConversationSummary, FileEntry, Message, Project, ProjectSummary, Role,
    DEFAULT_CONVERSATION_TITLE, DEFAULT_PROJECT_NAME, INDEX_HTML_PATH,
};

pub type SharedStore = Arc<Mutex<EntityStore>>;

pub fn shared(store: EntityStore) -> SharedStore {
    Arc::new(Mutex::new(store))
}

pub fn lock_store(store: &SharedStore) -> Result<MutexGuard<'_, EntityStore>, StoreError> {
    store
        .lock()
        .map_err(|_| StoreError::internal("Entity store lock poisoned"))
}

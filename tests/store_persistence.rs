use std::sync::Arc;

use studio_lib::plugins::store::{
    keys, EntityStore, JsonFileBacking, KeyValueBacking, MemoryBacking, Role,
};
use studio_lib::services::render::NoopRenderer;

fn open_store(dir: &std::path::Path) -> EntityStore {
    let backing = Arc::new(JsonFileBacking::open(dir).unwrap());
    let mut store = EntityStore::load(backing, Arc::new(NoopRenderer));
    store.bootstrap();
    store
}

#[test]
fn test_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let (conversation_id, project_id) = {
        let mut store = open_store(dir.path());
        let id = store.append_message(
            Role::User,
            "Explain recursion please explain in depth beyond thirty-six chars",
        );
        store.append_message(Role::Assistant, "Recursion is...");
        let project_id = store.create_project("  Portfolio  ").id.clone();
        store.add_file("about.html").unwrap();
        store.mutate_file("about.html", "<p>me</p>").unwrap();
        (id, project_id)
    };

    let mut store = open_store(dir.path());
    let conversation = store.ensure_active_conversation().clone();
    assert_eq!(conversation.id, conversation_id);
    assert_eq!(conversation.title, "Explain recursion please explain in ");
    assert_eq!(conversation.messages.len(), 2);

    let project = store.ensure_active_project().clone();
    assert_eq!(project.id, project_id);
    assert_eq!(project.name, "Portfolio");
    assert_eq!(project.files["about.html"].content, "<p>me</p>");
    assert_eq!(project.files["about.html"].mime_type, "text/html");
    // Two projects: the bootstrap default and "Portfolio".
    assert_eq!(store.projects().len(), 2);
}

#[test]
fn test_corrupted_conversations_reset_only_that_collection() {
    let dir = tempfile::tempdir().unwrap();
    let project_id = {
        let mut store = open_store(dir.path());
        store.append_message(Role::User, "will be lost");
        store.ensure_active_project().id.clone()
    };
    {
        let backing = JsonFileBacking::open(dir.path()).unwrap();
        backing.set(keys::CONVERSATIONS, "[{\"id\": 12,").unwrap();
    }

    let mut store = open_store(dir.path());
    let conversation = store.ensure_active_conversation();
    assert_eq!(conversation.title, "New chat");
    assert!(conversation.messages.is_empty());
    assert_eq!(store.conversations().len(), 1);
    assert_eq!(store.active_project_id(), Some(project_id.as_str()));
}

#[test]
fn test_legacy_array_format_is_upgraded_on_save() {
    let legacy_chats = r#"[
        {"id":"c_old","title":"Old chat","updatedAt":5,
         "messages":[{"role":"user","content":"hi"},{"role":"assistant","content":"hello"}]}
    ]"#;
    let legacy_projects = r#"[
        {"id":"p_old","name":"Old site","updatedAt":3,
         "files":{"index.html":{"type":"text/html","content":"<h1>old</h1>"}}}
    ]"#;
    let backing = Arc::new(MemoryBacking::with_entries([
        (keys::CONVERSATIONS, legacy_chats),
        (keys::ACTIVE_CONVERSATION, "c_old"),
        (keys::PROJECTS, legacy_projects),
    ]));

    let mut store = EntityStore::load(backing.clone(), Arc::new(NoopRenderer));
    assert_eq!(store.ensure_active_conversation().messages[1].content, "hello");
    assert_eq!(store.preview_html(), "<h1>old</h1>");

    store.append_message(Role::User, "again");
    let saved: serde_json::Value =
        serde_json::from_str(&backing.raw(keys::CONVERSATIONS).unwrap()).unwrap();
    assert_eq!(saved["version"], 1);
    assert_eq!(saved["items"][0]["id"], "c_old");
    assert_eq!(saved["items"][0]["messages"].as_array().unwrap().len(), 3);

    store.flush().unwrap();
    let projects: serde_json::Value =
        serde_json::from_str(&backing.raw(keys::PROJECTS).unwrap()).unwrap();
    assert_eq!(
        projects["items"][0]["files"]["index.html"]["mimeType"],
        "text/html"
    );
    assert_eq!(backing.raw(keys::ACTIVE_PROJECT).as_deref(), Some("p_old"));
}

#[test]
fn test_failed_writes_keep_memory_consistent() {
    let backing = Arc::new(MemoryBacking::new());
    let mut store = EntityStore::load(backing.clone(), Arc::new(NoopRenderer));
    store.bootstrap();
    backing.set_reject_writes(true);

    let id = store.create_conversation().id.clone();
    store.append_message(Role::User, "unsaved");
    assert_eq!(store.active_conversation_id(), Some(id.as_str()));
    assert!(store.take_persist_error().is_some());
    assert!(store.flush().is_err());

    backing.set_reject_writes(false);
    store.flush().unwrap();
    let reloaded = EntityStore::load(backing, Arc::new(NoopRenderer));
    assert_eq!(reloaded.conversation(&id).unwrap().messages[0].content, "unsaved");
}

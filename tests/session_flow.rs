use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use studio_lib::plugins::store::{shared, EntityStore, MemoryBacking, Role, SharedStore};
use studio_lib::services::ai::{
    ByteStream, ChatRequestOptions, CompletionRequest, CompletionTransport, SessionController,
    SessionError, SessionOutcome, SessionState, TransportError,
};
use studio_lib::services::config::{EnvDefaults, SettingsStore};
use studio_lib::services::render::RecordingRenderer;
use tokio::sync::mpsc;

type Chunk = Result<Vec<u8>, TransportError>;

/// Transport whose body is fed by the test through a channel.
struct ChannelTransport {
    body: Mutex<Option<mpsc::UnboundedReceiver<Chunk>>>,
    seen: Mutex<Vec<CompletionRequest>>,
}

impl ChannelTransport {
    fn new() -> (mpsc::UnboundedSender<Chunk>, Arc<Self>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            body: Mutex::new(Some(rx)),
            seen: Mutex::new(Vec::new()),
        });
        (tx, transport)
    }
}

#[async_trait::async_trait]
impl CompletionTransport for ChannelTransport {
    async fn open(&self, request: CompletionRequest) -> Result<ByteStream, TransportError> {
        self.seen.lock().unwrap().push(request);
        let rx = self
            .body
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| TransportError::network("body already taken"))?;
        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (chunk, rx))
        });
        Ok(Box::pin(stream))
    }
}

/// Transport whose request never gets a response.
struct StalledTransport;

#[async_trait::async_trait]
impl CompletionTransport for StalledTransport {
    async fn open(&self, _request: CompletionRequest) -> Result<ByteStream, TransportError> {
        std::future::pending().await
    }
}

struct Harness {
    controller: SessionController,
    store: SharedStore,
    renderer: Arc<RecordingRenderer>,
    transport: Arc<ChannelTransport>,
    tx: mpsc::UnboundedSender<Chunk>,
}

fn controller_with(
    transport: Arc<dyn CompletionTransport>,
) -> (SessionController, SharedStore, Arc<RecordingRenderer>) {
    let backing = Arc::new(MemoryBacking::new());
    let renderer = Arc::new(RecordingRenderer::new());
    let mut store = EntityStore::load(backing.clone(), renderer.clone());
    store.bootstrap();
    let store = shared(store);

    let settings = Arc::new(SettingsStore::load(backing, &EnvDefaults::default()));
    settings.set_api_key("sk-test").unwrap();
    settings.set_model("test/model").unwrap();

    let controller = SessionController::new(store.clone(), settings, transport, renderer.clone())
        .with_request_options(ChatRequestOptions {
            headers: Some(HashMap::from([(
                "X-Title".to_string(),
                "Test Studio".to_string(),
            )])),
        });
    (controller, store, renderer)
}

fn harness() -> Harness {
    let (tx, transport) = ChannelTransport::new();
    let (controller, store, renderer) = controller_with(transport.clone());
    Harness {
        controller,
        store,
        renderer,
        transport,
        tx,
    }
}

fn frame(content: &str) -> Vec<u8> {
    format!(
        "data: {}\n",
        serde_json::json!({ "choices": [{ "index": 0, "delta": { "content": content } }] })
    )
    .into_bytes()
}

fn assistant_text(store: &SharedStore, conversation_id: &str) -> Option<String> {
    let store = store.lock().unwrap();
    let conversation = store.conversation(conversation_id)?;
    conversation
        .messages
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant)
        .map(|m| m.content.clone())
}

fn active_id(store: &SharedStore) -> String {
    store
        .lock()
        .unwrap()
        .ensure_active_conversation()
        .id
        .clone()
}

async fn settle(cond: impl Fn() -> bool) {
    for _ in 0..10_000 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn test_split_frames_stream_into_one_message() {
    let h = harness();
    let conversation_id = active_id(&h.store);

    let driver = async {
        h.tx.send(Ok(frame("He"))).unwrap();
        h.tx.send(Ok(b"da".to_vec())).unwrap();
        let second = frame("llo");
        let mut tail = second[2..].to_vec();
        tail.extend_from_slice(b"\ndata: [DONE]\n");
        h.tx.send(Ok(tail)).unwrap();
    };
    let (outcome, ()) = tokio::join!(h.controller.submit("Greet me", &[]), driver);

    assert_eq!(outcome.unwrap(), SessionOutcome::Completed);
    assert_eq!(h.controller.state(), SessionState::Idle);
    assert_eq!(
        assistant_text(&h.store, &conversation_id).as_deref(),
        Some("Hello")
    );

    let store = h.store.lock().unwrap();
    let conversation = store.conversation(&conversation_id).unwrap();
    assert_eq!(conversation.messages.len(), 2);
    assert_eq!(conversation.title, "Greet me");

    let seen = h.transport.seen.lock().unwrap();
    assert_eq!(seen[0].body.model, "test/model");
    assert_eq!(seen[0].headers.get("x-title").unwrap(), "Test Studio");
    assert_eq!(h.renderer.statuses().last().unwrap().0, "Done.");
}

#[tokio::test]
async fn test_cancel_after_two_deltas_keeps_partial_content() {
    let h = harness();
    let conversation_id = active_id(&h.store);

    let driver = async {
        h.tx.send(Ok(frame("Hel"))).unwrap();
        h.tx.send(Ok(frame("lo "))).unwrap();
        settle(|| assistant_text(&h.store, &conversation_id).as_deref() == Some("Hello ")).await;
        assert_eq!(h.controller.state(), SessionState::Streaming);
        assert!(h.controller.cancel());
        h.tx.send(Ok(frame("never"))).unwrap();
    };
    let (outcome, ()) = tokio::join!(h.controller.submit("hi", &[]), driver);

    assert_eq!(outcome.unwrap(), SessionOutcome::Cancelled);
    assert_eq!(h.controller.state(), SessionState::Idle);
    assert_eq!(
        assistant_text(&h.store, &conversation_id).as_deref(),
        Some("Hello ")
    );
    let (status, is_error) = h.renderer.statuses().last().cloned().unwrap();
    assert_eq!(status, "Stopped.");
    assert!(!is_error);
    assert!(!h.controller.cancel());
}

#[tokio::test]
async fn test_switching_conversation_mid_stream_keeps_target() {
    let h = harness();
    let original = active_id(&h.store);

    let driver = async {
        h.tx.send(Ok(frame("a"))).unwrap();
        settle(|| assistant_text(&h.store, &original).as_deref() == Some("a")).await;
        let newer = h.store.lock().unwrap().create_conversation().id.clone();
        h.tx.send(Ok(frame("b"))).unwrap();
        h.tx.send(Ok(b"data: [DONE]\n".to_vec())).unwrap();
        newer
    };
    let (outcome, newer) = tokio::join!(h.controller.submit("question", &[]), driver);

    assert_eq!(outcome.unwrap(), SessionOutcome::Completed);
    assert_eq!(assistant_text(&h.store, &original).as_deref(), Some("ab"));
    let store = h.store.lock().unwrap();
    assert_eq!(store.active_conversation_id(), Some(newer.as_str()));
    assert!(store.conversation(&newer).unwrap().messages.is_empty());
}

#[tokio::test]
async fn test_deleting_target_mid_stream_drops_deltas() {
    let h = harness();
    let original = active_id(&h.store);

    let driver = async {
        h.tx.send(Ok(frame("first"))).unwrap();
        settle(|| assistant_text(&h.store, &original).is_some_and(|t| t == "first")).await;
        h.store.lock().unwrap().delete_conversation(&original).unwrap();
        h.tx.send(Ok(frame("orphan"))).unwrap();
        h.tx.send(Ok(b"data: [DONE]\n".to_vec())).unwrap();
    };
    let (outcome, ()) = tokio::join!(h.controller.submit("question", &[]), driver);

    assert_eq!(outcome.unwrap(), SessionOutcome::Completed);
    let mut store = h.store.lock().unwrap();
    assert!(store.conversation(&original).is_none());
    let replacement = store.ensure_active_conversation();
    assert_eq!(replacement.title, "New chat");
    assert!(replacement.messages.is_empty());
}

#[tokio::test]
async fn test_second_send_while_streaming_is_rejected() {
    let h = harness();
    let conversation_id = active_id(&h.store);

    let driver = async {
        h.tx.send(Ok(frame("x"))).unwrap();
        settle(|| h.controller.state() == SessionState::Streaming).await;
        let rejected = h.controller.submit("again", &[]).await;
        h.tx.send(Ok(b"data: [DONE]\n".to_vec())).unwrap();
        rejected
    };
    let (outcome, rejected) = tokio::join!(h.controller.submit("first", &[]), driver);

    assert_eq!(outcome.unwrap(), SessionOutcome::Completed);
    assert_eq!(rejected.unwrap_err(), SessionError::Busy);
    let store = h.store.lock().unwrap();
    // Only the first turn and its reply.
    assert_eq!(store.conversation(&conversation_id).unwrap().messages.len(), 2);
}

#[tokio::test]
async fn test_transport_error_mid_stream_fails_with_partial_content() {
    let h = harness();
    let conversation_id = active_id(&h.store);

    let driver = async {
        h.tx.send(Ok(frame("par"))).unwrap();
        h.tx.send(Err(TransportError::network("connection reset"))).unwrap();
    };
    let (outcome, ()) = tokio::join!(h.controller.submit("q", &[]), driver);

    assert_eq!(
        outcome.unwrap(),
        SessionOutcome::Failed(TransportError::network("connection reset"))
    );
    assert_eq!(
        assistant_text(&h.store, &conversation_id).as_deref(),
        Some("par")
    );
    let (status, is_error) = h.renderer.statuses().last().cloned().unwrap();
    assert_eq!(status, "Network error: connection reset");
    assert!(is_error);
}

#[tokio::test]
async fn test_cancel_before_response_keeps_empty_placeholder() {
    let (controller, store, renderer) = controller_with(Arc::new(StalledTransport));
    let conversation_id = active_id(&store);

    let driver = async {
        settle(|| controller.state() == SessionState::Requesting).await;
        assert!(controller.cancel());
    };
    let (outcome, ()) = tokio::join!(controller.submit("anyone there?", &[]), driver);

    assert_eq!(outcome.unwrap(), SessionOutcome::Cancelled);
    assert_eq!(controller.state(), SessionState::Idle);
    let (status, is_error) = renderer.statuses().last().cloned().unwrap();
    assert_eq!(status, "Stopped.");
    assert!(!is_error);

    let store = store.lock().unwrap();
    let messages = &store.conversation(&conversation_id).unwrap().messages;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].content, "");
}

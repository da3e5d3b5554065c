//! Mock chat backend for testing
//!
//! Sessions replay queued scripts instead of calling a model, so turns can
//! be driven end to end without network I/O.

use crate::llm::{
    ChatBackend, ChatSession, FragmentStream, LlmError, ModelVariant, SessionConfig,
};
use async_trait::async_trait;
use futures::{stream, StreamExt};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// What a mock session does for one send
pub enum Script {
    /// Stream these items, then close
    Items(Vec<Result<String, LlmError>>),
    /// Fail before any fragment is produced
    OpenError(LlmError),
    /// Stream whatever the test pushes through the paired sender
    Live(mpsc::UnboundedReceiver<Result<String, LlmError>>),
}

/// Backend whose sessions share one script queue
#[derive(Default)]
pub struct ScriptedBackend {
    scripts: Arc<Mutex<VecDeque<Script>>>,
    /// Every session creation request, in order
    pub created: Mutex<Vec<(ModelVariant, SessionConfig)>>,
    /// Prompts sent through any session
    pub prompts: Arc<Mutex<Vec<String>>>,
    refuse_sessions: bool,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that behaves as if no credential is configured
    pub fn without_credential() -> Self {
        Self {
            refuse_sessions: true,
            ..Self::default()
        }
    }

    pub fn queue_reply(&self, fragments: &[&str]) {
        let items = fragments.iter().map(|f| Ok((*f).to_string())).collect();
        self.push(Script::Items(items));
    }

    pub fn queue_items(&self, items: Vec<Result<String, LlmError>>) {
        self.push(Script::Items(items));
    }

    pub fn queue_open_error(&self, error: LlmError) {
        self.push(Script::OpenError(error));
    }

    /// Queue a reply the test feeds fragment by fragment
    pub fn queue_live(&self) -> mpsc::UnboundedSender<Result<String, LlmError>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.push(Script::Live(rx));
        tx
    }

    pub fn created_sessions(&self) -> Vec<(ModelVariant, SessionConfig)> {
        self.created.lock().unwrap().clone()
    }

    pub fn recorded_prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn push(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }
}

impl ChatBackend for ScriptedBackend {
    fn create_session(
        &self,
        variant: ModelVariant,
        config: SessionConfig,
    ) -> Result<Arc<dyn ChatSession>, LlmError> {
        self.created.lock().unwrap().push((variant, config));
        if self.refuse_sessions {
            return Err(LlmError::configuration("no API key"));
        }
        Ok(Arc::new(ScriptedSession {
            variant,
            scripts: self.scripts.clone(),
            prompts: self.prompts.clone(),
        }))
    }
}

pub struct ScriptedSession {
    variant: ModelVariant,
    scripts: Arc<Mutex<VecDeque<Script>>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl ChatSession for ScriptedSession {
    fn variant(&self) -> ModelVariant {
        self.variant
    }

    async fn send_streaming(&self, text: &str) -> Result<FragmentStream, LlmError> {
        self.prompts.lock().unwrap().push(text.to_string());

        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(Script::Items(items)) => Ok(stream::iter(items).boxed()),
            Some(Script::OpenError(e)) => Err(e),
            Some(Script::Live(rx)) => Ok(UnboundedReceiverStream::new(rx).boxed()),
            None => Err(LlmError::network("No scripted reply queued")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{Chat, ChatSettings, MergeOutcome, RejectReason, SubmitOutcome, FAILURE_MESSAGE};
    use crate::conversation::{ConversationHandle, Entry, EntryId, Role, StoreEvent};
    use crate::llm::{LlmErrorKind, DEFAULT_PRO_RESPONSE_BUDGET};
    use crate::state_machine::EntryState;
    use std::time::Duration;
    use tokio::sync::broadcast;

    fn chat_with(backend: &Arc<ScriptedBackend>) -> Chat {
        Chat::new(backend.clone(), ChatSettings::default())
    }

    fn accept(chat: &Chat, text: &str) -> crate::chat::Turn {
        match chat.submit(text) {
            SubmitOutcome::Accepted(turn) => turn,
            SubmitOutcome::Rejected(reason) => panic!("rejected: {reason:?}"),
        }
    }

    /// Wait until the bot entry shows `text`
    async fn wait_for_text(events: &mut broadcast::Receiver<StoreEvent>, text: &str) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = events.recv().await.unwrap();
                if let StoreEvent::TextUpdated { entry, .. } = event {
                    if entry.text == text {
                        return;
                    }
                }
            }
        })
        .await
        .expect("timed out waiting for text");
    }

    fn texts(conversation: &ConversationHandle) -> Vec<(Role, String, EntryState)> {
        conversation
            .snapshot()
            .into_iter()
            .map(|e| (e.role, e.text, e.state))
            .collect()
    }

    #[tokio::test]
    async fn reply_streams_into_placeholder() {
        let backend = Arc::new(ScriptedBackend::new());
        let tx = backend.queue_live();
        let chat = chat_with(&backend);
        let (_, _, mut events) = chat.conversation().snapshot_and_subscribe();

        let turn = accept(&chat, "hello");
        assert_eq!(
            texts(chat.conversation()),
            vec![
                (Role::User, "hello".to_string(), EntryState::Finalized),
                (Role::Bot, String::new(), EntryState::Pending),
            ]
        );
        let handle = tokio::spawn(turn.run());

        tx.send(Ok("Hi".to_string())).unwrap();
        wait_for_text(&mut events, "Hi").await;
        assert!(chat.is_streaming());

        tx.send(Ok(" there".to_string())).unwrap();
        wait_for_text(&mut events, "Hi there").await;

        drop(tx);
        let outcome = handle.await.unwrap();
        assert!(matches!(outcome, MergeOutcome::Completed { fragments: 2 }));
        assert_eq!(
            texts(chat.conversation())[1],
            (Role::Bot, "Hi there".to_string(), EntryState::Finalized)
        );
    }

    #[tokio::test]
    async fn failure_before_fragments_shows_message() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.queue_open_error(LlmError::auth("API key not valid"));
        let chat = chat_with(&backend);

        let outcome = chat.send("hello").await.unwrap();
        assert!(matches!(outcome, MergeOutcome::Failed(_)));
        assert_eq!(
            texts(chat.conversation())[1],
            (Role::Bot, FAILURE_MESSAGE.to_string(), EntryState::Failed)
        );
        assert!(!chat.is_streaming());
    }

    #[tokio::test]
    async fn missing_session_fails_turn() {
        let backend = Arc::new(ScriptedBackend::without_credential());
        let chat = chat_with(&backend);
        assert!(!chat.has_session());

        let outcome = chat.send("hello").await.unwrap();
        match outcome {
            MergeOutcome::Failed(e) => assert_eq!(e.kind, LlmErrorKind::Configuration),
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(chat.conversation().snapshot()[1].text, FAILURE_MESSAGE);
    }

    #[tokio::test]
    async fn empty_submission_is_ignored() {
        let backend = Arc::new(ScriptedBackend::new());
        let chat = chat_with(&backend);

        assert!(matches!(
            chat.submit("   \n\t"),
            SubmitOutcome::Rejected(RejectReason::Empty)
        ));
        assert!(chat.conversation().snapshot().is_empty());
        assert!(backend.recorded_prompts().is_empty());
    }

    #[tokio::test]
    async fn submission_while_streaming_is_rejected() {
        let backend = Arc::new(ScriptedBackend::new());
        let tx = backend.queue_live();
        let chat = chat_with(&backend);

        let turn = accept(&chat, "first");
        let handle = tokio::spawn(turn.run());

        assert!(matches!(
            chat.submit("second"),
            SubmitOutcome::Rejected(RejectReason::Busy)
        ));
        assert_eq!(chat.conversation().snapshot().len(), 2);

        drop(tx);
        handle.await.unwrap();

        // Settled, so the next one goes through
        backend.queue_reply(&["ok"]);
        let outcome = chat.send("second").await.unwrap();
        assert!(outcome.is_completed());
        assert_eq!(chat.conversation().snapshot().len(), 4);
    }

    #[tokio::test]
    async fn store_fault_is_not_reported_as_busy() {
        let backend = Arc::new(ScriptedBackend::new());
        let chat = chat_with(&backend);
        chat.conversation()
            .with(|store| store.append(Entry::user(EntryId(u64::MAX), "last")))
            .unwrap();

        assert!(matches!(
            chat.submit("more"),
            SubmitOutcome::Rejected(RejectReason::Internal)
        ));
        assert_eq!(chat.conversation().snapshot().len(), 1);
        assert!(!chat.is_streaming());
        assert!(backend.recorded_prompts().is_empty());
    }

    #[tokio::test]
    async fn silent_reply_fails_and_frees_the_conversation() {
        let backend = Arc::new(ScriptedBackend::new());
        let _tx = backend.queue_live();
        backend.queue_reply(&["back"]);
        let chat = Chat::new(
            backend.clone(),
            ChatSettings {
                idle_timeout: Duration::from_millis(50),
                ..ChatSettings::default()
            },
        );

        let outcome = tokio::time::timeout(Duration::from_secs(5), chat.send("hello"))
            .await
            .expect("stalled reply never settled")
            .unwrap();
        assert!(!outcome.is_completed());
        let bot = &chat.conversation().snapshot()[1];
        assert_eq!(bot.state, EntryState::Failed);
        assert_eq!(bot.text, FAILURE_MESSAGE);

        let outcome = chat.send("again").await.unwrap();
        assert!(outcome.is_completed());
    }

    #[tokio::test]
    async fn turn_after_failure_is_accepted() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.queue_items(vec![Ok("par".into()), Err(LlmError::network("reset"))]);
        backend.queue_reply(&["fine"]);
        let chat = chat_with(&backend);

        chat.send("one").await.unwrap();
        let outcome = chat.send("two").await.unwrap();
        assert!(outcome.is_completed());

        let bots: Vec<String> = chat
            .conversation()
            .snapshot()
            .into_iter()
            .filter(|e| e.role == Role::Bot)
            .map(|e| e.text)
            .collect();
        assert_eq!(bots, vec![FAILURE_MESSAGE.to_string(), "fine".to_string()]);
    }

    #[tokio::test]
    async fn variant_switch_mid_stream_discards_reply() {
        let backend = Arc::new(ScriptedBackend::new());
        let tx = backend.queue_live();
        let chat = chat_with(&backend);
        let (_, _, mut events) = chat.conversation().snapshot_and_subscribe();

        let handle = tokio::spawn(accept(&chat, "hello").run());
        tx.send(Ok("a".to_string())).unwrap();
        wait_for_text(&mut events, "a").await;

        assert!(chat.change_variant(ModelVariant::Pro));
        assert!(chat.conversation().snapshot().is_empty());

        let _ = tx.send(Ok("b".to_string()));
        let outcome = handle.await.unwrap();
        assert!(matches!(outcome, MergeOutcome::Superseded));
        assert!(chat.conversation().snapshot().is_empty());
        assert!(!chat.is_streaming());
        assert_eq!(chat.variant(), ModelVariant::Pro);

        assert_eq!(
            backend.created_sessions(),
            vec![
                (ModelVariant::Flash, SessionConfig::default()),
                (
                    ModelVariant::Pro,
                    SessionConfig {
                        response_budget: Some(DEFAULT_PRO_RESPONSE_BUDGET)
                    }
                ),
            ]
        );
    }

    #[tokio::test]
    async fn same_variant_keeps_conversation() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.queue_reply(&["hi"]);
        let chat = chat_with(&backend);
        chat.send("hello").await.unwrap();

        assert!(!chat.change_variant(ModelVariant::Flash));
        assert_eq!(chat.conversation().snapshot().len(), 2);
        assert_eq!(backend.created_sessions().len(), 1);
    }

    #[tokio::test]
    async fn bot_entries_record_active_variant() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.queue_reply(&["thinking", "answer"]);
        let chat = Chat::new(
            backend.clone(),
            ChatSettings {
                initial_variant: ModelVariant::Pro,
                ..ChatSettings::default()
            },
        );

        chat.send("why").await.unwrap();
        let entries = chat.conversation().snapshot();
        assert_eq!(entries[0].model_variant, None);
        assert_eq!(entries[1].model_variant, Some(ModelVariant::Pro));
        assert_eq!(entries[1].text, "thinkinganswer");
    }

    #[tokio::test]
    async fn prompt_is_trimmed_before_sending() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.queue_reply(&["ok"]);
        let chat = chat_with(&backend);

        chat.send("  hello \n").await.unwrap();
        assert_eq!(backend.recorded_prompts(), vec!["hello".to_string()]);
        assert_eq!(chat.conversation().snapshot()[0].text, "hello");
    }

    #[tokio::test]
    async fn unrun_turn_does_not_block_conversation() {
        let backend = Arc::new(ScriptedBackend::new());
        let chat = chat_with(&backend);

        let turn = accept(&chat, "hello");
        drop(turn);
        assert!(!chat.is_streaming());
        assert_eq!(chat.conversation().snapshot()[1].state, EntryState::Failed);
    }
}

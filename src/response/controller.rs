use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    api::AssistApi,
    error::{AssistError, AssistResult},
};

use super::{
    context::{deeper_prompt, explain_prompt, search_prompt, ContextSnapshot},
    history::ConversationHistory,
    normalize::{paragraph_breaks, push_token},
    rate_limit::RateLimitWindow,
    server_limit::ServerLimit,
    state::{ResponseSnapshot, ResponseState, ResponseStatus},
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Result of asking for a new generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SubmitOutcome {
    Started { request_id: Uuid },
    RateLimited { wait_secs: u64, message: String },
    ServerLimited { seconds_remaining: u64, message: String },
}

impl SubmitOutcome {
    pub fn request_id(&self) -> Option<Uuid> {
        match self {
            SubmitOutcome::Started { request_id } => Some(*request_id),
            _ => None,
        }
    }
}

/// How the new request relates to the existing conversation.
enum Turn {
    /// New conversation; the prompt is recorded as history entry 0.
    Fresh {
        prompt: String,
        context: Option<ContextSnapshot>,
    },
    /// Follow-up; only the raw user text is recorded.
    FollowUp { prompt: String, raw: String },
}

struct InFlight {
    request_id: Uuid,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub fn client_limit_message(wait_secs: u64) -> String {
    format!("You've reached the request limit, please try again in {wait_secs} seconds.")
}

pub fn server_limit_message(seconds_remaining: u64) -> String {
    if seconds_remaining == 0 {
        "Too many requests, please try again shortly.".to_string()
    } else {
        format!("Too many requests, please try again in {seconds_remaining} seconds.")
    }
}

/// Runs one generation at a time and publishes its state to the popup.
#[derive(Clone)]
pub struct ResponseController {
    api: Arc<dyn AssistApi>,
    model: String,
    state: Arc<Mutex<ResponseState>>,
    window: Arc<Mutex<RateLimitWindow>>,
    server_limit: ServerLimit,
    in_flight: Arc<Mutex<Option<InFlight>>>,
    updates: Arc<watch::Sender<ResponseSnapshot>>,
}

impl ResponseController {
    pub fn new(
        api: Arc<dyn AssistApi>,
        model: impl Into<String>,
        window: RateLimitWindow,
        server_limit: ServerLimit,
    ) -> Self {
        let (tx, _) = watch::channel(ResponseSnapshot::default());
        Self {
            api,
            model: model.into(),
            state: Arc::new(Mutex::new(ResponseState::default())),
            window: Arc::new(Mutex::new(window)),
            server_limit,
            in_flight: Arc::new(Mutex::new(None)),
            updates: Arc::new(tx),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ResponseSnapshot> {
        self.updates.subscribe()
    }

    pub async fn snapshot(&self) -> ResponseSnapshot {
        self.state
            .lock()
            .await
            .snapshot(self.server_limit.seconds_remaining())
    }

    pub async fn history(&self) -> ConversationHistory {
        self.state.lock().await.history.clone()
    }

    pub fn server_limit(&self) -> &ServerLimit {
        &self.server_limit
    }

    /// Explain action: replaces the context and starts a new conversation.
    pub async fn explain(&self, context: ContextSnapshot) -> SubmitOutcome {
        let prompt = explain_prompt(&context);
        self.begin(Turn::Fresh {
            prompt,
            context: Some(context),
        })
        .await
    }

    /// Top-search action: a free-form question about the current selection.
    pub async fn search(&self, query: &str, context: ContextSnapshot) -> SubmitOutcome {
        let prompt = search_prompt(query, &context);
        self.begin(Turn::Fresh {
            prompt,
            context: Some(context),
        })
        .await
    }

    /// Starts a new conversation from an already constructed prompt.
    pub async fn submit(&self, prompt: impl Into<String>) -> SubmitOutcome {
        self.begin(Turn::Fresh {
            prompt: prompt.into(),
            context: None,
        })
        .await
    }

    /// Deeper follow-up built from the full history and the last context.
    /// Needs a conversation started by `explain` or `search`.
    pub async fn follow_up(&self, text: &str) -> AssistResult<SubmitOutcome> {
        let raw = text.trim();
        if raw.is_empty() {
            return Err(AssistError::EmptySelection);
        }

        let prompt = {
            let state = self.state.lock().await;
            match &state.context {
                Some(context) if !state.history.is_empty() => {
                    deeper_prompt(&state.history, context, raw)
                }
                _ => return Err(AssistError::NoConversation),
            }
        };

        Ok(self
            .begin(Turn::FollowUp {
                prompt,
                raw: raw.to_string(),
            })
            .await)
    }

    /// Drops the conversation and abandons any in-flight request. The server
    /// countdown keeps running.
    pub async fn reset(&self) {
        self.stop_in_flight().await;
        let mut state = self.state.lock().await;
        *state = ResponseState::default();
        self.publish(&state);
    }

    /// Waits for the in-flight request, if any, to settle.
    pub async fn wait_idle(&self) {
        let handle = self.in_flight.lock().await.take().map(|f| f.handle);
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    async fn gate(&self) -> Option<SubmitOutcome> {
        let seconds_remaining = self.server_limit.seconds_remaining();
        if seconds_remaining > 0 {
            let message = server_limit_message(seconds_remaining);
            self.show_transient(&message).await;
            return Some(SubmitOutcome::ServerLimited {
                seconds_remaining,
                message,
            });
        }

        let acquired = self.window.lock().await.try_acquire(Instant::now());
        if let Err(wait_secs) = acquired {
            log_info!("client rate limit hit, {wait_secs}s until next slot");
            let message = client_limit_message(wait_secs);
            self.show_transient(&message).await;
            return Some(SubmitOutcome::RateLimited { wait_secs, message });
        }
        None
    }

    async fn begin(&self, turn: Turn) -> SubmitOutcome {
        if let Some(rejected) = self.gate().await {
            return rejected;
        }

        self.stop_in_flight().await;

        let request_id = Uuid::new_v4();
        let prompt = {
            let mut state = self.state.lock().await;
            let prompt = match turn {
                Turn::Fresh { prompt, context } => {
                    state.history = ConversationHistory::start(prompt.clone());
                    if context.is_some() {
                        state.context = context;
                    }
                    prompt
                }
                Turn::FollowUp { prompt, raw } => {
                    state.history.push_user(raw);
                    prompt
                }
            };
            state.begin_request(request_id);
            self.publish(&state);
            prompt
        };

        log_info!("request {request_id} submitted");
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(self.clone().run(request_id, prompt, cancel.clone()));

        *self.in_flight.lock().await = Some(InFlight {
            request_id,
            cancel,
            handle,
        });

        SubmitOutcome::Started { request_id }
    }

    /// Stop-before-start: the previous request can never write into the new one.
    async fn stop_in_flight(&self) {
        if let Some(previous) = self.in_flight.lock().await.take() {
            log_debug!("cancelling request {}", previous.request_id);
            previous.cancel.cancel();
            previous.handle.abort();
        }
    }

    async fn run(self, request_id: Uuid, prompt: String, cancel: CancellationToken) {
        let streamed = tokio::select! {
            _ = cancel.cancelled() => return,
            result = self.stream_into_buffer(request_id, &prompt) => result,
        };

        let err = match streamed {
            Ok(()) => return self.complete(request_id).await,
            Err(AssistError::Cancelled) => return,
            Err(err) if err.is_server_rate_limited() => {
                return self.enter_server_limit(request_id).await
            }
            Err(err) => err,
        };

        log_warn!("stream failed for {request_id}, retrying without streaming: {err}");
        let fallback = tokio::select! {
            _ = cancel.cancelled() => return,
            result = self.api.generate(&prompt, &self.model) => result,
        };

        match fallback {
            Ok(text) => {
                let text = paragraph_breaks(&text);
                let current = self
                    .update(request_id, |s| {
                        s.status = ResponseStatus::Streaming;
                        s.buffer = text;
                    })
                    .await;
                if current {
                    self.complete(request_id).await;
                }
            }
            Err(err) if err.is_server_rate_limited() => self.enter_server_limit(request_id).await,
            Err(err) => self.fail(request_id, err).await,
        }
    }

    async fn stream_into_buffer(&self, request_id: Uuid, prompt: &str) -> AssistResult<()> {
        let mut stream = self.api.generate_stream(prompt, &self.model).await?;
        if !self
            .update(request_id, |s| s.status = ResponseStatus::Streaming)
            .await
        {
            return Err(AssistError::Cancelled);
        }

        while let Some(token) = stream.next().await {
            let token = token?;
            let current = self
                .update(request_id, |s| push_token(&mut s.buffer, &token))
                .await;
            if !current {
                return Err(AssistError::Cancelled);
            }
        }
        Ok(())
    }

    /// Applies `f` if `request_id` is still current. Returns whether it was.
    async fn update(&self, request_id: Uuid, f: impl FnOnce(&mut ResponseState)) -> bool {
        let mut state = self.state.lock().await;
        if !state.is_current(request_id) {
            return false;
        }
        f(&mut state);
        self.publish(&state);
        true
    }

    async fn complete(&self, request_id: Uuid) {
        let appended = {
            let mut state = self.state.lock().await;
            if !state.is_current(request_id) {
                return;
            }
            let appended = state.record_answer();
            state.status = ResponseStatus::Completed;
            state.transient = None;
            self.publish(&state);
            appended
        };
        log_info!("request {request_id} completed (answer recorded: {appended})");
        self.refresh_server_limit().await;
    }

    async fn fail(&self, request_id: Uuid, err: AssistError) {
        log_warn!("request {request_id} failed: {err}");
        let current = self
            .update(request_id, |s| {
                s.status = ResponseStatus::Failed;
                s.transient = None;
                s.error = Some(err.to_string());
            })
            .await;
        if current {
            self.refresh_server_limit().await;
        }
    }

    async fn enter_server_limit(&self, request_id: Uuid) {
        let status = self.api.limit_status().await;
        let seconds_remaining = status.seconds_remaining;
        log_info!("server rate limit for {request_id}, {seconds_remaining}s remaining");

        self.server_limit.start_countdown(seconds_remaining).await;
        let message = server_limit_message(seconds_remaining);
        self.update(request_id, |s| {
            s.status = ResponseStatus::RateLimited;
            s.buffer.clear();
            s.transient = Some(message);
        })
        .await;
    }

    async fn refresh_server_limit(&self) {
        let status = self.api.limit_status().await;
        self.server_limit
            .start_countdown(status.seconds_remaining)
            .await;
    }

    /// A running request keeps its status; the notice rides along until it settles.
    async fn show_transient(&self, message: &str) {
        let streaming = matches!(
            self.in_flight.lock().await.as_ref(),
            Some(f) if !f.handle.is_finished()
        );
        let mut state = self.state.lock().await;
        if !streaming {
            state.status = ResponseStatus::RateLimited;
        }
        state.transient = Some(message.to_string());
        self.publish(&state);
    }

    fn publish(&self, state: &ResponseState) {
        self.updates
            .send_replace(state.snapshot(self.server_limit.seconds_remaining()));
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{collections::VecDeque, sync::Mutex as StdMutex};

    use async_trait::async_trait;
    use bytes::Bytes;
    use tokio::time::{self, Duration};

    use super::*;
    use crate::{
        api::{AudioStream, LimitStatus, SpeakOptions, TokenStream},
        response::history::Role,
        selection::PageContext,
    };

    pub(crate) enum Script {
        Tokens(Vec<&'static str>),
        Fail(AssistError),
        FailAfter(Vec<&'static str>, AssistError),
        Hang,
    }

    #[derive(Default)]
    pub(crate) struct FakeApi {
        streams: StdMutex<VecDeque<Script>>,
        fallbacks: StdMutex<VecDeque<AssistResult<String>>>,
        limit: StdMutex<LimitStatus>,
        pub prompts: StdMutex<Vec<String>>,
    }

    impl FakeApi {
        pub(crate) fn script(self, script: Script) -> Self {
            self.streams.lock().unwrap().push_back(script);
            self
        }

        fn fallback(self, result: AssistResult<String>) -> Self {
            self.fallbacks.lock().unwrap().push_back(result);
            self
        }

        fn limited_for(self, seconds: u64) -> Self {
            *self.limit.lock().unwrap() = LimitStatus {
                limited: seconds > 0,
                remaining_count: 0,
                window_ms: 60_000,
                seconds_remaining: seconds,
            };
            self
        }
    }

    #[async_trait]
    impl AssistApi for FakeApi {
        async fn generate(&self, prompt: &str, _model: &str) -> AssistResult<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.fallbacks
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AssistError::network("no fallback scripted")))
        }

        async fn generate_stream(&self, prompt: &str, _model: &str) -> AssistResult<TokenStream> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let script = self
                .streams
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Script::Tokens(vec!["ok"]));
            let ok = |tokens: Vec<&'static str>| tokens
                .into_iter()
                .map(|t| Ok::<String, AssistError>(t.to_string()));
            let stream: TokenStream = match script {
                Script::Tokens(tokens) => Box::pin(futures::stream::iter(ok(tokens))),
                Script::Fail(err) => return Err(err),
                Script::FailAfter(tokens, err) => Box::pin(futures::stream::iter(
                    ok(tokens).chain(std::iter::once(Err(err))),
                )),
                Script::Hang => Box::pin(futures::stream::pending::<AssistResult<String>>()),
            };
            Ok(stream)
        }

        async fn limit_status(&self) -> LimitStatus {
            *self.limit.lock().unwrap()
        }

        async fn speak(&self, _text: &str) -> AssistResult<Bytes> {
            Ok(Bytes::new())
        }

        async fn speak_stream(&self, _text: &str, _options: &SpeakOptions) -> AssistResult<AudioStream> {
            Ok(Box::pin(futures::stream::empty::<AssistResult<Bytes>>()))
        }
    }

    fn controller(api: FakeApi) -> (ResponseController, Arc<FakeApi>) {
        let api = Arc::new(api);
        let controller = ResponseController::new(
            api.clone(),
            "test-model",
            RateLimitWindow::default(),
            ServerLimit::new(),
        );
        (controller, api)
    }

    fn relativity() -> ContextSnapshot {
        ContextSnapshot::new(
            "E=mc²",
            PageContext {
                paragraph: "Mass and energy are interchangeable.".into(),
                heading: "Relativity".into(),
                url: "https://example.com".into(),
            },
        )
    }

    #[tokio::test]
    async fn explain_streams_normalized_answer_into_history() {
        let (controller, api) =
            controller(FakeApi::default().script(Script::Tokens(vec!["The ", "theory. ", "  More."])));

        let outcome = controller.explain(relativity()).await;
        assert!(outcome.request_id().is_some());
        controller.wait_idle().await;

        let history = controller.history().await;
        let expected_prompt = explain_prompt(&relativity());
        assert_eq!(history.len(), 2);
        assert_eq!(history.entries()[0].role, Role::User);
        assert_eq!(history.entries()[0].content, expected_prompt);
        assert_eq!(history.entries()[1].content, "The theory.\n\nMore.");
        assert_eq!(api.prompts.lock().unwrap().as_slice(), [expected_prompt]);

        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.status, ResponseStatus::Completed);
        assert_eq!(snapshot.text, "The theory.\n\nMore.");
        assert_eq!(snapshot.transcript.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn server_429_shows_transient_message_and_counts_down() {
        let (controller, _api) = controller(
            FakeApi::default()
                .script(Script::Fail(AssistError::http(429, "Too Many Requests")))
                .limited_for(42),
        );

        controller.explain(relativity()).await;
        controller.wait_idle().await;

        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.status, ResponseStatus::RateLimited);
        assert_eq!(
            snapshot.transient.as_deref(),
            Some("Too many requests, please try again in 42 seconds.")
        );
        assert!(snapshot.error.is_none());
        assert_eq!(controller.history().await.len(), 1);
        assert_eq!(controller.server_limit().seconds_remaining(), 42);

        let blocked = controller.submit("again").await;
        assert!(matches!(blocked, SubmitOutcome::ServerLimited { seconds_remaining: 42, .. }));

        time::sleep(Duration::from_millis(41_500)).await;
        assert_eq!(controller.server_limit().seconds_remaining(), 1);
        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(controller.server_limit().seconds_remaining(), 0);
    }

    #[tokio::test]
    async fn broken_stream_falls_back_to_full_response() {
        let (controller, api) = controller(
            FakeApi::default()
                .script(Script::FailAfter(vec!["partial"], AssistError::network("connection reset")))
                .fallback(Ok("First.   Second.".into())),
        );

        controller.submit("prompt").await;
        controller.wait_idle().await;

        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.status, ResponseStatus::Completed);
        assert_eq!(snapshot.text, "First.\n\nSecond.");
        assert_eq!(api.prompts.lock().unwrap().len(), 2);
        assert_eq!(controller.history().await.len(), 2);
    }

    #[tokio::test]
    async fn failed_fallback_surfaces_error_without_history() {
        let (controller, _api) = controller(
            FakeApi::default()
                .script(Script::Fail(AssistError::http(500, "boom")))
                .fallback(Err(AssistError::http(503, "unavailable"))),
        );

        controller.submit("prompt").await;
        controller.wait_idle().await;

        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.status, ResponseStatus::Failed);
        assert_eq!(snapshot.error.as_deref(), Some("HTTP 503: unavailable"));
        assert_eq!(controller.history().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sixth_request_in_a_minute_is_rejected_then_allowed() {
        let (controller, _api) = controller(FakeApi::default());

        for i in 0..5 {
            let outcome = controller.submit(format!("prompt {i}")).await;
            assert!(outcome.request_id().is_some());
            controller.wait_idle().await;
        }

        let rejected = controller.submit("prompt 5").await;
        match rejected {
            SubmitOutcome::RateLimited { wait_secs, ref message } => {
                assert!(wait_secs > 0);
                assert_eq!(message, &client_limit_message(wait_secs));
            }
            other => panic!("expected client rate limit, got {other:?}"),
        }
        let history = controller.history().await;
        assert_eq!(history.entries()[0].content, "prompt 4");

        time::sleep(Duration::from_secs(60)).await;
        assert!(controller.submit("prompt 5").await.request_id().is_some());
    }

    #[tokio::test]
    async fn follow_up_records_raw_text_and_sends_deeper_prompt() {
        let (controller, api) = controller(
            FakeApi::default()
                .script(Script::Tokens(vec!["Energy equals mass."]))
                .script(Script::Tokens(vec!["c is the speed of light."])),
        );

        controller.explain(relativity()).await;
        controller.wait_idle().await;
        controller.follow_up("  What is c?  ").await.unwrap();
        controller.wait_idle().await;

        let history = controller.history().await;
        let contents: Vec<&str> = history.entries().iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents.len(), 4);
        assert_eq!(contents[2], "What is c?");
        assert_eq!(contents[3], "c is the speed of light.");

        {
            let prompts = api.prompts.lock().unwrap();
            assert!(prompts[1].contains("Assistant: Energy equals mass."));
            assert!(prompts[1].contains("User: What is c?"));
        }

        assert_eq!(
            controller.follow_up("   ").await,
            Err(AssistError::EmptySelection)
        );
    }

    #[tokio::test]
    async fn new_submission_abandons_the_in_flight_stream() {
        let (controller, _api) = controller(
            FakeApi::default()
                .script(Script::Hang)
                .script(Script::Tokens(vec!["second"])),
        );

        let first = controller.submit("first").await.request_id().unwrap();
        tokio::task::yield_now().await;
        let second = controller.submit("second").await.request_id().unwrap();
        assert_ne!(first, second);
        controller.wait_idle().await;

        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.request_id, Some(second));
        assert_eq!(snapshot.text, "second");
        let history = controller.history().await;
        assert_eq!(history.entries()[0].content, "second");
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn follow_up_needs_a_conversation() {
        let (controller, api) = controller(FakeApi::default());
        assert_eq!(
            controller.follow_up("why?").await,
            Err(AssistError::NoConversation)
        );

        controller.explain(relativity()).await;
        controller.wait_idle().await;
        controller.reset().await;
        assert_eq!(
            controller.follow_up("why?").await,
            Err(AssistError::NoConversation)
        );

        assert!(controller.history().await.is_empty());
        assert_eq!(api.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rejection_during_stream_keeps_request_status() {
        let api = Arc::new(FakeApi::default().script(Script::Tokens(vec!["An ", "answer."])));
        let controller = ResponseController::new(
            api.clone(),
            "test-model",
            RateLimitWindow::new(1, 60_000),
            ServerLimit::new(),
        );

        let started = controller.explain(relativity()).await;
        assert!(started.request_id().is_some());
        let rejected = controller.submit("again").await;
        assert!(matches!(rejected, SubmitOutcome::RateLimited { .. }));

        let during = controller.snapshot().await;
        assert_ne!(during.status, ResponseStatus::RateLimited);
        assert!(during.transient.is_some());

        controller.wait_idle().await;
        let done = controller.snapshot().await;
        assert_eq!(done.status, ResponseStatus::Completed);
        assert_eq!(done.text, "An answer.");
        assert_eq!(done.transient, None);
        assert_eq!(controller.history().await.len(), 2);
    }

    #[tokio::test]
    async fn reset_clears_conversation() {
        let (controller, _api) = controller(FakeApi::default().script(Script::Hang));
        controller.submit("prompt").await;
        controller.reset().await;

        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot, ResponseSnapshot::default());
        assert!(controller.history().await.is_empty());
    }
}

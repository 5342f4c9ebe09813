//! Text-to-speech requests. Playback itself belongs to the host's [`AudioOutput`];
//! status is `Playing` only while audio is being handed over.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use bytes::Bytes;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time,
};
use tokio_util::sync::CancellationToken;

use crate::{
    api::{AssistApi, SpeakOptions},
    error::{AssistError, AssistResult},
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SpeechStatus {
    #[default]
    Idle,
    Loading,
    Playing,
}

pub trait AudioOutput: Send + Sync {
    /// Plays a complete clip, replacing anything already playing.
    fn play(&self, clip: Bytes) -> Result<()>;

    /// Appends a chunk of a streamed clip.
    fn push(&self, chunk: Bytes) -> Result<()>;

    fn stop(&self);
}

pub type ErrorSink = Arc<dyn Fn(AssistError) + Send + Sync>;

struct ActiveSpeech {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Clone)]
pub struct SpeechController {
    api: Arc<dyn AssistApi>,
    output: Arc<dyn AudioOutput>,
    on_error: ErrorSink,
    status: Arc<watch::Sender<SpeechStatus>>,
    active: Arc<Mutex<Option<ActiveSpeech>>>,
    timeout: Duration,
}

impl SpeechController {
    pub fn new(
        api: Arc<dyn AssistApi>,
        output: Arc<dyn AudioOutput>,
        on_error: ErrorSink,
        timeout: Duration,
    ) -> Self {
        let (tx, _) = watch::channel(SpeechStatus::Idle);
        Self {
            api,
            output,
            on_error,
            status: Arc::new(tx),
            active: Arc::new(Mutex::new(None)),
            timeout,
        }
    }

    pub fn status(&self) -> SpeechStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SpeechStatus> {
        self.status.subscribe()
    }

    /// Fetches the whole clip, then hands it to the output.
    pub async fn speak(&self, text: &str) -> Result<(), AssistError> {
        let text = non_empty(text)?;
        self.start(text, None).await;
        Ok(())
    }

    /// Streams audio chunks to the output as they arrive.
    pub async fn speak_streaming(&self, text: &str, options: SpeakOptions) -> Result<(), AssistError> {
        let text = non_empty(text)?;
        self.start(text, Some(options)).await;
        Ok(())
    }

    pub async fn stop(&self) {
        if let Some(active) = self.active.lock().await.take() {
            active.cancel.cancel();
            active.handle.abort();
        }
        self.output.stop();
        self.status.send_replace(SpeechStatus::Idle);
    }

    pub async fn wait(&self) {
        let handle = self.active.lock().await.take().map(|a| a.handle);
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    async fn start(&self, text: String, streaming: Option<SpeakOptions>) {
        self.stop().await;

        let cancel = CancellationToken::new();
        self.status.send_replace(SpeechStatus::Loading);
        log_debug!("speech requested ({} chars)", text.len());

        let worker = self.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let result = tokio::select! {
                _ = token.cancelled() => return,
                result = worker.fetch_and_play(&text, streaming) => result,
            };
            if let Err(err) = result {
                log_warn!("speech failed: {err}");
                worker.output.stop();
                worker.status.send_replace(SpeechStatus::Idle);
                (worker.on_error)(err);
                return;
            }
            worker.status.send_replace(SpeechStatus::Idle);
        });

        *self.active.lock().await = Some(ActiveSpeech { cancel, handle });
    }

    async fn fetch_and_play(&self, text: &str, streaming: Option<SpeakOptions>) -> AssistResult<()> {
        match streaming {
            None => {
                let clip = time::timeout(self.timeout, self.api.speak(text))
                    .await
                    .map_err(|_| AssistError::AudioTimeout)??;
                self.status.send_replace(SpeechStatus::Playing);
                self.output
                    .play(clip)
                    .map_err(|e| AssistError::network(format!("audio output failed: {e}")))
            }
            Some(options) => {
                let mut stream = time::timeout(self.timeout, self.api.speak_stream(text, &options))
                    .await
                    .map_err(|_| AssistError::AudioTimeout)??;
                self.status.send_replace(SpeechStatus::Playing);
                while let Some(chunk) = stream.next().await {
                    self.output
                        .push(chunk?)
                        .map_err(|e| AssistError::network(format!("audio output failed: {e}")))?;
                }
                Ok(())
            }
        }
    }
}

fn non_empty(text: &str) -> AssistResult<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AssistError::EmptySelection);
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use super::*;
    use crate::api::{AudioStream, LimitStatus, TokenStream};

    struct SlowSpeechApi {
        delay: Duration,
    }

    #[async_trait]
    impl AssistApi for SlowSpeechApi {
        async fn generate(&self, _prompt: &str, _model: &str) -> AssistResult<String> {
            Ok(String::new())
        }

        async fn generate_stream(&self, _prompt: &str, _model: &str) -> AssistResult<TokenStream> {
            Ok(Box::pin(futures::stream::empty::<AssistResult<String>>()))
        }

        async fn limit_status(&self) -> LimitStatus {
            LimitStatus::unlimited()
        }

        async fn speak(&self, text: &str) -> AssistResult<Bytes> {
            time::sleep(self.delay).await;
            Ok(Bytes::from(text.to_string()))
        }

        async fn speak_stream(&self, text: &str, _options: &SpeakOptions) -> AssistResult<AudioStream> {
            let chunks: Vec<AssistResult<Bytes>> = text
                .split(' ')
                .map(|w| Ok(Bytes::from(w.to_string())))
                .collect();
            Ok(Box::pin(futures::stream::iter(chunks)))
        }
    }

    #[derive(Default)]
    struct RecordingOutput {
        played: StdMutex<Vec<Bytes>>,
        stops: StdMutex<usize>,
    }

    impl AudioOutput for RecordingOutput {
        fn play(&self, clip: Bytes) -> Result<()> {
            self.played.lock().unwrap().push(clip);
            Ok(())
        }

        fn push(&self, chunk: Bytes) -> Result<()> {
            self.played.lock().unwrap().push(chunk);
            Ok(())
        }

        fn stop(&self) {
            *self.stops.lock().unwrap() += 1;
        }
    }

    fn speech(delay: Duration) -> (SpeechController, Arc<RecordingOutput>, Arc<StdMutex<Vec<AssistError>>>) {
        let output = Arc::new(RecordingOutput::default());
        let errors = Arc::new(StdMutex::new(Vec::new()));
        let sink_errors = errors.clone();
        let controller = SpeechController::new(
            Arc::new(SlowSpeechApi { delay }),
            output.clone(),
            Arc::new(move |err| sink_errors.lock().unwrap().push(err)),
            Duration::from_secs(30),
        );
        (controller, output, errors)
    }

    #[tokio::test(start_paused = true)]
    async fn clip_is_handed_to_output() {
        let (speech, output, errors) = speech(Duration::from_secs(1));
        speech.speak("hello").await.unwrap();
        assert_eq!(speech.status(), SpeechStatus::Loading);
        speech.wait().await;

        assert_eq!(speech.status(), SpeechStatus::Idle);
        assert_eq!(output.played.lock().unwrap().as_slice(), [Bytes::from("hello")]);
        assert!(errors.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_reports_error_and_returns_to_idle() {
        let (speech, output, errors) = speech(Duration::from_secs(90));
        speech.speak("slow").await.unwrap();
        speech.wait().await;

        assert_eq!(speech.status(), SpeechStatus::Idle);
        assert_eq!(errors.lock().unwrap().as_slice(), [AssistError::AudioTimeout]);
        assert!(output.played.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn new_request_stops_the_previous_one() {
        let (speech, output, _errors) = speech(Duration::from_secs(5));
        speech.speak("first").await.unwrap();
        speech.speak("second").await.unwrap();
        speech.wait().await;

        assert_eq!(output.played.lock().unwrap().as_slice(), [Bytes::from("second")]);
        assert!(*output.stops.lock().unwrap() >= 2);
    }

    #[tokio::test]
    async fn streamed_chunks_arrive_in_order() {
        let (speech, output, _errors) = speech(Duration::ZERO);
        speech
            .speak_streaming("a b c", SpeakOptions::default())
            .await
            .unwrap();
        speech.wait().await;
        assert_eq!(
            output.played.lock().unwrap().as_slice(),
            [Bytes::from("a"), Bytes::from("b"), Bytes::from("c")]
        );
    }

    #[tokio::test]
    async fn blank_text_is_rejected() {
        let (speech, _output, _errors) = speech(Duration::ZERO);
        assert_eq!(speech.speak("  ").await, Err(AssistError::EmptySelection));
        assert_eq!(speech.status(), SpeechStatus::Idle);
    }
}

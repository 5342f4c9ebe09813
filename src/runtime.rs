use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

use crate::{
    api::{AssistApi, HttpAssistClient},
    error::{AssistError, AssistResult},
    events::{LifecycleBus, PopupEvent},
    overlay::{OverlayRenderer, OverlaySurface},
    response::{
        ContextSnapshot, RateLimitWindow, ResponseController, ResponseSnapshot, ServerLimit,
        SubmitOutcome,
    },
    selection::{
        EventDisposition, LockEvent, PageContext, PageHost, SelectionLock, SelectionSnapshot,
    },
    settings::Settings,
    visibility::{FrameScheduler, PopupInput, TickOutcome, VisibilityController},
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Raw page events forwarded by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "key", rename_all = "camelCase")]
pub enum PageEvent {
    SelectionChange,
    MouseDown,
    MouseUp,
    Scroll,
    Resize,
    KeyUp(String),
    PointerEnter,
    PointerLeave,
}

/// Owns every per-page resource: one popup, one overlay node, one selection
/// lock. The host drives it with page events and animation frames.
pub struct AssistRuntime<H: PageHost, S: OverlaySurface> {
    host: H,
    visibility: VisibilityController,
    scheduler: FrameScheduler,
    overlay: OverlayRenderer<S>,
    lock: SelectionLock,
    bus: LifecycleBus,
    responses: ResponseController,
    last_tick: Option<TickOutcome>,
}

impl<H: PageHost, S: OverlaySurface> AssistRuntime<H, S> {
    pub fn new(host: H, surface: S, settings: &Settings, api: Arc<dyn AssistApi>) -> Self {
        let responses = ResponseController::new(
            api,
            settings.model.clone(),
            RateLimitWindow::new(settings.rate_limit, settings.rate_window_ms),
            ServerLimit::new(),
        );

        Self {
            host,
            visibility: VisibilityController::new(settings.popup_margin_px, settings.corner_margin_px),
            scheduler: FrameScheduler::new(),
            overlay: OverlayRenderer::new(surface),
            lock: SelectionLock::new(),
            bus: LifecycleBus::new(),
            responses,
            last_tick: None,
        }
    }

    /// Builds the runtime against the HTTP backend named in `settings`.
    pub fn connect(host: H, surface: S, settings: &Settings) -> Result<Self> {
        let client = HttpAssistClient::new(
            settings.api_base_url.clone(),
            settings.request_timeout(),
            settings.speech_timeout(),
        )
        .with_context(|| format!("Failed to create client for {}", settings.api_base_url))?;
        log_info!("assistant backend at {}", settings.api_base_url);
        Ok(Self::new(host, surface, settings, Arc::new(client)))
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn overlay(&self) -> &OverlayRenderer<S> {
        &self.overlay
    }

    pub fn visibility(&self) -> &VisibilityController {
        &self.visibility
    }

    pub fn responses(&self) -> &ResponseController {
        &self.responses
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_active()
    }

    pub fn frame_passes(&self) -> u64 {
        self.scheduler.passes()
    }

    pub fn last_tick(&self) -> Option<&TickOutcome> {
        self.last_tick.as_ref()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PopupEvent> {
        self.bus.subscribe()
    }

    pub fn subscribe_responses(&self) -> watch::Receiver<ResponseSnapshot> {
        self.responses.subscribe()
    }

    /// Folds an event into the visibility flags. Returns `true` when the host
    /// must schedule an animation frame.
    pub fn handle_page_event(&mut self, event: PageEvent) -> bool {
        match event {
            PageEvent::MouseDown => self.visibility.apply(PopupInput::MouseDown),
            PageEvent::MouseUp => self.visibility.apply(PopupInput::MouseUp),
            PageEvent::PointerEnter => self.visibility.apply(PopupInput::PointerEnter),
            PageEvent::PointerLeave => self.visibility.apply(PopupInput::PointerLeave),
            PageEvent::KeyUp(ref key) if key == "Escape" => {
                self.escape();
            }
            _ => {}
        }
        self.scheduler.request()
    }

    /// Runs the pending reconciliation pass, if any.
    pub async fn on_animation_frame(&mut self) -> Option<TickOutcome> {
        let blocks = self.overlay.block_rects();
        let host = &self.host;
        let visibility = &mut self.visibility;
        let outcome = self
            .scheduler
            .run_frame(|| visibility.reconcile(host, &blocks))?;

        match outcome.signal {
            Some(PopupEvent::Close) => {
                self.teardown().await;
                self.bus.emit(PopupEvent::Close);
            }
            Some(event) => self.bus.emit(event),
            None => {}
        }

        self.last_tick = Some(outcome.clone());
        Some(outcome)
    }

    /// Pins or unpins the popup; the selection lock follows the pin.
    pub fn set_pinned(&mut self, pinned: bool) -> bool {
        if self.visibility.flags().pinned == pinned {
            return false;
        }
        self.visibility.apply(PopupInput::Pin(pinned));
        if pinned {
            self.lock.add();
        } else {
            self.lock.remove();
        }
        self.bus.emit(PopupEvent::Pin { pinned });
        self.scheduler.request()
    }

    /// Explicit dismissal. The popup stays hidden until the selection text
    /// changes.
    pub fn force_close(&mut self) -> bool {
        log_debug!("force close");
        let was_pinned = self.visibility.flags().pinned;
        self.visibility.apply(PopupInput::ForceClose);
        self.lock.remove();
        if was_pinned {
            self.bus.emit(PopupEvent::Pin { pinned: false });
        }
        self.bus.emit(PopupEvent::ForceClose);
        self.scheduler.request()
    }

    /// Applies document-level gesture suppression while a response is open.
    pub fn filter_document_event(&self, event: &LockEvent) -> EventDisposition {
        self.lock.filter(event)
    }

    /// Explain action on the current selection.
    pub async fn explain(&mut self) -> AssistResult<SubmitOutcome> {
        let snapshot = self.current_selection().ok_or(AssistError::EmptySelection)?;
        let context = ContextSnapshot::new(snapshot.text.clone(), self.page_context());
        self.highlight(&snapshot);

        let outcome = self.responses.explain(context).await;
        self.pin_for_response().await;
        Ok(outcome)
    }

    /// Free-form question with whatever is selected as context.
    pub async fn search(&mut self, query: &str) -> AssistResult<SubmitOutcome> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AssistError::EmptySelection);
        }

        let snapshot = self.current_selection();
        let selection = snapshot.as_ref().map(|s| s.text.clone()).unwrap_or_default();
        let context = ContextSnapshot::new(selection, self.page_context());
        if let Some(snapshot) = &snapshot {
            self.highlight(snapshot);
        }

        let outcome = self.responses.search(query, context).await;
        self.pin_for_response().await;
        Ok(outcome)
    }

    pub async fn follow_up(&mut self, text: &str) -> AssistResult<SubmitOutcome> {
        let outcome = self.responses.follow_up(text).await?;
        self.pin_for_response().await;
        Ok(outcome)
    }

    /// Response view closed by the user.
    pub fn close_response(&mut self) -> bool {
        self.set_pinned(false)
    }

    fn escape(&mut self) {
        if self.visibility.flags().pinned {
            self.set_pinned(false);
        } else {
            self.force_close();
        }
    }

    /// The saved snapshot, or the live selection if no tick has captured it yet.
    fn current_selection(&self) -> Option<SelectionSnapshot> {
        if let Some(snapshot) = self.visibility.snapshot() {
            return Some(snapshot.clone());
        }
        match self.host.live_selection() {
            Ok(live) => live.as_ref().and_then(SelectionSnapshot::capture),
            Err(err) => {
                log_warn!("selection read failed: {err:?}");
                None
            }
        }
    }

    fn page_context(&self) -> PageContext {
        self.host.page_context().unwrap_or_else(|err| {
            log_warn!("page context unavailable: {err:?}");
            PageContext::default()
        })
    }

    fn highlight(&mut self, snapshot: &SelectionSnapshot) {
        if let Err(err) = self.overlay.render_from_range(&snapshot.range_rects) {
            log_warn!("overlay render failed: {err:?}");
        }
    }

    async fn pin_for_response(&mut self) {
        let status = self.responses.snapshot().await.status;
        if status.keeps_popup_pinned() {
            self.set_pinned(true);
        }
    }

    async fn teardown(&mut self) {
        self.overlay.clear();
        self.lock.remove();
        self.responses.reset().await;
    }
}

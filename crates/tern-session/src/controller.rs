//! Session controller: turns a backend event stream into UI state

use tokio_stream::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tern_ai::{
    Attachment, BackendEventStream, ConversationId, Provider, RawEvent, RequestId,
    ResourceCandidate, ResourceId, SendRequest, ThoughtUpdate, UsageSnapshot, models,
};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use crate::{
    backend::Backend,
    busy::{BusyState, Transition},
    classify::classify,
    correlation,
    error::{Error, Result},
    events::{ControllerUpdate, SessionEvent},
    quota::{self, FallbackOutcome},
    session::Session,
    throttle::{DEFAULT_THROTTLE_INTERVAL, Throttler},
    usage::SharedUsageStore,
};

/// Controller configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Backend family driving the conversation
    pub provider: Provider,
    /// Resource each conversation starts on
    pub resource: ResourceCandidate,
    /// Resources usable by the provider (fallback candidates)
    pub resources: Vec<ResourceCandidate>,
    /// Progress update cadence
    pub throttle_interval: Duration,
}

impl ControllerConfig {
    /// Configuration from the built-in catalog, starting on the provider's
    /// highest tier resource
    pub fn for_provider(provider: Provider) -> Result<Self> {
        let resource = models::default_resource(provider)
            .ok_or_else(|| Error::NoResource(provider.name().to_string()))?;
        Ok(Self {
            provider,
            resource,
            resources: models::get_resources(provider),
            throttle_interval: DEFAULT_THROTTLE_INTERVAL,
        })
    }
}

/// Imperative entry points for the UI layer, consumed by [`SessionController::run`]
#[derive(Debug, Clone)]
pub enum Command {
    /// Send a message on the active conversation
    Send {
        text: String,
        attachments: Vec<Attachment>,
    },
    /// Cancel whatever the backend is doing
    Stop,
    /// Attach to another conversation
    SwitchConversation(ConversationId),
    /// Replace the unsent input buffer
    SetDraft(String),
    /// Route subsequent requests to another resource
    SelectResource(ResourceId),
}

/// Drives one conversation at a time against a backend.
///
/// All state lives on the task that owns the controller; events, commands
/// and the progress throttle are sequenced through [`SessionController::run`]
/// or the individual methods.
pub struct SessionController {
    config: ControllerConfig,
    session: Session,
    backend: Arc<dyn Backend>,
    usage_store: SharedUsageStore,
    throttle: Throttler<ThoughtUpdate>,
    events: Option<BackendEventStream>,
    update_tx: broadcast::Sender<ControllerUpdate>,
}

impl SessionController {
    /// Create a controller and attach it to `conversation_id`
    pub async fn open(
        config: ControllerConfig,
        backend: Arc<dyn Backend>,
        usage_store: SharedUsageStore,
        conversation_id: ConversationId,
    ) -> Result<Self> {
        let (update_tx, _) = broadcast::channel(256);
        let mut controller = Self {
            throttle: Throttler::new(config.throttle_interval),
            session: Session::new(conversation_id.clone(), config.resource.clone()),
            config,
            backend,
            usage_store,
            events: None,
            update_tx,
        };
        controller.attach(conversation_id).await?;
        Ok(controller)
    }

    /// Subscribe to state updates
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerUpdate> {
        self.update_tx.subscribe()
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.session.conversation_id
    }

    /// Derived busy flag
    pub fn busy(&self) -> bool {
        self.session.is_busy()
    }

    /// The signals behind [`SessionController::busy`]
    pub fn busy_state(&self) -> BusyState {
        self.session.busy
    }

    pub fn progress(&self) -> Option<&ThoughtUpdate> {
        self.session.progress.as_ref()
    }

    pub fn usage(&self) -> Option<UsageSnapshot> {
        self.session.usage.last()
    }

    pub fn active_resource(&self) -> &ResourceCandidate {
        &self.session.active_resource
    }

    pub fn active_request(&self) -> Option<&RequestId> {
        self.session.active_request.as_ref()
    }

    /// Resources that hit quota limits in this conversation
    pub fn exhausted_resources(&self) -> Vec<ResourceId> {
        self.session.fallback.exhausted().iter().cloned().collect()
    }

    pub fn draft(&self) -> &str {
        &self.session.draft
    }

    pub fn set_draft(&mut self, draft: impl Into<String>) {
        self.session.draft = draft.into();
    }

    /// Route subsequent requests to `id`, resolved against the configured
    /// resources (unknown ids get an inferred tier).
    pub fn select_resource(&mut self, id: &ResourceId) {
        let candidate = self
            .config
            .resources
            .iter()
            .find(|c| &c.id == id)
            .cloned()
            .unwrap_or_else(|| ResourceCandidate::inferred(id.as_str()));
        tracing::debug!("Selected resource {}", candidate.id);
        self.session.active_resource = candidate;
    }

    /// Send a message on the active conversation.
    ///
    /// Returns the new request id once the backend accepted the request. A
    /// rejected dispatch is handled like an error event for that request.
    pub async fn send(&mut self, text: impl Into<String>) -> Result<RequestId> {
        self.send_with_attachments(text, Vec::new()).await
    }

    /// Send a message with attachments
    pub async fn send_with_attachments(
        &mut self,
        text: impl Into<String>,
        attachments: Vec<Attachment>,
    ) -> Result<RequestId> {
        let request_id = RequestId::generate();

        // Progress of the superseded request must not bleed into this one
        self.clear_progress();
        self.session.active_request = Some(request_id.clone());
        let transition = self.session.busy.on_send();
        self.apply_transition(transition);
        self.session.draft.clear();

        let request = SendRequest {
            conversation_id: self.session.conversation_id.clone(),
            request_id: request_id.clone(),
            resource: self.session.active_resource.id.clone(),
            text: text.into(),
            attachments,
        };
        tracing::debug!(
            "Dispatching request {} on {} via {}",
            request_id,
            request.conversation_id,
            request.resource
        );

        if let Err(e) = self.backend.send(request).await {
            if e.is_auth() {
                tracing::warn!("Backend rejected credentials for request {}: {}", request_id, e);
            } else {
                tracing::warn!("Failed to dispatch request {}: {}", request_id, e);
            }
            self.handle_error(Some(request_id), e.to_string());
            return Err(e.into());
        }
        Ok(request_id)
    }

    /// Cancel the current request.
    ///
    /// Local state is reset on every exit path, whether the backend accepts
    /// the command, rejects it, or this future is dropped mid-call. Calling
    /// it again is a no-op locally.
    pub async fn stop(&mut self) -> Result<()> {
        let backend = Arc::clone(&self.backend);
        let conversation_id = self.session.conversation_id.clone();

        let guard = ResetOnDrop { controller: self };
        let result = backend.stop(&conversation_id).await;
        drop(guard);

        result.map_err(|e| {
            tracing::warn!(
                "Stop command failed for conversation {}: {}",
                conversation_id,
                e
            );
            Error::from(e)
        })
    }

    /// Detach from the current conversation and attach to `conversation_id`.
    ///
    /// All session state is replaced; the persisted usage snapshot of the new
    /// conversation is restored.
    pub async fn switch_conversation(&mut self, conversation_id: ConversationId) -> Result<()> {
        tracing::debug!(
            "Switching conversation {} -> {}",
            self.session.conversation_id,
            conversation_id
        );
        self.events = None;
        self.throttle.cancel();

        let was_busy = self.session.is_busy();
        let had_progress = self.session.progress.is_some();
        self.session = Session::new(conversation_id.clone(), self.config.resource.clone());

        if was_busy {
            self.publish(ControllerUpdate::Busy(false));
        }
        if had_progress {
            self.publish(ControllerUpdate::Progress(None));
        }
        self.attach(conversation_id).await
    }

    async fn attach(&mut self, conversation_id: ConversationId) -> Result<()> {
        self.session
            .usage
            .restore(&conversation_id, self.usage_store.as_ref());
        if let Some(usage) = self.session.usage.last() {
            self.publish(ControllerUpdate::Usage(usage));
        }
        self.events = Some(self.backend.subscribe(&conversation_id).await?);
        Ok(())
    }

    /// Apply one backend event.
    pub fn handle_event(&mut self, raw: RawEvent) {
        if !correlation::belongs_to(&raw, &self.session.conversation_id) {
            tracing::debug!(
                "Ignoring event for conversation {} while attached to {}",
                raw.conversation_id,
                self.session.conversation_id
            );
            return;
        }

        let event = classify(raw);
        if !correlation::admit(&event, self.session.active_request.as_ref()) {
            tracing::debug!(
                "Dropping {} event for superseded request {:?}",
                event.kind(),
                event.request_id()
            );
            return;
        }

        match event {
            SessionEvent::Start { .. } => {
                let transition = self.session.busy.on_start();
                self.apply_transition(transition);
            }
            SessionEvent::Progress { thought, .. } => {
                if let Some(thought) = self.throttle.emit(thought, Instant::now()) {
                    self.set_progress(thought);
                }
            }
            SessionEvent::ToolBatch { request_id, tools } => {
                let transition = self.session.busy.on_tool_batch(&tools);
                self.apply_transition(transition);
                if !self.session.is_busy() {
                    self.session.settle(request_id.as_ref());
                }
            }
            SessionEvent::Content(content) => {
                self.publish(ControllerUpdate::Content(content));
            }
            SessionEvent::Usage { usage, .. } => {
                let conversation_id = self.session.conversation_id.clone();
                if self
                    .session
                    .usage
                    .record(&conversation_id, usage, self.usage_store.as_ref())
                {
                    self.publish(ControllerUpdate::Usage(usage));
                }
            }
            SessionEvent::Finish { request_id } => {
                if self.session.is_superseded(request_id.as_ref()) {
                    tracing::debug!("Stream of superseded request {:?} closed", request_id);
                    let transition = self.session.busy.on_superseded_end();
                    self.apply_transition(transition);
                    return;
                }
                let transition = self.session.busy.on_finish();
                self.apply_transition(transition);
                if !self.session.is_busy() {
                    self.session.settle(request_id.as_ref());
                }
            }
            SessionEvent::Error {
                request_id,
                message,
            } => {
                self.handle_error(request_id, message);
            }
            SessionEvent::Other(raw) => {
                self.publish(ControllerUpdate::Passthrough(raw));
            }
        }
    }

    /// When the held progress update becomes deliverable, if one is held
    pub fn progress_deadline(&self) -> Option<Instant> {
        self.throttle.deadline()
    }

    /// Deliver the held progress update if its window has closed
    pub fn poll_progress(&mut self, now: Instant) {
        if let Some(thought) = self.throttle.poll_flush(now) {
            self.set_progress(thought);
        }
    }

    /// Run the controller until the command channel closes.
    ///
    /// Commands, backend events and the progress throttle are handled one at
    /// a time on the calling task.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            let deadline = self.throttle.deadline();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.execute(command).await,
                    None => break,
                },
                next = next_event(&mut self.events), if self.events.is_some() => match next {
                    Some(raw) => self.handle_event(raw),
                    None => {
                        tracing::warn!(
                            "Event stream for conversation {} ended",
                            self.session.conversation_id
                        );
                        self.events = None;
                    }
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.poll_progress(Instant::now());
                }
            }
        }
    }

    async fn execute(&mut self, command: Command) {
        let result = match command {
            Command::Send { text, attachments } => self
                .send_with_attachments(text, attachments)
                .await
                .map(|_| ()),
            Command::Stop => self.stop().await,
            Command::SwitchConversation(id) => self.switch_conversation(id).await,
            Command::SetDraft(draft) => {
                self.set_draft(draft);
                Ok(())
            }
            Command::SelectResource(id) => {
                self.select_resource(&id);
                Ok(())
            }
        };
        if let Err(e) = result {
            tracing::warn!("Command failed: {}", e);
        }
    }

    fn handle_error(&mut self, request_id: Option<RequestId>, message: String) {
        let transition = if self.session.is_superseded(request_id.as_ref()) {
            self.session.busy.on_superseded_end()
        } else {
            self.session.busy.on_error()
        };
        self.apply_transition(transition);

        if quota::is_quota_exhausted(&message) {
            let key = request_id.clone().or_else(|| self.session.active_request.clone());
            self.fall_back(key.as_ref(), &message);
        } else {
            self.publish(ControllerUpdate::Error { message });
        }

        if !self.session.is_busy() {
            self.session.settle(request_id.as_ref());
        }
    }

    fn fall_back(&mut self, request_id: Option<&RequestId>, message: &str) {
        let current = self.session.active_resource.id.clone();
        match self
            .session
            .fallback
            .on_quota_failure(request_id, &current, &self.config.resources)
        {
            FallbackOutcome::Switched { from, to } => {
                tracing::info!("Resource {} exhausted ({}), switching to {}", from, message, to.id);
                let to_id = to.id.clone();
                self.session.active_resource = to;
                self.publish(ControllerUpdate::ResourceSwitched { from, to: to_id });
            }
            FallbackOutcome::NoFallback { resource } => {
                tracing::warn!("Resource {} exhausted ({}), no fallback available", resource, message);
                self.publish(ControllerUpdate::NoFallbackAvailable { resource });
            }
            FallbackOutcome::AlreadyHandled => {
                tracing::debug!("Quota failure for {:?} already handled", request_id);
            }
        }
    }

    /// Drop all local busy state. Used by `stop`, whatever the backend said.
    fn reset_local(&mut self) {
        let transition = self.session.busy.reset();
        self.apply_transition(transition);
        self.session.active_request = None;
    }

    fn apply_transition(&mut self, transition: Transition) {
        if transition.clear_progress {
            self.clear_progress();
        }
        if transition.busy_changed() {
            self.publish(ControllerUpdate::Busy(transition.is_busy));
        }
    }

    fn set_progress(&mut self, thought: ThoughtUpdate) {
        self.session.progress = Some(thought.clone());
        self.publish(ControllerUpdate::Progress(Some(thought)));
    }

    fn clear_progress(&mut self) {
        self.throttle.cancel();
        if self.session.progress.take().is_some() {
            self.publish(ControllerUpdate::Progress(None));
        }
    }

    fn publish(&self, update: ControllerUpdate) {
        let _ = self.update_tx.send(update);
    }
}

/// Resets local busy state when dropped
struct ResetOnDrop<'a> {
    controller: &'a mut SessionController,
}

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        self.controller.reset_local();
    }
}

async fn next_event(events: &mut Option<BackendEventStream>) -> Option<RawEvent> {
    match events {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

//! Worker bridge: the page-side API over a runtime session
//!
//! The bridge lazily creates one [`RuntimeSession`], serializes executions
//! through the session's in-flight slot, answers input requests through an
//! [`InputProvider`], and re-emits streamed output as [`PageEvent`]s.

use crate::session::{RuntimeOptions, RuntimeSession, SessionError};
use crate::worker::ToWorker;
use jacblog_types::{ExecutionRequest, PageEvent, WorkerMessage};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, Notify, OnceCell};
use tracing::{debug, warn};

/// Buffered page events per subscriber
const EVENT_CAPACITY: usize = 1024;

/// The reader declined to answer an input prompt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("input request cancelled")]
pub struct InputCancelled;

/// Answers the running program's `input()` calls
pub trait InputProvider: Send + Sync {
    fn request(&self, prompt: &str)
        -> impl Future<Output = Result<String, InputCancelled>> + Send;
}

/// Pre-recorded answers, handed out in order; rejects once exhausted
#[derive(Debug, Default)]
pub struct ScriptedInput {
    answers: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedInput {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// A provider that rejects every request
    pub fn none() -> Self {
        Self::default()
    }

    /// Prompts seen so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

impl InputProvider for ScriptedInput {
    fn request(&self, prompt: &str) -> impl Future<Output = Result<String, InputCancelled>> + Send {
        self.prompts.lock().push(prompt.to_string());
        let answer = self.answers.lock().pop_front();
        async move { answer.ok_or(InputCancelled) }
    }
}

/// Cooperative cancellation shared between a caller and an execution
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called
    pub async fn cancelled(&self) {
        loop {
            // Register before checking so a concurrent cancel is not missed
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Startup(#[from] SessionError),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("execution cancelled")]
    Cancelled,

    #[error("input request rejected: {0}")]
    InputRejected(#[source] InputCancelled),

    #[error("runtime worker disconnected")]
    Disconnected,
}

/// What a completed execution produced besides streamed output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// Graph payload, for commands that emit one
    pub dot: Option<String>,
    /// Number of input requests answered
    pub input_requests: usize,
}

enum InputOutcome {
    Answer(String),
    Rejected(InputCancelled),
    Cancelled,
    TimedOut,
}

/// Interrupts the program when an `execute` future is dropped before the
/// terminal message arrived; the next execution drains what is left
struct InFlight<'s> {
    session: &'s RuntimeSession,
    finished: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!("execution dropped while in flight; interrupting the program");
            self.session.abandon();
        }
    }
}

pub struct WorkerBridge {
    options: RuntimeOptions,
    session: OnceCell<Arc<RuntimeSession>>,
    events: broadcast::Sender<PageEvent>,
}

impl WorkerBridge {
    pub fn new(options: RuntimeOptions) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            options,
            session: OnceCell::new(),
            events,
        }
    }

    /// Receive page events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<PageEvent> {
        self.events.subscribe()
    }

    /// The session, if one has been started
    pub fn session(&self) -> Option<Arc<RuntimeSession>> {
        self.session.get().cloned()
    }

    pub fn is_ready(&self) -> bool {
        self.session.get().is_some_and(|s| s.is_ready())
    }

    /// Start the runtime once; concurrent callers share one startup
    ///
    /// A failed startup leaves the bridge uninitialized so a later call can
    /// try again.
    pub async fn ensure_initialized(&self) -> Result<Arc<RuntimeSession>, BridgeError> {
        let session = self
            .session
            .get_or_try_init(|| async {
                RuntimeSession::create(self.options.clone())
                    .await
                    .map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(session))
    }

    /// Run one request to completion
    ///
    /// Executions are served one at a time in call order. Output and graph
    /// messages are re-emitted as page events while the call is pending.
    pub async fn execute<I: InputProvider>(
        &self,
        request: ExecutionRequest,
        input: &I,
        cancel: &CancelToken,
    ) -> Result<ExecutionOutcome, BridgeError> {
        let session = self.ensure_initialized().await?;
        let mut inbox = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BridgeError::Cancelled),
            inbox = session.acquire() => inbox,
        };

        if session.is_abandoned() {
            self.discard_abandoned(&mut inbox).await;
            session.clear_abandoned();
        }

        debug!(command = %request.command, language = %request.language, "posting request");
        session.segment().reset();
        if !session.send(ToWorker::Execute(request)) {
            return Err(BridgeError::Disconnected);
        }

        let mut in_flight = InFlight {
            session: &session,
            finished: false,
        };
        let result = self
            .run_to_terminal(&session, &mut inbox, input, cancel)
            .await;
        in_flight.finished = true;
        result
    }

    /// Demultiplex worker messages until the execution's terminal message
    async fn run_to_terminal<I: InputProvider>(
        &self,
        session: &RuntimeSession,
        inbox: &mut mpsc::UnboundedReceiver<WorkerMessage>,
        input: &I,
        cancel: &CancelToken,
    ) -> Result<ExecutionOutcome, BridgeError> {
        let mut outcome = ExecutionOutcome::default();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                message = inbox.recv() => Some(message),
            };
            let Some(message) = next else {
                self.abort(session, inbox).await;
                return Err(BridgeError::Cancelled);
            };
            let Some(message) = message else {
                return Err(BridgeError::Disconnected);
            };

            match message {
                WorkerMessage::StreamingOutput { output, stream } => {
                    self.emit(PageEvent::Output { output, stream });
                }
                WorkerMessage::Dot { dot } => {
                    self.emit(PageEvent::GraphReady { dot: dot.clone() });
                    outcome.dot = Some(dot);
                }
                WorkerMessage::InputRequest { prompt } => {
                    outcome.input_requests += 1;
                    match self.await_input(input, &prompt, cancel).await {
                        InputOutcome::Answer(text) => {
                            session.segment().write_response(&text);
                        }
                        InputOutcome::TimedOut => {
                            // The worker has already given up on this request
                            warn!(prompt = %prompt, "input provider timed out");
                        }
                        InputOutcome::Rejected(reason) => {
                            self.abort(session, inbox).await;
                            return Err(BridgeError::InputRejected(reason));
                        }
                        InputOutcome::Cancelled => {
                            self.abort(session, inbox).await;
                            return Err(BridgeError::Cancelled);
                        }
                    }
                }
                WorkerMessage::ExecutionComplete => {
                    debug!(input_requests = outcome.input_requests, "execution complete");
                    return Ok(outcome);
                }
                WorkerMessage::Error { error } => {
                    warn!("runtime reported error: {}", error);
                    return Err(BridgeError::Runtime(error));
                }
                WorkerMessage::Ready => debug!("ignoring stray ready message"),
            }
        }
    }

    async fn await_input<I: InputProvider>(
        &self,
        input: &I,
        prompt: &str,
        cancel: &CancelToken,
    ) -> InputOutcome {
        let limit = self.options.input_timeout;
        let answer = async {
            match limit {
                Some(limit) => tokio::time::timeout(limit, input.request(prompt)).await.ok(),
                None => Some(input.request(prompt).await),
            }
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => InputOutcome::Cancelled,
            answer = answer => match answer {
                Some(Ok(text)) => InputOutcome::Answer(text),
                Some(Err(reason)) => InputOutcome::Rejected(reason),
                None => InputOutcome::TimedOut,
            },
        }
    }

    /// Interrupt the running program and wait for its terminal message
    async fn abort(
        &self,
        session: &RuntimeSession,
        inbox: &mut mpsc::UnboundedReceiver<WorkerMessage>,
    ) {
        session.segment().interrupt();
        while let Some(message) = inbox.recv().await {
            match message {
                WorkerMessage::StreamingOutput { output, stream } => {
                    self.emit(PageEvent::Output { output, stream });
                }
                message if message.is_terminal() => {
                    debug!(?message, "discarded terminal message of aborted execution");
                    return;
                }
                other => debug!(?other, "discarded message of aborted execution"),
            }
        }
    }

    /// Drain a dropped execution's remaining messages up to its terminal one
    async fn discard_abandoned(&self, inbox: &mut mpsc::UnboundedReceiver<WorkerMessage>) {
        debug!("draining abandoned execution");
        while let Some(message) = inbox.recv().await {
            if message.is_terminal() {
                debug!(?message, "discarded terminal message of abandoned execution");
                return;
            }
        }
    }

    fn emit(&self, event: PageEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Shut the session down; the next execution starts a fresh one
    pub async fn dispose(&mut self) {
        if let Some(session) = self.session.take() {
            session.dispose().await;
        }
    }
}

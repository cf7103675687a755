//! Sandboxed runtime: the background worker that owns the interpreter
//!
//! The worker is a dedicated OS thread. Commands arrive on a FIFO channel and
//! are processed one at a time; every command posts a terminal message
//! (`ExecutionComplete` or `Error`) so the page side never waits forever.

use crate::lang::{self, InputFailure, ScriptIo};
use crate::segment::{ControlSegment, SegmentWaitError};
use crate::vfs::{Vfs, LIB_PREFIX};
use jacblog_types::{ExecutionRequest, Stream, WorkerMessage};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Name of the worker thread
pub const WORKER_THREAD_NAME: &str = "jacblog-worker";

/// Deeply recursive snippets need more than the default thread stack
pub const WORKER_STACK_SIZE: usize = 64 * 1024 * 1024;

/// Messages from the page side to the worker
#[derive(Debug)]
pub enum ToWorker {
    /// Load the interpreter and support archive, then post `Ready`
    Init {
        segment: Arc<ControlSegment>,
        support_archive: Option<Vec<u8>>,
        input_timeout: Option<Duration>,
    },
    /// Run one request to completion
    Execute(ExecutionRequest),
    /// Stop the worker loop
    Shutdown,
}

/// Lifecycle of the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Uninitialized,
    Loading,
    Ready,
    Running,
}

/// Interpreter state owned by the worker thread
pub struct SandboxedRuntime {
    state: WorkerState,
    vfs: Vfs,
    segment: Option<Arc<ControlSegment>>,
    input_timeout: Option<Duration>,
    outbox: mpsc::UnboundedSender<WorkerMessage>,
}

impl SandboxedRuntime {
    pub fn new(outbox: mpsc::UnboundedSender<WorkerMessage>) -> Self {
        Self {
            state: WorkerState::Uninitialized,
            vfs: Vfs::new(),
            segment: None,
            input_timeout: None,
            outbox,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn vfs(&self) -> &Vfs {
        &self.vfs
    }

    /// Process one message; returns `false` when the loop should stop
    pub fn handle(&mut self, message: ToWorker) -> bool {
        match message {
            ToWorker::Init {
                segment,
                support_archive,
                input_timeout,
            } => {
                self.init(segment, support_archive.as_deref(), input_timeout);
                true
            }
            ToWorker::Execute(request) => {
                self.execute(request);
                true
            }
            ToWorker::Shutdown => {
                info!("worker shutting down");
                false
            }
        }
    }

    fn post(&self, message: WorkerMessage) {
        if self.outbox.send(message).is_err() {
            debug!("page side dropped; discarding worker message");
        }
    }

    fn init(
        &mut self,
        segment: Arc<ControlSegment>,
        support_archive: Option<&[u8]>,
        input_timeout: Option<Duration>,
    ) {
        if self.state != WorkerState::Uninitialized {
            debug!(state = ?self.state, "init received again; already loaded");
            self.post(WorkerMessage::Ready);
            return;
        }

        self.state = WorkerState::Loading;
        if let Some(bytes) = support_archive {
            match self.vfs.mount_archive(bytes, LIB_PREFIX) {
                Ok(count) => info!(files = count, prefix = LIB_PREFIX, "mounted support archive"),
                Err(e) => {
                    error!("failed to load support archive: {}", e);
                    self.state = WorkerState::Uninitialized;
                    self.post(WorkerMessage::Error {
                        error: format!("failed to load support archive: {}", e),
                    });
                    return;
                }
            }
        }

        self.segment = Some(segment);
        self.input_timeout = input_timeout;
        self.state = WorkerState::Ready;
        info!("runtime ready");
        self.post(WorkerMessage::Ready);
    }

    fn execute(&mut self, request: ExecutionRequest) {
        let segment = match (&self.segment, self.state) {
            (Some(segment), WorkerState::Ready) => Arc::clone(segment),
            (_, state) => {
                warn!(?state, "execute received before the runtime was ready");
                self.post(WorkerMessage::Error {
                    error: "runtime is not initialized".to_string(),
                });
                return;
            }
        };

        debug!(
            command = %request.command,
            language = %request.language,
            bytes = request.code.len(),
            "executing request"
        );
        self.state = WorkerState::Running;
        self.vfs
            .write(lang::scratch_path(request.language), request.code.as_bytes());

        let mut io = WorkerIo {
            outbox: &self.outbox,
            segment: &segment,
            timeout: self.input_timeout,
        };
        let vfs = &self.vfs;
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            lang::execute(
                &request.code,
                request.language,
                request.command,
                &mut io,
                vfs,
            )
        }));

        match result {
            Ok(outcome) => {
                if let Some(err) = &outcome.error {
                    debug!(kind = err.kind.as_str(), "program raised");
                }
                if let Some(dot) = outcome.dot {
                    self.post(WorkerMessage::Dot { dot });
                }
                self.post(WorkerMessage::ExecutionComplete);
            }
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                error!("interpreter panicked: {}", reason);
                self.post(WorkerMessage::Error {
                    error: format!("runtime failure: {}", reason),
                });
            }
        }
        self.state = WorkerState::Ready;
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Stream and input hooks installed into the interpreter
struct WorkerIo<'a> {
    outbox: &'a mpsc::UnboundedSender<WorkerMessage>,
    segment: &'a ControlSegment,
    timeout: Option<Duration>,
}

impl ScriptIo for WorkerIo<'_> {
    fn write(&mut self, stream: Stream, text: &str) {
        if text.is_empty() {
            return;
        }
        let message = WorkerMessage::StreamingOutput {
            output: text.to_string(),
            stream,
        };
        if self.outbox.send(message).is_err() {
            debug!("page side dropped; discarding streamed output");
        }
    }

    fn read_line(&mut self, prompt: &str) -> Result<String, InputFailure> {
        if self.segment.is_interrupted() {
            return Err(InputFailure::Interrupted);
        }
        if self
            .outbox
            .send(WorkerMessage::InputRequest {
                prompt: prompt.to_string(),
            })
            .is_err()
        {
            return Err(InputFailure::Closed);
        }
        match self.segment.wait_response(self.timeout) {
            Ok(text) => Ok(text),
            Err(SegmentWaitError::Interrupted) => Err(InputFailure::Interrupted),
            Err(SegmentWaitError::TimedOut(after)) => {
                warn!(?after, "input wait timed out");
                Err(InputFailure::TimedOut)
            }
        }
    }

    fn interrupted(&self) -> bool {
        self.segment.is_interrupted()
    }
}

/// Channels and thread of a running worker
pub struct WorkerHandle {
    pub sender: mpsc::UnboundedSender<ToWorker>,
    pub receiver: mpsc::UnboundedReceiver<WorkerMessage>,
    pub thread: JoinHandle<()>,
}

/// Spawn the worker thread in the `Uninitialized` state
pub fn spawn_worker() -> std::io::Result<WorkerHandle> {
    let (to_worker, mut inbox) = mpsc::unbounded_channel::<ToWorker>();
    let (outbox, from_worker) = mpsc::unbounded_channel::<WorkerMessage>();

    let thread = thread::Builder::new()
        .name(WORKER_THREAD_NAME.to_string())
        .stack_size(WORKER_STACK_SIZE)
        .spawn(move || {
            let mut runtime = SandboxedRuntime::new(outbox);
            while let Some(message) = inbox.blocking_recv() {
                if !runtime.handle(message) {
                    break;
                }
            }
            debug!("worker loop exited");
        })?;

    Ok(WorkerHandle {
        sender: to_worker,
        receiver: from_worker,
        thread,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::DEFAULT_CAPACITY;
    use jacblog_types::{CommandKind, Language};

    fn drain(rx: &mut mpsc::UnboundedReceiver<WorkerMessage>) -> Vec<WorkerMessage> {
        let mut out = Vec::new();
        while let Ok(message) = rx.try_recv() {
            out.push(message);
        }
        out
    }

    fn ready_runtime() -> (SandboxedRuntime, mpsc::UnboundedReceiver<WorkerMessage>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut runtime = SandboxedRuntime::new(tx);
        runtime.handle(ToWorker::Init {
            segment: ControlSegment::new(DEFAULT_CAPACITY),
            support_archive: None,
            input_timeout: None,
        });
        assert_eq!(drain(&mut rx), vec![WorkerMessage::Ready]);
        (runtime, rx)
    }

    #[test]
    fn test_execute_before_init_is_error() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut runtime = SandboxedRuntime::new(tx);
        runtime.handle(ToWorker::Execute(ExecutionRequest::run("with entry {}")));
        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 1);
        assert!(matches!(messages[0], WorkerMessage::Error { .. }));
        assert_eq!(runtime.state(), WorkerState::Uninitialized);
    }

    #[test]
    fn test_streams_then_completes() {
        let (mut runtime, mut rx) = ready_runtime();
        runtime.handle(ToWorker::Execute(ExecutionRequest::run(
            "with entry { print(\"a\"); print(\"b\"); }",
        )));
        assert_eq!(
            drain(&mut rx),
            vec![
                WorkerMessage::StreamingOutput {
                    output: "a\n".into(),
                    stream: Stream::Stdout
                },
                WorkerMessage::StreamingOutput {
                    output: "b\n".into(),
                    stream: Stream::Stdout
                },
                WorkerMessage::ExecutionComplete,
            ]
        );
        assert_eq!(runtime.state(), WorkerState::Ready);
        assert!(runtime.vfs().exists("/tmp/temp.jac"));
    }

    #[test]
    fn test_graph_payload_precedes_completion() {
        let (mut runtime, mut rx) = ready_runtime();
        runtime.handle(ToWorker::Execute(ExecutionRequest::new(
            "node N {}\nwith entry { root ++> N(); }",
            CommandKind::Dot,
            Language::Jac,
        )));
        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 2);
        assert!(matches!(&messages[0], WorkerMessage::Dot { dot } if dot.contains("0 -> 1;")));
        assert_eq!(messages[1], WorkerMessage::ExecutionComplete);
    }

    #[test]
    fn test_user_error_still_completes() {
        let (mut runtime, mut rx) = ready_runtime();
        runtime.handle(ToWorker::Execute(ExecutionRequest::new(
            "print(undefined)\n",
            CommandKind::Run,
            Language::Python,
        )));
        let messages = drain(&mut rx);
        assert!(matches!(
            &messages[0],
            WorkerMessage::StreamingOutput { stream: Stream::Stderr, output } if output.contains("NameError")
        ));
        assert_eq!(messages.last(), Some(&WorkerMessage::ExecutionComplete));
    }

    #[test]
    fn test_oversized_string_is_a_traceback() {
        let (mut runtime, mut rx) = ready_runtime();
        runtime.handle(ToWorker::Execute(ExecutionRequest::run(
            "with entry { s = 'ab' * (10 ** 11); }",
        )));
        let messages = drain(&mut rx);
        assert!(matches!(
            &messages[0],
            WorkerMessage::StreamingOutput { stream: Stream::Stderr, output } if output.contains("MemoryError")
        ));
        assert_eq!(messages.last(), Some(&WorkerMessage::ExecutionComplete));
        assert_eq!(runtime.state(), WorkerState::Ready);
    }

    #[test]
    fn test_output_after_page_side_dropped() {
        let (mut runtime, rx) = ready_runtime();
        drop(rx);
        runtime.handle(ToWorker::Execute(ExecutionRequest::run(
            "with entry { print(\"nobody listens\"); }",
        )));
        assert_eq!(runtime.state(), WorkerState::Ready);
    }

    #[test]
    fn test_bad_archive_fails_init() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut runtime = SandboxedRuntime::new(tx);
        runtime.handle(ToWorker::Init {
            segment: ControlSegment::new(16),
            support_archive: Some(b"not a zip".to_vec()),
            input_timeout: None,
        });
        assert!(matches!(drain(&mut rx)[..], [WorkerMessage::Error { .. }]));
        assert_eq!(runtime.state(), WorkerState::Uninitialized);
    }

    #[test]
    fn test_spawned_worker_round_trip() {
        let mut handle = spawn_worker().unwrap();
        let segment = ControlSegment::new(DEFAULT_CAPACITY);
        handle
            .sender
            .send(ToWorker::Init {
                segment: segment.clone(),
                support_archive: None,
                input_timeout: Some(Duration::from_secs(5)),
            })
            .unwrap();
        assert_eq!(handle.receiver.blocking_recv(), Some(WorkerMessage::Ready));

        handle
            .sender
            .send(ToWorker::Execute(ExecutionRequest::run(
                "with entry { name = input(\"Name? \"); print(\"Hi \" + name); }",
            )))
            .unwrap();
        assert_eq!(
            handle.receiver.blocking_recv(),
            Some(WorkerMessage::InputRequest {
                prompt: "Name? ".into()
            })
        );
        segment.write_response("Ada");

        let mut output = String::new();
        loop {
            match handle.receiver.blocking_recv() {
                Some(WorkerMessage::StreamingOutput { output: text, .. }) => output.push_str(&text),
                Some(WorkerMessage::ExecutionComplete) => break,
                other => panic!("unexpected message: {:?}", other),
            }
        }
        assert_eq!(output, "Name? Ada\nHi Ada\n");

        handle.sender.send(ToWorker::Shutdown).unwrap();
        handle.thread.join().unwrap();
    }
}

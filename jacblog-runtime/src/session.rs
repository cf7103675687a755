//! Runtime session: one worker plus its loaded interpreter
//!
//! A page owns at most one session, created lazily by the bridge and shared by
//! every snippet. The session also owns the single in-flight slot: the lock
//! around the worker's reply channel.

use crate::segment::{ControlSegment, DEFAULT_CAPACITY};
use crate::worker::{spawn_worker, ToWorker, WorkerHandle};
use jacblog_types::WorkerMessage;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex as AsyncMutex, MutexGuard};
use tracing::{debug, info, warn};

/// Knobs for starting a runtime session
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Payload capacity of the shared control segment, in bytes
    pub input_capacity: usize,
    /// Upper bound on a single input wait; `None` waits indefinitely
    pub input_timeout: Option<Duration>,
    /// Zip archive mounted under `/lib` before the session reports ready
    pub support_archive: Option<Vec<u8>>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            input_capacity: DEFAULT_CAPACITY,
            input_timeout: None,
            support_archive: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("runtime failed to start: {0}")]
    Startup(String),

    #[error("worker exited before signalling ready")]
    Disconnected,
}

pub struct RuntimeSession {
    segment: Arc<ControlSegment>,
    sender: mpsc::UnboundedSender<ToWorker>,
    inbox: AsyncMutex<mpsc::UnboundedReceiver<WorkerMessage>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    ready: AtomicBool,
    /// An execution was dropped before its terminal message was read
    abandoned: AtomicBool,
}

impl std::fmt::Debug for RuntimeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeSession")
            .field("ready", &self.is_ready())
            .field("capacity", &self.segment.capacity())
            .finish()
    }
}

impl RuntimeSession {
    /// Spawn the worker, send `init`, and wait for `ready`
    pub async fn create(options: RuntimeOptions) -> Result<Self, SessionError> {
        let segment = ControlSegment::new(options.input_capacity);
        let WorkerHandle {
            sender,
            mut receiver,
            thread,
        } = spawn_worker()?;

        info!(
            capacity = options.input_capacity,
            archive = options.support_archive.is_some(),
            "starting runtime session"
        );
        sender
            .send(ToWorker::Init {
                segment: Arc::clone(&segment),
                support_archive: options.support_archive,
                input_timeout: options.input_timeout,
            })
            .map_err(|_| SessionError::Disconnected)?;

        let failure = match receiver.recv().await {
            Some(WorkerMessage::Ready) => None,
            Some(WorkerMessage::Error { error }) => Some(SessionError::Startup(error)),
            Some(other) => Some(SessionError::Startup(format!(
                "unexpected message during startup: {:?}",
                other
            ))),
            None => Some(SessionError::Disconnected),
        };
        if let Some(err) = failure {
            warn!("runtime session failed to start: {}", err);
            let _ = sender.send(ToWorker::Shutdown);
            return Err(err);
        }

        info!("runtime session ready");
        Ok(Self {
            segment,
            sender,
            inbox: AsyncMutex::new(receiver),
            thread: Mutex::new(Some(thread)),
            ready: AtomicBool::new(true),
            abandoned: AtomicBool::new(false),
        })
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn segment(&self) -> &Arc<ControlSegment> {
        &self.segment
    }

    /// Wait for the in-flight slot; callers are served in FIFO order
    pub(crate) async fn acquire(&self) -> MutexGuard<'_, mpsc::UnboundedReceiver<WorkerMessage>> {
        self.inbox.lock().await
    }

    /// Interrupt the running program and leave its terminal message for the
    /// next holder of the in-flight slot to drain
    pub(crate) fn abandon(&self) {
        self.segment.interrupt();
        self.abandoned.store(true, Ordering::Release);
    }

    pub(crate) fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::Acquire)
    }

    pub(crate) fn clear_abandoned(&self) {
        self.abandoned.store(false, Ordering::Release);
    }

    pub(crate) fn send(&self, message: ToWorker) -> bool {
        self.sender.send(message).is_ok()
    }

    /// Stop the running program, shut the worker down, and join its thread
    pub async fn dispose(&self) {
        if !self.ready.swap(false, Ordering::AcqRel) {
            return;
        }
        info!("disposing runtime session");
        self.segment.interrupt();
        let _ = self.sender.send(ToWorker::Shutdown);

        let thread = self.thread.lock().take();
        if let Some(thread) = thread {
            match tokio::task::spawn_blocking(move || thread.join()).await {
                Ok(Ok(())) => debug!("worker thread joined"),
                Ok(Err(_)) => warn!("worker thread panicked during shutdown"),
                Err(e) => warn!("failed to join worker thread: {}", e),
            }
        }
    }
}

impl Drop for RuntimeSession {
    fn drop(&mut self) {
        if self.ready.swap(false, Ordering::AcqRel) {
            self.segment.interrupt();
            let _ = self.sender.send(ToWorker::Shutdown);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_dispose() {
        let session = RuntimeSession::create(RuntimeOptions::default())
            .await
            .unwrap();
        assert!(session.is_ready());
        assert_eq!(session.segment().capacity(), DEFAULT_CAPACITY);

        session.dispose().await;
        assert!(!session.is_ready());
        // Second dispose is a no-op
        session.dispose().await;
    }

    #[tokio::test]
    async fn test_bad_archive_is_startup_error() {
        let options = RuntimeOptions {
            support_archive: Some(b"garbage".to_vec()),
            ..RuntimeOptions::default()
        };
        let err = RuntimeSession::create(options).await.unwrap_err();
        assert!(matches!(err, SessionError::Startup(_)));
    }
}

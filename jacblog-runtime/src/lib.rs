//! Jacblog Runtime - background execution of runnable snippets
//!
//! This crate hosts everything between "the reader clicked Run" and "text and
//! graphs arrive on the page":
//!
//! - **Control segment**: fixed-layout block used for synchronous input hand-off
//! - **Virtual filesystem**: scratch files plus the mounted support archive
//! - **Interpreter**: the snippet language, primary and fallback dialects
//! - **Worker**: the sandboxed runtime on its own OS thread
//! - **Session / bridge**: lazy startup, one execution at a time, input and
//!   cancellation, page events
//!
//! ## Example
//!
//! ```no_run
//! use jacblog_runtime::{CancelToken, RuntimeOptions, ScriptedInput, WorkerBridge};
//! use jacblog_types::ExecutionRequest;
//!
//! # async fn demo() -> Result<(), jacblog_runtime::BridgeError> {
//! let bridge = WorkerBridge::new(RuntimeOptions::default());
//! let mut events = bridge.subscribe();
//!
//! let request = ExecutionRequest::run("with entry { print(\"hi\"); }");
//! let outcome = bridge
//!     .execute(request, &ScriptedInput::none(), &CancelToken::new())
//!     .await?;
//! assert!(outcome.dot.is_none());
//! let first = events.try_recv();
//! # let _ = first;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod lang;
pub mod segment;
pub mod session;
pub mod vfs;
pub mod worker;

pub use bridge::{
    BridgeError, CancelToken, ExecutionOutcome, InputCancelled, InputProvider, ScriptedInput,
    WorkerBridge,
};
pub use segment::{ControlSegment, SegmentWaitError, DEFAULT_CAPACITY};
pub use session::{RuntimeOptions, RuntimeSession, SessionError};
pub use vfs::{Vfs, VfsError};
pub use worker::{spawn_worker, SandboxedRuntime, ToWorker, WorkerHandle, WorkerState};

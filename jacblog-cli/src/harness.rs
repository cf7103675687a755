//! Page harness: connects the editor surface, the worker bridge and the
//! result renderer the way a page controller does.

use anyhow::{Context, Result};
use jacblog_core::Config;
use jacblog_render::{GraphPane, ResultRenderer};
use jacblog_runtime::{
    BridgeError, CancelToken, ExecutionOutcome, InputCancelled, InputProvider, RuntimeOptions,
    WorkerBridge,
};
use jacblog_types::{ExecutionRequest, PageEvent, Stream};
use std::future::Future;
use std::io::{BufRead, Write};
use tokio::sync::broadcast::error::RecvError;

/// Build runtime options from configuration, loading the support archive
pub fn runtime_options(config: &Config) -> Result<RuntimeOptions> {
    let support_archive = match config.support_archive() {
        Some(path) if path.exists() => Some(
            std::fs::read(&path)
                .with_context(|| format!("Failed to read support archive {:?}", path))?,
        ),
        Some(path) => {
            tracing::warn!("Support archive {:?} not found, starting without it", path);
            None
        }
        None => None,
    };
    Ok(RuntimeOptions {
        input_capacity: config.runtime.input_capacity,
        input_timeout: config.input_timeout(),
        support_archive,
    })
}

/// Answers input requests from the terminal
///
/// The prompt goes to stderr so it is visible before the reader types; the
/// runtime echoes prompt and answer on its own stdout stream.
pub struct TerminalInput;

impl InputProvider for TerminalInput {
    fn request(&self, prompt: &str) -> impl Future<Output = Result<String, InputCancelled>> + Send {
        let prompt = prompt.to_string();
        async move {
            tokio::task::spawn_blocking(move || {
                let mut stderr = std::io::stderr();
                let _ = write!(stderr, "{}", prompt);
                let _ = stderr.flush();

                let mut line = String::new();
                match std::io::stdin().lock().read_line(&mut line) {
                    Ok(0) | Err(_) => Err(InputCancelled),
                    Ok(_) => Ok(line),
                }
            })
            .await
            .unwrap_or(Err(InputCancelled))
        }
    }
}

/// Text collected from one execution
#[derive(Debug, Default)]
pub struct Transcript {
    pub stdout: String,
    pub stderr: String,
}

pub struct Harness {
    bridge: WorkerBridge,
    renderer: ResultRenderer,
    /// Write streamed output to the terminal as it arrives
    echo: bool,
}

impl Harness {
    pub fn new(options: RuntimeOptions, echo: bool) -> Self {
        Self {
            bridge: WorkerBridge::new(options),
            renderer: ResultRenderer::default(),
            echo,
        }
    }

    pub fn renderer(&self) -> &ResultRenderer {
        &self.renderer
    }

    /// Execute one request, feeding every page event to the renderer
    pub async fn execute<I: InputProvider>(
        &mut self,
        request: ExecutionRequest,
        input: &I,
        cancel: &CancelToken,
    ) -> (Result<ExecutionOutcome, BridgeError>, Transcript) {
        let Harness {
            bridge,
            renderer,
            echo,
        } = self;
        renderer.clear();
        let mut transcript = Transcript::default();
        let mut events = bridge.subscribe();

        let execution = bridge.execute(request, input, cancel);
        tokio::pin!(execution);

        let result = loop {
            tokio::select! {
                biased;
                event = events.recv() => match event {
                    Ok(event) => deliver(renderer, &mut transcript, *echo, &event),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Output panel skipped {} events", skipped);
                    }
                    Err(RecvError::Closed) => break execution.await,
                },
                result = &mut execution => break result,
            }
        };

        while let Ok(event) = events.try_recv() {
            deliver(renderer, &mut transcript, *echo, &event);
        }
        (result, transcript)
    }

    pub async fn shutdown(mut self) {
        self.bridge.dispose().await;
    }
}

fn deliver(renderer: &mut ResultRenderer, transcript: &mut Transcript, echo: bool, event: &PageEvent) {
    if let PageEvent::Output { output, stream } = event {
        match stream {
            Stream::Stdout => transcript.stdout.push_str(output),
            Stream::Stderr => transcript.stderr.push_str(output),
        }
        if echo {
            let _ = match stream {
                Stream::Stdout => {
                    let mut out = std::io::stdout();
                    out.write_all(output.as_bytes()).and_then(|_| out.flush())
                }
                Stream::Stderr => std::io::stderr().write_all(output.as_bytes()),
            };
        }
    }
    renderer.handle(event);
}

/// Human-readable summary of the diagram pane
pub fn describe_graph(pane: &GraphPane) -> Option<String> {
    match pane {
        GraphPane::Empty => None,
        GraphPane::Diagram { layout, .. } => Some(format!(
            "graph: {} nodes, {} edges",
            layout.nodes.len(),
            layout.edges.len()
        )),
        GraphPane::Raw { text, error } => Some(format!("{}\n{}", error, text)),
    }
}

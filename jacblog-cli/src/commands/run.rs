//! Execute a snippet file, or one runnable block of a markdown page.

use crate::harness::{describe_graph, runtime_options, Harness, TerminalInput};
use crate::{ActionArg, LangArg};
use anyhow::{bail, Context, Result};
use jacblog_core::{Config, EditorSurface};
use jacblog_render::{decode_entities, GraphPane};
use jacblog_runtime::CancelToken;
use jacblog_types::{CommandKind, ExecutionRequest, Language, SnippetAction};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

pub struct RunOptions {
    pub snippet: Option<usize>,
    pub action: ActionArg,
    pub lang: Option<LangArg>,
    pub svg: Option<PathBuf>,
    pub json: bool,
}

impl ActionArg {
    fn command(self) -> CommandKind {
        match self {
            ActionArg::Run => CommandKind::Run,
            ActionArg::Serve => CommandKind::Serve,
            ActionArg::Dot => CommandKind::Dot,
            ActionArg::Graph => CommandKind::Graph,
        }
    }

    /// Button a page reader would press for this action
    fn snippet_action(self) -> SnippetAction {
        match self {
            ActionArg::Run => SnippetAction::Run,
            ActionArg::Serve => SnippetAction::Serve,
            ActionArg::Dot | ActionArg::Graph => SnippetAction::Graph,
        }
    }
}

impl From<LangArg> for Language {
    fn from(lang: LangArg) -> Self {
        match lang {
            LangArg::Jac => Language::Jac,
            LangArg::Python => Language::Python,
        }
    }
}

fn is_markdown(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("md" | "markdown")
    )
}

/// Turn the file and flags into the request a page action would send
pub fn build_request(file: &Path, opts: &RunOptions) -> Result<ExecutionRequest> {
    let text =
        fs::read_to_string(file).with_context(|| format!("Failed to read {:?}", file))?;

    if is_markdown(file) {
        let surface = EditorSurface::from_markdown(&text)
            .with_context(|| format!("Failed to scan {:?} for snippets", file))?;
        if surface.is_empty() {
            bail!("No runnable snippets in {}", file.display());
        }
        let index = opts.snippet.unwrap_or(0);
        let mut request = surface.request(index, opts.action.snippet_action())?;
        request.command = opts.action.command();
        if let Some(lang) = opts.lang {
            request.language = lang.into();
        }
        return Ok(request);
    }

    if opts.snippet.is_some() {
        bail!("--snippet only applies to markdown pages");
    }
    let language = match opts.lang {
        Some(lang) => lang.into(),
        None => match file.extension().and_then(|e| e.to_str()) {
            Some("py") => Language::Python,
            _ => Language::Jac,
        },
    };
    Ok(ExecutionRequest::new(text, opts.action.command(), language))
}

pub async fn run_file(config_path: &Path, file: &Path, opts: RunOptions) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let request = build_request(file, &opts)?;
    tracing::debug!(
        command = %request.command,
        language = %request.language,
        "Executing {}",
        file.display()
    );

    let mut harness = Harness::new(runtime_options(&config)?, !opts.json);
    let cancel = CancelToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let (result, transcript) = harness.execute(request, &TerminalInput, &cancel).await;
    interrupt.abort();

    if let Some(path) = &opts.svg {
        match harness.renderer().graph() {
            GraphPane::Diagram { svg, .. } => {
                fs::write(path, svg).with_context(|| format!("Failed to write {:?}", path))?;
                tracing::info!("Diagram written to {:?}", path);
            }
            GraphPane::Raw { error, .. } => {
                tracing::warn!("Graph could not be rendered: {}", error);
            }
            GraphPane::Empty => tracing::warn!("No graph payload to render"),
        }
    }

    let graph = describe_graph(harness.renderer().graph());
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(err) => {
            harness.shutdown().await;
            return Err(err).context("Execution failed");
        }
    };

    if opts.json {
        let payload = json!({
            "stdout": transcript.stdout,
            "stderr": transcript.stderr,
            "dot": outcome.dot.as_deref().map(|d| decode_entities(d).into_owned()),
            "input_requests": outcome.input_requests,
            "graph": graph,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else if let Some(dot) = outcome.dot.as_deref() {
        if opts.action == ActionArg::Dot {
            print!("{}", decode_entities(dot));
        }
        if let Some(summary) = graph {
            eprintln!("{}", summary);
        }
    }

    harness.shutdown().await;
    Ok(())
}

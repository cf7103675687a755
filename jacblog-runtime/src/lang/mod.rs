//! Snippet interpreter
//!
//! Covers the teaching subset used by the blog: a brace-delimited primary
//! dialect with `node`/`def`/`glob`/`include`/`with entry` items and an
//! indentation-delimited fallback dialect. Both dialects share one grammar;
//! the fallback's indentation is rewritten into block tokens by the lexer.

mod ast;
mod builtins;
mod error;
mod graph;
mod highlight;
mod interp;
mod io;
mod lexer;
mod parser;
mod value;

pub use error::{ErrorKind, ScriptError, ScriptResult};
pub use graph::{Graph, NodeId};
pub use highlight::highlight_code;
pub use interp::{EntryMode, Interpreter, MAX_CALL_DEPTH};
pub use io::{CapturedIo, InputFailure, MutedStdout, ScriptIo};
pub use parser::parse;
pub use value::Value;

use crate::vfs::Vfs;
use jacblog_types::{CommandKind, Language, Stream};

/// Scratch file the primary dialect is written to before execution
pub const PRIMARY_SCRATCH: &str = "/tmp/temp.jac";
/// Scratch file for the fallback dialect
pub const FALLBACK_SCRATCH: &str = "/tmp/temp.py";

pub fn scratch_path(language: Language) -> &'static str {
    match language {
        Language::Jac => PRIMARY_SCRATCH,
        Language::Python => FALLBACK_SCRATCH,
    }
}

/// What a finished command produced besides its streamed output
#[derive(Debug, Default)]
pub struct Outcome {
    /// Graph payload for `Dot`/`Graph` on the primary dialect
    pub dot: Option<String>,
    /// The exception that ended the program, already printed to stderr
    pub error: Option<ScriptError>,
}

/// Run one command against `source`
///
/// Never fails: program errors are formatted as a traceback on stderr and
/// reported in [`Outcome::error`].
pub fn execute(
    source: &str,
    language: Language,
    command: CommandKind,
    io: &mut dyn ScriptIo,
    vfs: &Vfs,
) -> Outcome {
    let file = scratch_path(language);
    match dispatch(source, language, command, file, io, vfs) {
        Ok(dot) => Outcome { dot, error: None },
        Err(err) => {
            io.write(Stream::Stderr, &err.traceback(file));
            Outcome {
                dot: None,
                error: Some(err),
            }
        }
    }
}

fn dispatch(
    source: &str,
    language: Language,
    command: CommandKind,
    file: &str,
    io: &mut dyn ScriptIo,
    vfs: &Vfs,
) -> ScriptResult<Option<String>> {
    let module = parse(source, language)?;
    match (command, language) {
        (CommandKind::Run, _) | (CommandKind::Serve, Language::Python) => {
            Interpreter::new(io, vfs, language).run(&module, EntryMode::Run)?;
            Ok(None)
        }
        (CommandKind::Serve, Language::Jac) => {
            let endpoints = {
                let mut interp = Interpreter::new(&mut *io, vfs, language);
                interp.run(&module, EntryMode::Serve)?;
                interp.endpoints().to_vec()
            };
            for line in serve_banner(file, &endpoints) {
                io.write(Stream::Stdout, &line);
            }
            Ok(None)
        }
        (CommandKind::Dot, _) => {
            let mut muted = MutedStdout::new(io);
            let mut interp = Interpreter::new(&mut muted, vfs, language);
            interp.run(&module, EntryMode::Run)?;
            Ok(graph_payload(&interp, language))
        }
        (CommandKind::Graph, _) => {
            let mut interp = Interpreter::new(io, vfs, language);
            interp.run(&module, EntryMode::Run)?;
            Ok(graph_payload(&interp, language))
        }
    }
}

fn graph_payload(interp: &Interpreter<'_>, language: Language) -> Option<String> {
    match language {
        Language::Jac => Some(interp.dump_dot()),
        Language::Python => None,
    }
}

/// Startup lines of the simulated server; nothing listens
fn serve_banner(file: &str, endpoints: &[String]) -> Vec<String> {
    let mut lines = vec![format!("Serving {} (simulated, no socket is opened)\n", file)];
    if endpoints.is_empty() {
        lines.push("No walker or function endpoints found\n".to_string());
    } else {
        lines.push("Endpoints:\n".to_string());
        lines.extend(
            endpoints
                .iter()
                .map(|name| format!("  POST /function/{}\n", name)),
        );
    }
    lines
}

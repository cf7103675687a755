//! # jacblog CLI
//!
//! Command-line interface for the jacblog snippet runner.

mod commands;
mod harness;

use clap::{Parser, Subcommand, ValueEnum};
use jacblog_core::DEFAULT_CONFIG_FILE;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "jacblog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the runnable snippets of a markdown page
    Snippets {
        /// Markdown page
        page: PathBuf,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Render a markdown page to HTML with snippet source highlighted
    Highlight {
        /// Markdown page
        page: PathBuf,

        /// Write the HTML here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Execute a snippet file or a runnable block of a page
    Run {
        /// Source file, or a markdown page
        file: PathBuf,

        /// Which runnable block of a page to run (from 0)
        #[arg(long)]
        snippet: Option<usize>,

        /// Action to trigger
        #[arg(long, value_enum, default_value_t = ActionArg::Run)]
        action: ActionArg,

        /// Override the snippet language
        #[arg(long, value_enum)]
        lang: Option<LangArg>,

        /// Write the rendered graph diagram to this file
        #[arg(long)]
        svg: Option<PathBuf>,

        /// Emit a JSON transcript instead of streaming output
        #[arg(long)]
        json: bool,
    },

    /// Pack the runtime support archive (pre-build hook)
    Pack {
        /// Support library directory
        #[arg(long)]
        source: Option<PathBuf>,

        /// Archive path
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Serve the built site with cross-origin isolation headers
    Dev {
        /// Bind address
        #[arg(long)]
        host: Option<String>,

        /// Server port
        #[arg(long)]
        port: Option<u16>,

        /// Built site directory
        #[arg(long)]
        site: Option<PathBuf>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ActionArg {
    Run,
    Serve,
    Dot,
    Graph,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LangArg {
    Jac,
    #[value(alias = "py")]
    Python,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; stdout is reserved for program output
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(if cli.verbose {
                tracing::Level::DEBUG.into()
            } else {
                tracing::Level::WARN.into()
            }),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Snippets { page, json } => commands::list_snippets(&page, json),
        Commands::Highlight { page, output } => commands::highlight_page(&page, output.as_deref()),
        Commands::Run {
            file,
            snippet,
            action,
            lang,
            svg,
            json,
        } => {
            let opts = commands::RunOptions {
                snippet,
                action,
                lang,
                svg,
                json,
            };
            commands::run_file(&cli.config, &file, opts).await
        }
        Commands::Pack { source, output } => commands::pack_archive(&cli.config, source, output),
        Commands::Dev { host, port, site } => {
            commands::dev_server(&cli.config, host, port, site).await
        }
    }
}

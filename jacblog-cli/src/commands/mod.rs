//! CLI command implementations.

pub mod dev;
pub mod highlight;
pub mod pack;
pub mod run;
pub mod snippets;

pub use dev::dev_server;
pub use highlight::highlight_page;
pub use pack::pack_archive;
pub use run::{run_file, RunOptions};
pub use snippets::list_snippets;

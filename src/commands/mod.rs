//! CLI command handlers.

mod import;
mod passes;

pub use import::run_import_command;
pub use passes::{
    CorpusSource, run_all_command, run_extract_command, run_resolve_doi_command,
    run_score_command,
};

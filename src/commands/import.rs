//! Import command handler: store raw alert bodies for extraction.

use anyhow::{Context, Result, bail};
use alertminer_core::Store;
use tracing::{info, warn};

use crate::cli::ImportArgs;

pub async fn run_import_command(store: &Store, args: &ImportArgs) -> Result<usize> {
    let mut imported = 0usize;

    for path in &args.files {
        let body = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Cannot read email body '{}'", path.display()))?;

        if body.trim().is_empty() {
            warn!(path = %path.display(), "Skipping empty email body");
            continue;
        }

        let id = store.insert_email(&body, args.spam).await?;
        info!(id, path = %path.display(), spam = args.spam, "Imported email");
        imported += 1;
    }

    if imported == 0 {
        bail!("No email bodies imported\n  All given files were empty.");
    }

    println!("Imported {imported} email(s)");
    Ok(imported)
}

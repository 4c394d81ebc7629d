//! `tilestash import`: run one import to completion in the foreground.
//!
//! Uses the same pipeline as an HTTP upload, reading the file in place
//! instead of spooling it.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use tilestash::import::{ImportRequest, Upload};
use tilestash::store::RecordStore;
use tilestash::tileset::TilesetKey;

use crate::error::CliError;
use crate::runner::CliRunner;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Arguments for `import`.
#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Owner (account or namespace) of the tileset
    #[arg(long)]
    pub owner: String,

    /// Replace this existing tileset instead of creating a new one
    #[arg(long)]
    pub tileset: Option<String>,

    /// File to import (MBTiles, zipped shapefile, GeoJSON, ...)
    pub file: PathBuf,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

pub async fn run(args: ImportArgs) -> Result<(), CliError> {
    if !args.file.is_file() {
        return Err(CliError::InputFile(args.file));
    }

    let runner = CliRunner::new(args.debug, false)?;
    runner.log_startup("import");
    let service = runner.create_service()?;
    let orchestrator = service.orchestrator();

    let request = ImportRequest::new(args.owner, args.tileset, Upload::persistent(&args.file));
    let ticket = orchestrator.submit(request).await?;
    let key = ticket.tileset.key();
    println!(
        "Importing {} into {} (attempt {})",
        args.file.display(),
        key,
        ticket.tileset.attempt
    );

    let wait = ticket.wait();
    tokio::pin!(wait);
    let mut poll = tokio::time::interval(POLL_INTERVAL);
    let mut last_progress = None;

    let outcome = loop {
        tokio::select! {
            outcome = &mut wait => break outcome,
            _ = poll.tick() => {
                let progress = current_progress(orchestrator.store().as_ref(), &key).await;
                if progress.is_some() && progress != last_progress {
                    if let Some(p) = progress {
                        println!("  {:>3}%", p);
                    }
                    last_progress = progress;
                }
            }
        }
    };

    if outcome.is_success() {
        println!("  100%");
        println!("✓ Imported {} tiles into {}", outcome.tiles, key);
        if let Some(record) = &outcome.record {
            if let Some(name) = &record.name {
                println!("  Name: {}", name);
            }
        }
        Ok(())
    } else {
        Err(CliError::ImportFailed {
            tileset: key.to_string(),
            message: outcome
                .error
                .unwrap_or_else(|| format!("import ended in stage {}", outcome.stage)),
        })
    }
}

async fn current_progress(store: &dyn RecordStore, key: &TilesetKey) -> Option<u8> {
    match store.find(key).await {
        Ok(Some(record)) if !record.complete => Some(record.progress),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilestash::store::MemoryRecordStore;
    use tilestash::tileset::Tileset;

    fn args(file: PathBuf) -> ImportArgs {
        ImportArgs {
            owner: "acme".to_string(),
            tileset: None,
            file,
            debug: false,
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_rejected_before_setup() {
        let missing = std::env::temp_dir().join("tilestash-no-such-upload.mbtiles");
        let err = run(args(missing.clone())).await.unwrap_err();
        assert!(matches!(err, CliError::InputFile(ref p) if *p == missing));
    }

    #[tokio::test]
    async fn test_directory_is_not_an_input_file() {
        let err = run(args(std::env::temp_dir())).await.unwrap_err();
        assert!(matches!(err, CliError::InputFile(_)));
    }

    #[tokio::test]
    async fn test_progress_shown_only_while_importing() {
        let store = MemoryRecordStore::new();

        let mut running = Tileset::with_id("acme", "running");
        running.attempt = 1;
        running.progress = 40;
        store.insert(running).await.unwrap();

        let mut finished = Tileset::with_id("acme", "finished");
        finished.attempt = 1;
        finished.complete = true;
        finished.progress = 100;
        store.insert(finished).await.unwrap();

        let key = |id: &str| TilesetKey::new("acme", id);
        assert_eq!(current_progress(&store, &key("running")).await, Some(40));
        assert_eq!(current_progress(&store, &key("finished")).await, None);
        assert_eq!(current_progress(&store, &key("missing")).await, None);
    }
}

//! `tilestash list`: print an owner's tilesets.

use clap::Args;
use tilestash::tileset::Tileset;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for `list`.
#[derive(Debug, Args)]
pub struct ListArgs {
    /// Owner (account or namespace) whose tilesets to list
    #[arg(long)]
    pub owner: String,
}

pub async fn run(args: ListArgs) -> Result<(), CliError> {
    let runner = CliRunner::new(false, false)?;
    let service = runner.create_service()?;
    let tilesets = service.orchestrator().store().list(&args.owner).await?;

    if tilesets.is_empty() {
        println!("No tilesets for {}", args.owner);
        return Ok(());
    }

    println!("{:<34} {:<12} {:<24}", "TILESET", "STATUS", "NAME");
    for tileset in &tilesets {
        println!(
            "{:<34} {:<12} {:<24}",
            tileset.tileset_id,
            status(tileset),
            tileset.name.as_deref().unwrap_or("-")
        );
        if let Some(error) = &tileset.error {
            println!("  error: {}", error);
        }
    }
    Ok(())
}

fn status(tileset: &Tileset) -> String {
    match (tileset.complete, &tileset.error) {
        (true, None) => "ready".to_string(),
        (true, Some(_)) => "failed".to_string(),
        (false, _) if tileset.attempt == 0 => "empty".to_string(),
        (false, _) => format!("{}%", tileset.progress),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status() {
        let mut tileset = Tileset::with_id("acme", "roads");
        assert_eq!(status(&tileset), "empty");

        tileset.attempt = 1;
        tileset.progress = 42;
        assert_eq!(status(&tileset), "42%");

        tileset.complete = true;
        assert_eq!(status(&tileset), "ready");

        tileset.error = Some("boom".to_string());
        assert_eq!(status(&tileset), "failed");
    }
}

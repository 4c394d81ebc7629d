//! Converter delegating to an external tiling program.

use super::{ConvertError, CopyStats, SourceInfo, TileConverter};
use crate::archive::MbTilesArchive;
use crate::import::ProgressSink;
use crate::normalize::SourceLocator;
use crate::BoxFuture;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const SOURCE_PLACEHOLDER: &str = "{source}";
const DEST_PLACEHOLDER: &str = "{dest}";
const STDERR_TAIL: usize = 512;

/// Runs a configured command that turns a geodata file into an MBTiles
/// archive, e.g. `tippecanoe -f -o {dest} {source}`.
///
/// The command line is split on whitespace; `{source}` and `{dest}` are
/// replaced in every argument. Progress is reported only at start and end.
#[derive(Debug, Clone)]
pub struct CommandConverter {
    program: String,
    args: Vec<String>,
    format: String,
}

impl CommandConverter {
    /// Parses a command template producing tiles of `format`.
    pub fn from_template(template: &str, format: impl Into<String>) -> Result<Self, ConvertError> {
        let mut parts = template.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| ConvertError::permanent("empty converter command"))?;
        let args: Vec<String> = parts.collect();

        if !args.iter().any(|a| a.contains(DEST_PLACEHOLDER)) {
            return Err(ConvertError::permanent(format!(
                "converter command must contain {}",
                DEST_PLACEHOLDER
            )));
        }
        Ok(Self {
            program,
            args,
            format: format.into(),
        })
    }

    /// Program name.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments with placeholders substituted.
    pub fn render_args(&self, source: &Path, dest: &Path) -> Vec<String> {
        let source = source.to_string_lossy();
        let dest = dest.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace(SOURCE_PLACEHOLDER, &source)
                    .replace(DEST_PLACEHOLDER, &dest)
            })
            .collect()
    }

    async fn run(
        &self,
        source: &Path,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), ConvertError> {
        let args = self.render_args(source, dest);
        debug!(program = %self.program, args = ?args, "Starting converter command");

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ConvertError::permanent(format!("failed to start {}: {}", self.program, e))
            })?;

        // Dropping the wait future on cancellation kills the child.
        let waited = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ConvertError::cancelled()),
            output = child.wait_with_output() => output,
        };
        let output = waited
            .map_err(|e| ConvertError::retryable(format!("{} failed: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail = stderr_tail(stderr.trim());
            warn!(
                program = %self.program,
                status = %output.status,
                stderr = %tail,
                "Converter command failed"
            );
            return Err(ConvertError::permanent(format!(
                "{} exited with {}: {}",
                self.program, output.status, tail
            )));
        }
        Ok(())
    }
}

fn stderr_tail(stderr: &str) -> &str {
    if stderr.len() <= STDERR_TAIL {
        return stderr;
    }
    let mut start = stderr.len() - STDERR_TAIL;
    while !stderr.is_char_boundary(start) {
        start += 1;
    }
    &stderr[start..]
}

impl TileConverter for CommandConverter {
    fn name(&self) -> &str {
        &self.program
    }

    fn info<'a>(
        &'a self,
        source: &'a SourceLocator,
    ) -> BoxFuture<'a, Result<SourceInfo, ConvertError>> {
        Box::pin(async move {
            let name = source
                .path()
                .file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string);
            Ok(SourceInfo {
                name,
                description: None,
                format: Some(self.format.clone()),
            })
        })
    }

    fn copy<'a>(
        &'a self,
        source: &'a SourceLocator,
        dest: &'a Path,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<CopyStats, ConvertError>> {
        Box::pin(async move {
            progress.report(0, 1);
            self.run(source.path(), dest, &cancel).await?;

            let output = dest.to_path_buf();
            let tiles =
                tokio::task::spawn_blocking(move || MbTilesArchive::open(&output)?.tile_count())
                    .await
                    .map_err(|e| ConvertError::retryable(format!("verify task failed: {}", e)))?
                    .map_err(|e| {
                        ConvertError::permanent(format!(
                            "converter produced no usable archive: {}",
                            e
                        ))
                    })?;

            progress.report(1, 1);
            Ok(CopyStats { tiles })
        })
    }
}

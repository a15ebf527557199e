//! Word → PDF through a headless office suite.
//!
//! Runs `soffice --headless --convert-to pdf --outdir <dir> <input>` with a
//! private `-env:UserInstallation` profile; a profile is locked by the
//! instance using it, so each attempt gets its own. The input file, the output
//! directory and the profile directory are temporary artifacts, and the child
//! is spawned with `kill_on_drop` so a timed-out attempt does not leave a
//! converter running.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{AttemptContext, ConversionStrategy, StrategyKind};
use crate::document::{Direction, TargetFormat};
use crate::error::AttemptError;
use crate::output::ConversionResult;

/// Strategy shelling out to LibreOffice (`soffice`).
#[derive(Debug, Clone)]
pub struct OfficeSuiteConversion {
    binary: PathBuf,
    timeout: Duration,
}

impl OfficeSuiteConversion {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    async fn convert(
        &self,
        input: &Path,
        outdir: &Path,
        profile: &Path,
        target: TargetFormat,
    ) -> Result<Vec<u8>, AttemptError> {
        let args = command_args(input, outdir, profile, target)?;
        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AttemptError::Library(format!("cannot run {}: {e}", self.binary.display())))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AttemptError::Library(format!(
                "{} exited with {}: {}",
                self.binary.display(),
                output.status,
                stderr.trim()
            )));
        }

        let produced = expected_output(input, outdir, target);
        match tokio::fs::read(&produced).await {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                warn!(path = %produced.display(), error = %e, "Office suite reported success but wrote no output");
                Err(AttemptError::Library(format!(
                    "no output at {}: {e}",
                    produced.display()
                )))
            }
        }
    }
}

/// Arguments for one headless conversion using `profile` as the user profile.
fn command_args(
    input: &Path,
    outdir: &Path,
    profile: &Path,
    target: TargetFormat,
) -> Result<Vec<OsString>, AttemptError> {
    let profile_url = Url::from_directory_path(profile)
        .map_err(|()| AttemptError::Fault(format!("profile path {} is not absolute", profile.display())))?;
    Ok(vec![
        format!("-env:UserInstallation={profile_url}").into(),
        "--headless".into(),
        "--convert-to".into(),
        target.extension().into(),
        "--outdir".into(),
        outdir.into(),
        input.into(),
    ])
}

/// `<outdir>/<input stem>.<target ext>`, the name the office suite writes.
fn expected_output(input: &Path, outdir: &Path, target: TargetFormat) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    outdir.join(format!("{stem}.{}", target.extension()))
}

#[async_trait]
impl ConversionStrategy for OfficeSuiteConversion {
    fn kind(&self) -> StrategyKind {
        StrategyKind::OfficeSuite
    }

    fn supports(&self, direction: Direction) -> bool {
        direction == Direction::WordToPdf
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn attempt(&self, ctx: &AttemptContext<'_>) -> Result<ConversionResult, AttemptError> {
        let source = &ctx.request.source;
        let namespace = ctx.namespace(self.kind());
        let suffix = format!(".{}", source.extension().unwrap_or_else(|| "docx".to_string()));

        let input = ctx.artifacts.stage_file(&namespace, &suffix, source.bytes().clone()).await?;
        let dirs = ctx
            .artifacts
            .acquire_dir(&namespace)
            .and_then(|outdir| Ok((outdir, ctx.artifacts.acquire_dir(&format!("{namespace}-profile"))?)));
        let (outdir, profile) = match dirs {
            Ok(d) => d,
            Err(e) => {
                input.release();
                return Err(e.into());
            }
        };

        let outcome = match (input.path(), outdir.path(), profile.path()) {
            (Some(i), Some(o), Some(p)) => self.convert(i, o, p, ctx.request.target).await,
            _ => Err(AttemptError::Fault("office artifacts have no path".into())),
        };
        input.release();
        outdir.release();
        profile.release();

        let bytes = outcome?;
        debug!(request_id = %ctx.request_id, size = bytes.len(), "Office suite conversion finished");
        Ok(ConversionResult::new(
            bytes,
            ctx.request.target.mime_type(),
            ctx.output_filename(),
        ))
    }
}

//! On-disk home of comparison artifacts, one JSON file per compared pair.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::analysis::result::AnalysisResult;
use crate::analysis::{AnalysisError, Result};

const ARTIFACT_PREFIX: &str = "audio_analysis_";
const ARTIFACT_EXTENSION: &str = "json";

#[derive(Debug, Clone)]
pub struct ResultStore {
    root: PathBuf,
}

impl ResultStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes the artifact for `result` and returns its file name.
    ///
    /// The JSON lands in a uniquely named temp file in the store root and is
    /// renamed into place.
    pub fn save(&self, result: &AnalysisResult) -> Result<String> {
        let name = artifact_file_name(&result.files[0], &result.files[1]);
        let json = result.to_json()?;
        let dest = self.root.join(&name);
        let mut staging =
            NamedTempFile::new_in(&self.root).map_err(|err| io_error(&self.root, err))?;
        staging
            .write_all(json.as_bytes())
            .map_err(|err| io_error(staging.path(), err))?;
        staging
            .persist(&dest)
            .map_err(|err| io_error(&dest, err.error))?;
        info!(artifact = %name, bytes = json.len(), "saved comparison");
        Ok(name)
    }

    /// Sorted file names of every persisted artifact.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(io_error(&self.root, err)),
        };
        let mut names = Vec::new();
        for entry in entries {
            let path = entry.map_err(|err| io_error(&self.root, err))?.path();
            if !path.is_file()
                || path.extension().and_then(|ext| ext.to_str()) != Some(ARTIFACT_EXTENSION)
            {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
                names.push(name.to_string());
            }
        }
        names.sort();
        debug!(count = names.len(), root = %self.root.display(), "listed artifacts");
        Ok(names)
    }

    /// Raw bytes of a stored artifact, `None` when no such file exists.
    pub fn read_raw(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.resolve(name)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error(&path, err)),
        }
    }

    /// Parses a stored artifact back into an [`AnalysisResult`].
    pub fn load(&self, name: &str) -> Result<AnalysisResult> {
        let bytes = self
            .read_raw(name)?
            .ok_or_else(|| AnalysisError::Io(format!("no stored result named {name}")))?;
        let raw = String::from_utf8(bytes)
            .map_err(|err| AnalysisError::Artifact(format!("{name}: {err}")))?;
        AnalysisResult::from_json(&raw)
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let plain = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\']);
        if !plain {
            return Err(AnalysisError::InvalidRequest(format!(
                "result name {name:?} must be a plain file name"
            )));
        }
        Ok(self.root.join(name))
    }
}

/// `audio_analysis_<baseA>_vs_<baseB>.json`.
///
/// Only the last extension of each base name is dropped, so `take.v1.wav`
/// contributes `take.v1`.
pub fn artifact_file_name(file_a: &str, file_b: &str) -> String {
    format!(
        "{ARTIFACT_PREFIX}{}_vs_{}.{ARTIFACT_EXTENSION}",
        stem(file_a),
        stem(file_b)
    )
}

fn stem(file: &str) -> String {
    Path::new(file)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.to_string())
}

fn io_error(path: &Path, err: std::io::Error) -> AnalysisError {
    AnalysisError::Io(format!("{}: {err}", path.display()))
}

//! Deterministic archive assembly

use crate::error::{BuildError, BuildResult};
use blockyard_types::sha256_hex;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// Archive entries keyed by path; a later insert for the same path wins
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntrySet {
    entries: BTreeMap<String, Vec<u8>>,
}

impl EntrySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        let path = path.into();
        if self.entries.insert(path.clone(), bytes.into()).is_some() {
            debug!(path = %path, "Archive entry replaced by later producer");
        }
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.entries.get(path).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// First 16 hex chars of SHA-256 over every path and its content, in path order
pub fn content_build_id(entries: &EntrySet) -> String {
    let mut hasher = Sha256::new();
    for (path, bytes) in &entries.entries {
        hasher.update((path.len() as u64).to_le_bytes());
        hasher.update(path.as_bytes());
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    }
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledArtifact {
    pub zip_path: PathBuf,
    /// `dist/<project>-<build>.zip`
    pub relative_path: String,
    pub sha256: String,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct ArtifactAssembler {
    output_dir: PathBuf,
}

impl ArtifactAssembler {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write the archive to `dist/<project>-<build>.zip` under the output dir.
    ///
    /// The returned hash is computed over exactly the bytes written.
    pub async fn assemble(
        &self,
        project_id: &str,
        build_id: &str,
        entries: EntrySet,
    ) -> BuildResult<AssembledArtifact> {
        let bytes = tokio::task::spawn_blocking(move || encode_zip(&entries))
            .await
            .map_err(|e| BuildError::Task(e.to_string()))??;

        let relative_path = format!("dist/{}-{}.zip", project_id, build_id);
        let zip_path = self.output_dir.join(&relative_path);
        if let Some(parent) = zip_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let sha256 = sha256_hex(&bytes);
        let size = bytes.len() as u64;
        let tmp = zip_path.with_extension("zip.partial");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &zip_path).await?;

        info!(path = %zip_path.display(), size, sha256 = %sha256, "Artifact assembled");
        Ok(AssembledArtifact {
            zip_path,
            relative_path,
            sha256,
            size,
        })
    }
}

fn encode_zip(entries: &EntrySet) -> BuildResult<Vec<u8>> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (path, bytes) in &entries.entries {
        writer.start_file(path.as_str(), options)?;
        writer.write_all(bytes)?;
    }
    Ok(writer.finish()?.into_inner())
}

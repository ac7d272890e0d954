//! Content-addressed asset store for one episode.
//!
//! Layout under `<workdir>/<assets_folder>/<episode>/`:
//!
//! ```text
//! .staging/<request-id>-<attempt>.<ext>    in-progress writes
//! <request-id>-<sha256 prefix>.<ext>       committed files
//! <request-id>.json                        sidecar with the AssetResult
//! ```
//!
//! Files reach their final name only by rename, so an interrupted run
//! leaves either nothing or a complete file.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::logging::sanitize_filename;
use crate::models::{AssetFile, AssetOutcome, AssetResult, MediaKind};

const SIDECAR_VERSION: u32 = 1;
const HASH_PREFIX_LEN: usize = 16;

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    version: u32,
    result: AssetResult,
}

#[derive(Debug, Clone)]
pub struct AssetStore {
    root: PathBuf,
}

impl AssetStore {
    /// Store rooted at `<assets_root>/<episode_id>`.
    pub fn new(assets_root: impl AsRef<Path>, episode_id: &str) -> Self {
        Self {
            root: assets_root.as_ref().join(sanitize_filename(episode_id)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn staging_dir(&self) -> PathBuf {
        self.root.join(".staging")
    }

    /// Path a producer should write attempt `attempt` of `request_id` to.
    pub fn staging_path(&self, request_id: &str, attempt: u32, media: MediaKind) -> io::Result<PathBuf> {
        let dir = self.staging_dir();
        fs::create_dir_all(&dir)?;
        Ok(dir.join(format!(
            "{}-{}.{}",
            sanitize_filename(request_id),
            attempt,
            media.extension()
        )))
    }

    /// Move a finished staging file to its content-addressed location.
    pub fn commit(
        &self,
        request_id: &str,
        staged: &Path,
        media: MediaKind,
        duration_secs: Option<f64>,
    ) -> io::Result<AssetFile> {
        let hash = hash_file(staged)?;
        let path = self.root.join(format!(
            "{}-{}.{}",
            sanitize_filename(request_id),
            &hash[..HASH_PREFIX_LEN],
            media.extension()
        ));
        fs::create_dir_all(&self.root)?;
        fs::rename(staged, &path)?;

        Ok(AssetFile {
            path,
            media,
            duration_secs,
        })
    }

    /// Copy an outside file (e.g. a provisioned fallback) into the store.
    pub fn import(
        &self,
        request_id: &str,
        source: &Path,
        media: MediaKind,
        duration_secs: Option<f64>,
    ) -> io::Result<AssetFile> {
        let staged = self.staging_path(request_id, 0, media)?;
        fs::copy(source, &staged)?;
        self.commit(request_id, &staged, media, duration_secs)
    }

    fn sidecar_path(&self, request_id: &str) -> PathBuf {
        self.root.join(format!("{}.json", sanitize_filename(request_id)))
    }

    /// Persist a result next to its file. Overwrites any earlier record.
    pub fn record(&self, result: &AssetResult) -> io::Result<()> {
        fs::create_dir_all(&self.root)?;
        let sidecar = Sidecar {
            version: SIDECAR_VERSION,
            result: AssetResult {
                reused: false,
                ..result.clone()
            },
        };
        let json = serde_json::to_string_pretty(&sidecar).map_err(io::Error::other)?;

        let path = self.sidecar_path(&result.request_id);
        let temp = path.with_extension("json.tmp");
        fs::write(&temp, json)?;
        fs::rename(&temp, &path)
    }

    /// A previously resolved result whose file is still present.
    ///
    /// Degraded results are not returned so the next run tries again.
    pub fn lookup_resolved(&self, request_id: &str) -> Option<AssetResult> {
        let content = fs::read_to_string(self.sidecar_path(request_id)).ok()?;
        let sidecar: Sidecar = match serde_json::from_str(&content) {
            Ok(sidecar) => sidecar,
            Err(e) => {
                tracing::warn!(request_id, "ignoring unreadable asset sidecar: {}", e);
                return None;
            }
        };
        if sidecar.version != SIDECAR_VERSION {
            return None;
        }

        match &sidecar.result.outcome {
            AssetOutcome::Resolved { file } if file.path.is_file() => Some(AssetResult {
                reused: true,
                ..sidecar.result
            }),
            _ => None,
        }
    }

    /// Remove leftover staging files from abandoned attempts.
    pub fn clear_staging(&self) -> io::Result<()> {
        match fs::remove_dir_all(self.staging_dir()) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// Hex SHA-256 of a file's contents.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssetKind, FallbackSource, SceneVariant};
    use tempfile::tempdir;

    fn result_for(file: AssetFile, outcome_fallback: bool) -> AssetResult {
        let outcome = if outcome_fallback {
            AssetOutcome::Fallback {
                file,
                source: FallbackSource::Placeholder,
                reason: "test".into(),
            }
        } else {
            AssetOutcome::Resolved { file }
        };
        AssetResult {
            request_id: "scene-1".into(),
            kind: AssetKind::SceneVisual {
                scene_id: 1,
                variant: SceneVariant::Primary,
            },
            outcome,
            attempts: 1,
            quality_score: Some(0.9),
            elapsed_ms: 5,
            reused: false,
        }
    }

    #[test]
    fn commit_uses_content_address() {
        let dir = tempdir().unwrap();
        let store = AssetStore::new(dir.path(), "ep-1");
        let staged = store.staging_path("scene-1", 1, MediaKind::Image).unwrap();
        fs::write(&staged, b"pixels").unwrap();

        let file = store.commit("scene-1", &staged, MediaKind::Image, None).unwrap();
        let name = file.path.file_name().unwrap().to_string_lossy().to_string();
        let expected_hash = &hash_file(&file.path).unwrap()[..16];

        assert_eq!(name, format!("scene-1-{}.png", expected_hash));
        assert!(file.path.starts_with(dir.path().join("ep-1")));
        assert!(!staged.exists());
    }

    #[test]
    fn resolved_results_are_reused() {
        let dir = tempdir().unwrap();
        let store = AssetStore::new(dir.path(), "ep-1");
        let staged = store.staging_path("scene-1", 1, MediaKind::Image).unwrap();
        fs::write(&staged, b"pixels").unwrap();
        let file = store.commit("scene-1", &staged, MediaKind::Image, None).unwrap();

        store.record(&result_for(file, false)).unwrap();
        let reused = store.lookup_resolved("scene-1").unwrap();
        assert!(reused.reused);
        assert!(reused.is_resolved());
    }

    #[test]
    fn fallbacks_and_missing_files_are_not_reused() {
        let dir = tempdir().unwrap();
        let store = AssetStore::new(dir.path(), "ep-1");
        let staged = store.staging_path("scene-1", 1, MediaKind::Image).unwrap();
        fs::write(&staged, b"pixels").unwrap();
        let file = store.commit("scene-1", &staged, MediaKind::Image, None).unwrap();

        store.record(&result_for(file.clone(), true)).unwrap();
        assert!(store.lookup_resolved("scene-1").is_none());

        store.record(&result_for(file.clone(), false)).unwrap();
        fs::remove_file(&file.path).unwrap();
        assert!(store.lookup_resolved("scene-1").is_none());
    }

    #[test]
    fn clear_staging_tolerates_absence() {
        let dir = tempdir().unwrap();
        let store = AssetStore::new(dir.path(), "ep-1");
        store.clear_staging().unwrap();
    }
}

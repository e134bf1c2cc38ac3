//! Episode persistence and run artifacts.

use crate::episode::Episode;
use crate::simulation::SimulationResult;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::info;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Write `episode` as pretty JSON.
pub async fn save_episode(episode: &Episode, path: impl AsRef<Path>) -> Result<(), PersistError> {
    fs::write(path, episode.to_json()?).await?;
    Ok(())
}

/// Read and validate an episode. A malformed document is an error; nothing
/// is partially restored.
pub async fn load_episode(path: impl AsRef<Path>) -> Result<Episode, PersistError> {
    let content = fs::read_to_string(path).await?;
    Ok(Episode::from_json(&content)?)
}

/// Files written by [`save_artifacts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub episode: PathBuf,
    pub dialogue: PathBuf,
    pub detailed: PathBuf,
    pub summary: PathBuf,
}

impl ArtifactPaths {
    pub fn in_dir(dir: impl AsRef<Path>, episode_id: &str) -> Self {
        let dir = dir.as_ref();
        let stem = artifact_stem(episode_id);
        Self {
            episode: dir.join(format!("{stem}_episode.json")),
            dialogue: dir.join(format!("{stem}_dialogue.txt")),
            detailed: dir.join(format!("{stem}_detailed.txt")),
            summary: dir.join(format!("{stem}_summary.json")),
        }
    }
}

/// Save the episode, both transcripts, and the summary of a run into `dir`,
/// creating it if needed.
pub async fn save_artifacts(
    dir: impl AsRef<Path>,
    result: &SimulationResult,
) -> Result<ArtifactPaths, PersistError> {
    fs::create_dir_all(dir.as_ref()).await?;
    let paths = ArtifactPaths::in_dir(dir, &result.episode.episode_id);

    save_episode(&result.episode, &paths.episode).await?;
    fs::write(&paths.dialogue, &result.dialogue_transcript).await?;
    fs::write(&paths.detailed, &result.detailed_transcript).await?;
    fs::write(&paths.summary, serde_json::to_string_pretty(&result.summary)?).await?;

    info!(dir = %dir_display(&paths.episode), "saved run artifacts");
    Ok(paths)
}

/// List episode documents (`*_episode.json`) in a directory, sorted by path.
pub async fn list_episodes(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, PersistError> {
    let mut found = Vec::new();
    let mut entries = fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_episode = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.ends_with("_episode.json"))
            .unwrap_or(false);
        if is_episode {
            found.push(path);
        }
    }

    found.sort();
    Ok(found)
}

/// A filesystem-safe stem for an episode id.
pub fn artifact_stem(episode_id: &str) -> String {
    let sanitized: String = episode_id
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    if sanitized.is_empty() {
        "episode".to_string()
    } else {
        sanitized
    }
}

fn dir_display(path: &Path) -> String {
    path.parent()
        .map(|p| p.display().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_stem() {
        assert_eq!(artifact_stem("corp_espionage_001"), "corp_espionage_001");
        assert_eq!(artifact_stem("../etc/passwd"), "___etc_passwd");
        assert_eq!(artifact_stem(""), "episode");
    }

    #[test]
    fn test_artifact_paths() {
        let paths = ArtifactPaths::in_dir("/runs", "ep 1");
        assert!(paths.episode.ends_with("ep_1_episode.json"));
        assert!(paths.summary.ends_with("ep_1_summary.json"));
    }
}

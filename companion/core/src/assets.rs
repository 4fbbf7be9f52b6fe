//! Asset Selection
//!
//! Given a mood, find an overlay asset for it. The correlator only sees the
//! [`AssetSelector`] trait; [`LocalAssetSelector`] is the file-system
//! implementation.
//!
//! # Matching Rules
//!
//! A mood has a list of tags. One tag is picked at random per selection and a
//! file matches when its name is `<tag>_<anything>.<ext>` for an accepted
//! extension:
//!
//! - the root asset folder is scanned non-recursively
//! - every active series folder (`<root>/<series>`) is scanned recursively
//!
//! One match is then picked at random. Folders that cannot be read are
//! skipped, not reported.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use thiserror::Error;

use crate::mood::Mood;
use crate::settings::SettingsProvider;

/// Errors raised while selecting an asset
#[derive(Debug, Error)]
pub enum AssetError {
    /// No asset folder is configured
    #[error("Asset folder is not configured")]
    FolderNotConfigured,

    /// Reading the asset library failed
    #[error("Failed to read assets at {path}: {source}")]
    Io {
        /// Path being read
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },
}

/// Picks an asset for a mood
#[async_trait]
pub trait AssetSelector: Send + Sync {
    /// Path of a randomly chosen asset for `mood`, or `None` when nothing matches
    async fn select(&self, mood: Mood) -> Result<Option<PathBuf>, AssetError>;
}

/// Selects assets from a local folder tree
pub struct LocalAssetSelector {
    settings: Arc<dyn SettingsProvider>,
}

impl LocalAssetSelector {
    /// Create a selector reading its folder and tags from `settings`
    pub fn new(settings: Arc<dyn SettingsProvider>) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl AssetSelector for LocalAssetSelector {
    async fn select(&self, mood: Mood) -> Result<Option<PathBuf>, AssetError> {
        let settings = self.settings.current().assets;
        let root = settings.folder.ok_or(AssetError::FolderNotConfigured)?;
        tokio::fs::metadata(&root)
            .await
            .map_err(|source| AssetError::Io {
                path: root.clone(),
                source,
            })?;

        let tag = {
            let mut rng = rand::thread_rng();
            settings.tags.for_mood(mood).choose(&mut rng).cloned()
        };
        let Some(tag) = tag else {
            tracing::debug!(%mood, "No tags configured for mood");
            return Ok(None);
        };

        let matcher = TagMatcher::new(&tag, &settings.extensions);

        let mut found = scan_dir(&root, &matcher).await;
        for series in &settings.active_series {
            found.extend(scan_tree(&root.join(series), &matcher).await);
        }

        let picked = {
            let mut rng = rand::thread_rng();
            found.choose(&mut rng).cloned()
        };
        match &picked {
            Some(path) => tracing::debug!(%mood, %tag, path = %path.display(), "Selected asset"),
            None => tracing::debug!(%mood, %tag, "No assets matched tag"),
        }
        Ok(picked)
    }
}

/// File name matcher for one tag
struct TagMatcher {
    prefix: String,
    extensions: Vec<String>,
}

impl TagMatcher {
    fn new(tag: &str, extensions: &[String]) -> Self {
        Self {
            prefix: format!("{tag}_"),
            extensions: extensions.iter().map(|e| e.to_ascii_lowercase()).collect(),
        }
    }

    fn matches(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        name.starts_with(&self.prefix)
            && self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }
}

/// Matching files directly inside `dir`
async fn scan_dir(dir: &Path, matcher: &TagMatcher) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        tracing::trace!(dir = %dir.display(), "Skipping unreadable asset folder");
        return found;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        let path = entry.path();
        if is_file && matcher.matches(&path) {
            found.push(path);
        }
    }
    found
}

/// Matching files anywhere below `root`
async fn scan_tree(root: &Path, matcher: &TagMatcher) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
            tracing::trace!(dir = %dir.display(), "Skipping unreadable series folder");
            continue;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            let path = entry.path();
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() && matcher.matches(&path) {
                found.push(path);
            }
        }
    }
    found
}

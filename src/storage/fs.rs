/// Filesystem implementation of the note store
///
/// A vault is a directory tree of markdown files. Paths handed to the
/// store are vault-relative and always use `/` as separator.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;

use crate::storage::{is_relative_inside_vault, NoteInfo, NoteStore, SearchHit, StorageError};

/// Characters of context kept on each side of a search match
const SNIPPET_CONTEXT: usize = 50;

/// Note store backed by a directory on disk
#[derive(Debug, Clone)]
pub struct FsVault {
    root: PathBuf,
}

impl FsVault {
    /// Open the vault rooted at `root`, which must be an existing directory
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(StorageError::InvalidPath {
                path: root.display().to_string(),
            });
        }

        tracing::info!("Vault opened at: {:?}", root);
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        if !is_relative_inside_vault(path) {
            return Err(StorageError::InvalidPath {
                path: path.to_string(),
            });
        }
        Ok(self.root.join(path))
    }

    /// Resolve `path` and require that it names a regular file
    async fn existing_file(&self, path: &str) -> Result<PathBuf, StorageError> {
        let full = self.resolve(path)?;
        match fs::metadata(&full).await {
            Ok(meta) if meta.is_file() => Ok(full),
            Ok(_) => Err(StorageError::NotFound {
                path: path.to_string(),
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound {
                path: path.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Vault-relative form of an absolute path below the root
    fn relative(&self, full: &Path) -> String {
        full.strip_prefix(&self.root)
            .unwrap_or(full)
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Collect every file below `start`, skipping dot-files and dot-folders
    async fn walk(&self, start: PathBuf) -> Result<Vec<(PathBuf, std::fs::Metadata)>, StorageError> {
        let mut files = Vec::new();
        let mut pending = vec![start];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_name().to_string_lossy().starts_with('.') {
                    continue;
                }
                let meta = entry.metadata().await?;
                if meta.is_dir() {
                    pending.push(entry.path());
                } else if meta.is_file() {
                    files.push((entry.path(), meta));
                }
            }
        }

        files.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(files)
    }

    fn note_info(&self, full: &Path, meta: &std::fs::Metadata) -> NoteInfo {
        let modified: DateTime<Utc> = meta
            .modified()
            .map(DateTime::from)
            .unwrap_or_else(|_| Utc::now());
        // Creation time is not available on every filesystem
        let created: DateTime<Utc> = meta.created().map(DateTime::from).unwrap_or(modified);

        NoteInfo {
            path: self.relative(full),
            name: full
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            extension: full
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default(),
            size: meta.len(),
            created_at: created,
            modified_at: modified,
        }
    }
}

/// Score `content` against `query` and cut a snippet around the first match
///
/// Returns `None` when the query does not occur. Matching is
/// case-insensitive; the snippet is taken from the original text.
pub fn match_note(content: &str, query: &str) -> Option<(usize, String)> {
    if query.is_empty() {
        return None;
    }

    // Lowercasing can turn one char into several; `origin` maps each folded
    // char back to the char of `content` it came from
    let mut lower_content = String::with_capacity(content.len());
    let mut origin = Vec::with_capacity(content.len());
    for (index, c) in content.chars().enumerate() {
        for folded in c.to_lowercase() {
            lower_content.push(folded);
            origin.push(index);
        }
    }

    let lower_query: String = query.chars().flat_map(char::to_lowercase).collect();
    let byte_index = lower_content.find(&lower_query)?;
    let score = lower_content.matches(&lower_query).count();

    let folded_start = lower_content[..byte_index].chars().count();
    let folded_end = folded_start + lower_query.chars().count();
    let match_start = *origin.get(folded_start)?;
    let match_end = origin.get(folded_end - 1).map_or(match_start, |last| last + 1);

    let start = match_start.saturating_sub(SNIPPET_CONTEXT);
    let take = (match_end - start) + SNIPPET_CONTEXT;
    let snippet: String = content.chars().skip(start).take(take).collect();

    Some((score, snippet))
}

#[async_trait]
impl NoteStore for FsVault {
    async fn read(&self, path: &str) -> Result<String, StorageError> {
        let full = self.existing_file(path).await?;
        Ok(fs::read_to_string(full).await?)
    }

    async fn write(&self, path: &str, content: &str, overwrite: bool) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        let exists = fs::try_exists(&full).await?;
        if exists && !overwrite {
            return Err(StorageError::AlreadyExists {
                path: path.to_string(),
            });
        }

        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&full, content).await?;

        tracing::debug!("Wrote note: {} ({} bytes)", path, content.len());
        Ok(())
    }

    async fn update(&self, path: &str, content: &str) -> Result<(), StorageError> {
        let full = self.existing_file(path).await?;
        fs::write(&full, content).await?;

        tracing::debug!("Updated note: {} ({} bytes)", path, content.len());
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let full = self.existing_file(path).await?;
        fs::remove_file(&full).await?;

        tracing::debug!("Deleted note: {}", path);
        Ok(())
    }

    async fn list(&self, folder: &str) -> Result<Vec<NoteInfo>, StorageError> {
        let start = self.resolve(folder)?;
        match fs::metadata(&start).await {
            Ok(meta) if meta.is_dir() => {}
            _ => {
                return Err(StorageError::InvalidPath {
                    path: folder.to_string(),
                })
            }
        }

        let files = self.walk(start).await?;
        Ok(files
            .iter()
            .map(|(full, meta)| self.note_info(full, meta))
            .collect())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, StorageError> {
        let mut hits = Vec::new();

        for (full, _) in self.walk(self.root.clone()).await? {
            if full.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let content = match fs::read_to_string(&full).await {
                Ok(content) => content,
                Err(e) => {
                    tracing::debug!("Skipping unreadable note {:?}: {}", full, e);
                    continue;
                }
            };
            if let Some((score, snippet)) = match_note(&content, query) {
                hits.push(SearchHit {
                    path: self.relative(&full),
                    snippet,
                    score,
                });
            }
        }

        hits.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.path.cmp(&b.path)));
        hits.truncate(limit);
        Ok(hits)
    }
}

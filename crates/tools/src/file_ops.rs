//! Project-scoped file access: the file-content provider behind the Files
//! domain and the roundtrip transaction manager.
//!
//! Every path a caller hands us is relative to a project root.  Paths that
//! are absolute, contain `..`, or resolve (through symlinks) outside the
//! root are rejected with `InvalidInput` before any I/O happens.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use fg_domain::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Collaborator traits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Byte-level file access scoped to one project root.
///
/// `path` arguments are normalized relative paths (see [`normalize_path`]).
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Read a file.  Missing files yield `NotFound`.
    async fn read(&self, path: &str) -> Result<Vec<u8>>;
    /// Durably replace (or create) a file.
    async fn write(&self, path: &str, bytes: &[u8]) -> Result<()>;
    async fn delete(&self, path: &str) -> Result<()>;
    async fn exists(&self, path: &str) -> Result<bool>;
    async fn list(&self, path: &str) -> Result<Vec<DirEntry>>;
}

/// Resolves a project id to its [`FileStore`].
pub trait ProjectFiles: Send + Sync {
    fn open(&self, project_id: &str) -> Result<Arc<dyn FileStore>>;
}

#[derive(Debug, Clone, Serialize)]
pub struct DirEntry {
    pub name: String,
    pub size: u64,
    pub modified: String,
    pub is_dir: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Path validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Lexically normalize a caller-supplied relative path.
///
/// Drops `.` segments and duplicate separators; rejects empty, absolute and
/// `..`-containing paths.  The result uses `/` separators and is the key the
/// transaction manager stores fingerprints under.
pub fn normalize_path(requested: &str) -> Result<String> {
    let requested_path = Path::new(requested);
    if requested_path.is_absolute() || requested.starts_with('/') || requested.starts_with('\\') {
        return Err(Error::invalid(format!(
            "absolute paths are not allowed; use a path relative to the project root (got '{requested}')"
        )));
    }

    let mut parts: Vec<String> = Vec::new();
    for component in requested_path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(Error::invalid("path must not contain '..' components"));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(Error::invalid(format!(
                    "absolute paths are not allowed (got '{requested}')"
                )));
            }
        }
    }

    if parts.is_empty() {
        return Err(Error::invalid("path must not be empty"));
    }
    Ok(parts.join("/"))
}

/// Validate and resolve a requested path within a project root.
///
/// 1. Lexically normalizes the path (see [`normalize_path`]).
/// 2. Joins it onto the canonicalized root.
/// 3. Canonicalizes the longest existing prefix and checks the resolved
///    path is still contained within the root (defeats symlink escapes).
pub fn validate_path(root: &Path, requested: &str) -> Result<PathBuf> {
    let normalized = normalize_path(requested)?;

    let canonical_root = root.canonicalize().map_err(|e| {
        Error::internal(format!("cannot resolve project root '{}': {e}", root.display()))
    })?;

    let candidate = canonical_root.join(&normalized);

    // If the target already exists we can canonicalize directly.
    // Otherwise we canonicalize the longest existing prefix and append
    // the remaining components, then check containment.
    let resolved = if candidate.exists() {
        candidate.canonicalize().map_err(|e| {
            Error::internal(format!("cannot resolve path '{}': {e}", candidate.display()))
        })?
    } else {
        let mut existing = candidate.as_path();
        let mut tail_parts: Vec<&std::ffi::OsStr> = Vec::new();
        while !existing.exists() {
            match existing.parent() {
                Some(parent) => {
                    if let Some(file_name) = existing.file_name() {
                        tail_parts.push(file_name);
                    }
                    existing = parent;
                }
                None => break,
            }
        }
        let mut resolved = existing.canonicalize().map_err(|e| {
            Error::internal(format!("cannot resolve ancestor of '{}': {e}", candidate.display()))
        })?;
        for part in tail_parts.into_iter().rev() {
            resolved.push(part);
        }
        resolved
    };

    if !resolved.starts_with(&canonical_root) {
        return Err(Error::invalid(format!(
            "path '{requested}' resolves outside the project root"
        )));
    }

    Ok(resolved)
}

/// Project ids become directory names, so keep them to a safe alphabet.
pub fn validate_project_id(project_id: &str) -> Result<()> {
    let ok = !project_id.is_empty()
        && project_id.len() <= 128
        && project_id != "."
        && project_id != ".."
        && project_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(Error::invalid(format!("invalid projectId '{project_id}'")))
    }
}

fn io_error(op: &str, path: &str, e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        Error::not_found(format!("'{path}' does not exist"))
    } else {
        Error::internal(format!("failed to {op} '{path}': {e}"))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Local filesystem implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// [`FileStore`] over a directory on the local filesystem.
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = validate_path(&self.root, path)?;
        let meta = fs::metadata(&full).await.map_err(|e| io_error("stat", path, e))?;
        if meta.is_dir() {
            return Err(Error::invalid(format!("'{path}' is a directory")));
        }
        fs::read(&full).await.map_err(|e| io_error("read", path, e))
    }

    /// Write to a uniquely-named `.tmp` sibling, sync, then rename into place.
    async fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let full = validate_path(&self.root, path)?;

        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::internal(format!("failed to create parent directory: {e}")))?;
        }

        let tmp_name = format!(
            ".{}.{}.tmp",
            full.file_name().unwrap_or_default().to_string_lossy(),
            uuid::Uuid::new_v4().as_simple()
        );
        let tmp_path = full.with_file_name(tmp_name);

        let mut file = fs::File::create(&tmp_path)
            .await
            .map_err(|e| Error::internal(format!("failed to create temp file: {e}")))?;
        file.write_all(bytes)
            .await
            .map_err(|e| Error::internal(format!("failed to write temp file: {e}")))?;
        file.flush()
            .await
            .map_err(|e| Error::internal(format!("failed to flush temp file: {e}")))?;
        file.sync_data()
            .await
            .map_err(|e| Error::internal(format!("failed to sync temp file: {e}")))?;
        drop(file);

        if let Err(e) = fs::rename(&tmp_path, &full).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(Error::internal(format!(
                "failed to rename temp file into place for '{path}': {e}"
            )));
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full = validate_path(&self.root, path)?;
        fs::remove_file(&full).await.map_err(|e| io_error("remove", path, e))
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full = validate_path(&self.root, path)?;
        Ok(fs::try_exists(&full).await.unwrap_or(false))
    }

    async fn list(&self, path: &str) -> Result<Vec<DirEntry>> {
        let full = if path.is_empty() || path == "." {
            self.root.clone()
        } else {
            validate_path(&self.root, path)?
        };

        let mut read_dir = fs::read_dir(&full).await.map_err(|e| io_error("list", path, e))?;
        let mut entries = Vec::new();

        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| Error::internal(format!("failed to read directory entry: {e}")))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            // Temp files from in-flight writes are not part of the project.
            if name.starts_with('.') && name.ends_with(".tmp") {
                continue;
            }
            let metadata = entry
                .metadata()
                .await
                .map_err(|e| Error::internal(format!("failed to read metadata for '{name}': {e}")))?;
            let modified = metadata
                .modified()
                .ok()
                .map(|t| {
                    let dt: DateTime<Utc> = t.into();
                    dt.to_rfc3339()
                })
                .unwrap_or_default();

            entries.push(DirEntry {
                name,
                size: metadata.len(),
                modified,
                is_dir: metadata.is_dir(),
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

/// [`ProjectFiles`] rooted at `<projects_root>/<projectId>`.
pub struct LocalProjects {
    projects_root: PathBuf,
}

impl LocalProjects {
    pub fn new(projects_root: impl Into<PathBuf>) -> Self {
        Self {
            projects_root: projects_root.into(),
        }
    }
}

impl ProjectFiles for LocalProjects {
    fn open(&self, project_id: &str) -> Result<Arc<dyn FileStore>> {
        validate_project_id(project_id)?;
        let root = self.projects_root.join(project_id);
        if !root.is_dir() {
            return Err(Error::not_found(format!("project '{project_id}' not found")));
        }
        Ok(Arc::new(LocalFileStore::new(root)))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use fg_domain::error::ErrorCode;
    use tempfile::TempDir;

    fn tmp_workspace() -> TempDir {
        TempDir::new().expect("failed to create temp dir")
    }

    #[test]
    fn normalize_strips_dot_segments() {
        assert_eq!(normalize_path("./src//main.rs").unwrap(), "src/main.rs");
        assert_eq!(normalize_path("a.txt").unwrap(), "a.txt");
    }

    #[test]
    fn normalize_rejects_traversal_and_empty() {
        assert_eq!(normalize_path("../etc/passwd").unwrap_err().code(), ErrorCode::InvalidInput);
        assert_eq!(normalize_path("a/../../b").unwrap_err().code(), ErrorCode::InvalidInput);
        assert_eq!(normalize_path("").unwrap_err().code(), ErrorCode::InvalidInput);
        assert_eq!(normalize_path("./").unwrap_err().code(), ErrorCode::InvalidInput);
    }

    #[test]
    fn validate_path_rejects_absolute_path() {
        let ws = tmp_workspace();
        let abs_path = if cfg!(windows) { "C:\\Windows\\System32" } else { "/etc/passwd" };
        let err = validate_path(ws.path(), abs_path).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInput);
    }

    #[test]
    fn validate_path_accepts_nested_new_file() {
        let ws = tmp_workspace();
        std::fs::create_dir_all(ws.path().join("subdir")).unwrap();
        let resolved = validate_path(ws.path(), "subdir/new_file.txt").unwrap();
        assert!(resolved.ends_with("subdir/new_file.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn validate_path_rejects_symlink_escape() {
        let ws = tmp_workspace();
        let outside = tmp_workspace();
        std::fs::write(outside.path().join("secret.txt"), "s3cret").unwrap();
        std::os::unix::fs::symlink(outside.path(), ws.path().join("link")).unwrap();

        let err = validate_path(ws.path(), "link/secret.txt").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInput);
    }

    #[test]
    fn project_ids_are_restricted() {
        assert!(validate_project_id("proj-1_a.b").is_ok());
        assert!(validate_project_id("..").is_err());
        assert!(validate_project_id("a/b").is_err());
        assert!(validate_project_id("").is_err());
    }

    #[tokio::test]
    async fn write_then_read_back() {
        let ws = tmp_workspace();
        let store = LocalFileStore::new(ws.path());

        store.write("nested/hello.txt", b"hello, world\n").await.unwrap();
        assert_eq!(store.read("nested/hello.txt").await.unwrap(), b"hello, world\n");
        assert!(store.exists("nested/hello.txt").await.unwrap());

        // No temp files left behind.
        let names: Vec<String> = std::fs::read_dir(ws.path().join("nested"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["hello.txt".to_string()]);
    }

    #[tokio::test]
    async fn read_missing_is_not_found() {
        let ws = tmp_workspace();
        let store = LocalFileStore::new(ws.path());
        let err = store.read("nope.txt").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn delete_removes_file() {
        let ws = tmp_workspace();
        let store = LocalFileStore::new(ws.path());
        store.write("doomed.txt", b"bye").await.unwrap();
        store.delete("doomed.txt").await.unwrap();
        assert!(!ws.path().join("doomed.txt").exists());
        assert_eq!(store.delete("doomed.txt").await.unwrap_err().code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn list_returns_sorted_entries() {
        let ws = tmp_workspace();
        std::fs::write(ws.path().join("b.txt"), "bb").unwrap();
        std::fs::write(ws.path().join("a.txt"), "aaa").unwrap();
        std::fs::create_dir(ws.path().join("subdir")).unwrap();

        let store = LocalFileStore::new(ws.path());
        let entries = store.list(".").await.unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "subdir"]);
        assert!(entries[2].is_dir);
        assert_eq!(entries[0].size, 3);
    }

    #[test]
    fn local_projects_requires_existing_directory() {
        let root = tmp_workspace();
        std::fs::create_dir(root.path().join("alpha")).unwrap();
        let projects = LocalProjects::new(root.path());

        assert!(projects.open("alpha").is_ok());
        let err = projects.open("beta").err().unwrap();
        assert_eq!(err.code(), ErrorCode::NotFound);
        let err = projects.open("../alpha").err().unwrap();
        assert_eq!(err.code(), ErrorCode::InvalidInput);
    }
}

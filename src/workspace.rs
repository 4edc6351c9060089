use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Filesystem seam for canvas persistence.
///
/// Paths are relative to the workspace root. The canvas store only needs
/// text round-trips and directory listing; richer file operations belong to
/// the file browser, which lives outside this crate.
pub trait Workspace: Send + Sync {
    fn read_text(&self, path: &str) -> Result<String>;
    fn write_text(&self, path: &str, content: &str) -> Result<()>;
    fn append_text(&self, path: &str, content: &str) -> Result<()>;
    fn list(&self, path: &str) -> Result<Vec<String>>;
    fn exists(&self, path: &str) -> bool;
}

pub struct LocalWorkspace {
    root: PathBuf,
}

impl LocalWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl Workspace for LocalWorkspace {
    fn read_text(&self, path: &str) -> Result<String> {
        let full = self.resolve(path);
        fs::read_to_string(&full).with_context(|| format!("Failed to read {}", full.display()))
    }

    fn write_text(&self, path: &str, content: &str) -> Result<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&full, content).with_context(|| format!("Failed to write {}", full.display()))
    }

    fn append_text(&self, path: &str, content: &str) -> Result<()> {
        use std::io::Write;
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&full)
            .with_context(|| format!("Failed to open {}", full.display()))?;
        file.write_all(content.as_bytes())
            .with_context(|| format!("Failed to append to {}", full.display()))
    }

    fn list(&self, path: &str) -> Result<Vec<String>> {
        let full = self.resolve(path);
        let mut entries = Vec::new();
        for entry in
            fs::read_dir(&full).with_context(|| format!("Failed to list {}", full.display()))?
        {
            let entry = entry?;
            entries.push(entry.file_name().to_string_lossy().into_owned());
        }
        entries.sort();
        Ok(entries)
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_read_round_trip_creates_parent_dirs() {
        let dir = TempDir::new().expect("tempdir");
        let ws = LocalWorkspace::new(dir.path());

        ws.write_text(".canvas/canvas.md", "# Canvas\n").expect("write");
        assert_eq!(ws.read_text(".canvas/canvas.md").expect("read"), "# Canvas\n");
        assert!(ws.exists(".canvas/canvas.md"));
    }

    #[test]
    fn test_append_text_accumulates() {
        let dir = TempDir::new().expect("tempdir");
        let ws = LocalWorkspace::new(dir.path());

        ws.append_text("log.md", "a").expect("append");
        ws.append_text("log.md", "b").expect("append");
        assert_eq!(ws.read_text("log.md").expect("read"), "ab");
    }

    #[test]
    fn test_list_returns_sorted_entries() {
        let dir = TempDir::new().expect("tempdir");
        let ws = LocalWorkspace::new(dir.path());

        ws.write_text("b.txt", "").expect("write");
        ws.write_text("a.txt", "").expect("write");
        assert_eq!(ws.list("").expect("list"), vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_read_missing_file_is_an_error() {
        let dir = TempDir::new().expect("tempdir");
        let ws = LocalWorkspace::new(dir.path());
        assert!(ws.read_text("missing.md").is_err());
    }
}

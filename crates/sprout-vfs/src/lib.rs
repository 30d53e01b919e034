//! An in-memory hierarchical filesystem with files, directories, and
//! symlinks, plus a serializable snapshot form for caching whole trees.
//!
//! Paths are absolute, normalized, forward-slash strings. Nodes are kept in
//! a single path-keyed map rather than a linked tree, so there is no shared
//! mutable parent/child state; the parent relationship is the path prefix.

use std::collections::BTreeMap;

use thiserror::Error;

pub use snapshot::{FileEntry, VfsSnapshot};

mod path;
mod snapshot;

/// Symlink chains longer than this are treated as cycles.
const MAX_LINK_HOPS: usize = 40;

#[derive(Debug, Error)]
pub enum VfsError {
    #[error("path `{0}` is not absolute")]
    NotAbsolute(String),
    #[error("no such file or directory: `{0}`")]
    NotFound(String),
    #[error("not a directory: `{0}`")]
    NotADirectory(String),
    #[error("is a directory: `{0}`")]
    IsADirectory(String),
    #[error("file exists: `{0}`")]
    AlreadyExists(String),
    #[error("not a symbolic link: `{0}`")]
    NotASymlink(String),
    #[error("too many levels of symbolic links: `{0}`")]
    TooManyLinks(String),
    #[error("invalid UTF-8 in `{0}`")]
    InvalidUtf8(String),
    #[error("cannot remove the root directory")]
    RemoveRoot,
    #[error("invalid snapshot entry for `{path}`: {reason}")]
    InvalidSnapshotEntry { path: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Directory,
    File(Vec<u8>),
    Symlink(String),
}

/// The kind of a filesystem node, as reported by [`Vfs::stat`] and
/// [`Vfs::lstat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Directory,
    Symlink,
}

#[derive(Debug, Clone, Copy)]
pub struct Metadata {
    file_type: FileType,
    len: u64,
}

impl Metadata {
    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    pub fn is_file(&self) -> bool {
        matches!(self.file_type, FileType::File)
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.file_type, FileType::Directory)
    }

    pub fn is_symlink(&self) -> bool {
        matches!(self.file_type, FileType::Symlink)
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// An in-memory filesystem rooted at `/`.
#[derive(Debug, Clone)]
pub struct Vfs {
    nodes: BTreeMap<String, Node>,
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new()
    }
}

impl Vfs {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::Directory);
        Self { nodes }
    }

    /// Resolve a path, following intermediate symlinks. When
    /// `follow_terminal` is set, a symlink in the final position is followed
    /// as well (`stat` semantics); otherwise it is returned as-is (`lstat`
    /// semantics).
    fn resolve(&self, path: &str, follow_terminal: bool) -> Result<String, VfsError> {
        let normalized = path::normalize(path)?;

        // Walk component-by-component with a stack so that a symlink target
        // can splice its own components in front of the remainder.
        let mut pending: Vec<String> = normalized
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect();
        pending.reverse();

        let mut resolved = String::from("/");
        let mut hops = 0usize;
        while let Some(component) = pending.pop() {
            let candidate = path::join(&resolved, &component);
            let is_last = pending.is_empty();
            match self.nodes.get(&candidate) {
                Some(Node::Symlink(target)) if follow_terminal || !is_last => {
                    hops += 1;
                    if hops > MAX_LINK_HOPS {
                        return Err(VfsError::TooManyLinks(path.to_string()));
                    }
                    let joined = if target.starts_with('/') {
                        target.clone()
                    } else {
                        format!("{}/{target}", resolved)
                    };
                    let mut spliced: Vec<String> = path::normalize(&joined)?
                        .split('/')
                        .filter(|segment| !segment.is_empty())
                        .map(str::to_string)
                        .collect();
                    spliced.reverse();
                    pending.extend(spliced);
                    resolved = String::from("/");
                }
                _ => resolved = candidate,
            }
        }
        Ok(resolved)
    }

    /// Create a single directory. The parent must already exist.
    pub fn mkdir(&mut self, path: &str) -> Result<(), VfsError> {
        let resolved = self.resolve(path, true)?;
        if self.nodes.contains_key(&resolved) {
            return Err(VfsError::AlreadyExists(resolved));
        }
        let parent = path::parent(&resolved);
        match self.nodes.get(parent) {
            Some(Node::Directory) => {
                self.nodes.insert(resolved, Node::Directory);
                Ok(())
            }
            Some(_) => Err(VfsError::NotADirectory(parent.to_string())),
            None => Err(VfsError::NotFound(parent.to_string())),
        }
    }

    /// Create a directory and any missing ancestors. Idempotent.
    pub fn mkdir_all(&mut self, path: &str) -> Result<(), VfsError> {
        let resolved = self.resolve(path, true)?;
        self.ensure_dir(&resolved)
    }

    fn ensure_dir(&mut self, resolved: &str) -> Result<(), VfsError> {
        let mut current = String::from("/");
        for segment in resolved.split('/').filter(|segment| !segment.is_empty()) {
            current = path::join(&current, segment);
            match self.nodes.get(&current) {
                None => {
                    self.nodes.insert(current.clone(), Node::Directory);
                }
                Some(Node::Directory) => {}
                Some(_) => return Err(VfsError::NotADirectory(current)),
            }
        }
        Ok(())
    }

    /// Write a file, synthesizing missing parent directories. An existing
    /// file at the path is overwritten; a directory is an error.
    pub fn write_file(&mut self, path: &str, contents: impl Into<Vec<u8>>) -> Result<(), VfsError> {
        let resolved = self.resolve(path, true)?;
        if let Some(Node::Directory) = self.nodes.get(&resolved) {
            return Err(VfsError::IsADirectory(resolved));
        }
        self.ensure_dir(path::parent(&resolved))?;
        self.nodes.insert(resolved, Node::File(contents.into()));
        Ok(())
    }

    /// Read a file's bytes, following symlinks.
    pub fn read_file(&self, path: &str) -> Result<&[u8], VfsError> {
        let resolved = self.resolve(path, true)?;
        match self.nodes.get(&resolved) {
            Some(Node::File(contents)) => Ok(contents),
            Some(Node::Directory) => Err(VfsError::IsADirectory(resolved)),
            Some(Node::Symlink(_)) | None => Err(VfsError::NotFound(path.to_string())),
        }
    }

    /// Read a file as UTF-8, following symlinks.
    pub fn read_to_string(&self, path: &str) -> Result<String, VfsError> {
        let contents = self.read_file(path)?;
        String::from_utf8(contents.to_vec()).map_err(|_| VfsError::InvalidUtf8(path.to_string()))
    }

    /// Whether a path resolves to an existing node, following symlinks.
    pub fn exists(&self, path: &str) -> bool {
        self.resolve(path, true)
            .is_ok_and(|resolved| self.nodes.contains_key(&resolved))
    }

    /// Node metadata, following symlinks.
    pub fn stat(&self, path: &str) -> Result<Metadata, VfsError> {
        let resolved = self.resolve(path, true)?;
        self.metadata(&resolved, path)
    }

    /// Node metadata without following a terminal symlink.
    pub fn lstat(&self, path: &str) -> Result<Metadata, VfsError> {
        let resolved = self.resolve(path, false)?;
        self.metadata(&resolved, path)
    }

    fn metadata(&self, resolved: &str, requested: &str) -> Result<Metadata, VfsError> {
        match self.nodes.get(resolved) {
            Some(Node::File(contents)) => Ok(Metadata {
                file_type: FileType::File,
                len: contents.len() as u64,
            }),
            Some(Node::Directory) => Ok(Metadata {
                file_type: FileType::Directory,
                len: 0,
            }),
            Some(Node::Symlink(target)) => Ok(Metadata {
                file_type: FileType::Symlink,
                len: target.len() as u64,
            }),
            None => Err(VfsError::NotFound(requested.to_string())),
        }
    }

    /// Create a symlink at `link_path` pointing at `target`, synthesizing
    /// missing parent directories. The target is stored verbatim and may be
    /// relative (resolved against the link's parent) or dangling.
    pub fn symlink(&mut self, target: &str, link_path: &str) -> Result<(), VfsError> {
        let resolved = self.resolve(link_path, false)?;
        if self.nodes.contains_key(&resolved) {
            return Err(VfsError::AlreadyExists(resolved));
        }
        self.ensure_dir(path::parent(&resolved))?;
        self.nodes.insert(resolved, Node::Symlink(target.to_string()));
        Ok(())
    }

    /// The stored target of a symlink.
    pub fn read_link(&self, path: &str) -> Result<&str, VfsError> {
        let resolved = self.resolve(path, false)?;
        match self.nodes.get(&resolved) {
            Some(Node::Symlink(target)) => Ok(target),
            Some(_) => Err(VfsError::NotASymlink(path.to_string())),
            None => Err(VfsError::NotFound(path.to_string())),
        }
    }

    /// The sorted names of a directory's immediate children.
    pub fn read_dir(&self, path: &str) -> Result<Vec<String>, VfsError> {
        let resolved = self.resolve(path, true)?;
        match self.nodes.get(&resolved) {
            Some(Node::Directory) => {}
            Some(_) => return Err(VfsError::NotADirectory(path.to_string())),
            None => return Err(VfsError::NotFound(path.to_string())),
        }
        let prefix = if resolved == "/" {
            "/".to_string()
        } else {
            format!("{resolved}/")
        };
        let names = self
            .nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter_map(|(key, _)| {
                let rest = &key[prefix.len()..];
                (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_string())
            })
            .collect();
        Ok(names)
    }

    /// Remove a node. Directories are removed recursively; a terminal
    /// symlink is removed itself, not its target.
    pub fn remove(&mut self, path: &str) -> Result<(), VfsError> {
        let resolved = self.resolve(path, false)?;
        if resolved == "/" {
            return Err(VfsError::RemoveRoot);
        }
        match self.nodes.remove(&resolved) {
            None => Err(VfsError::NotFound(path.to_string())),
            Some(Node::Directory) => {
                let prefix = format!("{resolved}/");
                self.nodes.retain(|key, _| !key.starts_with(&prefix));
                Ok(())
            }
            Some(_) => Ok(()),
        }
    }

    /// Serialize every node except the root, in stable (path) order.
    pub fn to_snapshot(&self) -> VfsSnapshot {
        let files = self
            .nodes
            .iter()
            .filter(|(path, _)| path.as_str() != "/")
            .map(|(path, node)| match node {
                Node::Directory => FileEntry::directory(path.clone()),
                Node::File(contents) => FileEntry::file(path.clone(), contents),
                Node::Symlink(target) => FileEntry::symlink(path.clone(), target.clone()),
            })
            .collect();
        VfsSnapshot { files }
    }

    /// Build a fresh filesystem from a snapshot.
    pub fn from_snapshot(snapshot: &VfsSnapshot) -> Result<Self, VfsError> {
        let mut vfs = Self::new();
        vfs.apply_snapshot(snapshot)?;
        Ok(vfs)
    }

    /// Apply snapshot entries onto this filesystem.
    ///
    /// Entries are applied parents-first (sorted by path depth, ties broken
    /// by snapshot order) and missing parent directories are synthesized, so
    /// a snapshot that omits intermediate directory entries still restores.
    /// Existing nodes at the same paths are overwritten.
    pub fn apply_snapshot(&mut self, snapshot: &VfsSnapshot) -> Result<(), VfsError> {
        let mut ordered: Vec<(usize, &FileEntry)> = snapshot.files.iter().enumerate().collect();
        ordered.sort_by_key(|(index, entry)| (path::depth(entry.path()), *index));

        for (_, entry) in ordered {
            let resolved = path::normalize(entry.path())?;
            if resolved == "/" {
                continue;
            }
            match entry {
                FileEntry::Directory { .. } => self.ensure_dir(&resolved)?,
                FileEntry::File { .. } => {
                    let contents = entry.decoded_content()?;
                    self.ensure_dir(path::parent(&resolved))?;
                    self.nodes.insert(resolved, Node::File(contents));
                }
                FileEntry::Symlink { target, .. } => {
                    self.ensure_dir(path::parent(&resolved))?;
                    self.nodes.insert(resolved, Node::Symlink(target.clone()));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_synthesizes_parents() {
        let mut vfs = Vfs::new();
        vfs.write_file("/project/src/index.js", b"export {}".to_vec())
            .unwrap();
        assert!(vfs.stat("/project").unwrap().is_dir());
        assert!(vfs.stat("/project/src").unwrap().is_dir());
        assert_eq!(vfs.read_file("/project/src/index.js").unwrap(), b"export {}");
    }

    #[test]
    fn mkdir_requires_parent() {
        let mut vfs = Vfs::new();
        assert!(matches!(vfs.mkdir("/a/b"), Err(VfsError::NotFound(_))));
        vfs.mkdir("/a").unwrap();
        vfs.mkdir("/a/b").unwrap();
        assert!(matches!(vfs.mkdir("/a/b"), Err(VfsError::AlreadyExists(_))));
    }

    #[test]
    fn write_over_directory_fails() {
        let mut vfs = Vfs::new();
        vfs.mkdir_all("/a/b").unwrap();
        assert!(matches!(
            vfs.write_file("/a/b", b"".to_vec()),
            Err(VfsError::IsADirectory(_))
        ));
    }

    #[test]
    fn stat_follows_symlinks_lstat_does_not() {
        let mut vfs = Vfs::new();
        vfs.write_file("/project/target.txt", b"hello".to_vec()).unwrap();
        vfs.symlink("/project/target.txt", "/project/link.txt").unwrap();

        assert!(vfs.stat("/project/link.txt").unwrap().is_file());
        assert!(vfs.lstat("/project/link.txt").unwrap().is_symlink());
        assert_eq!(vfs.read_file("/project/link.txt").unwrap(), b"hello");
        assert_eq!(vfs.read_link("/project/link.txt").unwrap(), "/project/target.txt");
    }

    #[test]
    fn relative_symlink_resolves_against_parent() {
        let mut vfs = Vfs::new();
        vfs.write_file("/a/data.txt", b"data".to_vec()).unwrap();
        vfs.symlink("../a/data.txt", "/b/link.txt").unwrap();
        assert_eq!(vfs.read_file("/b/link.txt").unwrap(), b"data");
    }

    #[test]
    fn symlink_through_directory_link() {
        let mut vfs = Vfs::new();
        vfs.write_file("/real/file.txt", b"contents".to_vec()).unwrap();
        vfs.symlink("/real", "/alias").unwrap();
        assert_eq!(vfs.read_file("/alias/file.txt").unwrap(), b"contents");
    }

    #[test]
    fn symlink_cycle_is_detected() {
        let mut vfs = Vfs::new();
        vfs.symlink("/b", "/a").unwrap();
        vfs.symlink("/a", "/b").unwrap();
        assert!(matches!(
            vfs.read_file("/a"),
            Err(VfsError::TooManyLinks(_))
        ));
    }

    #[test]
    fn dangling_symlink_lstats_but_does_not_read() {
        let mut vfs = Vfs::new();
        vfs.symlink("/nowhere", "/link").unwrap();
        assert!(vfs.lstat("/link").unwrap().is_symlink());
        assert!(!vfs.exists("/link"));
        assert!(matches!(vfs.read_file("/link"), Err(VfsError::NotFound(_))));
    }

    #[test]
    fn read_dir_lists_immediate_children_sorted() {
        let mut vfs = Vfs::new();
        vfs.write_file("/p/b.txt", b"".to_vec()).unwrap();
        vfs.write_file("/p/a.txt", b"".to_vec()).unwrap();
        vfs.mkdir_all("/p/nested/deep").unwrap();
        assert_eq!(vfs.read_dir("/p").unwrap(), vec!["a.txt", "b.txt", "nested"]);
        assert_eq!(vfs.read_dir("/").unwrap(), vec!["p"]);
    }

    #[test]
    fn remove_is_recursive_for_directories() {
        let mut vfs = Vfs::new();
        vfs.write_file("/p/a/b.txt", b"".to_vec()).unwrap();
        vfs.write_file("/p/c.txt", b"".to_vec()).unwrap();
        vfs.remove("/p/a").unwrap();
        assert!(!vfs.exists("/p/a/b.txt"));
        assert!(vfs.exists("/p/c.txt"));
        assert!(matches!(vfs.remove("/"), Err(VfsError::RemoveRoot)));
    }

    #[test]
    fn remove_symlink_keeps_target() {
        let mut vfs = Vfs::new();
        vfs.write_file("/t.txt", b"x".to_vec()).unwrap();
        vfs.symlink("/t.txt", "/l.txt").unwrap();
        vfs.remove("/l.txt").unwrap();
        assert!(vfs.exists("/t.txt"));
        assert!(!vfs.exists("/l.txt"));
    }

    #[test]
    fn paths_are_normalized() {
        let mut vfs = Vfs::new();
        vfs.write_file("/a//b/./c.txt", b"x".to_vec()).unwrap();
        assert_eq!(vfs.read_file("/a/b/c.txt").unwrap(), b"x");
        assert!(vfs.exists("/a/b/../b/c.txt"));
    }
}

//! Extraction of gzipped POSIX tarballs into the virtual filesystem.

use std::io::Read;

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};
use thiserror::Error;
use tracing::debug;

use sprout_types::Reporter;
use sprout_vfs::{Vfs, VfsError};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read archive: {0}")]
    Archive(#[from] std::io::Error),
    #[error(transparent)]
    Vfs(#[from] VfsError),
}

pub struct ExtractOptions<'a> {
    /// Number of leading path components to strip from every entry.
    /// GitHub codeload tarballs wrap the tree in a `{repo}-{ref}/` prefix,
    /// so imports use `1`.
    pub strip_components: usize,
    pub reporter: Option<&'a dyn Reporter>,
}

impl Default for ExtractOptions<'_> {
    fn default() -> Self {
        Self {
            strip_components: 1,
            reporter: None,
        }
    }
}

/// Extract a gzipped tarball into the VFS under `dest_path`.
///
/// Handles regular files, directories, and symlinks; other entry kinds
/// (hard links, devices, PAX headers) are skipped. An entry whose stripped
/// path still contains `..` is skipped rather than written — extraction
/// never escapes `dest_path` and never fails over a hostile entry name.
///
/// Returns the absolute paths of the regular files written, in archive
/// order.
pub fn extract(
    archive: &[u8],
    vfs: &mut Vfs,
    dest_path: &str,
    options: &ExtractOptions<'_>,
) -> Result<Vec<String>, ExtractError> {
    let mut tar = Archive::new(GzDecoder::new(archive));
    let mut written = Vec::new();

    vfs.mkdir_all(dest_path)?;
    for entry in tar.entries()? {
        let mut entry = entry?;
        let raw_path = entry.path()?.to_string_lossy().into_owned();
        let Some(relative) = strip_components(&raw_path, options.strip_components) else {
            continue;
        };
        if is_escaping(&relative) {
            debug!("Skipping tar entry with unsafe path: {raw_path}");
            if let Some(reporter) = options.reporter {
                reporter.on_progress(&format!("Skipping unsafe archive path: {raw_path}"));
            }
            continue;
        }
        let dest = join(dest_path, &relative);

        match entry.header().entry_type() {
            EntryType::Directory => vfs.mkdir_all(&dest)?,
            EntryType::Regular => {
                let mut contents = Vec::with_capacity(entry.size() as usize);
                entry.read_to_end(&mut contents)?;
                vfs.write_file(&dest, contents)?;
                written.push(dest);
            }
            EntryType::Symlink => {
                let Some(target) = entry.link_name()? else {
                    continue;
                };
                let target = target.to_string_lossy().into_owned();
                if vfs.lstat(&dest).is_ok() {
                    vfs.remove(&dest)?;
                }
                vfs.symlink(&target, &dest)?;
            }
            _ => {}
        }
    }
    Ok(written)
}

/// Drop the first `count` components; `None` when nothing remains.
fn strip_components(path: &str, count: usize) -> Option<String> {
    let segments: Vec<&str> = path.split('/').filter(|segment| !segment.is_empty()).collect();
    if segments.len() <= count {
        return None;
    }
    Some(segments[count..].join("/"))
}

/// Whether a stripped relative path would climb out of the destination.
fn is_escaping(relative: &str) -> bool {
    relative.split('/').any(|segment| segment == "..")
}

fn join(dest: &str, relative: &str) -> String {
    if dest == "/" {
        format!("/{relative}")
    } else {
        format!("{dest}/{relative}")
    }
}

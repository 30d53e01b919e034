//! The on-wire cache record: gzipped JSON of the bootstrap result plus the
//! VFS snapshot.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use tracing::debug;

use sprout_repo_url::RepoIdentity;
use sprout_types::InstallResult;
use sprout_vfs::VfsSnapshot;

use crate::key::CACHE_VERSION;

/// The serializable core of a bootstrap result. The coordinator's richer
/// result type converts to and from this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotResult {
    pub repo: RepoIdentity,
    pub root_path: String,
    pub project_path: String,
    pub extracted_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_result: Option<InstallResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformed_project_files: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SnapshotRecord {
    pub(crate) version: u32,
    /// Epoch milliseconds at write time; drives TTL checks.
    pub(crate) stored_at: i64,
    pub(crate) result: SnapshotResult,
    pub(crate) snapshot: VfsSnapshot,
}

pub(crate) fn encode(record: &SnapshotRecord) -> Result<Vec<u8>, std::io::Error> {
    let json = serde_json::to_vec(record)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    encoder.finish()
}

/// Decode and validate a cache record. Any deviation — bad gzip, bad JSON,
/// a version mismatch, empty paths — is a silent miss, never an error.
pub(crate) fn decode(bytes: &[u8]) -> Option<SnapshotRecord> {
    let mut json = Vec::new();
    if let Err(err) = GzDecoder::new(bytes).read_to_end(&mut json) {
        debug!("Discarding snapshot record with invalid gzip framing: {err}");
        return None;
    }
    let record: SnapshotRecord = match serde_json::from_slice(&json) {
        Ok(record) => record,
        Err(err) => {
            debug!("Discarding unparsable snapshot record: {err}");
            return None;
        }
    };
    if record.version != CACHE_VERSION {
        debug!(
            "Discarding snapshot record with version {} (expected {CACHE_VERSION})",
            record.version
        );
        return None;
    }
    if record.result.root_path.is_empty()
        || record.result.project_path.is_empty()
        || record.result.repo.owner.is_empty()
        || record.result.repo.repo.is_empty()
    {
        debug!("Discarding snapshot record with missing identity fields");
        return None;
    }
    Some(record)
}

#[cfg(test)]
mod tests {
    use sprout_vfs::Vfs;

    use super::*;

    fn sample_record() -> SnapshotRecord {
        let mut vfs = Vfs::new();
        vfs.write_file("/project/package.json", b"{}".to_vec()).unwrap();
        SnapshotRecord {
            version: CACHE_VERSION,
            stored_at: 1_700_000_000_000,
            result: SnapshotResult {
                repo: RepoIdentity::parse("acme/demo").unwrap(),
                root_path: "/project".to_string(),
                project_path: "/project".to_string(),
                extracted_files: vec!["/project/package.json".to_string()],
                install_result: None,
                transformed_project_files: Some(0),
            },
            snapshot: vfs.to_snapshot(),
        }
    }

    #[test]
    fn round_trips_through_gzip() {
        let record = sample_record();
        let encoded = encode(&record).unwrap();
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.stored_at, record.stored_at);
        assert_eq!(decoded.result, record.result);
        assert_eq!(decoded.snapshot, record.snapshot);
    }

    #[test]
    fn garbage_bytes_are_a_miss() {
        assert!(decode(b"not gzip at all").is_none());
        assert!(decode(&[]).is_none());
    }

    #[test]
    fn version_mismatch_is_a_miss() {
        let mut record = sample_record();
        record.version = 2;
        let encoded = encode(&record).unwrap();
        assert!(decode(&encoded).is_none());
    }

    #[test]
    fn gzipped_non_record_json_is_a_miss() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(br#"{"version":1,"storedAt":"wrong"}"#).unwrap();
        let bytes = encoder.finish().unwrap();
        assert!(decode(&bytes).is_none());
    }
}

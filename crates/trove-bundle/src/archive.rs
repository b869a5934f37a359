use std::path::Path;

use crate::error::{BundleError, BundleResult};
use crate::format::{ManifestEntry, HEADER_LEN, MAGIC, VERSION};

/// A validated bundle held in memory.
#[derive(Debug)]
pub struct BundleArchive {
    manifest: Vec<ManifestEntry>,
    data: Vec<u8>,
    payload_start: usize,
}

impl BundleArchive {
    pub fn open(path: &Path) -> BundleResult<Self> {
        let data = std::fs::read(path)?;
        Self::from_bytes(data)
    }

    pub fn from_bytes(data: Vec<u8>) -> BundleResult<Self> {
        if data.len() < HEADER_LEN {
            return Err(BundleError::Malformed("bundle shorter than header".into()));
        }
        if &data[0..4] != MAGIC {
            return Err(BundleError::InvalidMagic {
                actual: String::from_utf8_lossy(&data[0..4]).into(),
            });
        }
        let version = read_u32(&data[4..8]);
        if version != VERSION {
            return Err(BundleError::UnsupportedVersion(version));
        }
        let manifest_len = read_u32(&data[8..12]) as usize;
        let payload_start = HEADER_LEN
            .checked_add(manifest_len)
            .filter(|end| *end <= data.len())
            .ok_or_else(|| BundleError::Malformed("manifest extends beyond bundle".into()))?;

        let manifest: Vec<ManifestEntry> = bincode::deserialize(&data[HEADER_LEN..payload_start])
            .map_err(|e| BundleError::Malformed(format!("manifest: {e}")))?;

        let payload_len = (data.len() - payload_start) as u64;
        for entry in &manifest {
            let in_bounds = entry
                .offset
                .checked_add(entry.len)
                .is_some_and(|end| end <= payload_len);
            if !in_bounds {
                return Err(BundleError::Malformed(format!(
                    "entry {} extends beyond payload",
                    entry.name
                )));
            }
        }

        Ok(Self {
            manifest,
            data,
            payload_start,
        })
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.manifest
    }

    pub fn names(&self) -> Vec<&str> {
        self.manifest.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.manifest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifest.is_empty()
    }

    /// Extract the entry called `name`, or the first entry when `name` is
    /// `None`. Returns the entry name with its decoded bytes.
    pub fn extract(&self, name: Option<&str>) -> BundleResult<(String, Vec<u8>)> {
        let entry = match name {
            Some(name) => self
                .manifest
                .iter()
                .find(|e| e.name == name)
                .ok_or_else(|| BundleError::AssetNotFound(name.to_string()))?,
            None => self.manifest.first().ok_or(BundleError::Empty)?,
        };

        let start = self.payload_start + entry.offset as usize;
        let stored = &self.data[start..start + entry.len as usize];
        if crc32fast::hash(stored) != entry.crc32 {
            return Err(BundleError::CrcMismatch {
                name: entry.name.clone(),
            });
        }

        let bytes = if entry.compressed {
            zstd::decode_all(stored).map_err(|e| BundleError::Compression(e.to_string()))?
        } else {
            stored.to_vec()
        };
        if bytes.len() as u64 != entry.raw_len {
            return Err(BundleError::Malformed(format!(
                "entry {}: expected {} bytes, got {}",
                entry.name,
                entry.raw_len,
                bytes.len()
            )));
        }
        Ok((entry.name.clone(), bytes))
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_be_bytes(buf)
}

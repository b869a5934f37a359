use std::path::{Path, PathBuf};

use crate::error::{BundleError, BundleResult};
use crate::format::{ManifestEntry, HEADER_LEN, MAGIC, VERSION};

const ZSTD_LEVEL: i32 = 3;

/// Result of writing a bundle file.
#[derive(Clone, Debug)]
pub struct BundleSummary {
    pub path: PathBuf,
    pub entries: usize,
    pub bytes: u64,
}

struct PendingAsset {
    name: String,
    data: Vec<u8>,
    compress: bool,
}

/// Builds a bundle from named assets. Entry order is preserved; the first
/// entry is what an unnamed load extracts.
#[derive(Default)]
pub struct BundleWriter {
    assets: Vec<PendingAsset>,
}

impl BundleWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a zstd-compressed asset.
    pub fn add(&mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> &mut Self {
        self.push(name.into(), data.into(), true)
    }

    /// Add an asset stored as-is.
    pub fn add_stored(&mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> &mut Self {
        self.push(name.into(), data.into(), false)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn finish_to_bytes(&self) -> BundleResult<Vec<u8>> {
        let mut manifest = Vec::with_capacity(self.assets.len());
        let mut payload = Vec::new();

        for asset in &self.assets {
            let stored = if asset.compress {
                zstd::encode_all(asset.data.as_slice(), ZSTD_LEVEL)
                    .map_err(|e| BundleError::Compression(e.to_string()))?
            } else {
                asset.data.clone()
            };
            manifest.push(ManifestEntry {
                name: asset.name.clone(),
                offset: payload.len() as u64,
                len: stored.len() as u64,
                raw_len: asset.data.len() as u64,
                compressed: asset.compress,
                crc32: crc32fast::hash(&stored),
            });
            payload.extend_from_slice(&stored);
        }

        let manifest_bytes =
            bincode::serialize(&manifest).map_err(|e| BundleError::Malformed(e.to_string()))?;
        let manifest_len = u32::try_from(manifest_bytes.len())
            .map_err(|_| BundleError::Malformed("manifest too large".into()))?;

        let mut out = Vec::with_capacity(HEADER_LEN + manifest_bytes.len() + payload.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_be_bytes());
        out.extend_from_slice(&manifest_len.to_be_bytes());
        out.extend_from_slice(&manifest_bytes);
        out.extend_from_slice(&payload);
        Ok(out)
    }

    /// Write the bundle to `path`, creating parent directories.
    pub fn write_to(&self, path: &Path) -> BundleResult<BundleSummary> {
        let bytes = self.finish_to_bytes()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, &bytes)?;
        Ok(BundleSummary {
            path: path.to_path_buf(),
            entries: self.assets.len(),
            bytes: bytes.len() as u64,
        })
    }

    fn push(&mut self, name: String, data: Vec<u8>, compress: bool) -> &mut Self {
        self.assets.push(PendingAsset {
            name,
            data,
            compress,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        let mut w = BundleWriter::new();
        w.add("a", b"alpha".to_vec());
        let bytes = w.finish_to_bytes().unwrap();
        assert_eq!(&bytes[0..4], b"TRBN");
        assert_eq!(u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), 1);
    }

    #[test]
    fn write_to_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("AssetBundles").join("x_ios.bundle");
        let mut w = BundleWriter::new();
        w.add("a", b"1".to_vec()).add_stored("b", b"2".to_vec());
        let summary = w.write_to(&path).unwrap();
        assert_eq!(summary.entries, 2);
        assert_eq!(summary.bytes, std::fs::metadata(&path).unwrap().len());
    }
}

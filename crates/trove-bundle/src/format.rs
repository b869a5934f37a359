use serde::{Deserialize, Serialize};

pub const MAGIC: &[u8; 4] = b"TRBN";
pub const VERSION: u32 = 1;
/// Magic, version and manifest length.
pub const HEADER_LEN: usize = 12;

/// One asset in a bundle. `offset` is relative to the start of the payload
/// region; `len` and `crc32` describe the stored (possibly compressed) bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    pub offset: u64,
    pub len: u64,
    pub raw_len: u64,
    pub compressed: bool,
    pub crc32: u32,
}

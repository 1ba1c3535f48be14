// src/version/mod.rs

//! Distribution version probing
//!
//! A distribution's version string drives switch-descriptor selection. It
//! is read from the `VS_FIXEDFILEINFO` records embedded in the
//! distribution's executable resources.

use std::fs;
use std::path::Path;
use tracing::debug;

/// `VS_FIXEDFILEINFO.dwSignature` as it appears on disk
const FIXED_FILE_INFO_SIGNATURE: [u8; 4] = [0xBD, 0x04, 0xEF, 0xFE];

/// Size of a `VS_FIXEDFILEINFO` record
const FIXED_FILE_INFO_LEN: usize = 52;

const VOS_DOS: u32 = 0x0001_0000;
const VOS_NT: u32 = 0x0004_0000;
const VOS_WINDOWS32: u32 = 0x0000_0004;
const VOS_DOS_WINDOWS16: u32 = 0x0001_0001;
const VOS_DOS_WINDOWS32: u32 = 0x0001_0004;
const VOS_NT_WINDOWS32: u32 = 0x0004_0004;

/// Target OS values of records worth considering
const ACCEPTED_OS: [u32; 6] = [
    VOS_DOS,
    VOS_NT,
    VOS_WINDOWS32,
    VOS_DOS_WINDOWS16,
    VOS_DOS_WINDOWS32,
    VOS_NT_WINDOWS32,
];

/// Tool version string, e.g. `wapkg 0.5.0`
pub fn tool_version() -> String {
    format!("wapkg {}", env!("CARGO_PKG_VERSION"))
}

/// Extracts an application version string from a binary
pub trait VersionProber: Send + Sync {
    /// `None` when the file is missing or carries no usable version
    fn probe(&self, path: &Path) -> Option<String>;
}

/// Reads the file version from PE version resources
#[derive(Debug, Default, Clone, Copy)]
pub struct PeVersionProber;

impl VersionProber for PeVersionProber {
    fn probe(&self, path: &Path) -> Option<String> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) => {
                debug!("Cannot probe {}: {}", path.display(), e);
                return None;
            }
        };
        let version = file_version(&data);
        debug!("Probed {}: {:?}", path.display(), version);
        version
    }
}

/// Highest file version among the acceptable fixed-info records, as `a.b.c.d`
pub fn file_version(data: &[u8]) -> Option<String> {
    data.windows(FIXED_FILE_INFO_SIGNATURE.len())
        .enumerate()
        .filter(|(_, window)| *window == FIXED_FILE_INFO_SIGNATURE)
        .filter_map(|(offset, _)| data.get(offset..offset + FIXED_FILE_INFO_LEN))
        .filter(|record| ACCEPTED_OS.contains(&read_u32(record, 32)))
        .map(|record| (read_u32(record, 8), read_u32(record, 12)))
        .max()
        .map(|(ms, ls)| format!("{}.{}.{}.{}", ms >> 16, ms & 0xFFFF, ls >> 16, ls & 0xFFFF))
}

fn read_u32(record: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&record[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

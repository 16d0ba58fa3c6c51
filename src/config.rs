//! Explicit configuration for `Archive::open`, replacing the source's
//! implicit global allocator and compiled-in AES password with ordinary
//! parameters that default to the old behavior.

use crate::crypto::DEFAULT_AES_PASSWORD;

/// Options controlling how an archive is opened and scanned.
///
/// `OpenOptions::default()` reproduces the source's historical
/// behavior: the compiled-in AES password, and the same recovery
/// scan bounds used for ZIP64 End Of Central Directory recovery.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Password used to derive WinZip AES keys. Unlike classic crypto's
    /// per-lookup `$password` suffix, this is archive-wide.
    pub aes_password: Vec<u8>,
    /// Bound on the brute-force backward scan for a Zip64 End Of Central
    /// Directory record when the locator's recorded offset doesn't pan
    /// out (see §4.C4).
    pub max_prefix_scan: u64,
    /// Bound on the backward scan for the End Of Central Directory
    /// record itself (max comment length + fixed record size).
    pub max_comment_scan: u64,
}

impl Default for OpenOptions {
    fn default() -> Self {
        OpenOptions {
            aes_password: DEFAULT_AES_PASSWORD.to_vec(),
            max_prefix_scan: 256 * 1024,
            max_comment_scan: 65_557,
        }
    }
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn aes_password(mut self, password: impl Into<Vec<u8>>) -> Self {
        self.aes_password = password.into();
        self
    }
}

//! Content keys for cached payloads.
//!
//! A source location (path or URL) is hashed into a short base-36 token that
//! serves both as the memory cache key and as the file name inside the disk
//! cache directory.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

const RADIX: u32 = 36;
const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Derive the content key for a source location.
///
/// The first 128 bits of the SHA-256 digest are read as a signed big-endian
/// integer and its magnitude is rendered in base 36.
pub fn generate(location: &str) -> String {
    let digest = Sha256::digest(location.as_bytes());
    let mut head = [0u8; 16];
    head.copy_from_slice(&digest[..16]);
    to_radix(i128::from_be_bytes(head).unsigned_abs())
}

/// Disk cache file for a source location inside `cache_dir`.
pub fn cache_path(cache_dir: &Path, location: &str) -> PathBuf {
    cache_dir.join(generate(location))
}

fn to_radix(mut value: u128) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::with_capacity(25);
    while value > 0 {
        out.push(DIGITS[(value % u128::from(RADIX)) as usize]);
        value /= u128::from(RADIX);
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

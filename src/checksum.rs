use std::fs::File;
use std::io::Read;
use std::path::Path;

use md5::{Digest, Md5};

use crate::error::OrganizeError;

const STREAM_CHUNK_SIZE: usize = 512 * 1024;

pub fn md5_stream<R: Read>(mut reader: R) -> std::io::Result<String> {
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:032x}", hasher.finalize()))
}

/// Lowercase hex MD5 of a file's contents.
pub fn compute_md5(path: &Path) -> Result<String, OrganizeError> {
    let file = File::open(path).map_err(|e| OrganizeError::read(path, e))?;
    md5_stream(file).map_err(|e| OrganizeError::read(path, e))
}

/// True when `value` looks like an MD5 digest (32 hex digits, any case).
pub fn is_md5_hex(value: &str) -> bool {
    value.len() == 32 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

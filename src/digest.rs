use std::fs::File;
use std::path::Path;

use anyhow::Result;
use faster_hex::hex_string;
use md5::Md5;
use sha2::{Digest, Sha256};

/// Calculate the SHA-256 checksum of the file at `path`
pub fn sha256sum<P: AsRef<Path>>(path: P) -> Result<String> {
    let mut f = File::open(path.as_ref())?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut f, &mut hasher)?;

    Ok(hex_string(&hasher.finalize()))
}

/// Calculate the MD5 checksum of the file at `path`
pub fn md5sum<P: AsRef<Path>>(path: P) -> Result<String> {
    let mut f = File::open(path.as_ref())?;
    let mut hasher = Md5::new();
    std::io::copy(&mut f, &mut hasher)?;

    Ok(hex_string(&hasher.finalize()))
}

#[test]
fn test_digests() {
    use std::io::Write;

    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(b"hello world\n").unwrap();
    f.flush().unwrap();

    assert_eq!(
        sha256sum(f.path()).unwrap(),
        "a948904f2f0f479b8f8197694b30184b0d2ed1c1cd2a1ec0fb85d299a192a447"
    );
    assert_eq!(md5sum(f.path()).unwrap(), "6f5902ac237024bdd0c176cb93063dc4");
}

use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tar::Archive as TarArchive;
use walkdir::WalkDir;

use crate::cache::PkgMeta;
use crate::compress::Decompressor;
use crate::parser;

#[inline]
fn is_package(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.contains(".pkg.tar") && !lower.ends_with(".sig")
}

/// Collect all candidate package files directly under the repo root.
/// Sorted so repeated scans feed the reconciler in a stable order.
pub fn find_all_packages(root: &Path) -> Result<Vec<String>> {
    let mut files = Vec::with_capacity(64);
    for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if is_package(&name) {
            files.push(name.to_string());
        }
    }
    files.sort();

    Ok(files)
}

/// Read the metadata record out of a package archive and attach the
/// surrounding facts: file size and any detached signature sibling.
pub fn load_package(root: &Path, filename: &str) -> Result<PkgMeta> {
    let path = root.join(filename);
    let stat = path.metadata()?;
    let f = File::open(&path)?;
    let reader = Decompressor::from_file_name(filename, f)?;
    let raw = collect_pkginfo(reader)
        .with_context(|| format!("failed to read metadata from {}", filename))?;

    let mut meta = parse_pkginfo(&raw)?;
    meta.filename = filename.to_string();
    meta.size = stat.len();
    meta.base64_sig = read_signature(root, filename)?;

    Ok(meta)
}

/// Pull the `.PKGINFO` entry out of the package archive.
fn collect_pkginfo<R: Read>(reader: R) -> Result<Vec<u8>> {
    let mut tar = TarArchive::new(reader);
    for entry in tar.entries()? {
        let mut entry = entry?;
        let path = entry.path_bytes();
        let name = path.strip_prefix(b"./").unwrap_or(&path);
        if name == &b".PKGINFO"[..] {
            let mut buf = Vec::with_capacity(1024);
            entry.read_to_end(&mut buf)?;
            return Ok(buf);
        }
    }

    Err(anyhow!("package has no .PKGINFO entry"))
}

fn parse_pkginfo(raw: &[u8]) -> Result<PkgMeta> {
    let text = std::str::from_utf8(raw).context(".PKGINFO is not valid UTF-8")?;
    let (_, entries) =
        parser::pkginfo_entries(text).map_err(|e| anyhow!("malformed .PKGINFO: {}", e))?;

    let mut meta = PkgMeta::default();
    for (key, value) in entries {
        let value = value.trim_end();
        match key {
            "pkgname" => meta.name = value.to_string(),
            "pkgver" => meta.version = value.to_string(),
            "pkgdesc" => meta.desc = Some(value.to_string()),
            "url" => meta.url = Some(value.to_string()),
            "packager" => meta.packager = Some(value.to_string()),
            "arch" => meta.arch = Some(value.to_string()),
            "size" => meta.isize = value.parse().unwrap_or(0),
            "builddate" => meta.builddate = value.parse().unwrap_or(0),
            "license" => meta.license.push(value.to_string()),
            "depend" => meta.depends.push(value.to_string()),
            "conflict" => meta.conflicts.push(value.to_string()),
            "provides" => meta.provides.push(value.to_string()),
            "optdepend" => meta.optdepends.push(value.to_string()),
            "makedepend" => meta.makedepends.push(value.to_string()),
            _ => {}
        }
    }

    if meta.name.is_empty() || meta.version.is_empty() {
        bail!(".PKGINFO is missing pkgname or pkgver");
    }

    Ok(meta)
}

/// Pick up `<filename>.sig` as base64, if the sibling exists.
pub fn read_signature(root: &Path, filename: &str) -> Result<Option<String>> {
    let sig_path = root.join(format!("{}.sig", filename));
    if !sig_path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read(&sig_path)?;

    Ok(Some(BASE64.encode(raw)))
}

/// List the paths contained in a package archive, skipping the
/// top-level metadata entries (.PKGINFO, .MTREE, .INSTALL, ...).
pub fn package_files(root: &Path, filename: &str) -> Result<Vec<String>> {
    let f = File::open(root.join(filename))?;
    let reader = Decompressor::from_file_name(filename, f)?;
    let mut tar = TarArchive::new(reader);

    let mut files = Vec::with_capacity(100);
    for entry in tar.entries()? {
        let entry = entry?;
        // raw bytes keep the trailing slash on directory entries
        let path = entry.path_bytes();
        let raw = String::from_utf8_lossy(&path);
        let name = raw.strip_prefix("./").unwrap_or(&raw);
        if name.is_empty() || name.starts_with('.') {
            continue;
        }
        files.push(name.to_string());
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::make_package;

    #[test]
    fn test_scan_filters_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        make_package(root, "zsync", "0.6.2-1", &[]);
        make_package(root, "acl", "2.3.1-1", &[]);
        std::fs::write(root.join("acl-2.3.1-1-x86_64.pkg.tar.gz.sig"), b"sig").unwrap();
        std::fs::write(root.join("README"), b"not a package").unwrap();
        std::fs::write(root.join("stray.tar.gz"), b"not a package").unwrap();

        let found = find_all_packages(root).unwrap();
        assert_eq!(
            found,
            vec![
                "acl-2.3.1-1-x86_64.pkg.tar.gz",
                "zsync-0.6.2-1-x86_64.pkg.tar.gz"
            ]
        );
    }

    #[test]
    fn test_load_package() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let filename = make_package(root, "zsync", "0.6.2-1", &["usr/bin/zsync"]);

        let meta = load_package(root, &filename).unwrap();
        assert_eq!(meta.name, "zsync");
        assert_eq!(meta.version, "0.6.2-1");
        assert_eq!(meta.filename, filename);
        assert_eq!(meta.arch.as_deref(), Some("x86_64"));
        assert_eq!(meta.depends, vec!["glibc"]);
        assert!(meta.size > 0);
        assert!(meta.base64_sig.is_none());

        std::fs::write(root.join(format!("{}.sig", filename)), b"\x88\x02sig").unwrap();
        let meta = load_package(root, &filename).unwrap();
        assert_eq!(meta.base64_sig.as_deref(), Some("iAJzaWc="));
    }

    #[test]
    fn test_load_package_rejects_incomplete_metadata() {
        use crate::testutil::make_package_raw;

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let filename = make_package_raw(root, "broken", "1.0-1", "pkgname = broken\n", &[]);

        assert!(load_package(root, &filename).is_err());
    }

    #[test]
    fn test_package_files_skips_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let filename = make_package(root, "zsync", "0.6.2-1", &["usr/", "usr/bin/zsync"]);

        let files = package_files(root, &filename).unwrap();
        assert_eq!(files, vec!["usr/", "usr/bin/zsync"]);
    }
}

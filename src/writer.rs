//! Index compiler: serializes the cache into a compressed archive and
//! publishes the stable symlink.

use std::fmt::Display;
use std::fs::OpenOptions;
use std::os::unix::fs::{symlink, OpenOptionsExt};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use tar::{Builder, EntryType, Header};

use crate::cache::{PkgCache, PkgMeta};
use crate::compress::{Compression, Compressor};
use crate::digest;
use crate::scan;

/// Which component files an archive carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// `desc` + `depends`
    Db,
    /// `files`
    Files,
}

/// Serialize the cache into `root/<archive>` and publish
/// `root/<link> -> <archive>`. Checksums and file lists missing from
/// the metadata are computed from the package files and cached.
pub fn compile_index(
    root: &Path,
    archive: &str,
    link: &str,
    compression: Compression,
    cache: &mut PkgCache,
    kind: IndexKind,
) -> Result<()> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o644)
        .open(root.join(archive))
        .with_context(|| format!("failed to open {} for writing", archive))?;

    let mut builder = Builder::new(Compressor::new(file, compression));
    let mtime = index_timestamp();

    for pkg in cache.iter_mut() {
        write_package(&mut builder, root, pkg, kind, mtime)
            .with_context(|| format!("failed to write index entry for {}", pkg.name))?;
    }

    // finish the tar, then the compressor trailer, then reach the disk
    let compressor = builder.into_inner()?;
    let file = compressor.finish()?;
    file.sync_all()?;

    publish_link(root, link, archive)?;

    Ok(())
}

fn write_package(
    builder: &mut Builder<Compressor>,
    root: &Path,
    pkg: &mut PkgMeta,
    kind: IndexKind,
    mtime: u64,
) -> Result<()> {
    let dir = format!("{}-{}", pkg.name, pkg.version);

    match kind {
        IndexKind::Db => {
            let desc = desc_body(root, pkg)?;
            append_entry(builder, &format!("{}/desc", dir), desc.as_bytes(), mtime)?;
            let depends = depends_body(pkg);
            append_entry(builder, &format!("{}/depends", dir), depends.as_bytes(), mtime)?;
        }
        IndexKind::Files => {
            let files = files_body(root, pkg)?;
            append_entry(builder, &format!("{}/files", dir), files.as_bytes(), mtime)?;
        }
    }

    Ok(())
}

fn append_entry(
    builder: &mut Builder<Compressor>,
    path: &str,
    body: &[u8],
    mtime: u64,
) -> Result<()> {
    let mut header = Header::new_ustar();
    header.set_entry_type(EntryType::Regular);
    header.set_size(body.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(mtime);
    builder.append_data(&mut header, path, body)?;

    Ok(())
}

fn desc_body(root: &Path, pkg: &mut PkgMeta) -> Result<String> {
    let pkgpath = root.join(&pkg.filename);
    if pkg.md5sum.is_none() {
        pkg.md5sum = Some(digest::md5sum(&pkgpath)?);
    }
    if pkg.sha256sum.is_none() {
        pkg.sha256sum = Some(digest::sha256sum(&pkgpath)?);
    }

    let mut buf = String::with_capacity(1024);
    write_scalar(&mut buf, "FILENAME", &pkg.filename);
    write_scalar(&mut buf, "NAME", &pkg.name);
    write_scalar(&mut buf, "VERSION", &pkg.version);
    if let Some(ref desc) = pkg.desc {
        write_scalar(&mut buf, "DESC", desc);
    }
    write_num(&mut buf, "CSIZE", pkg.size);
    write_num(&mut buf, "ISIZE", pkg.isize);
    write_scalar(&mut buf, "MD5SUM", pkg.md5sum.as_deref().unwrap_or_default());
    write_scalar(
        &mut buf,
        "SHA256SUM",
        pkg.sha256sum.as_deref().unwrap_or_default(),
    );
    if let Some(ref sig) = pkg.base64_sig {
        write_scalar(&mut buf, "PGPSIG", sig);
    }
    if let Some(ref url) = pkg.url {
        write_scalar(&mut buf, "URL", url);
    }
    write_list(&mut buf, "LICENSE", &pkg.license);
    if let Some(ref arch) = pkg.arch {
        write_scalar(&mut buf, "ARCH", arch);
    }
    write_num(&mut buf, "BUILDDATE", pkg.builddate);
    if let Some(ref packager) = pkg.packager {
        write_scalar(&mut buf, "PACKAGER", packager);
    }

    Ok(buf)
}

fn depends_body(pkg: &PkgMeta) -> String {
    let mut buf = String::with_capacity(256);
    write_list(&mut buf, "DEPENDS", &pkg.depends);
    write_list(&mut buf, "CONFLICTS", &pkg.conflicts);
    write_list(&mut buf, "PROVIDES", &pkg.provides);
    write_list(&mut buf, "OPTDEPENDS", &pkg.optdepends);
    write_list(&mut buf, "MAKEDEPENDS", &pkg.makedepends);

    buf
}

fn files_body(root: &Path, pkg: &mut PkgMeta) -> Result<String> {
    if pkg.files.is_empty() {
        pkg.files = scan::package_files(root, &pkg.filename)?;
    }

    let mut buf = String::with_capacity(4096);
    write_list(&mut buf, "FILES", &pkg.files);

    Ok(buf)
}

fn write_scalar(buf: &mut String, header: &str, value: &str) {
    buf.push('%');
    buf.push_str(header);
    buf.push_str("%\n");
    buf.push_str(value);
    buf.push_str("\n\n");
}

fn write_num<N: Display>(buf: &mut String, header: &str, value: N) {
    write_scalar(buf, header, &value.to_string());
}

fn write_list(buf: &mut String, header: &str, values: &[String]) {
    buf.push('%');
    buf.push_str(header);
    buf.push_str("%\n");
    for value in values {
        buf.push_str(value);
        buf.push('\n');
    }
    buf.push('\n');
}

/// Point `root/<link>` at `archive` without ever exposing a dangling
/// or stale public name: stage the symlink under a scratch name and
/// rename it over the link.
pub fn publish_link(root: &Path, link: &str, archive: &str) -> Result<()> {
    let staging = root.join(format!(".{}.new", link));
    let _ = std::fs::remove_file(&staging);
    symlink(archive, &staging).with_context(|| format!("symlink to {} failed", link))?;
    std::fs::rename(&staging, root.join(link))
        .with_context(|| format!("failed to publish {}", link))?;

    Ok(())
}

/// Timestamp stamped on every archive entry, captured once per flush.
/// `SOURCE_DATE_EPOCH` pins it for reproducible output.
fn index_timestamp() -> u64 {
    if let Ok(epoch) = std::env::var("SOURCE_DATE_EPOCH") {
        if let Ok(pinned) = epoch.parse() {
            return pinned;
        }
    }

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

//! Index archive loader.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::Result;
use log::warn;
use tar::Archive as TarArchive;

use crate::cache::{PkgCache, PkgMeta};
use crate::compress::Decompressor;
use crate::parser;

/// Populate the cache from the index archive `root/<archive>`.
///
/// Every `<name>-<version>/<component>` entry is parsed as a block
/// file; components of one package merge into a single record, whether
/// they come from this archive or were already loaded from a sibling
/// archive. The last occurrence of a scalar header wins.
pub fn populate(root: &Path, archive: &str, cache: &mut PkgCache) -> Result<()> {
    let f = File::open(root.join(archive))?;
    let reader = Decompressor::from_file_name(archive, f)?;
    let mut tar = TarArchive::new(reader);

    let mut order: Vec<String> = Vec::new();
    let mut contents: HashMap<String, String> = HashMap::new();

    for entry in tar.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let path = entry.path()?;
        let dir = match path.parent().and_then(|p| p.to_str()) {
            Some(dir) if !dir.is_empty() => dir.to_string(),
            _ => continue,
        };

        let mut body = String::new();
        entry.read_to_string(&mut body)?;
        match contents.get_mut(&dir) {
            Some(merged) => merged.push_str(&body),
            None => {
                order.push(dir.clone());
                contents.insert(dir, body);
            }
        }
    }

    for dir in order {
        let body = &contents[&dir];
        let blocks = match parser::entry_blocks(body) {
            Ok(("", blocks)) => blocks,
            _ => {
                warn!("skipping malformed index entry {}/{}", archive, dir);
                continue;
            }
        };

        let (name, version) = match entry_identity(&dir, &blocks) {
            Some(identity) => identity,
            None => {
                warn!("cannot identify package for index entry {}/{}", archive, dir);
                continue;
            }
        };

        match cache.find_mut(&name) {
            Some(meta) => {
                for (header, values) in blocks {
                    apply_block(meta, header, &values);
                }
            }
            None => {
                let mut meta = PkgMeta {
                    name: name.clone(),
                    version,
                    ..PkgMeta::default()
                };
                for (header, values) in blocks {
                    apply_block(&mut meta, header, &values);
                }
                cache.insert(meta);
            }
        }
    }

    Ok(())
}

/// Derive (name, version) for an entry directory. The canonical
/// `<name>-<pkgver>-<pkgrel>` split is authoritative so that `db` and
/// `files` entries of one package land on the same record; `%NAME%` /
/// `%VERSION%` headers are the fallback for unconventional names.
fn entry_identity(dir: &str, blocks: &[(&str, Vec<&str>)]) -> Option<(String, String)> {
    if let Some(identity) = split_dirname(dir) {
        return Some(identity);
    }

    let scalar = |wanted: &str| {
        blocks
            .iter()
            .find(|(header, _)| *header == wanted)
            .and_then(|(_, values)| values.first())
            .map(|v| v.to_string())
    };

    match (scalar("NAME"), scalar("VERSION")) {
        (Some(name), Some(version)) => Some((name, version)),
        _ => None,
    }
}

fn split_dirname(dir: &str) -> Option<(String, String)> {
    let mut parts = dir.rsplitn(3, '-');
    let rel = parts.next()?;
    let ver = parts.next()?;
    let name = parts.next()?;
    if name.is_empty() || ver.is_empty() || rel.is_empty() {
        return None;
    }

    Some((name.to_string(), format!("{}-{}", ver, rel)))
}

fn apply_block(meta: &mut PkgMeta, header: &str, values: &[&str]) {
    let scalar = || values.first().copied().unwrap_or_default().to_string();
    let optional = || values.first().map(|v| v.to_string());
    let list = || values.iter().map(|v| v.to_string()).collect::<Vec<_>>();

    match header {
        "FILENAME" => meta.filename = scalar(),
        "NAME" => meta.name = scalar(),
        "VERSION" => meta.version = scalar(),
        "DESC" => meta.desc = optional(),
        "URL" => meta.url = optional(),
        "PACKAGER" => meta.packager = optional(),
        "ARCH" => meta.arch = optional(),
        "CSIZE" => meta.size = scalar().parse().unwrap_or(0),
        "ISIZE" => meta.isize = scalar().parse().unwrap_or(0),
        "BUILDDATE" => meta.builddate = scalar().parse().unwrap_or(0),
        "MD5SUM" => meta.md5sum = optional(),
        "SHA256SUM" => meta.sha256sum = optional(),
        "PGPSIG" => meta.base64_sig = optional(),
        "LICENSE" => meta.license = list(),
        "DEPENDS" => meta.depends = list(),
        "CONFLICTS" => meta.conflicts = list(),
        "PROVIDES" => meta.provides = list(),
        "OPTDEPENDS" => meta.optdepends = list(),
        "MAKEDEPENDS" => meta.makedepends = list(),
        "FILES" => meta.files = list(),
        // readers must ignore headers they do not know
        _ => {}
    }
}

#[test]
fn test_split_dirname() {
    assert_eq!(
        split_dirname("zsync-0.6.2-1"),
        Some(("zsync".to_string(), "0.6.2-1".to_string()))
    );
    assert_eq!(
        split_dirname("qt5-base-5.15.2-3"),
        Some(("qt5-base".to_string(), "5.15.2-3".to_string()))
    );
    assert_eq!(
        split_dirname("grub-2:2.06-5"),
        Some(("grub".to_string(), "2:2.06-5".to_string()))
    );
    assert_eq!(split_dirname("nodashes"), None);
}

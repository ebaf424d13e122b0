//! Synthesized package fixtures for tests.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use flate2::write::GzEncoder;
use tar::{Builder, EntryType, Header};

/// Build a minimal `<name>-<version>-x86_64.pkg.tar.gz` in `root` and
/// return its file name. Entries ending in `/` become directories.
pub fn make_package(root: &Path, name: &str, version: &str, files: &[&str]) -> String {
    let pkginfo = format!(
        "# Generated by test fixture\n\
         pkgname = {name}\n\
         pkgver = {version}\n\
         pkgdesc = Test package {name}\n\
         url = https://example.org/{name}\n\
         builddate = 1700000000\n\
         packager = Repo Test <repo@example.org>\n\
         size = 4096\n\
         arch = x86_64\n\
         license = GPL\n\
         depend = glibc\n"
    );

    make_package_raw(root, name, version, &pkginfo, files)
}

/// Same as `make_package` with caller-supplied `.PKGINFO` contents.
pub fn make_package_raw(
    root: &Path,
    name: &str,
    version: &str,
    pkginfo: &str,
    files: &[&str],
) -> String {
    let filename = format!("{}-{}-x86_64.pkg.tar.gz", name, version);
    let file = File::create(root.join(&filename)).unwrap();
    let enc = GzEncoder::new(file, flate2::Compression::default());
    let mut builder = Builder::new(enc);

    append_entry(&mut builder, ".PKGINFO", pkginfo.as_bytes());
    for f in files {
        if f.ends_with('/') {
            let mut header = Header::new_ustar();
            header.set_entry_type(EntryType::Directory);
            header.set_size(0);
            header.set_mode(0o755);
            header.set_mtime(1_700_000_000);
            builder
                .append_data(&mut header, *f, std::io::empty())
                .unwrap();
        } else {
            append_entry(&mut builder, f, b"content\n");
        }
    }

    let mut enc = builder.into_inner().unwrap();
    enc.flush().unwrap();
    enc.finish().unwrap().sync_all().unwrap();

    filename
}

fn append_entry<W: Write>(builder: &mut Builder<W>, path: &str, data: &[u8]) {
    let mut header = Header::new_ustar();
    header.set_entry_type(EntryType::Regular);
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(1_700_000_000);
    builder.append_data(&mut header, path, data).unwrap();
}

//! Repository descriptor and the reconciliation actions.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use log::{info, warn};

use crate::cache::{PkgCache, PkgMeta};
use crate::compress::Compression;
use crate::config::Config;
use crate::digest;
use crate::loader;
use crate::scan;
use crate::sign::{self, SigningKey};
use crate::version::vercmp;
use crate::writer::{self, IndexKind};

/// One index artifact: the archive and its stable symlink.
#[derive(Debug, Clone)]
pub struct IndexFile {
    pub name: String,
    pub link: String,
}

pub struct Repo {
    pub root: PathBuf,
    pub name: String,
    pub compression: Compression,
    pub db: IndexFile,
    pub files: IndexFile,
    pub dirty: bool,
    /// An index archive was present on disk and loaded
    pub exists: bool,
    pub cache: PkgCache,
    key: Option<SigningKey>,
}

/// Resolve a user-supplied index path into a repo descriptor and load
/// the existing index, verifying its signature when one is present.
pub fn find_repo(path: &str, config: &Config) -> Result<Repo> {
    let abs = absolutize(Path::new(path))?;
    let leaf = abs
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("failed to find repo at {}", path))?;
    let dot = leaf
        .find('.')
        .ok_or_else(|| anyhow!("no file extension in {}", leaf))?;
    let (stem, ext) = leaf.split_at(dot);
    let (compression, ext) = Compression::from_db_extension(ext)
        .ok_or_else(|| anyhow!("{} invalid repo type", ext))?;
    let root = abs
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| anyhow!("failed to find repo root for {}", path))?;

    let key = match config.key.as_deref() {
        Some(arg) => Some(SigningKey::from_arg(arg).context("failed to load signing key")?),
        None => None,
    };

    let mut repo = Repo {
        root,
        name: stem.to_string(),
        compression,
        db: IndexFile {
            name: format!("{}.db{}", stem, ext),
            link: format!("{}.db", stem),
        },
        files: IndexFile {
            name: format!("{}.files{}", stem, ext),
            link: format!("{}.files", stem),
        },
        dirty: false,
        exists: false,
        cache: PkgCache::new(),
        key,
    };
    repo.load()?;

    Ok(repo)
}

/// Canonicalize, tolerating an index that does not exist yet.
fn absolutize(path: &Path) -> Result<PathBuf> {
    match path.canonicalize() {
        Ok(abs) => Ok(abs),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let leaf = path
                .file_name()
                .ok_or_else(|| anyhow!("failed to find repo at {}", path.display()))?;
            let parent = match path.parent() {
                Some(p) if !p.as_os_str().is_empty() => p,
                _ => Path::new("."),
            };
            Ok(parent
                .canonicalize()
                .with_context(|| format!("failed to find repo at {}", path.display()))?
                .join(leaf))
        }
        Err(e) => Err(e).with_context(|| format!("failed to find repo at {}", path.display())),
    }
}

impl Repo {
    fn pkg_path(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }

    fn sig_path(&self, filename: &str) -> PathBuf {
        self.root.join(format!("{}.sig", filename))
    }

    fn load(&mut self) -> Result<()> {
        let db = self.db.clone();
        let files = self.files.clone();
        self.exists = self.load_index(&db)?;
        self.load_index(&files)?;

        Ok(())
    }

    fn load_index(&mut self, index: &IndexFile) -> Result<bool> {
        let path = self.root.join(&index.name);
        if !path.exists() {
            return Ok(false);
        }

        let sig = self.root.join(format!("{}.sig", index.name));
        if sig.exists() {
            match &self.key {
                Some(key) => sign::verify_file(key.cert(), &path, &sig)
                    .map_err(|e| anyhow!("database signature is invalid or corrupt: {}", e))?,
                None => warn!(
                    "cannot check signature for {}: no certificate configured (-k)",
                    index.name
                ),
            }
        }

        loader::populate(&self.root, &index.name, &mut self.cache)?;
        info!("{} holds {} packages", index.name, self.cache.len());

        Ok(true)
    }

    /// Drop cache entries whose backing file has vanished.
    fn reduce(&mut self, config: &Config) {
        if self.cache.is_empty() {
            return;
        }
        config.colstr.colon_print("Reading existing database...");

        let root = self.root.clone();
        let mut purged = false;
        self.cache.retain(|pkg| {
            if root.join(&pkg.filename).is_file() {
                return true;
            }
            println!("REMOVING: {}-{}", pkg.name, pkg.version);
            purged = true;
            false
        });
        if purged {
            self.dirty = true;
        }
    }

    fn unlink_pkg_files(&self, pkg: &PkgMeta) {
        println!("DELETING: {}-{}", pkg.name, pkg.version);
        let _ = std::fs::remove_file(self.pkg_path(&pkg.filename));
        let _ = std::fs::remove_file(self.sig_path(&pkg.filename));
    }

    /// Normalize a candidate path and extract its metadata. Paths that
    /// resolve outside the repo root, or packages whose metadata cannot
    /// be read, are skipped with a warning.
    fn load_candidate(&self, path: &str) -> Option<PkgMeta> {
        let p = Path::new(path);
        let filename = match p.parent().filter(|d| !d.as_os_str().is_empty()) {
            Some(dir) => match dir.canonicalize() {
                Ok(dir) if dir == self.root => p
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
                _ => {
                    warn!("{} is not in the same path as the database", path);
                    return None;
                }
            },
            None => path.to_string(),
        };

        match scan::load_package(&self.root, &filename) {
            Ok(meta) => Some(meta),
            Err(e) => {
                warn!("skipping {}: {:#}", filename, e);
                None
            }
        }
    }

    /// Reconcile the cache against package files: an explicit list, or
    /// a scan of the repo root when the list is empty. Each candidate
    /// runs through the decision table in turn, so duplicate names
    /// among the candidates converge on the newest version no matter
    /// how the directory scan orders them.
    pub fn update(&mut self, config: &Config, targets: &[String]) -> Result<i32> {
        config.colstr.colon_print("Scanning for new packages...");

        if !self.exists {
            warn!("repo doesn't exist, creating...");
        } else {
            self.reduce(config);
        }

        let force = !targets.is_empty();
        let candidates = if force {
            targets.to_vec()
        } else {
            scan::find_all_packages(&self.root)?
        };

        for path in &candidates {
            let new = match self.load_candidate(path) {
                Some(meta) => meta,
                None => continue,
            };

            let old = self
                .cache
                .find(&new.name)
                .map(|old| (old.version.clone(), old.base64_sig.is_some()));

            let (old_version, old_has_sig) = match old {
                None => {
                    println!("ADDING: {}-{}", new.name, new.version);
                    self.cache.insert(new);
                    self.dirty = true;
                    continue;
                }
                Some(old) => old,
            };

            if force {
                println!("REPLACING: {} {} => {}", new.name, old_version, new.version);
                let new_filename = new.filename.clone();
                let old = self.cache.insert(new).expect("entry vanished");
                // re-adding the same file must not delete it
                if config.clean >= 2 && old.filename != new_filename {
                    self.unlink_pkg_files(&old);
                }
                self.dirty = true;
                continue;
            }

            match vercmp(&new.version, &old_version) {
                Ordering::Greater => {
                    println!("UPDATING: {} {} => {}", new.name, old_version, new.version);
                    let new_filename = new.filename.clone();
                    let old = self.cache.insert(new).expect("entry vanished");
                    if config.clean >= 1 && old.filename != new_filename {
                        self.unlink_pkg_files(&old);
                    }
                    self.dirty = true;
                }
                Ordering::Equal => {
                    // same version, but the package may have gained a
                    // detached signature since the last run
                    if !old_has_sig && new.base64_sig.is_some() {
                        println!("ADD SIG: {}-{}", new.name, new.version);
                        let entry = self.cache.find_mut(&new.name).expect("entry vanished");
                        entry.base64_sig = new.base64_sig;
                        self.dirty = true;
                    }
                }
                Ordering::Less => {
                    if config.clean >= 2 {
                        self.unlink_pkg_files(&new);
                    }
                }
            }
        }

        Ok(0)
    }

    /// Drop named entries from the cache.
    pub fn remove(&mut self, config: &Config, names: &[String]) -> Result<i32> {
        if !self.exists {
            warn!("repo doesn't exist...");
            return Ok(1);
        }
        self.reduce(config);

        for name in names {
            match self.cache.remove(name) {
                Some(pkg) => {
                    println!("REMOVING: {}-{}", pkg.name, pkg.version);
                    if config.clean >= 1 {
                        self.unlink_pkg_files(&pkg);
                    }
                    self.dirty = true;
                }
                None => warn!("didn't find entry: {}", name),
            }
        }

        Ok(0)
    }

    /// Print cache entries; a missing name fails the query.
    pub fn query(&self, config: &Config, names: &[String]) -> Result<i32> {
        if !self.exists {
            warn!("repo doesn't exist");
            return Ok(1);
        }

        if names.is_empty() {
            for pkg in self.cache.iter() {
                print_pkg_metadata(config, pkg);
            }
            return Ok(0);
        }

        for name in names {
            match self.cache.find(name) {
                Some(pkg) => print_pkg_metadata(config, pkg),
                None => {
                    warn!("pkg not found: {}", name);
                    return Ok(1);
                }
            }
        }

        Ok(0)
    }

    fn verify_pkg(&self, pkg: &PkgMeta, deep: bool) -> i32 {
        let pkgpath = self.pkg_path(&pkg.filename);
        if !pkgpath.is_file() {
            if deep {
                warn!("couldn't find pkg {} at {}", pkg.name, pkgpath.display());
            }
            return 1;
        }
        if !deep {
            return 0;
        }

        let sigpath = self.sig_path(&pkg.filename);
        if sigpath.exists() {
            match &self.key {
                Some(key) => {
                    if sign::verify_file(key.cert(), &pkgpath, &sigpath).is_err() {
                        warn!("package {}, signature is invalid or corrupt!", pkg.name);
                        return 1;
                    }
                }
                None => warn!(
                    "cannot check signature for {}: no certificate configured (-k)",
                    pkg.name
                ),
            }
        }

        if let Some(ref expected) = pkg.md5sum {
            if digest::md5sum(&pkgpath).ok().as_ref() != Some(expected) {
                warn!("md5 sum for pkg {} is different", pkg.name);
                return 1;
            }
        }
        if let Some(ref expected) = pkg.sha256sum {
            if digest::sha256sum(&pkgpath).ok().as_ref() != Some(expected) {
                warn!("sha256 sum for pkg {} is different", pkg.name);
                return 1;
            }
        }

        0
    }

    /// Check every entry against its backing file, signature and
    /// recorded checksums.
    pub fn verify(&self) -> i32 {
        let mut rc = 0;
        for pkg in self.cache.iter() {
            rc |= self.verify_pkg(pkg, true);
        }
        if rc == 0 {
            println!("repo okay!");
        }

        rc
    }

    /// Rewrite the index artifacts if the cache changed.
    pub fn flush(&mut self, config: &Config) -> Result<()> {
        if !self.dirty {
            println!("repo {} does not need updating", self.name);
            return Ok(());
        }

        config.colstr.colon_print("Writing database to disk...");
        let db = self.db.clone();
        writer::compile_index(
            &self.root,
            &db.name,
            &db.link,
            self.compression,
            &mut self.cache,
            IndexKind::Db,
        )?;
        if config.sign {
            self.sign_index(&db)?;
        }

        if config.files {
            config.colstr.colon_print("Writing file database to disk...");
            let files = self.files.clone();
            writer::compile_index(
                &self.root,
                &files.name,
                &files.link,
                self.compression,
                &mut self.cache,
                IndexKind::Files,
            )?;
            if config.sign {
                self.sign_index(&files)?;
            }
        }

        println!("repo {} updated successfully", self.name);

        Ok(())
    }

    fn sign_index(&self, index: &IndexFile) -> Result<()> {
        let key = self
            .key
            .as_ref()
            .ok_or_else(|| anyhow!("signing requested but no key given (-k)"))?;
        let archive_sig = format!("{}.sig", index.name);
        sign::sign_file(
            key,
            &self.root.join(&index.name),
            &self.root.join(&archive_sig),
        )?;
        writer::publish_link(&self.root, &format!("{}.sig", index.link), &archive_sig)?;

        Ok(())
    }
}

fn print_pkg_metadata(config: &Config, pkg: &PkgMeta) {
    if config.info {
        println!("Filename     : {}", pkg.filename);
        println!("Name         : {}", pkg.name);
        println!("Version      : {}", pkg.version);
        println!("Description  : {}", pkg.desc.as_deref().unwrap_or_default());
        println!("Architecture : {}", pkg.arch.as_deref().unwrap_or_default());
        println!("URL          : {}", pkg.url.as_deref().unwrap_or_default());
        println!("Packager     : {}\n", pkg.packager.as_deref().unwrap_or_default());
    } else {
        println!("{} {}", pkg.name, pkg.version);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Action;
    use crate::testutil::make_package;

    fn update_config() -> Config {
        Config::for_tests(Action::Update)
    }

    fn db_arg(root: &Path) -> String {
        root.join("test.db.tar.gz").to_string_lossy().to_string()
    }

    #[test]
    fn test_fresh_add() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let filename = make_package(root, "zsync", "0.6.2-1", &["usr/bin/zsync"]);

        let config = update_config();
        let mut repo = find_repo(&db_arg(root), &config).unwrap();
        assert!(!repo.exists);

        repo.update(&config, &[filename]).unwrap();
        assert!(repo.dirty);
        repo.flush(&config).unwrap();

        assert!(root.join("test.db.tar.gz").is_file());
        let target = std::fs::read_link(root.join("test.db")).unwrap();
        assert_eq!(target.to_str().unwrap(), "test.db.tar.gz");

        let reloaded = find_repo(&db_arg(root), &config).unwrap();
        assert!(reloaded.exists);
        let pkg = reloaded.cache.find("zsync").unwrap();
        assert_eq!(pkg.version, "0.6.2-1");
        assert!(pkg.md5sum.is_some());
        assert!(pkg.sha256sum.is_some());
    }

    #[test]
    fn test_resolves_index_through_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let filename = make_package(root, "zsync", "0.6.2-1", &[]);

        let config = update_config();
        let mut repo = find_repo(&db_arg(root), &config).unwrap();
        repo.update(&config, &[filename]).unwrap();
        repo.flush(&config).unwrap();

        // pointing at the symlink resolves to the real archive
        let via_link = root.join("test.db").to_string_lossy().to_string();
        let repo = find_repo(&via_link, &config).unwrap();
        assert_eq!(repo.db.name, "test.db.tar.gz");
        assert_eq!(repo.cache.len(), 1);
    }

    #[test]
    fn test_invalid_extension() {
        let config = update_config();
        assert!(find_repo("/tmp/test.rar", &config).is_err());
        assert!(find_repo("/tmp/test", &config).is_err());
    }

    #[test]
    fn test_update_empty_nonexistent_stays_clean() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        let config = update_config();
        let mut repo = find_repo(&db_arg(root), &config).unwrap();
        repo.update(&config, &[]).unwrap();
        assert!(!repo.dirty);
        repo.flush(&config).unwrap();
        assert!(!root.join("test.db.tar.gz").exists());
    }

    #[test]
    fn test_upgrade_with_clean() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let old_file = make_package(root, "zsync", "1.0-1", &[]);

        let config = update_config();
        let mut repo = find_repo(&db_arg(root), &config).unwrap();
        repo.update(&config, &[]).unwrap();
        repo.flush(&config).unwrap();

        make_package(root, "zsync", "1.1-1", &[]);
        std::fs::write(root.join(format!("{}.sig", old_file)), b"sig").unwrap();

        let mut config = update_config();
        config.clean = 1;
        let mut repo = find_repo(&db_arg(root), &config).unwrap();
        repo.update(&config, &[]).unwrap();
        assert!(repo.dirty);
        assert_eq!(repo.cache.find("zsync").unwrap().version, "1.1-1");
        assert!(!root.join(&old_file).exists());
        assert!(!root.join(format!("{}.sig", old_file)).exists());

        repo.flush(&config).unwrap();
        let reloaded = find_repo(&db_arg(root), &config).unwrap();
        assert_eq!(reloaded.cache.find("zsync").unwrap().version, "1.1-1");
    }

    #[test]
    fn test_downgrade_rejection() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        make_package(root, "zsync", "10.0-1", &[]);

        let config = update_config();
        let mut repo = find_repo(&db_arg(root), &config).unwrap();
        repo.update(&config, &[]).unwrap();
        repo.flush(&config).unwrap();

        // sorts after 10.0-1, so it reaches the version comparison
        let older = make_package(root, "zsync", "9.0-1", &[]);

        let config = update_config();
        let mut repo = find_repo(&db_arg(root), &config).unwrap();
        repo.update(&config, &[]).unwrap();
        assert!(!repo.dirty);
        assert_eq!(repo.cache.find("zsync").unwrap().version, "10.0-1");
        assert!(root.join(&older).exists());

        let mut config = update_config();
        config.clean = 2;
        let mut repo = find_repo(&db_arg(root), &config).unwrap();
        repo.update(&config, &[]).unwrap();
        assert!(!repo.dirty);
        assert!(!root.join(&older).exists());
    }

    #[test]
    fn test_force_replace() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let filename = make_package(root, "zsync", "1.0-1", &[]);

        let config = update_config();
        let mut repo = find_repo(&db_arg(root), &config).unwrap();
        repo.update(&config, &[filename.clone()]).unwrap();
        repo.flush(&config).unwrap();

        // same version again, explicit list: replaced, not skipped
        let mut repo = find_repo(&db_arg(root), &config).unwrap();
        repo.update(&config, &[filename]).unwrap();
        assert!(repo.dirty);
    }

    #[test]
    fn test_signature_pickup() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let filename = make_package(root, "zsync", "1.0-1", &[]);

        let config = update_config();
        let mut repo = find_repo(&db_arg(root), &config).unwrap();
        repo.update(&config, &[]).unwrap();
        repo.flush(&config).unwrap();

        std::fs::write(root.join(format!("{}.sig", filename)), b"detached").unwrap();

        let mut repo = find_repo(&db_arg(root), &config).unwrap();
        assert!(repo.cache.find("zsync").unwrap().base64_sig.is_none());
        repo.update(&config, &[]).unwrap();
        assert!(repo.dirty);
        repo.flush(&config).unwrap();

        let reloaded = find_repo(&db_arg(root), &config).unwrap();
        assert_eq!(
            reloaded.cache.find("zsync").unwrap().base64_sig.as_deref(),
            Some("ZGV0YWNoZWQ=")
        );
    }

    #[test]
    fn test_reduce_purges_missing_backing_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let foo = make_package(root, "foo", "1.0-1", &[]);
        make_package(root, "bar", "1.0-1", &[]);

        let config = update_config();
        let mut repo = find_repo(&db_arg(root), &config).unwrap();
        repo.update(&config, &[]).unwrap();
        repo.flush(&config).unwrap();

        std::fs::remove_file(root.join(&foo)).unwrap();

        let mut repo = find_repo(&db_arg(root), &config).unwrap();
        repo.update(&config, &[]).unwrap();
        assert!(repo.dirty);
        assert!(repo.cache.find("foo").is_none());
        repo.flush(&config).unwrap();

        let reloaded = find_repo(&db_arg(root), &config).unwrap();
        assert_eq!(reloaded.cache.len(), 1);
        assert!(reloaded.cache.find("bar").is_some());
    }

    #[test]
    fn test_out_of_path_candidate_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        let root = dir.path();
        let stray = make_package(elsewhere.path(), "zsync", "1.0-1", &[]);

        let config = update_config();
        let mut repo = find_repo(&db_arg(root), &config).unwrap();
        let stray_path = elsewhere.path().join(stray).to_string_lossy().to_string();
        repo.update(&config, &[stray_path]).unwrap();
        assert!(!repo.dirty);
        assert!(repo.cache.is_empty());
    }

    #[test]
    fn test_remove() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let filename = make_package(root, "zsync", "1.0-1", &[]);
        make_package(root, "acl", "2.3.1-1", &[]);

        let config = update_config();
        let mut repo = find_repo(&db_arg(root), &config).unwrap();
        repo.update(&config, &[]).unwrap();
        repo.flush(&config).unwrap();

        let mut config = Config::for_tests(Action::Remove);
        config.clean = 1;
        let mut repo = find_repo(&db_arg(root), &config).unwrap();
        let rc = repo
            .remove(&config, &["zsync".to_string(), "missing".to_string()])
            .unwrap();
        assert_eq!(rc, 0);
        assert!(repo.dirty);
        assert!(repo.cache.find("zsync").is_none());
        assert!(!root.join(&filename).exists());

        repo.flush(&config).unwrap();
        let reloaded = find_repo(&db_arg(root), &config).unwrap();
        assert_eq!(reloaded.cache.len(), 1);
    }

    #[test]
    fn test_remove_without_index() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::for_tests(Action::Remove);
        let mut repo = find_repo(&db_arg(dir.path()), &config).unwrap();
        let rc = repo.remove(&config, &["zsync".to_string()]).unwrap();
        assert_eq!(rc, 1);
    }

    #[test]
    fn test_query() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        make_package(root, "zsync", "1.0-1", &[]);

        let config = update_config();
        let mut repo = find_repo(&db_arg(root), &config).unwrap();
        repo.update(&config, &[]).unwrap();
        repo.flush(&config).unwrap();

        let config = Config::for_tests(Action::Query);
        let repo = find_repo(&db_arg(root), &config).unwrap();
        assert_eq!(repo.query(&config, &[]).unwrap(), 0);
        assert_eq!(repo.query(&config, &["zsync".to_string()]).unwrap(), 0);
        assert_eq!(repo.query(&config, &["missing".to_string()]).unwrap(), 1);
    }

    #[test]
    fn test_verify_checksum_mismatch() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let filename = make_package(root, "zsync", "1.0-1", &[]);

        let config = update_config();
        let mut repo = find_repo(&db_arg(root), &config).unwrap();
        repo.update(&config, &[]).unwrap();
        repo.flush(&config).unwrap();

        let repo = find_repo(&db_arg(root), &config).unwrap();
        assert_eq!(repo.verify(), 0);

        let mut f = std::fs::OpenOptions::new()
            .append(true)
            .open(root.join(&filename))
            .unwrap();
        f.write_all(b"corruption").unwrap();
        drop(f);

        let repo = find_repo(&db_arg(root), &config).unwrap();
        assert_eq!(repo.verify(), 1);
        // verify never mutates the cache
        assert_eq!(repo.cache.len(), 1);
    }

    #[test]
    fn test_signed_flush_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        make_package(root, "zsync", "1.0-1", &[]);

        // export a fresh certificate with its secret material
        use sequoia_openpgp::serialize::SerializeInto;
        let cert = crate::sign::test_certificate();
        let key_path = root.join("signing.key");
        std::fs::write(&key_path, cert.as_tsk().to_vec().unwrap()).unwrap();

        let mut config = update_config();
        config.sign = true;
        config.key = Some(key_path.to_string_lossy().to_string());

        let mut repo = find_repo(&db_arg(root), &config).unwrap();
        repo.update(&config, &[]).unwrap();
        repo.flush(&config).unwrap();

        assert!(root.join("test.db.tar.gz.sig").is_file());
        let target = std::fs::read_link(root.join("test.db.sig")).unwrap();
        assert_eq!(target.to_str().unwrap(), "test.db.tar.gz.sig");

        // loading back verifies the signature against the same key
        let repo = find_repo(&db_arg(root), &config).unwrap();
        assert_eq!(repo.cache.len(), 1);

        // a tampered archive must fail the load
        use std::io::Write;
        let mut f = std::fs::OpenOptions::new()
            .append(true)
            .open(root.join("test.db.tar.gz"))
            .unwrap();
        f.write_all(b"garbage").unwrap();
        drop(f);
        assert!(find_repo(&db_arg(root), &config).is_err());
    }

    #[test]
    fn test_files_index() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        make_package(root, "zsync", "1.0-1", &["usr/", "usr/bin/zsync"]);

        let mut config = update_config();
        config.files = true;
        let mut repo = find_repo(&db_arg(root), &config).unwrap();
        repo.update(&config, &[]).unwrap();
        repo.flush(&config).unwrap();

        assert!(root.join("test.files.tar.gz").is_file());
        let target = std::fs::read_link(root.join("test.files")).unwrap();
        assert_eq!(target.to_str().unwrap(), "test.files.tar.gz");

        let reloaded = find_repo(&db_arg(root), &config).unwrap();
        assert_eq!(
            reloaded.cache.find("zsync").unwrap().files,
            vec!["usr/", "usr/bin/zsync"]
        );
    }
}

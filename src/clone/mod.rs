//! Clone engine (component M, spec §4.9): recursive mirror of the boot
//! volume onto a selected target volume, with an explicit volume switch
//! around every read and write — there is no ambient "current volume" to
//! leak (spec §5).

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::error::Result;
use crate::fs::Filesystem;
use crate::platform::Timestamp;

fn join(path: &str, name: &str) -> String {
    if path == "/" {
        format!("/{name}")
    } else {
        format!("{path}/{name}")
    }
}

/// Reports progress and failure back to the caller's status bar (spec
/// §4.9: "the user sees which file failed in the status bar").
pub trait CloneStatus {
    fn copying(&mut self, dst: &str);
    fn failed(&mut self, path: &str, err: crate::error::Error);
}

/// Recursively mirrors `src_path` on `boot` onto `dst_path` on `target`.
/// Stops at the first error, leaving whatever was already copied in place
/// on `target` (spec §4.9). `status.failed` is called and `Err` returned
/// without aborting the process the caller runs in — the top-level loop
/// recovers and stays in the browser, per spec §7.
pub fn clone<B: Filesystem, T: Filesystem>(
    boot: &mut B,
    target: &mut T,
    src_path: &str,
    dst_path: &str,
    status: &mut impl CloneStatus,
) -> Result<()> {
    log::trace!(target: "clone", "mirroring '{src_path}' onto '{dst_path}'");
    // "switch to boot volume"
    let entries = boot.read_dir(src_path).map_err(|e| report(status, src_path, e))?;

    for entry in entries {
        let src = join(src_path, &entry.name);
        let dst = join(dst_path, &entry.name);

        if entry.is_dir {
            // "switch to target; mkdir(dst)" — idempotent, per spec.
            target.mkdir(&dst).map_err(|e| report(status, &dst, e))?;
            // "switch to boot"
            clone(boot, target, &src, &dst, status)?;
        } else {
            status.copying(&dst);
            // "switch to boot; data <- read_whole_file(src)"
            let data = boot.read_file(&src).map_err(|e| report(status, &src, e))?;
            // "switch to target; write_whole_file(dst, data)"
            target.write_file(&dst, &data, Timestamp::FIXED_FALLBACK).map_err(|e| report(status, &dst, e))?;
            // `data` drops here, freeing it before returning to the boot
            // volume for the next entry (spec: "free data").
        }
    }
    Ok(())
}

fn report(status: &mut impl CloneStatus, path: &str, err: crate::error::Error) -> crate::error::Error {
    log::warn!(target: "clone", "failed on '{path}': {err}");
    status.failed(path, err);
    err
}

/// Default [`CloneStatus`] that just records the last message, for callers
/// that only need to show one line in an info bar.
#[derive(Default)]
pub struct StatusLine {
    pub message: Option<String>,
}

impl CloneStatus for StatusLine {
    fn copying(&mut self, dst: &str) {
        self.message = Some(format!("Copying {dst}"));
    }

    fn failed(&mut self, path: &str, err: crate::error::Error) {
        self.message = Some(format!("Clone failed at {path}: {err}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::fs::DirEntry;
    use alloc::collections::BTreeMap;
    use alloc::vec;

    struct FakeFs {
        dirs: BTreeMap<String, Vec<DirEntry>>,
        files: BTreeMap<String, Vec<u8>>,
        fail_read: Option<String>,
    }

    impl FakeFs {
        fn new() -> Self {
            Self { dirs: BTreeMap::new(), files: BTreeMap::new(), fail_read: None }
        }
    }

    impl Filesystem for FakeFs {
        fn read_dir(&mut self, path: &str) -> Result<Vec<DirEntry>> {
            self.dirs.get(path).cloned().ok_or(Error::NotFound)
        }
        fn mkdir(&mut self, path: &str) -> Result<()> {
            self.dirs.entry(path.to_string()).or_default();
            Ok(())
        }
        fn exists(&mut self, path: &str) -> Result<bool> {
            Ok(self.files.contains_key(path) || self.dirs.contains_key(path))
        }
        fn is_dir(&mut self, path: &str) -> Result<bool> {
            Ok(self.dirs.contains_key(path))
        }
        fn read_file(&mut self, path: &str) -> Result<Vec<u8>> {
            if self.fail_read.as_deref() == Some(path) {
                return Err(Error::Io);
            }
            self.files.get(path).cloned().ok_or(Error::NotFound)
        }
        fn write_file(&mut self, path: &str, data: &[u8], _timestamp: Timestamp) -> Result<()> {
            self.files.insert(path.to_string(), data.to_vec());
            Ok(())
        }
        fn delete(&mut self, path: &str) -> Result<()> {
            self.files.remove(path);
            Ok(())
        }
        fn rename(&mut self, _from: &str, _to: &str) -> Result<()> {
            Ok(())
        }
        fn free_space_bytes(&mut self) -> Result<u64> {
            Ok(1_000_000)
        }
        fn label(&self) -> &str {
            "FAKE"
        }
    }

    fn de(name: &str, is_dir: bool) -> DirEntry {
        DirEntry { name: name.to_string(), is_dir, size: 0, attributes: 0 }
    }

    #[test]
    fn clones_nested_directories_and_files() {
        let mut boot = FakeFs::new();
        boot.dirs.insert("/".to_string(), vec![de("a.txt", false), de("sub", true)]);
        boot.dirs.insert("/sub".to_string(), vec![de("b.txt", false)]);
        boot.files.insert("/a.txt".to_string(), b"hello".to_vec());
        boot.files.insert("/sub/b.txt".to_string(), b"world".to_vec());

        let mut target = FakeFs::new();
        target.dirs.insert("/".to_string(), Vec::new());

        let mut status = StatusLine::default();
        clone(&mut boot, &mut target, "/", "/", &mut status).unwrap();

        assert_eq!(target.files.get("/a.txt").unwrap(), b"hello");
        assert_eq!(target.files.get("/sub/b.txt").unwrap(), b"world");
        assert!(target.dirs.contains_key("/sub"));
    }

    #[test]
    fn mkdir_on_target_is_idempotent() {
        let mut boot = FakeFs::new();
        boot.dirs.insert("/".to_string(), vec![de("sub", true)]);
        boot.dirs.insert("/sub".to_string(), Vec::new());

        let mut target = FakeFs::new();
        target.dirs.insert("/".to_string(), Vec::new());
        target.dirs.insert("/sub".to_string(), Vec::new()); // already present

        let mut status = StatusLine::default();
        assert!(clone(&mut boot, &mut target, "/", "/", &mut status).is_ok());
    }

    #[test]
    fn a_read_failure_stops_the_walk_and_reports_the_path() {
        let mut boot = FakeFs::new();
        boot.dirs.insert("/".to_string(), vec![de("bad.txt", false), de("good.txt", false)]);
        boot.files.insert("/good.txt".to_string(), b"ok".to_vec());
        boot.fail_read = Some("/bad.txt".to_string());

        let mut target = FakeFs::new();
        target.dirs.insert("/".to_string(), Vec::new());

        let mut status = StatusLine::default();
        let result = clone(&mut boot, &mut target, "/", "/", &mut status);
        assert!(result.is_err());
        assert!(status.message.unwrap().contains("bad.txt"));
    }
}

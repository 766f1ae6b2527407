//! The backing-store plug-in interface: positional I/O against the file
//! holding a LUN's persistent bytes.
//!
//! Grounded on `bs_rdwr_open()`'s read-write-then-read-only-fallback and on
//! the idiomatic positional-I/O pattern this pack's `parity-db` table module
//! uses (`std::os::unix::fs::FileExt::{read_at, write_at}`) rather than raw
//! `pread64`/`pwrite64` libc calls.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::path::Path;

use crate::error::{CacheError, Result};

/// A backing store a LUN's cache partitions read through and write back to.
pub trait BackingStore: Send + Sync {
    /// Total size of the backing store in bytes.
    fn size(&self) -> u64;

    /// Whether the store was opened read-only (the RW-open fallback fired).
    fn is_read_only(&self) -> bool;

    /// Reads `buf.len()` bytes starting at `offset`. Short reads past EOF
    /// fill the remainder of `buf` with zeros rather than erroring, matching
    /// the cache-fill contract in the I/O engine.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Writes `buf` at `offset`.
    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()>;

    /// Flushes any buffered writes to stable storage (`SYNCHRONIZE_CACHE`).
    fn sync(&self) -> Result<()>;

    /// Deallocates the byte range `[offset, offset+len)` (`UNMAP`,
    /// unmap-bit `WRITE_SAME`). Requires thin provisioning support; callers
    /// must check that separately.
    fn punch_hole(&self, offset: u64, len: u64) -> Result<()>;

    /// Advises the kernel that `[offset, offset+len)` will be read soon
    /// (`PRE_FETCH`). Best-effort; a no-op default is a correct
    /// implementation for any backing store that can't act on the hint.
    fn advise_will_need(&self, _offset: u64, _len: u64) -> Result<()> {
        Ok(())
    }
}

/// A [`BackingStore`] backed by a single regular file.
#[derive(Debug)]
pub struct FileBackingStore {
    file: File,
    size: u64,
    read_only: bool,
}

impl FileBackingStore {
    /// Opens `path` read-write; on `EACCES`/`EROFS` falls back to read-only
    /// and marks the LUN accordingly, matching `bs_rdwr_open`. `direct_io`
    /// requests `O_DIRECT` when set.
    pub fn open(path: impl AsRef<Path>, direct_io: bool) -> Result<Self> {
        let path = path.as_ref();
        let mut options = OpenOptions::new();
        options.read(true).write(true);
        if direct_io {
            options.custom_flags(libc::O_DIRECT);
        }

        let (file, read_only) = match options.open(path) {
            Ok(f) => (f, false),
            Err(e) if matches!(e.raw_os_error(), Some(libc::EACCES) | Some(libc::EROFS)) => {
                let mut ro = OpenOptions::new();
                ro.read(true);
                if direct_io {
                    ro.custom_flags(libc::O_DIRECT);
                }
                let f = ro
                    .open(path)
                    .map_err(|e| CacheError::Allocation(format!("opening {}: {e}", path.display())))?;
                (f, true)
            }
            Err(e) => {
                return Err(CacheError::Allocation(format!(
                    "opening {}: {e}",
                    path.display()
                )))
            }
        };

        let size = file
            .metadata()
            .map_err(|e| CacheError::Allocation(format!("stat {}: {e}", path.display())))?
            .len();

        Ok(FileBackingStore {
            file,
            size,
            read_only,
        })
    }
}

impl BackingStore for FileBackingStore {
    fn size(&self) -> u64 {
        self.size
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        if offset >= self.size {
            buf.fill(0);
            return Ok(());
        }
        let in_range = (self.size - offset).min(buf.len() as u64) as usize;
        let (head, tail) = buf.split_at_mut(in_range);
        self.file
            .read_exact_at(head, offset)
            .map_err(|e| CacheError::BackingRead { offset, source: e })?;
        tail.fill(0);
        Ok(())
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        self.file
            .write_all_at(buf, offset)
            .map_err(|e| CacheError::BackingWrite { offset, source: e })
    }

    fn sync(&self) -> Result<()> {
        self.file
            .sync_data()
            .map_err(|e| CacheError::BackingWrite { offset: 0, source: e })
    }

    fn punch_hole(&self, offset: u64, len: u64) -> Result<()> {
        // SAFETY: fallocate is called with a valid fd and in-range lengths;
        // failure is reported through errno and converted below, not through
        // undefined behavior.
        let ret = unsafe {
            libc::fallocate(
                std::os::unix::io::AsRawFd::as_raw_fd(&self.file),
                libc::FALLOC_FL_PUNCH_HOLE | libc::FALLOC_FL_KEEP_SIZE,
                offset as libc::off_t,
                len as libc::off_t,
            )
        };
        if ret != 0 {
            return Err(CacheError::BackingWrite {
                offset,
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }

    fn advise_will_need(&self, offset: u64, len: u64) -> Result<()> {
        // SAFETY: posix_fadvise is called with a valid fd and in-range
        // offset/len; a nonzero return is an errno value, not a fault.
        let ret = unsafe {
            libc::posix_fadvise(
                std::os::unix::io::AsRawFd::as_raw_fd(&self.file),
                offset as libc::off_t,
                len as libc::off_t,
                libc::POSIX_FADV_WILLNEED,
            )
        };
        if ret != 0 {
            return Err(CacheError::BackingRead {
                offset,
                source: io::Error::from_raw_os_error(ret),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn read_past_eof_zero_fills() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[1, 2, 3, 4]).unwrap();
        let store = FileBackingStore::open(tmp.path(), false).unwrap();
        let mut buf = [0xffu8; 8];
        store.read_at(0, &mut buf).unwrap();
        assert_eq!(&buf[..4], &[1, 2, 3, 4]);
        assert_eq!(&buf[4..], &[0, 0, 0, 0]);
    }

    #[test]
    fn write_then_read_roundtrips() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        // Pre-size the file so write_at/read_at stay in-range.
        tmp.as_file().set_len(4096).unwrap();
        let store = FileBackingStore::open(tmp.path(), false).unwrap();
        store.write_at(0, &[0xAA; 512]).unwrap();
        let mut buf = [0u8; 512];
        store.read_at(0, &mut buf).unwrap();
        assert_eq!(buf, [0xAA; 512]);
    }
}

//! Command types and the dispatch entry point tying the splitter, the I/O
//! engine, and the special-opcode handlers together.
//!
//! Restates the overall control flow of `bs_rdwr_cmd_submit`'s opcode
//! switch as a typed enum match instead of a raw `scb[0]` dispatch.

use crate::backing_store::BackingStore;
use crate::config::WriteMode;
use crate::error::Result;
use crate::host_cache::HostCache;
use crate::io_engine;
use crate::special_ops::{self, UnmapDescriptor};
use crate::splitter;
use crate::writeback::WritebackRegistry;

/// A decoded command this cache can service.
#[derive(Debug, Clone)]
pub enum Command {
    /// READ_6/10/12/16.
    Read {
        /// SCSI target id.
        target: u32,
        /// Logical unit number.
        lun: u32,
        /// Byte offset of the first byte to read.
        offset: u64,
        /// Number of bytes to read.
        length: u64,
    },
    /// WRITE_6/10/12/16 (and WRITE_VERIFY* variants, treated identically).
    Write {
        /// SCSI target id.
        target: u32,
        /// Logical unit number.
        lun: u32,
        /// Byte offset of the first byte to write.
        offset: u64,
        /// Number of bytes to write.
        length: u64,
    },
    /// SYNCHRONIZE_CACHE / SYNCHRONIZE_CACHE_16.
    SynchronizeCache,
    /// WRITE_SAME / WRITE_SAME_16.
    WriteSame {
        /// Byte offset of the first block.
        offset: u64,
        /// Number of blocks to write (or unmap).
        num_blocks: u64,
        /// The pattern block to repeat, when `unmap` is false.
        pattern: Vec<u8>,
        /// Whether to deallocate the range instead of writing the pattern.
        unmap: bool,
        /// Whether to overwrite each block's first 8 bytes with its own LBA
        /// (the CDB's LBDATA bit) instead of the pattern's.
        lba_substitution: bool,
    },
    /// COMPARE_AND_WRITE.
    CompareAndWrite {
        /// Byte offset to compare/write at.
        offset: u64,
        /// Expected existing bytes.
        compare: Vec<u8>,
        /// Bytes to write if the compare succeeds.
        write: Vec<u8>,
    },
    /// ORWRITE_16.
    Orwrite {
        /// Byte offset to OR into.
        offset: u64,
        /// Bytes to OR with the existing contents.
        data: Vec<u8>,
    },
    /// VERIFY / VERIFY_10/12/16.
    Verify {
        /// Byte offset to verify at.
        offset: u64,
        /// Expected bytes.
        expected: Vec<u8>,
    },
    /// PRE_FETCH / PRE_FETCH_16.
    PreFetch {
        /// Byte offset to prefetch from.
        offset: u64,
        /// Number of bytes to prefetch.
        length: u64,
    },
    /// UNMAP.
    Unmap {
        /// Parsed block descriptors.
        descriptors: Vec<UnmapDescriptor>,
        /// Whether the target LUN is thin-provisioned.
        thin_provisioned: bool,
    },
}

/// Outcome of dispatching a command, for opcodes that go through the
/// splitter: which node the caller should have serviced this command from.
/// `None` for opcodes that bypass the cache entirely.
pub type AffinityHint = Option<usize>;

/// Splits (for READ/WRITE), picks a preferred node, and drives every
/// sub-request through the cache; for the special opcodes, calls straight
/// into `special_ops` against the backing store. Stops at the first failing
/// sub-request rather than continuing with the rest of the command.
///
/// `writeback` must be `Some` whenever `write_mode` is
/// [`WriteMode::WriteBack`]; it is unused for [`WriteMode::WriteThrough`]
/// and for opcodes other than WRITE.
pub fn dispatch(
    host: &HostCache,
    store: &dyn BackingStore,
    block_size: u64,
    write_mode: WriteMode,
    writeback: Option<&WritebackRegistry>,
    cmd: &Command,
    cmd_buf: &mut [u8],
) -> Result<AffinityHint> {
    match cmd {
        Command::Read {
            target,
            lun,
            offset,
            length,
        } => {
            let subs = splitter::split(*target, *lun, *offset, *length, block_size, |cb| host.partition_of(cb));
            let node = splitter::choose_affinity_node(&subs, |p| host.node_of(p));
            for sub in &subs {
                io_engine::service_read(host, store, sub, cmd_buf)?;
            }
            Ok(node)
        }
        Command::Write {
            target,
            lun,
            offset,
            length,
        } => {
            let subs = splitter::split(*target, *lun, *offset, *length, block_size, |cb| host.partition_of(cb));
            let node = splitter::choose_affinity_node(&subs, |p| host.node_of(p));
            for sub in &subs {
                io_engine::service_write(host, store, sub, cmd_buf, write_mode, writeback)?;
            }
            Ok(node)
        }
        Command::SynchronizeCache => {
            special_ops::synchronize_cache(store)?;
            Ok(None)
        }
        Command::WriteSame {
            offset,
            num_blocks,
            pattern,
            unmap,
            lba_substitution,
        } => {
            special_ops::write_same(
                store,
                *offset,
                *num_blocks,
                block_size,
                pattern,
                *unmap,
                *lba_substitution,
            )?;
            Ok(None)
        }
        Command::CompareAndWrite {
            offset,
            compare,
            write,
        } => {
            special_ops::compare_and_write(store, *offset, compare, write)?;
            Ok(None)
        }
        Command::Orwrite { offset, data } => {
            special_ops::orwrite(store, *offset, data)?;
            Ok(None)
        }
        Command::Verify { offset, expected } => {
            special_ops::verify(store, *offset, expected)?;
            Ok(None)
        }
        Command::PreFetch { offset, length } => {
            special_ops::pre_fetch(store, *offset, *length)?;
            Ok(None)
        }
        Command::Unmap {
            descriptors,
            thin_provisioned,
        } => {
            special_ops::unmap(store, descriptors, block_size, *thin_provisioned)?;
            Ok(None)
        }
    }
}

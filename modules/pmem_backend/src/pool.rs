//! The on-disk layout of a simulated persistent-memory pool: a fixed header
//! holding the pool's target id and bump-allocation cursor, followed by a
//! data area addressed directly through a memory mapping (§4.3 "no real
//! PMEM hardware is assumed here — `memmap2` stands in for `libpmemobj`,
//! see the design notes for what that trades away").

use bake_common::{BakeError, TargetId};
use memmap2::MmapMut;
use std::cell::UnsafeCell;
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

const MAGIC: &[u8; 8] = b"BAKEPMEM";
pub const HEADER_SIZE: u64 = 4096;
const MAGIC_OFFSET: usize = 0;
const TARGET_ID_OFFSET: usize = 8;
const NEXT_OFFSET_OFFSET: usize = 24;

/// A memory-mapped pool file. Structural writes (header fields) go through
/// `&self` raw-pointer access guarded by the fact that only one allocator
/// ever touches the header; data-area writes are always to disjoint,
/// caller-owned byte ranges, the same disjoint-raw-access discipline
/// [`bake_backend::AlignedBuffer`] uses for its allocation.
pub struct PoolFile {
    mmap: UnsafeCell<MmapMut>,
    capacity: u64,
}

unsafe impl Send for PoolFile {}
unsafe impl Sync for PoolFile {}

impl PoolFile {
    /// Creates a fresh pool file of `size` bytes (header included) with a
    /// newly generated target id, analogous to `bake_makepool`.
    pub fn create(path: &Path, size: u64) -> Result<(TargetId, Self), BakeError> {
        if size <= HEADER_SIZE {
            return Err(BakeError::InvalidArg(format!(
                "pool size {size} must exceed the {HEADER_SIZE}-byte header"
            )));
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(pmem_io_error)?;
        file.set_len(size).map_err(pmem_io_error)?;

        let mmap = unsafe { MmapMut::map_mut(&file).map_err(pmem_io_error)? };
        let pool = PoolFile {
            mmap: UnsafeCell::new(mmap),
            capacity: size,
        };

        let target_id = TargetId::generate();
        pool.raw_mut()[MAGIC_OFFSET..MAGIC_OFFSET + 8].copy_from_slice(MAGIC);
        pool.raw_mut()[TARGET_ID_OFFSET..TARGET_ID_OFFSET + 16]
            .copy_from_slice(target_id.as_bytes());
        pool.write_next_offset(0);
        pool.flush_header()?;

        Ok((target_id, pool))
    }

    /// Opens an existing pool file, validating the header the way
    /// `bake_pmem_backend_initialize` validates that `pool_id` isn't nil.
    pub fn open(path: &Path) -> Result<(TargetId, u64, Self), BakeError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(pmem_io_error)?;
        let capacity = file.metadata().map_err(pmem_io_error)?.len();
        if capacity <= HEADER_SIZE {
            return Err(BakeError::Pmem(format!(
                "{} is too small to be a bake pool",
                path.display()
            )));
        }

        let mmap = unsafe { MmapMut::map_mut(&file).map_err(pmem_io_error)? };
        let pool = PoolFile {
            mmap: UnsafeCell::new(mmap),
            capacity,
        };

        if &pool.raw()[MAGIC_OFFSET..MAGIC_OFFSET + 8] != MAGIC {
            return Err(BakeError::Pmem(format!(
                "{} is not a bake pmem pool",
                path.display()
            )));
        }
        let mut id_bytes = [0u8; 16];
        id_bytes.copy_from_slice(&pool.raw()[TARGET_ID_OFFSET..TARGET_ID_OFFSET + 16]);
        let target_id = TargetId::from_bytes(id_bytes);
        if target_id.is_nil() {
            return Err(BakeError::UnknownTarget(format!(
                "{} is not properly initialized",
                path.display()
            )));
        }

        let next_offset = pool.read_next_offset();
        Ok((target_id, next_offset, pool))
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn data_capacity(&self) -> u64 {
        self.capacity - HEADER_SIZE
    }

    pub fn read_next_offset(&self) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.raw()[NEXT_OFFSET_OFFSET..NEXT_OFFSET_OFFSET + 8]);
        u64::from_le_bytes(bytes)
    }

    pub fn write_next_offset(&self, value: u64) {
        self.raw_mut()[NEXT_OFFSET_OFFSET..NEXT_OFFSET_OFFSET + 8]
            .copy_from_slice(&value.to_le_bytes());
    }

    /// Raw byte access to the data area starting at `HEADER_SIZE`.
    pub fn data_slice(&self, offset: u64, len: u64) -> &[u8] {
        let start = (HEADER_SIZE + offset) as usize;
        &self.raw()[start..start + len as usize]
    }

    #[allow(clippy::mut_from_ref)]
    pub fn data_slice_mut(&self, offset: u64, len: u64) -> &mut [u8] {
        let start = (HEADER_SIZE + offset) as usize;
        &mut self.raw_mut()[start..start + len as usize]
    }

    /// The address of a data-area offset in this process's address space
    /// (§4.3: only meaningful to a caller sharing it).
    pub fn data_addr(&self, offset: u64) -> u64 {
        self.data_slice(offset, 0).as_ptr() as u64
    }

    pub fn flush_header(&self) -> Result<(), BakeError> {
        self.flush_range(0, HEADER_SIZE)
    }

    pub fn flush_range(&self, file_offset: u64, len: u64) -> Result<(), BakeError> {
        let mmap = unsafe { &*self.mmap.get() };
        mmap.flush_range(file_offset as usize, len as usize)
            .map_err(pmem_io_error)
    }

    fn raw(&self) -> &[u8] {
        unsafe { &*self.mmap.get() }
    }

    #[allow(clippy::mut_from_ref)]
    fn raw_mut(&self) -> &mut [u8] {
        unsafe { (*self.mmap.get()).as_mut() }
    }
}

fn pmem_io_error(e: io::Error) -> BakeError {
    BakeError::Pmem(e.to_string())
}

/// Tracks the data area's bump cursor and a best-effort free list for
/// regions removed during this process's lifetime. The free list is not
/// persisted across a reopen — a known simplification of simulating PMEM
/// with a plain file (recorded as an Open Question in the design notes).
pub struct Allocator {
    next_offset: AtomicU64,
    capacity: u64,
    free_list: std::sync::Mutex<Vec<(u64, u64)>>,
}

impl Allocator {
    pub fn new(next_offset: u64, capacity: u64) -> Self {
        Allocator {
            next_offset: AtomicU64::new(next_offset),
            capacity,
            free_list: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Allocates `len` contiguous bytes, preferring a free-list slot that
    /// fits exactly before bumping the cursor.
    pub fn alloc(&self, len: u64) -> Result<u64, BakeError> {
        {
            let mut free = self.free_list.lock().expect("pmem free list poisoned");
            if let Some(pos) = free.iter().position(|&(_, slot_len)| slot_len >= len) {
                let (offset, _) = free.remove(pos);
                return Ok(offset);
            }
        }
        let offset = self
            .next_offset
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |cur| {
                if cur + len <= self.capacity {
                    Some(cur + len)
                } else {
                    None
                }
            })
            .map_err(|_| BakeError::Allocation("pmem pool is out of space".into()))?;
        Ok(offset)
    }

    pub fn free(&self, offset: u64, len: u64) {
        self.free_list
            .lock()
            .expect("pmem free list poisoned")
            .push((offset, len));
    }

    pub fn cursor(&self) -> u64 {
        self.next_offset.load(Ordering::SeqCst)
    }
}

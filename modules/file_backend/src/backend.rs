//! `bake_file_backend::FileBackend` — the [`Backend`] implementation over a
//! single-file, block-aligned log (§4.2, §4.4). Bulk transfers are driven
//! through [`bake_transfer`]'s pipeline; this backend cannot start without
//! one, mirroring the upstream backend's hard requirement for pipelining.

use crate::log::FileLog;
use async_trait::async_trait;
use bake_backend::{AlignedBuffer, Backend, BulkHandle};
use bake_common::{BackendTag, BakeError, FileLocator, RegionId, TargetId};
use bake_transfer::{transfer, BufferPool, Direction, LogIo};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub struct FileBackend {
    log: Arc<FileLog>,
    pool: Arc<BufferPool>,
    /// Upper bound on chunks of any one transfer against this target that
    /// may be in flight at once, independent of the pool's own capacity
    /// (§3's per-target transfer concurrency limit, `target-concurrency`).
    target_concurrency: usize,
    path: PathBuf,
    /// Log offsets of regions this backend has removed. The log's allocation
    /// cursor never reuses a removed region's space (§4.2 "remove"), so
    /// unlike the pmem backend a tombstone here is never cleared.
    removed: Mutex<HashSet<i64>>,
}

impl FileBackend {
    /// Formats a fresh log file (the `mkpool` front end's file path), its
    /// blocks sized to `alignment` (the configured `block-size`).
    pub fn create_pool(path: &Path, alignment: u64) -> Result<TargetId, BakeError> {
        FileLog::create_pool(path, alignment)
    }

    /// Opens an existing log file. `pool` is the provider's shared buffer
    /// pool; a file target cannot be initialized without one (§4.4). The
    /// log's block alignment is taken from `pool.alignment()` so the log and
    /// the buffers it's read and written through always agree.
    pub fn open(
        path: &Path,
        pool: Arc<BufferPool>,
        target_concurrency: usize,
    ) -> Result<Self, BakeError> {
        let log = FileLog::open(path, pool.alignment())?;
        Ok(FileBackend {
            log: Arc::new(log),
            pool,
            target_concurrency,
            path: path.to_path_buf(),
            removed: Mutex::new(HashSet::new()),
        })
    }

    pub fn target_id(&self) -> TargetId {
        self.log.target_id()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn locator(&self, rid: RegionId) -> Result<FileLocator, BakeError> {
        let locator = FileLocator::from_region_id(&rid)?;
        if self
            .removed
            .lock()
            .expect("file backend removed-set poisoned")
            .contains(&locator.log_offset)
        {
            return Err(BakeError::UnknownRegion(format!(
                "region at log offset {} was removed",
                locator.log_offset
            )));
        }
        Ok(locator)
    }
}

#[async_trait]
impl Backend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    fn tag(&self) -> BackendTag {
        BackendTag::FILE
    }

    async fn create(&self, size: u64) -> Result<RegionId, BakeError> {
        let rounded = crate::io::align_up(size.max(1), self.log.alignment());
        let offset = self.log.reserve(rounded)?;
        let locator = FileLocator {
            log_offset: offset as i64,
            log_length: rounded,
        };
        Ok(locator.into_region_id())
    }

    async fn write_raw(&self, rid: RegionId, offset: u64, data: &[u8]) -> Result<(), BakeError> {
        let locator = self.locator(rid)?;
        self.log
            .write_region_raw(locator.log_offset as u64, locator.log_length, offset, data)
            .await
    }

    async fn write_bulk(
        &self,
        rid: RegionId,
        region_offset: u64,
        size: u64,
        bulk: Arc<dyn BulkHandle>,
        bulk_offset: u64,
    ) -> Result<(), BakeError> {
        if region_offset != 0 {
            return Err(BakeError::op_unsupported(
                "write_bulk at a nonzero region offset",
            ));
        }
        let locator = self.locator(rid)?;
        bounds_check(region_offset, size, locator.log_length)?;
        let log: Arc<dyn LogIo> = self.log.clone();
        transfer(
            log,
            locator.log_offset as u64,
            region_offset,
            size,
            bulk,
            bulk_offset,
            self.pool.clone(),
            self.target_concurrency,
            Direction::Write,
        )
        .await?;
        Ok(())
    }

    async fn read_raw(
        &self,
        rid: RegionId,
        offset: u64,
        size: u64,
    ) -> Result<AlignedBuffer, BakeError> {
        let locator = self.locator(rid)?;
        self.log
            .read_region_raw(locator.log_offset as u64, locator.log_length, offset, size)
            .await
    }

    async fn read_bulk(
        &self,
        rid: RegionId,
        region_offset: u64,
        size: u64,
        bulk: Arc<dyn BulkHandle>,
        bulk_offset: u64,
    ) -> Result<u64, BakeError> {
        let locator = self.locator(rid)?;
        bounds_check(region_offset, size, locator.log_length)?;
        let log: Arc<dyn LogIo> = self.log.clone();
        transfer(
            log,
            locator.log_offset as u64,
            region_offset,
            size,
            bulk,
            bulk_offset,
            self.pool.clone(),
            self.target_concurrency,
            Direction::Read,
        )
        .await
    }

    async fn persist(&self, _rid: RegionId, _offset: u64, _size: u64) -> Result<(), BakeError> {
        // There is no portable way to flush only part of the log; every
        // persist syncs the whole file, same as upstream.
        self.log.persist_all().await
    }

    async fn remove(&self, rid: RegionId) -> Result<(), BakeError> {
        let locator = self.locator(rid)?;
        self.log
            .remove_region(locator.log_offset as u64, locator.log_length)
            .await?;
        self.removed
            .lock()
            .expect("file backend removed-set poisoned")
            .insert(locator.log_offset);
        Ok(())
    }
}

fn bounds_check(offset: u64, size: u64, region_len: u64) -> Result<(), BakeError> {
    if offset + size > region_len {
        return Err(BakeError::OutOfBounds(format!(
            "{offset}+{size} exceeds region length {region_len}"
        )));
    }
    Ok(())
}

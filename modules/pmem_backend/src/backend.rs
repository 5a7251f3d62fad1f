//! `bake_pmem_backend::PmemBackend` — the [`Backend`] implementation over a
//! [`PoolFile`]. Bulk transfers pull or push directly into the mapping
//! instead of going through [`bake_transfer`]'s pipeline: the pool's bytes
//! are already addressable memory, so there is no O_DIRECT alignment
//! constraint to stage around (contrast the file backend, §4.4).

use crate::pool::{Allocator, PoolFile};
use async_trait::async_trait;
use bake_backend::{Backend, BulkHandle, LocalBulkSource};
use bake_common::{BackendTag, BakeError, PmemOid, RegionId, TargetId};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Every allocation reserves this many bytes ahead of the caller's data to
/// record the region's logical size (the original's `region_content_t.size`
/// field, made unconditional rather than built behind
/// `USE_SIZECHECK_HEADERS`, since `get_region_size` must always work here).
const SIZE_HEADER_LEN: u64 = 8;

pub struct PmemBackend {
    target_id: TargetId,
    pool_uuid_lo: u64,
    pool: Arc<PoolFile>,
    allocator: Allocator,
    path: PathBuf,
    /// Data offsets of regions removed from this backend since it was
    /// opened. Checked by [`PmemBackend::oid_for`] so a removed region's id
    /// reports `UnknownRegion` instead of resolving to stale bytes; cleared
    /// on `create` so a slot the allocator hands back out (§4.2 "remove")
    /// becomes a live region again.
    removed: Mutex<HashSet<u64>>,
}

impl PmemBackend {
    /// Creates a brand-new pool file (the `mkpool` front end's pmem path).
    pub fn create_pool(path: &Path, size: u64) -> Result<TargetId, BakeError> {
        let (target_id, _pool) = PoolFile::create(path, size)?;
        Ok(target_id)
    }

    /// Opens an existing pool file (the server daemon's startup path).
    pub fn open(path: &Path) -> Result<Self, BakeError> {
        let (target_id, next_offset, pool) = PoolFile::open(path)?;
        let capacity = pool.data_capacity();
        Ok(PmemBackend {
            target_id,
            pool_uuid_lo: pool_uuid_lo(&target_id),
            pool: Arc::new(pool),
            allocator: Allocator::new(next_offset, capacity),
            path: path.to_path_buf(),
            removed: Mutex::new(HashSet::new()),
        })
    }

    pub fn target_id(&self) -> TargetId {
        self.target_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn oid_for(&self, rid: RegionId) -> Result<PmemOid, BakeError> {
        let oid = PmemOid::from_region_id(&rid)?;
        if self
            .removed
            .lock()
            .expect("pmem removed-set poisoned")
            .contains(&oid.offset)
        {
            return Err(BakeError::UnknownRegion(format!(
                "region at offset {} was removed",
                oid.offset
            )));
        }
        Ok(oid)
    }

    fn region_len(&self, data_offset: u64) -> u64 {
        let header = self.pool.data_slice(data_offset - SIZE_HEADER_LEN, SIZE_HEADER_LEN);
        u64::from_le_bytes(header.try_into().expect("size header is 8 bytes"))
    }

    fn bounds_check(&self, rid: RegionId, offset: u64, len: u64) -> Result<PmemOid, BakeError> {
        let oid = self.oid_for(rid)?;
        let region_len = self.region_len(oid.offset);
        if offset + len > region_len {
            return Err(BakeError::OutOfBounds(format!(
                "{offset}+{len} exceeds region length {region_len}"
            )));
        }
        Ok(oid)
    }
}

#[async_trait]
impl Backend for PmemBackend {
    fn name(&self) -> &'static str {
        "pmem"
    }

    fn tag(&self) -> BackendTag {
        BackendTag::PMEM
    }

    async fn create(&self, size: u64) -> Result<RegionId, BakeError> {
        let total = SIZE_HEADER_LEN + size;
        let base = self.allocator.alloc(total)?;
        let data_offset = base + SIZE_HEADER_LEN;

        self.pool
            .data_slice_mut(base, SIZE_HEADER_LEN)
            .copy_from_slice(&size.to_le_bytes());
        self.pool.data_slice_mut(data_offset, size).fill(0);

        self.removed
            .lock()
            .expect("pmem removed-set poisoned")
            .remove(&data_offset);

        let oid = PmemOid {
            pool_uuid_lo: self.pool_uuid_lo,
            offset: data_offset,
        };
        Ok(oid.into_region_id())
    }

    async fn write_raw(&self, rid: RegionId, offset: u64, data: &[u8]) -> Result<(), BakeError> {
        let oid = self.bounds_check(rid, offset, data.len() as u64)?;
        self.pool
            .data_slice_mut(oid.offset + offset, data.len() as u64)
            .copy_from_slice(data);
        Ok(())
    }

    async fn write_bulk(
        &self,
        rid: RegionId,
        region_offset: u64,
        size: u64,
        bulk: Arc<dyn BulkHandle>,
        bulk_offset: u64,
    ) -> Result<(), BakeError> {
        let oid = self.bounds_check(rid, region_offset, size)?;
        let dest = self.pool.data_slice_mut(oid.offset + region_offset, size);
        bulk.pull(dest, bulk_offset).await
    }

    async fn read_raw(
        &self,
        rid: RegionId,
        offset: u64,
        size: u64,
    ) -> Result<bake_backend::AlignedBuffer, BakeError> {
        let oid = self.bounds_check(rid, offset, size)?;
        let mut buf = bake_backend::AlignedBuffer::new(size as usize, 8);
        buf.full_mut()[..size as usize]
            .copy_from_slice(self.pool.data_slice(oid.offset + offset, size));
        Ok(buf)
    }

    async fn read_bulk(
        &self,
        rid: RegionId,
        region_offset: u64,
        size: u64,
        bulk: Arc<dyn BulkHandle>,
        bulk_offset: u64,
    ) -> Result<u64, BakeError> {
        let oid = self.bounds_check(rid, region_offset, size)?;
        let src = self.pool.data_slice(oid.offset + region_offset, size);
        bulk.push(src, bulk_offset).await?;
        Ok(size)
    }

    async fn persist(&self, rid: RegionId, offset: u64, size: u64) -> Result<(), BakeError> {
        let oid = self.oid_for(rid)?;
        self.pool
            .flush_range(to_file_offset(oid.offset + offset), size.max(1))
    }

    fn get_region_size(&self, rid: RegionId) -> Result<u64, BakeError> {
        let oid = self.oid_for(rid)?;
        Ok(self.region_len(oid.offset))
    }

    fn get_region_data(&self, rid: RegionId) -> Result<u64, BakeError> {
        let oid = self.oid_for(rid)?;
        Ok(self.pool.data_addr(oid.offset))
    }

    async fn remove(&self, rid: RegionId) -> Result<(), BakeError> {
        let oid = self.oid_for(rid)?;
        let len = self.region_len(oid.offset);
        self.allocator.free(oid.offset - SIZE_HEADER_LEN, SIZE_HEADER_LEN + len);
        self.removed
            .lock()
            .expect("pmem removed-set poisoned")
            .insert(oid.offset);
        Ok(())
    }

    fn local_bulk_source(&self, rid: RegionId) -> Result<Arc<dyn LocalBulkSource>, BakeError> {
        let oid = self.oid_for(rid)?;
        let len = self.region_len(oid.offset);
        Ok(Arc::new(PmemRegionSource {
            pool: self.pool.clone(),
            offset: oid.offset,
            len,
        }))
    }
}

fn to_file_offset(data_offset: u64) -> u64 {
    data_offset + crate::pool::HEADER_SIZE
}

fn pool_uuid_lo(target_id: &TargetId) -> u64 {
    let bytes = target_id.as_bytes();
    let mut lo = [0u8; 8];
    lo.copy_from_slice(&bytes[0..8]);
    u64::from_le_bytes(lo)
}

struct PmemRegionSource {
    pool: Arc<PoolFile>,
    offset: u64,
    len: u64,
}

#[async_trait]
impl LocalBulkSource for PmemRegionSource {
    async fn read_at(&self, offset: u64, len: u64) -> Result<Vec<u8>, BakeError> {
        if offset + len > self.len {
            return Err(BakeError::OutOfBounds(format!(
                "{offset}+{len} exceeds region length {}",
                self.len
            )));
        }
        Ok(self.pool.data_slice(self.offset + offset, len).to_vec())
    }

    fn len(&self) -> u64 {
        self.len
    }
}

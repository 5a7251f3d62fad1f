//! `bake_backend` — the capability set every BAKE storage backend
//! implements (§4.2), plus the aligned-buffer and RDMA-fabric contracts the
//! concrete backends and the transfer engine are built against.

pub mod aligned;
pub mod fabric;

pub use aligned::AlignedBuffer;
pub use fabric::{BulkHandle, Fabric, LocalBulkSource, PeerId};

use async_trait::async_trait;
use bake_common::{BackendTag, BakeError, RegionId};
use std::sync::Arc;

/// The vtable every storage backend implements (§4.2). Optional operations
/// (`create_write_persist_*`, `get_region_size`, `get_region_data`,
/// `local_bulk_source`) default to `op_unsupported`; a backend overrides
/// only the ones it actually supports rather than the provider silently
/// succeeding.
#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    fn tag(&self) -> BackendTag;

    async fn create(&self, size: u64) -> Result<RegionId, BakeError>;

    async fn write_raw(&self, rid: RegionId, offset: u64, data: &[u8]) -> Result<(), BakeError>;

    async fn write_bulk(
        &self,
        rid: RegionId,
        region_offset: u64,
        size: u64,
        bulk: Arc<dyn BulkHandle>,
        bulk_offset: u64,
    ) -> Result<(), BakeError>;

    async fn read_raw(
        &self,
        rid: RegionId,
        offset: u64,
        size: u64,
    ) -> Result<AlignedBuffer, BakeError>;

    async fn read_bulk(
        &self,
        rid: RegionId,
        region_offset: u64,
        size: u64,
        bulk: Arc<dyn BulkHandle>,
        bulk_offset: u64,
    ) -> Result<u64, BakeError>;

    async fn persist(&self, rid: RegionId, offset: u64, size: u64) -> Result<(), BakeError>;

    /// Default composition: `create` + `write_raw` + `persist`. Backends
    /// may override with a more efficient fused path.
    async fn create_write_persist_raw(&self, data: &[u8]) -> Result<RegionId, BakeError> {
        let rid = self.create(data.len() as u64).await?;
        self.write_raw(rid, 0, data).await?;
        self.persist(rid, 0, data.len() as u64).await?;
        Ok(rid)
    }

    /// Default composition: `create` + `write_bulk` + `persist`.
    async fn create_write_persist_bulk(
        &self,
        size: u64,
        bulk: Arc<dyn BulkHandle>,
        bulk_offset: u64,
    ) -> Result<RegionId, BakeError> {
        let rid = self.create(size).await?;
        self.write_bulk(rid, 0, size, bulk, bulk_offset).await?;
        self.persist(rid, 0, size).await?;
        Ok(rid)
    }

    fn get_region_size(&self, _rid: RegionId) -> Result<u64, BakeError> {
        Err(BakeError::op_unsupported("get_region_size"))
    }

    /// Returns the region's address in this process's address space. Only
    /// meaningful to a caller sharing that address space (§4.3); callers
    /// must invoke `persist` themselves after writing through it.
    fn get_region_data(&self, _rid: RegionId) -> Result<u64, BakeError> {
        Err(BakeError::op_unsupported("get_region_data"))
    }

    async fn remove(&self, rid: RegionId) -> Result<(), BakeError>;

    /// Exposes a region's bytes for RDMA pull by a migration destination.
    /// Only backends that support `migrate_region` implement this; the
    /// provider uses its presence to decide whether migration is possible
    /// at all (§4.6 "Migrate-region").
    fn local_bulk_source(&self, _rid: RegionId) -> Result<Arc<dyn LocalBulkSource>, BakeError> {
        Err(BakeError::op_unsupported("migrate_region"))
    }
}

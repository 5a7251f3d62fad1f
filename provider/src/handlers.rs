//! Typed RPC handlers (§4.6, §4.7, §6). Each mirrors one `bake_*_ult`
//! handler: resolve the target, call the backend, map the result onto the
//! wire `*Out` struct's status code. [`crate::BakeProvider::dispatch`]
//! is the untyped entry point that decodes a request into the right one
//! of these and re-encodes its response.

use async_trait::async_trait;
use bake_backend::PeerId;
use bake_common::wire::*;
use bake_common::{BakeError, RegionId};

use crate::BakeProvider;

fn status_of<T>(rpc: &str, result: &Result<T, BakeError>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => {
            tracing::error!(rpc, error = %e, code = e.code().as_i32(), "rpc failed");
            e.code().as_i32()
        }
    }
}

/// The out-of-scope whole-target migration transport (REMI in the
/// original). Left unimplemented by default; a deployment that wants
/// `migrate_target` to actually move files supplies one.
#[async_trait]
pub trait TargetMigrator: Send + Sync {
    async fn migrate_target(
        &self,
        target_id: bake_common::TargetId,
        dest_addr: &str,
        dest_root: &str,
    ) -> Result<(), BakeError>;
}

pub struct UnsupportedMigrator;

#[async_trait]
impl TargetMigrator for UnsupportedMigrator {
    async fn migrate_target(
        &self,
        _target_id: bake_common::TargetId,
        _dest_addr: &str,
        _dest_root: &str,
    ) -> Result<(), BakeError> {
        Err(BakeError::op_unsupported("migrate_target"))
    }
}

impl BakeProvider {
    #[tracing::instrument(skip(self, req))]
    pub async fn handle_create(&self, req: CreateIn) -> CreateOut {
        let result = async {
            let backend = self.registry.get(&req.target_id)?;
            backend.create(req.region_size).await
        }
        .await;
        CreateOut {
            status: status_of("create", &result),
            region_id: result.ok(),
        }
    }

    #[tracing::instrument(skip(self, req))]
    pub async fn handle_write(&self, caller: &PeerId, req: WriteIn) -> WriteOut {
        let result = async {
            let backend = self.registry.get(&req.target_id)?;
            let peer = self.resolve_peer(caller, &req.remote_addr).await?;
            let bulk = self.fabric.open_bulk(&req.bulk_handle, &peer).await?;
            backend
                .write_bulk(req.region_id, req.region_offset, req.bulk_size, bulk, req.bulk_offset)
                .await
        }
        .await;
        WriteOut {
            status: status_of("write", &result),
        }
    }

    #[tracing::instrument(skip(self, req))]
    pub async fn handle_eager_write(&self, req: EagerWriteIn) -> EagerWriteOut {
        let result = async {
            self.check_eager_size(req.bytes.len())?;
            let backend = self.registry.get(&req.target_id)?;
            backend
                .write_raw(req.region_id, req.region_offset, &req.bytes)
                .await
        }
        .await;
        EagerWriteOut {
            status: status_of("eager_write", &result),
        }
    }

    #[tracing::instrument(skip(self, req))]
    pub async fn handle_persist(&self, req: PersistIn) -> PersistOut {
        let result = async {
            let backend = self.registry.get(&req.target_id)?;
            backend.persist(req.region_id, req.offset, req.size).await
        }
        .await;
        PersistOut {
            status: status_of("persist", &result),
        }
    }

    #[tracing::instrument(skip(self, req))]
    pub async fn handle_create_write_persist(
        &self,
        caller: &PeerId,
        req: CreateWritePersistIn,
    ) -> CreateWritePersistOut {
        let result: Result<RegionId, BakeError> = async {
            let backend = self.registry.get(&req.target_id)?;
            let peer = self.resolve_peer(caller, &req.remote_addr).await?;
            let bulk = self.fabric.open_bulk(&req.bulk_handle, &peer).await?;
            backend
                .create_write_persist_bulk(req.size, bulk, req.bulk_offset)
                .await
        }
        .await;
        CreateWritePersistOut {
            status: status_of("create_write_persist", &result),
            region_id: result.ok(),
        }
    }

    #[tracing::instrument(skip(self, req))]
    pub async fn handle_eager_create_write_persist(
        &self,
        req: EagerCreateWritePersistIn,
    ) -> EagerCreateWritePersistOut {
        let result = async {
            self.check_eager_size(req.bytes.len())?;
            let backend = self.registry.get(&req.target_id)?;
            backend.create_write_persist_raw(&req.bytes).await
        }
        .await;
        EagerCreateWritePersistOut {
            status: status_of("eager_create_write_persist", &result),
            region_id: result.ok(),
        }
    }

    #[tracing::instrument(skip(self, req))]
    pub async fn handle_read(&self, caller: &PeerId, req: ReadIn) -> ReadOut {
        let result = async {
            let backend = self.registry.get(&req.target_id)?;
            let peer = self.resolve_peer(caller, &req.remote_addr).await?;
            let bulk = self.fabric.open_bulk(&req.bulk_handle, &peer).await?;
            backend
                .read_bulk(req.region_id, req.region_offset, req.bulk_size, bulk, req.bulk_offset)
                .await
        }
        .await;
        ReadOut {
            status: status_of("read", &result),
            bytes_read: result.unwrap_or(0),
        }
    }

    #[tracing::instrument(skip(self, req))]
    pub async fn handle_eager_read(&self, req: EagerReadIn) -> EagerReadOut {
        let result = async {
            self.check_eager_size(req.size as usize)?;
            let backend = self.registry.get(&req.target_id)?;
            backend
                .read_raw(req.region_id, req.region_offset, req.size)
                .await
        }
        .await;
        match result {
            Ok(buf) => EagerReadOut {
                status: 0,
                size: buf.len() as u64,
                bytes: buf.to_vec(),
            },
            Err(e) => {
                tracing::error!(rpc = "eager_read", error = %e, code = e.code().as_i32(), "rpc failed");
                EagerReadOut {
                    status: e.code().as_i32(),
                    size: 0,
                    bytes: Vec::new(),
                }
            }
        }
    }

    #[tracing::instrument(skip(self, req))]
    pub async fn handle_get_size(&self, req: GetSizeIn) -> GetSizeOut {
        let result = async {
            let backend = self.registry.get(&req.target_id)?;
            backend.get_region_size(req.region_id)
        }
        .await;
        GetSizeOut {
            status: status_of("get_size", &result),
            size: result.unwrap_or(0),
        }
    }

    #[tracing::instrument(skip(self, req))]
    pub async fn handle_get_data(&self, req: GetDataIn) -> GetDataOut {
        let result = async {
            let backend = self.registry.get(&req.target_id)?;
            backend.get_region_data(req.region_id)
        }
        .await;
        GetDataOut {
            status: status_of("get_data", &result),
            ptr: result.unwrap_or(0),
        }
    }

    /// §4.6 "Probe": with `max_targets > 0`, returns up to that many IDs
    /// and the number actually returned; with `max_targets == 0` no IDs are
    /// returned but `num_targets` still reports the total so a client can
    /// size a buffer before asking again (§8 scenario 4).
    #[tracing::instrument(skip(self, req))]
    pub async fn handle_probe(&self, req: ProbeIn) -> ProbeOut {
        if req.max_targets == 0 {
            return ProbeOut {
                status: 0,
                num_targets: self.registry.len() as u32,
                target_ids: Vec::new(),
            };
        }
        let target_ids = self.registry.probe(req.max_targets as usize);
        ProbeOut {
            status: 0,
            num_targets: target_ids.len() as u32,
            target_ids,
        }
    }

    #[tracing::instrument(skip(self, req))]
    pub async fn handle_remove(&self, req: RemoveIn) -> RemoveOut {
        let result = async {
            let backend = self.registry.get(&req.target_id)?;
            backend.remove(req.region_id).await
        }
        .await;
        RemoveOut {
            status: status_of("remove", &result),
        }
    }

    #[tracing::instrument(skip(self, _req))]
    pub async fn handle_noop(&self, _req: NoopIn) -> NoopOut {
        NoopOut { status: 0 }
    }

    #[tracing::instrument(skip(self, _req))]
    pub async fn handle_shutdown(&self, _req: ShutdownIn) -> ShutdownOut {
        tracing::info!("shutdown rpc received");
        self.shutdown.notify_waiters();
        ShutdownOut { status: 0 }
    }

    #[tracing::instrument(skip(self, req))]
    pub async fn handle_migrate_region(&self, req: MigrateRegionIn) -> MigrateRegionOut {
        let result = self.migrate_region_inner(req).await;
        MigrateRegionOut {
            status: status_of("migrate_region", &result),
            dest_region_id: result.ok(),
        }
    }

    async fn migrate_region_inner(&self, req: MigrateRegionIn) -> Result<RegionId, BakeError> {
        let backend = self.registry.get(&req.src_target_id)?;
        let source = backend.local_bulk_source(req.src_region_id)?;
        let token = self.fabric.expose_local(source).await?;
        let peer = self.fabric.resolve_addr(&req.dest_addr).await?;

        let cwp_in = CreateWritePersistIn {
            target_id: req.dest_target_id,
            size: req.region_size,
            offset: 0,
            bulk_handle: token,
            bulk_offset: 0,
            bulk_size: req.region_size,
            remote_addr: None,
        };
        let request = serde_json::to_vec(&cwp_in)
            .map_err(|e| BakeError::Mercury(format!("encoding create_write_persist: {e}")))?;
        let response = self
            .fabric
            .call_rpc(&peer, rpc_name::CREATE_WRITE_PERSIST, request)
            .await?;
        let cwp_out: CreateWritePersistOut = serde_json::from_slice(&response)
            .map_err(|e| BakeError::Mercury(format!("decoding create_write_persist: {e}")))?;
        if cwp_out.status != 0 {
            return Err(BakeError::Remi(format!(
                "destination create_write_persist failed with status {}",
                cwp_out.status
            )));
        }
        let dest_rid = cwp_out
            .region_id
            .ok_or_else(|| BakeError::Remi("destination returned no region id".into()))?;

        if req.remove_source {
            backend.remove(req.src_region_id).await?;
        }
        Ok(dest_rid)
    }

    #[tracing::instrument(skip(self, req))]
    pub async fn handle_migrate_target(&self, req: MigrateTargetIn) -> MigrateTargetOut {
        let result = self
            .migrator
            .migrate_target(req.target_id, &req.dest_addr, &req.dest_root)
            .await
            .and_then(|()| {
                if req.remove_source {
                    self.registry.detach(&req.target_id);
                }
                Ok(())
            });
        MigrateTargetOut {
            status: status_of("migrate_target", &result),
        }
    }

    async fn resolve_peer(
        &self,
        caller: &PeerId,
        remote_addr: &Option<String>,
    ) -> Result<PeerId, BakeError> {
        match remote_addr {
            Some(addr) => self.fabric.resolve_addr(addr).await,
            None => Ok(caller.clone()),
        }
    }

    fn check_eager_size(&self, len: usize) -> Result<(), BakeError> {
        if len > self.config.eager_limit {
            return Err(BakeError::InvalidArg(format!(
                "eager transfer of {len} bytes exceeds the {}-byte eager limit",
                self.config.eager_limit
            )));
        }
        Ok(())
    }
}

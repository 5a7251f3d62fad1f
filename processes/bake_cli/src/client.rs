//! A minimal client over the [`Fabric`] contract. The original's
//! client-side provider-handle cache is out of scope; this is just the thin
//! per-call wrapper the CLI front-ends drive directly instead of keeping a
//! handle around between invocations.

use bake_backend::{Fabric, PeerId};
use bake_common::wire::*;
use bake_common::{BakeError, RegionId, TargetId};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

pub struct BakeClient {
    fabric: Arc<dyn Fabric>,
    peer: PeerId,
}

impl BakeClient {
    /// Resolves `addr` through `fabric` and binds every subsequent call to
    /// that peer.
    pub async fn connect(fabric: Arc<dyn Fabric>, addr: &str) -> Result<Self, BakeError> {
        let peer = fabric.resolve_addr(addr).await?;
        Ok(BakeClient { fabric, peer })
    }

    async fn call<In: Serialize, Out: DeserializeOwned>(
        &self,
        name: &str,
        req: In,
    ) -> Result<Out, BakeError> {
        let body =
            serde_json::to_vec(&req).map_err(|e| BakeError::Mercury(format!("encoding {name}: {e}")))?;
        let response = self.fabric.call_rpc(&self.peer, name, body).await?;
        serde_json::from_slice(&response)
            .map_err(|e| BakeError::Mercury(format!("decoding {name} response: {e}")))
    }

    pub async fn probe(&self, max_targets: u32) -> Result<Vec<TargetId>, BakeError> {
        let out: ProbeOut = self.call(rpc_name::PROBE, ProbeIn { max_targets }).await?;
        if out.status != 0 {
            return Err(BakeError::from_remote_status(out.status));
        }
        Ok(out.target_ids)
    }

    /// Probes with a growing buffer until it sees every target, matching
    /// the glossary's "clients iterate with doubling buffers" convention
    /// for `max_targets == 0`.
    pub async fn probe_all(&self) -> Result<Vec<TargetId>, BakeError> {
        let count_out: ProbeOut = self.call(rpc_name::PROBE, ProbeIn { max_targets: 0 }).await?;
        if count_out.status != 0 {
            return Err(BakeError::from_remote_status(count_out.status));
        }
        let mut max_targets = count_out.num_targets.max(1);
        loop {
            let targets = self.probe(max_targets).await?;
            if targets.len() as u32 >= count_out.num_targets {
                return Ok(targets);
            }
            max_targets *= 2;
        }
    }

    pub async fn shutdown(&self) -> Result<(), BakeError> {
        let out: ShutdownOut = self.call(rpc_name::SHUTDOWN, ShutdownIn).await?;
        status_to_result(out.status, ())
    }

    pub async fn eager_create_write_persist(
        &self,
        target_id: TargetId,
        bytes: Vec<u8>,
    ) -> Result<RegionId, BakeError> {
        let out: EagerCreateWritePersistOut = self
            .call(
                rpc_name::EAGER_CREATE_WRITE_PERSIST,
                EagerCreateWritePersistIn {
                    target_id,
                    size: bytes.len() as u64,
                    bytes,
                },
            )
            .await?;
        status_to_option(out.status, out.region_id)
    }

    pub async fn eager_read(
        &self,
        target_id: TargetId,
        region_id: RegionId,
        size: u64,
    ) -> Result<Vec<u8>, BakeError> {
        let out: EagerReadOut = self
            .call(
                rpc_name::EAGER_READ,
                EagerReadIn {
                    target_id,
                    region_id,
                    region_offset: 0,
                    size,
                },
            )
            .await?;
        status_to_result(out.status, out.bytes)
    }

    pub async fn remove(&self, target_id: TargetId, region_id: RegionId) -> Result<(), BakeError> {
        let out: RemoveOut = self.call(rpc_name::REMOVE, RemoveIn { target_id, region_id }).await?;
        status_to_result(out.status, ())
    }
}

fn status_to_result<T>(status: i32, value: T) -> Result<T, BakeError> {
    if status != 0 {
        return Err(BakeError::from_remote_status(status));
    }
    Ok(value)
}

fn status_to_option<T>(status: i32, value: Option<T>) -> Result<T, BakeError> {
    if status != 0 {
        return Err(BakeError::from_remote_status(status));
    }
    value.ok_or_else(|| BakeError::Mercury("missing payload despite a success status".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bake_pmem_backend::PmemBackend;
    use bake_provider::loopback::LoopbackFabric;
    use bake_provider::BakeProvider;
    use std::sync::Arc as StdArc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn client_round_trips_through_a_loopback_provider() {
        let fabric = LoopbackFabric::new();
        let provider = BakeProvider::new(1, fabric.clone());
        fabric.register_provider("self", provider.clone());

        let dir = tempdir().unwrap();
        let path = dir.path().join("pmem.pool");
        let target_id = PmemBackend::create_pool(&path, 1 << 20).unwrap();
        provider.attach_target(target_id, StdArc::new(PmemBackend::open(&path).unwrap()));

        let client = BakeClient::connect(fabric.clone(), "self").await.unwrap();
        let targets = client.probe_all().await.unwrap();
        assert_eq!(targets, vec![target_id]);

        let payload = b"hello from the cli client".to_vec();
        let rid = client
            .eager_create_write_persist(target_id, payload.clone())
            .await
            .unwrap();
        let read_back = client
            .eager_read(target_id, rid, payload.len() as u64)
            .await
            .unwrap();
        assert_eq!(read_back, payload);

        client.remove(target_id, rid).await.unwrap();
        let err = client
            .eager_read(target_id, rid, payload.len() as u64)
            .await
            .unwrap_err();
        assert_eq!(err.code(), bake_common::ErrorCode::UnknownRegion);
    }

    #[tokio::test]
    async fn shutdown_wakes_the_provider() {
        let fabric = LoopbackFabric::new();
        let provider = BakeProvider::new(1, fabric.clone());
        fabric.register_provider("self", provider.clone());

        let client = BakeClient::connect(fabric.clone(), "self").await.unwrap();
        let waiter = provider.clone();
        let wait_handle = tokio::spawn(async move { waiter.wait_for_shutdown().await });
        client.shutdown().await.unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), wait_handle)
            .await
            .expect("shutdown should have woken the waiter")
            .unwrap();
    }
}

//! A same-process stand-in for the RDMA/RPC fabric (§1 "Out of scope"),
//! used for integration tests and single-host deployment where every
//! provider the daemon talks to is registered in this same process. It
//! satisfies the [`Fabric`] contract without touching a real transport.

use async_trait::async_trait;
use bake_backend::{BulkHandle, Fabric, LocalBulkSource, PeerId};
use bake_common::{wire::BulkToken, BakeError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::BakeProvider;

#[derive(Default)]
pub struct LoopbackFabric {
    providers: Mutex<HashMap<String, Arc<BakeProvider>>>,
    bulk_table: Mutex<HashMap<u64, Arc<dyn LocalBulkSource>>>,
    next_token: AtomicU64,
}

impl LoopbackFabric {
    pub fn new() -> Arc<Self> {
        Arc::new(LoopbackFabric::default())
    }

    /// Registers a provider under an address other providers can reach it
    /// at through `resolve_addr`/`call_rpc`.
    pub fn register_provider(&self, addr: &str, provider: Arc<BakeProvider>) {
        self.providers
            .lock()
            .expect("loopback provider table poisoned")
            .insert(addr.to_string(), provider);
    }
}

#[async_trait]
impl Fabric for LoopbackFabric {
    async fn resolve_addr(&self, addr: &str) -> Result<PeerId, BakeError> {
        if self
            .providers
            .lock()
            .expect("loopback provider table poisoned")
            .contains_key(addr)
        {
            Ok(PeerId(addr.to_string()))
        } else {
            Err(BakeError::Mercury(format!("unknown loopback peer {addr}")))
        }
    }

    async fn open_bulk(
        &self,
        token: &BulkToken,
        _peer: &PeerId,
    ) -> Result<Arc<dyn BulkHandle>, BakeError> {
        let id: u64 = token
            .0
            .parse()
            .map_err(|_| BakeError::InvalidArg(format!("malformed bulk token '{}'", token.0)))?;
        let source = self
            .bulk_table
            .lock()
            .expect("loopback bulk table poisoned")
            .get(&id)
            .cloned()
            .ok_or_else(|| BakeError::InvalidArg(format!("unknown bulk token '{}'", token.0)))?;
        Ok(Arc::new(LocalSourceAsBulkHandle(source)))
    }

    async fn expose_local(
        &self,
        source: Arc<dyn LocalBulkSource>,
    ) -> Result<BulkToken, BakeError> {
        let id = self.next_token.fetch_add(1, Ordering::SeqCst);
        self.bulk_table
            .lock()
            .expect("loopback bulk table poisoned")
            .insert(id, source);
        Ok(BulkToken(id.to_string()))
    }

    async fn call_rpc(
        &self,
        peer: &PeerId,
        rpc_name: &str,
        request: Vec<u8>,
    ) -> Result<Vec<u8>, BakeError> {
        let provider = self
            .providers
            .lock()
            .expect("loopback provider table poisoned")
            .get(&peer.0)
            .cloned()
            .ok_or_else(|| BakeError::Mercury(format!("unknown loopback peer {}", peer.0)))?;
        provider
            .dispatch(rpc_name, PeerId("loopback-caller".into()), request)
            .await
    }
}

/// Exposes a read-only [`LocalBulkSource`] as a [`BulkHandle`] a migration
/// destination can pull from. Pushing into it is meaningless — migration
/// only ever pulls from the source side — so `push` is unsupported.
struct LocalSourceAsBulkHandle(Arc<dyn LocalBulkSource>);

#[async_trait]
impl BulkHandle for LocalSourceAsBulkHandle {
    async fn pull(&self, local: &mut [u8], remote_offset: u64) -> Result<(), BakeError> {
        let bytes = self.0.read_at(remote_offset, local.len() as u64).await?;
        local.copy_from_slice(&bytes);
        Ok(())
    }

    async fn push(&self, _local: &[u8], _remote_offset: u64) -> Result<(), BakeError> {
        Err(BakeError::op_unsupported(
            "push into a read-only migration source",
        ))
    }

    fn remote_size(&self) -> Option<u64> {
        Some(self.0.len())
    }
}

/// A plain in-memory bulk region, used by tests to stand in for a client's
/// registered memory: both a [`BulkHandle`] a provider can pull from or
/// push into, and a [`LocalBulkSource`] a migration can read from.
pub struct MemoryRegion {
    bytes: Mutex<Vec<u8>>,
}

impl MemoryRegion {
    pub fn new(bytes: Vec<u8>) -> Arc<Self> {
        Arc::new(MemoryRegion {
            bytes: Mutex::new(bytes),
        })
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.lock().expect("memory region poisoned").clone()
    }
}

#[async_trait]
impl BulkHandle for MemoryRegion {
    async fn pull(&self, local: &mut [u8], remote_offset: u64) -> Result<(), BakeError> {
        let bytes = self.bytes.lock().expect("memory region poisoned");
        let start = remote_offset as usize;
        local.copy_from_slice(&bytes[start..start + local.len()]);
        Ok(())
    }

    async fn push(&self, local: &[u8], remote_offset: u64) -> Result<(), BakeError> {
        let mut bytes = self.bytes.lock().expect("memory region poisoned");
        let start = remote_offset as usize;
        bytes[start..start + local.len()].copy_from_slice(local);
        Ok(())
    }

    fn remote_size(&self) -> Option<u64> {
        Some(self.bytes.lock().expect("memory region poisoned").len() as u64)
    }
}

#[async_trait]
impl LocalBulkSource for MemoryRegion {
    async fn read_at(&self, offset: u64, len: u64) -> Result<Vec<u8>, BakeError> {
        let bytes = self.bytes.lock().expect("memory region poisoned");
        let start = offset as usize;
        Ok(bytes[start..start + len as usize].to_vec())
    }

    fn len(&self) -> u64 {
        self.bytes.lock().expect("memory region poisoned").len() as u64
    }
}

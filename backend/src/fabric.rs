//! The RDMA/RPC fabric contract (§4.5, §9 "Pipelined-transfer coordination").
//!
//! The real transport — bulk-handle creation, bulk transfers, address
//! lookup and RPC dispatch over the wire — is out of scope here; the
//! transport itself (Mercury/Margo in the original) is an external
//! collaborator. What follows is the contract the core is built against;
//! `bake_provider`'s loopback fabric is a same-process stand-in used for
//! testing and single-host deployment, not a re-implementation of RDMA.

use async_trait::async_trait;
use bake_common::BakeError;
use std::sync::Arc;

/// A remote memory registration the core can pull from or push into. One
/// `BulkHandle` corresponds to one `hg_bulk_t` plus the `hg_addr_t` of
/// whoever registered it.
#[async_trait]
pub trait BulkHandle: Send + Sync {
    /// RDMA-pulls `local.len()` bytes from `remote_offset` in the remote
    /// registration into `local` (the "write" path: provider pulls client
    /// data in).
    async fn pull(&self, local: &mut [u8], remote_offset: u64) -> Result<(), BakeError>;

    /// RDMA-pushes `local` into the remote registration at `remote_offset`
    /// (the "read" path: provider pushes data out to the client).
    async fn push(&self, local: &[u8], remote_offset: u64) -> Result<(), BakeError>;

    /// Total size of the remote registration, when known.
    fn remote_size(&self) -> Option<u64> {
        None
    }
}

/// Opaque identity of a resolved peer address (an `hg_addr_t` analogue).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerId(pub String);

/// A source of bytes a local region exposes for a remote peer to RDMA-pull,
/// used when this provider is the *source* of a migration and must let the
/// destination pull the region's bytes (§4.3, §4.6 "Migrate-region").
#[async_trait]
pub trait LocalBulkSource: Send + Sync {
    async fn read_at(&self, offset: u64, len: u64) -> Result<Vec<u8>, BakeError>;
    fn len(&self) -> u64;
}

/// The address-lookup, bulk-handle and cross-provider RPC-call primitives
/// the core depends on but does not implement (§1 "Out of scope").
#[async_trait]
pub trait Fabric: Send + Sync {
    /// Resolves a textual address (as carried in `remote_addr`/`dest_addr`
    /// wire fields) into a peer identity.
    async fn resolve_addr(&self, addr: &str) -> Result<PeerId, BakeError>;

    /// Opens the bulk handle named by `token`, scoped to `peer`.
    async fn open_bulk(
        &self,
        token: &bake_common::wire::BulkToken,
        peer: &PeerId,
    ) -> Result<Arc<dyn BulkHandle>, BakeError>;

    /// Registers `source` for RDMA pull by a remote peer and returns the
    /// token a `create_write_persist_bulk` RPC to that peer should carry.
    async fn expose_local(
        &self,
        source: Arc<dyn LocalBulkSource>,
    ) -> Result<bake_common::wire::BulkToken, BakeError>;

    /// Invokes the named RPC on `peer` with an already-encoded request
    /// payload, returning the encoded response. Used only by migration,
    /// which must talk to another provider instance (§4.6).
    async fn call_rpc(
        &self,
        peer: &PeerId,
        rpc_name: &str,
        request: Vec<u8>,
    ) -> Result<Vec<u8>, BakeError>;
}

//! Wire RPC schema (§6). Every RPC has a stable name and a fixed, serde-
//! encodable in/out struct pair. Integers are whatever the transport's
//! codec makes canonical (little-endian on the wire); strings are length-
//! prefixed by the codec. Bulk handles are opaque tokens minted by the
//! out-of-scope RDMA runtime and resolved through the `Fabric` contract
//! (see `bake_transfer::fabric`).

use crate::ids::{RegionId, TargetId};
use serde::{Deserialize, Serialize};

pub mod rpc_name {
    pub const CREATE: &str = "create";
    pub const WRITE: &str = "write";
    pub const EAGER_WRITE: &str = "eager_write";
    pub const PERSIST: &str = "persist";
    pub const CREATE_WRITE_PERSIST: &str = "create_write_persist";
    pub const EAGER_CREATE_WRITE_PERSIST: &str = "eager_create_write_persist";
    pub const READ: &str = "read";
    pub const EAGER_READ: &str = "eager_read";
    pub const GET_SIZE: &str = "get_size";
    pub const GET_DATA: &str = "get_data";
    pub const PROBE: &str = "probe";
    pub const REMOVE: &str = "remove";
    pub const NOOP: &str = "noop";
    pub const MIGRATE_REGION: &str = "migrate_region";
    pub const MIGRATE_TARGET: &str = "migrate_target";
    pub const SHUTDOWN: &str = "shutdown";
}

/// An opaque token identifying an RDMA bulk handle created by the caller.
/// The fabric resolves this (plus a peer address) into a `BulkHandle`
/// (§4.2, §4.5); the core never interprets the bytes itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkToken(pub String);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateIn {
    pub target_id: TargetId,
    pub region_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOut {
    pub status: i32,
    pub region_id: Option<RegionId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteIn {
    pub target_id: TargetId,
    pub region_id: RegionId,
    pub region_offset: u64,
    pub bulk_handle: BulkToken,
    pub bulk_offset: u64,
    pub bulk_size: u64,
    pub remote_addr: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteOut {
    pub status: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EagerWriteIn {
    pub target_id: TargetId,
    pub region_id: RegionId,
    pub region_offset: u64,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EagerWriteOut {
    pub status: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistIn {
    pub target_id: TargetId,
    pub region_id: RegionId,
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistOut {
    pub status: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWritePersistIn {
    pub target_id: TargetId,
    pub size: u64,
    pub offset: u64,
    pub bulk_handle: BulkToken,
    pub bulk_offset: u64,
    pub bulk_size: u64,
    pub remote_addr: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWritePersistOut {
    pub status: i32,
    pub region_id: Option<RegionId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EagerCreateWritePersistIn {
    pub target_id: TargetId,
    pub size: u64,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EagerCreateWritePersistOut {
    pub status: i32,
    pub region_id: Option<RegionId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadIn {
    pub target_id: TargetId,
    pub region_id: RegionId,
    pub region_offset: u64,
    pub bulk_handle: BulkToken,
    pub bulk_offset: u64,
    pub bulk_size: u64,
    pub remote_addr: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadOut {
    pub status: i32,
    pub bytes_read: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EagerReadIn {
    pub target_id: TargetId,
    pub region_id: RegionId,
    pub region_offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EagerReadOut {
    pub status: i32,
    pub size: u64,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetSizeIn {
    pub target_id: TargetId,
    pub region_id: RegionId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetSizeOut {
    pub status: i32,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetDataIn {
    pub target_id: TargetId,
    pub region_id: RegionId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetDataOut {
    pub status: i32,
    pub ptr: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeIn {
    pub max_targets: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeOut {
    pub status: i32,
    pub num_targets: u32,
    pub target_ids: Vec<TargetId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveIn {
    pub target_id: TargetId,
    pub region_id: RegionId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveOut {
    pub status: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoopIn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoopOut {
    pub status: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrateRegionIn {
    pub src_target_id: TargetId,
    pub src_region_id: RegionId,
    pub region_size: u64,
    pub remove_source: bool,
    pub dest_addr: String,
    pub dest_provider_id: u16,
    pub dest_target_id: TargetId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrateRegionOut {
    pub status: i32,
    pub dest_region_id: Option<RegionId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrateTargetIn {
    pub target_id: TargetId,
    pub remove_source: bool,
    pub dest_addr: String,
    pub dest_provider_id: u16,
    pub dest_root: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrateTargetOut {
    pub status: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownIn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownOut {
    pub status: i32,
}

impl Serialize for TargetId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for TargetId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes: Vec<u8> = Deserialize::deserialize(deserializer)?;
        let arr: [u8; 16] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("target id must be 16 bytes"))?;
        Ok(TargetId(arr))
    }
}

impl Serialize for RegionId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bytes(&self.to_wire_bytes())
    }
}

impl<'de> Deserialize<'de> for RegionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes: Vec<u8> = Deserialize::deserialize(deserializer)?;
        let arr: [u8; 4 + crate::ids::REGION_ID_DATA_SIZE] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("malformed region id on the wire"))?;
        Ok(RegionId::from_wire_bytes(&arr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_in_round_trips_through_json() {
        let msg = CreateIn {
            target_id: TargetId::generate(),
            region_size: 65536,
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: CreateIn = serde_json::from_str(&json).unwrap();
        assert_eq!(msg.target_id, back.target_id);
        assert_eq!(msg.region_size, back.region_size);
    }
}

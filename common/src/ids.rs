//! Target and region identifiers (§4.1). Both have a bit-exact wire encoding
//! (raw bytes) and a reversible ASCII text encoding.

use crate::error::BakeError;
use std::fmt;
use uuid::Uuid;

/// 16 random bytes, UUID v4 semantics. Generated once when a pool is
/// formatted and persisted in that pool's root record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub [u8; 16]);

impl TargetId {
    pub fn generate() -> Self {
        TargetId(*Uuid::new_v4().as_bytes())
    }

    pub fn is_nil(&self) -> bool {
        self.0 == [0u8; 16]
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        TargetId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn to_string_form(&self) -> String {
        Uuid::from_bytes(self.0).to_string()
    }

    pub fn from_str_form(s: &str) -> Result<Self, BakeError> {
        let uuid = Uuid::parse_str(s)
            .map_err(|e| BakeError::InvalidArg(format!("bad target id '{s}': {e}")))?;
        Ok(TargetId(*uuid.as_bytes()))
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_form())
    }
}

/// Which backend's decoder interprets a region id's opaque payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackendTag(pub u32);

impl BackendTag {
    pub const PMEM: BackendTag = BackendTag(1);
    pub const FILE: BackendTag = BackendTag(2);
}

/// Size of the opaque payload carried inside a [`RegionId`] (§4.1).
pub const REGION_ID_DATA_SIZE: usize = 24;

/// Fixed-width opaque handle: a 4-byte backend-discriminator tag plus up to
/// 24 bytes of backend-private payload. Valid only within the target that
/// allocated it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionId {
    pub tag: BackendTag,
    pub data: [u8; REGION_ID_DATA_SIZE],
}

impl fmt::Debug for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionId")
            .field("tag", &self.tag.0)
            .field("data", &hex::encode(self.data))
            .finish()
    }
}

impl RegionId {
    pub fn new(tag: BackendTag, payload: &[u8]) -> Self {
        assert!(payload.len() <= REGION_ID_DATA_SIZE);
        let mut data = [0u8; REGION_ID_DATA_SIZE];
        data[..payload.len()].copy_from_slice(payload);
        RegionId { tag, data }
    }

    /// Reversible ASCII text form: `tag:hex(payload)`.
    pub fn to_string_form(&self) -> String {
        format!("{}:{}", self.tag.0, hex::encode(self.data))
    }

    pub fn from_str_form(s: &str) -> Result<Self, BakeError> {
        let (tag_str, data_str) = s
            .split_once(':')
            .ok_or_else(|| BakeError::InvalidArg(format!("malformed region id '{s}'")))?;
        let tag: u32 = tag_str
            .parse()
            .map_err(|_| BakeError::InvalidArg(format!("malformed region tag in '{s}'")))?;
        let bytes = hex::decode(data_str)
            .map_err(|e| BakeError::InvalidArg(format!("malformed region payload: {e}")))?;
        if bytes.len() != REGION_ID_DATA_SIZE {
            return Err(BakeError::InvalidArg(format!(
                "region payload must be {REGION_ID_DATA_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        let mut data = [0u8; REGION_ID_DATA_SIZE];
        data.copy_from_slice(&bytes);
        Ok(RegionId {
            tag: BackendTag(tag),
            data,
        })
    }

    /// Wire form: the tag followed by the raw payload bytes.
    pub fn to_wire_bytes(&self) -> [u8; 4 + REGION_ID_DATA_SIZE] {
        let mut out = [0u8; 4 + REGION_ID_DATA_SIZE];
        out[..4].copy_from_slice(&self.tag.0.to_le_bytes());
        out[4..].copy_from_slice(&self.data);
        out
    }

    pub fn from_wire_bytes(bytes: &[u8; 4 + REGION_ID_DATA_SIZE]) -> Self {
        let tag = u32::from_le_bytes(bytes[..4].try_into().unwrap());
        let mut data = [0u8; REGION_ID_DATA_SIZE];
        data.copy_from_slice(&bytes[4..]);
        RegionId {
            tag: BackendTag(tag),
            data,
        }
    }
}

/// PMEM backend payload: a 16-byte object identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PmemOid {
    pub pool_uuid_lo: u64,
    pub offset: u64,
}

impl PmemOid {
    pub fn into_region_id(self) -> RegionId {
        let mut payload = [0u8; 16];
        payload[..8].copy_from_slice(&self.pool_uuid_lo.to_le_bytes());
        payload[8..].copy_from_slice(&self.offset.to_le_bytes());
        RegionId::new(BackendTag::PMEM, &payload)
    }

    pub fn from_region_id(rid: &RegionId) -> Result<Self, BakeError> {
        if rid.tag != BackendTag::PMEM {
            return Err(BakeError::BackendType(rid.tag.0));
        }
        let pool_uuid_lo = u64::from_le_bytes(rid.data[0..8].try_into().unwrap());
        let offset = u64::from_le_bytes(rid.data[8..16].try_into().unwrap());
        Ok(PmemOid {
            pool_uuid_lo,
            offset,
        })
    }
}

/// File backend payload: the log extent `(offset, length)` backing a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileLocator {
    pub log_offset: i64,
    pub log_length: u64,
}

impl FileLocator {
    pub fn into_region_id(self) -> RegionId {
        let mut payload = [0u8; 16];
        payload[..8].copy_from_slice(&self.log_offset.to_le_bytes());
        payload[8..].copy_from_slice(&self.log_length.to_le_bytes());
        RegionId::new(BackendTag::FILE, &payload)
    }

    pub fn from_region_id(rid: &RegionId) -> Result<Self, BakeError> {
        if rid.tag != BackendTag::FILE {
            return Err(BakeError::BackendType(rid.tag.0));
        }
        let log_offset = i64::from_le_bytes(rid.data[0..8].try_into().unwrap());
        let log_length = u64::from_le_bytes(rid.data[8..16].try_into().unwrap());
        Ok(FileLocator {
            log_offset,
            log_length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_id_round_trips_through_text() {
        let tid = TargetId::generate();
        let s = tid.to_string_form();
        assert_eq!(s.len(), 36);
        let back = TargetId::from_str_form(&s).unwrap();
        assert_eq!(tid, back);
    }

    #[test]
    fn region_id_round_trips_through_text() {
        let oid = PmemOid {
            pool_uuid_lo: 0xdead_beef,
            offset: 42,
        };
        let rid = oid.into_region_id();
        let s = rid.to_string_form();
        let back = RegionId::from_str_form(&s).unwrap();
        assert_eq!(rid, back);
        assert_eq!(PmemOid::from_region_id(&back).unwrap(), oid);
    }

    #[test]
    fn region_id_round_trips_through_wire() {
        let loc = FileLocator {
            log_offset: 4096,
            log_length: 8192,
        };
        let rid = loc.into_region_id();
        let wire = rid.to_wire_bytes();
        let back = RegionId::from_wire_bytes(&wire);
        assert_eq!(rid, back);
    }

    #[test]
    fn fresh_target_id_is_never_nil() {
        assert!(!TargetId::generate().is_nil());
    }
}

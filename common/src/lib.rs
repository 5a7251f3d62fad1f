//! `bake_common` — identifiers, error taxonomy, wire schema and
//! configuration shared by every BAKE crate (§4.1, §6, §7, §9).

pub mod config;
pub mod error;
pub mod ids;
pub mod wire;

pub use config::ProviderConfig;
pub use error::{format_error, BakeError, ErrorCode, Result};
pub use ids::{BackendTag, FileLocator, PmemOid, RegionId, TargetId};

//! The narrow raw-I/O surface a backend's log exposes to the transfer
//! engine. Kept separate from [`bake_backend::Backend`] so the engine has
//! no dependency on region bookkeeping, allocation, or persistence — only
//! on moving aligned bytes to and from a fixed absolute offset.

use async_trait::async_trait;
use bake_common::BakeError;

#[async_trait]
pub trait LogIo: Send + Sync {
    /// The alignment every offset and length passed to this trait must
    /// already satisfy (the backend's direct-I/O block size).
    fn alignment(&self) -> u64;

    async fn write_aligned(&self, offset: u64, data: &[u8]) -> Result<(), BakeError>;

    async fn read_aligned(&self, offset: u64, buf: &mut [u8]) -> Result<(), BakeError>;
}

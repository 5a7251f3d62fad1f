//! `bake_file_backend` — a direct-I/O, block-aligned, log-structured file
//! storage backend (§4.2, §4.4). Requires a filesystem that supports
//! `O_DIRECT` (tmpfs does not), the same constraint the original backend
//! carries.

pub mod backend;
pub mod io;
pub mod log;

pub use backend::FileBackend;

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bake_backend::{Backend, BulkHandle};
    use bake_common::BakeError;
    use bake_transfer::BufferPool;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    struct MemBulk {
        bytes: Mutex<Vec<u8>>,
    }

    #[async_trait]
    impl BulkHandle for MemBulk {
        async fn pull(&self, local: &mut [u8], remote_offset: u64) -> Result<(), BakeError> {
            let bytes = self.bytes.lock().unwrap();
            let start = remote_offset as usize;
            local.copy_from_slice(&bytes[start..start + local.len()]);
            Ok(())
        }

        async fn push(&self, local: &[u8], remote_offset: u64) -> Result<(), BakeError> {
            let mut bytes = self.bytes.lock().unwrap();
            let start = remote_offset as usize;
            bytes[start..start + local.len()].copy_from_slice(local);
            Ok(())
        }
    }

    #[tokio::test]
    async fn eager_write_then_eager_read_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.dat");
        let target_id = FileBackend::create_pool(&path, 4096).unwrap();

        let pool = BufferPool::new(4, 256 * 1024, 4096);
        let backend = FileBackend::open(&path, pool, 4).unwrap();
        assert_eq!(backend.target_id(), target_id);

        let rid = backend.create(4000).await.unwrap();
        backend.write_raw(rid, 0, b"hello bake file backend").await.unwrap();
        backend.persist(rid, 0, 0).await.unwrap();

        let read = backend.read_raw(rid, 0, 24).await.unwrap();
        assert_eq!(&read[..], b"hello bake file backend");
    }

    #[tokio::test]
    async fn writes_at_a_nonzero_offset_are_unsupported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.dat");
        FileBackend::create_pool(&path, 4096).unwrap();
        let pool = BufferPool::new(4, 256 * 1024, 4096);
        let backend = FileBackend::open(&path, pool, 4).unwrap();

        let rid = backend.create(128).await.unwrap();
        let err = backend.write_raw(rid, 8, b"oops").await.unwrap_err();
        assert_eq!(err.code(), bake_common::ErrorCode::OpUnsupported);
    }

    #[tokio::test]
    async fn bulk_write_then_bulk_read_round_trips_through_a_small_pool() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.dat");
        FileBackend::create_pool(&path, 4096).unwrap();
        let pool = BufferPool::new(4, 8192, 4096);
        let backend = FileBackend::open(&path, pool, 4).unwrap();

        let size = 32 * 1024usize;
        let rid = backend.create(size as u64).await.unwrap();
        let payload: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        let source = Arc::new(MemBulk {
            bytes: Mutex::new(payload.clone()),
        });
        backend
            .write_bulk(rid, 0, size as u64, source, 0)
            .await
            .unwrap();
        backend.persist(rid, 0, 0).await.unwrap();

        let sink = Arc::new(MemBulk {
            bytes: Mutex::new(vec![0u8; size]),
        });
        let read = backend
            .read_bulk(rid, 0, size as u64, sink.clone(), 0)
            .await
            .unwrap();
        assert_eq!(read, size as u64);
        assert_eq!(sink.bytes.lock().unwrap().clone(), payload);
    }

    #[tokio::test]
    async fn get_region_size_and_migrate_region_are_unsupported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.dat");
        FileBackend::create_pool(&path, 4096).unwrap();
        let pool = BufferPool::new(2, 4096, 4096);
        let backend = FileBackend::open(&path, pool, 4).unwrap();

        let rid = backend.create(64).await.unwrap();
        assert_eq!(
            backend.get_region_size(rid).unwrap_err().code(),
            bake_common::ErrorCode::OpUnsupported
        );
        assert_eq!(
            backend.local_bulk_source(rid).unwrap_err().code(),
            bake_common::ErrorCode::OpUnsupported
        );
    }

    #[tokio::test]
    async fn remove_then_reopen_keeps_the_allocation_cursor_monotonic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.dat");
        FileBackend::create_pool(&path, 4096).unwrap();
        let pool = BufferPool::new(2, 4096, 4096);
        let backend = FileBackend::open(&path, pool.clone(), 4).unwrap();

        let first = backend.create(4096).await.unwrap();
        backend.remove(first).await.unwrap();
        let second = backend.create(4096).await.unwrap();

        let first_loc = bake_common::FileLocator::from_region_id(&first).unwrap();
        let second_loc = bake_common::FileLocator::from_region_id(&second).unwrap();
        assert_ne!(first_loc.log_offset, second_loc.log_offset);
    }

    #[tokio::test]
    async fn removed_region_is_unknown_afterward() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.dat");
        FileBackend::create_pool(&path, 4096).unwrap();
        let pool = BufferPool::new(2, 4096, 4096);
        let backend = FileBackend::open(&path, pool, 4).unwrap();

        let rid = backend.create(4096).await.unwrap();
        backend.write_raw(rid, 0, b"bye").await.unwrap();
        backend.remove(rid).await.unwrap();

        assert_eq!(
            backend.read_raw(rid, 0, 3).await.unwrap_err().code(),
            bake_common::ErrorCode::UnknownRegion
        );
        assert_eq!(
            backend.remove(rid).await.unwrap_err().code(),
            bake_common::ErrorCode::UnknownRegion
        );
    }

    #[tokio::test]
    async fn bulk_writes_at_a_nonzero_offset_are_unsupported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.dat");
        FileBackend::create_pool(&path, 4096).unwrap();
        let pool = BufferPool::new(4, 8192, 4096);
        let backend = FileBackend::open(&path, pool, 4).unwrap();

        let rid = backend.create(8192).await.unwrap();
        let source = Arc::new(MemBulk {
            bytes: Mutex::new(vec![0u8; 4096]),
        });
        let err = backend
            .write_bulk(rid, 4096, 4096, source, 0)
            .await
            .unwrap_err();
        assert_eq!(err.code(), bake_common::ErrorCode::OpUnsupported);
    }
}

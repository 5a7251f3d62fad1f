//! `bake_pmem_backend` — a simulated persistent-memory-pool storage
//! backend (§4.2, §4.3). Backed by a memory-mapped file instead of real
//! PMEM hardware; see the design notes for what that trades away.

pub mod backend;
pub mod pool;

pub use backend::PmemBackend;

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bake_backend::{Backend, BulkHandle};
    use bake_common::BakeError;
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
    async fn create_write_persist_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pool.dat");
        let target_id = PmemBackend::create_pool(&path, 1 << 20).unwrap();

        let backend = PmemBackend::open(&path).unwrap();
        assert_eq!(backend.target_id(), target_id);

        let rid = backend.create(64).await.unwrap();
        assert_eq!(backend.get_region_size(rid).unwrap(), 64);

        backend.write_raw(rid, 0, b"hello pmem").await.unwrap();
        backend.persist(rid, 0, 10).await.unwrap();

        let read = backend.read_raw(rid, 0, 10).await.unwrap();
        assert_eq!(&read[..], b"hello pmem");
    }

    #[tokio::test]
    async fn bulk_write_then_bulk_read_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pool.dat");
        PmemBackend::create_pool(&path, 1 << 20).unwrap();
        let backend = PmemBackend::open(&path).unwrap();

        let rid = backend.create(4096).await.unwrap();
        let payload = vec![7u8; 4096];
        let source = Arc::new(MemBulk {
            bytes: Mutex::new(payload.clone()),
        });
        backend
            .write_bulk(rid, 0, 4096, source, 0)
            .await
            .unwrap();
        backend.persist(rid, 0, 4096).await.unwrap();

        let sink = Arc::new(MemBulk {
            bytes: Mutex::new(vec![0u8; 4096]),
        });
        let read = backend
            .read_bulk(rid, 0, 4096, sink.clone(), 0)
            .await
            .unwrap();
        assert_eq!(read, 4096);
        assert_eq!(sink.bytes.lock().unwrap().clone(), payload);
    }

    #[tokio::test]
    async fn get_region_data_exposes_a_stable_process_address() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pool.dat");
        PmemBackend::create_pool(&path, 1 << 20).unwrap();
        let backend = PmemBackend::open(&path).unwrap();

        let rid = backend.create(16).await.unwrap();
        let addr = backend.get_region_data(rid).unwrap();
        assert_ne!(addr, 0);
    }

    #[tokio::test]
    async fn reading_past_region_end_is_out_of_bounds() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pool.dat");
        PmemBackend::create_pool(&path, 1 << 20).unwrap();
        let backend = PmemBackend::open(&path).unwrap();

        let rid = backend.create(16).await.unwrap();
        let err = backend.read_raw(rid, 10, 16).await.unwrap_err();
        assert_eq!(err.code(), bake_common::ErrorCode::OutOfBounds);
    }

    #[tokio::test]
    async fn removed_region_space_is_reused() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pool.dat");
        PmemBackend::create_pool(&path, 1 << 20).unwrap();
        let backend = PmemBackend::open(&path).unwrap();

        let first = backend.create(128).await.unwrap();
        let first_offset = bake_common::PmemOid::from_region_id(&first).unwrap().offset;
        backend.remove(first).await.unwrap();
        let second = backend.create(128).await.unwrap();
        let second_offset = bake_common::PmemOid::from_region_id(&second).unwrap().offset;

        assert_eq!(first_offset, second_offset);
    }

    #[tokio::test]
    async fn removed_region_is_unknown_until_its_slot_is_reused() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pool.dat");
        PmemBackend::create_pool(&path, 1 << 20).unwrap();
        let backend = PmemBackend::open(&path).unwrap();

        let rid = backend.create(64).await.unwrap();
        backend.remove(rid).await.unwrap();

        assert_eq!(
            backend.get_region_size(rid).unwrap_err().code(),
            bake_common::ErrorCode::UnknownRegion
        );
        assert_eq!(
            backend.read_raw(rid, 0, 8).await.unwrap_err().code(),
            bake_common::ErrorCode::UnknownRegion
        );
        assert_eq!(
            backend.remove(rid).await.unwrap_err().code(),
            bake_common::ErrorCode::UnknownRegion
        );
    }
}

//! `bake_transfer` — the bounded buffer pool and pipelined transfer engine
//! the direct-I/O backends drive their bulk read/write paths through
//! (§4.4, §4.5).

pub mod buffer_pool;
pub mod log_io;
pub mod pipeline;

pub use buffer_pool::{BufferPool, PooledBuffer};
pub use log_io::LogIo;
pub use pipeline::{transfer, Direction};

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bake_backend::BulkHandle;
    use bake_common::BakeError;
    use std::sync::{Arc, Mutex};

    struct MemLog {
        align: u64,
        bytes: Mutex<Vec<u8>>,
    }

    impl MemLog {
        fn new(align: u64, len: usize) -> Self {
            MemLog {
                align,
                bytes: Mutex::new(vec![0u8; len]),
            }
        }
    }

    #[async_trait]
    impl LogIo for MemLog {
        fn alignment(&self) -> u64 {
            self.align
        }

        async fn write_aligned(&self, offset: u64, data: &[u8]) -> Result<(), BakeError> {
            let mut bytes = self.bytes.lock().unwrap();
            let start = offset as usize;
            bytes[start..start + data.len()].copy_from_slice(data);
            Ok(())
        }

        async fn read_aligned(&self, offset: u64, buf: &mut [u8]) -> Result<(), BakeError> {
            let bytes = self.bytes.lock().unwrap();
            let start = offset as usize;
            buf.copy_from_slice(&bytes[start..start + buf.len()]);
            Ok(())
        }
    }

    struct MemBulk {
        bytes: Mutex<Vec<u8>>,
    }

    impl MemBulk {
        fn new(bytes: Vec<u8>) -> Self {
            MemBulk {
                bytes: Mutex::new(bytes),
            }
        }
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
    async fn unaligned_write_then_read_round_trips_through_a_small_pool() {
        let align = 512u64;
        let pool = BufferPool::new(4, 256, align);
        let log: Arc<dyn LogIo> = Arc::new(MemLog::new(align, 8192));

        let payload: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
        let source = Arc::new(MemBulk::new(payload.clone()));

        let written = transfer(
            log.clone(),
            1024,
            17,
            payload.len() as u64,
            source.clone() as Arc<dyn BulkHandle>,
            0,
            pool.clone(),
            4,
            Direction::Write,
        )
        .await
        .unwrap();
        assert_eq!(written, payload.len() as u64);

        let sink = Arc::new(MemBulk::new(vec![0u8; payload.len()]));
        let read = transfer(
            log,
            1024,
            17,
            payload.len() as u64,
            sink.clone() as Arc<dyn BulkHandle>,
            0,
            pool,
            4,
            Direction::Read,
        )
        .await
        .unwrap();
        assert_eq!(read, payload.len() as u64);

        assert_eq!(sink.bytes.lock().unwrap().clone(), payload);
    }

    #[tokio::test]
    async fn pool_usage_never_exceeds_its_capacity() {
        let align = 256u64;
        let pool = BufferPool::new(3, 256, align);
        assert_eq!(pool.capacity(), 3);
        assert_eq!(pool.chunk_size(), 256);
    }

    /// A bulk handle that tracks the high-water mark of concurrent
    /// `pull`/`push` calls and sleeps briefly inside each one, so several
    /// chunks are guaranteed to overlap. Backs §8 scenario 6's "at no point
    /// does the pool's outstanding-buffer count exceed its capacity".
    struct TrackingBulk {
        bytes: Mutex<Vec<u8>>,
        inflight: std::sync::atomic::AtomicUsize,
        peak: std::sync::atomic::AtomicUsize,
    }

    impl TrackingBulk {
        fn new(bytes: Vec<u8>) -> Self {
            TrackingBulk {
                bytes: Mutex::new(bytes),
                inflight: std::sync::atomic::AtomicUsize::new(0),
                peak: std::sync::atomic::AtomicUsize::new(0),
            }
        }

        async fn track(&self) {
            use std::sync::atomic::Ordering;
            let now = self.inflight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            self.inflight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl BulkHandle for TrackingBulk {
        async fn pull(&self, local: &mut [u8], remote_offset: u64) -> Result<(), BakeError> {
            self.track().await;
            let bytes = self.bytes.lock().unwrap();
            let start = remote_offset as usize;
            local.copy_from_slice(&bytes[start..start + local.len()]);
            Ok(())
        }

        async fn push(&self, local: &[u8], remote_offset: u64) -> Result<(), BakeError> {
            self.track().await;
            let mut bytes = self.bytes.lock().unwrap();
            let start = remote_offset as usize;
            bytes[start..start + local.len()].copy_from_slice(local);
            Ok(())
        }
    }

    #[tokio::test]
    async fn eight_concurrent_transfers_never_exceed_a_four_buffer_pool() {
        use std::sync::atomic::Ordering;

        let align = 4096u64;
        let chunk_size = 256 * 1024;
        let region_size = 4 * 1024 * 1024u64;
        let pool = BufferPool::new(4, chunk_size, align);
        let log: Arc<dyn LogIo> = Arc::new(MemLog::new(align, (region_size * 8) as usize));

        let mut handles = Vec::new();
        for client in 0..8u64 {
            let log = log.clone();
            let pool = pool.clone();
            let payload: Vec<u8> = (0..region_size as u32)
                .map(|i| ((client as u32 + i) % 251) as u8)
                .collect();
            let source = Arc::new(TrackingBulk::new(payload.clone()));
            handles.push(tokio::spawn(async move {
                let written = transfer(
                    log,
                    client * region_size,
                    0,
                    region_size,
                    source.clone() as Arc<dyn BulkHandle>,
                    0,
                    pool,
                    16,
                    Direction::Write,
                )
                .await
                .unwrap();
                (written, source.peak.load(Ordering::SeqCst), payload)
            }));
        }

        let mut max_peak = 0;
        for handle in handles {
            let (written, peak, _payload) = handle.await.unwrap();
            assert_eq!(written, region_size);
            max_peak = max_peak.max(peak);
        }
        assert!(
            max_peak <= 4,
            "observed {max_peak} buffers in flight against a 4-buffer pool"
        );

        for client in 0..8u64 {
            let mut buf = vec![0u8; region_size as usize];
            log.read_aligned(client * region_size, &mut buf).await.unwrap();
            let expected: Vec<u8> = (0..region_size as u32)
                .map(|i| ((client as u32 + i) % 251) as u8)
                .collect();
            assert_eq!(buf, expected);
        }
    }
}

//! The pipelined bulk-transfer algorithm (§4.5). A transfer is split into
//! at most [`BufferPool::capacity`] chunks in flight at once, further capped
//! by the target's own `target-concurrency` limit so no single transfer can
//! starve every other target sharing the pool; each worker repeatedly
//! claims the next unclaimed chunk of the region's aligned extent from a
//! shared cursor until the extent is exhausted. The first chunk may cover
//! unaligned bytes before the region's real start, and the last chunk
//! unaligned bytes past its real end — those padding bytes are zeroed on
//! write and never transmitted on read. The first error any worker
//! observes wins; workers that see it set stop doing I/O but still drain
//! the remaining chunks so every worker terminates.

use crate::buffer_pool::BufferPool;
use crate::log_io::LogIo;
use bake_backend::{align_down, align_up, BulkHandle};
use bake_common::BakeError;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Pull bytes from the caller's bulk handle into the log (WRITE / CREATE_WRITE_PERSIST).
    Write,
    /// Read bytes from the log and push them into the caller's bulk handle (READ).
    Read,
}

/// Moves `size` bytes at `region_offset` within the region whose log bytes
/// begin at `log_base_offset`, to or from `bulk_offset` in `bulk`,
/// depending on `direction`. `target_concurrency` caps how many chunks of
/// this transfer may be in flight at once regardless of how many buffers
/// the pool itself has spare, so one large transfer cannot claim the whole
/// pool away from every other target sharing it. Returns the number of
/// bytes transferred.
#[allow(clippy::too_many_arguments)]
pub async fn transfer(
    log: Arc<dyn LogIo>,
    log_base_offset: u64,
    region_offset: u64,
    size: u64,
    bulk: Arc<dyn BulkHandle>,
    bulk_offset: u64,
    pool: Arc<BufferPool>,
    target_concurrency: usize,
    direction: Direction,
) -> Result<u64, BakeError> {
    if size == 0 {
        return Ok(0);
    }

    let align = log.alignment();
    let abs_start = log_base_offset + region_offset;
    let abs_end = abs_start + size;
    let ext_start = align_down(abs_start, align);
    let ext_end = align_up(abs_end, align);

    let chunk_size = pool.chunk_size() as u64;
    let num_chunks = (ext_end - ext_start).div_ceil(chunk_size);
    let worker_count = (pool.capacity() as u64)
        .min(num_chunks)
        .min(target_concurrency as u64)
        .max(1) as usize;

    let cursor = Arc::new(Mutex::new(ext_start));
    let first_error: Arc<Mutex<Option<BakeError>>> = Arc::new(Mutex::new(None));

    let mut workers = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        let log = log.clone();
        let bulk = bulk.clone();
        let pool = pool.clone();
        let cursor = cursor.clone();
        let first_error = first_error.clone();

        workers.push(tokio::spawn(async move {
            loop {
                let chunk_start = {
                    let mut next = cursor.lock().expect("transfer cursor lock poisoned");
                    if *next >= ext_end {
                        break;
                    }
                    let start = *next;
                    *next += chunk_size;
                    start
                };

                if first_error.lock().expect("transfer error lock poisoned").is_some() {
                    continue;
                }

                let chunk_len = chunk_size.min(ext_end - chunk_start) as usize;
                let real_start = chunk_start.max(abs_start);
                let real_end = (chunk_start + chunk_len as u64).min(abs_end);
                let pad_prefix = (real_start - chunk_start) as usize;
                let real_len = (real_end - real_start) as usize;
                let bulk_rel_offset = bulk_offset + (real_start - abs_start);

                let mut buf = pool.acquire().await;
                let result = run_chunk(
                    direction,
                    log.as_ref(),
                    bulk.as_ref(),
                    chunk_start,
                    chunk_len,
                    pad_prefix,
                    real_len,
                    bulk_rel_offset,
                    &mut buf,
                )
                .await;

                if let Err(e) = result {
                    let mut slot = first_error.lock().expect("transfer error lock poisoned");
                    if slot.is_none() {
                        *slot = Some(e);
                    }
                }
            }
        }));
    }

    for worker in workers {
        worker.await.expect("transfer worker task panicked");
    }

    match first_error.lock().expect("transfer error lock poisoned").take() {
        Some(e) => Err(e),
        None => Ok(size),
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_chunk(
    direction: Direction,
    log: &dyn LogIo,
    bulk: &dyn BulkHandle,
    chunk_start: u64,
    chunk_len: usize,
    pad_prefix: usize,
    real_len: usize,
    bulk_rel_offset: u64,
    buf: &mut bake_backend::AlignedBuffer,
) -> Result<(), BakeError> {
    match direction {
        Direction::Write => {
            if real_len > 0 {
                bulk.pull(&mut buf[pad_prefix..pad_prefix + real_len], bulk_rel_offset)
                    .await?;
            }
            buf[..pad_prefix].fill(0);
            buf[pad_prefix + real_len..chunk_len].fill(0);
            log.write_aligned(chunk_start, &buf[..chunk_len]).await
        }
        Direction::Read => {
            log.read_aligned(chunk_start, &mut buf[..chunk_len]).await?;
            if real_len > 0 {
                bulk.push(&buf[pad_prefix..pad_prefix + real_len], bulk_rel_offset)
                    .await?;
            }
            Ok(())
        }
    }
}

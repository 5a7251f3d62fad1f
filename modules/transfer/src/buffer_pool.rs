//! A bounded pool of pre-registered aligned buffers (§4.4). A provider that
//! enables pipelining allocates this pool once at startup; every bulk
//! transfer borrows buffers from it instead of allocating its own, which is
//! what bounds the number of chunks in flight regardless of how many
//! concurrent clients are transferring.

use bake_backend::AlignedBuffer;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct BufferPool {
    chunk_size: usize,
    alignment: u64,
    capacity: usize,
    semaphore: Arc<Semaphore>,
    free: Mutex<Vec<AlignedBuffer>>,
}

impl BufferPool {
    /// Pre-allocates `capacity` buffers of `chunk_size` bytes, each aligned
    /// to `alignment`.
    pub fn new(capacity: usize, chunk_size: usize, alignment: u64) -> Arc<Self> {
        let free = (0..capacity)
            .map(|_| AlignedBuffer::new(chunk_size, alignment as usize))
            .collect();
        Arc::new(BufferPool {
            chunk_size,
            alignment,
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
            free: Mutex::new(free),
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Borrows a buffer, waiting if every buffer is currently in use
    /// (§4.4: "a transfer that would exceed the pool blocks, it does not
    /// allocate around it").
    pub async fn acquire(self: &Arc<Self>) -> PooledBuffer {
        if self.semaphore.available_permits() == 0 {
            tracing::trace!(capacity = self.capacity, "buffer pool exhausted, waiting for a free buffer");
        }
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("buffer pool semaphore never closes");
        let buf = self
            .free
            .lock()
            .expect("buffer pool lock poisoned")
            .pop()
            .expect("semaphore permit granted without a free buffer");
        PooledBuffer {
            buf: Some(buf),
            pool: self.clone(),
            _permit: permit,
        }
    }
}

/// A buffer on loan from a [`BufferPool`]. Returned to the pool's free list
/// when dropped.
pub struct PooledBuffer {
    buf: Option<AlignedBuffer>,
    pool: Arc<BufferPool>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledBuffer {
    type Target = AlignedBuffer;

    fn deref(&self) -> &AlignedBuffer {
        self.buf.as_ref().expect("buffer taken before drop")
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut AlignedBuffer {
        self.buf.as_mut().expect("buffer taken before drop")
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool
                .free
                .lock()
                .expect("buffer pool lock poisoned")
                .push(buf);
        }
    }
}

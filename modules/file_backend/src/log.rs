//! The single block-aligned log file every region's bytes live in (§4.2,
//! §4.4). The first aligned block is a root record holding the target id;
//! everything after it is region content, indexed by the `(offset, length)`
//! pair carried in that region's [`FileLocator`].

use crate::io;
use async_trait::async_trait;
use bake_backend::AlignedBuffer;
use bake_common::{BakeError, TargetId};
use bake_transfer::LogIo;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub struct FileLog {
    file: Arc<File>,
    target_id: TargetId,
    /// Block alignment this log's root record, reservations and bounce
    /// buffers are all sized to — the provider's configured `block-size`.
    alignment: u64,
    /// Next unused log offset. Only ever increases: removed regions leave a
    /// hole punched in place, their space is never reused (§4.2 "remove").
    cursor: Mutex<u64>,
}

impl FileLog {
    /// Formats a fresh log file with a root record (`bake_file_makepool`'s
    /// Rust counterpart), its first block sized to `alignment`.
    pub fn create_pool(path: &Path, alignment: u64) -> Result<TargetId, BakeError> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .custom_flags(libc::O_DIRECT)
            .open(path)
            .map_err(|e| BakeError::Io(format!("{}: {e}", path.display())))?;

        let target_id = TargetId::generate();
        let mut root = AlignedBuffer::new(alignment as usize, alignment as usize);
        root.full_mut()[..16].copy_from_slice(target_id.as_bytes());

        let fd = file.as_raw_fd();
        io::pwrite_all(fd, &root[..], 0)?;
        io::fdatasync(fd)?;
        Ok(target_id)
    }

    /// Opens an existing log file, validating and reading back the root
    /// record, and picks up the allocation cursor where the log's current
    /// length leaves it (§9 "crash consistency": the zero block each
    /// `create` writes guarantees the file is at least this long).
    /// `alignment` must match the `block-size` the pool was created with.
    pub fn open(path: &Path, alignment: u64) -> Result<Self, BakeError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_DIRECT)
            .open(path)
            .map_err(|e| BakeError::Io(format!("{}: {e}", path.display())))?;

        let len = file
            .metadata()
            .map_err(|e| BakeError::Io(e.to_string()))?
            .len();
        if len < alignment {
            return Err(BakeError::Io(format!(
                "{} is smaller than one log block",
                path.display()
            )));
        }

        let mut root = AlignedBuffer::new(alignment as usize, alignment as usize);
        io::pread_exact(file.as_raw_fd(), root.full_mut(), 0)?;
        let mut id_bytes = [0u8; 16];
        id_bytes.copy_from_slice(&root[0..16]);
        let target_id = TargetId::from_bytes(id_bytes);
        if target_id.is_nil() {
            return Err(BakeError::UnknownTarget(format!(
                "{} is not properly initialized",
                path.display()
            )));
        }

        Ok(FileLog {
            file: Arc::new(file),
            target_id,
            alignment,
            cursor: Mutex::new(len),
        })
    }

    pub fn target_id(&self) -> TargetId {
        self.target_id
    }

    /// Reserves `size` (already block-aligned) bytes at the end of the log
    /// and extends the file to cover them, matching `bake_file_create`'s
    /// "write one empty block at the end, fdatasync" trick so a crash never
    /// leaves the allocator believing space exists that the file doesn't
    /// actually have.
    pub fn reserve(&self, size: u64) -> Result<u64, BakeError> {
        debug_assert_eq!(size % self.alignment, 0);
        let offset = {
            let mut cursor = self.cursor.lock().expect("log cursor lock poisoned");
            let offset = *cursor;
            *cursor += size;
            offset
        };

        let zero_block = AlignedBuffer::new(self.alignment as usize, self.alignment as usize);
        let fd = self.file.as_raw_fd();
        io::pwrite_all(fd, &zero_block[..], offset + size - self.alignment)?;
        io::fdatasync(fd)?;
        Ok(offset)
    }

    /// A single-shot bounce-buffer write for the eager path (§4.2
    /// "write_raw"). Only offset zero is supported, matching the upstream
    /// backend's unaligned-write restriction.
    pub async fn write_region_raw(
        &self,
        log_offset: u64,
        region_size: u64,
        offset: u64,
        data: &[u8],
    ) -> Result<(), BakeError> {
        if offset != 0 {
            return Err(BakeError::op_unsupported(
                "write_raw at a nonzero region offset",
            ));
        }
        if data.len() as u64 + offset > region_size {
            return Err(BakeError::OutOfBounds(format!(
                "{}+{} exceeds region size {region_size}",
                offset,
                data.len()
            )));
        }

        let file = self.file.clone();
        let write_len = io::align_up(data.len() as u64, self.alignment);
        let mut bounce = AlignedBuffer::new(write_len as usize, self.alignment as usize);
        bounce.full_mut()[..data.len()].copy_from_slice(data);

        tokio::task::spawn_blocking(move || {
            io::pwrite_all(file.as_raw_fd(), &bounce.full_mut()[..write_len as usize], log_offset)
        })
        .await
        .expect("blocking task panicked")
    }

    /// A single-shot bounce-buffer read for the eager path (§4.2
    /// "read_raw"): reads the aligned extent enclosing `[offset, offset+size)`
    /// and narrows the returned buffer to exactly the caller's window.
    pub async fn read_region_raw(
        &self,
        log_offset: u64,
        region_size: u64,
        offset: u64,
        size: u64,
    ) -> Result<AlignedBuffer, BakeError> {
        if offset + size > region_size {
            return Err(BakeError::OutOfBounds(format!(
                "{offset}+{size} exceeds region size {region_size}"
            )));
        }

        let natural_start = log_offset + offset;
        let natural_end = natural_start + size;
        let ext_start = io::align_down(natural_start, self.alignment);
        let ext_end = io::align_up(natural_end, self.alignment);
        let ext_len = ext_end - ext_start;

        let alignment = self.alignment;
        let file = self.file.clone();
        let buf = tokio::task::spawn_blocking(move || -> Result<AlignedBuffer, BakeError> {
            let mut buf = AlignedBuffer::new(ext_len as usize, alignment as usize);
            io::pread_exact(file.as_raw_fd(), buf.full_mut(), ext_start)?;
            Ok(buf)
        })
        .await
        .expect("blocking task panicked")?;

        Ok(buf.narrowed((natural_start - ext_start) as usize, size as usize))
    }

    pub async fn persist_all(&self) -> Result<(), BakeError> {
        let file = self.file.clone();
        tokio::task::spawn_blocking(move || io::fdatasync(file.as_raw_fd()))
            .await
            .expect("blocking task panicked")
    }

    pub async fn remove_region(&self, log_offset: u64, region_size: u64) -> Result<(), BakeError> {
        let file = self.file.clone();
        tokio::task::spawn_blocking(move || io::punch_hole(file.as_raw_fd(), log_offset, region_size))
            .await
            .expect("blocking task panicked")
    }
}

#[async_trait]
impl LogIo for FileLog {
    fn alignment(&self) -> u64 {
        self.alignment
    }

    async fn write_aligned(&self, offset: u64, data: &[u8]) -> Result<(), BakeError> {
        let file = self.file.clone();
        let mut aligned = AlignedBuffer::new(data.len(), self.alignment as usize);
        aligned.full_mut()[..data.len()].copy_from_slice(data);
        tokio::task::spawn_blocking(move || io::pwrite_all(file.as_raw_fd(), &aligned[..], offset))
            .await
            .expect("blocking task panicked")
    }

    async fn read_aligned(&self, offset: u64, buf: &mut [u8]) -> Result<(), BakeError> {
        let file = self.file.clone();
        let len = buf.len();
        let alignment = self.alignment;
        let aligned = tokio::task::spawn_blocking(move || -> Result<AlignedBuffer, BakeError> {
            let mut aligned = AlignedBuffer::new(len, alignment as usize);
            io::pread_exact(file.as_raw_fd(), aligned.full_mut(), offset)?;
            Ok(aligned)
        })
        .await
        .expect("blocking task panicked")?;
        buf.copy_from_slice(&aligned[..]);
        Ok(())
    }
}

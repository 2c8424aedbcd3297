// SPDX-License-Identifier: Apache-2.0 or BSD-3-Clause
//! Anonymous System V shared memory segments used as mmap backing.

use std::io;

/// A private shared memory segment.
///
/// The segment is marked for removal when [`ShmSegment::remove`] is called
/// or, failing that, when it is dropped.
#[derive(Debug)]
pub struct ShmSegment {
    id: libc::c_int,
    removed: bool,
}

impl ShmSegment {
    /// Creates a segment of `size` bytes readable and writable by everyone.
    pub fn create(size: usize) -> io::Result<Self> {
        // SAFETY: shmget only takes plain values and has no memory safety
        // preconditions.
        let id = unsafe { libc::shmget(libc::IPC_PRIVATE, size, 0o666) };
        if id < 0 {
            return Err(io::Error::last_os_error());
        }
        log::trace!("created shared memory segment {} of {} bytes", id, size);
        Ok(Self { id, removed: false })
    }

    pub const fn id(&self) -> i32 {
        self.id
    }

    /// Marks the segment for removal.
    pub fn remove(mut self) -> io::Result<()> {
        self.mark_removed()
    }

    fn mark_removed(&mut self) -> io::Result<()> {
        // Removal is attempted once, even if it fails.
        self.removed = true;
        // SAFETY: IPC_RMID ignores the buffer argument, so a null pointer is
        // valid.
        let ret = unsafe { libc::shmctl(self.id, libc::IPC_RMID, std::ptr::null_mut()) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        log::trace!("removed shared memory segment {}", self.id);
        Ok(())
    }
}

impl Drop for ShmSegment {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(err) = self.mark_removed() {
            log::warn!("shmctl IPC_RMID on segment {} failed: {}", self.id, err);
        }
    }
}

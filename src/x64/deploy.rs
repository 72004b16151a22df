//! Turning a blob of machine code into something callable: an
//! executable mapping, and a typed function pointer over it.
//!
//! Mapping happens in two steps rather than one `PROT_EXEC` mapping up
//! front: most platforms (and hardened kernels in particular) refuse
//! W^X violations, so the buffer is written while writable, then
//! `mprotect`'d read+exec before anyone calls into it.

use crate::error::{CodegenError, CodegenResult};
use log::debug;
use std::io;

/// An executable mapping owning its pages. Dropping it unmaps them.
pub struct ExecutableCode {
    ptr: *mut libc::c_void,
    len: usize,
}

impl ExecutableCode {
    /// Map `code` into fresh pages and mark them read+exec.
    pub fn new(code: &[u8]) -> CodegenResult<Self> {
        let len = code.len().max(1);
        let page = page_size();
        let mapped_len = round_up(len, page);

        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                mapped_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(CodegenError::MapFailed(io::Error::last_os_error()));
        }

        unsafe {
            std::ptr::copy_nonoverlapping(code.as_ptr(), ptr as *mut u8, code.len());
        }

        let rc = unsafe { libc::mprotect(ptr, mapped_len, libc::PROT_READ | libc::PROT_EXEC) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            unsafe {
                libc::munmap(ptr, mapped_len);
            }
            return Err(CodegenError::ProtectFailed(err));
        }

        debug!("deploy: mapped {} byte(s) ({} code byte(s)) at {:p} read+exec", mapped_len, code.len(), ptr);
        Ok(ExecutableCode { ptr, len: mapped_len })
    }

    /// Base address of the mapping, for building a typed callable over
    /// it with [`ExecutableCode::as_fn`].
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr as *const u8
    }

    /// Reinterpret the mapping's entry point as a callable of type `F`.
    ///
    /// # Safety
    /// `F` must match the calling convention and argument/return layout
    /// the code was selected for, and the mapping must still be alive
    /// for every call through the returned function pointer.
    pub unsafe fn as_fn<F: Copy>(&self) -> F {
        debug_assert_eq!(std::mem::size_of::<F>(), std::mem::size_of::<usize>());
        std::mem::transmute_copy(&self.ptr)
    }
}

impl Drop for ExecutableCode {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr, self.len);
        }
    }
}

// Mappings cross threads freely; nothing here is interior-mutable.
unsafe impl Send for ExecutableCode {}
unsafe impl Sync for ExecutableCode {}

fn page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

fn round_up(n: usize, align: usize) -> usize {
    (n + align - 1) / align * align
}

/// Write raw encoded bytes to disk, for offline inspection (e.g. feeding
/// `objdump -D -b binary -m i386:x86-64`).
pub fn save(code: &[u8], path: &std::path::Path) -> io::Result<()> {
    std::fs::write(path, code)
}

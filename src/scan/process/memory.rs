//! Reading the memory image of another process, region by region.

use crate::error::{AgentError, Result};

/// A contiguous, readable range of a process address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    pub base: u64,
    pub size: u64,
}

/// Read every readable region of `pid` no larger than `max_region_size`,
/// handing each one to `visit`.
///
/// Regions that fail to read are skipped. Returns the number of regions
/// visited; a process with no readable region at all is
/// [`AgentError::MemoryUnreadable`].
pub fn read_regions<F>(pid: u32, max_region_size: u64, visit: F) -> Result<usize>
where
    F: FnMut(&MemoryRegion, &[u8]),
{
    let visited = platform::read_regions(pid, max_region_size, visit)?;
    if visited == 0 {
        return Err(AgentError::MemoryUnreadable(pid));
    }
    Ok(visited)
}

/// Map an I/O failure on a process resource to the matching error.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn process_io_error(pid: u32, err: std::io::Error) -> AgentError {
    match err.kind() {
        std::io::ErrorKind::NotFound => AgentError::ProcessGone(pid),
        _ => AgentError::ProcessAccess {
            pid,
            message: err.to_string(),
        },
    }
}

#[cfg(target_os = "linux")]
mod platform {
    use std::fs::{self, File};
    use std::os::unix::fs::FileExt;

    use super::{process_io_error, MemoryRegion};
    use crate::error::Result;

    pub(super) fn read_regions<F>(pid: u32, max_region_size: u64, mut visit: F) -> Result<usize>
    where
        F: FnMut(&MemoryRegion, &[u8]),
    {
        let maps = fs::read_to_string(format!("/proc/{}/maps", pid))
            .map_err(|e| process_io_error(pid, e))?;
        let mem = File::open(format!("/proc/{}/mem", pid)).map_err(|e| process_io_error(pid, e))?;

        let mut visited = 0;
        for region in maps.lines().filter_map(parse_maps_line) {
            if region.size == 0 || region.size > max_region_size {
                continue;
            }
            match read_at(&mem, &region) {
                Some(data) => {
                    visit(&region, &data);
                    visited += 1;
                }
                None => {
                    tracing::trace!(pid, base = region.base, "region unreadable");
                }
            }
        }
        Ok(visited)
    }

    fn read_at(mem: &File, region: &MemoryRegion) -> Option<Vec<u8>> {
        let mut buf = vec![0u8; region.size as usize];
        let mut filled = 0;
        while filled < buf.len() {
            match mem.read_at(&mut buf[filled..], region.base + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(_) => break,
            }
        }
        if filled == 0 {
            return None;
        }
        buf.truncate(filled);
        Some(buf)
    }

    /// Parse one line of `/proc/<pid>/maps`, keeping readable mappings only.
    pub(super) fn parse_maps_line(line: &str) -> Option<MemoryRegion> {
        let mut parts = line.split_whitespace();
        let range = parts.next()?;
        let perms = parts.next()?;
        if !perms.starts_with('r') {
            return None;
        }
        // The vsyscall page can't be read through /proc/<pid>/mem.
        if line.trim_end().ends_with("[vsyscall]") || line.trim_end().ends_with("[vvar]") {
            return None;
        }

        let (start, end) = range.split_once('-')?;
        let start = u64::from_str_radix(start, 16).ok()?;
        let end = u64::from_str_radix(end, 16).ok()?;
        Some(MemoryRegion {
            base: start,
            size: end.checked_sub(start)?,
        })
    }
}

#[cfg(windows)]
mod platform {
    use std::ffi::c_void;
    use std::mem;

    use windows_sys::Win32::Foundation::{
        CloseHandle, GetLastError, ERROR_INVALID_PARAMETER, HANDLE,
    };
    use windows_sys::Win32::System::Diagnostics::Debug::ReadProcessMemory;
    use windows_sys::Win32::System::Memory::{
        VirtualQueryEx, MEMORY_BASIC_INFORMATION, MEM_COMMIT, PAGE_EXECUTE_READ,
        PAGE_EXECUTE_READWRITE, PAGE_EXECUTE_WRITECOPY, PAGE_GUARD, PAGE_READONLY,
        PAGE_READWRITE, PAGE_WRITECOPY,
    };
    use windows_sys::Win32::System::Threading::{
        OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_READ,
    };

    use super::MemoryRegion;
    use crate::error::{AgentError, Result};

    const READABLE: u32 = PAGE_READONLY
        | PAGE_READWRITE
        | PAGE_WRITECOPY
        | PAGE_EXECUTE_READ
        | PAGE_EXECUTE_READWRITE
        | PAGE_EXECUTE_WRITECOPY;

    /// Owned process handle, closed on drop.
    pub(crate) struct ProcessHandle(HANDLE);

    impl ProcessHandle {
        pub(crate) fn open(pid: u32, access: u32) -> Result<Self> {
            // SAFETY: plain FFI call; a null return is checked below.
            let handle = unsafe { OpenProcess(access, 0, pid) };
            if handle.is_null() {
                // SAFETY: reads the calling thread's last-error value.
                let code = unsafe { GetLastError() };
                return Err(if code == ERROR_INVALID_PARAMETER {
                    AgentError::ProcessGone(pid)
                } else {
                    AgentError::ProcessAccess {
                        pid,
                        message: std::io::Error::from_raw_os_error(code as i32).to_string(),
                    }
                });
            }
            Ok(Self(handle))
        }

        pub(crate) fn raw(&self) -> HANDLE {
            self.0
        }
    }

    impl Drop for ProcessHandle {
        fn drop(&mut self) {
            // SAFETY: the handle came from OpenProcess and is closed once.
            unsafe {
                CloseHandle(self.0);
            }
        }
    }

    pub(super) fn read_regions<F>(pid: u32, max_region_size: u64, mut visit: F) -> Result<usize>
    where
        F: FnMut(&MemoryRegion, &[u8]),
    {
        let handle = ProcessHandle::open(pid, PROCESS_QUERY_INFORMATION | PROCESS_VM_READ)?;

        let mut visited = 0;
        let mut address: usize = 0;
        loop {
            // SAFETY: MEMORY_BASIC_INFORMATION is plain data; zeroed is a valid value.
            let mut mbi: MEMORY_BASIC_INFORMATION = unsafe { mem::zeroed() };
            // SAFETY: mbi is a live, correctly sized out-parameter.
            let written = unsafe {
                VirtualQueryEx(
                    handle.raw(),
                    address as *const c_void,
                    &mut mbi,
                    mem::size_of::<MEMORY_BASIC_INFORMATION>(),
                )
            };
            if written == 0 {
                break;
            }

            let region = MemoryRegion {
                base: mbi.BaseAddress as u64,
                size: mbi.RegionSize as u64,
            };
            let readable = mbi.State == MEM_COMMIT
                && mbi.Protect & READABLE != 0
                && mbi.Protect & PAGE_GUARD == 0;

            if readable && region.size <= max_region_size {
                if let Some(data) = read_region(&handle, &region) {
                    visit(&region, &data);
                    visited += 1;
                }
            }

            let next = (mbi.BaseAddress as usize).checked_add(mbi.RegionSize);
            match next {
                Some(n) if n > address => address = n,
                _ => break,
            }
        }
        Ok(visited)
    }

    fn read_region(handle: &ProcessHandle, region: &MemoryRegion) -> Option<Vec<u8>> {
        let mut buf = vec![0u8; region.size as usize];
        let mut read = 0usize;
        // SAFETY: buf is valid for buf.len() bytes and outlives the call.
        let ok = unsafe {
            ReadProcessMemory(
                handle.raw(),
                region.base as *const c_void,
                buf.as_mut_ptr() as *mut c_void,
                buf.len(),
                &mut read,
            )
        };
        if ok == 0 && read == 0 {
            return None;
        }
        buf.truncate(read);
        Some(buf)
    }
}

#[cfg(windows)]
pub(crate) use platform::ProcessHandle;

#[cfg(not(any(target_os = "linux", windows)))]
mod platform {
    use super::MemoryRegion;
    use crate::error::{AgentError, Result};

    pub(super) fn read_regions<F>(pid: u32, _max_region_size: u64, _visit: F) -> Result<usize>
    where
        F: FnMut(&MemoryRegion, &[u8]),
    {
        Err(AgentError::ProcessAccess {
            pid,
            message: "process memory scanning is not supported on this platform".into(),
        })
    }
}

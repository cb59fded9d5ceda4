use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Basic metadata about a running process. Fields the agent isn't allowed
/// to read stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: Option<String>,
    pub path: Option<PathBuf>,
    pub command_line: Option<String>,
}

impl ProcessInfo {
    pub fn new(pid: u32) -> Self {
        Self {
            pid,
            ..Self::default()
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("?")
    }
}

/// Source of the host's process list.
pub trait ProcessTable: Send + Sync {
    /// Ids of every process running right now.
    fn snapshot(&self) -> Result<Vec<u32>>;

    /// Metadata for one process. Fails with `ProcessGone` once it has exited.
    fn inspect(&self, pid: u32) -> Result<ProcessInfo>;
}

/// The operating system's process table.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessTable;

impl ProcessTable for SystemProcessTable {
    fn snapshot(&self) -> Result<Vec<u32>> {
        platform::snapshot()
    }

    fn inspect(&self, pid: u32) -> Result<ProcessInfo> {
        platform::inspect(pid)
    }
}

#[cfg(target_os = "linux")]
mod platform {
    use std::fs;

    use super::ProcessInfo;
    use crate::error::{AgentError, Result};

    pub(super) fn snapshot() -> Result<Vec<u32>> {
        let mut pids: Vec<u32> = fs::read_dir("/proc")?
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().to_string_lossy().parse::<u32>().ok())
            .collect();
        pids.sort_unstable();
        Ok(pids)
    }

    pub(super) fn inspect(pid: u32) -> Result<ProcessInfo> {
        let base = format!("/proc/{}", pid);

        // comm is world-readable, so failing here means the process is gone.
        let name = fs::read_to_string(format!("{}/comm", base))
            .map_err(|_| AgentError::ProcessGone(pid))?
            .trim_end()
            .to_string();

        let path = fs::read_link(format!("{}/exe", base)).ok();

        let command_line = fs::read(format!("{}/cmdline", base))
            .ok()
            .map(|raw| {
                raw.split(|b| *b == 0)
                    .filter(|arg| !arg.is_empty())
                    .map(|arg| String::from_utf8_lossy(arg).into_owned())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .filter(|cmd| !cmd.is_empty());

        Ok(ProcessInfo {
            pid,
            name: Some(name),
            path,
            command_line,
        })
    }
}

#[cfg(windows)]
mod platform {
    use std::ffi::OsString;
    use std::mem;
    use std::os::windows::ffi::OsStringExt;
    use std::path::PathBuf;

    use windows_sys::Win32::Foundation::{CloseHandle, INVALID_HANDLE_VALUE, MAX_PATH};
    use windows_sys::Win32::System::Diagnostics::ToolHelp::{
        CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, PROCESSENTRY32W,
        TH32CS_SNAPPROCESS,
    };
    use windows_sys::Win32::System::Threading::{
        QueryFullProcessImageNameW, PROCESS_NAME_WIN32, PROCESS_QUERY_LIMITED_INFORMATION,
    };

    use super::ProcessInfo;
    use crate::error::{AgentError, Result};
    use crate::scan::process::memory::ProcessHandle;

    pub(super) fn snapshot() -> Result<Vec<u32>> {
        // SAFETY: plain FFI call; the invalid handle value is checked below.
        let snap = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) };
        if snap == INVALID_HANDLE_VALUE {
            return Err(std::io::Error::last_os_error().into());
        }

        let mut pids = Vec::new();
        // SAFETY: PROCESSENTRY32W is plain data; dwSize is set before use.
        let mut entry: PROCESSENTRY32W = unsafe { mem::zeroed() };
        entry.dwSize = mem::size_of::<PROCESSENTRY32W>() as u32;

        // SAFETY: snap is a valid snapshot handle and entry a live out-parameter.
        let mut more = unsafe { Process32FirstW(snap, &mut entry) } != 0;
        while more {
            pids.push(entry.th32ProcessID);
            // SAFETY: as above.
            more = unsafe { Process32NextW(snap, &mut entry) } != 0;
        }

        // SAFETY: snap came from CreateToolhelp32Snapshot and is closed once.
        unsafe {
            CloseHandle(snap);
        }
        Ok(pids)
    }

    pub(super) fn inspect(pid: u32) -> Result<ProcessInfo> {
        let handle = match ProcessHandle::open(pid, PROCESS_QUERY_LIMITED_INFORMATION) {
            Ok(h) => h,
            Err(AgentError::ProcessAccess { .. }) => return Ok(ProcessInfo::new(pid)),
            Err(e) => return Err(e),
        };

        let mut buf = [0u16; MAX_PATH as usize];
        let mut len = buf.len() as u32;
        // SAFETY: buf holds len UTF-16 units; len is updated to the written count.
        let ok = unsafe {
            QueryFullProcessImageNameW(handle.raw(), PROCESS_NAME_WIN32, buf.as_mut_ptr(), &mut len)
        };

        let path = (ok != 0)
            .then(|| PathBuf::from(OsString::from_wide(&buf[..len as usize])));
        let name = path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned());

        Ok(ProcessInfo {
            pid,
            name,
            path,
            command_line: None,
        })
    }
}

#[cfg(not(any(target_os = "linux", windows)))]
mod platform {
    use super::ProcessInfo;
    use crate::error::{AgentError, Result};

    pub(super) fn snapshot() -> Result<Vec<u32>> {
        Ok(Vec::new())
    }

    pub(super) fn inspect(pid: u32) -> Result<ProcessInfo> {
        Err(AgentError::ProcessGone(pid))
    }
}

use std::ffi::CString;
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::ptr;

use winapi::shared::minwindef::{DWORD, LPVOID};
use winapi::shared::winerror::{ERROR_BROKEN_PIPE, ERROR_PIPE_CONNECTED};
use winapi::um::errhandlingapi::GetLastError;
use winapi::um::fileapi::ReadFile;
use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
use winapi::um::namedpipeapi::{ConnectNamedPipe, CreateNamedPipeA, DisconnectNamedPipe};
use winapi::um::winbase::{
    PIPE_ACCESS_INBOUND, PIPE_READMODE_BYTE, PIPE_REJECT_REMOTE_CLIENTS, PIPE_TYPE_BYTE, PIPE_WAIT,
};
use winapi::um::winnt::HANDLE;

use crate::constants::MAX_FRAME_SIZE;
use crate::error::ChannelError;

/// Inbound named pipe with a single instance.
pub(super) struct PlatformChannel {
    handle: HANDLE,
}

// SAFETY: the pipe handle is owned by this struct and only used by the thread
// that currently owns the channel
unsafe impl Send for PlatformChannel {}

impl PlatformChannel {
    pub(super) fn create(path: &Path) -> Result<Self, ChannelError> {
        let create_err = |source: io::Error| ChannelError::Create {
            path: path.display().to_string(),
            source,
        };

        let name = CString::new(path.to_string_lossy().as_bytes())
            .map_err(|e| create_err(io::Error::new(io::ErrorKind::InvalidInput, e)))?;

        // SAFETY: CreateNamedPipeA is safe to call with:
        // - a NUL-terminated name that outlives the call
        // - inbound byte mode with blocking reads
        // - a single instance and null security attributes
        let handle = unsafe {
            CreateNamedPipeA(
                name.as_ptr(),
                PIPE_ACCESS_INBOUND,
                PIPE_TYPE_BYTE | PIPE_READMODE_BYTE | PIPE_WAIT | PIPE_REJECT_REMOTE_CLIENTS,
                1,
                MAX_FRAME_SIZE as DWORD,
                MAX_FRAME_SIZE as DWORD,
                0,
                ptr::null_mut(),
            )
        };

        if handle == INVALID_HANDLE_VALUE {
            return Err(create_err(io::Error::last_os_error()));
        }

        Ok(Self { handle })
    }

    pub(super) fn connect(&mut self, path: &Path) -> Result<(), ChannelError> {
        // SAFETY: the handle is a valid pipe handle; no OVERLAPPED structure is used
        let connected = unsafe { ConnectNamedPipe(self.handle, ptr::null_mut()) };
        if connected == 0 {
            // SAFETY: GetLastError has no preconditions
            let err = unsafe { GetLastError() };
            // The producer opened the pipe before we started waiting
            if err != ERROR_PIPE_CONNECTED {
                return Err(ChannelError::Connect {
                    path: path.display().to_string(),
                    source: io::Error::from_raw_os_error(err as i32),
                });
            }
        }
        Ok(())
    }

    pub(super) fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut bytes_read: DWORD = 0;
        let len = buf.len().min(MAX_FRAME_SIZE) as DWORD;

        // SAFETY: buf is valid for `len` bytes and bytes_read outlives the call
        let ok = unsafe {
            ReadFile(
                self.handle,
                buf.as_mut_ptr() as LPVOID,
                len,
                &mut bytes_read,
                ptr::null_mut(),
            )
        };

        if ok == 0 {
            // SAFETY: GetLastError has no preconditions
            let err = unsafe { GetLastError() };
            if err == ERROR_BROKEN_PIPE {
                return Ok(0);
            }
            return Err(io::Error::from_raw_os_error(err as i32));
        }

        Ok(bytes_read as usize)
    }
}

impl Drop for PlatformChannel {
    fn drop(&mut self) {
        // SAFETY: the handle came from CreateNamedPipeA and is closed exactly once
        unsafe {
            DisconnectNamedPipe(self.handle);
            CloseHandle(self.handle);
        }
    }
}

pub(super) fn wake(path: &Path) {
    let _ = OpenOptions::new().write(true).open(path);
}

//! Custom AVIO context writing into a host output handle

use std::ffi::{c_int, c_void};
use std::io::{Seek, SeekFrom, Write};
use std::ptr;
use std::slice;

use ffmpeg_next::ffi;

use crate::error::{ExportError, ExportResult};
use crate::io::{OutputHandle, AVIO_BUFFER_SIZE};

const AVSEEK_SIZE: c_int = 0x10000;
const AVSEEK_FORCE: c_int = 0x20000;
/// AVERROR(EIO)
const AVERROR_EIO: c_int = -5;

/// Owns an `AVIOContext`, its buffer and the handle behind it
pub struct AvioWriter {
    context: *mut ffi::AVIOContext,
    handle: *mut Box<dyn OutputHandle>,
}

// The raw pointers are owned exclusively by this value
unsafe impl Send for AvioWriter {}

impl AvioWriter {
    pub fn new(handle: Box<dyn OutputHandle>) -> ExportResult<Self> {
        unsafe {
            let buffer = ffi::av_malloc(AVIO_BUFFER_SIZE) as *mut u8;
            if buffer.is_null() {
                return Err(ExportError::memory("AVIO buffer allocation failed"));
            }

            let handle = Box::into_raw(Box::new(handle));
            let context = ffi::avio_alloc_context(
                buffer,
                AVIO_BUFFER_SIZE as c_int,
                1,
                handle as *mut c_void,
                None,
                Some(write_packet),
                Some(seek),
            );
            if context.is_null() {
                ffi::av_free(buffer as *mut c_void);
                drop(Box::from_raw(handle));
                return Err(ExportError::memory("AVIO context allocation failed"));
            }

            Ok(Self { context, handle })
        }
    }

    pub fn as_mut_ptr(&mut self) -> *mut ffi::AVIOContext {
        self.context
    }
}

impl Drop for AvioWriter {
    fn drop(&mut self) {
        unsafe {
            if !self.context.is_null() {
                ffi::avio_flush(self.context);
                // The buffer may have been reallocated by libavformat
                ffi::av_freep(ptr::addr_of_mut!((*self.context).buffer) as *mut c_void);
                ffi::avio_context_free(&mut self.context);
            }
            if !self.handle.is_null() {
                let mut handle = Box::from_raw(self.handle);
                let _ = handle.flush();
                self.handle = ptr::null_mut();
            }
        }
    }
}

unsafe extern "C" fn write_packet(opaque: *mut c_void, buf: *const u8, buf_size: c_int) -> c_int {
    if opaque.is_null() || buf.is_null() || buf_size < 0 {
        return AVERROR_EIO;
    }
    let handle = &mut *(opaque as *mut Box<dyn OutputHandle>);
    let data = slice::from_raw_parts(buf, buf_size as usize);
    match handle.write_all(data) {
        Ok(()) => buf_size,
        Err(_) => AVERROR_EIO,
    }
}

unsafe extern "C" fn seek(opaque: *mut c_void, offset: i64, whence: c_int) -> i64 {
    if opaque.is_null() {
        return AVERROR_EIO as i64;
    }
    let handle = &mut *(opaque as *mut Box<dyn OutputHandle>);
    let whence = whence & !AVSEEK_FORCE;

    let result = if whence == AVSEEK_SIZE {
        stream_size(&mut **handle)
    } else {
        let target = match whence {
            0 if offset >= 0 => SeekFrom::Start(offset as u64),
            1 => SeekFrom::Current(offset),
            2 => SeekFrom::End(offset),
            _ => return AVERROR_EIO as i64,
        };
        handle.seek(target)
    };

    match result {
        Ok(position) => i64::try_from(position).unwrap_or(AVERROR_EIO as i64),
        Err(_) => AVERROR_EIO as i64,
    }
}

fn stream_size(handle: &mut dyn OutputHandle) -> std::io::Result<u64> {
    let current = handle.stream_position()?;
    let end = handle.seek(SeekFrom::End(0))?;
    handle.seek(SeekFrom::Start(current))?;
    Ok(end)
}

//! Output handle abstraction
//!
//! Host platforms address outputs by opaque handles rather than paths. Anything
//! writable and seekable qualifies; the media backend wraps a handle in its own
//! buffered I/O context when muxing into it.

use std::io::{Seek, Write};

/// Size of the buffer the media backend allocates around each handle
pub const AVIO_BUFFER_SIZE: usize = 32 * 1024;

/// Writable, seekable output acquired from an [`crate::ports::OutputProvider`]
pub trait OutputHandle: Write + Seek + Send {}

impl<T: Write + Seek + Send> OutputHandle for T {}

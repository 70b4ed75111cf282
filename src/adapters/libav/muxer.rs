// Container muxer writing through a custom AVIO context

use std::ffi::{c_int, CString};
use std::ptr;

use ffmpeg_next::format::context::Output;
use ffmpeg_next::{ffi, format, Packet};
use tracing::debug;

use super::audio::{LibavAudioCopy, LibavAudioEncoder};
use super::avio::AvioWriter;
use super::video::LibavVideoEncoder;
use super::{from_rational, rational};
use crate::domain::model::Rational;
use crate::error::{ExportError, ExportResult};
use crate::io::OutputHandle;
use crate::ports::Muxer;

/// Open container. The format context is torn down before its I/O context.
pub struct LibavMuxer {
    output: Output,
    _avio: AvioWriter,
    format: String,
    header_written: bool,
}

impl LibavMuxer {
    pub(super) fn new(format: &str, handle: Box<dyn OutputHandle>) -> ExportResult<Self> {
        let name = CString::new(format).map_err(|_| ExportError::invalid(format!("bad muxer name {}", format)))?;
        let mut avio = AvioWriter::new(handle)?;

        let output = unsafe {
            let mut context: *mut ffi::AVFormatContext = ptr::null_mut();
            let ret = ffi::avformat_alloc_output_context2(&mut context, ptr::null(), name.as_ptr(), ptr::null());
            if ret < 0 || context.is_null() {
                return Err(ExportError::invalid(format!(
                    "muxer {} unavailable: {}",
                    format,
                    ffmpeg_next::Error::from(ret)
                )));
            }
            (*context).pb = avio.as_mut_ptr();
            (*context).flags |= ffi::AVFMT_FLAG_CUSTOM_IO as c_int;
            Output::wrap(context)
        };

        debug!("Opened {} muxer", format);
        Ok(Self {
            output,
            _avio: avio,
            format: format.to_string(),
            header_written: false,
        })
    }

    fn context(&mut self) -> *mut ffi::AVFormatContext {
        unsafe { self.output.as_mut_ptr() }
    }

    fn stream_ptr(&mut self, index: usize) -> ExportResult<*mut ffi::AVStream> {
        let context = self.context();
        unsafe {
            if index >= (*context).nb_streams as usize {
                return Err(ExportError::invalid(format!("stream {} does not exist", index)));
            }
            Ok(*(*context).streams.add(index))
        }
    }

    fn add_stream(&mut self) -> ExportResult<*mut ffi::AVStream> {
        let stream = unsafe { ffi::avformat_new_stream(self.context(), ptr::null()) };
        if stream.is_null() {
            return Err(ExportError::memory(format!("{} muxer could not add a stream", self.format)));
        }
        Ok(stream)
    }

    fn stream_time_base(&mut self, index: usize) -> ExportResult<Rational> {
        let stream = self.stream_ptr(index)?;
        Ok(from_rational(unsafe { (*stream).time_base }.into()))
    }
}

fn check(ret: c_int, what: &str) -> ExportResult<()> {
    if ret < 0 {
        Err(ExportError::generic(format!("{}: {}", what, ffmpeg_next::Error::from(ret))))
    } else {
        Ok(())
    }
}

fn fourcc(tag: [u8; 4]) -> u32 {
    u32::from_le_bytes(tag)
}

impl Muxer for LibavMuxer {
    type VideoEncoder = LibavVideoEncoder;
    type AudioEncoder = LibavAudioEncoder;
    type AudioCopy = LibavAudioCopy;
    type Packet = Packet;

    fn requires_global_header(&self) -> bool {
        self.output.format().flags().contains(format::Flags::GLOBAL_HEADER)
    }

    fn new_stream(&mut self) -> ExportResult<usize> {
        let stream = self.add_stream()?;
        Ok(unsafe { (*stream).index } as usize)
    }

    fn bind_video_stream(
        &mut self,
        stream: usize,
        encoder: &LibavVideoEncoder,
        codec_tag: Option<[u8; 4]>,
    ) -> ExportResult<()> {
        let target = self.stream_ptr(stream)?;
        unsafe {
            let context = encoder.as_ptr();
            check(
                ffi::avcodec_parameters_from_context((*target).codecpar, context),
                "copy video parameters",
            )?;
            (*target).time_base = (*context).time_base;
            (*target).avg_frame_rate = (*context).framerate;
            if let Some(tag) = codec_tag {
                (*(*target).codecpar).codec_tag = fourcc(tag);
            }
        }
        Ok(())
    }

    fn add_audio_stream(&mut self, encoder: &LibavAudioEncoder) -> ExportResult<usize> {
        let target = self.add_stream()?;
        unsafe {
            let context = encoder.as_ptr();
            check(
                ffi::avcodec_parameters_from_context((*target).codecpar, context),
                "copy audio parameters",
            )?;
            (*target).time_base = (*context).time_base;
            Ok((*target).index as usize)
        }
    }

    fn add_copied_stream(&mut self, source: &LibavAudioCopy) -> ExportResult<usize> {
        let target = self.add_stream()?;
        unsafe {
            check(
                ffi::avcodec_parameters_copy((*target).codecpar, source.parameters_ptr()),
                "copy source audio parameters",
            )?;
            (*(*target).codecpar).codec_tag = 0;
            (*target).time_base = rational(source.source_time_base()).into();
            Ok((*target).index as usize)
        }
    }

    fn write_header(&mut self) -> ExportResult<()> {
        self.output.write_header()?;
        self.header_written = true;
        Ok(())
    }

    fn write_packet(&mut self, stream: usize, packet: &mut Packet, source_time_base: Rational) -> ExportResult<()> {
        let target = self.stream_time_base(stream)?;
        packet.set_stream(stream);
        packet.set_position(-1);
        packet.rescale_ts(rational(source_time_base), rational(target));
        packet
            .write_interleaved(&mut self.output)
            .map_err(|e| ExportError::io(format!("{} muxer write failed: {}", self.format, e)))
    }

    fn write_trailer(&mut self) -> ExportResult<()> {
        if !self.header_written {
            return Err(ExportError::generic("trailer requested before header"));
        }
        self.output.write_trailer()?;
        Ok(())
    }
}

impl Drop for LibavMuxer {
    fn drop(&mut self) {
        // Output's own drop would close pb; the AVIO context belongs to _avio
        unsafe {
            (*self.output.as_mut_ptr()).pb = ptr::null_mut();
        }
    }
}

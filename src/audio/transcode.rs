//! Decode/resample/encode audio path

use std::path::Path;

use tracing::debug;

use super::fifo::SampleFifo;
use super::samples::{SampleBuffer, SampleSpec};
use super::{negotiate_sample_spec, AudioFailure, AudioStats};
use crate::engine::cancel::CancellationToken;
use crate::error::{ExportError, ExportResult};
use crate::ports::{AudioEncoder, AudioInput, EncoderLookup, MediaBackend, Muxer, PacketOf};

/// Fallback FIFO sizing for encoders without a fixed frame size
const VARIABLE_FRAME_CAPACITY: usize = 1024;

pub struct TranscodePath<B: MediaBackend> {
    input: B::AudioInput,
    encoder: B::AudioEncoder,
    encoder_name: String,
    stream: usize,
    fifo: SampleFifo,
    chunk: SampleBuffer,
    frame: SampleBuffer,
    next_pts: i64,
}

impl<B: MediaBackend> TranscodePath<B> {
    pub fn open(
        backend: &B,
        muxer: &mut B::Muxer,
        preferences: &[EncoderLookup],
        path: &Path,
    ) -> ExportResult<Self> {
        let mut input = backend.open_audio_input(path)?;
        let source = input.source_spec();

        let caps = preferences
            .iter()
            .find_map(|lookup| backend.find_audio_encoder(lookup))
            .ok_or_else(|| ExportError::CodecUnavailable {
                message: "no audio encoder available for this container".to_string(),
            })?;

        let requested = negotiate_sample_spec(&source, &caps);
        let encoder = backend.open_audio_encoder(&caps, &requested, muxer.requires_global_header())?;
        let spec = encoder.spec();
        input.configure_output(&spec)?;

        let frame_size = encoder.frame_size();
        let capacity = if frame_size > 0 { frame_size } else { VARIABLE_FRAME_CAPACITY } * 2;
        let fifo = SampleFifo::new(spec, capacity);

        let stream = muxer.add_audio_stream(&encoder)?;

        Ok(Self {
            input,
            encoder,
            encoder_name: caps.name,
            stream,
            fifo,
            chunk: SampleBuffer::new(spec),
            frame: SampleBuffer::new(spec),
            next_pts: 0,
        })
    }

    pub fn encoder_name(&self) -> &str {
        &self.encoder_name
    }

    pub fn spec(&self) -> SampleSpec {
        self.encoder.spec()
    }

    pub fn run(
        &mut self,
        muxer: &mut B::Muxer,
        packet: &mut PacketOf<B>,
        token: &CancellationToken,
    ) -> Result<AudioStats, AudioFailure> {
        let frame_size = self.encoder.frame_size();
        let mut stats = AudioStats::default();

        loop {
            if token.is_cancelled() {
                return Err(AudioFailure::Fatal(ExportError::Cancelled));
            }
            let more = self
                .input
                .read_samples(&mut self.chunk)
                .map_err(AudioFailure::Recoverable)?;
            if !more {
                break;
            }
            self.fifo
                .write(&self.chunk)
                .map_err(AudioFailure::Recoverable)?;

            if frame_size > 0 {
                while self.fifo.len() >= frame_size {
                    self.encode_from_fifo(frame_size, muxer, packet, &mut stats)?;
                }
            } else if !self.fifo.is_empty() {
                let pending = self.fifo.len();
                self.encode_from_fifo(pending, muxer, packet, &mut stats)?;
            }
        }

        // Remainder goes out as a final partial frame
        if !self.fifo.is_empty() {
            let pending = self.fifo.len();
            self.encode_from_fifo(pending, muxer, packet, &mut stats)?;
        }

        self.encoder
            .send_samples(None, self.next_pts)
            .map_err(AudioFailure::Recoverable)?;
        self.drain(muxer, packet, &mut stats)?;

        debug!(
            "Encoded {} audio samples into {} packets",
            stats.samples, stats.packets
        );
        Ok(stats)
    }

    fn encode_from_fifo(
        &mut self,
        samples: usize,
        muxer: &mut B::Muxer,
        packet: &mut PacketOf<B>,
        stats: &mut AudioStats,
    ) -> Result<(), AudioFailure> {
        let taken = self.fifo.read(samples, &mut self.frame);
        if taken == 0 {
            return Ok(());
        }
        self.encoder
            .send_samples(Some(&self.frame), self.next_pts)
            .map_err(AudioFailure::Recoverable)?;
        self.next_pts += taken as i64;
        stats.samples += taken as u64;
        self.drain(muxer, packet, stats)
    }

    fn drain(
        &mut self,
        muxer: &mut B::Muxer,
        packet: &mut PacketOf<B>,
        stats: &mut AudioStats,
    ) -> Result<(), AudioFailure> {
        let time_base = self.encoder.time_base();
        while self
            .encoder
            .receive_packet(packet)
            .map_err(AudioFailure::Recoverable)?
        {
            muxer
                .write_packet(self.stream, packet, time_base)
                .map_err(AudioFailure::Fatal)?;
            stats.packets += 1;
        }
        Ok(())
    }
}

//! Stream-copy audio path

use std::path::Path;

use tracing::debug;

use super::{AudioFailure, AudioStats};
use crate::engine::cancel::CancellationToken;
use crate::error::{ExportError, ExportResult};
use crate::ports::{AudioCopySource, MediaBackend, Muxer, PacketOf};

/// Source audio packets forwarded unchanged into a matching output stream
pub struct CopyPath<B: MediaBackend> {
    source: B::AudioCopy,
    stream: usize,
}

impl<B: MediaBackend> CopyPath<B> {
    pub fn open(backend: &B, muxer: &mut B::Muxer, path: &Path) -> ExportResult<Self> {
        let source = backend.open_audio_copy(path)?;
        let stream = muxer.add_copied_stream(&source)?;
        Ok(Self { source, stream })
    }

    pub fn run(
        &mut self,
        muxer: &mut B::Muxer,
        packet: &mut PacketOf<B>,
        token: &CancellationToken,
    ) -> Result<AudioStats, AudioFailure> {
        let time_base = self.source.time_base();
        let mut stats = AudioStats::default();

        loop {
            if token.is_cancelled() {
                return Err(AudioFailure::Fatal(ExportError::Cancelled));
            }
            let more = self
                .source
                .read_packet(packet)
                .map_err(AudioFailure::Recoverable)?;
            if !more {
                break;
            }
            muxer
                .write_packet(self.stream, packet, time_base)
                .map_err(AudioFailure::Fatal)?;
            stats.packets += 1;
        }

        debug!("Copied {} audio packets", stats.packets);
        Ok(stats)
    }
}

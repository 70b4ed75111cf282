//! RIFF/WAVE writer for staged clip audio

use std::io::Write;

use crate::error::{ExportError, ExportResult};
use crate::ports::PcmFormat;

const WAVE_FORMAT_PCM: u16 = 1;
const HEADER_LEN: u32 = 44;

/// Write `data` (interleaved little-endian PCM) as a canonical 44-byte-header WAV file
pub fn write_wav<W: Write + ?Sized>(out: &mut W, format: &PcmFormat, data: &[u8]) -> ExportResult<u64> {
    if format.channels == 0 || format.sample_rate == 0 {
        return Err(ExportError::invalid("audio format has no channels or sample rate"));
    }
    if format.bits_per_sample == 0 || format.bits_per_sample % 8 != 0 {
        return Err(ExportError::invalid(format!(
            "unsupported PCM sample width: {} bits",
            format.bits_per_sample
        )));
    }

    let block_align = format.block_align();
    // Drop a trailing partial sample frame
    let data_len = data.len() - data.len() % block_align as usize;
    let data_len_u32 = u32::try_from(data_len)
        .ok()
        .filter(|len| len.checked_add(HEADER_LEN).is_some())
        .ok_or_else(|| ExportError::invalid("audio track too large for a WAV file"))?;
    let byte_rate = format.sample_rate * block_align as u32;

    let mut header = Vec::with_capacity(HEADER_LEN as usize);
    header.extend_from_slice(b"RIFF");
    header.extend_from_slice(&(HEADER_LEN - 8 + data_len_u32).to_le_bytes());
    header.extend_from_slice(b"WAVE");
    header.extend_from_slice(b"fmt ");
    header.extend_from_slice(&16u32.to_le_bytes());
    header.extend_from_slice(&WAVE_FORMAT_PCM.to_le_bytes());
    header.extend_from_slice(&format.channels.to_le_bytes());
    header.extend_from_slice(&format.sample_rate.to_le_bytes());
    header.extend_from_slice(&byte_rate.to_le_bytes());
    header.extend_from_slice(&block_align.to_le_bytes());
    header.extend_from_slice(&format.bits_per_sample.to_le_bytes());
    header.extend_from_slice(b"data");
    header.extend_from_slice(&data_len_u32.to_le_bytes());

    let written: std::io::Result<()> = (|| {
        out.write_all(&header)?;
        out.write_all(&data[..data_len])?;
        out.flush()
    })();
    written.map_err(|e| ExportError::io(format!("failed to write WAV data: {}", e)))?;

    Ok(HEADER_LEN as u64 + data_len as u64)
}

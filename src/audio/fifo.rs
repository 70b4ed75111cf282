//! Sample accumulation buffer
//!
//! Encoders with a fixed frame size must be fed exactly N samples per call, while
//! the resampler hands out whatever it has. The FIFO sits in between.

use std::collections::VecDeque;

use super::samples::{SampleBuffer, SampleSpec};
use crate::error::{ExportError, ExportResult};

/// Growable per-plane sample queue
#[derive(Debug)]
pub struct SampleFifo {
    spec: SampleSpec,
    planes: Vec<VecDeque<u8>>,
    samples: usize,
}

impl SampleFifo {
    /// Allocate with room for `capacity` samples; the queue grows on demand
    pub fn new(spec: SampleSpec, capacity: usize) -> Self {
        let bytes = capacity * spec.plane_stride();
        Self {
            spec,
            planes: (0..spec.planes())
                .map(|_| VecDeque::with_capacity(bytes))
                .collect(),
            samples: 0,
        }
    }

    pub fn spec(&self) -> SampleSpec {
        self.spec
    }

    /// Samples per channel currently queued
    pub fn len(&self) -> usize {
        self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }

    /// Append every sample in `buffer`
    pub fn write(&mut self, buffer: &SampleBuffer) -> ExportResult<()> {
        if buffer.spec() != self.spec {
            return Err(ExportError::frame(format!(
                "sample layout mismatch: fifo {}@{}x{}, buffer {}@{}x{}",
                self.spec.format.name(),
                self.spec.sample_rate,
                self.spec.channels,
                buffer.spec().format.name(),
                buffer.spec().sample_rate,
                buffer.spec().channels
            )));
        }

        let bytes = buffer.samples() * self.spec.plane_stride();
        for (queue, plane) in self.planes.iter_mut().zip(buffer.planes()) {
            if plane.len() < bytes {
                return Err(ExportError::frame("sample plane shorter than its sample count"));
            }
            queue.extend(&plane[..bytes]);
        }
        self.samples += buffer.samples();
        Ok(())
    }

    /// Move up to `samples` samples into `out`, returning how many were moved
    pub fn read(&mut self, samples: usize, out: &mut SampleBuffer) -> usize {
        let take = samples.min(self.samples);
        let bytes = take * self.spec.plane_stride();

        out.clear();
        for (queue, plane) in self.planes.iter_mut().zip(out.planes_mut().iter_mut()) {
            plane.extend(queue.drain(..bytes));
        }
        out.set_samples(take);
        self.samples -= take;
        take
    }
}

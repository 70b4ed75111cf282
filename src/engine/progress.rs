//! Progress reporting for export jobs
//!
//! A job reports integer percentages through a [`ProgressReporter`], which
//! guarantees each sink sees a non-decreasing sequence with every value at most
//! once, and nothing after cancellation was observed.

use std::io::Write;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::info;

use super::cancel::CancellationToken;
use crate::ports::ProgressSink;

/// Cancellation token plus progress sink for one job
#[derive(Clone)]
pub struct JobControl {
    pub token: CancellationToken,
    pub sink: Arc<dyn ProgressSink>,
}

impl JobControl {
    pub fn new(token: CancellationToken, sink: Arc<dyn ProgressSink>) -> Self {
        Self { token, sink }
    }

    /// Control with a fresh token and no progress output
    pub fn silent() -> Self {
        Self::new(CancellationToken::new(), Arc::new(NoOpProgress))
    }

    pub fn reporter(&self) -> ProgressReporter {
        ProgressReporter::new(self.token.clone(), self.sink.clone())
    }
}

/// Monotonic, de-duplicating, cancellation-aware progress front end
pub struct ProgressReporter {
    token: CancellationToken,
    sink: Arc<dyn ProgressSink>,
    last: Mutex<Option<u8>>,
}

impl ProgressReporter {
    pub fn new(token: CancellationToken, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            token,
            sink,
            last: Mutex::new(None),
        }
    }

    /// Deliver `percent` unless it would repeat or go backwards
    pub fn report(&self, percent: u8) {
        let percent = percent.min(100);
        if self.token.is_cancelled() {
            return;
        }

        if let Ok(mut last) = self.last.lock() {
            if matches!(*last, Some(previous) if previous >= percent) {
                return;
            }
            *last = Some(percent);
        } else {
            return;
        }

        self.sink.on_progress(percent);
    }

    /// Report completion of frame `index` (zero-based) out of `total`
    pub fn report_frame(&self, index: u32, total: u32) {
        self.report(frame_percent(index, total));
    }

    pub fn last_reported(&self) -> Option<u8> {
        self.last.lock().ok().and_then(|last| *last)
    }
}

/// `round(100 * (index + 1) / total)`
pub fn frame_percent(index: u32, total: u32) -> u8 {
    if total == 0 {
        return 100;
    }
    let value = (100.0 * (index as f64 + 1.0) / total as f64).round();
    value.clamp(0.0, 100.0) as u8
}

/// Discards progress
pub struct NoOpProgress;

impl ProgressSink for NoOpProgress {
    fn on_progress(&self, _percent: u8) {}
}

/// Logs each percentage through tracing
pub struct LogProgress {
    label: String,
}

impl LogProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into() }
    }
}

impl ProgressSink for LogProgress {
    fn on_progress(&self, percent: u8) {
        info!("{}: {}%", self.label, percent);
    }
}

/// Console progress bar on stderr
pub struct ConsoleProgress {
    bar_length: usize,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self { bar_length: 30 }
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ConsoleProgress {
    fn on_progress(&self, percent: u8) {
        let filled = percent as usize * self.bar_length / 100;
        let bar = "#".repeat(filled) + &"-".repeat(self.bar_length - filled);
        let mut stderr = std::io::stderr().lock();
        let _ = write!(stderr, "\r[{}] {:>3}%", bar, percent);
        if percent >= 100 {
            let _ = writeln!(stderr);
        }
        let _ = stderr.flush();
    }
}

#[derive(Serialize)]
struct ProgressEvent {
    progress: u8,
}

/// Prints `{"progress":N}` lines on stdout
pub struct JsonLinesProgress;

impl ProgressSink for JsonLinesProgress {
    fn on_progress(&self, percent: u8) {
        if let Ok(line) = serde_json::to_string(&ProgressEvent { progress: percent }) {
            println!("{}", line);
        }
    }
}

/// Forwards progress across threads through a bounded channel
pub struct ChannelProgress {
    sender: Mutex<SyncSender<u8>>,
}

impl ChannelProgress {
    /// Sink and receiver pair; capacity covers one job's 0..=100 values
    pub fn bounded() -> (Self, Receiver<u8>) {
        let (sender, receiver) = mpsc::sync_channel(101);
        (
            Self {
                sender: Mutex::new(sender),
            },
            receiver,
        )
    }
}

impl ProgressSink for ChannelProgress {
    fn on_progress(&self, percent: u8) {
        if let Ok(sender) = self.sender.lock() {
            // A dropped receiver only means nobody is listening
            let _ = sender.send(percent);
        }
    }
}

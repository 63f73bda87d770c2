//! Gateway loop: serial lines in, stored frames out.
//!
//! Runs on a blocking thread. Each iteration reads one line, extracts its frame and
//! hands it to the [`FrameProcessor`]. Noise lines and per-frame failures are
//! logged and skipped; only a failing serial link ends the loop.

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::frame::processor::{FrameProcessor, StoredFrame};
use crate::frame::{extract_frame, summarize};
use crate::logutil::preview;
use crate::metrics;
use crate::serial::{LineReader, ReadOutcome};

pub struct Gateway {
    reader: LineReader,
    processor: FrameProcessor,
    shutdown: Arc<AtomicBool>,
}

impl Gateway {
    pub fn new(reader: LineReader, processor: FrameProcessor) -> Self {
        Self {
            reader,
            processor,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that stops [`run`](Self::run) at the next read boundary (a line or a
    /// read timeout).
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Read and process lines until shutdown is requested or the link closes.
    /// Returns an error only when the serial link itself fails.
    pub fn run(&mut self) -> Result<()> {
        info!(
            "Gateway loop started (local callsign {})",
            self.processor.local_callsign()
        );
        while !self.shutdown.load(Ordering::Relaxed) {
            let outcome = self
                .reader
                .read_line()
                .context("Gateway loop stopped on serial failure")?;
            match outcome {
                ReadOutcome::Idle => continue,
                ReadOutcome::Closed => {
                    warn!("Serial link closed; gateway loop exiting");
                    return Ok(());
                }
                ReadOutcome::Line(line) => {
                    self.handle_line(&line);
                }
            }
        }
        info!("Gateway loop stopped on request");
        Ok(())
    }

    /// Extract, normalize and persist the frame carried by one raw line.
    pub fn handle_line(&mut self, line: &str) -> Option<StoredFrame> {
        if line.is_empty() {
            return None;
        }
        metrics::inc_lines_read();
        let Some(frame) = extract_frame(line) else {
            metrics::inc_lines_without_frame();
            debug!("No frame in line: {}", preview(line, 160));
            return None;
        };
        match self.processor.process(frame) {
            Ok(stored) => {
                metrics::inc_frames_stored();
                info!(
                    "Frame stored #{}: {}",
                    stored.row_id,
                    preview(&summarize(&stored.kind, &stored.frame), 400)
                );
                Some(stored)
            }
            Err(e) => {
                metrics::inc_frames_failed();
                error!("Frame processing failed: {} (line: {})", e, preview(line, 160));
                None
            }
        }
    }

    pub fn processor(&self) -> &FrameProcessor {
        &self.processor
    }
}

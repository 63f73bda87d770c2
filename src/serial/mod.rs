//! # Serial Link
//!
//! The MeshCom node is reached over one serial port that carries traffic in both
//! directions: JSON frames come in as text lines, relay commands go out as text
//! lines. The port handle is split in two:
//!
//! - [`LineReader`] is owned by the gateway loop. Only one actor reads, so it is
//!   not locked.
//! - [`SerialWriter`] is cheap to clone and shared by every actor that sends to the
//!   device. Each [`SerialWriter::write_line`] holds a mutex for exactly one
//!   write-and-flush, so lines from different actors never interleave.
//!
//! Both halves take any `Read`/`Write` implementation, which lets tests drive the
//! gateway with in-memory streams.
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud_rate = 115200
//! timeout_secs = 1
//! ```

use anyhow::{anyhow, Result};
use log::{debug, trace, warn};
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::sync::{Arc, Mutex};

#[cfg(feature = "serial")]
use log::info;

use crate::config::SerialConfig;
use crate::logutil::preview;

/// Longest unterminated line kept in memory; anything longer is dropped.
const MAX_LINE_BYTES: usize = 16 * 1024;

/// Outcome of one blocking read attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A complete line, trailing whitespace removed. May be empty.
    Line(String),
    /// The read timed out before a full line arrived; nothing to process.
    Idle,
    /// The underlying stream reached end of file.
    Closed,
}

/// Line-oriented reader over the inbound half of the link.
pub struct LineReader {
    inner: BufReader<Box<dyn Read + Send>>,
    /// Bytes of a line whose terminator has not arrived yet (kept across timeouts).
    pending: Vec<u8>,
}

impl LineReader {
    pub fn new<R: Read + Send + 'static>(source: R) -> Self {
        Self {
            inner: BufReader::new(Box::new(source)),
            pending: Vec::with_capacity(256),
        }
    }

    /// Block until a full line, a read timeout or end of stream.
    ///
    /// Bytes that are not valid UTF-8 are replaced rather than rejected. A partial
    /// line interrupted by a timeout is retained and completed by a later call.
    pub fn read_line(&mut self) -> Result<ReadOutcome> {
        loop {
            let available = match self.inner.fill_buf() {
                Ok(bytes) => bytes,
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    if !self.pending.is_empty() {
                        trace!("Read timeout with {} pending bytes", self.pending.len());
                    }
                    return Ok(ReadOutcome::Idle);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {
                    debug!("Serial read interrupted (EINTR), retrying");
                    continue;
                }
                Err(e) => return Err(anyhow!("Serial read error: {}", e)),
            };

            if available.is_empty() {
                if self.pending.is_empty() {
                    return Ok(ReadOutcome::Closed);
                }
                // trailing bytes right before EOF
                return Ok(ReadOutcome::Line(self.take_line()));
            }

            if let Some(pos) = available.iter().position(|&b| b == b'\n') {
                self.pending.extend_from_slice(&available[..=pos]);
                self.inner.consume(pos + 1);
                return Ok(ReadOutcome::Line(self.take_line()));
            }

            let taken = available.len();
            self.pending.extend_from_slice(available);
            self.inner.consume(taken);
            if self.pending.len() > MAX_LINE_BYTES {
                warn!(
                    "Discarding {} bytes without a line terminator: {}",
                    self.pending.len(),
                    preview(&String::from_utf8_lossy(&self.pending), 80)
                );
                self.pending.clear();
            }
        }
    }

    fn take_line(&mut self) -> String {
        let bytes = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&bytes).trim_end().to_string()
    }
}

/// Shared, mutually exclusive outbound half of the link.
#[derive(Clone)]
pub struct SerialWriter {
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl SerialWriter {
    pub fn new<W: Write + Send + 'static>(sink: W) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(sink))),
        }
    }

    /// Write `line` plus a `\n` terminator and flush, as one uninterruptible unit
    /// with respect to other clones of this writer.
    pub fn write_line(&self, line: &str) -> Result<()> {
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');

        let mut guard = self
            .sink
            .lock()
            .map_err(|_| anyhow!("Serial writer lock poisoned"))?;
        guard
            .write_all(&buf)
            .map_err(|e| anyhow!("Failed to write to serial port: {}", e))?;
        guard
            .flush()
            .map_err(|e| anyhow!("Failed to flush serial port: {}", e))?;
        drop(guard);

        debug!("Serial TX: {}", preview(line, 200));
        Ok(())
    }
}

/// Opens the physical device and hands out its two halves.
pub struct SerialLink;

impl SerialLink {
    /// Open the configured port (8N1), assert DTR/RTS and drop any stale boot
    /// output, then split the handle into reader and writer.
    #[cfg(feature = "serial")]
    pub async fn open(config: &SerialConfig) -> Result<(LineReader, SerialWriter)> {
        use tokio::time::{sleep, Duration};

        info!(
            "Opening MeshCom device on {} at {} baud",
            config.port, config.baud_rate
        );
        let mut builder = serialport::new(&config.port, config.baud_rate)
            .timeout(Duration::from_secs(config.timeout_secs));
        #[cfg(unix)]
        {
            builder = builder
                .data_bits(serialport::DataBits::Eight)
                .stop_bits(serialport::StopBits::One)
                .parity(serialport::Parity::None);
        }
        let mut port = builder
            .open()
            .map_err(|e| anyhow!("Failed to open serial port {}: {}", config.port, e))?;
        // ESP32 based nodes need DTR/RTS asserted to leave reset
        let _ = port.write_data_terminal_ready(true);
        let _ = port.write_request_to_send(true);
        sleep(Duration::from_millis(150)).await;
        if let Err(e) = port.clear(serialport::ClearBuffer::Input) {
            debug!("Could not purge serial input buffer: {}", e);
        }

        let write_half = port
            .try_clone()
            .map_err(|e| anyhow!("Failed to clone serial port handle {}: {}", config.port, e))?;
        debug!("Serial port {} ready", config.port);
        Ok((LineReader::new(port), SerialWriter::new(write_half)))
    }

    #[cfg(not(feature = "serial"))]
    pub async fn open(config: &SerialConfig) -> Result<(LineReader, SerialWriter)> {
        Err(anyhow!(
            "Serial support not compiled in; cannot open {} (rebuild with the 'serial' feature)",
            config.port
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::{self, Cursor};

    /// Replays a script of read results, one per `read` call.
    struct Scripted(VecDeque<io::Result<Vec<u8>>>);

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.pop_front() {
                None => Ok(0),
                Some(Err(e)) => Err(e),
                Some(Ok(bytes)) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
            }
        }
    }

    #[test]
    fn reads_lines_then_reports_closed() {
        let mut reader = LineReader::new(Cursor::new(b"first\r\nsecond  \nlast".to_vec()));
        assert_eq!(reader.read_line().unwrap(), ReadOutcome::Line("first".into()));
        assert_eq!(reader.read_line().unwrap(), ReadOutcome::Line("second".into()));
        assert_eq!(reader.read_line().unwrap(), ReadOutcome::Line("last".into()));
        assert_eq!(reader.read_line().unwrap(), ReadOutcome::Closed);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut reader = LineReader::new(Cursor::new(b"ab\xffcd\n".to_vec()));
        assert_eq!(reader.read_line().unwrap(), ReadOutcome::Line("ab\u{fffd}cd".into()));
    }

    #[test]
    fn timeout_keeps_partial_line() {
        let script = VecDeque::from(vec![
            Ok(b"{\"type\":".to_vec()),
            Err(io::Error::new(ErrorKind::TimedOut, "timeout")),
            Ok(b"\"msg\"}\n".to_vec()),
        ]);
        let mut reader = LineReader::new(Scripted(script));
        assert_eq!(reader.read_line().unwrap(), ReadOutcome::Idle);
        assert_eq!(
            reader.read_line().unwrap(),
            ReadOutcome::Line("{\"type\":\"msg\"}".into())
        );
    }

    #[test]
    fn interrupted_read_is_retried_and_other_errors_surface() {
        let script = VecDeque::from(vec![
            Err(io::Error::new(ErrorKind::Interrupted, "eintr")),
            Ok(b"ok\n".to_vec()),
            Err(io::Error::new(ErrorKind::BrokenPipe, "unplugged")),
        ]);
        let mut reader = LineReader::new(Scripted(script));
        assert_eq!(reader.read_line().unwrap(), ReadOutcome::Line("ok".into()));
        assert!(reader.read_line().is_err());
    }

    #[test]
    fn runaway_line_is_discarded_and_reading_recovers() {
        let mut script: VecDeque<io::Result<Vec<u8>>> = (0..(MAX_LINE_BYTES / 1024 + 2))
            .map(|_| Ok(vec![b'x'; 1024]))
            .collect();
        script.push_back(Ok(b"tail\n".to_vec()));
        script.push_back(Ok(b"{\"type\":\"msg\"}\n".to_vec()));
        let mut reader = LineReader::new(Scripted(script));

        // 17 KiB overflow the cap and are dropped; the 18th chunk starts afresh
        let expected = format!("{}tail", "x".repeat(1024));
        assert_eq!(reader.read_line().unwrap(), ReadOutcome::Line(expected));
        assert_eq!(
            reader.read_line().unwrap(),
            ReadOutcome::Line("{\"type\":\"msg\"}".into())
        );
    }

    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_line_appends_terminator() {
        let sink = SharedSink::default();
        let writer = SerialWriter::new(sink.clone());
        writer.write_line("::hello there").unwrap();
        assert_eq!(&*sink.0.lock().unwrap(), b"::hello there\n");
    }
}

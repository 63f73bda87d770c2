//! Test utilities & fixtures shared by the integration tests.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// In-memory stand-in for the outbound serial port. Clones share one buffer.
///
/// Accepts at most one byte per `write` call so `write_all` has to loop, which
/// makes unsynchronized writers interleave visibly.
#[derive(Clone, Default)]
#[allow(dead_code)] // not every test binary uses every helper
pub struct CaptureSink(Arc<Mutex<Vec<u8>>>);

#[allow(dead_code)]
impl CaptureSink {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for CaptureSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.0.lock().unwrap().push(buf[0]);
        std::thread::yield_now();
        Ok(1)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

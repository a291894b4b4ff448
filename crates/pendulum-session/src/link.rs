// ─────────────────────────────────────────────────────────────────────
// SCPN Cart-Pendulum Rig — Serial Link
// © 1998–2026 Miroslav Šotek. All rights reserved.
// ─────────────────────────────────────────────────────────────────────
//! Line-oriented transport over the cart's serial port.
//!
//! The reader and writer halves are split so the reader task can block
//! on the line while the control loop writes commands independently.
//! Everything above this module talks to the traits; the hardware port
//! is one implementation.

use std::io::{BufRead, BufReader, Read, Write};
use std::time::Duration;

use pendulum_types::config::RigConfig;
use pendulum_types::error::{PendulumError, PendulumResult};

/// Blocking line input with driver-level timeout.
pub trait LineReader: Send {
    /// One line, newline stripped. Timeouts and device errors surface
    /// as `PendulumError::Link` for the reconnect path.
    fn read_line(&mut self) -> PendulumResult<String>;

    /// Drop whatever is queued on the input side, to resynchronize
    /// after a malformed line.
    fn flush_input(&mut self) -> PendulumResult<()>;
}

/// Line output.
pub trait LineWriter: Send {
    fn write_line(&mut self, message: &str) -> PendulumResult<()>;
}

/// Reader half of the hardware port.
pub struct SerialReader {
    reader: BufReader<Box<dyn serialport::SerialPort>>,
}

/// Writer half of the hardware port.
pub struct SerialWriter {
    port: Box<dyn serialport::SerialPort>,
}

/// Open the configured port and split it. Sends nothing.
pub fn open(cfg: &RigConfig) -> PendulumResult<(SerialReader, SerialWriter)> {
    let path = match &cfg.port {
        Some(p) => p.clone(),
        None => probe_port()?,
    };
    let port = serialport::new(&path, cfg.baud_rate)
        .timeout(Duration::from_secs_f64(cfg.timeout_s))
        .open()
        .map_err(|e| PendulumError::Link(format!("open {path}: {e}")))?;
    let writer = port
        .try_clone()
        .map_err(|e| PendulumError::Link(format!("clone {path}: {e}")))?;
    Ok((
        SerialReader {
            reader: BufReader::new(port),
        },
        SerialWriter { port: writer },
    ))
}

/// First USB serial device on the machine; the cart enumerates as one.
pub fn probe_port() -> PendulumResult<String> {
    let ports =
        serialport::available_ports().map_err(|e| PendulumError::Link(e.to_string()))?;
    ports
        .into_iter()
        .find(|p| matches!(p.port_type, serialport::SerialPortType::UsbPort(_)))
        .map(|p| p.port_name)
        .ok_or_else(|| PendulumError::Link("no USB serial device found".to_string()))
}

/// Handshake: announce the host and read the firmware's banner.
pub fn handshake(
    reader: &mut dyn LineReader,
    writer: &mut dyn LineWriter,
) -> PendulumResult<String> {
    writer.write_line(crate::protocol::CONNECTION)?;
    reader.read_line()
}

impl LineReader for SerialReader {
    fn read_line(&mut self) -> PendulumResult<String> {
        let mut line = String::new();
        let n = self
            .reader
            .read_line(&mut line)
            .map_err(|e| PendulumError::Link(format!("serial read: {e}")))?;
        if n == 0 {
            return Err(PendulumError::Link("serial port closed".to_string()));
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }

    fn flush_input(&mut self) -> PendulumResult<()> {
        // Discard both the BufReader's backlog and the driver queue.
        let buffered = self.reader.buffer().len();
        self.reader.consume(buffered);
        self.reader
            .get_ref()
            .clear(serialport::ClearBuffer::Input)
            .map_err(|e| PendulumError::Link(format!("clear input: {e}")))
    }
}

impl LineWriter for SerialWriter {
    fn write_line(&mut self, message: &str) -> PendulumResult<()> {
        self.port
            .write_all(message.as_bytes())
            .map_err(|e| PendulumError::Link(format!("serial write: {e}")))?;
        self.port
            .flush()
            .map_err(|e| PendulumError::Link(format!("serial flush: {e}")))
    }
}

/// Line transport over arbitrary byte streams. Covers pipes and
/// in-memory cursors; scripted runs use it to replay captured sessions.
pub struct IoLink<R, W> {
    reader: BufReader<R>,
    writer: W,
}

impl<R: Read + Send, W: Write + Send> IoLink<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    pub fn into_writer(self) -> W {
        self.writer
    }
}

impl<R: Read + Send, W: Write + Send> LineReader for IoLink<R, W> {
    fn read_line(&mut self) -> PendulumResult<String> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line)?;
        if n == 0 {
            return Err(PendulumError::Link("stream exhausted".to_string()));
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }

    fn flush_input(&mut self) -> PendulumResult<()> {
        let buffered = self.reader.buffer().len();
        self.reader.consume(buffered);
        Ok(())
    }
}

impl<R: Read + Send, W: Write + Send> LineWriter for IoLink<R, W> {
    fn write_line(&mut self, message: &str) -> PendulumResult<()> {
        self.writer.write_all(message.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted transports shared by the session and harness tests.

    use super::{LineReader, LineWriter};
    use pendulum_types::error::{PendulumError, PendulumResult};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Replays a fixed sequence of lines, then reports a closed link.
    pub struct ScriptedReader {
        lines: VecDeque<String>,
        flushes: Arc<AtomicUsize>,
    }

    impl ScriptedReader {
        pub fn new<I: IntoIterator<Item = S>, S: Into<String>>(lines: I) -> Self {
            Self {
                lines: lines.into_iter().map(Into::into).collect(),
                flushes: Arc::new(AtomicUsize::new(0)),
            }
        }

        /// Counter handle that stays valid after the reader moves into
        /// its task.
        pub fn flush_counter(&self) -> Arc<AtomicUsize> {
            Arc::clone(&self.flushes)
        }
    }

    impl LineReader for ScriptedReader {
        fn read_line(&mut self) -> PendulumResult<String> {
            self.lines
                .pop_front()
                .ok_or_else(|| PendulumError::Link("script exhausted".to_string()))
        }

        fn flush_input(&mut self) -> PendulumResult<()> {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Records everything written, visible to the test thread.
    #[derive(Clone, Default)]
    pub struct RecordingWriter {
        pub sent: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingWriter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn lines(&self) -> Vec<String> {
            self.sent.lock().expect("test mutex").clone()
        }
    }

    impl LineWriter for RecordingWriter {
        fn write_line(&mut self, message: &str) -> PendulumResult<()> {
            self.sent.lock().expect("test mutex").push(message.to_string());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_io_link_reads_lines_and_strips_endings() {
        let input = Cursor::new(b"first\r\nsecond\nthird".to_vec());
        let mut link = IoLink::new(input, Vec::new());
        assert_eq!(link.read_line().unwrap(), "first");
        assert_eq!(link.read_line().unwrap(), "second");
        assert_eq!(link.read_line().unwrap(), "third");
        assert!(link.read_line().is_err(), "exhausted stream is a link error");
    }

    #[test]
    fn test_io_link_writes_verbatim() {
        let input = Cursor::new(Vec::new());
        let mut link = IoLink::new(input, Vec::new());
        link.write_line("NR\n").unwrap();
        link.write_line("1.500\n").unwrap();
        assert_eq!(link.into_writer(), b"NR\n1.500\n".to_vec());
    }

    #[test]
    fn test_handshake_announces_and_reads_banner() {
        let mut reader = testing::ScriptedReader::new(["Cart ready."]);
        let mut writer = testing::RecordingWriter::new();
        let banner = handshake(&mut reader, &mut writer).unwrap();
        assert_eq!(banner, "Cart ready.");
        assert_eq!(writer.lines(), vec!["connection\n".to_string()]);
    }
}

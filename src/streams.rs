//! Stream line reader: turns a child's byte stream into timestamped lines.

use std::io::{BufRead, Read};
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};

/// Which stream a [`LogLine`] originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// A single captured line of output.
#[derive(Debug, Clone)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub stream: Stream,
    pub content: String,
}

/// Spawns a dedicated thread that reads `reader` line by line, invoking
/// `on_line` for each complete line and for any non-empty trailing fragment
/// left at end-of-stream. Terminates when the underlying stream closes.
pub fn spawn_reader<R, F>(
    service: String,
    stream: Stream,
    mut reader: R,
    mut on_line: F,
) -> JoinHandle<()>
where
    R: BufRead + Read + Send + 'static,
    F: FnMut(LogLine) + Send + 'static,
{
    thread::spawn(move || {
        let mut buf: Vec<u8> = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    if buf.last() == Some(&b'\n') {
                        buf.pop();
                        if buf.last() == Some(&b'\r') {
                            buf.pop();
                        }
                    }
                    let content = String::from_utf8_lossy(&buf).into_owned();
                    on_line(LogLine {
                        timestamp: Utc::now(),
                        service: service.clone(),
                        stream,
                        content,
                    });
                }
                Err(_) => break,
            }
        }
    })
}

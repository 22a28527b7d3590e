//! Tracing setup.
//!
//! Formatted events go to the configured log file and are also teed line by line into a
//! bounded channel that feeds the in-app log pane. Nothing is written to stdout, which
//! belongs to the terminal UI.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, Sender};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

/// Lines kept in flight for the log pane before new ones are dropped.
const PANE_CHANNEL_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct TeeSink {
    file: Option<Arc<Mutex<File>>>,
    lines: Sender<String>,
}

impl TeeSink {
    pub fn new(file: Option<File>, lines: Sender<String>) -> Self {
        Self {
            file: file.map(|f| Arc::new(Mutex::new(f))),
            lines,
        }
    }
}

/// Buffers one formatted event and flushes it on drop.
pub struct EventWriter {
    sink: TeeSink,
    buf: Vec<u8>,
}

impl Write for EventWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for EventWriter {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        if let Some(file) = &self.sink.file {
            let mut file = file.lock().unwrap_or_else(|p| p.into_inner());
            let _ = file.write_all(&self.buf);
        }
        let text = String::from_utf8_lossy(&self.buf);
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let _ = self.sink.lines.try_send(line.to_string());
        }
    }
}

impl<'a> MakeWriter<'a> for TeeSink {
    type Writer = EventWriter;

    fn make_writer(&'a self) -> Self::Writer {
        EventWriter {
            sink: self.clone(),
            buf: Vec::new(),
        }
    }
}

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("create log dir {:?}", parent))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {:?}", path))
}

/// Install the global subscriber. Returns the receiving end of the log-pane channel.
pub fn init(log_file: &Path, level: &str) -> Result<Receiver<String>> {
    let (tx, rx) = crossbeam_channel::bounded(PANE_CHANNEL_CAPACITY);
    let sink = TeeSink::new(Some(open_log_file(log_file)?), tx);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},symphonia=warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(sink)
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("install tracing subscriber: {e}"))?;
    Ok(rx)
}

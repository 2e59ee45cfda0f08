//! Ready-made [`ReadingSink`] implementations.

use crate::aggregator::ReadingSink;
use level_common::config::SensorConfig;
use level_common::Reading;
use serde::Serialize;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tracing::{info, warn};

/// Logs every reading through `tracing`.
#[derive(Debug, Clone)]
pub struct LogSink {
    sensor: String,
}

impl LogSink {
    /// Create a sink labelling readings with `sensor`.
    pub fn new(sensor: impl Into<String>) -> Self {
        Self {
            sensor: sensor.into(),
        }
    }
}

impl ReadingSink for LogSink {
    fn publish(&mut self, reading: Reading) {
        info!(sensor = %self.sensor, value = reading.value(), "Got value");
    }
}

/// One published reading as written by [`JsonLinesSink`].
#[derive(Debug, Serialize)]
struct PublishedReading<'a> {
    sensor: &'a str,
    unit: &'a str,
    accuracy_decimals: u8,
    value: Reading,
    timestamp: String,
}

/// Writes one JSON object per reading, newline separated.
#[derive(Debug)]
pub struct JsonLinesSink<W: Write + Send> {
    writer: W,
    sensor: SensorConfig,
    write_errors: u64,
}

impl<W: Write + Send> JsonLinesSink<W> {
    /// Create a sink describing readings with `sensor`.
    pub fn new(writer: W, sensor: SensorConfig) -> Self {
        Self {
            writer,
            sensor,
            write_errors: 0,
        }
    }

    /// Number of readings that could not be written.
    pub fn write_errors(&self) -> u64 {
        self.write_errors
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> ReadingSink for JsonLinesSink<W> {
    fn publish(&mut self, reading: Reading) {
        let record = PublishedReading {
            sensor: &self.sensor.name,
            unit: &self.sensor.unit,
            accuracy_decimals: self.sensor.accuracy_decimals,
            value: reading,
            timestamp: humantime::format_rfc3339_millis(SystemTime::now()).to_string(),
        };

        let result = serde_json::to_writer(&mut self.writer, &record)
            .map_err(std::io::Error::from)
            .and_then(|()| self.writer.write_all(b"\n"))
            .and_then(|()| self.writer.flush());

        if let Err(e) = result {
            self.write_errors += 1;
            warn!(error = %e, value = reading.value(), "Failed to write reading");
        }
    }
}

/// Keeps every published reading in memory.
///
/// Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    readings: Arc<Mutex<Vec<Reading>>>,
}

impl RecordingSink {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All readings published so far.
    pub fn readings(&self) -> Vec<Reading> {
        self.readings
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Most recent reading.
    pub fn last(&self) -> Option<Reading> {
        self.readings().last().copied()
    }
}

impl ReadingSink for RecordingSink {
    fn publish(&mut self, reading: Reading) {
        match self.readings.lock() {
            Ok(mut readings) => readings.push(reading),
            Err(poisoned) => poisoned.into_inner().push(reading),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_lines_format() {
        let mut sink = JsonLinesSink::new(Vec::new(), SensorConfig::default());
        sink.publish(Reading::saturating(150));
        sink.publish(Reading::saturating(37));

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["sensor"], "Water level");
        assert_eq!(first["unit"], "%");
        assert_eq!(first["value"], 150);
        assert!(first["timestamp"].as_str().unwrap().ends_with('Z'));

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["value"], 37);
    }

    #[test]
    fn test_json_sink_counts_write_errors() {
        struct Broken;

        impl Write for Broken {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut sink = JsonLinesSink::new(Broken, SensorConfig::default());
        sink.publish(Reading::saturating(1));
        assert_eq!(sink.write_errors(), 1);
    }

    #[test]
    fn test_recording_sink_shares_buffer() {
        let recorder = RecordingSink::new();
        let mut sink = recorder.clone();
        sink.publish(Reading::saturating(5));
        sink.publish(Reading::saturating(6));
        assert_eq!(recorder.readings().len(), 2);
        assert_eq!(recorder.last(), Some(Reading::saturating(6)));
    }
}

//! In-process ring buffer of structured log events.
//!
//! A `tracing` layer copies every event into a bounded ring so the admin
//! API can serve recent logs as JSON or plain text without touching disk.

use lazy_static::lazy_static;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

pub const DEFAULT_LOG_CAPACITY: usize = 1000;

lazy_static! {
    /// Process-wide buffer read by the admin `/api/v2/logs` handler.
    pub static ref LOG_BUFFER: Arc<RingBuffer> = Arc::new(RingBuffer::new(DEFAULT_LOG_CAPACITY));
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub time: String,
    pub level: String,
    pub msg: String,
    #[serde(flatten)]
    pub fields: HashMap<String, String>,
}

#[derive(Debug)]
pub struct RingBuffer {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        RingBuffer {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn push(&self, entry: LogEntry) {
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Line-oriented rendering for `text/plain` consumers.
    pub fn as_plain_text(&self) -> String {
        self.snapshot()
            .iter()
            .map(|entry| {
                let mut line = format!("time=\"{}\" level={} msg=\"{}\"", entry.time, entry.level, entry.msg);
                let mut keys: Vec<_> = entry.fields.keys().collect();
                keys.sort();
                for key in keys {
                    line.push_str(&format!(" {}={}", key, entry.fields[key]));
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// `tracing` layer that mirrors events into a ring buffer.
pub struct BufferLayer {
    buffer: Arc<RingBuffer>,
}

impl BufferLayer {
    pub fn new(buffer: Arc<RingBuffer>) -> Self {
        BufferLayer { buffer }
    }
}

impl<S: Subscriber> Layer<S> for BufferLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        self.buffer.push(LogEntry {
            time: OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_default(),
            level: event.metadata().level().to_string().to_lowercase(),
            msg: visitor.message,
            fields: visitor.fields,
        });
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: HashMap<String, String>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.insert(field.name().to_string(), value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields
                .insert(field.name().to_string(), format!("{value:?}"));
        }
    }
}

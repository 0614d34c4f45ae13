use chrono::SecondsFormat;
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;

use scopegate_types::{LogEvent, ScopeFrame, ScopeValue};

use crate::error::SinkError;

/// Final destination of exported batches
pub trait LogSink: Send + Sync {
    /// Write one batch. Failures are reported, never retried.
    fn write(&self, batch: &[LogEvent]) -> Result<(), SinkError>;
}

/// Output format of [`ConsoleSink`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConsoleFormat {
    /// Human readable, one header line per event plus one line per scope
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl FromStr for ConsoleFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown console format '{other}' (expected text or json)")),
        }
    }
}

/// Sink that renders events to a writer (stdout by default)
pub struct ConsoleSink {
    out: Mutex<Box<dyn Write + Send>>,
    format: ConsoleFormat,
}

impl ConsoleSink {
    pub fn new(writer: impl Write + Send + 'static, format: ConsoleFormat) -> Self {
        Self {
            out: Mutex::new(Box::new(writer)),
            format,
        }
    }

    pub fn stdout(format: ConsoleFormat) -> Self {
        Self::new(std::io::stdout(), format)
    }
}

impl LogSink for ConsoleSink {
    fn write(&self, batch: &[LogEvent]) -> Result<(), SinkError> {
        let mut rendered = String::new();
        for event in batch {
            match self.format {
                ConsoleFormat::Text => rendered.push_str(&render_text(event)),
                ConsoleFormat::Json => {
                    rendered.push_str(&serde_json::to_string(&render_json(event))?);
                    rendered.push('\n');
                }
            }
        }

        let mut out = self.out.lock();
        out.write_all(rendered.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

/// Render an event as text, scopes indented below the header line
pub fn render_text(event: &LogEvent) -> String {
    let mut line = format!(
        "{} {} [{}] {}",
        event.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        event.level,
        event.category,
        event.body()
    );

    if !event.attributes.is_empty() {
        let attrs = event
            .attributes
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        line.push_str(&format!(" {{{attrs}}}"));
    }
    line.push('\n');

    let mut depth = 0;
    event.for_each_scope(|frame| {
        line.push_str(&format!("    scope[{depth}]: {}", frame.render()));
        if frame.template().is_some() && !frame.is_empty() {
            let values = frame
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(", ");
            line.push_str(&format!(" ({values})"));
        }
        line.push('\n');
        depth += 1;
    });

    line
}

/// Render an event as a JSON object
pub fn render_json(event: &LogEvent) -> Value {
    let mut scopes = Vec::new();
    event.for_each_scope(|frame| scopes.push(frame_json(frame)));

    json!({
        "id": event.id,
        "timestamp": event.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        "level": event.level,
        "category": event.category,
        "message": event.body(),
        "template": event.template,
        "attributes": values_json(event.attributes.iter().map(|(k, v)| (k.as_str(), v))),
        "scopes": scopes,
    })
}

fn frame_json(frame: &ScopeFrame) -> Value {
    json!({
        "template": frame.template(),
        "values": values_json(frame.iter()),
    })
}

fn values_json<'a>(values: impl Iterator<Item = (&'a str, &'a ScopeValue)>) -> Value {
    let mut map = Map::new();
    for (key, value) in values {
        map.insert(key.to_string(), json!(value));
    }
    Value::Object(map)
}

/// Sink that keeps every exported event in memory
#[derive(Clone, Default)]
pub struct InMemorySink {
    events: Arc<Mutex<Vec<LogEvent>>>,
    batch_sizes: Arc<Mutex<Vec<usize>>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events exported so far
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().clone()
    }

    /// Size of every batch written so far
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

}

impl LogSink for InMemorySink {
    fn write(&self, batch: &[LogEvent]) -> Result<(), SinkError> {
        self.batch_sizes.lock().push(batch.len());
        self.events.lock().extend_from_slice(batch);
        Ok(())
    }
}

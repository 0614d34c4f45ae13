//! Shared types for scopegate
//!
//! This crate contains the scope model and the log event record that flow
//! through every pipeline stage.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, LazyLock, OnceLock};

// ============================================================================
// Log Levels
// ============================================================================

/// Log severity level
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Critical,
}

impl LogLevel {
    /// Parse log level from common formats
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" | "trc" => Some(Self::Trace),
            "debug" | "dbg" => Some(Self::Debug),
            "info" | "inf" | "information" => Some(Self::Info),
            "warn" | "warning" | "wrn" => Some(Self::Warn),
            "error" | "err" => Some(Self::Error),
            "critical" | "crit" | "fatal" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Short display string (3 chars)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "TRC",
            Self::Debug => "DBG",
            Self::Info => "INF",
            Self::Warn => "WRN",
            Self::Error => "ERR",
            Self::Critical => "CRT",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Scope Values and Frames
// ============================================================================

/// A single annotation value attached to a scope or a log message
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScopeValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl ScopeValue {
    /// Integer view of the value.
    ///
    /// Only integer-typed values qualify. Strings such as `"0"` and floats
    /// are not coerced.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ScopeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for ScopeValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for ScopeValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for ScopeValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for ScopeValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for ScopeValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for ScopeValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for ScopeValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// One level of a scope chain: the annotations contributed by a single scope
#[derive(Clone, Debug, PartialEq, Default)]
pub struct ScopeFrame {
    /// Message template the scope was opened with (e.g. `"Scope {keep}"`)
    template: Option<String>,

    /// Annotations, in the order the template names them
    values: Vec<(String, ScopeValue)>,
}

impl ScopeFrame {
    /// Create an empty frame
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a frame from a message template and positional arguments.
    ///
    /// Argument `n` is bound to the `n`-th placeholder name of the template.
    /// Arguments without a matching placeholder are ignored.
    pub fn from_template<I, V>(template: &str, args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ScopeValue>,
    {
        let values = template_names(template)
            .into_iter()
            .zip(args)
            .map(|(name, value)| (name.to_string(), value.into()))
            .collect();

        Self {
            template: Some(template.to_string()),
            values,
        }
    }

    /// Add an annotation
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ScopeValue>) -> Self {
        self.values.push((key.into(), value.into()));
        self
    }

    /// Look up an annotation by key (first occurrence wins)
    pub fn get(&self, key: &str) -> Option<&ScopeValue> {
        self.values.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Iterate over the annotations of this frame
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ScopeValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Human readable form: the rendered template, or `key=value` pairs
    pub fn render(&self) -> String {
        match &self.template {
            Some(template) => render_template(template, &self.values),
            None => self
                .values
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

// ============================================================================
// Message Templates
// ============================================================================

/// Matches `{name}` and `{name:format}` placeholders
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_@][A-Za-z0-9_]*)(?::[^}]*)?\}").expect("placeholder pattern is valid")
});

/// Placeholder names of a message template, in order of appearance
pub fn template_names(template: &str) -> Vec<&str> {
    PLACEHOLDER
        .captures_iter(template)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect()
}

/// Substitute placeholders with the named values.
///
/// Placeholders without a value are left untouched.
pub fn render_template(template: &str, values: &[(String, ScopeValue)]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            match values.iter().find(|(k, _)| k == name) {
                Some((_, value)) => value.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

// ============================================================================
// Scope Chains
// ============================================================================

/// A live source of scope frames, typically the scope stack of a logger.
///
/// Walking a provider reads whatever scopes are active at the time of the
/// walk, so it is only meaningful while the emitting code is still inside
/// the scopes that were active when the event was created.
pub trait ScopeProvider: Send + Sync {
    /// Visit every active frame, outermost first
    fn for_each_scope(&self, visitor: &mut dyn FnMut(&ScopeFrame));
}

/// The scope data attached to a log event.
///
/// A chain either starts out captured or is backed by a live provider. The
/// live provider is walked at most once: the first access snapshots its
/// frames and releases it, and every later access returns that same
/// snapshot. Frames are ordered outermost first.
pub struct ScopeChain {
    /// Live provider, taken on first capture
    live: Mutex<Option<Box<dyn ScopeProvider>>>,

    /// Snapshot shared by every reader
    captured: OnceLock<Arc<[ScopeFrame]>>,
}

impl ScopeChain {
    /// A chain with no scopes
    pub fn empty() -> Self {
        Self::captured(Vec::new())
    }

    /// A chain that is already captured
    pub fn captured(frames: Vec<ScopeFrame>) -> Self {
        Self {
            live: Mutex::new(None),
            captured: OnceLock::from(Arc::from(frames)),
        }
    }

    /// A chain backed by a live provider
    pub fn live<P: ScopeProvider + 'static>(provider: P) -> Self {
        Self {
            live: Mutex::new(Some(Box::new(provider))),
            captured: OnceLock::new(),
        }
    }

    /// Snapshot of the frames, walking the live provider on first use
    pub fn capture(&self) -> Arc<[ScopeFrame]> {
        self.captured
            .get_or_init(|| {
                let mut frames = Vec::new();
                let provider = self.live.lock().take();
                if let Some(provider) = provider {
                    provider.for_each_scope(&mut |frame| frames.push(frame.clone()));
                }
                Arc::from(frames)
            })
            .clone()
    }

    /// Whether the snapshot has been taken
    pub fn is_captured(&self) -> bool {
        self.captured.get().is_some()
    }

    /// Visit every frame, outermost first
    pub fn for_each_scope(&self, mut visitor: impl FnMut(&ScopeFrame)) {
        for frame in self.capture().iter() {
            visitor(frame);
        }
    }
}

impl Default for ScopeChain {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for ScopeChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.captured.get() {
            Some(frames) => f.debug_tuple("ScopeChain").field(frames).finish(),
            None => f.write_str("ScopeChain(<live>)"),
        }
    }
}

// ============================================================================
// Log Events
// ============================================================================

/// A single emitted log record
#[derive(Clone, Debug)]
pub struct LogEvent {
    /// Sequential ID assigned by the emitting logger
    pub id: u64,

    /// Emission time
    pub timestamp: DateTime<Utc>,

    /// Severity
    pub level: LogLevel,

    /// Logger category (usually the emitting component's name)
    pub category: String,

    /// Original message template
    pub template: String,

    /// Formatted message (if requested by the logger)
    pub message: Option<String>,

    /// Parsed template arguments
    pub attributes: Vec<(String, ScopeValue)>,

    /// Scope chain, shared by every clone of this event
    scopes: Arc<ScopeChain>,
}

impl LogEvent {
    /// Create a new event with no attributes and no scopes
    pub fn new(level: LogLevel, category: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            id: 0,
            timestamp: Utc::now(),
            level,
            category: category.into(),
            template: template.into(),
            message: None,
            attributes: Vec::new(),
            scopes: Arc::new(ScopeChain::empty()),
        }
    }

    /// Attach a scope chain
    pub fn with_scopes(mut self, scopes: ScopeChain) -> Self {
        self.scopes = Arc::new(scopes);
        self
    }

    /// Attach parsed template arguments
    pub fn with_attributes(mut self, attributes: Vec<(String, ScopeValue)>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Attach a formatted message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn scopes(&self) -> &ScopeChain {
        &self.scopes
    }

    /// Visit every scope frame of this event, outermost first
    pub fn for_each_scope(&self, visitor: impl FnMut(&ScopeFrame)) {
        self.scopes.for_each_scope(visitor);
    }

    /// The message to display: formatted if available, else the template
    pub fn body(&self) -> &str {
        self.message.as_deref().unwrap_or(&self.template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider that reports how often it was walked and empties itself
    /// after the first walk
    struct OneShotProvider {
        frames: Mutex<Vec<ScopeFrame>>,
        walks: Arc<AtomicUsize>,
    }

    impl ScopeProvider for OneShotProvider {
        fn for_each_scope(&self, visitor: &mut dyn FnMut(&ScopeFrame)) {
            self.walks.fetch_add(1, Ordering::SeqCst);
            for frame in std::mem::take(&mut *self.frames.lock()) {
                visitor(&frame);
            }
        }
    }

    #[test]
    fn test_scope_value_integer_view() {
        assert_eq!(ScopeValue::from(0).as_i64(), Some(0));
        assert_eq!(ScopeValue::from(7_i64).as_i64(), Some(7));
        assert_eq!(ScopeValue::from("0").as_i64(), None);
        assert_eq!(ScopeValue::from(0.0).as_i64(), None);
        assert_eq!(ScopeValue::from(false).as_i64(), None);
    }

    #[test]
    fn test_scope_value_serializes_untagged() {
        let json = serde_json::to_string(&vec![
            ScopeValue::from(1),
            ScopeValue::from("a"),
            ScopeValue::from(true),
        ])
        .unwrap();
        assert_eq!(json, r#"[1,"a",true]"#);
    }

    #[test]
    fn test_frame_from_template() {
        let frame = ScopeFrame::from_template("Scope {keep}", [0]);
        assert_eq!(frame.get("keep"), Some(&ScopeValue::Int(0)));
        assert_eq!(frame.template(), Some("Scope {keep}"));
        assert_eq!(frame.render(), "Scope 0");
    }

    #[test]
    fn test_frame_extra_args_ignored() {
        let frame = ScopeFrame::from_template("Request {id}", ["abc", "ignored"]);
        assert_eq!(frame.len(), 1);
        assert_eq!(frame.get("id").and_then(ScopeValue::as_str), Some("abc"));
    }

    #[test]
    fn test_frame_render_without_template() {
        let frame = ScopeFrame::new().with("keep", 1).with("user", "bob");
        assert_eq!(frame.render(), "keep=1, user=bob");
    }

    #[test]
    fn test_template_names_with_format_specifier() {
        assert_eq!(template_names("Loop {loop:D4} of {total}"), vec!["loop", "total"]);
        assert!(template_names("no placeholders").is_empty());
    }

    #[test]
    fn test_render_template_missing_value_left_alone() {
        let values = vec![("a".to_string(), ScopeValue::from(1))];
        assert_eq!(render_template("{a} and {b}", &values), "1 and {b}");
    }

    #[test]
    fn test_live_chain_walked_once() {
        let walks = Arc::new(AtomicUsize::new(0));
        let chain = ScopeChain::live(OneShotProvider {
            frames: Mutex::new(vec![
                ScopeFrame::new().with("depth", 0),
                ScopeFrame::new().with("depth", 1),
            ]),
            walks: Arc::clone(&walks),
        });
        assert!(!chain.is_captured());

        let first = chain.capture();
        let second = chain.capture();
        assert_eq!(walks.load(Ordering::SeqCst), 1);
        assert!(chain.is_captured());
        assert_eq!(first.len(), 2);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_for_each_scope_outermost_first_and_restartable() {
        let event = LogEvent::new(LogLevel::Info, "test", "hello").with_scopes(
            ScopeChain::captured(vec![
                ScopeFrame::new().with("depth", 0),
                ScopeFrame::new().with("depth", 1),
            ]),
        );

        for _ in 0..2 {
            let mut depths = Vec::new();
            event.for_each_scope(|frame| {
                depths.push(frame.get("depth").and_then(ScopeValue::as_i64))
            });
            assert_eq!(depths, vec![Some(0), Some(1)]);
        }
    }

    #[test]
    fn test_clones_share_snapshot() {
        let walks = Arc::new(AtomicUsize::new(0));
        let event = LogEvent::new(LogLevel::Info, "test", "hello").with_scopes(ScopeChain::live(
            OneShotProvider {
                frames: Mutex::new(vec![ScopeFrame::new().with("keep", 0)]),
                walks: Arc::clone(&walks),
            },
        ));
        let copy = event.clone();

        assert_eq!(event.scopes().capture().len(), 1);
        assert_eq!(copy.scopes().capture().len(), 1);
        assert_eq!(walks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_event_body_prefers_message() {
        let event = LogEvent::new(LogLevel::Warn, "test", "Loop {loop}");
        assert_eq!(event.body(), "Loop {loop}");
        let event = event.with_message("Loop 3");
        assert_eq!(event.body(), "Loop 3");
    }

    #[test]
    fn test_level_parse() {
        assert_eq!(LogLevel::parse("Information"), Some(LogLevel::Info));
        assert_eq!(LogLevel::parse("WARNING"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("nope"), None);
    }
}

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use scopegate_pipeline::LogProcessor;
use scopegate_types::{
    LogEvent, LogLevel, ScopeChain, ScopeFrame, ScopeValue, render_template, template_names,
};

use crate::scope::{LiveScopes, ScopeGuard, ScopeStack};

/// What a logger attaches to the events it emits
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoggerOptions {
    /// Attach the active scope chain
    pub include_scopes: bool,
    /// Render the message template into `LogEvent::message`
    pub include_formatted_message: bool,
    /// Store template arguments as `LogEvent::attributes`
    pub parse_state_values: bool,
}

impl Default for LoggerOptions {
    fn default() -> Self {
        Self {
            include_scopes: true,
            include_formatted_message: true,
            parse_state_values: true,
        }
    }
}

/// Emits events into a processor, carrying a stack of nested scopes.
///
/// A clone shares the category, processor and id sequence but starts with an
/// empty scope stack of its own, so a clone handed to another task or thread
/// never sees scopes entered through the original (and the other way round).
pub struct Logger {
    category: Arc<str>,
    processor: Arc<dyn LogProcessor>,
    scopes: Arc<ScopeStack>,
    options: LoggerOptions,
    next_id: Arc<AtomicU64>,
}

impl Logger {
    pub fn new(category: &str, processor: Arc<dyn LogProcessor>) -> Self {
        Self {
            category: Arc::from(category),
            processor,
            scopes: Arc::new(ScopeStack::new()),
            options: LoggerOptions::default(),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_options(mut self, options: LoggerOptions) -> Self {
        self.options = options;
        self
    }

    /// Number of scopes currently entered
    pub fn scope_depth(&self) -> usize {
        self.scopes.depth()
    }

    /// Enter a scope described by a message template and positional arguments
    pub fn begin_scope<I, V>(&self, template: &str, args: I) -> ScopeGuard
    where
        I: IntoIterator<Item = V>,
        V: Into<ScopeValue>,
    {
        self.begin_frame(ScopeFrame::from_template(template, args))
    }

    /// Enter a scope from a prepared frame
    pub fn begin_frame(&self, frame: ScopeFrame) -> ScopeGuard {
        ScopeGuard::enter(Arc::clone(&self.scopes), frame)
    }

    /// Emit one event
    pub fn log<I, V>(&self, level: LogLevel, template: &str, args: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<ScopeValue>,
    {
        let values: Vec<(String, ScopeValue)> = template_names(template)
            .into_iter()
            .zip(args)
            .map(|(name, value)| (name.to_string(), value.into()))
            .collect();

        let mut event = LogEvent::new(level, &*self.category, template);
        event.id = self.next_id.fetch_add(1, Ordering::Relaxed);

        if self.options.include_formatted_message {
            event = event.with_message(render_template(template, &values));
        }
        if self.options.parse_state_values {
            event = event.with_attributes(values);
        }
        if self.options.include_scopes && self.scopes.depth() > 0 {
            event = event.with_scopes(ScopeChain::live(LiveScopes::new(Arc::clone(&self.scopes))));
        }

        self.processor.on_event(event);
    }

    pub fn info<I, V>(&self, template: &str, args: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<ScopeValue>,
    {
        self.log(LogLevel::Info, template, args);
    }
}

impl Clone for Logger {
    fn clone(&self) -> Self {
        Self {
            category: Arc::clone(&self.category),
            processor: Arc::clone(&self.processor),
            scopes: Arc::new(ScopeStack::new()),
            options: self.options,
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("category", &self.category)
            .field("scope_depth", &self.scopes.depth())
            .field("options", &self.options)
            .finish()
    }
}

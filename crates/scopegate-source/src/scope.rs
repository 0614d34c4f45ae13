use parking_lot::RwLock;
use std::sync::Arc;

use scopegate_types::{ScopeFrame, ScopeProvider};

/// Stack of the scopes currently entered by one logging context
#[derive(Debug, Default)]
pub struct ScopeStack {
    frames: RwLock<Vec<ScopeFrame>>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a frame, returning the depth it was pushed at
    fn push(&self, frame: ScopeFrame) -> usize {
        let mut frames = self.frames.write();
        let depth = frames.len();
        frames.push(frame);
        depth
    }

    /// Drop every frame at or above `depth`
    fn truncate(&self, depth: usize) {
        self.frames.write().truncate(depth);
    }

    /// Number of active scopes
    pub fn depth(&self) -> usize {
        self.frames.read().len()
    }

    /// Copy of the active frames, outermost first
    pub fn snapshot(&self) -> Vec<ScopeFrame> {
        self.frames.read().clone()
    }
}

/// Live view of a [`ScopeStack`], attached to emitted events.
///
/// Reads whatever is on the stack at the moment it is walked.
pub struct LiveScopes {
    stack: Arc<ScopeStack>,
}

impl LiveScopes {
    pub fn new(stack: Arc<ScopeStack>) -> Self {
        Self { stack }
    }
}

impl ScopeProvider for LiveScopes {
    fn for_each_scope(&self, visitor: &mut dyn FnMut(&ScopeFrame)) {
        for frame in self.stack.frames.read().iter() {
            visitor(frame);
        }
    }
}

/// Keeps a scope active; leaving the scope happens on drop
#[must_use = "the scope ends as soon as the guard is dropped"]
pub struct ScopeGuard {
    stack: Arc<ScopeStack>,
    depth: usize,
}

impl ScopeGuard {
    pub(crate) fn enter(stack: Arc<ScopeStack>, frame: ScopeFrame) -> Self {
        let depth = stack.push(frame);
        Self { stack, depth }
    }

    /// Depth this scope was entered at (0 = outermost)
    pub fn depth(&self) -> usize {
        self.depth
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        self.stack.truncate(self.depth);
    }
}

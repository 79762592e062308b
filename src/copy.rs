//! Copy controls attached to rendered code blocks

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// How long a control shows its feedback label before reverting
pub const REVERT_DELAY: Duration = Duration::from_millis(2000);

/// Identifies a code block by its turn and its position within that turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CodeBlockId {
    pub turn: usize,
    pub block: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CopyLabel {
    #[default]
    Copy,
    Copied,
    Failed,
}

impl CopyLabel {
    pub fn text(&self) -> &'static str {
        match self {
            CopyLabel::Copy => "Copy",
            CopyLabel::Copied => "Copied!",
            CopyLabel::Failed => "Copy failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyAffordance {
    pub label: CopyLabel,
    pub revert_deadline: Option<Instant>,
}

#[derive(Debug, thiserror::Error)]
pub enum ClipboardError {
    #[error("clipboard unavailable: {0}")]
    Unavailable(String),
    #[error("clipboard write failed: {0}")]
    Write(String),
}

pub trait ClipboardSink {
    fn write_text(&mut self, text: &str) -> Result<(), ClipboardError>;
}

/// The OS clipboard. Kept alive for the whole session since some
/// platforms drop clipboard contents with their owner.
pub struct SystemClipboard {
    inner: Option<arboard::Clipboard>,
}

impl SystemClipboard {
    pub fn new() -> Self {
        let inner = match arboard::Clipboard::new() {
            Ok(clipboard) => Some(clipboard),
            Err(e) => {
                tracing::warn!(error = %e, "system clipboard not available");
                None
            }
        };
        Self { inner }
    }
}

impl Default for SystemClipboard {
    fn default() -> Self {
        Self::new()
    }
}

impl ClipboardSink for SystemClipboard {
    fn write_text(&mut self, text: &str) -> Result<(), ClipboardError> {
        match self.inner.as_mut() {
            Some(clipboard) => clipboard
                .set_text(text.to_string())
                .map_err(|e| ClipboardError::Write(e.to_string())),
            None => Err(ClipboardError::Unavailable(
                "no system clipboard".to_string(),
            )),
        }
    }
}

/// Tracks the label state of every copy control
#[derive(Debug, Default)]
pub struct CopyHandler {
    affordances: HashMap<CodeBlockId, CopyAffordance>,
}

impl CopyHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy `code` for control `id`. Re-activating a control restarts its
    /// revert delay.
    pub fn activate(
        &mut self,
        id: CodeBlockId,
        code: &str,
        clipboard: &mut dyn ClipboardSink,
        now: Instant,
    ) -> Result<(), ClipboardError> {
        let result = clipboard.write_text(code);

        let label = match &result {
            Ok(()) => {
                tracing::debug!(turn = id.turn, block = id.block, chars = code.len(), "code copied");
                CopyLabel::Copied
            }
            Err(e) => {
                tracing::warn!(turn = id.turn, block = id.block, error = %e, "copy to clipboard failed");
                CopyLabel::Failed
            }
        };

        self.affordances.insert(
            id,
            CopyAffordance {
                label,
                revert_deadline: Some(now + REVERT_DELAY),
            },
        );

        result
    }

    pub fn label(&self, id: CodeBlockId) -> CopyLabel {
        self.affordances
            .get(&id)
            .map(|affordance| affordance.label)
            .unwrap_or_default()
    }

    /// Revert every control whose deadline has passed. Returns true if any
    /// label changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        let mut changed = false;
        for affordance in self.affordances.values_mut() {
            if let Some(deadline) = affordance.revert_deadline {
                if now >= deadline {
                    affordance.label = CopyLabel::Copy;
                    affordance.revert_deadline = None;
                    changed = true;
                }
            }
        }
        changed
    }

    /// Drop all controls (their turns are gone)
    pub fn clear(&mut self) {
        self.affordances.clear();
    }
}

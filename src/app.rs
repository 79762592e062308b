use std::sync::Arc;
use std::time::Instant;
use ratatui::layout::Rect;
use tokio::task::JoinHandle;
use crate::config::Config;
use crate::controller::{Exchange, TurnController};
use crate::copy::{ClipboardSink, CodeBlockId, CopyHandler, REVERT_DELAY};
use crate::gemini::{Generate, GenerationError};
use crate::markup::Segment;
use crate::state::Sender;
use crate::ui;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// One logical line of the conversation view, before wrapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatLine {
    Label(Sender),
    Text(String),
    CodeHeader {
        id: CodeBlockId,
        language: Option<String>,
    },
    Code(String),
    Thinking,
    Blank,
}

/// Indent applied to code lines in the chat view
pub const CODE_INDENT: &str = "  ";

type ExchangeTask = (Exchange, JoinHandle<Result<String, GenerationError>>);

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub model: String,

    // Submission surface
    pub input: String,
    pub cursor: usize, // cursor position in input, in chars

    // Conversation
    pub controller: TurnController,
    pub copy_handler: CopyHandler,
    pub selected_block: Option<CodeBlockId>,

    // Chat view geometry (updated during render)
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,
    pub chat_area: Option<Rect>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Transient footer message and when it expires
    pub status_message: Option<(String, Instant)>,

    client: Arc<dyn Generate>,
    clipboard: Box<dyn ClipboardSink>,
    exchange_task: Option<ExchangeTask>,
}

impl App {
    pub fn new(config: &Config, client: Arc<dyn Generate>, clipboard: Box<dyn ClipboardSink>) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            model: config.model.clone(),

            input: String::new(),
            cursor: 0,

            controller: TurnController::new(config.discard_stale_replies),
            copy_handler: CopyHandler::new(),
            selected_block: None,

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            chat_area: None,

            animation_frame: 0,
            status_message: None,

            client,
            clipboard,
            exchange_task: None,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.controller.is_busy()
    }

    // Exchange lifecycle

    /// Submit the input box. Does nothing for blank input or while busy.
    pub fn submit_input(&mut self) {
        let Some(exchange) = self.controller.begin(&self.input) else {
            return;
        };

        self.input.clear();
        self.cursor = 0;

        let client = Arc::clone(&self.client);
        let utterance = exchange.utterance().to_string();
        let handle = tokio::spawn(async move { client.generate(&utterance).await });
        self.exchange_task = Some((exchange, handle));

        // Scroll to bottom so "Thinking..." is visible
        self.apply_controller_requests();
    }

    /// Collect a finished exchange, if any. Returns true when one was
    /// collected.
    pub async fn poll_exchange(&mut self) -> bool {
        let finished = self
            .exchange_task
            .as_ref()
            .is_some_and(|(_, handle)| handle.is_finished());
        if !finished {
            return false;
        }

        let Some((exchange, handle)) = self.exchange_task.take() else {
            return false;
        };

        let result = match handle.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "generation task did not complete");
                Err(GenerationError::Aborted(e.to_string()))
            }
        };

        let epoch = exchange.epoch();
        if self.controller.finish(exchange, result) {
            tracing::debug!(epoch, "reply collected");
        }
        self.apply_controller_requests();
        true
    }

    pub fn reset_conversation(&mut self) {
        self.controller.reset();
        self.copy_handler.clear();
        self.selected_block = None;
        self.chat_scroll = 0;
        self.apply_controller_requests();
    }

    fn apply_controller_requests(&mut self) {
        if self.controller.take_focus_request() {
            self.input_mode = InputMode::Editing;
        }
        if self.controller.take_scroll_request() {
            self.scroll_to_bottom();
        }
    }

    // Code blocks and copying

    pub fn code_block_ids(&self) -> Vec<CodeBlockId> {
        self.controller
            .conversation()
            .turns()
            .iter()
            .enumerate()
            .flat_map(|(turn, t)| {
                (0..t.rendered.code_fragments().len()).map(move |block| CodeBlockId { turn, block })
            })
            .collect()
    }

    pub fn select_next_block(&mut self) {
        let ids = self.code_block_ids();
        if ids.is_empty() {
            return;
        }
        let next = match self.selected_block.and_then(|id| ids.iter().position(|b| *b == id)) {
            Some(i) => (i + 1).min(ids.len() - 1),
            None => 0,
        };
        self.selected_block = Some(ids[next]);
        self.scroll_to_selected_block();
    }

    pub fn select_prev_block(&mut self) {
        let ids = self.code_block_ids();
        if ids.is_empty() {
            return;
        }
        let prev = match self.selected_block.and_then(|id| ids.iter().position(|b| *b == id)) {
            Some(i) => i.saturating_sub(1),
            None => ids.len() - 1,
        };
        self.selected_block = Some(ids[prev]);
        self.scroll_to_selected_block();
    }

    /// Activate the copy control of the selected code block
    pub fn copy_selected_block(&mut self, now: Instant) {
        if let Some(id) = self.selected_block {
            self.activate_copy(id, now);
        }
    }

    pub fn activate_copy(&mut self, id: CodeBlockId, now: Instant) {
        let Some(code) = self
            .controller
            .conversation()
            .code_fragment(id.turn, id.block)
            .map(|fragment| fragment.code.clone())
        else {
            return;
        };

        if let Err(e) = self.copy_handler.activate(id, &code, self.clipboard.as_mut(), now) {
            self.status_message = Some((format!("Copy failed: {}", e), now + REVERT_DELAY));
        }
    }

    /// Periodic housekeeping driven by the tick event
    pub fn on_tick(&mut self, now: Instant) {
        if self.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
        self.copy_handler.tick(now);
        if self.status_message.as_ref().is_some_and(|(_, until)| now >= *until) {
            self.status_message = None;
        }
    }

    // Input editing

    pub fn insert_char(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.input, self.cursor);
        self.input.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn insert_str(&mut self, text: &str) {
        // Pasted CRLF should not leave stray carriage returns in the prompt
        let text = text.replace("\r\n", "\n").replace('\r', "\n");
        let byte_pos = char_to_byte_index(&self.input, self.cursor);
        self.input.insert_str(byte_pos, &text);
        self.cursor += text.chars().count();
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.input, self.cursor);
            self.input.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.input.chars().count() {
            let byte_pos = char_to_byte_index(&self.input, self.cursor);
            self.input.remove(byte_pos);
        }
    }

    pub fn cursor_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn cursor_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.input.chars().count());
    }

    pub fn cursor_home(&mut self) {
        self.cursor = 0;
    }

    pub fn cursor_end(&mut self) {
        self.cursor = self.input.chars().count();
    }

    // Chat layout and scrolling

    pub fn chat_layout(&self) -> Vec<ChatLine> {
        let mut lines = Vec::new();

        for (turn_idx, turn) in self.controller.conversation().turns().iter().enumerate() {
            lines.push(ChatLine::Label(turn.sender));

            let mut block = 0;
            for segment in turn.rendered.segments() {
                match segment {
                    Segment::Text(text) => {
                        lines.extend(text.lines().map(|line| ChatLine::Text(line.to_string())));
                    }
                    Segment::Code(fragment) => {
                        lines.push(ChatLine::CodeHeader {
                            id: CodeBlockId { turn: turn_idx, block },
                            language: fragment.language.clone(),
                        });
                        lines.extend(fragment.code.lines().map(|line| ChatLine::Code(line.to_string())));
                        block += 1;
                    }
                }
            }

            lines.push(ChatLine::Blank); // Blank line after message
        }

        if self.is_busy() {
            lines.push(ChatLine::Label(Sender::Assistant));
            lines.push(ChatLine::Thinking);
        }

        lines
    }

    fn wrap_width(&self) -> u16 {
        // Use actual chat width for wrap calculation, default to 50 if not set
        if self.chat_width > 0 {
            self.chat_width
        } else {
            50
        }
    }

    fn visible_height(&self) -> u16 {
        if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        }
    }

    /// Each chat line with the rows it takes once wrapped. Wrapping goes
    /// through the same styled line the view draws, so scrolling and hit
    /// testing agree with the screen.
    fn wrapped_layout(&self) -> Vec<(ChatLine, u16)> {
        let wrap_width = self.wrap_width();
        self.chat_layout()
            .into_iter()
            .map(|line| {
                let rows = ui::wrapped_rows(&ui::chat_line_to_line(self, &line), wrap_width);
                (line, rows)
            })
            .collect()
    }

    pub fn total_chat_lines(&self) -> u16 {
        self.wrapped_layout()
            .iter()
            .fold(0u16, |acc, (_, rows)| acc.saturating_add(*rows))
    }

    pub fn scroll_to_bottom(&mut self) {
        let total_lines = self.total_chat_lines();
        let visible_height = self.visible_height();
        self.chat_scroll = total_lines.saturating_sub(visible_height);
    }

    pub fn scroll_to_top(&mut self) {
        self.chat_scroll = 0;
    }

    pub fn scroll_down(&mut self, lines: u16) {
        let max_scroll = self.total_chat_lines().saturating_sub(self.visible_height());
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(max_scroll);
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    fn scroll_to_selected_block(&mut self) {
        let Some(selected) = self.selected_block else {
            return;
        };
        let mut row = 0u16;

        for (line, rows) in self.wrapped_layout() {
            if matches!(&line, ChatLine::CodeHeader { id, .. } if *id == selected) {
                let visible = self.visible_height();
                if row < self.chat_scroll {
                    self.chat_scroll = row;
                } else if row >= self.chat_scroll + visible {
                    self.chat_scroll = row + 1 - visible;
                }
                return;
            }
            row = row.saturating_add(rows);
        }
    }

    /// The copy control rendered at screen position (x, y), if any
    pub fn code_header_at(&self, x: u16, y: u16) -> Option<CodeBlockId> {
        let area = self.chat_area?;
        // Inner area excludes the border
        if x <= area.x || x + 1 >= area.x + area.width || y <= area.y || y + 1 >= area.y + area.height {
            return None;
        }

        let target = (y - area.y - 1) + self.chat_scroll;
        let mut row = 0u16;

        for (line, height) in self.wrapped_layout() {
            if target < row + height {
                return match line {
                    ChatLine::CodeHeader { id, .. } => Some(id),
                    _ => None,
                };
            }
            row = row.saturating_add(height);
        }
        None
    }
}

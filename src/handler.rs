use std::time::Instant;
use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use crate::app::{App, InputMode};
use crate::tui::AppEvent;

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Paste(text) => {
            if app.input_mode == InputMode::Editing && !app.is_busy() {
                app.insert_str(&text);
            }
        }
        AppEvent::Resize => {}
        AppEvent::Tick => app.on_tick(Instant::now()),
    }

    // Pick up a reply as soon as its task is done
    app.poll_exchange().await;
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        match key.code {
            KeyCode::Char('c') => {
                app.should_quit = true;
                return;
            }
            KeyCode::Char('l') => {
                app.reset_conversation();
                return;
            }
            _ => {}
        }
    }

    match key.code {
        KeyCode::PageDown => {
            app.scroll_down(app.chat_height.max(2) / 2);
            return;
        }
        KeyCode::PageUp => {
            app.scroll_up(app.chat_height.max(2) / 2);
            return;
        }
        _ => {}
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        // Back to the input box
        KeyCode::Char('i') | KeyCode::Enter | KeyCode::Tab => {
            app.input_mode = InputMode::Editing;
        }

        // Chat scrolling
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(1),
        KeyCode::Char('g') | KeyCode::Home => app.scroll_to_top(),
        KeyCode::Char('G') | KeyCode::End => app.scroll_to_bottom(),

        // Code block selection and copy
        KeyCode::Char(']') | KeyCode::Char('n') => app.select_next_block(),
        KeyCode::Char('[') | KeyCode::Char('p') => app.select_prev_block(),
        KeyCode::Char('c') | KeyCode::Char('y') => app.copy_selected_block(Instant::now()),
        KeyCode::Esc => app.selected_block = None,

        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc | KeyCode::Tab => {
            app.input_mode = InputMode::Normal;
            return;
        }
        _ => {}
    }

    // Intake is locked while a reply is outstanding
    if app.is_busy() {
        return;
    }

    match key.code {
        KeyCode::Enter => {
            if key.modifiers.intersects(KeyModifiers::SHIFT | KeyModifiers::ALT) {
                app.insert_char('\n');
            } else {
                app.submit_input();
            }
        }
        KeyCode::Backspace => app.backspace(),
        KeyCode::Delete => app.delete(),
        KeyCode::Left => app.cursor_left(),
        KeyCode::Right => app.cursor_right(),
        KeyCode::Home => app.cursor_home(),
        KeyCode::End => app.cursor_end(),
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => app.insert_char(c),
        _ => {}
    }
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let x = mouse.column;
    let y = mouse.row;

    let in_chat = app.chat_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);
    if !in_chat {
        return;
    }

    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_down(3),
        MouseEventKind::ScrollUp => app.scroll_up(3),
        MouseEventKind::Down(MouseButton::Left) => {
            // Clicking a code block's control line copies it
            if let Some(id) = app.code_header_at(x, y) {
                app.selected_block = Some(id);
                app.activate_copy(id, Instant::now());
            }
        }
        _ => {}
    }
}

use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use crate::app::{App, ChatLine, InputMode, CODE_INDENT};
use crate::copy::CopyLabel;
use crate::state::Sender;

/// Most input rows shown before the box starts scrolling
const MAX_INPUT_ROWS: u16 = 5;

/// Parse a line of text and convert **bold** and `inline code` to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                // Consume the second *
                chars.next();

                // Find closing **
                let mut bold_text = String::new();
                let mut found_close = false;
                while let Some(c) = chars.next() {
                    if c == '*' && chars.peek() == Some(&'*') {
                        chars.next();
                        found_close = true;
                        break;
                    }
                    bold_text.push(c);
                }

                if found_close && !bold_text.is_empty() {
                    if !current_text.is_empty() {
                        spans.push(Span::raw(std::mem::take(&mut current_text)));
                    }
                    spans.push(Span::styled(
                        bold_text,
                        Style::default().add_modifier(Modifier::BOLD),
                    ));
                } else {
                    // No closing **, treat as literal
                    current_text.push_str("**");
                    current_text.push_str(&bold_text);
                }
            }
            '`' => {
                let mut code_text = String::new();
                let mut found_close = false;
                for c in chars.by_ref() {
                    if c == '`' {
                        found_close = true;
                        break;
                    }
                    code_text.push(c);
                }

                if found_close && !code_text.is_empty() {
                    if !current_text.is_empty() {
                        spans.push(Span::raw(std::mem::take(&mut current_text)));
                    }
                    spans.push(Span::styled(code_text, Style::default().fg(Color::Green)));
                } else {
                    current_text.push('`');
                    current_text.push_str(&code_text);
                    if found_close {
                        current_text.push('`');
                    }
                }
            }
            _ => current_text.push(c),
        }
    }

    // Push any remaining text
    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_chat_screen(app, frame, body_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let busy_indicator = if app.is_busy() { " [waiting for reply]" } else { "" };

    let title = Line::from(vec![
        Span::styled(" DSA Tutor ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(format!("{} ", app.model), Style::default().fg(Color::Gray)),
        Span::styled(busy_indicator, Style::default().fg(Color::Yellow)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let mode_text = match app.input_mode {
        InputMode::Normal => " CHAT ",
        InputMode::Editing => " ASK ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints = if let Some((message, _)) = &app.status_message {
        vec![Span::styled(format!(" {} ", message), Style::default().bg(Color::Red).fg(Color::White))]
    } else {
        match app.input_mode {
            InputMode::Normal => vec![
                Span::styled(" j/k ", key_style),
                Span::styled(" scroll ", label_style),
                Span::styled(" [/] ", key_style),
                Span::styled(" code block ", label_style),
                Span::styled(" c ", key_style),
                Span::styled(" copy ", label_style),
                Span::styled(" i ", key_style),
                Span::styled(" ask ", label_style),
                Span::styled(" ^L ", key_style),
                Span::styled(" clear ", label_style),
                Span::styled(" q ", key_style),
                Span::styled(" quit ", label_style),
            ],
            InputMode::Editing => vec![
                Span::styled(" Enter ", key_style),
                Span::styled(" send ", label_style),
                Span::styled(" S-Enter ", key_style),
                Span::styled(" newline ", label_style),
                Span::styled(" Esc ", key_style),
                Span::styled(" chat ", label_style),
                Span::styled(" ^L ", key_style),
                Span::styled(" clear ", label_style),
            ],
        }
    };

    let footer_content = Line::from(
        vec![
            Span::styled(mode_text, mode_style),
            Span::styled(" ", label_style),
        ]
        .into_iter()
        .chain(hints)
        .collect::<Vec<_>>(),
    );

    let footer = Paragraph::new(footer_content).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

fn sender_style(sender: Sender) -> Style {
    match sender {
        Sender::User => Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        Sender::Assistant => Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
    }
}

pub fn chat_line_to_line(app: &App, line: &ChatLine) -> Line<'static> {
    match line {
        ChatLine::Label(sender) => Line::from(Span::styled(format!("{}:", sender.label()), sender_style(*sender))),
        ChatLine::Text(text) => parse_markdown_line(text),
        ChatLine::CodeHeader { id, language } => {
            let label = app.copy_handler.label(*id);
            let selected = app.selected_block == Some(*id);

            let control_style = match label {
                CopyLabel::Copy => Style::default().fg(Color::Black).bg(Color::Gray),
                CopyLabel::Copied => Style::default().fg(Color::Black).bg(Color::Green),
                CopyLabel::Failed => Style::default().fg(Color::White).bg(Color::Red),
            };
            let control_style = if selected {
                control_style.add_modifier(Modifier::BOLD | Modifier::REVERSED)
            } else {
                control_style
            };

            Line::from(vec![
                Span::styled(format!("[{}]", label.text()), control_style),
                Span::raw(" "),
                Span::styled(
                    language.clone().unwrap_or_else(|| "code".to_string()),
                    Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
                ),
            ])
        }
        ChatLine::Code(code) => Line::from(Span::styled(
            format!("{}{}", CODE_INDENT, code),
            Style::default().fg(Color::Green),
        )),
        ChatLine::Thinking => {
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            Line::from(Span::styled(
                format!("Thinking{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            ))
        }
        ChatLine::Blank => Line::default(),
    }
}

/// Rows `line` takes in the conversation pane at `width` columns
pub fn wrapped_rows(line: &Line<'static>, width: u16) -> u16 {
    let rows = Paragraph::new(line.clone())
        .wrap(Wrap { trim: false })
        .line_count(width);
    rows.clamp(1, u16::MAX as usize) as u16
}

/// Row and column of the cursor within the input text
fn cursor_row_col(input: &str, cursor: usize) -> (usize, usize) {
    let before: String = input.chars().take(cursor).collect();
    let row = before.matches('\n').count();
    let col = before.rsplit('\n').next().map(|s| s.chars().count()).unwrap_or(0);
    (row, col)
}

fn render_chat_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let input_rows = (app.input.split('\n').count() as u16).clamp(1, MAX_INPUT_ROWS);

    let [chat_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(input_rows + 2),
    ])
    .areas(area);

    // Store chat area and its inner size for scroll calculations and mouse hit-testing
    app.chat_area = Some(chat_area);
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);

    let chat_focused = app.input_mode == InputMode::Normal;
    let chat_border_color = if chat_focused { Color::Cyan } else { Color::DarkGray };

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(chat_border_color))
        .title(" Conversation ");

    let view: &App = app;
    let lines: Vec<Line> = view
        .chat_layout()
        .iter()
        .map(|line| chat_line_to_line(view, line))
        .collect();

    // Code indentation must survive wrapping
    let chat = Paragraph::new(Text::from(lines))
        .block(chat_block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, chat_area);

    render_input(app, frame, input_area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let border_color = if app.is_busy() {
        Color::DarkGray
    } else if editing {
        Color::Yellow
    } else {
        Color::DarkGray
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Ask about data structures and algorithms ");

    if app.is_busy() {
        let waiting = Paragraph::new(Span::styled(
            "Waiting for a reply...",
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        ))
        .block(input_block);
        frame.render_widget(waiting, area);
        return;
    }

    let inner_width = area.width.saturating_sub(2) as usize;
    let inner_height = area.height.saturating_sub(2) as usize;
    let (cursor_row, cursor_col) = cursor_row_col(&app.input, app.cursor);

    // Keep the cursor visible, scrolling both ways
    let row_offset = if inner_height == 0 {
        0
    } else {
        (cursor_row + 1).saturating_sub(inner_height)
    };
    let col_offset = if inner_width == 0 {
        0
    } else if cursor_col >= inner_width {
        cursor_col - inner_width + 1
    } else {
        0
    };

    let visible: Vec<Line> = app
        .input
        .split('\n')
        .skip(row_offset)
        .take(inner_height.max(1))
        .map(|line| Line::from(line.chars().skip(col_offset).take(inner_width).collect::<String>()))
        .collect();

    // Use cyan text to match the "You:" style - visible in both light and dark terminals
    let input = Paragraph::new(Text::from(visible))
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(input, area);

    if editing {
        frame.set_cursor_position((
            area.x + 1 + (cursor_col - col_offset) as u16,
            area.y + 1 + (cursor_row - row_offset) as u16,
        ));
    }
}

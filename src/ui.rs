use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{
        Block, Borders, Clear, List, ListItem, Paragraph, Scrollbar, ScrollbarOrientation,
        ScrollbarState, Tabs, Wrap,
    },
    Frame,
};

use crate::app::{App, InputMode};
use crate::transcript::{SegmentKind, Transcript};

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    if app.fullscreen {
        // Chrome-less mode: transcript and input fill the window
        let [transcript_area, input_area] =
            Layout::vertical([Constraint::Min(0), Constraint::Length(3)]).areas(area);

        render_transcript(app, frame, transcript_area);
        render_input(app, frame, input_area);
    } else {
        let [header_area, tabs_area, transcript_area, input_area, footer_area] =
            Layout::vertical([
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(3),
                Constraint::Length(1),
            ])
            .areas(area);

        render_header(app, frame, header_area);
        render_tabs(app, frame, tabs_area);
        render_transcript(app, frame, transcript_area);
        render_input(app, frame, input_area);
        render_footer(app, frame, footer_area);
    }

    if app.show_model_picker {
        render_model_picker(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" charla ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!(" {} ", app.selected_model),
            Style::default().fg(Color::White),
        ),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_tabs(app: &App, frame: &mut Frame, area: Rect) {
    let titles: Vec<Line> = app
        .conversations
        .iter()
        .map(|c| {
            if c.transcript.is_streaming() {
                Line::from(format!(" {} * ", c.title))
            } else {
                Line::from(format!(" {} ", c.title))
            }
        })
        .collect();

    let tabs = Tabs::new(titles)
        .select(app.active)
        .style(Style::default().fg(Color::DarkGray))
        .highlight_style(
            Style::default()
                .fg(Color::White)
                .bg(Color::Blue)
                .add_modifier(Modifier::BOLD),
        );

    frame.render_widget(tabs, area);
}

fn render_transcript(app: &mut App, frame: &mut Frame, area: Rect) {
    let animation_frame = app.animation_frame;
    let conv = app.active_conversation_mut();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(format!(" {} ", conv.title));

    let inner_area = block.inner(area);

    if conv.transcript.is_empty() && !conv.transcript.is_streaming() {
        let placeholder = Paragraph::new("Type a message and press Enter")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(placeholder, area);
        return;
    }

    let mut lines = transcript_lines(&conv.transcript);

    if conv.transcript.is_streaming() {
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        )));
    }

    let total_lines = wrapped_line_count(&lines, inner_area.width);
    if conv.follow {
        conv.scroll = total_lines.saturating_sub(inner_area.height);
    } else {
        conv.scroll = conv.scroll.min(total_lines.saturating_sub(1));
    }

    let paragraph = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((conv.scroll, 0));

    frame.render_widget(paragraph, area);

    // Render scrollbar
    if total_lines > inner_area.height {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("^"))
            .end_symbol(Some("v"));

        let mut scrollbar_state =
            ScrollbarState::new(total_lines as usize).position(conv.scroll as usize);

        frame.render_stateful_widget(
            scrollbar,
            area.inner(ratatui::layout::Margin {
                vertical: 1,
                horizontal: 0,
            }),
            &mut scrollbar_state,
        );
    }
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let conv = app.active_conversation();

    let input_border_color = if app.input_mode == InputMode::Editing {
        Color::Yellow
    } else {
        Color::DarkGray
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(input_border_color))
        .title(" Message ");

    // Calculate visible portion of input with horizontal scrolling
    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = conv.cursor;

    // Calculate scroll offset to keep cursor visible
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    // Get the visible slice of the input
    let visible_text: String = conv
        .input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(input, area);

    // Show cursor when editing
    if app.input_mode == InputMode::Editing {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let mode_text = match app.input_mode {
        InputMode::Normal => " NORMAL ",
        InputMode::Editing => " CHAT ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints = match app.input_mode {
        InputMode::Normal => vec![
            Span::styled(" i/Enter ", key_style),
            Span::styled(" type ", label_style),
            Span::styled(" Tab ", key_style),
            Span::styled(" next tab ", label_style),
            Span::styled(" n ", key_style),
            Span::styled(" new ", label_style),
            Span::styled(" w ", key_style),
            Span::styled(" close ", label_style),
            Span::styled(" j/k ", key_style),
            Span::styled(" scroll ", label_style),
            Span::styled(" M ", key_style),
            Span::styled(" model ", label_style),
            Span::styled(" F11 ", key_style),
            Span::styled(" fullscreen ", label_style),
            Span::styled(" q ", key_style),
            Span::styled(" quit ", label_style),
        ],
        InputMode::Editing => vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" send ", label_style),
            Span::styled(" Tab ", key_style),
            Span::styled(" next tab ", label_style),
            Span::styled(" Ctrl-N ", key_style),
            Span::styled(" new ", label_style),
            Span::styled(" Ctrl-W ", key_style),
            Span::styled(" close ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" stop typing ", label_style),
        ],
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

fn render_model_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    // Calculate popup size and position (centered)
    let popup_width = 40.min(area.width.saturating_sub(4));
    let popup_height = (app.available_models.len() as u16 + 2).min(area.height.saturating_sub(4));

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;

    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Select Model (Enter to select, Esc to cancel) ");

    let items: Vec<ListItem> = app
        .available_models
        .iter()
        .map(|model| {
            let style = if model == &app.selected_model {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!(" {} ", model)).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup_area, &mut app.model_picker_state);
}

/// Flatten the transcript's styled segments into display lines. A segment may
/// span newlines and a line may hold spans from several segments.
fn transcript_lines(transcript: &Transcript) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut current: Vec<Span<'static>> = Vec::new();

    for segment in transcript.segments() {
        let style = segment_style(segment.kind);
        let mut parts = segment.text.split('\n').peekable();
        while let Some(part) = parts.next() {
            if !part.is_empty() {
                current.push(Span::styled(part.to_string(), style));
            }
            if parts.peek().is_some() {
                lines.push(Line::from(std::mem::take(&mut current)));
            }
        }
    }

    if !current.is_empty() {
        lines.push(Line::from(current));
    }

    lines
}

/// Styles mirror the original window: user in blue, replies in green, code
/// set off on its own background, errors in red.
fn segment_style(kind: SegmentKind) -> Style {
    match kind {
        SegmentKind::User => Style::default().fg(Color::Blue).add_modifier(Modifier::BOLD),
        SegmentKind::Assistant => Style::default().fg(Color::Green),
        SegmentKind::Code => Style::default()
            .fg(Color::Black)
            .bg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
        SegmentKind::Error => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
    }
}

/// Approximate the wrapped height of `lines` at the given width, using
/// character counts the same way the scroll math does elsewhere.
fn wrapped_line_count(lines: &[Line], width: u16) -> u16 {
    let wrap_width = if width > 0 { width as usize } else { 50 };

    let mut total: u16 = 0;
    for line in lines {
        let char_count: usize = line.spans.iter().map(|s| s.content.chars().count()).sum();
        if char_count == 0 {
            total += 1; // Empty line still takes one line
        } else {
            total += ((char_count.saturating_sub(1) / wrap_width) + 1) as u16;
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    fn streamed(fragments: &[&str]) -> Transcript {
        let mut t = Transcript::new();
        t.push_user("q");
        t.begin_reply();
        for f in fragments {
            t.push_fragment(f);
        }
        t.finish_reply();
        t
    }

    #[test]
    fn lines_split_on_newlines_across_segments() {
        let t = streamed(&["first\nsecond ", "```x```"]);
        let lines = transcript_lines(&t);
        // "You: q" / "AI: first" / "second x"
        assert_eq!(lines.len(), 3);
        // the last line mixes an assistant span and a code span
        assert_eq!(lines[2].spans.len(), 2);
    }

    #[test]
    fn code_spans_carry_the_code_style() {
        let t = streamed(&["```let x = 1;```"]);
        let lines = transcript_lines(&t);
        let styled = lines
            .iter()
            .flat_map(|l| l.spans.iter())
            .any(|s| s.style == segment_style(SegmentKind::Code) && s.content == "let x = 1;");
        assert!(styled);
    }

    #[test]
    fn wrapped_count_accounts_for_width() {
        let lines = vec![Line::from("x".repeat(25)), Line::from("")];
        assert_eq!(wrapped_line_count(&lines, 10), 4); // 3 wrapped + 1 empty
        assert_eq!(wrapped_line_count(&lines, 25), 2);
    }
}

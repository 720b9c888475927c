use ratatui::{
    Frame,
    layout::{Constraint, Layout, Position, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
};

use crate::app::{App, InputMode};
use crate::corpus::LoadStatus;
use crate::transcript::Role;

/// Convert `**bold**` markers in a response line to styled spans; anything
/// unmatched stays literal text.
fn markdown_bold_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut rest = text;
    let mut bold = false;

    while let Some(pos) = rest.find("**") {
        let (head, tail) = rest.split_at(pos);
        if !head.is_empty() {
            spans.push(styled_segment(head, bold));
        }
        rest = &tail[2..];
        bold = !bold;
    }
    if !rest.is_empty() {
        // An unmatched opener is rendered literally.
        if bold {
            spans.push(Span::raw("**"));
        }
        spans.push(Span::raw(rest.to_string()));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

fn styled_segment(text: &str, bold: bool) -> Span<'static> {
    if bold {
        Span::styled(
            text.to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        )
    } else {
        Span::raw(text.to_string())
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

    let chat_area = if app.show_docs_panel {
        let [docs_area, chat_area] =
            Layout::horizontal([Constraint::Length(34), Constraint::Min(0)]).areas(body_area);
        render_docs_panel(app, frame, docs_area);
        chat_area
    } else {
        body_area
    };

    let [transcript_area, input_area] =
        Layout::vertical([Constraint::Min(0), Constraint::Length(3)]).areas(chat_area);

    render_transcript(app, frame, transcript_area);
    render_input(app, frame, input_area);

    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let doc_count = app.cache.handles().len();
    let doc_indicator = if doc_count > 0 {
        format!(" [{} documents]", doc_count)
    } else {
        String::new()
    };

    let title = Line::from(vec![
        Span::styled(
            " Benefits Navigator ",
            Style::default().fg(Color::Cyan).bold(),
        ),
        Span::styled(
            "Medicaid eligibility assistant",
            Style::default().fg(Color::Gray),
        ),
        Span::styled(doc_indicator, Style::default().fg(Color::DarkGray)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_docs_panel(app: &App, frame: &mut Frame, area: Rect) {
    let mut items: Vec<ListItem> = Vec::new();

    if let Some(warning) = app.cache.list_warning() {
        items.push(ListItem::new(Line::from(Span::styled(
            format!("! listing degraded: {}", warning),
            Style::default().fg(Color::Yellow),
        ))));
    }

    if app.cache.reports().is_empty() {
        items.push(ListItem::new(Line::from(Span::styled(
            "No PDF files found in the docs folder.",
            Style::default().fg(Color::Red),
        ))));
        items.push(ListItem::new(Line::from(Span::styled(
            "Add policy PDFs and restart.",
            Style::default().fg(Color::DarkGray),
        ))));
    }

    for report in app.cache.reports() {
        let (symbol, style, note) = match &report.status {
            LoadStatus::Reused => ("=", Style::default().fg(Color::Green), "cached"),
            LoadStatus::Uploaded => ("+", Style::default().fg(Color::Cyan), "indexed"),
            LoadStatus::Failed(_) => ("x", Style::default().fg(Color::Red), "failed"),
        };
        items.push(ListItem::new(Line::from(vec![
            Span::styled(format!("{} ", symbol), style),
            Span::raw(report.display_name.clone()),
            Span::styled(format!("  {}", note), Style::default().fg(Color::DarkGray)),
        ])));
        if let LoadStatus::Failed(message) = &report.status {
            items.push(ListItem::new(Line::from(Span::styled(
                format!("    {}", message),
                Style::default().fg(Color::Red).dim(),
            ))));
        }
    }

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Policy Documents "),
    );
    frame.render_widget(list, area);
}

fn render_transcript(app: &mut App, frame: &mut Frame, area: Rect) {
    let block = Block::default().borders(Borders::ALL).title(" Conversation ");
    let inner = block.inner(area);

    // Record viewport size for scroll-to-bottom calculations
    app.chat_height = inner.height;
    app.chat_width = inner.width;

    let user_style = Style::default().fg(Color::Cyan).bold();
    let assistant_style = Style::default().fg(Color::Green).bold();

    let mut lines: Vec<Line> = Vec::new();

    if app.transcript.is_empty() && !app.loading {
        lines.push(Line::default());
        if app.question_answering_enabled() {
            lines.push(Line::from(Span::styled(
                "Ask an eligibility question about the loaded policy documents.",
                Style::default().fg(Color::DarkGray),
            )));
            lines.push(Line::from(Span::styled(
                "Press 'i' to start typing.",
                Style::default().fg(Color::DarkGray),
            )));
        } else {
            lines.push(Line::from(Span::styled(
                "Question answering is disabled: no policy documents are loaded.",
                Style::default().fg(Color::Red),
            )));
        }
    }

    for turn in app.transcript.turns() {
        let (label, style) = match turn.role {
            Role::User => ("You:", user_style),
            Role::Assistant => ("Navigator:", assistant_style),
        };
        lines.push(Line::from(Span::styled(label, style)));
        for raw_line in turn.text.lines() {
            lines.push(markdown_bold_line(raw_line));
        }
        lines.push(Line::default());
    }

    if app.loading {
        lines.push(Line::from(Span::styled("Navigator:", assistant_style)));
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Analyzing policy documents{}", dots),
            Style::default().fg(Color::DarkGray),
        )));
    }

    let transcript = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));
    frame.render_widget(transcript, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let (title, style) = if !app.question_answering_enabled() {
        (
            " No documents loaded ",
            Style::default().fg(Color::DarkGray),
        )
    } else if app.loading {
        (" Waiting for answer... ", Style::default().fg(Color::DarkGray))
    } else if app.input_mode == InputMode::Editing {
        (
            " Enter eligibility question here ",
            Style::default().fg(Color::Yellow),
        )
    } else {
        (
            " Press 'i' to ask a question ",
            Style::default().fg(Color::Gray),
        )
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(style);
    let inner = block.inner(area);

    let input = Paragraph::new(app.input.as_str()).block(block);
    frame.render_widget(input, area);

    if app.input_mode == InputMode::Editing {
        let cursor_x = inner.x + app.cursor.min(inner.width.saturating_sub(1) as usize) as u16;
        frame.set_cursor_position(Position::new(cursor_x, inner.y));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };
    let mode_text = match app.input_mode {
        InputMode::Normal => " CHAT ",
        InputMode::Editing => " TYPE ",
    };

    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints = match app.input_mode {
        InputMode::Normal => vec![
            Span::styled(" i ", key_style),
            Span::styled(" ask ", label_style),
            Span::styled(" j/k ", key_style),
            Span::styled(" scroll ", label_style),
            Span::styled(" d ", key_style),
            Span::styled(" documents ", label_style),
            Span::styled(" Ctrl+R ", key_style),
            Span::styled(" reset ", label_style),
            Span::styled(" q ", key_style),
            Span::styled(" quit ", label_style),
        ],
        InputMode::Editing => vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" send ", label_style),
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

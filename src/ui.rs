use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, FocusPane, InputMode, LoginField, LoginMode, Screen};
use crate::history::Role;

pub fn render(app: &mut App, frame: &mut Frame) {
    match app.screen {
        Screen::Login => render_login_screen(app, frame),
        Screen::Chat => render_chat_screen(app, frame),
    }
}

// ---- Login ----

fn render_login_screen(app: &App, frame: &mut Frame) {
    let area = centered_rect(frame.area(), 52, 14);
    frame.render_widget(Clear, area);

    let [title_area, tabs_area, email_area, password_area, status_area, hint_area] =
        Layout::vertical([
            Constraint::Length(2),
            Constraint::Length(1),
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(2),
            Constraint::Length(1),
        ])
        .areas(area);

    let title = Paragraph::new(Line::from(Span::styled(
        "Ramble",
        Style::default().fg(Color::Cyan).bold(),
    )));
    frame.render_widget(title, title_area);

    let tab_style = |active: bool| {
        if active {
            Style::default().fg(Color::Black).bg(Color::Cyan)
        } else {
            Style::default().fg(Color::DarkGray)
        }
    };
    let tabs = Paragraph::new(Line::from(vec![
        Span::styled(" Sign in ", tab_style(app.login_mode == LoginMode::SignIn)),
        Span::raw(" "),
        Span::styled(" Sign up ", tab_style(app.login_mode == LoginMode::SignUp)),
    ]));
    frame.render_widget(tabs, tabs_area);

    let field_block = |label: &str, focused: bool| {
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" {label} "))
            .border_style(if focused {
                Style::default().fg(Color::Cyan)
            } else {
                Style::default().fg(Color::DarkGray)
            })
    };

    let email = Paragraph::new(app.email_input.as_str())
        .block(field_block("Email", app.login_field == LoginField::Email));
    frame.render_widget(email, email_area);

    let masked = "*".repeat(app.password_input.chars().count());
    let password = Paragraph::new(masked).block(field_block(
        "Password",
        app.login_field == LoginField::Password,
    ));
    frame.render_widget(password, password_area);

    let busy = app.sign_in_task.is_some() || app.sign_up_task.is_some();
    let status_line = if busy {
        Line::from(Span::styled(
            format!("Authenticating{}", app.thinking_dots()),
            Style::default().fg(Color::Yellow),
        ))
    } else if let Some(status) = &app.login_status {
        Line::from(Span::styled(status.clone(), Style::default().fg(Color::Red)))
    } else {
        Line::default()
    };
    frame.render_widget(Paragraph::new(status_line).wrap(Wrap { trim: true }), status_area);

    let hints = Paragraph::new(Line::from(vec![
        Span::styled(" Tab ", Style::default().bg(Color::DarkGray).fg(Color::White)),
        Span::raw(" field  "),
        Span::styled(" Ctrl-t ", Style::default().bg(Color::DarkGray).fg(Color::White)),
        Span::raw(" mode  "),
        Span::styled(" Enter ", Style::default().bg(Color::DarkGray).fg(Color::White)),
        Span::raw(" submit "),
    ]));
    frame.render_widget(hints, hint_area);
}

// ---- Chat ----

fn render_chat_screen(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    let [sidebar_area, main_area] =
        Layout::horizontal([Constraint::Length(30), Constraint::Min(0)]).areas(body_area);

    render_sidebar(app, frame, sidebar_area);

    let [messages_area, input_area] =
        Layout::vertical([Constraint::Min(0), Constraint::Length(3)]).areas(main_area);

    render_messages(app, frame, messages_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);

    if app.show_model_picker {
        render_model_picker(app, frame, area);
    } else if app.show_attach_input {
        render_attach_popup(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" Ramble ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("[{}] ", app.controller.model()),
            Style::default().fg(Color::Gray),
        ),
        Span::styled(
            format!("{} ", app.username),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::Black));
    frame.render_widget(header, area);
}

fn render_sidebar(app: &mut App, frame: &mut Frame, area: Rect) {
    let chats = app.chats();
    let focused = app.focus == FocusPane::Sidebar && app.input_mode == InputMode::Normal;

    let items: Vec<ListItem> = chats
        .iter()
        .map(|(_, title)| ListItem::new(title.clone()))
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" Chats ({}) ", chats.len()))
        .border_style(if focused {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default().fg(Color::DarkGray)
        });

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(Color::Cyan).fg(Color::Black))
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut app.sidebar_state);
}

fn render_messages(app: &mut App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Conversation ")
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(area);
    app.chat_area_height = inner.height;
    app.chat_area_width = inner.width;

    let mut lines: Vec<Line> = Vec::new();
    let active_id = app.controller.manager().active_id().map(str::to_string);

    if let Some(conversation) = app.controller.manager().history().active() {
        let last_idx = conversation.messages.len().saturating_sub(1);
        for (idx, msg) in conversation.messages.iter().enumerate() {
            let (label, style) = match msg.role {
                Role::User => ("You:", Style::default().fg(Color::Cyan).bold()),
                Role::Assistant => ("AI:", Style::default().fg(Color::Yellow).bold()),
                Role::System => ("Context:", Style::default().fg(Color::DarkGray).bold()),
            };
            lines.push(Line::from(Span::styled(label, style)));

            // Reveal the newest reply gradually; the full text is already
            // stored and persisted.
            let partial;
            let content: &str = match (&app.typing, msg.role) {
                (Some(typing), Role::Assistant)
                    if idx == last_idx && Some(&typing.chat_id) == active_id.as_ref() =>
                {
                    let shown: String = msg.content.chars().take(typing.shown).collect();
                    partial = format!("{shown}▌");
                    &partial
                }
                _ => &msg.content,
            };

            for line in content.lines() {
                lines.push(Line::from(Span::raw(line.to_string())));
            }
            lines.push(Line::default());
        }
    }

    if app.inference_task.is_some() {
        lines.push(Line::from(Span::styled(
            "AI:",
            Style::default().fg(Color::Yellow).bold(),
        )));
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", app.thinking_dots()),
            Style::default().fg(Color::DarkGray),
        )));
    }

    let text = if lines.is_empty() {
        Text::from(Span::styled(
            "Say something to start the conversation...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        Text::from(lines)
    };

    let paragraph = Paragraph::new(text)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));
    frame.render_widget(paragraph, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Message ")
        .border_style(if editing {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default().fg(Color::DarkGray)
        });
    let inner = block.inner(area);

    let input = Paragraph::new(app.chat_input.as_str()).block(block);
    frame.render_widget(input, area);

    if editing {
        let cursor_x = inner.x + app.chat_cursor.min(inner.width.saturating_sub(1) as usize) as u16;
        frame.set_cursor_position((cursor_x, inner.y));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    if let Some(status) = &app.status {
        let footer = Paragraph::new(Line::from(Span::styled(
            format!(" {status} "),
            Style::default().fg(Color::White).bg(Color::Red),
        )));
        frame.render_widget(footer, area);
        return;
    }

    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().fg(Color::Gray);

    let hints = match app.input_mode {
        InputMode::Editing => vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" send ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" normal ", label_style),
            Span::styled(" Tab ", key_style),
            Span::styled(" chats ", label_style),
        ],
        InputMode::Normal => vec![
            Span::styled(" n ", key_style),
            Span::styled(" new ", label_style),
            Span::styled(" d ", key_style),
            Span::styled(" delete ", label_style),
            Span::styled(" D ", key_style),
            Span::styled(" clear all ", label_style),
            Span::styled(" m ", key_style),
            Span::styled(" model ", label_style),
            Span::styled(" o ", key_style),
            Span::styled(" attach ", label_style),
            Span::styled(" e ", key_style),
            Span::styled(" export ", label_style),
            Span::styled(" q ", key_style),
            Span::styled(" quit ", label_style),
        ],
    };

    frame.render_widget(Paragraph::new(Line::from(hints)), area);
}

// ---- Popups ----

fn render_model_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let popup = centered_rect(area, 60, 9);
    frame.render_widget(Clear, popup);

    let items: Vec<ListItem> = app
        .available_models
        .iter()
        .map(|model| ListItem::new(model.clone()))
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Choose Model ")
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .highlight_style(Style::default().bg(Color::Cyan).fg(Color::Black))
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup, &mut app.model_picker_state);
}

fn render_attach_popup(app: &App, frame: &mut Frame, area: Rect) {
    let popup = centered_rect(area, 60, 3);
    frame.render_widget(Clear, popup);

    let input = Paragraph::new(app.attach_input.as_str()).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Attach text file (path) ")
            .border_style(Style::default().fg(Color::Cyan)),
    );
    frame.render_widget(input, popup);
}

fn centered_rect(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width.saturating_sub(width)) / 2,
        y: area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height,
    }
}

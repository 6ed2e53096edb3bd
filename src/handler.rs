use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::{App, FocusPane, InputMode, LoginField, LoginMode, Screen};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Resize => {}
        AppEvent::Tick => {
            app.tick_animation();
            app.poll_tasks().await;
        }
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global quit
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    match app.screen {
        Screen::Login => handle_login_key(app, key),
        Screen::Chat => handle_chat_key(app, key),
    }
}

fn handle_login_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Tab | KeyCode::Down => {
            app.login_field = match app.login_field {
                LoginField::Email => LoginField::Password,
                LoginField::Password => LoginField::Email,
            };
        }
        KeyCode::Up => {
            app.login_field = LoginField::Email;
        }
        // Toggle between sign-in and sign-up
        KeyCode::Char('t') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.login_mode = match app.login_mode {
                LoginMode::SignIn => LoginMode::SignUp,
                LoginMode::SignUp => LoginMode::SignIn,
            };
            app.login_status = None;
        }
        KeyCode::Enter => app.submit_login(),
        KeyCode::Esc => app.should_quit = true,
        KeyCode::Backspace => {
            match app.login_field {
                LoginField::Email => app.email_input.pop(),
                LoginField::Password => app.password_input.pop(),
            };
        }
        KeyCode::Char(c) => {
            match app.login_field {
                LoginField::Email => app.email_input.push(c),
                LoginField::Password => app.password_input.push(c),
            };
            app.login_status = None;
        }
        _ => {}
    }
}

fn handle_chat_key(app: &mut App, key: KeyEvent) {
    if app.show_model_picker {
        handle_model_picker_key(app, key);
        return;
    }
    if app.show_attach_input {
        handle_attach_key(app, key);
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_chat_normal(app, key),
        InputMode::Editing => handle_chat_editing(app, key),
    }
}

fn handle_chat_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        // Sidebar navigation
        KeyCode::Char('j') | KeyCode::Down => {
            if app.focus == FocusPane::Sidebar {
                app.sidebar_nav_down();
            } else {
                app.scroll_down();
            }
        }
        KeyCode::Char('k') | KeyCode::Up => {
            if app.focus == FocusPane::Sidebar {
                app.sidebar_nav_up();
            } else {
                app.scroll_up();
            }
        }
        KeyCode::Enter => {
            if app.focus == FocusPane::Sidebar {
                app.select_sidebar_chat();
            } else {
                app.input_mode = InputMode::Editing;
            }
        }
        KeyCode::Tab => {
            app.focus = match app.focus {
                FocusPane::Sidebar => FocusPane::Input,
                FocusPane::Input => FocusPane::Sidebar,
            };
        }

        // Conversation actions
        KeyCode::Char('n') => {
            app.new_chat();
            app.focus = FocusPane::Input;
            app.input_mode = InputMode::Editing;
        }
        KeyCode::Char('d') => {
            if app.focus == FocusPane::Sidebar {
                app.delete_selected_chat();
            }
        }
        KeyCode::Char('D') => app.clear_all_chats(),
        KeyCode::Char('m') => {
            app.show_model_picker = true;
            if app.model_picker_state.selected().is_none() {
                app.model_picker_state.select(Some(0));
            }
        }
        KeyCode::Char('e') => app.export_active_chat(),
        KeyCode::Char('o') => {
            app.show_attach_input = true;
        }
        KeyCode::Char('L') => app.logout(),

        KeyCode::Char('i') => {
            app.focus = FocusPane::Input;
            app.input_mode = InputMode::Editing;
        }

        _ => {}
    }
}

fn handle_chat_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => app.submit_chat_input(),
        KeyCode::Char(c) => {
            let byte_idx = char_to_byte_index(&app.chat_input, app.chat_cursor);
            app.chat_input.insert(byte_idx, c);
            app.chat_cursor += 1;
            app.status = None;
        }
        KeyCode::Backspace => {
            if app.chat_cursor > 0 {
                let byte_idx = char_to_byte_index(&app.chat_input, app.chat_cursor - 1);
                app.chat_input.remove(byte_idx);
                app.chat_cursor -= 1;
            }
        }
        KeyCode::Left => {
            app.chat_cursor = app.chat_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let len = app.chat_input.chars().count();
            app.chat_cursor = (app.chat_cursor + 1).min(len);
        }
        KeyCode::Home => app.chat_cursor = 0,
        KeyCode::End => app.chat_cursor = app.chat_input.chars().count(),
        KeyCode::Up => app.scroll_up(),
        KeyCode::Down => app.scroll_down(),
        KeyCode::Tab => {
            app.input_mode = InputMode::Normal;
            app.focus = FocusPane::Sidebar;
        }
        _ => {}
    }
}

fn handle_model_picker_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.show_model_picker = false,
        KeyCode::Char('j') | KeyCode::Down => app.model_picker_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.model_picker_nav_up(),
        KeyCode::Enter => app.select_model(),
        _ => {}
    }
}

fn handle_attach_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.show_attach_input = false;
            app.attach_input.clear();
        }
        KeyCode::Enter => app.attach_file(),
        KeyCode::Backspace => {
            app.attach_input.pop();
        }
        KeyCode::Char(c) => app.attach_input.push(c),
        _ => {}
    }
}

use anyhow::Result;
use ratatui::widgets::ListState;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::auth::{AuthClient, AuthError, AuthSession};
use crate::chat::{ChatController, ChatError};
use crate::config::Config;
use crate::history::HistoryStore;
use crate::inference::{Inference, InferenceClient, InferenceError, DEFAULT_API_URL, DEFAULT_MODEL};
use crate::manager::ConversationManager;

/// Characters revealed per tick while a finished reply is being "typed".
const TYPING_CHARS_PER_TICK: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Login,
    Chat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Sidebar,
    Input,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMode {
    SignIn,
    SignUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginField {
    Email,
    Password,
}

/// Cosmetic reveal state for a reply that has already fully arrived and been
/// persisted. Rendering-only; the data layer never sees a partial reply.
pub struct TypingReply {
    pub chat_id: String,
    pub shown: usize,
    pub total: usize,
}

pub struct App {
    pub should_quit: bool,
    pub screen: Screen,
    pub input_mode: InputMode,
    pub focus: FocusPane,

    // Login state
    pub auth_client: Option<AuthClient>,
    pub session: Option<AuthSession>,
    pub username: String,
    pub login_mode: LoginMode,
    pub login_field: LoginField,
    pub email_input: String,
    pub password_input: String,
    pub login_status: Option<String>,
    pub sign_in_task: Option<JoinHandle<Result<AuthSession, AuthError>>>,
    pub sign_up_task: Option<JoinHandle<Result<(), AuthError>>>,

    // Chat state
    pub controller: ChatController<InferenceClient>,
    pub chat_input: String,
    pub chat_cursor: usize,
    pub sidebar_state: ListState,
    pub chat_scroll: u16,
    pub chat_area_height: u16,
    pub chat_area_width: u16,
    pub inference_task: Option<JoinHandle<Result<String, InferenceError>>>,
    pub typing: Option<TypingReply>,
    pub animation_frame: u8,
    pub status: Option<String>,

    // Model picker state
    pub show_model_picker: bool,
    pub available_models: Vec<String>,
    pub model_picker_state: ListState,

    // Attach popup state
    pub show_attach_input: bool,
    pub attach_input: String,
}

impl App {
    pub fn new() -> Result<Self> {
        let config = Config::load().unwrap_or_else(|_| Config::new());

        let store = HistoryStore::new(Config::history_path()?);
        let mut manager = ConversationManager::new(store);
        manager.ensure_active_chat()?;

        let api_url = config
            .api_url
            .clone()
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let token = config.resolved_api_token();
        let status = if token.is_none() {
            Some("No API token configured. Set RAMBLE_API_TOKEN or api_token in config.json".to_string())
        } else {
            None
        };
        let client = InferenceClient::new(&api_url, token.as_deref().unwrap_or_default());

        let model = config
            .default_model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let controller = ChatController::new(manager, client, model);

        let auth_client = config
            .resolved_auth()
            .map(|(url, key)| AuthClient::new(&url, &key));
        let screen = if auth_client.is_some() {
            Screen::Login
        } else {
            Screen::Chat
        };

        let mut app = Self {
            should_quit: false,
            screen,
            input_mode: InputMode::Editing,
            focus: FocusPane::Input,

            auth_client,
            session: None,
            username: "local".to_string(),
            login_mode: LoginMode::SignIn,
            login_field: LoginField::Email,
            email_input: String::new(),
            password_input: String::new(),
            login_status: None,
            sign_in_task: None,
            sign_up_task: None,

            controller,
            chat_input: String::new(),
            chat_cursor: 0,
            sidebar_state: ListState::default(),
            chat_scroll: 0,
            chat_area_height: 0,
            chat_area_width: 0,
            inference_task: None,
            typing: None,
            animation_frame: 0,
            status,

            show_model_picker: false,
            available_models: InferenceClient::list_models(),
            model_picker_state: ListState::default(),

            show_attach_input: false,
            attach_input: String::new(),
        };
        app.sync_sidebar_selection();
        Ok(app)
    }

    // ---- Login flow ----

    pub fn submit_login(&mut self) {
        let Some(client) = self.auth_client.clone() else {
            return;
        };
        if self.sign_in_task.is_some() || self.sign_up_task.is_some() {
            return;
        }
        if self.email_input.trim().is_empty() || self.password_input.is_empty() {
            self.login_status = Some("Email and password are required".to_string());
            return;
        }

        let email = self.email_input.trim().to_string();
        let password = self.password_input.clone();
        self.login_status = None;

        match self.login_mode {
            LoginMode::SignIn => {
                self.sign_in_task = Some(tokio::spawn(async move {
                    client.sign_in(&email, &password).await
                }));
            }
            LoginMode::SignUp => {
                self.sign_up_task = Some(tokio::spawn(async move {
                    client.sign_up(&email, &password).await
                }));
            }
        }
    }

    fn finish_sign_in(&mut self, result: Result<AuthSession, AuthError>) {
        match result {
            Ok(session) => {
                self.username = session.email.clone();
                self.session = Some(session);
                self.password_input.clear();
                self.screen = Screen::Chat;
                self.input_mode = InputMode::Editing;
                self.focus = FocusPane::Input;
            }
            Err(err) => {
                self.login_status = Some(format!("Login failed: {err}"));
            }
        }
    }

    fn finish_sign_up(&mut self, result: Result<(), AuthError>) {
        match result {
            Ok(()) => {
                self.login_status = Some("Account created! Please sign in.".to_string());
                self.login_mode = LoginMode::SignIn;
                self.password_input.clear();
            }
            Err(err) => {
                self.login_status = Some(format!("Signup failed: {err}"));
            }
        }
    }

    pub fn logout(&mut self) {
        if self.auth_client.is_none() {
            return;
        }
        self.session = None;
        self.username = "local".to_string();
        self.password_input.clear();
        self.login_status = None;
        self.screen = Screen::Login;
        self.login_field = LoginField::Email;
    }

    // ---- Chat turns ----

    /// Makes the user message durable, then runs the inference call as its
    /// own task so the event loop keeps ticking.
    pub fn submit_chat_input(&mut self) {
        if self.inference_task.is_some() {
            return;
        }
        let input = self.chat_input.clone();
        match self.controller.begin_turn(&input) {
            Ok(messages) => {
                self.chat_input.clear();
                self.chat_cursor = 0;
                self.status = None;
                let client = self.controller.client().clone();
                let model = self.controller.model().to_string();
                self.inference_task = Some(tokio::spawn(async move {
                    client.chat(&model, &messages).await
                }));
                self.sync_sidebar_selection();
                self.scroll_chat_to_bottom();
            }
            Err(ChatError::EmptyInput) => {}
            Err(ChatError::TurnInFlight) => {}
            Err(err) => {
                self.status = Some(format!("Could not save message: {err}"));
            }
        }
    }

    fn finish_turn(&mut self, result: Result<String, InferenceError>) {
        match result {
            Ok(reply) => {
                let total = reply.chars().count();
                let chat_id = self.controller.pending_chat().map(str::to_string);
                if let Err(err) = self.controller.complete_turn(reply) {
                    self.status = Some(format!(
                        "Reply received but not saved, history may not survive a restart: {err}"
                    ));
                }
                if let Some(chat_id) = chat_id {
                    self.typing = Some(TypingReply {
                        chat_id,
                        shown: 0,
                        total,
                    });
                }
                self.sync_sidebar_selection();
                self.scroll_chat_to_bottom();
            }
            Err(err) => {
                self.controller.fail_turn();
                warn!("inference call failed: {err}");
                self.status = Some(format!("API error: {err}"));
            }
        }
    }

    /// Polls the spawned tasks. Called on every tick; completed handles are
    /// consumed here so their results land back on the UI thread.
    pub async fn poll_tasks(&mut self) {
        if self
            .inference_task
            .as_ref()
            .is_some_and(|task| task.is_finished())
        {
            if let Some(task) = self.inference_task.take() {
                match task.await {
                    Ok(result) => self.finish_turn(result),
                    Err(err) => {
                        self.controller.fail_turn();
                        self.status = Some(format!("API task failed: {err}"));
                    }
                }
            }
        }

        if self
            .sign_in_task
            .as_ref()
            .is_some_and(|task| task.is_finished())
        {
            if let Some(task) = self.sign_in_task.take() {
                match task.await {
                    Ok(result) => self.finish_sign_in(result),
                    Err(err) => self.login_status = Some(format!("Login failed: {err}")),
                }
            }
        }

        if self
            .sign_up_task
            .as_ref()
            .is_some_and(|task| task.is_finished())
        {
            if let Some(task) = self.sign_up_task.take() {
                match task.await {
                    Ok(result) => self.finish_sign_up(result),
                    Err(err) => self.login_status = Some(format!("Signup failed: {err}")),
                }
            }
        }
    }

    // ---- Conversation list ----

    pub fn chats(&self) -> Vec<(String, String)> {
        self.controller.manager().list_chats()
    }

    pub fn selected_chat_id(&self) -> Option<String> {
        let chats = self.chats();
        self.sidebar_state
            .selected()
            .and_then(|i| chats.get(i))
            .map(|(id, _)| id.clone())
    }

    pub fn sync_sidebar_selection(&mut self) {
        let chats = self.chats();
        let selected = self
            .controller
            .manager()
            .active_id()
            .and_then(|active| chats.iter().position(|(id, _)| id == active));
        self.sidebar_state.select(selected);
    }

    pub fn sidebar_nav_down(&mut self) {
        let len = self.chats().len();
        if len > 0 {
            let i = self.sidebar_state.selected().unwrap_or(0);
            self.sidebar_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn sidebar_nav_up(&mut self) {
        let i = self.sidebar_state.selected().unwrap_or(0);
        self.sidebar_state.select(Some(i.saturating_sub(1)));
    }

    pub fn select_sidebar_chat(&mut self) {
        if let Some(id) = self.selected_chat_id() {
            if let Err(err) = self.controller.manager_mut().select_chat(&id) {
                self.status = Some(format!("Could not save selection: {err}"));
            }
            self.scroll_chat_to_bottom();
        }
    }

    pub fn new_chat(&mut self) {
        match self.controller.manager_mut().new_chat() {
            Ok(_) => {
                self.sync_sidebar_selection();
                self.chat_scroll = 0;
            }
            Err(err) => self.status = Some(format!("Could not create chat: {err}")),
        }
    }

    pub fn delete_selected_chat(&mut self) {
        let Some(id) = self.selected_chat_id() else {
            return;
        };
        let mut result = self.controller.manager_mut().delete_chat(&id);
        if result.is_ok() {
            result = self.controller.manager_mut().ensure_active_chat().map(|_| ());
        }
        if let Err(err) = result {
            self.status = Some(format!("Could not delete chat: {err}"));
        }
        self.sync_sidebar_selection();
    }

    pub fn clear_all_chats(&mut self) {
        let mut result = self.controller.manager_mut().clear_all();
        if result.is_ok() {
            result = self.controller.manager_mut().ensure_active_chat().map(|_| ());
        }
        if let Err(err) = result {
            self.status = Some(format!("Could not clear history: {err}"));
        }
        self.sync_sidebar_selection();
        self.chat_scroll = 0;
    }

    // ---- Attachments and export ----

    pub fn attach_file(&mut self) {
        let path = self.attach_input.trim().to_string();
        self.show_attach_input = false;
        self.attach_input.clear();
        if path.is_empty() {
            return;
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => match self.controller.attach(&content) {
                Ok(()) => {
                    self.status = Some(format!("Attached {path}"));
                    self.sync_sidebar_selection();
                    self.scroll_chat_to_bottom();
                }
                Err(err) => self.status = Some(format!("Could not save attachment: {err}")),
            },
            Err(err) => {
                self.status = Some(format!("Could not read {path}: {err}"));
            }
        }
    }

    pub fn export_active_chat(&mut self) {
        let Some(id) = self.controller.manager().active_id().map(str::to_string) else {
            return;
        };
        let Some(transcript) = self.controller.manager().export_transcript(&id) else {
            return;
        };
        match std::fs::write("chat.txt", transcript) {
            Ok(()) => self.status = Some("Saved transcript to chat.txt".to_string()),
            Err(err) => self.status = Some(format!("Could not write chat.txt: {err}")),
        }
    }

    // ---- Model picker ----

    pub fn model_picker_nav_down(&mut self) {
        let len = self.available_models.len();
        if len > 0 {
            let i = self.model_picker_state.selected().unwrap_or(0);
            self.model_picker_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn model_picker_nav_up(&mut self) {
        let i = self.model_picker_state.selected().unwrap_or(0);
        self.model_picker_state.select(Some(i.saturating_sub(1)));
    }

    pub fn select_model(&mut self) {
        if let Some(i) = self.model_picker_state.selected() {
            if let Some(model) = self.available_models.get(i).cloned() {
                self.controller.set_model(model.clone());
                self.show_model_picker = false;
                let _ = Config::save_default_model(&model);
            }
        }
    }

    // ---- Animation ----

    pub fn tick_animation(&mut self) {
        self.animation_frame = self.animation_frame.wrapping_add(1);

        if let Some(typing) = self.typing.as_mut() {
            typing.shown = (typing.shown + TYPING_CHARS_PER_TICK).min(typing.total);
        }
        if self.typing.is_some() {
            self.scroll_chat_to_bottom();
        }
        if self.typing.as_ref().is_some_and(|t| t.shown >= t.total) {
            self.typing = None;
        }

        if self.inference_task.is_some() {
            self.scroll_chat_to_bottom();
        }
    }

    /// Ellipsis frame for the "Thinking" indicator, cycling every third tick.
    pub fn thinking_dots(&self) -> String {
        ".".repeat((self.animation_frame as usize / 3) % 3 + 1)
    }

    /// Keeps the newest message in view. Wrap math mirrors what the renderer
    /// does: a role line per message, wrapped content lines, a blank spacer.
    pub fn scroll_chat_to_bottom(&mut self) {
        let wrap_width = if self.chat_area_width > 0 {
            self.chat_area_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;
        if let Some(conversation) = self.controller.manager().history().active() {
            for msg in &conversation.messages {
                total_lines += 1; // role line
                for line in msg.content.lines() {
                    let char_count = line.chars().count();
                    if char_count == 0 {
                        total_lines += 1;
                    } else {
                        total_lines += ((char_count / wrap_width) + 1) as u16;
                    }
                }
                total_lines += 1; // spacer
            }
        }

        if self.inference_task.is_some() {
            total_lines += 2; // role line + "Thinking..."
        }

        let visible_height = if self.chat_area_height > 0 {
            self.chat_area_height
        } else {
            20
        };

        if total_lines > visible_height {
            self.chat_scroll = total_lines.saturating_sub(visible_height);
        } else {
            self.chat_scroll = 0;
        }
    }

    pub fn scroll_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    pub fn scroll_down(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_add(1);
    }
}

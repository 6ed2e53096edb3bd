use anyhow::Result;
use std::fs;
use std::sync::Mutex;

mod app;
mod auth;
mod chat;
mod config;
mod handler;
mod history;
mod inference;
mod manager;
mod tui;
mod ui;

use app::App;
use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;
    tui::install_panic_hook();

    let mut app = App::new()?;

    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new();
    let result = run(&mut terminal, &mut events, &mut app).await;
    tui::restore()?;

    result
}

async fn run(terminal: &mut tui::Tui, events: &mut tui::EventHandler, app: &mut App) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        if let Some(event) = events.next().await {
            handler::handle_event(app, event).await?;
        }
    }
    Ok(())
}

/// The TUI owns stderr, so logs go to a file under the config dir.
fn init_logging() -> Result<()> {
    let path = Config::log_path()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(&path)?;

    tracing_subscriber::fmt()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .init();
    Ok(())
}

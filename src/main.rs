use anyhow::Result;

mod answer;
mod app;
mod config;
mod corpus;
mod gemini;
mod handler;
mod transcript;
mod tui;
mod ui;

use app::App;
use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Best-effort .env load before the credential check
    dotenvy::dotenv().ok();

    let config = Config::load().unwrap_or_else(|_| Config::new());

    // Missing credential is the one fatal startup condition
    let Some(api_key) = config.api_key() else {
        eprintln!("Error: GEMINI_API_KEY not found. Set it in your environment or .env file.");
        std::process::exit(1);
    };

    // Reconcile and upload the policy corpus before entering the
    // alternate screen; per-document results show in the documents panel.
    println!("Loading policy documents from {:?}...", config.docs_dir());
    let mut app = App::new(&config, &api_key).await?;

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new();

    let result = run(&mut terminal, &mut events, &mut app).await;

    // Restore the terminal on every exit path; panics are covered by the hook.
    tui::restore()?;
    result
}

async fn run(terminal: &mut tui::Tui, events: &mut tui::EventHandler, app: &mut App) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event).await?,
            None => break,
        }
    }
    Ok(())
}

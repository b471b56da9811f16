mod action;
mod app;
mod auth;
mod config;
mod error;
mod event;
mod fetch;
mod history;
mod query;
mod sonar;
mod source;
#[cfg(test)]
mod testing;
mod tui;
mod types;
mod ui;

use std::panic;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::action::Action;
use crate::app::App;
use crate::config::Config;
use crate::query::Location;
use crate::sonar::Sonar;
use crate::source::IssueSource;
use crate::tui::EventHandler;

/// Browse and triage SonarQube issues from the terminal
#[derive(Debug, Parser)]
#[command(name = "snag", version, about)]
struct Cli {
    /// Server name from the config file, or a server URL
    #[arg(short, long)]
    server: Option<String>,

    /// Scope the issue list to a project or component key
    #[arg(short, long)]
    component: Option<String>,

    /// Only show issues assigned to the logged-in user
    #[arg(short, long)]
    my_issues: bool,

    /// Issue key to open in detail view
    #[arg(short, long)]
    open: Option<String>,

    /// Issue query as a URL query string, e.g. "resolved=false&severities=BLOCKER"
    #[arg(default_value = "")]
    query: String,
}

impl Cli {
    fn location(&self, project_key: Option<String>) -> Location {
        let mut location = Location::parse(&self.query);
        if let Some(component) = self.component.clone().or(project_key) {
            location.component = Some(component);
        }
        location.my_issues |= self.my_issues;
        if self.open.is_some() {
            location.open = self.open.clone();
        }
        location
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::load();
    let project = config::detect_project().unwrap_or_default();

    let wanted = cli.server.as_deref().or(project.host_url.as_deref());
    let server = config.select_server(wanted)?;
    let token = auth::load_server_token(&server);
    tracing::info!(
        server = %server.name,
        url = %server.url,
        authenticated = token.is_some(),
        "connecting"
    );

    let source: Arc<dyn IssueSource> = Arc::new(Sonar::new(&server.url, token)?);
    let location = cli.location(project.project_key);
    let settings = config.general.fetch_settings();

    // Restore the terminal before the default hook prints
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let _ = tui::restore();
        original_hook(panic_info);
    }));

    let result = run(source, location, settings).await;

    tui::restore()?;

    result
}

async fn run(
    source: Arc<dyn IssueSource>,
    location: Location,
    settings: fetch::FetchSettings,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut terminal = tui::init()?;

    let (action_tx, mut action_rx) = mpsc::unbounded_channel::<Action>();
    let mut app = App::new(source, location, settings, action_tx.clone());

    let tick_rate = Duration::from_millis(250);
    let render_rate = Duration::from_millis(16);
    let mut events = EventHandler::new(tick_rate, render_rate);

    loop {
        tokio::select! {
            Some(event) = events.next() => {
                if event.is_quit() {
                    break;
                }

                if event.needs_redraw() {
                    terminal.draw(|frame| ui::render(frame, &app))?;
                } else {
                    let action = app.handle_event(event);
                    if !matches!(action, Action::None) {
                        action_tx.send(action)?;
                    }
                }
            }
            Some(action) = action_rx.recv() => {
                app.update(action);
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

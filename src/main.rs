mod config;
mod contracts;
mod db;
mod error;
mod lifecycle;
mod logging;
mod models;
mod numbering;
mod tiles;
mod ui;
mod visibility;

use std::io;
use std::sync::Arc;

use anyhow::Result;
use chrono::Datelike;
use clap::Parser;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{self, EnterAlternateScreen, LeaveAlternateScreen},
};
use tokio::sync::mpsc;
use tracing::{error, info};
use tui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};

use crate::contracts::StoredContracts;
use crate::db::{DocumentId, DocumentStore, MemoryStore, Subscription};
use crate::lifecycle::ClientController;
use crate::models::Client;
use crate::ui::{
    client_wizard::{handle_input as handle_client_wizard_input, render_client_wizard, ClientWizardAction, ClientWizardState},
    clients::{handle_input as handle_clients_input, render_clients, ClientAction, ClientsState},
    year_options,
};

/// Terminal client registry for construction projects
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// Keep clients in memory instead of PostgreSQL
    #[arg(long)]
    memory: bool,

    /// Year to show first, defaults to the current one
    #[arg(long)]
    year: Option<i32>,
}

// Represents the current screen in the app
enum AppScreen {
    Clients,
    ClientWizard,
}

// Main application state
struct AppState {
    controller: ClientController,
    screen: AppScreen,
    clients_state: ClientsState,
    client_wizard_state: Option<ClientWizardState>,
    snapshots: mpsc::UnboundedReceiver<Vec<Client>>,
    subscription: Subscription,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = config::init()?;
    let _log_guard = logging::init(&config.log_dir)?;
    println!("Initializing client registry...");

    let store: Arc<dyn DocumentStore> = if cli.memory {
        println!("Using in-memory store, nothing will be saved");
        Arc::new(MemoryStore::new())
    } else {
        let store = db::init(&config).await?;
        println!("Database connection established");
        Arc::new(store)
    };

    let contracts = Arc::new(StoredContracts::new(Arc::clone(&store)));
    let controller = ClientController::new(store, contracts, config.sequence_policy(), config.tile_defaults());

    // First screen comes from a plain read, the subscription keeps it current
    let clients = controller.load_clients().await?;
    let (tx, snapshots) = mpsc::unbounded_channel();
    let subscription = controller
        .subscribe_clients(move |clients| {
            let _ = tx.send(clients);
        })
        .await?;

    let current_year = chrono::Local::now().year();
    let year = cli.year.unwrap_or(current_year);
    let mut clients_state = ClientsState::new(year, year_options(current_year, year));
    clients_state.replace_clients(clients);
    let mut app_state = AppState {
        controller,
        screen: AppScreen::Clients,
        clients_state,
        client_wizard_state: None,
        snapshots,
        subscription,
    };
    info!(year, memory = cli.memory, "client registry started");

    // Setup terminal
    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the main app loop
    let result = run_app(&mut terminal, &mut app_state).await;
    app_state.subscription.cancel();

    // Restore terminal
    terminal::disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    // Show any error message
    if let Err(err) = result {
        error!(error = ?err, "client registry stopped");
        println!("Error: {:#}", err);
    }

    Ok(())
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, app_state: &mut AppState) -> Result<()> {
    loop {
        // Apply whatever the subscription pushed since the last frame
        while let Ok(clients) = app_state.snapshots.try_recv() {
            app_state.clients_state.replace_clients(clients);
        }

        terminal.draw(|f| match app_state.screen {
            AppScreen::Clients => render_clients(f, &mut app_state.clients_state),
            AppScreen::ClientWizard => {
                if let Some(state) = &mut app_state.client_wizard_state {
                    render_client_wizard(f, state);
                }
            }
        })?;

        let should_quit = match app_state.screen {
            AppScreen::Clients => handle_clients_screen(app_state).await?,
            AppScreen::ClientWizard => handle_client_wizard_screen(app_state).await?,
        };

        if should_quit {
            break;
        }
    }

    Ok(())
}

fn find_client(app_state: &AppState, id: DocumentId) -> Option<Client> {
    app_state.clients_state.client(id).cloned()
}

async fn handle_clients_screen(app_state: &mut AppState) -> Result<bool> {
    let Some(action) = handle_clients_input(&mut app_state.clients_state)? else {
        return Ok(false);
    };

    match action {
        ClientAction::Quit => return Ok(true),
        ClientAction::NewClient(year) => {
            let options = app_state.clients_state.year_options().to_vec();
            app_state.client_wizard_state = Some(ClientWizardState::new(year, options));
            app_state.screen = AppScreen::ClientWizard;
            refresh_number_preview(app_state).await;
        }
        ClientAction::EditClient(id) => {
            if let Some(client) = find_client(app_state, id) {
                let options = year_options(chrono::Local::now().year(), client.year);
                app_state.client_wizard_state = Some(ClientWizardState::from_existing(client, options));
                app_state.screen = AppScreen::ClientWizard;
            }
        }
        ClientAction::MoveClient(id, category) => {
            if let Some(client) = find_client(app_state, id) {
                if let Err(err) = app_state.controller.move_client(&client, category).await {
                    error!(error = ?err, completed = ?err.completed_steps(), "moving client failed");
                    app_state.clients_state.notify("Failed to change the client's category");
                }
            }
        }
        ClientAction::ToggleIcon(id) => {
            if let Some(client) = find_client(app_state, id) {
                let AppState {
                    controller,
                    clients_state,
                    ..
                } = app_state;
                if let Err(err) = controller
                    .toggle_icon_visibility(&client, clients_state.visibility_mut())
                    .await
                {
                    error!(error = ?err, completed = ?err.completed_steps(), "toggling project icon failed");
                    clients_state.notify("Failed to update the client's settings");
                }
            }
        }
        ClientAction::DeleteClient(id) => {
            if let Some(client) = find_client(app_state, id) {
                if let Err(err) = app_state.controller.delete_client(&client).await {
                    error!(error = ?err, completed = ?err.completed_steps(), "deleting client failed");
                    app_state.clients_state.notify("Failed to delete the client");
                }
            }
        }
    }

    Ok(false)
}

async fn handle_client_wizard_screen(app_state: &mut AppState) -> Result<bool> {
    let Some(state) = &mut app_state.client_wizard_state else {
        app_state.screen = AppScreen::Clients;
        return Ok(false);
    };

    match handle_client_wizard_input(state)? {
        Some(ClientWizardAction::Cancel) => {
            close_wizard(app_state);
        }
        Some(ClientWizardAction::Save(draft)) => {
            let original = state.original.clone();
            let saved = match &original {
                Some(client) => app_state.controller.edit_client(client, &draft).await,
                None => app_state.controller.create_client(&draft).await,
            };

            match saved {
                Ok(_) => close_wizard(app_state),
                Err(err) => {
                    error!(error = ?err, completed = ?err.completed_steps(), "saving client failed");
                    if let Some(state) = &mut app_state.client_wizard_state {
                        state.set_error("Failed to save the client");
                    }
                }
            }
        }
        None => refresh_number_preview(app_state).await,
    }

    Ok(false)
}

fn close_wizard(app_state: &mut AppState) {
    app_state.client_wizard_state = None;
    app_state.screen = AppScreen::Clients;
}

/// Regenerate the wizard's number preview once its year or category changed
async fn refresh_number_preview(app_state: &mut AppState) {
    let Some(state) = &mut app_state.client_wizard_state else {
        return;
    };
    let Some((year, category)) = state.stale_number_scope() else {
        return;
    };

    match app_state.controller.numbers().next_client_number(year, category).await {
        Ok(number) => state.set_number_preview((year, category), number.to_string()),
        Err(err) => {
            error!(error = ?err, "generating client number failed");
            state.set_number_preview((year, category), "unavailable".to_string());
            state.set_error("Failed to generate a client number");
        }
    }
}

mod app;
mod components;
mod draw;
mod keys;
mod state;
mod ui;

use crate::app::App;
use crate::state::app_settings::AppSettings;
use crate::state::channel::{self, ChannelConfig, ChannelEvent, ReconnectPolicy};
use crate::state::messages::{FeedUpdate, NetworkRequest, NetworkResponse, UiEvent};
use crate::state::network::{LoadingState, NetworkWorker};
use chrono::Local;
use crossterm::event::{self as crossterm_event, Event};
use crossterm::{cursor, execute, terminal};
use log::{LevelFilter, error, info};
use standings_api::client::LeaderboardApi;
use std::io::Stdout;
use std::sync::Arc;
use std::{io, panic};
use tokio::sync::{Mutex, mpsc};
use tokio::time::Duration;
use tui::{Terminal, backend::CrosstermBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Some(settings) = handle_cli_args(AppSettings::load()) else {
        return Ok(());
    };

    better_panic::install();

    let backend = CrosstermBackend::new(io::stdout());
    let terminal = Terminal::new(backend)?;

    setup_panic_hook();
    setup_terminal();

    let level = settings.log_level.unwrap_or(LevelFilter::Error);
    tui_logger::init_logger(level)?;
    tui_logger::set_default_level(level);

    let (ui_event_tx, ui_event_rx) = mpsc::channel::<UiEvent>(100);
    let (network_req_tx, network_req_rx) = mpsc::channel::<NetworkRequest>(100);
    let (network_resp_tx, network_resp_rx) = mpsc::channel::<NetworkResponse>(100);
    let (feed_tx, feed_rx) = mpsc::unbounded_channel::<FeedUpdate>();

    // Input handler thread
    let input_handler = tokio::spawn(input_handler_task(ui_event_tx.clone()));

    // Network thread
    let api = LeaderboardApi::new(settings.api_url.clone())
        .with_token(settings.token.clone())
        .with_timeout(settings.http_timeout);
    let network_worker =
        NetworkWorker::new(api, settings.export_dir.clone(), network_req_rx, network_resp_tx);
    let network_task = tokio::spawn(network_worker.run());

    // Realtime channel thread
    let (channel_client, channel_worker, channel_events) = channel::connect(ChannelConfig {
        url: settings.ws_url.clone(),
        token: settings.token.clone(),
        reconnect: ReconnectPolicy::default(),
    });
    let channel_task = tokio::spawn(channel_worker.run());

    // Clock tick thread, expires flash messages and toasts
    let tick_tx = ui_event_tx.clone();
    let tick_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            if tick_tx.send(UiEvent::Tick).await.is_err() {
                break;
            }
        }
    });

    info!("api {} | live {}", settings.api_url, settings.ws_url);
    let app = Arc::new(Mutex::new(App::new(settings, channel_client, feed_tx)));

    // Trigger leaderboard load on startup
    let _ = ui_event_tx.send(UiEvent::AppStarted).await;

    main_ui_loop(
        terminal,
        app,
        ui_event_rx,
        network_req_tx,
        network_resp_rx,
        channel_events,
        feed_rx,
    )
    .await;

    input_handler.abort();
    network_task.abort();
    channel_task.abort();
    tick_task.abort();

    Ok(())
}

/// Apply command-line flags over the environment. Returns `None` when the
/// invocation was fully handled (help, version).
fn handle_cli_args(mut settings: AppSettings) -> Option<AppSettings> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                println!("{}", usage_text());
                return None;
            }
            "-V" | "--version" => {
                println!("standings-tui {}", env!("CARGO_PKG_VERSION"));
                return None;
            }
            flag => {
                if let Err(msg) = settings.apply_flag(flag, args.next()) {
                    eprintln!("{msg}\n\n{}", usage_text());
                    std::process::exit(2);
                }
            }
        }
    }
    Some(settings)
}

fn usage_text() -> &'static str {
    "standings-tui - live esports tournament leaderboard

Usage:
  standings-tui [--tournament ID] [--stage ID[,ID...]] [--api URL] [--ws URL] [--export-dir DIR]
  standings-tui --help
  standings-tui --version

Environment:
  STANDINGS_API_URL      REST base URL (default http://127.0.0.1:4000/api)
  STANDINGS_WS_URL       Realtime WebSocket URL (default ws://127.0.0.1:4000/realtime)
  STANDINGS_TOKEN        Bearer token for REST and realtime
  STANDINGS_TOURNAMENT   Tournament id for the overall scope
  STANDINGS_STAGES       Comma-separated stage ids
  STANDINGS_EXPORT_DIR   Where stage exports are written (default .)
  STANDINGS_TIMEOUT      REST request timeout in seconds (default 10)
  STANDINGS_LOG          Log level: error, warn, info, debug, trace"
}

async fn main_ui_loop(
    mut terminal: Terminal<CrosstermBackend<Stdout>>,
    app: Arc<Mutex<App>>,
    mut ui_events: mpsc::Receiver<UiEvent>,
    network_requests: mpsc::Sender<NetworkRequest>,
    mut network_responses: mpsc::Receiver<NetworkResponse>,
    mut channel_events: mpsc::Receiver<ChannelEvent>,
    mut feed_updates: mpsc::UnboundedReceiver<FeedUpdate>,
) {
    let mut loading = LoadingState::default();

    loop {
        let should_redraw = tokio::select! {
            Some(ui_event) = ui_events.recv() => {
                handle_ui_event(ui_event, &app, &network_requests).await
            }

            Some(response) = network_responses.recv() => {
                handle_network_response(response, &app, &network_requests, &mut loading).await
            }

            Some(event) = channel_events.recv() => {
                handle_channel_event(event, &app, &network_requests).await
            }

            Some(update) = feed_updates.recv() => {
                app.lock().await.on_feed_update(update)
            }

            else => break,
        };

        if should_redraw {
            let mut app_guard = app.lock().await;
            draw::draw(&mut terminal, &mut app_guard, loading);
        }
    }
}

async fn handle_ui_event(
    ui_event: UiEvent,
    app: &Arc<Mutex<App>>,
    network_requests: &mpsc::Sender<NetworkRequest>,
) -> bool {
    match ui_event {
        UiEvent::AppStarted => {
            let scope = app.lock().await.activate_selected_scope();
            if let Some(scope) = scope {
                let _ = network_requests.send(NetworkRequest::LoadLeaderboard { scope }).await;
            }
            true
        }
        UiEvent::KeyPressed(key_event) => {
            keys::handle_key_bindings(key_event, app, network_requests).await;
            true
        }
        UiEvent::Resize => true,
        UiEvent::Tick => {
            // Redraw every tick so toasts age out on time.
            app.lock().await.state.expire_flash(Local::now());
            true
        }
    }
}

async fn handle_channel_event(
    event: ChannelEvent,
    app: &Arc<Mutex<App>>,
    network_requests: &mpsc::Sender<NetworkRequest>,
) -> bool {
    let mut guard = app.lock().await;
    match event {
        ChannelEvent::Connected => {
            let refetch = guard.on_channel_connected();
            drop(guard);
            if let Some(scope) = refetch {
                let _ = network_requests.send(NetworkRequest::LoadLeaderboard { scope }).await;
            }
        }
        ChannelEvent::Disconnected => guard.on_channel_disconnected(),
        ChannelEvent::Message(frame) => {
            guard.dispatch_channel_frame(frame);
            return false;
        }
        ChannelEvent::Error(message) => guard.on_channel_error(message),
        ChannelEvent::GaveUp { attempts } => guard.on_channel_gave_up(attempts),
    }
    true
}

async fn handle_network_response(
    response: NetworkResponse,
    app: &Arc<Mutex<App>>,
    network_requests: &mpsc::Sender<NetworkRequest>,
    loading: &mut LoadingState,
) -> bool {
    match response {
        NetworkResponse::LoadingStateChanged { loading_state } => {
            *loading = loading_state;
            return true;
        }
        NetworkResponse::LeaderboardLoaded { scope, entries } => {
            app.lock().await.on_leaderboard_loaded(scope, entries);
        }
        NetworkResponse::Recalculated { stage_id } => {
            let refetch = app.lock().await.on_recalculated(stage_id);
            if let Some(scope) = refetch {
                let _ = network_requests.send(NetworkRequest::LoadLeaderboard { scope }).await;
            }
        }
        NetworkResponse::Exported { stage_id, path } => {
            info!("stage {stage_id} export saved");
            app.lock().await.on_exported(&path);
        }
        NetworkResponse::Error { message } => {
            error!("Network error: {message}");
            app.lock().await.on_error(message);
        }
    }
    !loading.is_loading
}

async fn input_handler_task(ui_events: mpsc::Sender<UiEvent>) {
    loop {
        if let Ok(event) = crossterm_event::read() {
            let ui_event = match event {
                Event::Key(key_event) => Some(UiEvent::KeyPressed(key_event)),
                Event::Resize(_, _) => Some(UiEvent::Resize),
                _ => None,
            };

            if let Some(ui_event) = ui_event
                && ui_events.send(ui_event).await.is_err()
            {
                break;
            }
        }
    }
}

fn setup_terminal() {
    let mut stdout = io::stdout();
    execute!(stdout, cursor::Hide).unwrap();
    execute!(stdout, terminal::EnterAlternateScreen).unwrap();
    execute!(stdout, terminal::Clear(terminal::ClearType::All)).unwrap();
    terminal::enable_raw_mode().unwrap();
}

pub fn cleanup_terminal() {
    let mut stdout = io::stdout();
    execute!(stdout, cursor::MoveTo(0, 0)).unwrap();
    execute!(stdout, terminal::Clear(terminal::ClearType::All)).unwrap();
    execute!(stdout, terminal::LeaveAlternateScreen).unwrap();
    execute!(stdout, cursor::Show).unwrap();
    terminal::disable_raw_mode().unwrap();
}

fn setup_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        cleanup_terminal();
        better_panic::Settings::auto().create_panic_handler()(panic_info);
    }));
}

use crate::app::{App, MenuItem};
use crate::state::messages::NetworkRequest;
use crossterm::event::KeyCode::Char;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

pub async fn handle_key_bindings(
    key_event: KeyEvent,
    app: &Arc<Mutex<App>>,
    network_requests: &mpsc::Sender<NetworkRequest>,
) {
    let mut guard = app.lock().await;
    let mut request = None;

    match (guard.state.active_tab, key_event.code, key_event.modifiers) {
        // Quit
        (_, Char('q'), _) | (_, Char('c'), KeyModifiers::CONTROL) => {
            crate::cleanup_terminal();
            std::process::exit(0);
        }

        // Tab switching
        (_, Char('1'), _) => guard.update_tab(MenuItem::Leaderboard),
        (_, Char('2'), _) => guard.update_tab(MenuItem::Activity),
        (_, Char('?'), _) => guard.update_tab(MenuItem::Help),
        (MenuItem::Help, KeyCode::Esc, _) => guard.exit_help(),

        // Scope switching
        (_, Char('s') | KeyCode::Tab, _) => {
            request = guard.next_scope().map(|scope| NetworkRequest::LoadLeaderboard { scope });
        }
        (_, Char('S') | KeyCode::BackTab, _) => {
            request = guard.prev_scope().map(|scope| NetworkRequest::LoadLeaderboard { scope });
        }

        // Row navigation
        (MenuItem::Leaderboard, Char('j') | KeyCode::Down, _) => guard.row_down(),
        (MenuItem::Leaderboard, Char('k') | KeyCode::Up, _) => guard.row_up(),

        // Server actions
        (_, Char('r'), _) => {
            request = guard
                .manual_refresh()
                .map(|scope| NetworkRequest::LoadLeaderboard { scope });
        }
        (_, Char('c'), _) => {
            request = guard
                .recalculate_target()
                .map(|stage_id| NetworkRequest::Recalculate { stage_id });
        }
        (_, Char('e'), _) => {
            request = guard
                .export_target()
                .map(|stage_id| NetworkRequest::ExportStage { stage_id });
        }

        // Global
        (_, Char('f'), _) => guard.toggle_full_screen(),
        (_, Char('"'), _) => guard.toggle_show_logs(),

        _ => {}
    }

    drop(guard);
    if let Some(request) = request {
        let _ = network_requests.send(request).await;
    }
}

use crate::state::network::LoadingState;
use crossterm::event::KeyEvent;
use standings_api::standings::Snapshot;
use standings_api::{LeaderboardEntry, Scope};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub enum NetworkRequest {
    LoadLeaderboard { scope: Scope },
    Recalculate { stage_id: String },
    ExportStage { stage_id: String },
}

#[derive(Debug)]
pub enum NetworkResponse {
    LoadingStateChanged { loading_state: LoadingState },
    LeaderboardLoaded { scope: Scope, entries: Vec<LeaderboardEntry> },
    Recalculated { stage_id: String },
    Exported { stage_id: String, path: PathBuf },
    Error { message: String },
}

/// A pushed snapshot that passed a live subscription's scope filter.
#[derive(Debug, Clone)]
pub struct FeedUpdate {
    pub scope: Scope,
    pub snapshot: Snapshot,
}

#[derive(Debug, Clone)]
pub enum UiEvent {
    KeyPressed(KeyEvent),
    Resize,
    AppStarted,
    Tick,
}

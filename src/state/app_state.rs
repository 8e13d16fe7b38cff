use crate::app::MenuItem;
use crate::state::app_settings::AppSettings;
use chrono::{DateTime, Local};
use standings_api::standings::LeaderboardView;
use standings_api::{OVERALL, Scope, ScopeKind, Tone};
use std::time::Duration;

const STATUS_HISTORY: usize = 200;
const FLASH_TTL: Duration = Duration::from_secs(4);
pub const TOAST_TTL: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Scope selection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeOption {
    pub label: String,
    pub scope: Scope,
}

/// Scopes the user can cycle through: the tournament overall first, then
/// each configured stage.
#[derive(Debug, Default)]
pub struct ScopeList {
    pub options: Vec<ScopeOption>,
    pub selected: usize,
}

impl ScopeList {
    pub fn from_settings(settings: &AppSettings) -> Self {
        let mut options = Vec::new();
        if let Some(tournament) = &settings.tournament_id {
            options.push(ScopeOption {
                label: "Overall".to_string(),
                scope: Scope::resolve(OVERALL, ScopeKind::Tournament, tournament),
            });
        }
        for stage in &settings.stage_ids {
            let scope = Scope::stage(stage.as_str());
            if options.iter().any(|o| o.scope == scope) {
                continue;
            }
            options.push(ScopeOption { label: format!("Stage {stage}"), scope });
        }
        Self { options, selected: 0 }
    }

    pub fn current(&self) -> Option<&ScopeOption> {
        self.options.get(self.selected)
    }

    pub fn next(&mut self) -> bool {
        self.step(1)
    }

    pub fn prev(&mut self) -> bool {
        self.step(self.options.len().saturating_sub(1))
    }

    fn step(&mut self, by: usize) -> bool {
        if self.options.len() < 2 {
            return false;
        }
        self.selected = (self.selected + by) % self.options.len();
        true
    }
}

// ---------------------------------------------------------------------------
// Leaderboard state
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct LeaderboardState {
    /// Scope whose rows `view` holds.
    pub scope: Option<Scope>,
    pub view: LeaderboardView,
    pub selected_row: usize,
    /// Set once the first fetch for `scope` has landed.
    pub loaded: bool,
    pub updated_at: Option<DateTime<Local>>,
}

impl LeaderboardState {
    /// Point at a new scope and drop the old one's rows and notices.
    pub fn reset(&mut self, scope: Scope) {
        self.scope = Some(scope);
        self.view.clear();
        self.selected_row = 0;
        self.loaded = false;
        self.updated_at = None;
    }

    pub fn is_showing(&self, scope: &Scope) -> bool {
        self.scope.as_ref() == Some(scope)
    }

    pub fn select_next(&mut self) {
        if self.selected_row + 1 < self.view.entries.len() {
            self.selected_row += 1;
        }
    }

    pub fn select_prev(&mut self) {
        self.selected_row = self.selected_row.saturating_sub(1);
    }

    pub fn clamp_selection(&mut self) {
        let len = self.view.entries.len();
        if self.selected_row >= len {
            self.selected_row = len.saturating_sub(1);
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Some(Local::now());
    }
}

// ---------------------------------------------------------------------------
// Connection state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StatusLine {
    pub body: String,
    pub timestamp: String,
}

#[derive(Debug, Default)]
pub struct ConnectionState {
    pub endpoint: String,
    pub connected: bool,
    pub gave_up: bool,
    pub history: Vec<StatusLine>,
}

impl ConnectionState {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let mut state = Self { endpoint: endpoint.into(), ..Self::default() };
        state.push("Connecting to live updates...");
        state
    }

    pub fn push(&mut self, body: impl Into<String>) {
        let body = body.into();
        if self.history.last().is_some_and(|last| last.body == body) {
            return;
        }
        self.history.push(StatusLine {
            body,
            timestamp: Local::now().format("%H:%M:%S").to_string(),
        });
        if self.history.len() > STATUS_HISTORY {
            let remove_count = self.history.len() - STATUS_HISTORY;
            self.history.drain(0..remove_count);
        }
    }
}

// ---------------------------------------------------------------------------
// Transient messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Flash {
    pub message: String,
    pub tone: Tone,
    pub at: DateTime<Local>,
}

impl Flash {
    pub fn new(message: impl Into<String>, tone: Tone) -> Self {
        Self { message: message.into(), tone, at: Local::now() }
    }

    pub fn is_fresh(&self, now: DateTime<Local>) -> bool {
        is_recent(self.at, now, FLASH_TTL)
    }
}

pub fn is_recent(at: DateTime<Local>, now: DateTime<Local>, ttl: Duration) -> bool {
    (now - at).to_std().map(|age| age < ttl).unwrap_or(true)
}

// ---------------------------------------------------------------------------
// Root state
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct AppState {
    pub active_tab: MenuItem,
    pub previous_tab: MenuItem,
    pub show_logs: bool,
    pub last_error: Option<String>,
    pub scopes: ScopeList,
    pub leaderboard: LeaderboardState,
    pub connection: ConnectionState,
    pub flash: Option<Flash>,
}

impl AppState {
    pub fn new(settings: &AppSettings) -> Self {
        Self {
            scopes: ScopeList::from_settings(settings),
            connection: ConnectionState::new(settings.ws_url.clone()),
            ..Self::default()
        }
    }

    pub fn flash(&mut self, message: impl Into<String>, tone: Tone) {
        self.flash = Some(Flash::new(message, tone));
    }

    /// Drop an expired flash. Returns whether anything changed.
    pub fn expire_flash(&mut self, now: DateTime<Local>) -> bool {
        if self.flash.as_ref().is_some_and(|f| !f.is_fresh(now)) {
            self.flash = None;
            return true;
        }
        false
    }
}

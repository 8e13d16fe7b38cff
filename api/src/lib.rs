pub mod client;
pub mod standings;
pub mod wire;

use chrono::{DateTime, Local};
use std::fmt;

// ---------------------------------------------------------------------------
// Domain types, a clean model, independent of the platform's wire format
// ---------------------------------------------------------------------------

/// Reserved scope id for the tournament-wide leaderboard.
pub const OVERALL: &str = "overall";

/// One team's row in a standings snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaderboardEntry {
    /// Sole identity key across snapshots. `None` rows are shown but never matched.
    pub team_id: Option<String>,
    pub team_name: String,
    pub rank: u32,
    pub wins: u32,
    pub total_points: i64,
    pub total_kills: i64,
    pub placement_points: i64,
    /// Client-side rank change since the previous snapshot, positive = moved up.
    pub delta: i32,
}

impl LeaderboardEntry {
    pub fn moved_up(&self) -> bool {
        self.delta > 0
    }

    pub fn moved_down(&self) -> bool {
        self.delta < 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    #[default]
    Tournament,
    Stage,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Tournament => "tournament",
            ScopeKind::Stage => "stage",
        }
    }
}

/// Which leaderboard a view is displaying: tournament-wide or one stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Scope {
    pub id: String,
    pub kind: ScopeKind,
}

impl Scope {
    pub fn tournament(id: impl Into<String>) -> Self {
        Self { id: id.into(), kind: ScopeKind::Tournament }
    }

    pub fn stage(id: impl Into<String>) -> Self {
        Self { id: id.into(), kind: ScopeKind::Stage }
    }

    /// Map a displayed scope id to a concrete scope. The reserved id
    /// `"overall"` always means the tournament-wide board for `tournament_id`.
    pub fn resolve(scope_id: &str, kind: ScopeKind, tournament_id: &str) -> Self {
        if scope_id == OVERALL {
            return Self::tournament(tournament_id);
        }
        Self { id: scope_id.to_owned(), kind }
    }

    pub fn is_stage(&self) -> bool {
        self.kind == ScopeKind::Stage
    }

    /// Room key the server broadcasts this scope's updates to.
    pub fn room(&self) -> String {
        format!("{}:{}", self.kind.as_str(), self.id)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.as_str(), self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Positive,
    Negative,
}

/// Human-readable rank change, newest first in the notice log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankNotice {
    pub message: String,
    pub tone: Tone,
    pub at: DateTime<Local>,
}

/// Opaque binary export of a stage leaderboard.
#[derive(Debug, Clone, Default)]
pub struct ExportArtifact {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    /// From the `Content-Disposition` header, if the server named the file.
    pub file_name: Option<String>,
}

use crate::wire::{decode_entries, pushed_standings};
use crate::{LeaderboardEntry, RankNotice, Tone};
use chrono::Local;
use log::debug;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};

/// Number of rank-change notices kept for display.
pub const NOTICE_CAPACITY: usize = 6;

/// A pushed standings payload after envelope extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Snapshot {
    Entries(Vec<LeaderboardEntry>),
    /// The payload carried no recognizable standings array.
    Malformed,
}

impl Snapshot {
    pub fn from_payload(payload: &Value) -> Self {
        match pushed_standings(payload) {
            Some(items) => Snapshot::Entries(decode_entries(items)),
            None => Snapshot::Malformed,
        }
    }
}

/// Output of one merge: the next standings plus the notices it produced,
/// in the order the teams appear in the incoming snapshot.
#[derive(Debug, Clone, Default)]
pub struct Merged {
    pub entries: Vec<LeaderboardEntry>,
    pub notices: Vec<RankNotice>,
}

/// Diff `incoming` against the immediately preceding standings by team id.
///
/// `delta = previous rank - incoming rank`, so a team climbing from 3rd to
/// 1st gets `+2`. Teams with no previous row, and rows with no team id,
/// get `0` and never produce a notice.
pub fn merge(previous: &[LeaderboardEntry], incoming: Vec<LeaderboardEntry>) -> Merged {
    let previous_ranks: HashMap<&str, u32> = previous
        .iter()
        .filter_map(|e| e.team_id.as_deref().map(|id| (id, e.rank)))
        .collect();

    let mut notices = Vec::new();
    let entries = incoming
        .into_iter()
        .map(|mut entry| {
            entry.delta = entry
                .team_id
                .as_deref()
                .and_then(|id| previous_ranks.get(id))
                .map(|&old| rank_delta(old, entry.rank))
                .unwrap_or(0);
            if entry.delta != 0 {
                notices.push(rank_notice(&entry));
            }
            entry
        })
        .collect();

    Merged { entries, notices }
}

fn rank_delta(old: u32, new: u32) -> i32 {
    let d = i64::from(old) - i64::from(new);
    d.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

fn rank_notice(entry: &LeaderboardEntry) -> RankNotice {
    let direction = if entry.delta > 0 { "UP" } else { "DOWN" };
    let steps = entry.delta.unsigned_abs();
    let unit = if steps == 1 { "rank" } else { "ranks" };
    RankNotice {
        message: format!("{} moved {direction} by {steps} {unit}", entry.team_name),
        tone: if entry.delta > 0 { Tone::Positive } else { Tone::Negative },
        at: Local::now(),
    }
}

// ---------------------------------------------------------------------------
// Notice log
// ---------------------------------------------------------------------------

/// Most-recent-first log of rank changes, capped at [`NOTICE_CAPACITY`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoticeLog {
    items: VecDeque<RankNotice>,
}

impl NoticeLog {
    pub fn push(&mut self, notice: RankNotice) {
        self.items.push_front(notice);
        self.items.truncate(NOTICE_CAPACITY);
    }

    pub fn iter(&self) -> impl Iterator<Item = &RankNotice> {
        self.items.iter()
    }

    pub fn latest(&self) -> Option<&RankNotice> {
        self.items.front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

// ---------------------------------------------------------------------------
// View state
// ---------------------------------------------------------------------------

/// Standings currently on screen for one scope, plus the change log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaderboardView {
    pub entries: Vec<LeaderboardEntry>,
    pub notices: NoticeLog,
}

impl LeaderboardView {
    /// Install a fetched snapshot as the new baseline. Deltas are not computed.
    pub fn replace(&mut self, mut entries: Vec<LeaderboardEntry>) {
        for e in &mut entries {
            e.delta = 0;
        }
        self.entries = entries;
    }

    /// Merge a pushed snapshot. A malformed snapshot is discarded and the
    /// view is left untouched; returns whether the view changed.
    pub fn apply(&mut self, snapshot: Snapshot) -> bool {
        let Snapshot::Entries(incoming) = snapshot else {
            debug!("discarding malformed leaderboard push");
            return false;
        };
        let merged = merge(&self.entries, incoming);
        self.entries = merged.entries;
        for notice in merged.notices {
            self.notices.push(notice);
        }
        true
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.notices.clear();
    }
}

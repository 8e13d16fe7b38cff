use crate::state::app_settings::AppSettings;
use crate::state::app_state::AppState;
use crate::state::channel::{ChannelClient, Frame};
use crate::state::feed::{FeedSubscription, LeaderboardFeed};
use crate::state::messages::FeedUpdate;
use log::{debug, info, warn};
use standings_api::{LeaderboardEntry, Scope, Tone};
use std::path::Path;
use tokio::sync::mpsc;

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub enum MenuItem {
    #[default]
    Leaderboard,
    Activity,
    Help,
}

pub struct App {
    pub settings: AppSettings,
    pub state: AppState,
    channel: ChannelClient,
    feed: LeaderboardFeed,
    subscription: Option<FeedSubscription>,
    updates: mpsc::UnboundedSender<FeedUpdate>,
}

impl App {
    pub fn new(
        settings: AppSettings,
        channel: ChannelClient,
        updates: mpsc::UnboundedSender<FeedUpdate>,
    ) -> Self {
        Self {
            state: AppState::new(&settings),
            settings,
            channel,
            feed: LeaderboardFeed::default(),
            subscription: None,
            updates,
        }
    }

    pub fn current_scope(&self) -> Option<Scope> {
        self.state.scopes.current().map(|o| o.scope.clone())
    }

    // -----------------------------------------------------------------------
    // Scope switching
    // -----------------------------------------------------------------------

    /// Move the live subscription to the selected scope and clear the view.
    /// Returns the scope that now needs an initial fetch.
    pub fn activate_selected_scope(&mut self) -> Option<Scope> {
        let scope = self.current_scope()?;
        if self.subscription.as_ref().is_some_and(|s| s.scope() == &scope) {
            return Some(scope);
        }

        if let Some(old) = self.subscription.take() {
            self.feed.unsubscribe(&mut self.channel, &old);
        }
        self.state.leaderboard.reset(scope.clone());

        let updates = self.updates.clone();
        let target = scope.clone();
        let subscription = self.feed.subscribe(&mut self.channel, scope.clone(), move |snapshot| {
            let _ = updates.send(FeedUpdate { scope: target.clone(), snapshot });
        });
        self.subscription = Some(subscription);
        info!("now showing {scope}");
        Some(scope)
    }

    pub fn next_scope(&mut self) -> Option<Scope> {
        if !self.state.scopes.next() {
            return None;
        }
        self.activate_selected_scope()
    }

    pub fn prev_scope(&mut self) -> Option<Scope> {
        if !self.state.scopes.prev() {
            return None;
        }
        self.activate_selected_scope()
    }

    // -----------------------------------------------------------------------
    // Network responses, called from main_ui_loop
    // -----------------------------------------------------------------------

    /// Install a fetched snapshot. Results for a scope the user already left
    /// are dropped.
    pub fn on_leaderboard_loaded(&mut self, scope: Scope, entries: Vec<LeaderboardEntry>) -> bool {
        if !self.state.leaderboard.is_showing(&scope) {
            debug!("ignoring stale {scope} leaderboard");
            return false;
        }
        self.state.last_error = None;
        let lb = &mut self.state.leaderboard;
        lb.view.replace(entries);
        lb.loaded = true;
        lb.touch();
        lb.clamp_selection();
        true
    }

    pub fn on_recalculated(&mut self, stage_id: String) -> Option<Scope> {
        self.state.flash(format!("Stage {stage_id} recalculated"), Tone::Positive);
        let scope = Scope::stage(stage_id);
        self.state.leaderboard.is_showing(&scope).then_some(scope)
    }

    pub fn on_exported(&mut self, path: &Path) {
        self.state.flash(format!("Exported to {}", path.display()), Tone::Positive);
    }

    pub fn on_error(&mut self, message: String) {
        self.state.flash(message.clone(), Tone::Negative);
        self.state.last_error = Some(message);
    }

    // -----------------------------------------------------------------------
    // Realtime channel
    // -----------------------------------------------------------------------

    pub fn dispatch_channel_frame(&mut self, frame: Frame) {
        self.channel.dispatch(&frame);
    }

    /// Merge a pushed snapshot that passed the feed filter.
    pub fn on_feed_update(&mut self, update: FeedUpdate) -> bool {
        if !self.state.leaderboard.is_showing(&update.scope) {
            return false;
        }
        let lb = &mut self.state.leaderboard;
        if !lb.view.apply(update.snapshot) {
            return false;
        }
        lb.touch();
        lb.clamp_selection();
        true
    }

    /// Rooms do not survive a reconnect; re-join them and return the scope
    /// to re-fetch, since pushes may have been missed while offline. Before
    /// the first fetch lands there is nothing stale, and that fetch is still
    /// pending, so nothing is returned.
    pub fn on_channel_connected(&mut self) -> Option<Scope> {
        let conn = &mut self.state.connection;
        conn.connected = true;
        conn.gave_up = false;
        let endpoint = conn.endpoint.clone();
        conn.push(format!("Connected to {endpoint}"));
        self.feed.rejoin(&self.channel);
        let lb = &self.state.leaderboard;
        if !lb.loaded {
            return None;
        }
        lb.scope.clone()
    }

    pub fn on_channel_disconnected(&mut self) {
        let conn = &mut self.state.connection;
        if conn.connected {
            conn.push("Live updates lost, reconnecting...");
        }
        conn.connected = false;
    }

    pub fn on_channel_error(&mut self, message: String) {
        self.state.connection.push(format!("Channel error: {message}"));
    }

    pub fn on_channel_gave_up(&mut self, attempts: u32) {
        warn!("live updates offline after {attempts} attempts");
        let conn = &mut self.state.connection;
        conn.connected = false;
        conn.gave_up = true;
        conn.push(format!("Gave up after {attempts} attempts. Press r to retry."));
        self.state.flash("Live updates offline. Press r to retry.", Tone::Negative);
    }

    // -----------------------------------------------------------------------
    // User actions
    // -----------------------------------------------------------------------

    /// Returns the scope to re-fetch. Also re-arms a channel that gave up.
    pub fn manual_refresh(&mut self) -> Option<Scope> {
        if self.state.connection.gave_up {
            self.state.connection.gave_up = false;
            self.state.connection.push("Reconnecting...");
            self.channel.reconnect();
        }
        self.state.leaderboard.scope.clone()
    }

    pub fn recalculate_target(&mut self) -> Option<String> {
        self.selected_stage("recalculate")
    }

    pub fn export_target(&mut self) -> Option<String> {
        self.selected_stage("export")
    }

    fn selected_stage(&mut self, action: &str) -> Option<String> {
        match self.state.leaderboard.scope.as_ref() {
            Some(scope) if scope.is_stage() => Some(scope.id.clone()),
            _ => {
                self.state.flash(format!("Select a stage to {action}"), Tone::Negative);
                None
            }
        }
    }

    // -----------------------------------------------------------------------
    // Tab management
    // -----------------------------------------------------------------------

    pub fn update_tab(&mut self, next: MenuItem) {
        if self.state.active_tab == next {
            return;
        }
        self.state.previous_tab = self.state.active_tab;
        self.state.active_tab = next;
    }

    pub fn exit_help(&mut self) {
        if self.state.active_tab == MenuItem::Help {
            self.state.active_tab = self.state.previous_tab;
        }
    }

    pub fn toggle_show_logs(&mut self) {
        self.state.show_logs = !self.state.show_logs;
    }

    pub fn toggle_full_screen(&mut self) {
        self.settings.full_screen = !self.settings.full_screen;
    }

    pub fn row_down(&mut self) {
        self.state.leaderboard.select_next();
    }

    pub fn row_up(&mut self) {
        self.state.leaderboard.select_prev();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::channel::{ChannelCommand, loopback};
    use serde_json::json;
    use standings_api::standings::Snapshot;
    use tokio::sync::watch;

    struct Harness {
        app: App,
        commands: mpsc::Receiver<ChannelCommand>,
        online: watch::Sender<bool>,
        updates: mpsc::UnboundedReceiver<FeedUpdate>,
    }

    fn harness(stages: &[&str]) -> Harness {
        let (channel, commands, online) = loopback();
        let (tx, updates) = mpsc::unbounded_channel();
        let settings = AppSettings {
            tournament_id: Some("t1".into()),
            stage_ids: stages.iter().map(|s| s.to_string()).collect(),
            ..AppSettings::default()
        };
        Harness { app: App::new(settings, channel, tx), commands, online, updates }
    }

    fn entry(id: &str, rank: u32) -> LeaderboardEntry {
        LeaderboardEntry {
            team_id: Some(id.into()),
            team_name: id.to_uppercase(),
            rank,
            ..LeaderboardEntry::default()
        }
    }

    fn push(data: serde_json::Value) -> Frame {
        Frame { event: "leaderboard:update".into(), data }
    }

    fn drain(commands: &mut mpsc::Receiver<ChannelCommand>) -> Vec<ChannelCommand> {
        let mut out = Vec::new();
        while let Ok(cmd) = commands.try_recv() {
            out.push(cmd);
        }
        out
    }

    #[test]
    fn fetch_then_push_produces_deltas_and_notices() {
        let mut h = harness(&["s1"]);
        h.online.send_replace(true);
        h.app.next_scope();
        let scope = Scope::stage("s1");

        assert!(h.app.on_leaderboard_loaded(scope.clone(), vec![entry("a", 1), entry("b", 2)]));

        h.app.dispatch_channel_frame(push(json!({
            "stageId": "s1",
            "leaderboard": [
                {"teamId": "b", "teamName": "B", "rank": 1},
                {"teamId": "a", "teamName": "A", "rank": 2},
            ]
        })));
        let update = h.updates.try_recv().expect("filtered push is forwarded");
        assert!(h.app.on_feed_update(update));

        let view = &h.app.state.leaderboard.view;
        assert_eq!(view.entries[0].team_id.as_deref(), Some("b"));
        assert_eq!(view.entries[0].delta, 1);
        assert_eq!(view.entries[1].delta, -1);
        assert_eq!(view.notices.len(), 2);
    }

    #[test]
    fn pushes_for_other_stages_never_reach_the_view() {
        let mut h = harness(&["s1"]);
        h.app.next_scope();
        h.app.on_leaderboard_loaded(Scope::stage("s1"), vec![entry("a", 1)]);

        h.app.dispatch_channel_frame(push(json!({"stageId": "s2", "leaderboard": []})));
        assert!(h.updates.try_recv().is_err());
        assert_eq!(h.app.state.leaderboard.view.entries.len(), 1);
    }

    #[test]
    fn stale_fetches_and_updates_are_ignored() {
        let mut h = harness(&["s1"]);
        h.app.activate_selected_scope();
        h.app.next_scope();

        assert!(!h.app.on_leaderboard_loaded(Scope::tournament("t1"), vec![entry("a", 1)]));
        assert!(!h.app.on_feed_update(FeedUpdate {
            scope: Scope::tournament("t1"),
            snapshot: Snapshot::Entries(vec![entry("a", 1)]),
        }));
        assert!(h.app.state.leaderboard.view.entries.is_empty());
    }

    #[test]
    fn malformed_push_leaves_view_unchanged() {
        let mut h = harness(&[]);
        h.app.activate_selected_scope();
        h.app.on_leaderboard_loaded(Scope::tournament("t1"), vec![entry("a", 1)]);

        let changed = h.app.on_feed_update(FeedUpdate {
            scope: Scope::tournament("t1"),
            snapshot: Snapshot::Malformed,
        });
        assert!(!changed);
        assert_eq!(h.app.state.leaderboard.view.entries, vec![entry("a", 1)]);
    }

    #[test]
    fn switching_scope_clears_view_and_moves_rooms() {
        let mut h = harness(&["s1"]);
        h.online.send_replace(true);
        assert_eq!(h.app.activate_selected_scope(), Some(Scope::tournament("t1")));
        h.app.on_leaderboard_loaded(Scope::tournament("t1"), vec![entry("a", 1)]);
        drain(&mut h.commands);

        assert_eq!(h.app.next_scope(), Some(Scope::stage("s1")));
        assert!(h.app.state.leaderboard.view.entries.is_empty());
        assert!(!h.app.state.leaderboard.loaded);

        let events: Vec<String> = drain(&mut h.commands)
            .into_iter()
            .filter_map(|c| match c {
                ChannelCommand::Emit(f) => Some(f.event),
                ChannelCommand::Reconnect => None,
            })
            .collect();
        assert_eq!(events, vec!["leave:tournament", "join:stage"]);
    }

    #[test]
    fn reconnect_rejoins_and_refetches_current_scope() {
        let mut h = harness(&["s1"]);
        h.app.next_scope();
        h.app.on_leaderboard_loaded(Scope::stage("s1"), vec![entry("a", 1)]);
        h.online.send_replace(true);
        drain(&mut h.commands);

        assert_eq!(h.app.on_channel_connected(), Some(Scope::stage("s1")));
        assert!(h.app.state.connection.connected);
        assert_eq!(drain(&mut h.commands).len(), 1);
    }

    #[test]
    fn first_connect_before_initial_fetch_does_not_refetch() {
        let mut h = harness(&[]);
        assert_eq!(h.app.activate_selected_scope(), Some(Scope::tournament("t1")));
        h.online.send_replace(true);
        drain(&mut h.commands);

        assert_eq!(h.app.on_channel_connected(), None);
        assert!(h.app.state.connection.connected);
        let joins: Vec<String> = drain(&mut h.commands)
            .into_iter()
            .filter_map(|c| match c {
                ChannelCommand::Emit(f) => Some(f.event),
                ChannelCommand::Reconnect => None,
            })
            .collect();
        assert_eq!(joins, vec!["join:tournament"]);

        h.app.on_leaderboard_loaded(Scope::tournament("t1"), vec![entry("a", 1)]);
        h.app.on_channel_disconnected();
        assert_eq!(h.app.on_channel_connected(), Some(Scope::tournament("t1")));
    }

    #[test]
    fn manual_refresh_rearms_channel_after_give_up() {
        let mut h = harness(&[]);
        h.app.activate_selected_scope();
        h.app.on_channel_gave_up(5);
        assert!(h.app.state.connection.gave_up);

        assert_eq!(h.app.manual_refresh(), Some(Scope::tournament("t1")));
        assert!(!h.app.state.connection.gave_up);
        assert!(matches!(drain(&mut h.commands).as_slice(), [ChannelCommand::Reconnect]));

        h.app.manual_refresh();
        assert!(drain(&mut h.commands).is_empty());
    }

    #[test]
    fn stage_actions_need_a_stage_scope() {
        let mut h = harness(&["s1"]);
        h.app.activate_selected_scope();
        assert_eq!(h.app.recalculate_target(), None);
        assert!(h.app.state.flash.is_some());

        h.app.next_scope();
        assert_eq!(h.app.export_target().as_deref(), Some("s1"));
        assert_eq!(h.app.on_recalculated("s1".into()), Some(Scope::stage("s1")));
        assert_eq!(h.app.on_recalculated("s2".into()), None);
    }

    #[test]
    fn help_returns_to_previous_tab() {
        let mut h = harness(&[]);
        h.app.update_tab(MenuItem::Activity);
        h.app.update_tab(MenuItem::Help);
        h.app.exit_help();
        assert_eq!(h.app.state.active_tab, MenuItem::Activity);
    }
}

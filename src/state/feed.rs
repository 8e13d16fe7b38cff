use crate::state::channel::{ChannelClient, ListenerId, RoomKind, ServerEvent};
use log::debug;
use serde_json::Value;
use standings_api::standings::Snapshot;
use standings_api::wire::{payload_stage_id, payload_tournament_id};
use standings_api::{Scope, ScopeKind};
use std::collections::HashSet;

/// Returned by [`LeaderboardFeed::subscribe`]; hand it back to unsubscribe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSubscription {
    scope: Scope,
    listener: ListenerId,
}

impl FeedSubscription {
    pub fn scope(&self) -> &Scope {
        &self.scope
    }
}

/// Maps leaderboard scopes onto channel rooms and filters pushed standings
/// down to the scope each subscriber is showing.
#[derive(Debug, Default)]
pub struct LeaderboardFeed {
    live: Vec<FeedSubscription>,
    /// Stage rooms joined on the current connection. The server has no stage
    /// leave, so these stay joined until the connection drops.
    stage_rooms: HashSet<String>,
}

impl LeaderboardFeed {
    pub fn subscribe<F>(
        &mut self,
        channel: &mut ChannelClient,
        scope: Scope,
        mut on_update: F,
    ) -> FeedSubscription
    where
        F: FnMut(Snapshot) + Send + 'static,
    {
        self.join(channel, &scope);

        let filter = scope.clone();
        let listener = channel.on(ServerEvent::LeaderboardUpdate, move |payload| {
            if payload_matches_scope(&filter, payload) {
                on_update(Snapshot::from_payload(payload));
            }
        });

        let subscription = FeedSubscription { scope, listener };
        self.live.push(subscription.clone());
        subscription
    }

    pub fn unsubscribe(&mut self, channel: &mut ChannelClient, subscription: &FeedSubscription) {
        let scope = &subscription.scope;
        match scope.kind {
            ScopeKind::Tournament => {
                channel.leave_room(RoomKind::Tournament, &scope.id);
            }
            ScopeKind::Stage => debug!("{} stays joined until reconnect", scope.room()),
        }
        channel.off(&ServerEvent::LeaderboardUpdate, subscription.listener);
        self.live.retain(|s| s.listener != subscription.listener);
    }

    /// Re-join the rooms of live subscriptions after the channel reconnects.
    /// Room membership does not survive a new connection.
    pub fn rejoin(&mut self, channel: &ChannelClient) {
        self.stage_rooms.clear();
        let scopes: Vec<Scope> = self.live.iter().map(|s| s.scope.clone()).collect();
        for scope in &scopes {
            self.join(channel, scope);
        }
    }

    #[cfg(test)]
    pub fn live_scopes(&self) -> impl Iterator<Item = &Scope> {
        self.live.iter().map(|s| &s.scope)
    }

    fn join(&mut self, channel: &ChannelClient, scope: &Scope) {
        match scope.kind {
            ScopeKind::Tournament => {
                channel.join_room(RoomKind::Tournament, &scope.id);
            }
            ScopeKind::Stage => {
                if self.stage_rooms.contains(&scope.id) {
                    debug!("{} already joined", scope.room());
                    return;
                }
                if channel.join_room(RoomKind::Stage, &scope.id) {
                    self.stage_rooms.insert(scope.id.clone());
                }
            }
        }
    }
}

/// Stage subscriptions take only payloads tagged with their `stageId`;
/// tournament subscriptions take only untagged (tournament-wide) payloads.
pub fn payload_matches_scope(scope: &Scope, payload: &Value) -> bool {
    let stage_id = payload_stage_id(payload);
    match scope.kind {
        ScopeKind::Stage => stage_id.as_deref() == Some(scope.id.as_str()),
        ScopeKind::Tournament => {
            stage_id.is_none() && payload_tournament_id(payload).is_none_or(|t| t == scope.id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::channel::{ChannelCommand, Frame, loopback};
    use serde_json::json;
    use standings_api::OVERALL;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    fn update(data: Value) -> Frame {
        Frame { event: "leaderboard:update".into(), data }
    }

    fn recorder() -> (Arc<Mutex<Vec<Snapshot>>>, impl FnMut(Snapshot) + Send + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |s: Snapshot| sink.lock().unwrap().push(s))
    }

    fn sent_events(commands: &mut mpsc::Receiver<ChannelCommand>) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(cmd) = commands.try_recv() {
            if let ChannelCommand::Emit(frame) = cmd {
                frames.push(frame);
            }
        }
        frames
    }

    #[test]
    fn overall_ignores_stage_tagged_pushes() {
        let (mut channel, _commands, online) = loopback();
        online.send_replace(true);
        let mut feed = LeaderboardFeed::default();
        let (seen, handler) = recorder();

        let scope = Scope::resolve(OVERALL, ScopeKind::Tournament, "t1");
        feed.subscribe(&mut channel, scope, handler);

        channel.dispatch(&update(json!({"stageId": "s1", "leaderboard": [{"teamId": "a"}]})));
        assert!(seen.lock().unwrap().is_empty());

        channel.dispatch(&update(json!([{"teamId": "a", "rank": 1}])));
        channel.dispatch(&update(json!({"leaderboard": [{"teamId": "a", "rank": 1}]})));
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn stage_subscription_accepts_its_stage_in_every_wrapping() {
        let payloads = [
            json!({"stageId": "s1", "leaderboard": [{"teamId": "a", "rank": 1}]}),
            json!({"stageId": "s1", "leaderboard": {"leaderboard": [{"teamId": "a", "rank": 1}]}}),
        ];
        for payload in payloads {
            let (mut channel, _commands, _online) = loopback();
            let mut feed = LeaderboardFeed::default();
            let (seen, handler) = recorder();
            feed.subscribe(&mut channel, Scope::stage("s1"), handler);

            channel.dispatch(&update(payload.clone()));

            let seen = seen.lock().unwrap();
            assert_eq!(seen.len(), 1, "payload {payload}");
            let Snapshot::Entries(rows) = &seen[0] else { panic!("expected entries") };
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].team_id.as_deref(), Some("a"));
        }
    }

    #[test]
    fn stage_subscription_drops_other_stages_and_untagged_pushes() {
        let (mut channel, _commands, _online) = loopback();
        let mut feed = LeaderboardFeed::default();
        let (seen, handler) = recorder();
        feed.subscribe(&mut channel, Scope::stage("s1"), handler);

        channel.dispatch(&update(json!({"stageId": "s2", "leaderboard": []})));
        channel.dispatch(&update(json!([{"teamId": "a"}])));
        assert!(seen.lock().unwrap().is_empty());

        channel.dispatch(&update(json!({"stageId": 1, "leaderboard": []})));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn numeric_stage_ids_match_their_text_form() {
        let (mut channel, _commands, _online) = loopback();
        let mut feed = LeaderboardFeed::default();
        let (seen, handler) = recorder();
        feed.subscribe(&mut channel, Scope::stage("7"), handler);

        channel.dispatch(&update(json!({"stageId": 7, "leaderboard": []})));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn tournament_pushes_for_another_tournament_are_dropped() {
        let scope = Scope::tournament("t1");
        assert!(payload_matches_scope(&scope, &json!({"leaderboard": []})));
        assert!(payload_matches_scope(&scope, &json!({"tournamentId": "t1", "leaderboard": []})));
        assert!(!payload_matches_scope(&scope, &json!({"tournamentId": "t2", "leaderboard": []})));
    }

    #[test]
    fn matching_push_without_standings_is_delivered_as_malformed() {
        let (mut channel, _commands, _online) = loopback();
        let mut feed = LeaderboardFeed::default();
        let (seen, handler) = recorder();
        feed.subscribe(&mut channel, Scope::stage("s1"), handler);

        channel.dispatch(&update(json!({"stageId": "s1", "leaderboard": "soon"})));
        assert_eq!(seen.lock().unwrap().as_slice(), &[Snapshot::Malformed]);
    }

    #[test]
    fn subscribe_joins_scope_room() {
        let (mut channel, mut commands, online) = loopback();
        online.send_replace(true);
        let mut feed = LeaderboardFeed::default();

        feed.subscribe(&mut channel, Scope::tournament("t1"), |_| {});
        feed.subscribe(&mut channel, Scope::stage("s1"), |_| {});

        let frames = sent_events(&mut commands);
        assert_eq!(
            frames,
            vec![
                Frame { event: "join:tournament".into(), data: json!("t1") },
                Frame { event: "join:stage".into(), data: json!("s1") },
            ]
        );
    }

    #[test]
    fn unsubscribe_leaves_tournament_rooms_only() {
        let (mut channel, mut commands, online) = loopback();
        online.send_replace(true);
        let mut feed = LeaderboardFeed::default();
        let (seen, handler) = recorder();

        let overall = feed.subscribe(&mut channel, Scope::tournament("t1"), |_| {});
        let stage = feed.subscribe(&mut channel, Scope::stage("s1"), handler);
        sent_events(&mut commands);

        feed.unsubscribe(&mut channel, &overall);
        feed.unsubscribe(&mut channel, &stage);

        let frames = sent_events(&mut commands);
        assert_eq!(frames, vec![Frame { event: "leave:tournament".into(), data: json!("t1") }]);
        assert_eq!(channel.listener_count(&ServerEvent::LeaderboardUpdate), 0);

        channel.dispatch(&update(json!({"stageId": "s1", "leaderboard": []})));
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(feed.live_scopes().count(), 0);
    }

    #[test]
    fn resubscribing_a_stage_does_not_join_twice() {
        let (mut channel, mut commands, online) = loopback();
        online.send_replace(true);
        let mut feed = LeaderboardFeed::default();

        let first = feed.subscribe(&mut channel, Scope::stage("s1"), |_| {});
        feed.unsubscribe(&mut channel, &first);
        feed.subscribe(&mut channel, Scope::stage("s1"), |_| {});

        let joins = sent_events(&mut commands)
            .into_iter()
            .filter(|f| f.event == "join:stage")
            .count();
        assert_eq!(joins, 1);
    }

    #[test]
    fn rejoin_restores_only_live_rooms() {
        let (mut channel, mut commands, online) = loopback();
        let mut feed = LeaderboardFeed::default();

        online.send_replace(true);
        let old = feed.subscribe(&mut channel, Scope::stage("s1"), |_| {});
        feed.unsubscribe(&mut channel, &old);
        feed.subscribe(&mut channel, Scope::stage("s2"), |_| {});
        sent_events(&mut commands);

        feed.rejoin(&channel);
        let frames = sent_events(&mut commands);
        assert_eq!(frames, vec![Frame { event: "join:stage".into(), data: json!("s2") }]);
    }

    #[test]
    fn offline_subscribe_joins_on_rejoin() {
        let (mut channel, mut commands, online) = loopback();
        let mut feed = LeaderboardFeed::default();

        feed.subscribe(&mut channel, Scope::stage("s1"), |_| {});
        assert!(sent_events(&mut commands).is_empty());

        online.send_replace(true);
        feed.rejoin(&channel);
        assert_eq!(sent_events(&mut commands).len(), 1);
    }
}

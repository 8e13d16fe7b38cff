/// Platform wire shapes: serde types and envelope probing for leaderboard
/// responses and pushed updates. These map to the clean domain types in lib.rs.
use crate::LeaderboardEntry;
use log::warn;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Standings rows
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WireEntry {
    #[serde(default, deserialize_with = "lenient_id")]
    pub team_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub team_name: Option<String>,
    /// Populated team document; only its `name` is used.
    pub team: Option<Value>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub rank: Option<i64>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub wins: Option<i64>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub total_points: Option<i64>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub total_kills: Option<i64>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub placement_points: Option<i64>,
}

impl From<WireEntry> for LeaderboardEntry {
    fn from(w: WireEntry) -> Self {
        let team_name = w
            .team_name
            .filter(|n| !n.is_empty())
            .or_else(|| {
                w.team
                    .as_ref()
                    .and_then(|t| t.get("name"))
                    .and_then(Value::as_str)
                    .filter(|n| !n.is_empty())
                    .map(str::to_owned)
            })
            .unwrap_or_else(|| "Unknown".to_owned());

        let total_points = w.total_points.unwrap_or_default();
        let total_kills = w.total_kills.unwrap_or_default();

        LeaderboardEntry {
            team_id: w.team_id,
            team_name,
            rank: to_u32(w.rank),
            wins: to_u32(w.wins),
            total_points,
            total_kills,
            placement_points: w.placement_points.unwrap_or(total_points - total_kills),
            delta: 0,
        }
    }
}

fn to_u32(v: Option<i64>) -> u32 {
    v.and_then(|n| u32::try_from(n).ok()).unwrap_or_default()
}

/// Decode raw standings rows. Rows that are not objects are skipped.
pub fn decode_entries(items: &[Value]) -> Vec<LeaderboardEntry> {
    items
        .iter()
        .filter_map(|item| {
            if !item.is_object() {
                warn!("skipping non-object leaderboard row: {item}");
                return None;
            }
            match WireEntry::deserialize(item) {
                Ok(w) => Some(LeaderboardEntry::from(w)),
                Err(e) => {
                    warn!("skipping undecodable leaderboard row: {e}");
                    None
                }
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

/// Standings array of a request/response body. Tried in order: bare array,
/// `{data: {leaderboard}}`, `{leaderboard}`, `{leaderboard: {leaderboard}}`.
pub fn response_standings(body: &Value) -> Option<&[Value]> {
    if let Some(items) = body.as_array() {
        return Some(items.as_slice());
    }
    if let Some(items) = body
        .get("data")
        .and_then(|d| d.get("leaderboard"))
        .and_then(Value::as_array)
    {
        return Some(items.as_slice());
    }
    leaderboard_field(body)
}

/// Standings array of a pushed `leaderboard:update` payload: bare array,
/// `{leaderboard}`, or `{leaderboard: {leaderboard}}`.
pub fn pushed_standings(payload: &Value) -> Option<&[Value]> {
    if let Some(items) = payload.as_array() {
        return Some(items.as_slice());
    }
    leaderboard_field(payload)
}

fn leaderboard_field(v: &Value) -> Option<&[Value]> {
    let lb = v.get("leaderboard")?;
    lb.as_array()
        .or_else(|| lb.get("leaderboard").and_then(Value::as_array))
        .map(Vec::as_slice)
}

/// `stageId` of a pushed payload. Present only on stage-scoped broadcasts.
pub fn payload_stage_id(payload: &Value) -> Option<String> {
    non_null_id(payload, "stageId")
}

pub fn payload_tournament_id(payload: &Value) -> Option<String> {
    non_null_id(payload, "tournamentId")
}

fn non_null_id(payload: &Value, key: &str) -> Option<String> {
    match payload.get(key)? {
        Value::Null => None,
        other => Some(id_text(other)),
    }
}

/// Ids arrive as strings or numbers; compare them as text.
pub fn id_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Lenient field decoders
// ---------------------------------------------------------------------------

fn lenient_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

fn lenient_int<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

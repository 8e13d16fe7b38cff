use log::LevelFilter;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_API_URL: &str = "http://127.0.0.1:4000/api";
const DEFAULT_WS_URL: &str = "ws://127.0.0.1:4000/realtime";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct AppSettings {
    pub full_screen: bool,
    pub log_level: Option<LevelFilter>,
    pub api_url: String,
    pub ws_url: String,
    pub token: Option<String>,
    pub tournament_id: Option<String>,
    pub stage_ids: Vec<String>,
    pub export_dir: PathBuf,
    pub http_timeout: Duration,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            full_screen: false,
            log_level: None,
            api_url: DEFAULT_API_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            token: None,
            tournament_id: None,
            stage_ids: Vec::new(),
            export_dir: PathBuf::from("."),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl AppSettings {
    pub fn load() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        Self {
            full_screen: false,
            log_level: get("STANDINGS_LOG").and_then(|l| LevelFilter::from_str(&l).ok()),
            api_url: get("STANDINGS_API_URL").unwrap_or(defaults.api_url),
            ws_url: get("STANDINGS_WS_URL").unwrap_or(defaults.ws_url),
            token: get("STANDINGS_TOKEN"),
            tournament_id: get("STANDINGS_TOURNAMENT"),
            stage_ids: get("STANDINGS_STAGES").map(|s| split_ids(&s)).unwrap_or_default(),
            export_dir: get("STANDINGS_EXPORT_DIR").map(PathBuf::from).unwrap_or(defaults.export_dir),
            http_timeout: get("STANDINGS_TIMEOUT")
                .and_then(|secs| secs.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.http_timeout),
        }
    }

    /// Apply one command-line flag. `value` is the argument that follows it.
    pub fn apply_flag(&mut self, flag: &str, value: Option<String>) -> Result<(), String> {
        let value = value.ok_or_else(|| format!("{flag} needs a value"))?;
        match flag {
            "-t" | "--tournament" => self.tournament_id = Some(value),
            "-s" | "--stage" => self.stage_ids.extend(split_ids(&value)),
            "--api" => self.api_url = value,
            "--ws" => self.ws_url = value,
            "--export-dir" => self.export_dir = PathBuf::from(value),
            _ => return Err(format!("Unknown argument: {flag}")),
        }
        Ok(())
    }
}

fn split_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

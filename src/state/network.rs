use crate::state::messages::{NetworkRequest, NetworkResponse};
use log::{debug, error, info};
use standings_api::client::{ApiError, LeaderboardApi};
use standings_api::{ExportArtifact, Scope};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

const SPINNER_CHARS: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];
pub const ERROR_CHAR: char = '!';

#[derive(Debug, Copy, Clone)]
pub struct LoadingState {
    pub is_loading: bool,
    pub spinner_char: char,
}

impl Default for LoadingState {
    fn default() -> Self {
        Self { is_loading: false, spinner_char: ' ' }
    }
}

/// Runs REST requests one at a time and reports results back to the UI loop.
pub struct NetworkWorker {
    client: LeaderboardApi,
    export_dir: PathBuf,
    requests: mpsc::Receiver<NetworkRequest>,
    responses: mpsc::Sender<NetworkResponse>,
    is_loading: Arc<AtomicBool>,
}

impl NetworkWorker {
    pub fn new(
        client: LeaderboardApi,
        export_dir: PathBuf,
        requests: mpsc::Receiver<NetworkRequest>,
        responses: mpsc::Sender<NetworkResponse>,
    ) -> Self {
        Self {
            client,
            export_dir,
            requests,
            responses,
            is_loading: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn run(mut self) {
        while let Some(request) = self.requests.recv().await {
            self.start_loading_animation().await;

            let result = match request {
                NetworkRequest::LoadLeaderboard { scope } => self.handle_load(scope).await,
                NetworkRequest::Recalculate { stage_id } => self.handle_recalculate(stage_id).await,
                NetworkRequest::ExportStage { stage_id } => self.handle_export(stage_id).await,
            };

            debug!("network request complete");
            self.stop_loading_animation(result.is_ok()).await;

            let response = result.unwrap_or_else(|err| NetworkResponse::Error {
                message: err.to_string(),
            });

            if let Err(e) = self.responses.send(response).await {
                error!("Failed to send network response: {e}");
                break;
            }
        }
    }

    async fn handle_load(&self, scope: Scope) -> Result<NetworkResponse, ApiError> {
        debug!("loading {scope} leaderboard");
        let entries = self.client.fetch(&scope).await?;
        debug!("{scope}: {} rows", entries.len());
        Ok(NetworkResponse::LeaderboardLoaded { scope, entries })
    }

    async fn handle_recalculate(&self, stage_id: String) -> Result<NetworkResponse, ApiError> {
        info!("recalculating stage {stage_id}");
        self.client.recalculate(&stage_id).await?;
        Ok(NetworkResponse::Recalculated { stage_id })
    }

    async fn handle_export(&self, stage_id: String) -> Result<NetworkResponse, ApiError> {
        let artifact = self.client.export_stage(&stage_id).await?;
        let file_name = artifact
            .file_name
            .clone()
            .unwrap_or_else(|| default_export_name(&stage_id, &artifact));
        let path = self.export_dir.join(file_name);

        tokio::fs::write(&path, &artifact.bytes)
            .await
            .map_err(|e| ApiError::Other(format!("writing {}: {e}", path.display())))?;
        info!("exported stage {stage_id} to {}", path.display());
        Ok(NetworkResponse::Exported { stage_id, path })
    }

    async fn start_loading_animation(&self) {
        self.is_loading.store(true, Ordering::Relaxed);

        let mut loading_state =
            LoadingState { is_loading: true, spinner_char: SPINNER_CHARS[0] };
        let _ = self
            .responses
            .send(NetworkResponse::LoadingStateChanged { loading_state })
            .await;

        let responses = self.responses.clone();
        let is_loading = self.is_loading.clone();

        tokio::spawn(async move {
            let mut spinner_index = 1;
            let mut interval = tokio::time::interval(Duration::from_millis(33));
            loop {
                interval.tick().await;
                if !is_loading.load(Ordering::Relaxed) {
                    break;
                }
                loading_state.spinner_char = SPINNER_CHARS[spinner_index];
                spinner_index = (spinner_index + 1) % SPINNER_CHARS.len();
                let _ = responses
                    .send(NetworkResponse::LoadingStateChanged { loading_state })
                    .await;
            }
        });
    }

    async fn stop_loading_animation(&self, is_ok: bool) {
        self.is_loading.store(false, Ordering::Relaxed);
        tokio::time::sleep(Duration::from_millis(15)).await;

        let spinner_char = if is_ok { ' ' } else { ERROR_CHAR };
        let _ = self
            .responses
            .send(NetworkResponse::LoadingStateChanged {
                loading_state: LoadingState { is_loading: false, spinner_char },
            })
            .await;
    }
}

/// File name for an export the server sent without a Content-Disposition name.
fn default_export_name(stage_id: &str, artifact: &ExportArtifact) -> String {
    let content_type = artifact.content_type.as_deref().unwrap_or_default();
    let ext = if content_type.contains("pdf") {
        "pdf"
    } else if content_type.contains("spreadsheetml") || content_type.contains("excel") {
        "xlsx"
    } else if content_type.contains("csv") {
        "csv"
    } else if content_type.contains("png") {
        "png"
    } else {
        "bin"
    };
    format!("stage-{stage_id}-leaderboard.{ext}")
}

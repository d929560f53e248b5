//! Local inference server checks. Used by callers deciding whether to fall
//! back to the mock model; the gateway itself never falls back.

use std::time::Duration;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

pub fn local_backend_installed() -> bool {
    which::which("ollama").is_ok()
}

/// Whether the server at `base` answers `GET /` with a success status.
pub async fn local_backend_running(base: &str) -> bool {
    let client = match reqwest::Client::builder().timeout(PROBE_TIMEOUT).build() {
        Ok(client) => client,
        Err(e) => {
            log::debug!("Probe client unavailable: {}", e);
            return false;
        }
    };

    let url = format!("{}/", base.trim_end_matches('/'));
    match client.get(&url).send().await {
        Ok(response) => response.status().is_success(),
        Err(e) => {
            log::debug!("Local backend at {} not reachable: {}", url, e);
            false
        }
    }
}

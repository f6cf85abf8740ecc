//! Best-effort local tunnel bootstrap.
//!
//! Starts a local ngrok process and asks its control API for a public HTTPS
//! URL to use as the webhook target. Every failure here (binary missing,
//! control API unreachable, no HTTPS tunnel) means "no URL available" — it
//! must never block or fail startup of the ingestion subsystem.

use std::process::Stdio;
use std::time::Duration;

const CONTROL_API_URL: &str = "http://127.0.0.1:4040/api/tunnels";

/// Fixed wait for the tunnel process to come up before querying its API.
const SETTLE_DELAY: Duration = Duration::from_secs(2);

const CONTROL_API_TIMEOUT: Duration = Duration::from_secs(5);

/// Obtain a public HTTPS URL forwarding to `local_port`, or `None`.
pub async fn public_https_url(enabled: bool, local_port: u16) -> Option<String> {
    if !enabled {
        return None;
    }
    match tokio::process::Command::new("ngrok")
        .arg("http")
        .arg(local_port.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        // The child is intentionally not killed on drop: the tunnel must
        // outlive this function for the webhook to keep working.
        Ok(_child) => {}
        Err(e) => {
            log::debug!("tunnel: failed to start ngrok: {}", e);
            return None;
        }
    }
    tokio::time::sleep(SETTLE_DELAY).await;

    let client = reqwest::Client::new();
    let tunnels: serde_json::Value = match client
        .get(CONTROL_API_URL)
        .timeout(CONTROL_API_TIMEOUT)
        .send()
        .await
        .and_then(|r| r.error_for_status())
    {
        Ok(res) => match res.json().await {
            Ok(v) => v,
            Err(e) => {
                log::debug!("tunnel: control api returned invalid JSON: {}", e);
                return None;
            }
        },
        Err(e) => {
            log::debug!("tunnel: control api unreachable: {}", e);
            return None;
        }
    };

    let url = first_https_url(&tunnels);
    if url.is_none() {
        log::debug!("tunnel: no https tunnel found");
    }
    url
}

/// First HTTPS public URL in an ngrok /api/tunnels payload.
fn first_https_url(tunnels: &serde_json::Value) -> Option<String> {
    tunnels
        .get("tunnels")?
        .as_array()?
        .iter()
        .filter_map(|t| t.get("public_url").and_then(|u| u.as_str()))
        .find(|u| u.starts_with("https://"))
        .map(str::to_string)
}

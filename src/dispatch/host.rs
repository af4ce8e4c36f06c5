//! Host-bound backends that are neither search nor fetch: geolocation and
//! image generation.
//!
//! Both are stateless request/response surfaces. Credential and endpoint
//! resolution belongs to the backend implementation, not the dispatcher.

use std::time::Duration;

use async_trait::async_trait;

/// Output of an image generation backend.
#[derive(Clone, Debug)]
pub struct GeneratedImage {
    pub description: String,
    pub base64: String,
    pub mime_type: String,
}

/// Pluggable image generation backend. Absent by default; the dispatcher
/// reports a plain error result when no backend is configured.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, String>;
}

/// Resolve the host's approximate location from its public IP.
///
/// Returns a human-readable line or an `Error: ...` string; never errors
/// hard.
pub async fn geolocate() -> String {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
    {
        Ok(c) => c,
        Err(e) => return format!("Error: geolocate failed to build client: {e}"),
    };

    let resp = match client
        .get("http://ip-api.com/json/?fields=status,message,country,regionName,city,lat,lon,timezone")
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => return format!("Error: geolocate: {e}"),
    };

    let body: serde_json::Value = match resp.json().await {
        Ok(v) => v,
        Err(e) => return format!("Error: geolocate failed to parse response: {e}"),
    };

    if body["status"].as_str() != Some("success") {
        return format!(
            "Error: geolocate: {}",
            body["message"].as_str().unwrap_or("lookup failed")
        );
    }

    format!(
        "{}, {}, {} (lat {}, lon {}, timezone {})",
        body["city"].as_str().unwrap_or("?"),
        body["regionName"].as_str().unwrap_or("?"),
        body["country"].as_str().unwrap_or("?"),
        body["lat"],
        body["lon"],
        body["timezone"].as_str().unwrap_or("?"),
    )
}

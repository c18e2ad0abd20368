use std::future::Future;

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::errors::{GateError, VerificationError};
use crate::models::{parse_expiry, ApiEnvelope, UnlockGrant, UnlockPayload, VerifyViewRequest};
use crate::services::api_client::ApiResponse;
use crate::services::ApiClient;

const VERIFY_VIEW_PATH: &str = "advertisements/verify-view";
const TOKEN_SUFFIX_LEN: usize = 9;

/// Exchanges a completed ad view for an unlock grant. One request per call,
/// never retried here.
pub trait ViewVerifier: Send + Sync {
    fn verify_view(
        &self,
        ad_id: &str,
        download_url: &str,
    ) -> impl Future<Output = Result<UnlockGrant, VerificationError>> + Send;
}

/// Per-attempt idempotency key: `<epoch-ms>_<random suffix>`.
pub fn new_download_token() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!(
        "{}_{}",
        chrono::Utc::now().timestamp_millis(),
        suffix.to_ascii_lowercase()
    )
}

#[derive(Clone)]
pub struct VerificationClient {
    api: ApiClient,
}

impl VerificationClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

impl ViewVerifier for VerificationClient {
    async fn verify_view(
        &self,
        ad_id: &str,
        download_url: &str,
    ) -> Result<UnlockGrant, VerificationError> {
        let ad_id = ad_id.trim();
        if ad_id.is_empty() {
            return Err(VerificationError::Rejected(
                "missing advertisement id".to_string(),
            ));
        }

        let request = VerifyViewRequest {
            ad_id: ad_id.to_string(),
            download_token: new_download_token(),
            download_url: download_url.to_string(),
        };
        tracing::info!(ad_id = %request.ad_id, "verifying advertisement view");

        let response = self
            .api
            .post(VERIFY_VIEW_PATH, &request)
            .await
            .map_err(|err| match err {
                GateError::Network(inner) => VerificationError::from_transport(&inner),
                other => VerificationError::Network(other.to_string()),
            })?;

        parse_verification(&response)
    }
}

pub fn parse_verification(response: &ApiResponse) -> Result<UnlockGrant, VerificationError> {
    if !response.is_success() {
        // A gateway page from a failing server says nothing about the ad.
        let has_envelope = response
            .json::<ApiEnvelope<serde_json::Value>>()
            .is_ok();
        if response.status.is_server_error() && !has_envelope {
            return Err(VerificationError::Network(format!(
                "server unavailable (HTTP {})",
                response.status.as_u16()
            )));
        }
        return Err(VerificationError::Rejected(response.error_message()));
    }

    let envelope: ApiEnvelope<UnlockPayload> = response
        .json()
        .map_err(|err| VerificationError::MalformedResponse(err.to_string()))?;

    match envelope.success {
        Some(true) => {}
        Some(false) => {
            return Err(VerificationError::Rejected(
                envelope
                    .message
                    .unwrap_or_else(|| "verification failed".to_string()),
            ))
        }
        None => {
            return Err(VerificationError::MalformedResponse(
                "missing success flag".to_string(),
            ))
        }
    }

    let payload = envelope
        .data
        .ok_or_else(|| VerificationError::MalformedResponse("missing data".to_string()))?;
    let unlock_token = payload
        .unlock_token
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .ok_or_else(|| VerificationError::MalformedResponse("missing unlockToken".to_string()))?;
    let expires_at = payload
        .expires_at
        .as_ref()
        .and_then(parse_expiry)
        .ok_or_else(|| VerificationError::MalformedResponse("invalid expiresAt".to_string()))?;

    Ok(UnlockGrant {
        unlock_token,
        expires_at,
    })
}

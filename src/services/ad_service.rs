use std::future::Future;

use reqwest::StatusCode;

use crate::errors::AdFetchError;
use crate::models::{AdPayload, Advertisement, ApiEnvelope};
use crate::services::ApiClient;

pub const DOWNLOAD_AD_TYPE: &str = "download";
pub const DOWNLOAD_AD_PLACEMENT: &str = "button_click";

/// Supplies the advertisement shown before a download unlocks.
/// `Ok(None)` means the backend had nothing to show.
pub trait AdSource: Send + Sync {
    fn fetch_download_ad(
        &self,
    ) -> impl Future<Output = Result<Option<Advertisement>, AdFetchError>> + Send;
}

#[derive(Clone)]
pub struct AdService {
    api: ApiClient,
}

impl AdService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

impl AdSource for AdService {
    async fn fetch_download_ad(&self) -> Result<Option<Advertisement>, AdFetchError> {
        let path = format!(
            "advertisements/random?type={}&placement={}",
            DOWNLOAD_AD_TYPE, DOWNLOAD_AD_PLACEMENT
        );
        let response = self
            .api
            .get(&path)
            .await
            .map_err(AdFetchError::from_transport)?;

        if response.status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.is_success() {
            return Err(AdFetchError::Backend(response.error_message()));
        }

        let envelope: ApiEnvelope<AdPayload> = response.json().map_err(|err| {
            AdFetchError::Backend(format!("unreadable advertisement response: {err}"))
        })?;
        if envelope.success != Some(true) {
            return Ok(None);
        }
        Ok(envelope.data.and_then(|payload| payload.advertisement))
    }
}

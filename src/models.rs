use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::ValidationError;

/// The single in-flight download waiting for an ad-gated unlock.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PendingDownload {
    pub url: String,
    pub app_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub timestamp: i64,
}

impl PendingDownload {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.app_name.trim().is_empty() {
            return Err(ValidationError::MissingName);
        }
        let url = self.url.trim();
        if url.is_empty() {
            return Err(ValidationError::MissingUrl);
        }
        reqwest::Url::parse(url).map_err(|err| ValidationError::InvalidUrl(err.to_string()))?;
        Ok(())
    }
}

/// App record as served by the catalog API; only the fields the download
/// button needs are kept.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct AppListing {
    #[serde(default, alias = "_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub download_links: Vec<DownloadLink>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum DownloadLink {
    Plain(String),
    Detailed {
        url: String,
        #[serde(default)]
        label: Option<String>,
    },
}

impl DownloadLink {
    pub fn url(&self) -> &str {
        match self {
            DownloadLink::Plain(url) => url,
            DownloadLink::Detailed { url, .. } => url,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Advertisement {
    #[serde(default, rename = "_id", alias = "id")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub placement: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub settings: AdSettings,
}

/// Ad display settings. Every field is kept as raw JSON because the admin
/// panel stores whatever was typed into the form.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct AdSettings {
    #[serde(default)]
    pub countdown: Option<serde_json::Value>,
    #[serde(default)]
    pub skippable: Option<serde_json::Value>,
    #[serde(default)]
    pub skip_after: Option<serde_json::Value>,
}

impl AdSettings {
    pub fn countdown_secs(&self) -> Option<u32> {
        self.countdown.as_ref().and_then(positive_secs)
    }

    pub fn skip_after_secs(&self) -> Option<u32> {
        self.skip_after.as_ref().and_then(positive_secs)
    }

    pub fn is_skippable(&self) -> bool {
        match self.skippable.as_ref() {
            Some(serde_json::Value::Bool(flag)) => *flag,
            Some(serde_json::Value::String(text)) => {
                matches!(text.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
            }
            Some(serde_json::Value::Number(number)) => number.as_u64() == Some(1),
            _ => false,
        }
    }
}

/// Null or a value of the wrong shape reads as the default instead of
/// failing the whole response.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + DeserializeOwned,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .and_then(|value| serde_json::from_value(value).ok())
        .unwrap_or_default())
}

/// Accepts a positive integer or a string holding one.
pub fn positive_secs(value: &serde_json::Value) -> Option<u32> {
    let secs = match value {
        serde_json::Value::Number(number) => number.as_u64(),
        serde_json::Value::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    }?;
    if secs == 0 {
        return None;
    }
    u32::try_from(secs).ok()
}

/// Proof that an ad view was verified. Authorizes one dispatch.
#[derive(Clone, PartialEq, Eq)]
pub struct UnlockGrant {
    pub unlock_token: String,
    pub expires_at: DateTime<Utc>,
}

impl UnlockGrant {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

impl fmt::Debug for UnlockGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnlockGrant")
            .field("unlock_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Parses `expiresAt` as either an RFC 3339 string or epoch milliseconds.
pub fn parse_expiry(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::Number(number) => number
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        serde_json::Value::String(text) => {
            let trimmed = text.trim();
            if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
                return Some(parsed.with_timezone(&Utc));
            }
            trimmed
                .parse::<i64>()
                .ok()
                .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
        }
        _ => None,
    }
}

/// Response envelope shared by every backend endpoint.
#[derive(Deserialize, Clone, Debug)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Deserialize, Clone, Debug, Default)]
pub struct AdPayload {
    #[serde(default)]
    pub advertisement: Option<Advertisement>,
}

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct UnlockPayload {
    #[serde(default)]
    pub unlock_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<serde_json::Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SessionRecord {
    pub id: String,
    pub started_at: i64,
    pub last_seen_at: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerifyViewRequest {
    pub ad_id: String,
    pub download_token: String,
    pub download_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn countdown_defaults_for_non_numeric_values() {
        let settings: AdSettings = serde_json::from_value(json!({ "countdown": "abc" })).unwrap();
        assert_eq!(settings.countdown_secs(), None);

        let settings: AdSettings = serde_json::from_value(json!({})).unwrap();
        assert_eq!(settings.countdown_secs(), None);

        let settings: AdSettings = serde_json::from_value(json!({ "countdown": 0 })).unwrap();
        assert_eq!(settings.countdown_secs(), None);

        let settings: AdSettings = serde_json::from_value(json!({ "countdown": -3 })).unwrap();
        assert_eq!(settings.countdown_secs(), None);
    }

    #[test]
    fn countdown_accepts_numbers_and_numeric_strings() {
        let settings: AdSettings = serde_json::from_value(json!({ "countdown": 5 })).unwrap();
        assert_eq!(settings.countdown_secs(), Some(5));

        let settings: AdSettings = serde_json::from_value(json!({ "countdown": " 12 " })).unwrap();
        assert_eq!(settings.countdown_secs(), Some(12));
    }

    #[test]
    fn pending_download_uses_camel_case_keys() {
        let pending = PendingDownload {
            url: "https://x.test/a.apk".to_string(),
            app_name: "Test App".to_string(),
            app_slug: Some("test-app".to_string()),
            app_id: None,
            size: None,
            version: Some("1.2".to_string()),
            timestamp: 1_700_000_000_000,
        };
        let value = serde_json::to_value(&pending).unwrap();
        assert_eq!(value["appName"], "Test App");
        assert_eq!(value["appSlug"], "test-app");
        assert!(value.get("appId").is_none());
    }

    #[test]
    fn validate_rejects_relative_urls_and_blank_names() {
        let mut pending = PendingDownload {
            url: "/files/a.apk".to_string(),
            app_name: "Test App".to_string(),
            app_slug: None,
            app_id: None,
            size: None,
            version: None,
            timestamp: 0,
        };
        assert!(matches!(pending.validate(), Err(ValidationError::InvalidUrl(_))));

        pending.url = "https://x.test/a.apk".to_string();
        pending.app_name = "  ".to_string();
        assert_eq!(pending.validate(), Err(ValidationError::MissingName));
    }

    #[test]
    fn expiry_parses_rfc3339_and_millis() {
        let from_text = parse_expiry(&json!("2030-01-01T00:00:00Z")).unwrap();
        let from_millis = parse_expiry(&json!(1_893_456_000_000_i64)).unwrap();
        assert_eq!(from_text, from_millis);
        assert_eq!(parse_expiry(&json!(true)), None);
        assert_eq!(parse_expiry(&json!("soon")), None);
    }

    #[test]
    fn download_links_accept_strings_and_objects() {
        let app: AppListing = serde_json::from_value(json!({
            "_id": "app-1",
            "name": "Test App",
            "downloadLinks": ["https://a.test/1.apk", { "url": "https://a.test/2.apk", "label": "Mirror" }]
        }))
        .unwrap();
        assert_eq!(app.id.as_deref(), Some("app-1"));
        assert_eq!(app.download_links[0].url(), "https://a.test/1.apk");
        assert_eq!(app.download_links[1].url(), "https://a.test/2.apk");
    }

    #[test]
    fn grant_debug_hides_token() {
        let grant = UnlockGrant {
            unlock_token: "secret-token".to_string(),
            expires_at: Utc::now(),
        };
        assert!(!format!("{grant:?}").contains("secret-token"));
    }

    #[test]
    fn ad_envelope_reads_with_null_or_odd_settings() {
        let envelope: ApiEnvelope<AdPayload> = serde_json::from_str(
            r#"{"success":true,"data":{"advertisement":{"_id":"ad1","settings":null}}}"#,
        )
        .unwrap();
        let ad = envelope.data.and_then(|payload| payload.advertisement).unwrap();
        assert_eq!(ad.id.as_deref(), Some("ad1"));
        assert_eq!(ad.settings.countdown_secs(), None);
        assert!(!ad.settings.is_skippable());

        let ad: Advertisement =
            serde_json::from_value(json!({ "_id": "ad2", "settings": "fast" })).unwrap();
        assert_eq!(ad.settings.countdown_secs(), None);
    }

    #[test]
    fn skippable_accepts_loose_values() {
        for (value, expected) in [
            (json!(true), true),
            (json!("true"), true),
            (json!(" TRUE "), true),
            (json!(1), true),
            (json!(false), false),
            (json!("no"), false),
            (json!(null), false),
            (json!({}), false),
        ] {
            let settings: AdSettings =
                serde_json::from_value(json!({ "skippable": value.clone() })).unwrap();
            assert_eq!(settings.is_skippable(), expected, "{value}");
        }
    }

    #[test]
    fn unlock_envelope_without_data_reads() {
        let envelope: ApiEnvelope<UnlockPayload> =
            serde_json::from_str(r#"{"success":false,"message":"Invalid advertisement"}"#).unwrap();
        assert_eq!(envelope.success, Some(false));
        assert!(envelope.data.is_none());
    }
}

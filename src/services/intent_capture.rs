use crate::errors::CaptureError;
use crate::models::{AppListing, PendingDownload};
use crate::services::PendingDownloadStore;

/// Turns a download click into the pending download the redirect view will
/// pick up. Nothing is stored unless the app has a name and a parseable link.
pub fn capture_download(
    store: &PendingDownloadStore,
    app: &AppListing,
    now_ms: i64,
) -> Result<PendingDownload, CaptureError> {
    let pending = build_pending(app, now_ms)?;
    store.set(&pending)?;
    tracing::info!(
        app = %pending.app_name,
        slug = pending.app_slug.as_deref().unwrap_or("-"),
        "captured download intent"
    );
    Ok(pending)
}

fn build_pending(app: &AppListing, now_ms: i64) -> Result<PendingDownload, CaptureError> {
    let name = app.name.trim();
    if name.is_empty() {
        return Err(CaptureError::MissingName);
    }

    let url = resolve_download_url(app).ok_or(CaptureError::MissingUrl)?;
    reqwest::Url::parse(&url).map_err(|err| CaptureError::InvalidUrl(format!("{url}: {err}")))?;

    Ok(PendingDownload {
        url,
        app_name: name.to_string(),
        app_slug: non_blank(app.slug.as_deref()),
        app_id: non_blank(app.id.as_deref()),
        size: non_blank(app.size.as_deref()),
        version: non_blank(app.version.as_deref()),
        timestamp: now_ms,
    })
}

fn resolve_download_url(app: &AppListing) -> Option<String> {
    non_blank(app.download_url.as_deref()).or_else(|| {
        app.download_links
            .iter()
            .find_map(|link| non_blank(Some(link.url())))
    })
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

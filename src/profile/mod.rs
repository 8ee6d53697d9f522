//! Profile image resolution for vote message photos. Images come from
//! unavatar.io; when the service has no real avatar for a handle the
//! shared fallback image is used instead.

use once_cell::sync::Lazy;
use serde::Deserialize;

use crate::core::config;
use crate::core::error::{AppError, AppResult};

/// Shown when no profile image can be resolved for a handle.
pub const FALLBACK_IMAGE_URL: &str =
    "https://res.cloudinary.com/dqhw3jubx/image/upload/v1740100690/photo_2025-02-21_02-18-00_mbnnj9.jpg";

static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(config::network::timeout())
        .build()
        .unwrap_or_default()
});

#[derive(Debug, Deserialize)]
struct UnavatarResponse {
    url: String,
}

/// Looks up a profile image URL for the handle, trying the twitter
/// provider first and the x provider second. unavatar reports a miss by
/// returning its own fallback.png URL, which is treated as not found.
pub async fn lookup_profile_image(handle: &str) -> AppResult<String> {
    for provider in ["twitter", "x"] {
        let url = format!("https://unavatar.io/{provider}/{handle}?json");
        match fetch_image_url(&url).await {
            Ok(Some(image)) => return Ok(image),
            Ok(None) => continue,
            Err(err) => {
                log::debug!("unavatar {provider} lookup failed for {handle}: {err}");
                continue;
            }
        }
    }
    Err(AppError::ProfileLookup(format!(
        "no profile image found for {handle}"
    )))
}

async fn fetch_image_url(url: &str) -> AppResult<Option<String>> {
    let resp = HTTP_CLIENT.get(url).send().await?;
    if !resp.status().is_success() {
        return Ok(None);
    }
    let body: UnavatarResponse = resp.json().await?;
    if body.url.contains("fallback.png") {
        return Ok(None);
    }
    Ok(Some(body.url))
}

/// Resolves a profile image URL, falling back to the shared placeholder.
pub async fn resolve_profile_image(handle: &str) -> String {
    match lookup_profile_image(handle).await {
        Ok(url) => url,
        Err(err) => {
            log::info!("Using fallback image for {handle}: {err}");
            FALLBACK_IMAGE_URL.to_string()
        }
    }
}

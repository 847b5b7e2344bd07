use std::time::Duration;

use image::DynamicImage;
use log::debug;
use reqwest::StatusCode;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Image URL is empty")]
    EmptyUrl,
    #[error("Invalid image URL: {0}")]
    InvalidUrl(String),
    #[error("Failed to download image from {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed to download image from {url}: HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("Failed to decode image from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: image::ImageError,
    },
}

/// Downloads and decodes remote images. Every call builds its own client, so
/// no connection outlives the fetch that opened it.
#[derive(Debug, Clone)]
pub struct ImageFetcher {
    timeout: Duration,
}

impl ImageFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn fetch(&self, image_url: &str) -> Result<DynamicImage, FetchError> {
        let url = validate_url(image_url)?;

        let transport = |source: reqwest::Error| FetchError::Transport {
            url: image_url.to_string(),
            source,
        };

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(transport)?;

        debug!("Downloading image from {}", image_url);
        let response = client.get(url).send().await.map_err(transport)?;
        if response.status() != StatusCode::OK {
            return Err(FetchError::Status {
                url: image_url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = response.bytes().await.map_err(transport)?;
        debug!("Downloaded {} bytes from {}", body.len(), image_url);

        image::load_from_memory(&body).map_err(|source| FetchError::Decode {
            url: image_url.to_string(),
            source,
        })
    }
}

/// Rejects empty URLs and URLs without a scheme or host before any network call.
pub fn validate_url(image_url: &str) -> Result<Url, FetchError> {
    if image_url.trim().is_empty() {
        return Err(FetchError::EmptyUrl);
    }

    let invalid = || FetchError::InvalidUrl(image_url.to_string());
    let url = Url::parse(image_url).map_err(|_| invalid())?;
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::spawn_fixture_server;
    use image::GenericImageView;

    fn fetcher() -> ImageFetcher {
        ImageFetcher::new(Duration::from_secs(5))
    }

    #[test]
    fn empty_url_is_rejected() {
        assert!(matches!(validate_url(""), Err(FetchError::EmptyUrl)));
        assert!(matches!(validate_url("   "), Err(FetchError::EmptyUrl)));
    }

    #[test]
    fn url_without_scheme_or_host_is_rejected() {
        let err = validate_url("example.com/cat.png").unwrap_err();
        assert_eq!(err.to_string(), "Invalid image URL: example.com/cat.png");

        assert!(matches!(validate_url("mailto:someone@example.com"), Err(FetchError::InvalidUrl(_))));
        assert!(validate_url("https://example.com/cat.png").is_ok());
    }

    #[actix_web::test]
    async fn fetches_and_decodes_image() {
        let base = spawn_fixture_server();
        let image = fetcher().fetch(&format!("{}/image.png", base)).await.unwrap();
        assert_eq!(image.dimensions(), (64, 48));
    }

    #[actix_web::test]
    async fn non_ok_status_is_a_hard_failure() {
        let base = spawn_fixture_server();
        let err = fetcher().fetch(&format!("{}/missing.png", base)).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
    }

    #[actix_web::test]
    async fn partial_content_is_not_accepted() {
        let base = spawn_fixture_server();
        let err = fetcher().fetch(&format!("{}/partial.png", base)).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 206, .. }));
    }

    #[actix_web::test]
    async fn undecodable_body_is_reported_separately() {
        let base = spawn_fixture_server();
        let err = fetcher().fetch(&format!("{}/garbage.png", base)).await.unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
        assert!(err.to_string().starts_with("Failed to decode image from"));
    }

    #[actix_web::test]
    async fn unreachable_host_is_a_transport_error() {
        // Port 9 (discard) on loopback is not served by anything in the test environment.
        let err = fetcher().fetch("http://127.0.0.1:9/image.png").await.unwrap_err();
        assert!(matches!(err, FetchError::Transport { .. }));
    }
}

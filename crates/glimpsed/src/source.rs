//! Image acquisition: remote URLs and inline base64 payloads.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use glimpse_core::{decode_image, PreprocessError};
use image::RgbImage;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("{0}")]
    Fetch(#[from] reqwest::Error),
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("image exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("{0}")]
    Decode(#[from] PreprocessError),
}

/// Where a request's image comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    Url(String),
    Base64(String),
}

impl ImageSource {
    /// Pick the image source from optional request fields. A URL wins
    /// when both are present.
    pub fn from_fields(image_url: Option<String>, image_base64: Option<String>) -> Option<Self> {
        match (image_url, image_base64) {
            (Some(url), _) => Some(Self::Url(url)),
            (None, Some(data)) => Some(Self::Base64(data)),
            (None, None) => None,
        }
    }

    pub fn is_url(&self) -> bool {
        matches!(self, Self::Url(_))
    }
}

/// Downloads and decodes request images.
#[derive(Clone)]
pub struct ImageFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl ImageFetcher {
    /// `max_bytes` caps downloaded image payloads.
    pub fn new(timeout: Duration, max_bytes: usize) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("glimpsed/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, max_bytes })
    }

    /// Resolve a source into an RGB image.
    pub async fn load(&self, source: &ImageSource) -> Result<RgbImage, SourceError> {
        let bytes = match source {
            ImageSource::Url(url) => self.download(url).await?,
            ImageSource::Base64(data) => decode_base64(data)?,
        };
        let image = decode_image(&bytes)?;
        tracing::debug!(
            width = image.width(),
            height = image.height(),
            bytes = bytes.len(),
            "image decoded"
        );
        Ok(image)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, SourceError> {
        let mut response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let limit = self.max_bytes;
        if response.content_length().is_some_and(|len| len > limit as u64) {
            return Err(SourceError::TooLarge { limit });
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if bytes.len() + chunk.len() > limit {
                tracing::warn!(url, limit, "image download exceeded size limit");
                return Err(SourceError::TooLarge { limit });
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }
}

/// Decode a standard-alphabet base64 payload, tolerating a `data:` URI prefix.
fn decode_base64(data: &str) -> Result<Vec<u8>, SourceError> {
    let payload = match data.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => data,
    };
    let cleaned: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    Ok(STANDARD.decode(cleaned)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const LIMIT: usize = 1024 * 1024;

    fn png_bytes() -> Vec<u8> {
        let img = RgbImage::from_pixel(4, 4, Rgb([200, 10, 10]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
        bytes
    }

    fn png_base64() -> String {
        STANDARD.encode(png_bytes())
    }

    fn fetcher(max_bytes: usize) -> ImageFetcher {
        ImageFetcher::new(Duration::from_secs(5), max_bytes).unwrap()
    }

    /// Serve one HTTP response on a local port and return its URL.
    /// Without a length header the body runs until the connection closes.
    async fn serve_once(body: Vec<u8>, with_length: bool) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 2048];
            let _ = socket.read(&mut request).await;

            let mut head = String::from("HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nConnection: close\r\n");
            if with_length {
                head.push_str(&format!("Content-Length: {}\r\n", body.len()));
            }
            head.push_str("\r\n");

            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(&body).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}/image.png")
    }

    #[test]
    fn test_from_fields_prefers_url() {
        let source = ImageSource::from_fields(Some("http://x/y.jpg".into()), Some("aGk=".into()));
        assert_eq!(source, Some(ImageSource::Url("http://x/y.jpg".into())));
    }

    #[test]
    fn test_from_fields_base64_only() {
        let source = ImageSource::from_fields(None, Some("aGk=".into()));
        assert_eq!(source, Some(ImageSource::Base64("aGk=".into())));
        assert!(!source.unwrap().is_url());
    }

    #[test]
    fn test_from_fields_none() {
        assert_eq!(ImageSource::from_fields(None, None), None);
    }

    #[test]
    fn test_decode_base64_plain() {
        assert_eq!(decode_base64("aGVsbG8=").unwrap(), b"hello");
    }

    #[test]
    fn test_decode_base64_data_uri_and_newlines() {
        assert_eq!(decode_base64("data:image/png;base64,aGVs\nbG8=").unwrap(), b"hello");
    }

    #[test]
    fn test_decode_base64_invalid() {
        assert!(matches!(decode_base64("***"), Err(SourceError::Base64(_))));
    }

    #[tokio::test]
    async fn test_load_base64_png() {
        let image = fetcher(LIMIT).load(&ImageSource::Base64(png_base64())).await.unwrap();
        assert_eq!(image.dimensions(), (4, 4));
    }

    #[tokio::test]
    async fn test_load_base64_not_an_image() {
        let err = fetcher(LIMIT)
            .load(&ImageSource::Base64(STANDARD.encode(b"plain text")))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Decode(_)));
    }

    #[tokio::test]
    async fn test_load_unreachable_url() {
        let err = fetcher(LIMIT)
            .load(&ImageSource::Url("http://127.0.0.1:1/image.jpg".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Fetch(_)));
    }

    #[tokio::test]
    async fn test_load_url_within_limit() {
        let url = serve_once(png_bytes(), true).await;
        let image = fetcher(LIMIT).load(&ImageSource::Url(url)).await.unwrap();
        assert_eq!(image.dimensions(), (4, 4));
    }

    #[tokio::test]
    async fn test_load_url_rejects_declared_oversize() {
        let url = serve_once(vec![0u8; 4096], true).await;
        let err = fetcher(1024).load(&ImageSource::Url(url)).await.unwrap_err();
        assert!(matches!(err, SourceError::TooLarge { limit: 1024 }));
    }

    #[tokio::test]
    async fn test_load_url_stops_reading_past_limit() {
        let url = serve_once(vec![0u8; 64 * 1024], false).await;
        let err = fetcher(1024).load(&ImageSource::Url(url)).await.unwrap_err();
        assert!(matches!(err, SourceError::TooLarge { limit: 1024 }));
    }
}

// Thumbnail download + decode for preview panels

use std::time::Duration;

use async_trait::async_trait;
use image::imageops::FilterType;
use thiserror::Error;
use tracing::warn;

use super::config::EngineConfig;
use super::models::Thumbnail;

/// Preview size used by the presentation layer
pub const THUMBNAIL_SIZE: (u32, u32) = (180, 100);

#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("thumbnail request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("thumbnail server returned HTTP {0}")]
    Status(u16),

    #[error("could not decode thumbnail: {0}")]
    Decode(#[from] image::ImageError),

    #[error("thumbnail decoder stopped unexpectedly")]
    Worker,
}

/// Fetch-by-URL-then-decode collaborator
#[async_trait]
pub trait ThumbnailLoader: Send + Sync {
    async fn load(&self, url: &str) -> Result<Thumbnail, ThumbnailError>;
}

pub struct HttpThumbnailLoader {
    client: reqwest::Client,
    size: (u32, u32),
}

impl HttpThumbnailLoader {
    pub fn new() -> Self {
        Self::with_size(THUMBNAIL_SIZE)
    }

    pub fn with_size(size: (u32, u32)) -> Self {
        let client = Self::client_builder().build().unwrap_or_default();
        Self { client, size }
    }

    /// Route thumbnail requests through the engine's proxy (socks5/http), if any
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut builder = Self::client_builder().user_agent(config.user_agent.as_str());
        if let Some(proxy) = config.proxy.as_deref() {
            match reqwest::Proxy::all(proxy) {
                Ok(p) => builder = builder.proxy(p),
                Err(e) => warn!(proxy, error = %e, "ignoring invalid proxy for thumbnails"),
            }
        }
        Self {
            client: builder.build().unwrap_or_default(),
            size: THUMBNAIL_SIZE,
        }
    }

    fn client_builder() -> reqwest::ClientBuilder {
        reqwest::Client::builder().timeout(Duration::from_secs(10))
    }
}

impl Default for HttpThumbnailLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ThumbnailLoader for HttpThumbnailLoader {
    async fn load(&self, url: &str) -> Result<Thumbnail, ThumbnailError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ThumbnailError::Status(response.status().as_u16()));
        }
        let bytes = response.bytes().await?;

        let (width, height) = self.size;
        tokio::task::spawn_blocking(move || decode_and_resize(&bytes, width, height))
            .await
            .map_err(|_| ThumbnailError::Worker)?
    }
}

/// Decode any supported image format and scale it to exactly `width`x`height`
pub fn decode_and_resize(bytes: &[u8], width: u32, height: u32) -> Result<Thumbnail, ThumbnailError> {
    let img = image::load_from_memory(bytes)?
        .resize_exact(width, height, FilterType::Lanczos3)
        .to_rgba8();

    Ok(Thumbnail {
        width: img.width(),
        height: img.height(),
        rgba: img.into_raw(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageOutputFormat, RgbaImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, image::Rgba([200, 10, 10, 255]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut out, ImageOutputFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_decode_resizes() {
        let thumb = decode_and_resize(&png_bytes(640, 360), 180, 100).unwrap();
        assert_eq!((thumb.width, thumb.height), (180, 100));
        assert_eq!(thumb.rgba.len(), 180 * 100 * 4);
    }

    #[test]
    fn test_invalid_proxy_is_ignored() {
        let config = EngineConfig {
            proxy: Some("::not a proxy::".to_string()),
            ..EngineConfig::default()
        };
        let loader = HttpThumbnailLoader::from_config(&config);
        assert_eq!(loader.size, THUMBNAIL_SIZE);
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let err = decode_and_resize(b"definitely not an image", 180, 100).unwrap_err();
        assert!(matches!(err, ThumbnailError::Decode(_)));
    }
}

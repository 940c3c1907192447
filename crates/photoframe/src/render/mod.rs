//! Image producer for file and http(s) sources
//!
//! Turns a configured screen into a JPEG sized for the frame: the source is
//! read from disk or fetched over HTTP, decoded, scaled to fit inside the
//! display while keeping its aspect ratio, centred on a black canvas, and
//! re-encoded. Decoding and encoding are CPU bound and run on the blocking
//! pool.

pub mod template;

use crate::config::{FrameConfig, ScreenConfig, ScreenType};
use crate::scheduler::ImageProducer;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Upper bound for one image download
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("No screens configured")]
    NoScreens,

    #[error("Screen {0} has neither url nor location")]
    MissingSource(usize),

    #[error("Unsupported source: {0}")]
    Unsupported(String),

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Render task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Output geometry and quality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
    pub jpeg_quality: u8,
}

impl RenderSettings {
    pub fn from_config(config: &FrameConfig) -> Self {
        Self {
            width: config.frame.width,
            height: config.frame.height,
            jpeg_quality: config.frame.jpeg_quality,
        }
    }
}

/// Where a screen's image comes from, after template expansion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    File(PathBuf),
    Http(String),
}

/// Renders configured screens from image files and http(s) URLs
#[derive(Debug, Clone)]
pub struct ScreenRenderer {
    screens: Arc<[ScreenConfig]>,
    settings: RenderSettings,
    client: reqwest::Client,
}

impl ScreenRenderer {
    pub fn new(screens: Vec<ScreenConfig>, settings: RenderSettings) -> Self {
        Self::with_client(screens, settings, reqwest::Client::new())
    }

    /// Renderer fetching remote images through `client`
    pub fn with_client(
        screens: Vec<ScreenConfig>,
        settings: RenderSettings,
        client: reqwest::Client,
    ) -> Self {
        Self {
            screens: screens.into(),
            settings,
            client,
        }
    }

    pub fn settings(&self) -> RenderSettings {
        self.settings
    }

    /// Render the screen at `index mod len`
    pub async fn render(&self, index: usize) -> Result<Bytes, RenderError> {
        if self.screens.is_empty() {
            return Err(RenderError::NoScreens);
        }
        let index = index % self.screens.len();

        match resolve_source(index, &self.screens[index])? {
            ImageSource::File(path) => {
                debug!("Rendering screen {} from {}", index, path.display());
                render_file(path, self.settings).await
            }
            ImageSource::Http(url) => {
                debug!("Rendering screen {} from {}", index, url);
                render_url(&self.client, &url, self.settings).await
            }
        }
    }
}

impl ImageProducer for ScreenRenderer {
    async fn render_screen(&self, index: usize) -> Option<Bytes> {
        match self.render(index).await {
            Ok(image) => Some(image),
            Err(e) => {
                warn!("Failed to render screen {}: {}", index, e);
                None
            }
        }
    }
}

/// Resolve a screen's source, `url` taking precedence over `location`
pub fn resolve_source(index: usize, screen: &ScreenConfig) -> Result<ImageSource, RenderError> {
    if screen.kind == ScreenType::Html {
        return Err(RenderError::Unsupported(format!(
            "html screen {}",
            screen.url.as_deref().unwrap_or_default()
        )));
    }

    match (&screen.url, &screen.location) {
        (Some(url), _) => {
            if let Some(path) = url.strip_prefix("file://") {
                Ok(ImageSource::File(local_path(path)))
            } else if url.starts_with("http://") || url.starts_with("https://") {
                Ok(ImageSource::Http(template::expand(url)))
            } else {
                Err(RenderError::Unsupported(url.clone()))
            }
        }
        (None, Some(location)) => Ok(ImageSource::File(local_path(location))),
        (None, None) => Err(RenderError::MissingSource(index)),
    }
}

fn local_path(raw: &str) -> PathBuf {
    let expanded = template::expand(raw);
    PathBuf::from(shellexpand::tilde(&expanded).as_ref())
}

/// Load an image file and prepare it for the frame
pub async fn render_file(path: PathBuf, settings: RenderSettings) -> Result<Bytes, RenderError> {
    tokio::task::spawn_blocking(move || {
        let data = std::fs::read(&path).map_err(|source| RenderError::Io {
            path: path.clone(),
            source,
        })?;
        compose(&data, settings)
    })
    .await?
}

/// Download an image and prepare it for the frame
pub async fn render_url(
    client: &reqwest::Client,
    url: &str,
    settings: RenderSettings,
) -> Result<Bytes, RenderError> {
    let fetch_error = |source: reqwest::Error| RenderError::Fetch {
        url: url.to_string(),
        source,
    };

    let data = client
        .get(url)
        .timeout(FETCH_TIMEOUT)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(fetch_error)?
        .bytes()
        .await
        .map_err(fetch_error)?;

    tokio::task::spawn_blocking(move || compose(&data, settings)).await?
}

/// Fit an encoded image inside the display and re-encode it as JPEG
pub fn compose(data: &[u8], settings: RenderSettings) -> Result<Bytes, RenderError> {
    let RenderSettings {
        width,
        height,
        jpeg_quality,
    } = settings;

    let source = image::load_from_memory(data)?;
    let scaled = source.resize(width, height, FilterType::CatmullRom).to_rgb8();

    let mut canvas = RgbImage::from_pixel(width, height, Rgb([0, 0, 0]));
    let x = (width.saturating_sub(scaled.width()) / 2) as i64;
    let y = (height.saturating_sub(scaled.height()) / 2) as i64;
    imageops::overlay(&mut canvas, &scaled, x, y);

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, jpeg_quality).encode_image(&canvas)?;
    Ok(Bytes::from(out))
}

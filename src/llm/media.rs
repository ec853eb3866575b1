use std::path::PathBuf;
use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use crate::error::{StoryError, StoryResult};

const MEDIA_ERROR_BODY_LIMIT: usize = 800;
const FALLBACK_IMAGE_MIME: &str = "image/jpeg";

#[derive(Debug, Clone)]
pub struct ImageData {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ImageData {
    pub fn new(bytes: Vec<u8>) -> Self {
        let mime_type = detect_mime_type(&bytes)
            .filter(|mime| mime.starts_with("image/"))
            .unwrap_or_else(|| FALLBACK_IMAGE_MIME.to_string());
        ImageData { bytes, mime_type }
    }

    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.bytes)
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    if data.len() > 12 {
        let ftyp = &data[4..12];
        if ftyp.starts_with(b"ftyp") {
            let brand = &ftyp[4..8];
            if brand == b"heic" || brand == b"heif" || brand == b"hevc" {
                return Some("image/heic".to_string());
            }
        }
    }

    infer::get(data).map(|kind| kind.mime_type().to_string())
}

pub(crate) fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

#[derive(Debug, PartialEq, Eq)]
enum ImageSource {
    Remote(Url),
    Local(PathBuf),
}

fn classify_reference(reference: &str) -> ImageSource {
    match Url::parse(reference) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => ImageSource::Remote(url),
        Ok(url) if url.scheme() == "file" => match url.to_file_path() {
            Ok(path) => ImageSource::Local(path),
            Err(()) => ImageSource::Local(PathBuf::from(url.path())),
        },
        // Anything else (including Windows drive letters, which parse as a
        // one-letter scheme) is read from the filesystem as given.
        _ => ImageSource::Local(PathBuf::from(reference)),
    }
}

/// Loads the image behind `reference`: http(s) URLs are downloaded, everything
/// else is read from disk. One attempt, no retry.
pub async fn load_image(
    client: &Client,
    reference: &str,
    timeout: Duration,
) -> StoryResult<ImageData> {
    let bytes = match classify_reference(reference) {
        ImageSource::Remote(url) => download_image(client, url, timeout).await?,
        ImageSource::Local(path) => tokio::fs::read(&path).await.map_err(|err| {
            warn!("Failed to read image {}: {err}", path.display());
            StoryError::description_unavailable(reference, format!("could not read image: {err}"))
        })?,
    };

    if bytes.is_empty() {
        return Err(StoryError::description_unavailable(reference, "image is empty"));
    }

    let image = ImageData::new(bytes);
    debug!(
        "Loaded image {} ({} bytes, {})",
        reference,
        image.bytes.len(),
        image.mime_type
    );
    Ok(image)
}

async fn download_image(client: &Client, url: Url, timeout: Duration) -> StoryResult<Vec<u8>> {
    let reference = url.to_string();
    let response = client.get(url).timeout(timeout).send().await.map_err(|err| {
        warn!(
            "Failed to fetch image {reference}: {err} (timeout={}, connect={})",
            err.is_timeout(),
            err.is_connect()
        );
        StoryError::description_unavailable(&reference, format!("download failed: {err}"))
    })?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        warn!(
            "Image download failed for {reference} with status {}: {}",
            status,
            truncate_for_log(&body, MEDIA_ERROR_BODY_LIMIT)
        );
        return Err(StoryError::description_unavailable(
            &reference,
            format!("download failed with status {status}"),
        ));
    }

    response
        .bytes()
        .await
        .map(|bytes| bytes.to_vec())
        .map_err(|err| {
            StoryError::description_unavailable(&reference, format!("could not read body: {err}"))
        })
}

use std::{
    io::Cursor,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use image::{imageops::FilterType, DynamicImage, ImageFormat};
use reqwest::{redirect, Client};
use tokio::io::AsyncWriteExt;
use url::Url;

use super::AnalysisError;
use crate::{ai::ImagePayload, config::MediaConfig};

/// Longest edge sent to the model.
const MAX_EDGE: u32 = 1024;

/// Same text for missing, unreadable and out-of-root photos.
const PHOTO_UNAVAILABLE: &str = "photo is not available";

/// Copies the content behind a remote URI into a local file.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fails once more than `max_bytes` would be written.
    async fn copy_to(&self, uri: &Url, dest: &Path, max_bytes: u64) -> anyhow::Result<u64>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Redirects are not followed, so a fetch never leaves the allowed host.
    pub fn new() -> anyhow::Result<Self> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .build()
            .context("build photo http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn copy_to(&self, uri: &Url, dest: &Path, max_bytes: u64) -> anyhow::Result<u64> {
        let mut response = self
            .client
            .get(uri.clone())
            .send()
            .await
            .with_context(|| format!("fetch {uri}"))?
            .error_for_status()?;
        if response.content_length().is_some_and(|len| len > max_bytes) {
            anyhow::bail!("{uri} is larger than {max_bytes} bytes");
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("create {}", dest.display()))?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            written += chunk.len() as u64;
            if written > max_bytes {
                anyhow::bail!("{uri} is larger than {max_bytes} bytes");
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(written)
    }
}

/// Turns a photo reference into JPEG bytes for the model.
///
/// `file:` URIs and bare paths must resolve, symlinks included, to a file
/// under the media root; relative paths are taken from that root. `http` and
/// `https` URIs are fetched only from the allowed hosts and are copied into a
/// temporary file under `cache_dir` first. That file is removed when loading
/// finishes, whatever the outcome. Both sources are capped at `max_bytes`.
#[derive(Clone)]
pub struct ImageResolver {
    cache_dir: PathBuf,
    media: MediaConfig,
    fetcher: Arc<dyn ContentFetcher>,
}

impl ImageResolver {
    pub fn new(
        cache_dir: impl Into<PathBuf>,
        media: MediaConfig,
        fetcher: Arc<dyn ContentFetcher>,
    ) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            media,
            fetcher,
        }
    }

    pub async fn load(&self, uri: &str) -> Result<ImagePayload, AnalysisError> {
        let bytes = match Url::parse(uri) {
            Ok(url) if url.scheme() == "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| AnalysisError::ImageRead(format!("bad file uri {uri}")))?;
                self.read_media(&path).await?
            }
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                self.check_host(&url)?;
                self.read_through_cache(&url).await?
            }
            Ok(url) => {
                tracing::warn!(scheme = url.scheme(), "unsupported photo uri");
                return Err(AnalysisError::ImageRead(format!(
                    "unsupported uri scheme {}",
                    url.scheme()
                )));
            }
            Err(_) => self.read_media(Path::new(uri)).await?,
        };

        tokio::task::spawn_blocking(move || encode_for_model(&bytes))
            .await
            .map_err(|e| AnalysisError::ImageRead(e.to_string()))?
    }

    async fn read_media(&self, path: &Path) -> Result<Vec<u8>, AnalysisError> {
        let Some(resolved) = self.confine(path).await else {
            tracing::warn!(path = %path.display(), "photo missing or outside the media root");
            return Err(AnalysisError::ImageRead(PHOTO_UNAVAILABLE.into()));
        };
        read_capped(&resolved, self.media.max_bytes).await
    }

    async fn confine(&self, path: &Path) -> Option<PathBuf> {
        let root = tokio::fs::canonicalize(&self.media.root).await.ok()?;
        let resolved = tokio::fs::canonicalize(root.join(path)).await.ok()?;
        resolved.starts_with(&root).then_some(resolved)
    }

    fn check_host(&self, url: &Url) -> Result<(), AnalysisError> {
        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        if self.media.remote_hosts.iter().any(|allowed| *allowed == host) {
            return Ok(());
        }
        tracing::warn!(%host, "photo host not allowed");
        Err(AnalysisError::ImageRead(format!("photos from {host} are not allowed")))
    }

    async fn read_through_cache(&self, url: &Url) -> Result<Vec<u8>, AnalysisError> {
        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|e| AnalysisError::ImageRead(e.to_string()))?;
        let cached = tempfile::Builder::new()
            .prefix("meal_")
            .suffix(".img")
            .tempfile_in(&self.cache_dir)
            .map_err(|e| AnalysisError::ImageRead(e.to_string()))?;

        let copied = self
            .fetcher
            .copy_to(url, cached.path(), self.media.max_bytes)
            .await
            .map_err(|e| AnalysisError::ImageRead(format!("{e:#}")));
        let bytes = match copied {
            Ok(size) => {
                tracing::debug!(%url, size, path = %cached.path().display(), "copied image to cache");
                read_capped(cached.path(), self.media.max_bytes).await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = cached.close() {
            tracing::warn!(error = %e, "failed to remove cached image");
        }
        bytes
    }
}

async fn read_capped(path: &Path, max_bytes: u64) -> Result<Vec<u8>, AnalysisError> {
    let unavailable = |e: std::io::Error| {
        tracing::debug!(error = %e, path = %path.display(), "photo read failed");
        AnalysisError::ImageRead(PHOTO_UNAVAILABLE.into())
    };
    let len = tokio::fs::metadata(path).await.map_err(unavailable)?.len();
    if len > max_bytes {
        return Err(AnalysisError::ImageRead(format!(
            "photo is larger than {max_bytes} bytes"
        )));
    }
    tokio::fs::read(path).await.map_err(unavailable)
}

/// Decodes any supported format, shrinks large photos and re-encodes as JPEG.
fn encode_for_model(bytes: &[u8]) -> Result<ImagePayload, AnalysisError> {
    let decoded = image::load_from_memory(bytes).map_err(|e| {
        tracing::warn!(error = %e, "image decode failed");
        AnalysisError::ImageDecode
    })?;

    let resized = if decoded.width() > MAX_EDGE || decoded.height() > MAX_EDGE {
        decoded.resize(MAX_EDGE, MAX_EDGE, FilterType::Triangle)
    } else {
        decoded
    };

    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(resized.to_rgb8())
        .write_to(&mut out, ImageFormat::Jpeg)
        .map_err(|e| AnalysisError::ImageRead(e.to_string()))?;

    Ok(ImagePayload {
        bytes: Bytes::from(out.into_inner()),
        mime_type: "image/jpeg".to_string(),
    })
}

#[cfg(test)]
pub(crate) mod image_source_tests {
    use super::*;

    pub(crate) const PHOTO_HOST: &str = "photos.test";

    /// Writes fixed bytes for any URI, honouring the size cap.
    pub(crate) struct StaticFetcher(pub Vec<u8>);

    #[async_trait]
    impl ContentFetcher for StaticFetcher {
        async fn copy_to(&self, uri: &Url, dest: &Path, max_bytes: u64) -> anyhow::Result<u64> {
            if self.0.len() as u64 > max_bytes {
                anyhow::bail!("{uri} is larger than {max_bytes} bytes");
            }
            tokio::fs::write(dest, &self.0).await?;
            Ok(self.0.len() as u64)
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl ContentFetcher for FailingFetcher {
        async fn copy_to(&self, uri: &Url, _dest: &Path, _max_bytes: u64) -> anyhow::Result<u64> {
            anyhow::bail!("cannot open {uri}")
        }
    }

    /// Photos under `root`, remote photos from [`PHOTO_HOST`], 1 MiB cap.
    pub(crate) fn media_at(root: impl Into<PathBuf>) -> MediaConfig {
        MediaConfig {
            root: root.into(),
            remote_hosts: vec![PHOTO_HOST.to_string()],
            max_bytes: 1024 * 1024,
        }
    }

    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::new_rgba8(width, height);
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn cache_entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    fn local_resolver(root: &Path) -> ImageResolver {
        ImageResolver::new(root.join("cache"), media_at(root), Arc::new(FailingFetcher))
    }

    fn unavailable(err: AnalysisError) -> bool {
        matches!(err, AnalysisError::ImageRead(ref m) if m == PHOTO_UNAVAILABLE)
    }

    #[tokio::test]
    async fn local_png_is_reencoded_as_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meal.png");
        std::fs::write(&path, png_bytes(8, 8)).unwrap();

        let payload = local_resolver(dir.path()).load(path.to_str().unwrap()).await.unwrap();

        assert_eq!(payload.mime_type, "image/jpeg");
        assert_eq!(image::guess_format(&payload.bytes).unwrap(), ImageFormat::Jpeg);
    }

    #[tokio::test]
    async fn file_uri_is_read_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meal.png");
        std::fs::write(&path, png_bytes(4, 4)).unwrap();
        let uri = Url::from_file_path(&path).unwrap();

        assert!(local_resolver(dir.path()).load(uri.as_str()).await.is_ok());
        assert!(!dir.path().join("cache").exists());
    }

    #[tokio::test]
    async fn relative_paths_start_at_the_media_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("2024")).unwrap();
        std::fs::write(dir.path().join("2024/lunch.png"), png_bytes(4, 4)).unwrap();

        assert!(local_resolver(dir.path()).load("2024/lunch.png").await.is_ok());
    }

    #[tokio::test]
    async fn paths_outside_the_media_root_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("media");
        std::fs::create_dir(&root).unwrap();
        let secret = dir.path().join("secret.png");
        std::fs::write(&secret, png_bytes(4, 4)).unwrap();
        let resolver = local_resolver(&root);

        let absolute = resolver.load(secret.to_str().unwrap()).await.unwrap_err();
        let traversal = resolver.load("../secret.png").await.unwrap_err();
        let as_uri = resolver
            .load(Url::from_file_path(&secret).unwrap().as_str())
            .await
            .unwrap_err();
        let missing = resolver.load("nothing-here.png").await.unwrap_err();

        assert_eq!(absolute.to_string(), missing.to_string());
        assert!(unavailable(absolute));
        assert!(unavailable(traversal));
        assert!(unavailable(as_uri));
        assert!(unavailable(missing));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinks_cannot_escape_the_media_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("media");
        std::fs::create_dir(&root).unwrap();
        let secret = dir.path().join("secret.png");
        std::fs::write(&secret, png_bytes(4, 4)).unwrap();
        std::os::unix::fs::symlink(&secret, root.join("link.png")).unwrap();

        let err = local_resolver(&root).load("link.png").await.unwrap_err();

        assert!(unavailable(err));
    }

    #[tokio::test]
    async fn oversized_local_photo_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big.png"), png_bytes(8, 8)).unwrap();
        let media = MediaConfig {
            max_bytes: 16,
            ..media_at(dir.path())
        };
        let resolver = ImageResolver::new(dir.path().join("cache"), media, Arc::new(FailingFetcher));

        let err = resolver.load("big.png").await.unwrap_err();

        assert_eq!(err.to_string(), "Failed to read image: photo is larger than 16 bytes");
    }

    #[tokio::test]
    async fn large_images_are_shrunk() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = ImageResolver::new(
            dir.path(),
            media_at(dir.path()),
            Arc::new(StaticFetcher(png_bytes(2048, 512))),
        );
        let payload = resolver.load("https://photos.test/1").await.unwrap();

        let decoded = image::load_from_memory(&payload.bytes).unwrap();
        assert_eq!(decoded.width(), MAX_EDGE);
        assert_eq!(decoded.height(), 256);
    }

    #[tokio::test]
    async fn undecodable_remote_content_fails_and_leaves_no_cache_file() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = ImageResolver::new(
            dir.path(),
            media_at(dir.path()),
            Arc::new(StaticFetcher(b"not an image".to_vec())),
        );

        let err = resolver.load("https://photos.test/42").await.unwrap_err();

        assert!(matches!(err, AnalysisError::ImageDecode));
        assert_eq!(err.to_string(), "Failed to decode bitmap from image file");
        assert_eq!(cache_entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn oversized_remote_photo_fails_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaConfig {
            max_bytes: 16,
            ..media_at(dir.path())
        };
        let resolver = ImageResolver::new(dir.path(), media, Arc::new(StaticFetcher(png_bytes(8, 8))));

        let err = resolver.load("https://photos.test/9").await.unwrap_err();

        assert!(err.to_string().contains("larger than 16 bytes"));
        assert_eq!(cache_entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn fetch_failure_also_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = ImageResolver::new(dir.path(), media_at(dir.path()), Arc::new(FailingFetcher));

        let err = resolver.load("https://photos.test/meal.jpg").await.unwrap_err();

        assert!(err.to_string().contains("cannot open"));
        assert_eq!(cache_entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn other_hosts_and_schemes_are_never_fetched() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = ImageResolver::new(dir.path(), media_at(dir.path()), Arc::new(FailingFetcher));

        let internal = resolver.load("http://169.254.169.254/latest/meta-data").await.unwrap_err();
        let scheme = resolver.load("content://photos/1").await.unwrap_err();

        assert_eq!(
            internal.to_string(),
            "Failed to read image: photos from 169.254.169.254 are not allowed"
        );
        assert_eq!(scheme.to_string(), "Failed to read image: unsupported uri scheme content");
        assert_eq!(cache_entries(dir.path()), 0);
    }
}

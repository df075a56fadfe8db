//! Local cache of downloaded media.
//!
//! Each file is keyed by the last path segment of its source URL, so two
//! commands pointing at the same file name share one download. The whole
//! directory is wiped at startup.
//!
//! Downloads are written to a `.part` file first and renamed into place once
//! complete: a file under its final name is always a complete download.

use std::{
    ffi::OsString,
    io,
    path::{Component, Path, PathBuf},
};

use futures_util::StreamExt;
use tokio::{fs, io::AsyncWriteExt};
use url::Url;

use crate::{
    error::{Error, Result},
    http,
};

#[derive(Clone, Debug)]
pub struct MediaCache {
    dir: PathBuf,
    http_client: http::Client,
}

impl MediaCache {
    /// Suffix of downloads in progress.
    const PARTIAL_SUFFIX: &'static str = ".part";

    #[must_use]
    pub fn new<P: Into<PathBuf>>(dir: P, http_client: http::Client) -> Self {
        Self {
            dir: dir.into(),
            http_client,
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Removes every cached file and recreates an empty directory.
    pub async fn clear(&self) -> Result<()> {
        match fs::remove_dir_all(&self.dir).await {
            Ok(()) => debug!("removed {}", self.dir.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        fs::create_dir_all(&self.dir).await?;
        info!("media cache {} cleared", self.dir.display());

        Ok(())
    }

    /// Local path that media from `url` is cached under.
    ///
    /// # Errors
    ///
    /// Fails for URLs that are not `http` or `https`, or whose path does not
    /// end in a file name.
    pub fn path_for(&self, url: &Url) -> Result<PathBuf> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::invalid_argument(format!(
                "unsupported media scheme in {url}"
            )));
        }

        let file_name = url
            .path_segments()
            .and_then(Iterator::last)
            .filter(|segment| Self::is_file_name(segment))
            .ok_or_else(|| Error::invalid_argument(format!("{url} does not name a file")))?;

        Ok(self.dir.join(file_name))
    }

    /// Whether `segment` names a file directly inside the cache directory,
    /// with drive prefixes and separators rejected on every platform.
    fn is_file_name(segment: &str) -> bool {
        if segment.contains([':', '\\', '/']) {
            return false;
        }

        let mut components = Path::new(segment).components();
        matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        )
    }

    /// Returns the cached copy of `url`, downloading it first on a miss.
    pub async fn fetch(&self, url: &Url) -> Result<PathBuf> {
        let path = self.path_for(url)?;

        if fs::try_exists(&path).await? {
            debug!("cache hit for {url}: {}", path.display());
            return Ok(path);
        }

        fs::create_dir_all(&self.dir).await?;

        let partial = Self::partial_path(&path);
        match self.download(url, &partial).await {
            Ok(bytes) => {
                fs::rename(&partial, &path).await?;
                info!("downloaded {url} ({bytes} bytes) to {}", path.display());
                Ok(path)
            }
            Err(e) => {
                if let Err(e) = fs::remove_file(&partial).await {
                    if e.kind() != io::ErrorKind::NotFound {
                        warn!("could not remove {}: {e}", partial.display());
                    }
                }
                Err(e)
            }
        }
    }

    fn partial_path(path: &Path) -> PathBuf {
        let mut file_name = path.file_name().map(OsString::from).unwrap_or_default();
        file_name.push(Self::PARTIAL_SUFFIX);
        path.with_file_name(file_name)
    }

    async fn download(&self, url: &Url, destination: &Path) -> Result<u64> {
        let response = self.http_client.get(url.clone()).await?;

        let mut file = fs::File::create(destination).await?;
        let mut body = response.bytes_stream();
        let mut written = 0;

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.sync_all().await?;
        Ok(written)
    }
}

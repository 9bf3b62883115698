use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs;

/// On-disk response bodies keyed by the SHA-256 of the request URL.
#[derive(Clone, Debug)]
pub struct ResponseCache {
    dir: PathBuf,
}

impl ResponseCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, url: &str) -> PathBuf {
        let digest = Sha256::digest(url.as_bytes());
        self.dir.join(format!("{}.body", hex::encode(digest)))
    }

    /// Cached body for `url`, if any. Unreadable entries count as misses.
    pub async fn get(&self, url: &str) -> Option<Vec<u8>> {
        fs::read(self.path_for(url)).await.ok()
    }

    pub async fn put(&self, url: &str, body: &[u8]) -> io::Result<()> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(url);
        let tmp = path.with_extension("part");
        fs::write(&tmp, body).await?;
        fs::rename(&tmp, &path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn stores_bodies_by_url_digest() {
        let dir = tempdir().unwrap();
        let cache = ResponseCache::new(dir.path().join("http"));
        let url = "https://www.sec.gov/Archives/edgar/data/1647251/index.json";
        assert!(cache.get(url).await.is_none());

        cache.put(url, b"{}").await.unwrap();
        assert_eq!(cache.get(url).await.as_deref(), Some(&b"{}"[..]));
        assert!(cache.get("https://www.sec.gov/other").await.is_none());

        let name = cache.path_for(url);
        let stem = name.file_stem().and_then(|s| s.to_str()).unwrap();
        assert_eq!(stem.len(), 64);
    }
}

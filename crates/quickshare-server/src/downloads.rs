use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;

/// Directory received files are written into. Never overwrites.
pub struct DownloadDir {
    dir: PathBuf,
}

impl DownloadDir {
    pub async fn new(dir: PathBuf) -> io::Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Download directory: {}", dir.display());
        Ok(Self { dir })
    }

    /// Write `data` under the sanitised `name`, adding ` (n)` on collision.
    pub async fn save(&self, name: &str, data: &[u8]) -> io::Result<PathBuf> {
        let name = sanitize(name);
        let mut n = 0;
        loop {
            let path = self.dir.join(numbered(&name, n));
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    file.write_all(data).await?;
                    file.flush().await?;
                    return Ok(path);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => n += 1,
                Err(e) => return Err(e),
            }
        }
    }
}

/// Final path component only; peers do not choose directories.
fn sanitize(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or("").trim();
    match last {
        "" | "." | ".." => "download".to_string(),
        other => other.to_string(),
    }
}

/// `report.pdf`, `report (1).pdf`, `report (2).pdf`, ...
fn numbered(name: &str, n: u32) -> String {
    if n == 0 {
        return name.to_string();
    }
    let path = Path::new(name);
    match (path.file_stem(), path.extension()) {
        (Some(stem), Some(ext)) => {
            format!("{} ({}).{}", stem.to_string_lossy(), n, ext.to_string_lossy())
        }
        _ => format!("{} ({})", name, n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_directories() {
        assert_eq!(sanitize("../../etc/passwd"), "passwd");
        assert_eq!(sanitize("C:\\Users\\me\\notes.txt"), "notes.txt");
        assert_eq!(sanitize("plain.txt"), "plain.txt");
        assert_eq!(sanitize(".."), "download");
        assert_eq!(sanitize("dir/"), "download");
    }

    #[test]
    fn numbering_keeps_extension() {
        assert_eq!(numbered("report.pdf", 0), "report.pdf");
        assert_eq!(numbered("report.pdf", 2), "report (2).pdf");
        assert_eq!(numbered("README", 1), "README (1)");
        assert_eq!(numbered(".env", 1), ".env (1)");
    }

    #[tokio::test]
    async fn save_never_overwrites() {
        let dir = std::env::temp_dir().join(format!("quickshare_downloads_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir).await;
        let downloads = DownloadDir::new(dir.clone()).await.unwrap();

        let first = downloads.save("a.txt", b"one").await.unwrap();
        let second = downloads.save("a.txt", b"two").await.unwrap();
        assert_eq!(first, dir.join("a.txt"));
        assert_eq!(second, dir.join("a (1).txt"));
        assert_eq!(fs::read(&first).await.unwrap(), b"one");
        assert_eq!(fs::read(&second).await.unwrap(), b"two");

        let _ = fs::remove_dir_all(&dir).await;
    }
}

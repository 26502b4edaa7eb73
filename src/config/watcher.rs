//! Configuration file watcher for hot reload.
//!
//! The parent directory is watched rather than the file itself, so editors
//! and deploy tools that replace the file by rename are picked up too.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::RelayConfig;

/// Watches one configuration file and forwards every valid new version.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<RelayConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for validated configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<RelayConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. The returned handle must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let dir = watch_dir(&self.path).to_path_buf();
        let file_name: Option<OsString> = self.path.file_name().map(ToOwned::to_owned);
        let path = self.path.clone();
        let tx = self.update_tx;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let relevant = (event.kind.is_modify() || event.kind.is_create())
                        && event.paths.iter().any(|p| p.file_name() == file_name.as_deref());
                    if relevant {
                        reload(&path, &tx);
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

fn watch_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Load `path` and forward it. An invalid file leaves the running
/// configuration in place. Returns whether an update was sent.
fn reload(path: &Path, tx: &mpsc::UnboundedSender<RelayConfig>) -> bool {
    match load_config(path) {
        Ok(config) => {
            tracing::info!(path = ?path, routes = config.routes.len(), "Config file changed, reloading");
            tx.send(config).is_ok()
        }
        Err(e) => {
            tracing::error!(path = ?path, error = %e, "Failed to reload config, keeping current configuration");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const MEDIA_ROUTE: &str = r#"
        [[routes]]
        name = "media"
        mount = "/media"
        bucket = "media-bucket"
    "#;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("s3-relay-watch-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_reload_forwards_valid_config() {
        let dir = temp_dir();
        let path = dir.join("relay.toml");
        fs::write(&path, MEDIA_ROUTE).unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(reload(&path, &tx));

        let config = rx.try_recv().unwrap();
        assert_eq!(config.routes.len(), 1);
        assert_eq!(config.routes[0].bucket, "media-bucket");

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_reload_rejects_invalid_config() {
        let dir = temp_dir();
        let path = dir.join("relay.toml");
        fs::write(&path, "[limits]\nwrite_high_watermark = 1024\nwrite_low_watermark = 4096\n").unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(!reload(&path, &tx));
        assert!(rx.try_recv().is_err());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_watch_dir_of_bare_file_name() {
        assert_eq!(watch_dir(Path::new("relay.toml")), Path::new("."));
        assert_eq!(watch_dir(Path::new("/etc/relay/relay.toml")), Path::new("/etc/relay"));
    }

    #[tokio::test]
    async fn test_replaced_file_is_picked_up() {
        let dir = temp_dir();
        let path = dir.join("relay.toml");
        fs::write(&path, "").unwrap();

        let (watcher, mut updates) = ConfigWatcher::new(&path);
        let _handle = watcher.run().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let staged = dir.join("relay.toml.new");
        fs::write(&staged, MEDIA_ROUTE).unwrap();
        fs::rename(&staged, &path).unwrap();

        let config = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let config = updates.recv().await.unwrap();
                if !config.routes.is_empty() {
                    return config;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(config.routes[0].name, "media");

        fs::remove_dir_all(&dir).unwrap();
    }
}

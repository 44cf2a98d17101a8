//! Settings persistence and snapshot publication.

use crate::error::{ConfError, ConfResult};
use crate::known_hosts;
use crate::settings::Settings;
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// File name inside the configuration directory
pub const CONFIG_FILE_NAME: &str = ".sshx_config.json";

/// Modification stamp used by the watcher to detect edits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

impl FileStamp {
    fn read(path: &Path) -> Option<Self> {
        let meta = fs::metadata(path).ok()?;
        Some(Self {
            modified: meta.modified().ok(),
            len: meta.len(),
        })
    }
}

/// Owns the settings file and publishes an immutable snapshot after every
/// successful load, edit or reload.
///
/// Flow:
/// 1. `open()` reads the file, writing defaults when it does not exist
/// 2. Consumers call `subscribe()` or `current()`
/// 3. `set()` edits persist immediately and publish a new snapshot
/// 4. `spawn_watcher()` picks up edits made by other processes
pub struct ConfigManager {
    path: PathBuf,
    known_hosts: Option<PathBuf>,
    snapshot: watch::Sender<Arc<Settings>>,
    stamp: Mutex<Option<FileStamp>>,
    /// Serializes read-modify-write cycles from `set()` and `reload()`
    edit_lock: Mutex<()>,
}

impl ConfigManager {
    /// Open the settings in `dir`, pruning `$HOME/.ssh/known_hosts`.
    pub fn open(dir: impl AsRef<Path>) -> ConfResult<Self> {
        Self::open_with_known_hosts(dir, known_hosts::default_path())
    }

    /// Open the settings in `dir` with an explicit known-hosts file (`None` disables pruning).
    pub fn open_with_known_hosts(
        dir: impl AsRef<Path>,
        known_hosts: Option<PathBuf>,
    ) -> ConfResult<Self> {
        let dir = dir.as_ref();
        let path = dir.join(CONFIG_FILE_NAME);

        let settings = if path.exists() {
            read_settings(&path)?
        } else {
            let settings = Settings::default();
            fs::create_dir_all(dir).map_err(|e| ConfError::io(dir, e))?;
            let encoded = write_settings(&path, &settings)?;
            info!(path = %path.display(), "Wrote default settings\n{}", encoded);
            settings
        };

        let (snapshot, _) = watch::channel(Arc::new(settings));
        let manager = Self {
            stamp: Mutex::new(FileStamp::read(&path)),
            path,
            known_hosts,
            snapshot,
            edit_lock: Mutex::new(()),
        };
        manager.prune_known_hosts(&manager.current().local_listen_addr);

        Ok(manager)
    }

    /// Path of the settings file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Latest settings snapshot
    pub fn current(&self) -> Arc<Settings> {
        Arc::clone(&self.snapshot.borrow())
    }

    /// Receiver that observes every future snapshot
    pub fn subscribe(&self) -> watch::Receiver<Arc<Settings>> {
        self.snapshot.subscribe()
    }

    /// Set one field, persist the file and publish the new snapshot.
    pub fn set(&self, field: &str, value: &str) -> ConfResult<()> {
        let _guard = self.edit_lock.lock();

        let current = self.current();
        let mut updated = (*current).clone();
        updated.set_field(field, value)?;

        self.prune_known_hosts(&current.local_listen_addr);
        write_settings(&self.path, &updated)?;
        *self.stamp.lock() = FileStamp::read(&self.path);

        info!(field = field, path = %self.path.display(), "Updated settings");
        self.snapshot.send_replace(Arc::new(updated));
        Ok(())
    }

    /// Pretty JSON of the current snapshot
    pub fn show(&self) -> ConfResult<String> {
        let encoded = serde_json::to_string_pretty(self.current().as_ref())?;
        info!("Current settings\n{}", encoded);
        Ok(encoded)
    }

    /// Re-read the file.
    ///
    /// Returns `true` when the contents differed from the current snapshot
    /// and a new snapshot was published. On error the current snapshot is kept.
    pub fn reload(&self) -> ConfResult<bool> {
        let _guard = self.edit_lock.lock();

        *self.stamp.lock() = FileStamp::read(&self.path);
        let settings = read_settings(&self.path)?;
        if *self.current() == settings {
            return Ok(false);
        }

        self.prune_known_hosts(&settings.local_listen_addr);
        info!(path = %self.path.display(), "Settings file changed, publishing new snapshot");
        self.snapshot.send_replace(Arc::new(settings));
        Ok(true)
    }

    /// Spawn a task that polls the file every `interval` and reloads on change.
    ///
    /// File access runs on the blocking pool. Abort the returned handle to stop watching.
    pub fn spawn_watcher(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                let polled = Arc::clone(&manager);
                if let Err(e) = tokio::task::spawn_blocking(move || polled.poll_file()).await {
                    warn!(error = %e, "Settings poll did not complete");
                }
            }
        })
    }

    /// Reload when the file's stamp moved since the last read.
    ///
    /// Returns `true` when a new snapshot was published. Blocking.
    fn poll_file(&self) -> bool {
        let observed = FileStamp::read(&self.path);
        if observed == *self.stamp.lock() {
            return false;
        }

        match self.reload() {
            Ok(changed) => {
                if !changed {
                    debug!(path = %self.path.display(), "Settings file touched, contents unchanged");
                }
                changed
            }
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable settings file, keeping previous snapshot");
                false
            }
        }
    }

    fn prune_known_hosts(&self, listen_addr: &str) {
        let Some(path) = &self.known_hosts else {
            return;
        };
        if let Err(e) = known_hosts::prune(path, listen_addr) {
            warn!(error = %e, "Failed to prune known hosts");
        }
    }
}

fn read_settings(path: &Path) -> ConfResult<Settings> {
    let raw = fs::read(path).map_err(|e| ConfError::io(path, e))?;
    serde_json::from_slice(&raw).map_err(|source| ConfError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn write_settings(path: &Path, settings: &Settings) -> ConfResult<String> {
    let encoded = serde_json::to_string_pretty(settings)?;
    fs::write(path, &encoded).map_err(|e| ConfError::io(path, e))?;
    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_in(dir: &TempDir) -> ConfigManager {
        ConfigManager::open_with_known_hosts(dir.path(), Some(dir.path().join("known_hosts")))
            .unwrap()
    }

    #[test]
    fn test_open_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager = open_in(&dir);

        assert!(manager.path().exists());
        let on_disk: Settings =
            serde_json::from_str(&fs::read_to_string(manager.path()).unwrap()).unwrap();
        assert_eq!(on_disk, *manager.current());
    }

    #[test]
    fn test_open_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{"ID":"node-a","SignalingServerAddr":"http://127.0.0.1:8080"}"#,
        )
        .unwrap();

        let manager = open_in(&dir);
        assert_eq!(manager.current().id, "node-a");
        assert_eq!(manager.current().signaling_server_addr, "http://127.0.0.1:8080");
    }

    #[test]
    fn test_open_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "{ not json").unwrap();

        let result = ConfigManager::open_with_known_hosts(dir.path(), None);
        assert!(matches!(result, Err(ConfError::Parse { .. })));
    }

    #[test]
    fn test_open_prunes_known_hosts() {
        let dir = tempfile::tempdir().unwrap();
        let hosts = dir.path().join("known_hosts");
        fs::write(&hosts, "[127.0.0.1]:2222 ssh-ed25519 AAAA\ngithub.com ssh-rsa BBBB").unwrap();

        let _manager = open_in(&dir);
        assert_eq!(fs::read_to_string(&hosts).unwrap(), "github.com ssh-rsa BBBB");
    }

    #[test]
    fn test_set_persists_and_publishes() {
        let dir = tempfile::tempdir().unwrap();
        let manager = open_in(&dir);
        let mut rx = manager.subscribe();

        manager.set("LocalListenAddr", "127.0.0.1:4444").unwrap();

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().local_listen_addr, "127.0.0.1:4444");

        let reopened = open_in(&dir);
        assert_eq!(reopened.current().local_listen_addr, "127.0.0.1:4444");
    }

    #[test]
    fn test_set_prunes_previous_listen_addr() {
        let dir = tempfile::tempdir().unwrap();
        let manager = open_in(&dir);
        let hosts = dir.path().join("known_hosts");
        fs::write(&hosts, "[127.0.0.1]:2222 ssh-ed25519 AAAA").unwrap();

        manager.set("LocalListenAddr", "127.0.0.1:4444").unwrap();
        assert_eq!(fs::read_to_string(&hosts).unwrap(), "");
    }

    #[test]
    fn test_set_unknown_field_keeps_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let manager = open_in(&dir);
        let before = manager.current();

        assert!(manager.set("Nope", "1").is_err());
        assert!(Arc::ptr_eq(&before, &manager.current()));
    }

    #[test]
    fn test_show() {
        let dir = tempfile::tempdir().unwrap();
        let manager = open_in(&dir);
        let shown = manager.show().unwrap();
        assert!(shown.contains("\"LocalListenAddr\": \"127.0.0.1:2222\""));
    }

    #[test]
    fn test_reload_detects_external_edit() {
        let dir = tempfile::tempdir().unwrap();
        let manager = open_in(&dir);
        assert!(!manager.reload().unwrap());

        let mut edited = (*manager.current()).clone();
        edited.full_node = false;
        write_settings(manager.path(), &edited).unwrap();

        assert!(manager.reload().unwrap());
        assert!(!manager.current().full_node);
    }

    #[test]
    fn test_reload_bad_file_keeps_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let manager = open_in(&dir);
        let before = manager.current();

        fs::write(manager.path(), "garbage").unwrap();
        assert!(manager.reload().is_err());
        assert!(Arc::ptr_eq(&before, &manager.current()));
    }

    #[test]
    fn test_poll_file_only_reloads_on_stamp_change() {
        let dir = tempfile::tempdir().unwrap();
        let manager = open_in(&dir);
        assert!(!manager.poll_file());

        let mut edited = (*manager.current()).clone();
        edited.local_ssh_addr = "127.0.0.1:2022".to_string();
        write_settings(manager.path(), &edited).unwrap();

        assert!(manager.poll_file());
        assert_eq!(manager.current().local_ssh_addr, "127.0.0.1:2022");
        assert!(!manager.poll_file());

        fs::write(manager.path(), "garbage that is longer than before, surely").unwrap();
        assert!(!manager.poll_file());
        assert_eq!(manager.current().local_ssh_addr, "127.0.0.1:2022");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_watcher_publishes_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(open_in(&dir));
        let mut rx = manager.subscribe();
        let handle = manager.spawn_watcher(Duration::from_millis(20));

        let mut edited = (*manager.current()).clone();
        edited.signaling_server_addr = "http://rendezvous.internal.example:18080".to_string();
        write_settings(manager.path(), &edited).unwrap();

        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .expect("watcher should publish within timeout")
            .unwrap();
        assert_eq!(
            rx.borrow().signaling_server_addr,
            "http://rendezvous.internal.example:18080"
        );

        handle.abort();
    }
}

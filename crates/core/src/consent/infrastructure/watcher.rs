use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use notify::event::{EventKind, ModifyKind};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};

use crate::consent::domain::record::parse_consent_path;

/// A grant or revocation observed in the consent directory. Files are the
/// control plane: dropping a capture in grants, deleting it revokes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsentEvent {
    Added(PathBuf),
    Removed(PathBuf),
}

/// Filesystem watch over the consent directory.
///
/// Only `.jpg` files following the capture naming convention produce
/// events; sidecars and stray files are ignored. The watch is
/// non-recursive and keeps running for the life of the pipeline.
pub struct ConsentWatcher {
    // Dropping the watcher stops the native watch, so it must live as
    // long as the event receiver.
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<ConsentEvent>,
}

impl ConsentWatcher {
    pub fn new(dir: &Path) -> Result<Self, notify::Error> {
        fs::create_dir_all(dir)?;
        let (tx, rx) = mpsc::channel();

        let mut watcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                match res {
                    Ok(event) => {
                        if !relevant_kind(&event.kind) {
                            return;
                        }
                        for path in event.paths {
                            if parse_consent_path(&path).is_none() {
                                continue;
                            }
                            let event = if path.is_file() {
                                ConsentEvent::Added(path)
                            } else {
                                ConsentEvent::Removed(path)
                            };
                            let _ = tx.send(event);
                        }
                    }
                    Err(err) => log::warn!("Consent watch error: {err}"),
                }
            })?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        log::info!("Watching consent directory: {}", dir.display());

        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    /// Next event, or `None` if nothing happened within `timeout`.
    pub fn poll(&self, timeout: Duration) -> Option<ConsentEvent> {
        self.rx.recv_timeout(timeout).ok()
    }
}

fn relevant_kind(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))
    )
}

/// Capture files already present at startup, oldest first so a newer grant
/// for the same name wins when both load.
pub fn existing_captures(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut captures: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| parse_consent_path(path).is_some())
        .collect();
    captures.sort();
    Ok(captures)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_secs(3);

    #[test]
    fn test_existing_captures_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("20250102000000_bob.jpg"), b"x").unwrap();
        fs::write(dir.path().join("20250101000000_alice.jpg"), b"x").unwrap();
        fs::write(dir.path().join("20250101000000_alice.json"), b"{}").unwrap();
        fs::write(dir.path().join("readme.txt"), b"x").unwrap();

        let captures = existing_captures(dir.path()).unwrap();
        let names: Vec<_> = captures
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(
            names,
            vec!["20250101000000_alice.jpg", "20250102000000_bob.jpg"]
        );
    }

    #[test]
    fn test_existing_captures_creates_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("captures");
        assert!(existing_captures(&nested).unwrap().is_empty());
        assert!(nested.is_dir());
    }

    #[test]
    fn test_watch_sees_grant_and_revocation() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = ConsentWatcher::new(dir.path()).unwrap();

        let capture = dir.path().join("20250101000000_alice.jpg");
        fs::write(&capture, b"jpeg bytes").unwrap();
        assert_eq!(watcher.poll(WAIT), Some(ConsentEvent::Added(capture.clone())));

        fs::remove_file(&capture).unwrap();
        // Some platforms emit intermediate events; scan until the removal.
        let mut saw_removal = false;
        while let Some(event) = watcher.poll(WAIT) {
            if event == ConsentEvent::Removed(capture.clone()) {
                saw_removal = true;
                break;
            }
        }
        assert!(saw_removal);
    }

    #[test]
    fn test_watch_ignores_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = ConsentWatcher::new(dir.path()).unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        fs::write(dir.path().join("20250101000000_alice.json"), b"{}").unwrap();
        assert_eq!(watcher.poll(Duration::from_millis(300)), None);
    }
}

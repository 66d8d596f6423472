//! Filesystem change notifications for a single file.
//!
//! `FsWatcher` watches the file's parent directory (so replacing the file
//! by rename is still seen) and forwards only events that name the file.
//! Events and watcher errors arrive on separate channels; both close when
//! the `FsWatcher` is dropped.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

const CHANNEL_CAPACITY: usize = 64;

/// Failures reported by the OS watch or while setting it up.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("file watcher error: {0}")]
    Notify(#[from] notify::Error),

    #[error("{} has no file name to watch", .0.display())]
    NoFileName(PathBuf),
}

/// What happened to the watched file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Write,
    Create,
    Remove,
    Rename,
    Other,
}

impl ChangeKind {
    /// Whether the file's contents may now differ.
    pub fn is_write(self) -> bool {
        matches!(self, Self::Write | Self::Create)
    }
}

impl From<&EventKind> for ChangeKind {
    fn from(kind: &EventKind) -> Self {
        match kind {
            // A file renamed onto the target replaces it.
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Self::Create,
            EventKind::Modify(ModifyKind::Name(_)) => Self::Rename,
            EventKind::Modify(ModifyKind::Metadata(_)) => Self::Other,
            EventKind::Modify(_) => Self::Write,
            EventKind::Create(_) => Self::Create,
            EventKind::Remove(_) => Self::Remove,
            _ => Self::Other,
        }
    }
}

/// One change notification for the watched file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
}

/// Receiving half: what the reload monitor consumes.
#[derive(Debug)]
pub struct ChangeStream {
    pub events: mpsc::Receiver<ChangeEvent>,
    pub errors: mpsc::Receiver<WatchError>,
}

/// Sending half, held by whatever produces change notifications.
#[derive(Debug, Clone)]
pub struct ChangeSender {
    events: mpsc::Sender<ChangeEvent>,
    errors: mpsc::Sender<WatchError>,
}

impl ChangeStream {
    /// Bounded event and error channels, `capacity` each.
    pub fn channel(capacity: usize) -> (ChangeSender, ChangeStream) {
        let (events_tx, events_rx) = mpsc::channel(capacity);
        let (errors_tx, errors_rx) = mpsc::channel(capacity);
        (
            ChangeSender {
                events: events_tx,
                errors: errors_tx,
            },
            ChangeStream {
                events: events_rx,
                errors: errors_rx,
            },
        )
    }
}

impl ChangeSender {
    /// Returns `false` once the stream has been dropped.
    pub async fn event(&self, kind: ChangeKind, path: impl Into<PathBuf>) -> bool {
        let event = ChangeEvent {
            kind,
            path: path.into(),
        };
        self.events.send(event).await.is_ok()
    }

    /// Returns `false` once the stream has been dropped.
    pub async fn error(&self, error: WatchError) -> bool {
        self.errors.send(error).await.is_ok()
    }

    fn blocking_event(&self, event: ChangeEvent) {
        let _ = self.events.blocking_send(event);
    }

    fn blocking_error(&self, error: WatchError) {
        let _ = self.errors.blocking_send(error);
    }
}

/// Keeps the OS watch alive; dropping it closes the `ChangeStream`.
pub struct FsWatcher {
    _watcher: RecommendedWatcher,
}

impl FsWatcher {
    /// Start watching `path`. The file itself need not exist yet.
    pub fn watch(path: &Path) -> Result<(FsWatcher, ChangeStream), WatchError> {
        let file_name: OsString = path
            .file_name()
            .ok_or_else(|| WatchError::NoFileName(path.to_path_buf()))?
            .to_os_string();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (sender, stream) = ChangeStream::channel(CHANNEL_CAPACITY);

        // The callback runs on notify's own thread, outside the runtime.
        let mut watcher = notify::recommended_watcher(
            move |result: notify::Result<notify::Event>| match result {
                Ok(event) => {
                    let kind = ChangeKind::from(&event.kind);
                    for path in event
                        .paths
                        .into_iter()
                        .filter(|p| p.file_name() == Some(file_name.as_os_str()))
                    {
                        sender.blocking_event(ChangeEvent { kind, path });
                    }
                }
                Err(e) => sender.blocking_error(WatchError::Notify(e)),
            },
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        debug!(path = ?path, dir = ?dir, "watching for changes");

        Ok((FsWatcher { _watcher: watcher }, stream))
    }
}

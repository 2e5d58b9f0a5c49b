//! Polling watcher over the include files of compiled materials.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use uuid::Uuid;

use super::cache::file_time_ticks;

#[derive(Debug)]
struct WatchedInclude {
    path: String,
    /// `None` when the file did not exist at registration.
    last_seen: Option<u64>,
}

#[derive(Debug)]
struct WatchEntry {
    includes: Vec<WatchedInclude>,
    modified: Arc<AtomicBool>,
}

#[derive(Debug, Default)]
struct WatcherState {
    entries: HashMap<Uuid, WatchEntry>,
    subscribers: Vec<Sender<Uuid>>,
}

/// Tracks include files per material and reports materials whose includes changed.
///
/// Reporting a material sets its dependency-modified flag, so its next load
/// regenerates, and sends its id to every subscriber.
#[derive(Clone, Debug, Default)]
pub struct IncludeWatcher {
    state: Arc<Mutex<WatcherState>>,
}

impl IncludeWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the watched include set of `material`.
    pub fn register(&self, material: Uuid, includes: &[String], modified: Arc<AtomicBool>) {
        let includes = includes
            .iter()
            .map(|p| WatchedInclude {
                path: p.clone(),
                last_seen: file_time_ticks(Path::new(p)),
            })
            .collect();
        if let Ok(mut state) = self.state.lock() {
            state.entries.insert(material, WatchEntry { includes, modified });
        }
    }

    pub fn unregister(&self, material: Uuid) {
        if let Ok(mut state) = self.state.lock() {
            state.entries.remove(&material);
        }
    }

    pub fn is_watching(&self, material: Uuid) -> bool {
        self.state
            .lock()
            .map(|s| s.entries.contains_key(&material))
            .unwrap_or(false)
    }

    pub fn subscribe(&self) -> Receiver<Uuid> {
        let (tx, rx) = crossbeam_channel::unbounded();
        if let Ok(mut state) = self.state.lock() {
            state.subscribers.push(tx);
        }
        rx
    }

    /// Check every watched include once. Returns the materials reported this round.
    pub fn poll(&self) -> Vec<Uuid> {
        let Ok(mut state) = self.state.lock() else {
            return Vec::new();
        };
        let mut changed = Vec::new();
        for (id, entry) in state.entries.iter_mut() {
            let mut dirty = false;
            for inc in entry.includes.iter_mut() {
                let now = file_time_ticks(Path::new(&inc.path));
                if now != inc.last_seen {
                    log::info!("material {id}: include {} changed", inc.path);
                    inc.last_seen = now;
                    dirty = true;
                }
            }
            if dirty {
                entry.modified.store(true, Ordering::Release);
                changed.push(*id);
            }
        }
        changed.sort();
        for id in &changed {
            state.subscribers.retain(|tx| tx.send(*id).is_ok());
        }
        changed
    }

    /// Poll every `interval` on a background thread until the returned handle is stopped or dropped.
    pub fn spawn_poll_loop(&self, interval: Duration) -> PollLoop {
        let watcher = self.clone();
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let handle = thread::spawn(move || {
            loop {
                watcher.poll();
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    _ => break,
                }
            }
        });
        PollLoop {
            stop: Some(stop_tx),
            handle: Some(handle),
        }
    }
}

pub struct PollLoop {
    stop: Option<Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl PollLoop {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.take();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for PollLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::time::SystemTime;

    use super::*;

    fn temp_dir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("material-forge-watch-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn touching_an_include_flags_the_material() {
        let dir = temp_dir();
        let inc = dir.join("a.hlsl");
        std::fs::write(&inc, "// a").unwrap();
        let inc_path = inc.to_string_lossy().into_owned();

        let watcher = IncludeWatcher::new();
        let rx = watcher.subscribe();
        let flag = Arc::new(AtomicBool::new(false));
        let id = Uuid::new_v4();
        watcher.register(id, &[inc_path], flag.clone());
        assert!(watcher.poll().is_empty());

        let later = SystemTime::now() + Duration::from_secs(5);
        File::options().write(true).open(&inc).unwrap().set_modified(later).unwrap();
        assert_eq!(watcher.poll(), vec![id]);
        assert!(flag.load(Ordering::Acquire));
        assert_eq!(rx.try_recv().unwrap(), id);
        assert!(watcher.poll().is_empty());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn deleted_includes_count_as_changes() {
        let dir = temp_dir();
        let inc = dir.join("b.hlsl");
        std::fs::write(&inc, "// b").unwrap();
        let watcher = IncludeWatcher::new();
        let flag = Arc::new(AtomicBool::new(false));
        let id = Uuid::new_v4();
        watcher.register(id, &[inc.to_string_lossy().into_owned()], flag.clone());
        std::fs::remove_file(&inc).unwrap();
        assert_eq!(watcher.poll(), vec![id]);

        watcher.unregister(id);
        assert!(!watcher.is_watching(id));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn poll_loop_stops() {
        let watcher = IncludeWatcher::new();
        let lp = watcher.spawn_poll_loop(Duration::from_millis(1));
        thread::sleep(Duration::from_millis(5));
        lp.stop();
    }
}

//! Directory tailer for rotating iteration logs.
//!
//! Follows the highest-numbered `iter-<N>.log` in a directory, reading
//! appended bytes incrementally and feeding each complete line through the
//! wire parser. Native `notify` events on the file and its parent
//! directory are the fast path; a fixed-interval watchdog poll catches the
//! notifications some platforms coalesce or drop. All triggers funnel into
//! one control thread, so the per-file read cursor is never touched by two
//! overlapping reads.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use notify::event::{EventKind, ModifyKind};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

use crate::parse;
use crate::record::Record;

/// Watchdog poll interval; also the control thread's wakeup granularity.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Pause after a burst of change notifications before reading.
const DEBOUNCE: Duration = Duration::from_millis(30);

/// Pause between drain-to-EOF rounds to tolerate bursty writer flushes.
const SETTLE_DELAY: Duration = Duration::from_millis(75);

const DRAIN_MAX_ROUNDS: usize = 20;
const DRAIN_MAX_TIME: Duration = Duration::from_secs(5);

/// Existence retries for a rotation announced before the file was created.
const APPEAR_RETRIES: usize = 20;
const APPEAR_BACKOFF: Duration = Duration::from_millis(50);

/// One bounded rescan shortly after starting against an empty directory,
/// in case the creation event for the very first file is missed.
const INITIAL_RESCAN_DELAY: Duration = Duration::from_millis(250);

/// Events delivered to the consumer, in file order.
#[derive(Debug, Clone)]
pub enum TailEvent {
    /// A parsed record from the active iteration file.
    Record(Record),
    /// Switched to a new (strictly higher) iteration file.
    Rotation { iteration: u64, path: PathBuf },
    /// A non-fatal failure; the tailer keeps running.
    Error(String),
}

/// Internal triggers funneled into the control thread.
enum Trigger {
    /// A filesystem event touched `path`; `rename` marks rename-class
    /// events (truncation, atomic replace, external rotation).
    Fs { path: PathBuf, rename: bool },
    /// The native watcher itself failed.
    WatchError(String),
    Stop,
}

/// Handle to a running tailer. Stopping is idempotent and synchronous;
/// dropping the handle stops the tailer.
pub struct LogTailer {
    running: Arc<AtomicBool>,
    trigger_tx: Sender<Trigger>,
    thread: Option<JoinHandle<()>>,
}

impl LogTailer {
    /// Start tailing `dir`, delivering [`TailEvent`]s to `events`.
    ///
    /// Fails fast when the directory does not exist or the native watcher
    /// cannot be created; everything after startup — including a failed
    /// directory watch, which degrades to watchdog polling — is reported
    /// through the event channel instead.
    pub fn start(dir: impl Into<PathBuf>, events: Sender<TailEvent>) -> Result<Self> {
        let dir = dir.into();
        // notify reports canonical paths; normalize ours so path equality
        // against event paths holds.
        let dir = std::fs::canonicalize(&dir)
            .with_context(|| format!("log directory not accessible: {}", dir.display()))?;

        let (trigger_tx, trigger_rx) = mpsc::channel::<Trigger>();
        let running = Arc::new(AtomicBool::new(true));

        let watcher = build_watcher(trigger_tx.clone())?;
        let state = TailerState {
            dir,
            watcher,
            cursor: None,
            iteration: None,
            rescan_at: None,
            dir_watched: false,
            events,
            trigger_rx,
            running: running.clone(),
        };
        let thread = thread::Builder::new()
            .name("tailview-tailer".to_string())
            .spawn(move || state.run())
            .context("failed to spawn tailer thread")?;

        Ok(Self {
            running,
            trigger_tx,
            thread: Some(thread),
        })
    }

    /// Stop tailing and release all watches and timers. Safe to call any
    /// number of times.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.trigger_tx.send(Trigger::Stop);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LogTailer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_watcher(trigger_tx: Sender<Trigger>) -> Result<RecommendedWatcher> {
    let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(event) => {
                let rename = matches!(
                    event.kind,
                    EventKind::Modify(ModifyKind::Name(_)) | EventKind::Remove(_)
                );
                for path in event.paths {
                    let _ = trigger_tx.send(Trigger::Fs { path, rename });
                }
            }
            Err(e) => {
                let _ = trigger_tx.send(Trigger::WatchError(e.to_string()));
            }
        }
    })
    .context("failed to create filesystem watcher")?;
    Ok(watcher)
}

/// Parse an iteration number out of an `iter-<N>.log` file name.
fn parse_iteration(name: &str) -> Option<u64> {
    let digits = name.strip_prefix("iter-")?.strip_suffix(".log")?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Highest iteration file currently in `dir`, if any.
fn scan_highest_iteration(dir: &Path) -> Option<(u64, PathBuf)> {
    let entries = std::fs::read_dir(dir).ok()?;
    entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name();
            let n = parse_iteration(name.to_str()?)?;
            Some((n, entry.path()))
        })
        .max_by_key(|(n, _)| *n)
}

/// Per-file incremental read state. Mutated only inside the control
/// thread's serialized read path.
struct ReadCursor {
    path: PathBuf,
    /// Next byte to read; monotonic except on detected truncation.
    offset: u64,
    /// Undecoded trailing bytes of a multi-byte character split at the
    /// previous read boundary.
    carry: Vec<u8>,
    /// Trailing incomplete text line carried between reads.
    remainder: String,
}

impl ReadCursor {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            offset: 0,
            carry: Vec::new(),
            remainder: String::new(),
        }
    }

    /// Back to the start of the file, dropping all carried state.
    fn reset(&mut self) {
        self.offset = 0;
        self.carry.clear();
        self.remainder.clear();
    }

    /// Decode new bytes, re-assembling a character split at the previous
    /// boundary and carrying any newly split trailing character forward.
    /// Invalid byte sequences decode as U+FFFD rather than failing.
    fn decode(&mut self, bytes: &[u8]) -> String {
        let mut buf = std::mem::take(&mut self.carry);
        buf.extend_from_slice(bytes);

        let mut out = String::with_capacity(buf.len());
        let mut rest: &[u8] = &buf;
        loop {
            match std::str::from_utf8(rest) {
                Ok(s) => {
                    out.push_str(s);
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    if let Ok(s) = std::str::from_utf8(&rest[..valid]) {
                        out.push_str(s);
                    }
                    match e.error_len() {
                        // Genuinely invalid bytes mid-stream.
                        Some(bad) => {
                            out.push('\u{FFFD}');
                            rest = &rest[valid + bad..];
                        }
                        // Incomplete trailing character; carry it.
                        None => {
                            self.carry = rest[valid..].to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }
}

struct TailerState {
    dir: PathBuf,
    watcher: RecommendedWatcher,
    cursor: Option<ReadCursor>,
    /// Highest iteration ever attached; only moves forward.
    iteration: Option<u64>,
    /// Deadline for a scheduled directory rescan.
    rescan_at: Option<Instant>,
    /// Whether the native directory watch is armed. While it is not, the
    /// watchdog retries it and rescans for rotations by hand.
    dir_watched: bool,
    events: Sender<TailEvent>,
    trigger_rx: Receiver<Trigger>,
    running: Arc<AtomicBool>,
}

impl TailerState {
    fn run(mut self) {
        if let Err(e) = self.watch_dir() {
            // Degraded but alive: the watchdog still polls the active file,
            // rescans for rotations, and retries the watch every tick.
            warn!(dir = %self.dir.display(), error = %e, "directory watch failed, polling only");
            self.emit_error(&e);
        }

        match scan_highest_iteration(&self.dir) {
            Some((n, path)) => self.attach(n, path),
            None => {
                debug!(dir = %self.dir.display(), "no iteration files yet, watching directory");
                self.rescan_at = Some(Instant::now() + INITIAL_RESCAN_DELAY);
            }
        }

        while self.running.load(Ordering::SeqCst) {
            match self.trigger_rx.recv_timeout(POLL_INTERVAL) {
                Ok(Trigger::Stop) => break,
                Ok(trigger) => self.handle_trigger(trigger),
                Err(RecvTimeoutError::Timeout) => self.poll_tick(),
                Err(RecvTimeoutError::Disconnected) => break,
            }
            if let Some(at) = self.rescan_at {
                if Instant::now() >= at {
                    self.rescan_at = None;
                    self.rescan();
                }
            }
        }
        // Watcher drops here, releasing all native subscriptions before
        // stop()'s join returns.
    }

    fn handle_trigger(&mut self, trigger: Trigger) {
        match trigger {
            Trigger::Stop => {
                self.running.store(false, Ordering::SeqCst);
            }
            Trigger::WatchError(detail) => {
                let _ = self
                    .events
                    .send(TailEvent::Error(format!("watch error: {detail}")));
            }
            Trigger::Fs { path, rename } => self.handle_fs_event(path, rename),
        }
    }

    fn handle_fs_event(&mut self, path: PathBuf, rename: bool) {
        let is_active = self
            .cursor
            .as_ref()
            .is_some_and(|cursor| cursor.path == path);
        if is_active {
            if rename {
                // Truncation, atomic replace, or external rotation. Drain
                // whatever is still readable, then re-arm: some platforms
                // stop delivering change events on the file afterwards.
                debug!(path = %path.display(), "rename-class event on active file");
                self.read_active();
                self.rearm_file_watch();
            } else {
                self.debounced_read();
            }
            return;
        }

        // A sibling appeared or changed; only iteration-named files are
        // interesting, and only strictly higher numbers.
        if path.parent() == Some(self.dir.as_path()) {
            let candidate = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(parse_iteration);
            if let Some(n) = candidate {
                self.maybe_switch(n, path);
            }
        }
    }

    /// Arm the directory watch if it is not armed yet.
    fn watch_dir(&mut self) -> Result<()> {
        if self.dir_watched {
            return Ok(());
        }
        self.watcher
            .watch(&self.dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {}", self.dir.display()))?;
        self.dir_watched = true;
        Ok(())
    }

    /// Watchdog: read when the active file's size moved away from our
    /// offset; rescan while nothing is attached yet.
    fn poll_tick(&mut self) {
        if !self.dir_watched {
            if let Err(e) = self.watch_dir() {
                debug!(error = %e, "directory watch retry failed");
            }
            // Without native directory events a rotation is only visible
            // by rescanning. The no-cursor path below rescans anyway.
            if self.cursor.is_some() {
                self.rescan();
            }
        }
        let Some((size, offset)) = self.cursor.as_ref().map(|cursor| {
            let size = std::fs::metadata(&cursor.path)
                .map(|m| m.len())
                .unwrap_or(cursor.offset);
            (size, cursor.offset)
        }) else {
            self.rescan();
            return;
        };
        if size != offset {
            debug!(size, offset, "watchdog poll triggered read");
            self.read_active();
        }
    }

    fn rescan(&mut self) {
        if let Some((n, path)) = scan_highest_iteration(&self.dir) {
            if self.iteration.is_none_or(|current| n > current) {
                debug!(iteration = n, "rescan found newer iteration");
                self.attach(n, path);
            }
        }
    }

    /// Let a notification burst settle, coalesce the queued change
    /// triggers for the active file, then read once.
    fn debounced_read(&mut self) {
        thread::sleep(DEBOUNCE);
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        let mut deferred = Vec::new();
        while let Ok(trigger) = self.trigger_rx.try_recv() {
            let coalesce = matches!(
                &trigger,
                Trigger::Fs { path, rename: false }
                    if self.cursor.as_ref().is_some_and(|cursor| cursor.path == *path)
            );
            if !coalesce {
                deferred.push(trigger);
            }
        }
        self.read_active();
        for trigger in deferred {
            if !self.running.load(Ordering::SeqCst) {
                return;
            }
            self.handle_trigger(trigger);
        }
    }

    /// Switch to iteration `n` once its file actually exists.
    ///
    /// The creation notification can fire before the file is on disk, so
    /// existence is confirmed with bounded retries. A still-higher
    /// iteration announced during the wait supersedes this one. On retry
    /// exhaustion the switch is abandoned and a rescan scheduled; the old
    /// file keeps being followed in the meantime.
    fn maybe_switch(&mut self, n: u64, path: PathBuf) {
        if self.iteration.is_some_and(|current| n <= current) {
            debug!(candidate = n, active = ?self.iteration, "stale iteration notification ignored");
            return;
        }

        let mut target = (n, path);
        let mut deferred = Vec::new();
        for attempt in 0..APPEAR_RETRIES {
            if !self.running.load(Ordering::SeqCst) {
                return;
            }
            // Absorb queued triggers; a higher pending iteration wins.
            while let Ok(trigger) = self.trigger_rx.try_recv() {
                let higher = match &trigger {
                    Trigger::Fs { path, .. } => path
                        .file_name()
                        .and_then(|name| name.to_str())
                        .and_then(parse_iteration)
                        .filter(|m| *m > target.0)
                        .map(|m| (m, path.clone())),
                    _ => None,
                };
                match higher {
                    Some(next) => target = next,
                    None => deferred.push(trigger),
                }
            }

            if target.1.exists() {
                let (n, path) = target;
                self.attach(n, path);
                for trigger in deferred {
                    self.handle_trigger(trigger);
                }
                return;
            }
            debug!(iteration = target.0, attempt, "announced iteration file not on disk yet");
            thread::sleep(APPEAR_BACKOFF);
        }

        warn!(
            iteration = target.0,
            "iteration file never appeared, keeping current file and scheduling rescan"
        );
        self.rescan_at = Some(Instant::now() + POLL_INTERVAL);
        for trigger in deferred {
            self.handle_trigger(trigger);
        }
    }

    /// Take a final read of the outgoing file, close its watch, reset the
    /// cursor, announce the rotation, drain to EOF, then follow the new
    /// file.
    fn attach(&mut self, n: u64, path: PathBuf) {
        if self.cursor.is_some() {
            // Last lines of the outgoing iteration can land right before
            // the switch; emit them ahead of the rotation notice.
            self.read_active();
        }
        if let Some(cursor) = &self.cursor {
            let _ = self.watcher.unwatch(&cursor.path);
        }
        self.iteration = Some(n);
        self.cursor = Some(ReadCursor::new(path.clone()));
        debug!(iteration = n, path = %path.display(), "attached to iteration file");
        let _ = self.events.send(TailEvent::Rotation {
            iteration: n,
            path: path.clone(),
        });

        self.drain_to_eof();

        if self.running.load(Ordering::SeqCst) {
            // The file can legitimately vanish right after the drain (end
            // of run); a failed watch is not worth surfacing.
            if let Err(e) = self.watcher.watch(&path, RecursiveMode::NonRecursive) {
                debug!(path = %path.display(), error = %e, "could not watch iteration file");
            }
        }
    }

    /// Re-arm the active file's watch after a rename-class event.
    fn rearm_file_watch(&mut self) {
        if let Some(cursor) = &self.cursor {
            let _ = self.watcher.unwatch(&cursor.path);
            if let Err(e) = self.watcher.watch(&cursor.path, RecursiveMode::NonRecursive) {
                debug!(path = %cursor.path.display(), error = %e, "could not re-arm file watch");
            }
        }
    }

    /// Catch up fully with the file's current end: read, wait for the
    /// writer to settle, and stop once the size is stable or the round /
    /// time budget runs out.
    fn drain_to_eof(&mut self) {
        let started = Instant::now();
        for _ in 0..DRAIN_MAX_ROUNDS {
            if !self.running.load(Ordering::SeqCst) {
                return;
            }
            self.read_active();
            let reached = match &self.cursor {
                Some(cursor) => cursor.offset,
                None => return,
            };
            if started.elapsed() >= DRAIN_MAX_TIME {
                warn!("drain-to-eof time budget exhausted");
                return;
            }
            thread::sleep(SETTLE_DELAY);
            if !self.running.load(Ordering::SeqCst) {
                return;
            }
            let size = self
                .cursor
                .as_ref()
                .and_then(|cursor| std::fs::metadata(&cursor.path).ok())
                .map(|m| m.len())
                .unwrap_or(reached);
            if size == reached {
                return;
            }
        }
        warn!("drain-to-eof round budget exhausted");
    }

    /// One serialized read of the active file; errors become non-fatal
    /// event notifications.
    fn read_active(&mut self) {
        let Self { cursor, events, .. } = self;
        let Some(cursor) = cursor.as_mut() else {
            return;
        };
        if let Err(e) = read_new(cursor, events) {
            let _ = events.send(TailEvent::Error(format!("{e:#}")));
        }
    }

    fn emit_error(&self, e: &anyhow::Error) {
        let _ = self.events.send(TailEvent::Error(format!("{e:#}")));
    }
}

/// Read exactly the byte range `[offset, size)`, decode incrementally,
/// and emit the records from every complete line.
///
/// A vanished file is expected once the producing process finishes and
/// cleans up, and is fully suppressed. A file shorter than the offset was
/// truncated: the cursor resets and reading resumes from the start.
fn read_new(cursor: &mut ReadCursor, events: &Sender<TailEvent>) -> Result<()> {
    let mut file = match File::open(&cursor.path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("failed to open {}", cursor.path.display()));
        }
    };

    let size = file
        .metadata()
        .with_context(|| format!("failed to stat {}", cursor.path.display()))?
        .len();
    if size < cursor.offset {
        debug!(path = %cursor.path.display(), size, offset = cursor.offset, "file shrank, treating as truncation");
        cursor.reset();
    }
    if size == cursor.offset {
        return Ok(());
    }

    file.seek(SeekFrom::Start(cursor.offset))
        .with_context(|| format!("failed to seek in {}", cursor.path.display()))?;

    let mut new_bytes = Vec::with_capacity((size - cursor.offset) as usize);
    let n = file
        .take(size - cursor.offset)
        .read_to_end(&mut new_bytes)
        .with_context(|| format!("failed to read {}", cursor.path.display()))?;
    cursor.offset += n as u64;

    let decoded = cursor.decode(&new_bytes);
    let mut chunk = std::mem::take(&mut cursor.remainder);
    chunk.push_str(&decoded);

    let (records, remainder) = parse::parse_chunk(&chunk);
    cursor.remainder = remainder;
    for record in records {
        let _ = events.send(TailEvent::Record(record));
    }
    Ok(())
}

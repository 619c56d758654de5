//! Incremental newline index over a [`MappedFile`](io::mmap::MappedFile).
//!
//! A single background thread walks the file in fixed-size chunks and appends
//! the offset of every newline it finds. Readers can query the index at any
//! time and see a consistent, append-only prefix of the final result:
//! if `indexed_up_to() == k`, every newline before byte `k` is recorded and
//! none after it.
pub mod listener;
pub(crate) mod scanner;

pub use listener::{IndexEvent, IndexListener};

pub const DEFAULT_CHUNK_SIZE: usize = 500_000;
pub const DEFAULT_SCAN_WINDOW: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexOptions {
    /// Bytes scanned per step; kept even so UTF-16 units never straddle chunks.
    pub chunk_size: usize,
    /// Minimum wall time between two progress notifications.
    pub progress_interval: std::time::Duration,
    /// Pause after every chunk so the scan never monopolises a core.
    pub yield_interval: std::time::Duration,
    /// Window used by [`LineIndex::scan_lines_from`].
    pub scan_window: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            progress_interval: std::time::Duration::from_millis(150),
            yield_interval: std::time::Duration::from_millis(5),
            scan_window: DEFAULT_SCAN_WINDOW,
        }
    }
}

impl IndexOptions {
    /// Rounds sizes up to an even, non-zero number of bytes.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.chunk_size = round_up_even(self.chunk_size);
        self.scan_window = round_up_even(self.scan_window);
        self
    }
}

#[inline]
fn round_up_even(n: usize) -> usize {
    n.max(2).saturating_add(1) & !1
}

/// A line found by [`LineIndex::scan_lines_from`]: its text and the byte range
/// it occupies, newline excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedLine {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Default)]
struct ScanState {
    /// Strictly increasing; for UTF-16 each entry is the start of the unit.
    newlines: Vec<usize>,
    indexed_up_to: usize,
    finished: bool,
    running: bool,
}

/// State shared between the index handle and its scanner thread.
struct Shared {
    state: std::sync::Mutex<ScanState>,
    /// Signalled whenever the scanner stops running.
    idle: std::sync::Condvar,
    stop: std::sync::atomic::AtomicBool,
    listeners: std::sync::Mutex<Vec<std::sync::Arc<dyn IndexListener>>>,
}

impl Shared {
    /// The guarded data is append-only, so a panic elsewhere never leaves it
    /// half-written; keep serving it.
    fn lock(&self) -> std::sync::MutexGuard<'_, ScanState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Calls every listener without holding the registry lock, so a listener
    /// may register others from inside its callback.
    fn notify(&self, event: &IndexEvent) {
        let listeners = self
            .listeners
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();

        for listener in &listeners {
            listener.on_update(event);
        }
    }
}

/// Clears `running` if the scanner thread unwinds, so `wait()` cannot hang.
struct PanicGuard<'a> {
    shared: &'a Shared,
}

impl Drop for PanicGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.shared.lock().running = false;
            self.shared.idle.notify_all();
        }
    }
}

pub struct LineIndex {
    file: std::sync::Arc<io::mmap::MappedFile>,
    options: IndexOptions,
    shared: std::sync::Arc<Shared>,
    worker: std::sync::Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl std::fmt::Debug for LineIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock();

        f.debug_struct("LineIndex")
            .field("path", &self.file.path())
            .field("newlines", &state.newlines.len())
            .field("indexed_up_to", &state.indexed_up_to)
            .field("finished", &state.finished)
            .field("running", &state.running)
            .finish_non_exhaustive()
    }
}

/*

====================
===== CREATION =====
====================

*/

impl LineIndex {
    /// Creates an index with the default timings and the given chunk size.
    /// Nothing is scanned until [`LineIndex::start`].
    #[must_use]
    pub fn new(file: std::sync::Arc<io::mmap::MappedFile>, chunk_size: usize) -> Self {
        Self::with_options(
            file,
            IndexOptions {
                chunk_size,
                ..IndexOptions::default()
            },
        )
    }

    #[must_use]
    pub fn with_options(file: std::sync::Arc<io::mmap::MappedFile>, options: IndexOptions) -> Self {
        Self {
            file,
            options: options.normalized(),
            shared: std::sync::Arc::new(Shared {
                state: std::sync::Mutex::new(ScanState::default()),
                idle: std::sync::Condvar::new(),
                stop: std::sync::atomic::AtomicBool::new(false),
                listeners: std::sync::Mutex::new(Vec::new()),
            }),
            worker: std::sync::Mutex::new(None),
        }
    }

    /// Registers a listener for progress and completion notifications.
    pub fn on_update(&self, listener: impl IndexListener + 'static) {
        self.on_update_shared(std::sync::Arc::new(listener));
    }

    /// Like [`LineIndex::on_update`], for a listener the caller keeps a handle to.
    pub fn on_update_shared(&self, listener: std::sync::Arc<dyn IndexListener>) {
        self.shared
            .listeners
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(listener);
    }
}

/*

====================
===== SCANNING =====
====================

*/

impl LineIndex {
    /// Starts the background scan, or resumes a stopped one where it left off.
    ///
    /// An empty file is marked finished on the spot and no thread is spawned.
    /// Calling `start` on an index that already started does nothing.
    ///
    /// # Errors
    ///
    /// [`CoreError::Spawn`](crate::errors::CoreError::Spawn) if the OS refuses to create the scanner thread.
    pub fn start(&self) -> crate::errors::CoreResult<()> {
        let resume_from = {
            let mut state = self.shared.lock();

            if state.running {
                // The scanner checks the flag under this lock, so clearing it
                // here either keeps the live scanner going or comes after it
                // has already marked itself stopped.
                if self
                    .shared
                    .stop
                    .swap(false, std::sync::atomic::Ordering::AcqRel)
                {
                    tracing::debug!(path = %self.file.path().display(), "cancelled pending stop");
                } else {
                    tracing::warn!(path = %self.file.path().display(), "line index already started");
                }

                return Ok(());
            }

            if state.finished {
                tracing::warn!(path = %self.file.path().display(), "line index already finished");

                return Ok(());
            }

            if self.file.is_empty() {
                state.finished = true;
                drop(state);

                tracing::debug!(path = %self.file.path().display(), "empty file, nothing to index");
                self.shared.notify(&IndexEvent::Finished { lines: 1 });

                return Ok(());
            }

            state.running = true;
            self.shared
                .stop
                .store(false, std::sync::atomic::Ordering::Release);
            state.indexed_up_to
        };

        let file = std::sync::Arc::clone(&self.file);
        let shared = std::sync::Arc::clone(&self.shared);
        let options = self.options;
        let spawned = std::thread::Builder::new()
            .name("line-index".into())
            .spawn(move || run_scan(&file, &shared, options, resume_from));

        match spawned {
            Ok(handle) => {
                *self
                    .worker
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(handle);

                Ok(())
            }
            Err(e) => {
                self.shared.lock().running = false;
                self.shared.idle.notify_all();

                Err(crate::errors::CoreError::Spawn(e))
            }
        }
    }

    /// Asks the scanner to stop after its current chunk. The index keeps what
    /// was found so far and stays unfinished. A later [`LineIndex::start`]
    /// resumes it, or cancels the request if the scanner has not stopped yet.
    pub fn stop(&self) {
        self.shared
            .stop
            .store(true, std::sync::atomic::Ordering::Release);
    }

    /// Blocks until the scanner is no longer running (finished or stopped).
    /// Returns immediately if no scan was started.
    pub fn wait(&self) {
        let mut state = self.shared.lock();

        while state.running {
            state = self
                .shared
                .idle
                .wait(state)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }
}

fn run_scan(file: &io::mmap::MappedFile, shared: &Shared, options: IndexOptions, resume_from: usize) {
    let _guard = PanicGuard { shared };
    let size = file.len();
    let encoding = file.encoding();
    let started = std::time::Instant::now();
    let mut last_emit: Option<std::time::Instant> = None;
    let mut pos = resume_from;
    let mut found = Vec::new();

    tracing::debug!(
        path = %file.path().display(),
        bytes = size,
        from = pos,
        chunk = options.chunk_size,
        "line index scan started"
    );

    while pos < size {
        let end = std::cmp::min(size, pos.saturating_add(options.chunk_size));

        found.clear();
        scanner::find_newlines(encoding, file.slice(pos, end), pos, &mut found);

        let lines = {
            let mut state = shared.lock();

            state.newlines.extend_from_slice(&found);
            state.indexed_up_to = end;

            // Checked under the lock so that `start` sees either a cleared
            // flag or a scanner that is no longer running.
            if end < size && shared.stop.load(std::sync::atomic::Ordering::Acquire) {
                state.running = false;
                drop(state);
                shared.idle.notify_all();

                tracing::debug!(indexed_up_to = end, "line index scan stopped");

                return;
            }

            state.newlines.len() + 1
        };

        pos = end;

        if last_emit.is_none_or(|at| at.elapsed() >= options.progress_interval) {
            shared.notify(&IndexEvent::Progress {
                indexed_up_to: end,
                lines,
            });
            last_emit = Some(std::time::Instant::now());
        }

        if !options.yield_interval.is_zero() {
            std::thread::sleep(options.yield_interval);
        }
    }

    let lines = {
        let mut state = shared.lock();

        state.finished = true;
        state.running = false;
        state.newlines.len() + 1
    };

    shared.idle.notify_all();

    tracing::info!(
        path = %file.path().display(),
        lines,
        elapsed_ms = started.elapsed().as_millis(),
        "line index finished"
    );
    shared.notify(&IndexEvent::Finished { lines });
}

/*

=================
===== QUERY =====
=================

*/

impl LineIndex {
    /// Newlines found so far, plus one: an unterminated last line always counts.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.shared.lock().newlines.len() + 1
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.shared.lock().finished
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    /// Highest byte offset the scanner has processed.
    #[must_use]
    pub fn indexed_up_to(&self) -> usize {
        self.shared.lock().indexed_up_to
    }

    /// Scanned fraction of the file, in `[0, 1]`.
    #[must_use]
    pub fn progress(&self) -> f64 {
        let state = self.shared.lock();

        if state.finished || self.file.is_empty() {
            return 1.0;
        }

        #[allow(clippy::cast_precision_loss)]
        let fraction = state.indexed_up_to as f64 / self.file.len() as f64;

        fraction.clamp(0.0, 1.0)
    }

    /// Byte offset where `line_no` starts, or `None` if the scanner has not
    /// reached that line yet. Line 0 starts right after any BOM.
    #[must_use]
    pub fn line_start_offset(&self, line_no: usize) -> Option<usize> {
        if line_no == 0 {
            return Some(self.file.bom_len());
        }

        let state = self.shared.lock();

        state
            .newlines
            .get(line_no - 1)
            .map(|offset| offset + self.file.encoding().newline_len())
    }

    /// A copy of the newline offsets recorded so far.
    #[must_use]
    pub fn newline_offsets(&self) -> Vec<usize> {
        self.shared.lock().newlines.clone()
    }

    /// Length in bytes of one encoded newline for this file.
    #[inline]
    #[must_use]
    pub fn newline_len(&self) -> usize {
        self.file.encoding().newline_len()
    }

    #[inline]
    #[must_use]
    pub fn file(&self) -> &std::sync::Arc<io::mmap::MappedFile> {
        &self.file
    }

    #[inline]
    #[must_use]
    pub fn options(&self) -> &IndexOptions {
        &self.options
    }
}

/*

=============================
===== ON-DEMAND SCANNING =====
=============================

*/

impl LineIndex {
    /// Reads up to `max_lines` lines starting at `start_offset`, without
    /// touching the index.
    ///
    /// Meant for a reader that jumped ahead of the background scan. A line
    /// longer than the scan window comes back in window-sized pieces.
    #[must_use]
    pub fn scan_lines_from(&self, start_offset: usize, max_lines: usize) -> Vec<ScannedLine> {
        let size = self.file.len();
        let encoding = self.file.encoding();
        let unit = encoding.unit_len();
        let mut pos = start_offset.next_multiple_of(unit);
        let mut lines = Vec::new();

        while lines.len() < max_lines && pos < size {
            let window_end = std::cmp::min(size, pos.saturating_add(self.options.scan_window));
            let window = self.file.slice(pos, window_end);

            match scanner::find_first_newline(encoding, window, pos) {
                Some(newline) => {
                    lines.push(ScannedLine {
                        text: encoding.decode_lossy(self.file.slice(pos, newline)),
                        start: pos,
                        end: newline,
                    });
                    pos = newline + encoding.newline_len();
                }
                None => {
                    lines.push(ScannedLine {
                        text: encoding.decode_lossy(window),
                        start: pos,
                        end: window_end,
                    });
                    pos = window_end;
                }
            }
        }

        lines
    }

    /// Byte offset where the line starting at `start` ends (newline excluded),
    /// searching forward in the mapped bytes. End of file if no newline follows.
    #[must_use]
    pub fn find_line_end(&self, start: usize) -> usize {
        let size = self.file.len();
        let encoding = self.file.encoding();
        let mut pos = start.next_multiple_of(encoding.unit_len());

        while pos < size {
            let window_end = std::cmp::min(size, pos.saturating_add(self.options.scan_window));

            if let Some(newline) =
                scanner::find_first_newline(encoding, self.file.slice(pos, window_end), pos)
            {
                return newline;
            }

            pos = window_end;
        }

        size
    }
}

impl Drop for LineIndex {
    fn drop(&mut self) {
        self.stop();

        let handle = self
            .worker
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();

        if let Some(handle) = handle
            && handle.join().is_err()
        {
            tracing::warn!("line index scanner panicked");
        }
    }
}

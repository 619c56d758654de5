pub mod errors;
pub mod progress;

pub use errors::{StateError, StateResult};
pub use progress::Progress;

/// One open file: its buffer, the settings it was opened with, and the
/// listeners that follow its indexing.
///
/// - [`buffer`](EditorState::buffer) answers line queries and holds edits.
/// - [`save`](EditorState::save) swaps the edited text into place and
///   re-opens it, so the session continues on what is now on disk.
pub struct EditorState {
    buffer: editor_core::text::VirtualTextBuffer,
    config: editor_core::config::EditorConfig,
    path: std::path::PathBuf,
    listeners: Vec<std::sync::Arc<dyn editor_core::line_index::IndexListener>>,
}

impl std::fmt::Debug for EditorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorState")
            .field("path", &self.path)
            .field("buffer", &self.buffer)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

/*

=============================
===== OPEN, SAVE, CLOSE =====
=============================

*/

impl EditorState {
    /// Maps `path` and prepares its index. Indexing starts with
    /// [`EditorState::start_indexing`], so listeners can subscribe first.
    ///
    /// # Errors
    ///
    /// [`StateError::Core`] if the file cannot be opened or mapped.
    pub fn open(
        path: impl AsRef<std::path::Path>,
        config: editor_core::config::EditorConfig,
    ) -> StateResult<Self> {
        let path = path.as_ref().to_path_buf();
        let buffer = load(&path, &config)?;

        Ok(Self {
            buffer,
            config,
            path,
            listeners: Vec::new(),
        })
    }

    /// Registers `listener` on the current index and on every index created
    /// by a later [`EditorState::save`].
    pub fn subscribe(&mut self, listener: impl editor_core::line_index::IndexListener + 'static) {
        let listener: std::sync::Arc<dyn editor_core::line_index::IndexListener> =
            std::sync::Arc::new(listener);

        self.buffer
            .index()
            .on_update_shared(std::sync::Arc::clone(&listener));
        self.listeners.push(listener);
    }

    /// # Errors
    ///
    /// [`StateError::Core`] if the scanner thread cannot be spawned.
    pub fn start_indexing(&self) -> StateResult<()> {
        self.buffer.index().start()?;

        Ok(())
    }

    /// Writes the buffer to `<path>.new`, moves the current file to
    /// `<path>.backup`, moves the new file into place, then re-opens it.
    ///
    /// The file at `path` is never truncated: if any step fails, the previous
    /// contents are still at `path` or at `<path>.backup`.
    ///
    /// # Errors
    ///
    /// - [`StateError::Save`] naming the file whose write or rename failed.
    /// - [`StateError::Core`] if the saved file cannot be re-opened.
    pub fn save(&mut self) -> StateResult<()> {
        let new_path = sibling(&self.path, "new");
        let backup_path = sibling(&self.path, "backup");

        self.buffer
            .save_to_file(&new_path)
            .map_err(|source| StateError::Save {
                path: new_path.clone(),
                source,
            })?;

        if self.path.exists()
            && let Err(source) = std::fs::rename(&self.path, &backup_path)
        {
            tracing::warn!(
                path = %self.path.display(),
                backup = %backup_path.display(),
                saved = %new_path.display(),
                error = %source,
                "could not back up the original, edits left in the saved copy"
            );

            return Err(StateError::Save {
                path: backup_path,
                source,
            });
        }

        std::fs::rename(&new_path, &self.path).map_err(|source| StateError::Save {
            path: self.path.clone(),
            source,
        })?;

        let buffer = load(&self.path, &self.config)?;

        for listener in &self.listeners {
            buffer
                .index()
                .on_update_shared(std::sync::Arc::clone(listener));
        }
        buffer.index().start()?;

        tracing::info!(
            path = %self.path.display(),
            backup = %backup_path.display(),
            edited = self.buffer.edited_lines().len(),
            "saved and re-opened"
        );

        self.buffer = buffer;

        Ok(())
    }

    /// Stops indexing and releases the mapping.
    ///
    /// # Errors
    ///
    /// [`StateError::Busy`] if another handle to the file or its index is
    /// still alive; the mapping is then released when that handle drops.
    pub fn close(self) -> StateResult<()> {
        let (file, index) = self.buffer.into_parts();

        drop(index);

        let mut file = std::sync::Arc::try_unwrap(file).map_err(|_| StateError::Busy {
            path: self.path.clone(),
        })?;

        file.close();

        Ok(())
    }
}

/*

=================
===== QUERY =====
=================

*/

impl EditorState {
    #[must_use]
    pub fn is_indexed(&self) -> bool {
        self.buffer.index().is_finished()
    }

    #[must_use]
    pub fn progress(&self) -> Progress {
        let lines = self.buffer.line_count();

        if !self.is_indexed() {
            return Progress::Indexing {
                percent: self.buffer.index().progress() * 100.0,
                lines,
            };
        }

        let name = self.path.file_name().map_or_else(
            || self.path.display().to_string(),
            |name| name.to_string_lossy().into_owned(),
        );

        Progress::Ready {
            name,
            lines,
            bytes: self.buffer.file().len(),
            encoding: self.buffer.encoding(),
            modified: self.buffer.is_dirty(),
        }
    }

    #[inline]
    #[must_use]
    pub fn buffer(&self) -> &editor_core::text::VirtualTextBuffer {
        &self.buffer
    }

    #[inline]
    pub fn buffer_mut(&mut self) -> &mut editor_core::text::VirtualTextBuffer {
        &mut self.buffer
    }

    #[inline]
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &editor_core::config::EditorConfig {
        &self.config
    }
}

fn load(
    path: &std::path::Path,
    config: &editor_core::config::EditorConfig,
) -> StateResult<editor_core::text::VirtualTextBuffer> {
    let file = std::sync::Arc::new(io::mmap::MappedFile::open_with(
        path,
        config.encoding,
        &config.detection,
    )?);
    let index = std::sync::Arc::new(editor_core::line_index::LineIndex::with_options(
        std::sync::Arc::clone(&file),
        config.index_options(),
    ));

    Ok(editor_core::text::VirtualTextBuffer::with_config(
        file, index, config,
    ))
}

/// `notes.txt` + `"new"` -> `notes.txt.new`.
fn sibling(path: &std::path::Path, suffix: &str) -> std::path::PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    std::path::PathBuf::from(name)
}

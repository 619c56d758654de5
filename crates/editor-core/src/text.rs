use std::io::Write;

/// Decoded lines kept by default.
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// # How a line is answered
///
/// - Overlay first: an edited line lives in memory as a [`Rope`](crate::rope::Rope) and always wins.
/// - Cache second: recently decoded, unedited lines are kept in a bounded LRU.
/// - Mapped bytes last: the [`LineIndex`](crate::line_index::LineIndex) resolves the byte range, the
///   mapped file supplies the bytes, and the file's encoding decodes them.
///
/// The mapped file is never written. Edits only reach disk through [`VirtualTextBuffer::save_to_file`].
#[derive(Debug)]
pub struct VirtualTextBuffer {
    file: std::sync::Arc<io::mmap::MappedFile>,
    index: std::sync::Arc<crate::line_index::LineIndex>,

    /// Line number -> replacement text.
    edits: std::collections::HashMap<usize, crate::rope::Rope>,
    cache: lru::LruCache<usize, String>,

    /// Tracks if the buffer has unsaved changes.
    is_dirty: bool,

    leaf_size: usize,
    bytes_per_line: usize,
}

/*

===========================
===== CREATION & SAVE =====
===========================

*/

impl VirtualTextBuffer {
    /// Wraps an existing file and index with the default settings.
    #[must_use]
    pub fn new(
        file: std::sync::Arc<io::mmap::MappedFile>,
        index: std::sync::Arc<crate::line_index::LineIndex>,
    ) -> Self {
        Self::with_config(file, index, &crate::config::EditorConfig::default())
    }

    #[must_use]
    pub fn with_config(
        file: std::sync::Arc<io::mmap::MappedFile>,
        index: std::sync::Arc<crate::line_index::LineIndex>,
        config: &crate::config::EditorConfig,
    ) -> Self {
        let capacity = std::num::NonZeroUsize::new(config.line_cache_capacity)
            .unwrap_or(std::num::NonZeroUsize::MIN);
        let bytes_per_line = config.bytes_per_line(file.encoding());

        Self {
            file,
            index,
            edits: std::collections::HashMap::new(),
            cache: lru::LruCache::new(capacity),
            is_dirty: false,
            leaf_size: config.rope_leaf_size,
            bytes_per_line,
        }
    }

    /// Maps `path`, builds its line index and starts indexing in the background.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Open`](crate::errors::CoreError::Open) if the file cannot be opened or mapped.
    /// - [`CoreError::Spawn`](crate::errors::CoreError::Spawn) if the scanner thread cannot be created.
    pub fn open(
        path: impl AsRef<std::path::Path>,
        config: &crate::config::EditorConfig,
    ) -> crate::errors::CoreResult<Self> {
        let file = std::sync::Arc::new(io::mmap::MappedFile::open_with(
            path,
            config.encoding,
            &config.detection,
        )?);
        let index = std::sync::Arc::new(crate::line_index::LineIndex::with_options(
            std::sync::Arc::clone(&file),
            config.index_options(),
        ));

        index.start()?;

        Ok(Self::with_config(file, index, config))
    }

    /// Writes every line as UTF-8, joined by `\n`, with no trailing newline.
    ///
    /// Waits for the line index to finish first, so the output never depends
    /// on the estimated line count. Does not clear the dirty flag: the buffer
    /// still reads from the old mapping.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if `path` is the file this buffer is mapped from.
    /// - Any error from creating, writing or syncing the target file.
    pub fn save_to_file(&mut self, path: impl AsRef<std::path::Path>) -> std::io::Result<()> {
        let path = path.as_ref();

        if self.is_backing_file(path) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "refusing to overwrite the mapped file {} in place",
                    path.display()
                ),
            ));
        }

        if !self.index.is_finished() {
            self.index.start().map_err(std::io::Error::other)?;
            self.index.wait();
        }

        let file = std::fs::File::create(path)?;
        let mut writer = std::io::BufWriter::new(file);
        let line_count = self.line_count();

        for line_no in 0..line_count {
            if line_no > 0 {
                writer.write_all(b"\n")?;
            }
            writer.write_all(self.get_line(line_no).as_bytes())?;
        }

        let file = writer.into_inner().map_err(std::io::IntoInnerError::into_error)?;
        file.sync_all()?;

        tracing::info!(
            path = %path.display(),
            lines = line_count,
            edited = self.edits.len(),
            "saved buffer"
        );

        Ok(())
    }

    /// Drops the overlay and cache and hands back the file and its index.
    #[must_use]
    pub fn into_parts(
        self,
    ) -> (
        std::sync::Arc<io::mmap::MappedFile>,
        std::sync::Arc<crate::line_index::LineIndex>,
    ) {
        (self.file, self.index)
    }

    fn is_backing_file(&self, path: &std::path::Path) -> bool {
        match (
            std::fs::canonicalize(path),
            std::fs::canonicalize(self.file.path()),
        ) {
            (Ok(target), Ok(source)) => target == source,
            _ => false,
        }
    }
}

/*

=================
===== QUERY =====
=================

*/

impl VirtualTextBuffer {
    /// Number of lines, or an estimate from the file size while indexing is
    /// still running. Exact once the index is finished.
    #[must_use]
    pub fn line_count(&self) -> usize {
        let indexed = self.index.line_count();

        if self.index.is_finished() {
            return indexed;
        }

        std::cmp::max(indexed, self.file.len() / self.bytes_per_line)
    }

    /// Text of `line_no`, without its newline.
    ///
    /// A line the index has not reached yet comes back empty: that means
    /// "not loaded yet", not "blank line". Never fails; undecodable bytes
    /// become U+FFFD.
    pub fn get_line(&mut self, line_no: usize) -> String {
        if let Some(rope) = self.edits.get(&line_no) {
            return rope.get_text();
        }

        if let Some(text) = self.cache.get(&line_no) {
            return text.clone();
        }

        match self.read_line(line_no) {
            Some(text) => {
                if let Some((evicted, _)) = self.cache.push(line_no, text.clone())
                    && evicted != line_no
                {
                    tracing::trace!(line = evicted, "evicted cached line");
                }
                text
            }
            None => String::new(),
        }
    }

    /// Up to `count` lines from `start_line`, stopping at the last line.
    pub fn get_lines_range(&mut self, start_line: usize, count: usize) -> Vec<String> {
        let end = std::cmp::min(start_line.saturating_add(count), self.line_count());

        (start_line..end).map(|line_no| self.get_line(line_no)).collect()
    }

    /// Decodes `line_no` from the mapped bytes, or `None` if its start is not
    /// indexed yet.
    fn read_line(&self, line_no: usize) -> Option<String> {
        let start = self.index.line_start_offset(line_no)?;
        let end = match self.index.line_start_offset(line_no + 1) {
            Some(next) => next - self.index.newline_len(),
            None if self.index.is_finished() => self.file.len(),
            None => self.index.find_line_end(start),
        };

        Some(self.file.encoding().decode_lossy(self.file.slice(start, end)))
    }

    /// Like [`Self::read_line`], but walks forward from the last indexed line
    /// when the index has not reached `line_no`. `None` only if the file has
    /// no such line.
    fn resolve_line(&self, line_no: usize) -> Option<String> {
        if let Some(text) = self.read_line(line_no) {
            return Some(text);
        }

        let last_known = self.index.line_count() - 1;
        let mut start = self.index.line_start_offset(last_known)?;

        for _ in last_known..line_no {
            let end = self.index.find_line_end(start);

            if end >= self.file.len() {
                return None;
            }

            start = end + self.index.newline_len();
        }

        let end = self.index.find_line_end(start);

        Some(self.file.encoding().decode_lossy(self.file.slice(start, end)))
    }
}

/*

=====================
===== MUTATIONS =====
=====================

*/

impl VirtualTextBuffer {
    /// Replaces the text of `line_no`.
    pub fn set_line(&mut self, line_no: usize, text: &str) {
        self.edits
            .insert(line_no, crate::rope::Rope::from_text(text, self.leaf_size));
        self.touch(line_no);
    }

    /// Inserts `text` before char `col` of `line_no`. A column past the end appends.
    pub fn insert_text_at_line(&mut self, line_no: usize, col: usize, text: &str) {
        if text.is_empty() {
            return;
        }

        self.edited_rope(line_no).insert(col, text);
        self.touch(line_no);
    }

    /// Removes chars `start_col..end_col` of `line_no`. An empty or inverted
    /// range does nothing.
    pub fn delete_text_at_line(&mut self, line_no: usize, start_col: usize, end_col: usize) {
        if end_col <= start_col {
            return;
        }

        self.edited_rope(line_no).delete(start_col, end_col - start_col);
        self.touch(line_no);
    }

    /// Overlay rope for `line_no`, seeded from the current text on first edit.
    ///
    /// The seed is the real line even if the index has not reached it yet;
    /// seeding from the "not loaded" placeholder would erase the line on save.
    fn edited_rope(&mut self, line_no: usize) -> &mut crate::rope::Rope {
        if !self.edits.contains_key(&line_no) {
            let current = match self.cache.get(&line_no) {
                Some(text) => text.clone(),
                None => self.resolve_line(line_no).unwrap_or_default(),
            };

            self.edits
                .insert(line_no, crate::rope::Rope::from_text(&current, self.leaf_size));
        }

        let leaf_size = self.leaf_size;

        self.edits
            .entry(line_no)
            .or_insert_with(|| crate::rope::Rope::with_leaf_size(leaf_size))
    }

    fn touch(&mut self, line_no: usize) {
        self.cache.pop(&line_no);
        self.is_dirty = true;
    }

    /// Forgets that there are unsaved changes. The overlay is kept.
    pub fn mark_clean(&mut self) {
        self.is_dirty = false;
    }
}

/*

==========================
===== INLINE GETTERS =====
==========================

*/

impl VirtualTextBuffer {
    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    /// Edited line numbers, ascending.
    #[must_use]
    pub fn edited_lines(&self) -> Vec<usize> {
        let mut lines: Vec<usize> = self.edits.keys().copied().collect();
        lines.sort_unstable();
        lines
    }

    #[inline]
    #[must_use]
    pub fn is_edited(&self, line_no: usize) -> bool {
        self.edits.contains_key(&line_no)
    }

    /// Lines currently held by the decode cache.
    #[inline]
    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    #[inline]
    #[must_use]
    pub fn file(&self) -> &std::sync::Arc<io::mmap::MappedFile> {
        &self.file
    }

    #[inline]
    #[must_use]
    pub fn index(&self) -> &std::sync::Arc<crate::line_index::LineIndex> {
        &self.index
    }

    #[inline]
    #[must_use]
    pub fn encoding(&self) -> io::encoding::Encoding {
        self.file.encoding()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EditorConfig;
    use crate::line_index::LineIndex;
    use io::mmap::MappedFile;

    fn small_config() -> EditorConfig {
        EditorConfig {
            index_chunk_size: 4,
            scan_yield_ms: 0,
            progress_interval_ms: 0,
            ..EditorConfig::default()
        }
    }

    /// Buffer over `content`, fully indexed.
    fn buffer(content: &[u8]) -> (tempfile::NamedTempFile, VirtualTextBuffer) {
        buffer_with(content, &small_config())
    }

    fn buffer_with(
        content: &[u8],
        config: &EditorConfig,
    ) -> (tempfile::NamedTempFile, VirtualTextBuffer) {
        let mut temp = tempfile::NamedTempFile::new().unwrap();
        temp.write_all(content).unwrap();
        temp.as_file().sync_all().unwrap();

        let buffer = VirtualTextBuffer::open(temp.path(), config).unwrap();
        buffer.index().wait();

        (temp, buffer)
    }

    fn unindexed(content: &[u8]) -> (tempfile::NamedTempFile, VirtualTextBuffer) {
        let mut temp = tempfile::NamedTempFile::new().unwrap();
        temp.write_all(content).unwrap();
        temp.as_file().sync_all().unwrap();

        let file = std::sync::Arc::new(MappedFile::open(temp.path()).unwrap());
        let index = std::sync::Arc::new(LineIndex::new(std::sync::Arc::clone(&file), 4));

        (temp, VirtualTextBuffer::new(file, index))
    }

    fn all_lines(buffer: &mut VirtualTextBuffer) -> Vec<String> {
        let count = buffer.line_count();
        buffer.get_lines_range(0, count)
    }

    fn utf16le_with_bom(text: &str) -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xFE];
        bytes.extend(text.encode_utf16().flat_map(u16::to_le_bytes));
        bytes
    }

    #[test]
    fn three_lines_read_back() {
        let (_temp, mut buffer) = buffer(b"a\nbb\nccc");

        assert_eq!(buffer.line_count(), 3);
        assert_eq!(buffer.get_line(0), "a");
        assert_eq!(buffer.get_line(1), "bb");
        assert_eq!(buffer.get_line(2), "ccc");
        assert_eq!(buffer.get_line(3), "");
    }

    #[test]
    fn set_line_shadows_mapped_bytes() {
        let (temp, mut buffer) = buffer(b"a\nbb\nccc");

        buffer.set_line(1, "X");

        assert_eq!(buffer.get_line(1), "X");
        assert!(buffer.is_dirty());
        assert_eq!(std::fs::read(temp.path()).unwrap(), b"a\nbb\nccc");
    }

    #[test]
    fn edits_build_on_the_overlay() {
        let (_temp, mut buffer) = buffer(b"one\ntwo\nthree\n");

        buffer.set_line(1, "EDITED");
        buffer.insert_text_at_line(1, 3, "!!");

        assert_eq!(buffer.get_line(1), "EDI!!TED");
    }

    #[test]
    fn first_edit_seeds_from_mapped_text() {
        let (_temp, mut buffer) = buffer(b"hello\nworld");

        buffer.insert_text_at_line(1, 5, "!");
        buffer.delete_text_at_line(0, 0, 1);
        buffer.delete_text_at_line(0, 3, 3);

        assert_eq!(buffer.get_line(0), "ello");
        assert_eq!(buffer.get_line(1), "world!");
        assert_eq!(buffer.edited_lines(), vec![0, 1]);
    }

    #[test]
    fn empty_range_delete_is_noop() {
        let (_temp, mut buffer) = buffer(b"abc");

        buffer.delete_text_at_line(0, 2, 1);
        buffer.insert_text_at_line(0, 1, "");

        assert!(!buffer.is_dirty());
        assert!(!buffer.is_edited(0));
    }

    #[test]
    fn empty_file_has_one_blank_line() {
        let (_temp, mut buffer) = buffer(b"");

        assert_eq!(buffer.file().len(), 0);
        assert!(buffer.index().is_finished());
        assert_eq!(buffer.line_count(), 1);
        assert_eq!(buffer.get_line(0), "");
    }

    #[test]
    fn overlay_survives_cache_eviction() {
        let config = EditorConfig {
            line_cache_capacity: 2,
            ..small_config()
        };
        let (_temp, mut buffer) = buffer_with(b"l0\nl1\nl2\nl3\nl4", &config);

        buffer.get_line(2);
        buffer.set_line(2, "X");

        for line_no in [0, 1, 3, 4, 0, 1] {
            buffer.get_line(line_no);
        }

        assert!(buffer.cache_len() <= 2);
        assert_eq!(buffer.get_line(2), "X");
        assert_eq!(buffer.get_line(4), "l4");
    }

    #[test]
    fn set_line_invalidates_cached_copy() {
        let (_temp, mut buffer) = buffer(b"a\nb");

        assert_eq!(buffer.get_line(0), "a");
        assert_eq!(buffer.cache_len(), 1);

        buffer.set_line(0, "z");

        assert_eq!(buffer.cache_len(), 0);
        assert_eq!(buffer.get_line(0), "z");
    }

    #[test]
    fn lines_join_back_to_file_text() {
        let cases: [&[u8]; 3] = [b"", b"single line", b"first\nsecond\n\nf\xC3\xBCnf\n"];

        for content in cases {
            let (_temp, mut buffer) = buffer(content);

            assert_eq!(
                all_lines(&mut buffer).join("\n").as_bytes(),
                content,
                "content {content:?}"
            );
        }
    }

    #[test]
    fn utf16le_bom_lines_join_back_to_text() {
        let text = "alpha\nβeta\n\ngamma";
        let (_temp, mut buffer) = buffer(&utf16le_with_bom(text));

        assert_eq!(buffer.encoding(), io::encoding::Encoding::Utf16Le);
        assert_eq!(buffer.line_count(), 4);
        assert_eq!(all_lines(&mut buffer).join("\n"), text);
    }

    #[test]
    fn utf8_bom_is_not_part_of_the_first_line() {
        let (_temp, mut buffer) = buffer(b"\xEF\xBB\xBFhead\ntail");

        assert_eq!(buffer.get_line(0), "head");
        assert_eq!(buffer.get_line(1), "tail");
    }

    #[test]
    fn invalid_bytes_decode_to_replacement() {
        let (_temp, mut buffer) = buffer(b"ok\n\xFF\xFEbad");

        assert_eq!(buffer.get_line(1), "\u{FFFD}\u{FFFD}bad");
    }

    #[test]
    fn line_count_is_estimated_before_indexing() {
        let content = "x".repeat(799);
        let (_temp, mut buffer) = unindexed(content.as_bytes());

        // 799 bytes at 80 bytes per line.
        assert_eq!(buffer.line_count(), 9);
        assert_eq!(buffer.get_line(0), content);
        assert_eq!(buffer.get_line(5), "", "not loaded yet");
    }

    #[test]
    fn edits_ahead_of_the_index_keep_the_line() {
        let (_temp, mut buffer) = unindexed(b"keep0\nkeep1\nkeep2");
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");

        assert_eq!(buffer.get_line(1), "", "not loaded yet");

        buffer.insert_text_at_line(1, 0, ">");
        buffer.delete_text_at_line(2, 4, 5);

        assert_eq!(buffer.get_line(1), ">keep1");
        assert_eq!(buffer.get_line(2), "keep");

        buffer.save_to_file(&out).unwrap();

        assert_eq!(
            std::fs::read_to_string(&out).unwrap(),
            "keep0\n>keep1\nkeep"
        );
    }

    #[test]
    fn lines_read_while_the_scan_is_running() {
        let content: String = (0..10).map(|i| format!("l{i}\n")).collect();
        let config = EditorConfig {
            index_chunk_size: 4,
            scan_yield_ms: 200,
            ..EditorConfig::default()
        };
        let mut temp = tempfile::NamedTempFile::new().unwrap();
        temp.write_all(content.as_bytes()).unwrap();
        temp.as_file().sync_all().unwrap();

        let mut buffer = VirtualTextBuffer::open(temp.path(), &config).unwrap();

        assert!(buffer.index().is_running());
        assert!(!buffer.index().is_finished());

        // The last line the index knows about ends at its real newline, not
        // at the end of the file.
        let last_known = buffer.index().line_count() - 1;

        assert_eq!(buffer.get_line(0), "l0");
        assert_eq!(buffer.get_line(last_known), format!("l{last_known}"));

        buffer.index().stop();
    }

    #[test]
    fn range_stops_at_last_line() {
        let (_temp, mut buffer) = buffer(b"a\nb\nc");

        assert_eq!(buffer.get_lines_range(1, 10), vec!["b", "c"]);
        assert!(buffer.get_lines_range(5, 2).is_empty());
    }

    #[test]
    fn save_materializes_overlay() {
        let (_temp, mut buffer) = buffer(b"one\ntwo\nthree\n");
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");

        buffer.set_line(1, "TWO");
        buffer.save_to_file(&out).unwrap();

        assert_eq!(std::fs::read_to_string(&out).unwrap(), "one\nTWO\nthree\n");
        assert!(buffer.is_dirty(), "buffer still reads the old mapping");
    }

    #[test]
    fn save_waits_for_an_unstarted_index() {
        let (_temp, mut buffer) = unindexed(b"a\nb\nc");
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");

        buffer.save_to_file(&out).unwrap();

        assert!(buffer.index().is_finished());
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "a\nb\nc");
    }

    #[test]
    fn save_utf16_writes_utf8() {
        let (_temp, mut buffer) = buffer(&utf16le_with_bom("hé\nwo"));
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");

        buffer.save_to_file(&out).unwrap();

        assert_eq!(std::fs::read_to_string(&out).unwrap(), "hé\nwo");
    }

    #[test]
    fn save_refuses_the_mapped_file() {
        let (temp, mut buffer) = buffer(b"a\nb");

        let err = buffer.save_to_file(temp.path()).unwrap_err();

        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
        assert_eq!(std::fs::read(temp.path()).unwrap(), b"a\nb");
    }

    #[test]
    fn save_into_missing_directory_fails() {
        let (_temp, mut buffer) = buffer(b"a");
        let dir = tempfile::tempdir().unwrap();

        let result = buffer.save_to_file(dir.path().join("missing").join("out.txt"));

        assert!(result.is_err());
    }

    #[test]
    fn mark_clean_keeps_edits() {
        let (_temp, mut buffer) = buffer(b"a");

        buffer.set_line(0, "b");
        buffer.mark_clean();

        assert!(!buffer.is_dirty());
        assert_eq!(buffer.get_line(0), "b");
    }
}

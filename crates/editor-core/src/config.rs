/// Every tunable of the large-file engine in one place.
///
/// Missing fields take their defaults when deserializing, so an embedding
/// application can store only the values it overrides.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Skip detection and read every file with this encoding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<io::encoding::Encoding>,
    /// Bytes handed to the newline scanner per step.
    pub index_chunk_size: usize,
    /// Maximum chars per rope leaf.
    pub rope_leaf_size: usize,
    /// Decoded lines kept around for redraws.
    pub line_cache_capacity: usize,
    /// Minimum wall time between two progress notifications.
    pub progress_interval_ms: u64,
    /// Pause after each scanned chunk.
    pub scan_yield_ms: u64,
    /// Window of the on-demand scanner used ahead of the index.
    pub scan_window: usize,
    /// Average line length assumed while the index is incomplete.
    pub utf8_bytes_per_line: usize,
    pub utf16_bytes_per_line: usize,
    pub detection: io::encoding::DetectionConfig,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            encoding: None,
            index_chunk_size: crate::line_index::DEFAULT_CHUNK_SIZE,
            rope_leaf_size: crate::rope::LEAF_SIZE,
            line_cache_capacity: crate::text::DEFAULT_CACHE_CAPACITY,
            progress_interval_ms: 150,
            scan_yield_ms: 5,
            scan_window: crate::line_index::DEFAULT_SCAN_WINDOW,
            utf8_bytes_per_line: 80,
            utf16_bytes_per_line: 160,
            detection: io::encoding::DetectionConfig::default(),
        }
    }
}

impl EditorConfig {
    #[must_use]
    pub fn index_options(&self) -> crate::line_index::IndexOptions {
        crate::line_index::IndexOptions {
            chunk_size: self.index_chunk_size,
            progress_interval: std::time::Duration::from_millis(self.progress_interval_ms),
            yield_interval: std::time::Duration::from_millis(self.scan_yield_ms),
            scan_window: self.scan_window,
        }
        .normalized()
    }

    /// Assumed bytes per line for `encoding`, never zero.
    #[must_use]
    pub fn bytes_per_line(&self, encoding: io::encoding::Encoding) -> usize {
        let estimate = if encoding.is_utf16() {
            self.utf16_bytes_per_line
        } else {
            self.utf8_bytes_per_line
        };

        estimate.max(1)
    }
}

/// A read-only view of a file's bytes, backed by the OS page cache.
///
/// The encoding is decided once, at open time. Every read is clamped to the
/// file length, so callers can ask for ranges computed from stale or estimated
/// offsets without risking a panic.
#[derive(Debug)]
pub struct MappedFile {
    file: Option<std::fs::File>,
    /// `None` for an empty file (nothing to map) and after [`MappedFile::close`].
    mmap: Option<memmap2::Mmap>,
    len: usize,
    encoding: crate::encoding::Encoding,
    bom_len: usize,
    path: std::path::PathBuf,
}

/*

===================
===== OPENING =====
===================

*/

impl MappedFile {
    /// Opens and maps `path`, detecting its encoding.
    ///
    /// # Errors
    ///
    /// - [`MappedFileError::NotFound`](crate::errors::MappedFileError::NotFound) if the file does not exist.
    /// - [`MappedFileError::PermissionDenied`](crate::errors::MappedFileError::PermissionDenied) if it cannot be read.
    /// - [`MappedFileError::Io`](crate::errors::MappedFileError::Io) if the metadata query or the mapping fails.
    pub fn open(
        path: impl AsRef<std::path::Path>,
    ) -> crate::errors::MappedFileResult<Self> {
        Self::open_with(path, None, &crate::encoding::DetectionConfig::default())
    }

    /// Opens and maps `path`, trusting `encoding` instead of detecting one.
    ///
    /// # Errors
    ///
    /// Same as [`MappedFile::open`].
    pub fn open_with_encoding(
        path: impl AsRef<std::path::Path>,
        encoding: crate::encoding::Encoding,
    ) -> crate::errors::MappedFileResult<Self> {
        Self::open_with(path, Some(encoding), &crate::encoding::DetectionConfig::default())
    }

    /// # Errors
    ///
    /// Same as [`MappedFile::open`].
    pub fn open_with(
        path: impl AsRef<std::path::Path>,
        forced_encoding: Option<crate::encoding::Encoding>,
        detection: &crate::encoding::DetectionConfig,
    ) -> crate::errors::MappedFileResult<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let file = std::fs::File::open(&path_buf)
            .map_err(|e| crate::errors::MappedFileError::from_io(&path_buf, e))?;
        let metadata = file
            .metadata()
            .map_err(|e| crate::errors::MappedFileError::from_io(&path_buf, e))?;
        let len = usize::try_from(metadata.len()).map_err(|e| {
            crate::errors::MappedFileError::from_io(
                &path_buf,
                std::io::Error::new(std::io::ErrorKind::FileTooLarge, e),
            )
        })?;

        // Mapping a zero-length file fails on some platforms, and there is
        // nothing to read anyway.
        let mmap = if len == 0 {
            None
        } else {
            // SAFETY:
            // - File is opened read-only
            // - We keep the file handle alive in struct
            // - Caller only gets immutable &[u8]
            let map = unsafe { memmap2::Mmap::map(&file) }
                .map_err(|e| crate::errors::MappedFileError::from_io(&path_buf, e))?;

            Some(map)
        };

        let head: &[u8] = mmap.as_deref().unwrap_or(&[]);
        let encoding = forced_encoding
            .unwrap_or_else(|| crate::encoding::detect_encoding_with(head, detection));
        let bom_len = encoding
            .bom()
            .filter(|bom| head.starts_with(bom))
            .map_or(0, <[u8]>::len);

        tracing::info!(
            path = %path_buf.display(),
            bytes = len,
            encoding = %encoding,
            forced = forced_encoding.is_some(),
            "mapped file"
        );

        Ok(Self {
            file: Some(file),
            mmap,
            len,
            encoding,
            bom_len,
            path: path_buf,
        })
    }

    /// Releases the mapping and the descriptor. Safe to call more than once.
    ///
    /// Reads after closing behave like reads of an empty file.
    pub fn close(&mut self) {
        if self.mmap.take().is_some() || self.file.is_some() {
            tracing::debug!(path = %self.path.display(), "closed mapped file");
        }

        self.file = None;
        self.len = 0;
    }
}

/*

=================
===== READS =====
=================

*/

impl MappedFile {
    /// Bytes in `[min(start, len), min(end, len))`; empty if the range is
    /// inverted or the file is empty.
    #[inline]
    #[must_use]
    pub fn slice(&self, start: usize, end: usize) -> &[u8] {
        let end = std::cmp::min(end, self.len);
        let start = std::cmp::min(start, self.len);

        if start >= end {
            return &[];
        }

        match &self.mmap {
            Some(mmap) => &mmap[start..end],
            None => &[],
        }
    }
}

/*

==========================
===== INLINE GETTERS =====
==========================

*/

impl MappedFile {
    /// File length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    #[must_use]
    pub fn encoding(&self) -> crate::encoding::Encoding {
        self.encoding
    }

    /// Length of the byte-order mark actually present at the start of the file.
    #[inline]
    #[must_use]
    pub fn bom_len(&self) -> usize {
        self.bom_len
    }

    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    #[inline]
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

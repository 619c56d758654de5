//! Text encoding of a mapped file.
//!
//! Only the encodings whose newlines can be found by a plain byte search are
//! supported: UTF-8 (with or without BOM) and UTF-16 in both byte orders.
//!
//! # Detection
//!
//! 1. **BOM**: `EF BB BF` → UTF-8 BOM, `FF FE` → UTF-16 LE, `FE FF` → UTF-16 BE.
//! 2. **Null-byte statistics**: UTF-16 text in the ASCII range is roughly half
//!    null bytes. When the sample is null-heavy, the parity of the nulls in the
//!    first bytes decides the byte order.
//! 3. **Fallback**: UTF-8.

pub const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
pub const UTF16_LE_BOM: &[u8] = &[0xFF, 0xFE];
pub const UTF16_BE_BOM: &[u8] = &[0xFE, 0xFF];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub enum Encoding {
    #[default]
    #[serde(rename = "utf-8")]
    Utf8,
    #[serde(rename = "utf-8-sig")]
    Utf8Bom,
    #[serde(rename = "utf-16-le")]
    Utf16Le,
    #[serde(rename = "utf-16-be")]
    Utf16Be,
}

impl Encoding {
    /// Parses the usual spellings of an encoding name.
    ///
    /// Matching ignores case, `-` and `_`, so `UTF_16LE`, `utf-16-le` and
    /// `utf16le` are the same encoding.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized: String = label
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();

        match normalized.as_str() {
            "utf8" | "ascii" => Some(Encoding::Utf8),
            "utf8sig" | "utf8bom" => Some(Encoding::Utf8Bom),
            "utf16le" | "utf16" => Some(Encoding::Utf16Le),
            "utf16be" => Some(Encoding::Utf16Be),
            _ => None,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Utf8Bom => "utf-8-sig",
            Encoding::Utf16Le => "utf-16-le",
            Encoding::Utf16Be => "utf-16-be",
        }
    }

    /// Short name for status output.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Encoding::Utf8 => "UTF-8",
            Encoding::Utf8Bom => "UTF-8 BOM",
            Encoding::Utf16Le => "UTF-16 LE",
            Encoding::Utf16Be => "UTF-16 BE",
        }
    }

    #[must_use]
    pub fn bom(self) -> Option<&'static [u8]> {
        match self {
            Encoding::Utf8 => None,
            Encoding::Utf8Bom => Some(UTF8_BOM),
            Encoding::Utf16Le => Some(UTF16_LE_BOM),
            Encoding::Utf16Be => Some(UTF16_BE_BOM),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_utf16(self) -> bool {
        matches!(self, Encoding::Utf16Le | Encoding::Utf16Be)
    }

    /// Bytes per code unit: every newline starts on a multiple of this.
    #[inline]
    #[must_use]
    pub fn unit_len(self) -> usize {
        if self.is_utf16() { 2 } else { 1 }
    }

    /// Length in bytes of an encoded `\n`.
    #[inline]
    #[must_use]
    pub fn newline_len(self) -> usize {
        self.unit_len()
    }

    /// Whether the code unit starting at `pos` is a `\n`.
    ///
    /// `pos` must be unit-aligned relative to the start of the file.
    #[inline]
    #[must_use]
    pub fn is_newline_at(self, bytes: &[u8], pos: usize) -> bool {
        match self {
            Encoding::Utf8 | Encoding::Utf8Bom => bytes.get(pos) == Some(&b'\n'),
            Encoding::Utf16Le => {
                bytes.get(pos) == Some(&b'\n') && bytes.get(pos + 1) == Some(&0x00)
            }
            Encoding::Utf16Be => {
                bytes.get(pos) == Some(&0x00) && bytes.get(pos + 1) == Some(&b'\n')
            }
        }
    }

    /// Decodes `bytes` to text, replacing anything malformed with U+FFFD.
    ///
    /// Never fails: a broken line shows up with replacement characters instead
    /// of aborting the read.
    #[must_use]
    pub fn decode_lossy(self, bytes: &[u8]) -> String {
        if bytes.is_empty() {
            return String::new();
        }

        match self {
            Encoding::Utf8 | Encoding::Utf8Bom => String::from_utf8_lossy(bytes).into_owned(),
            Encoding::Utf16Le => {
                let (text, had_errors) = encoding_rs::UTF_16LE.decode_without_bom_handling(bytes);

                if had_errors {
                    tracing::trace!(len = bytes.len(), "replaced malformed UTF-16 LE");
                }

                text.into_owned()
            }
            Encoding::Utf16Be => {
                let (text, had_errors) = encoding_rs::UTF_16BE.decode_without_bom_handling(bytes);

                if had_errors {
                    tracing::trace!(len = bytes.len(), "replaced malformed UTF-16 BE");
                }

                text.into_owned()
            }
        }
    }
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Tuning knobs for the BOM-less UTF-16 heuristic.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// How many leading bytes are counted for nulls.
    pub sample_len: usize,
    /// Fraction of the sample that must be null before UTF-16 is considered.
    pub null_ratio: f64,
    /// How many leading bytes are inspected for null parity.
    pub parity_window: usize,
    /// Nulls needed on one parity to call it the high-byte side.
    pub parity_heavy: usize,
    /// Nulls allowed on the other parity.
    pub parity_light: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            sample_len: 4000,
            null_ratio: 0.45,
            parity_window: 100,
            parity_heavy: 40,
            parity_light: 10,
        }
    }
}

/// Detects the encoding of `bytes` with the default thresholds.
#[must_use]
pub fn detect_encoding(bytes: &[u8]) -> Encoding {
    detect_encoding_with(bytes, &DetectionConfig::default())
}

#[must_use]
pub fn detect_encoding_with(bytes: &[u8], config: &DetectionConfig) -> Encoding {
    if bytes.len() < 2 {
        return Encoding::Utf8;
    }

    // 1. BOM, UTF-8 first as it is the longest.
    if bytes.starts_with(UTF8_BOM) {
        return Encoding::Utf8Bom;
    }
    if bytes.starts_with(UTF16_LE_BOM) {
        return Encoding::Utf16Le;
    }
    if bytes.starts_with(UTF16_BE_BOM) {
        return Encoding::Utf16Be;
    }

    // 2. Null-byte statistics.
    let sample = &bytes[..bytes.len().min(config.sample_len)];
    let null_count = memchr::memchr_iter(0x00, sample).count();

    #[allow(clippy::cast_precision_loss)]
    let null_heavy = null_count as f64 > sample.len() as f64 * config.null_ratio;

    if null_heavy && sample.len() >= config.parity_window {
        let window = &sample[..config.parity_window];
        let even_nulls = window.iter().step_by(2).filter(|b| **b == 0x00).count();
        let odd_nulls = window
            .iter()
            .skip(1)
            .step_by(2)
            .filter(|b| **b == 0x00)
            .count();

        if odd_nulls > config.parity_heavy && even_nulls < config.parity_light {
            return Encoding::Utf16Le;
        }
        if even_nulls > config.parity_heavy && odd_nulls < config.parity_light {
            return Encoding::Utf16Be;
        }
    }

    // 3. Fallback.
    Encoding::Utf8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16le(text: &str) -> Vec<u8> {
        text.encode_utf16().flat_map(u16::to_le_bytes).collect()
    }

    fn utf16be(text: &str) -> Vec<u8> {
        text.encode_utf16().flat_map(u16::to_be_bytes).collect()
    }

    #[test]
    fn bom_wins_regardless_of_content() {
        let payloads: [&[u8]; 3] = [b"", b"plain ascii", &[0x00; 200]];

        for payload in payloads {
            let mut utf8 = UTF8_BOM.to_vec();
            utf8.extend_from_slice(payload);
            let mut le = UTF16_LE_BOM.to_vec();
            le.extend_from_slice(payload);
            let mut be = UTF16_BE_BOM.to_vec();
            be.extend_from_slice(payload);

            assert_eq!(detect_encoding(&utf8), Encoding::Utf8Bom);
            assert_eq!(detect_encoding(&le), Encoding::Utf16Le);
            assert_eq!(detect_encoding(&be), Encoding::Utf16Be);
        }
    }

    #[test]
    fn ascii_is_utf8() {
        assert_eq!(
            detect_encoding(b"fn main() {\n    println!(\"hi\");\n}\n"),
            Encoding::Utf8
        );
    }

    #[test]
    fn tiny_inputs_are_utf8() {
        assert_eq!(detect_encoding(b""), Encoding::Utf8);
        assert_eq!(detect_encoding(b"\xFF"), Encoding::Utf8);
    }

    #[test]
    fn bomless_utf16le_by_null_parity() {
        let bytes = utf16le(&"ascii as utf-16 ".repeat(20));

        assert_eq!(detect_encoding(&bytes), Encoding::Utf16Le);
    }

    #[test]
    fn bomless_utf16be_by_null_parity() {
        let bytes = utf16be(&"ascii as utf-16 ".repeat(20));

        assert_eq!(detect_encoding(&bytes), Encoding::Utf16Be);
    }

    #[test]
    fn short_null_heavy_sample_stays_utf8() {
        // Under the parity window, the heuristic refuses to guess.
        let bytes = utf16le("short");

        assert_eq!(detect_encoding(&bytes), Encoding::Utf8);
    }

    #[test]
    fn scattered_nulls_are_not_utf16() {
        let mut bytes = vec![0x00; 120];
        bytes.extend_from_slice(&[b'a'; 80]);

        assert_eq!(detect_encoding(&bytes), Encoding::Utf8);
    }

    #[test]
    fn thresholds_are_tunable() {
        let bytes = utf16le(&"x".repeat(80));
        let strict = DetectionConfig {
            null_ratio: 0.9,
            ..DetectionConfig::default()
        };

        assert_eq!(detect_encoding(&bytes), Encoding::Utf16Le);
        assert_eq!(detect_encoding_with(&bytes, &strict), Encoding::Utf8);
    }

    #[test]
    fn labels_round_trip() {
        for encoding in [
            Encoding::Utf8,
            Encoding::Utf8Bom,
            Encoding::Utf16Le,
            Encoding::Utf16Be,
        ] {
            assert_eq!(Encoding::from_label(encoding.label()), Some(encoding));
        }

        assert_eq!(Encoding::from_label("UTF_16LE"), Some(Encoding::Utf16Le));
        assert_eq!(Encoding::from_label("latin-1"), None);
    }

    #[test]
    fn newline_patterns() {
        assert!(Encoding::Utf8.is_newline_at(b"a\nb", 1));
        assert!(Encoding::Utf16Le.is_newline_at(&[b'a', 0, b'\n', 0], 2));
        assert!(!Encoding::Utf16Le.is_newline_at(&[b'a', 0, b'\n'], 2));
        assert!(Encoding::Utf16Be.is_newline_at(&[0, b'a', 0, b'\n'], 2));
        assert_eq!(Encoding::Utf16Be.newline_len(), 2);
        assert_eq!(Encoding::Utf8Bom.newline_len(), 1);
    }

    #[test]
    fn decode_lossy_never_fails() {
        assert_eq!(Encoding::Utf8.decode_lossy(b"ok\xFF"), "ok\u{FFFD}");
        assert_eq!(Encoding::Utf16Le.decode_lossy(&utf16le("héllo")), "héllo");
        assert_eq!(Encoding::Utf16Be.decode_lossy(&utf16be("héllo")), "héllo");
        // Odd trailing byte.
        assert_eq!(Encoding::Utf16Le.decode_lossy(&[b'a', 0, b'b']), "a\u{FFFD}");
        assert_eq!(Encoding::Utf16Le.decode_lossy(&[]), "");
    }
}

//! Newline search over raw bytes in the file's encoding.
//!
//! `base` is always the absolute file offset of `block[0]`. For UTF-16 it has
//! to be even, so that code units never straddle two blocks.

use io::encoding::Encoding;

/// Appends the absolute offset of every newline unit in `block` to `out`.
///
/// For UTF-16 the recorded offset is the start of the two-byte unit.
pub(crate) fn find_newlines(encoding: Encoding, block: &[u8], base: usize, out: &mut Vec<usize>) {
    match encoding {
        Encoding::Utf8 | Encoding::Utf8Bom => {
            out.extend(memchr::memchr_iter(b'\n', block).map(|pos| base + pos));
        }
        Encoding::Utf16Le | Encoding::Utf16Be => {
            out.extend(
                memchr::memchr_iter(b'\n', block)
                    .filter_map(|pos| utf16_unit_start(encoding, block, base, pos)),
            );
        }
    }
}

/// Absolute offset of the first newline unit in `block`, if any.
pub(crate) fn find_first_newline(encoding: Encoding, block: &[u8], base: usize) -> Option<usize> {
    match encoding {
        Encoding::Utf8 | Encoding::Utf8Bom => memchr::memchr(b'\n', block).map(|pos| base + pos),
        Encoding::Utf16Le | Encoding::Utf16Be => memchr::memchr_iter(b'\n', block)
            .find_map(|pos| utf16_unit_start(encoding, block, base, pos)),
    }
}

/// Checks whether the `0x0A` byte at `block[pos]` belongs to an aligned
/// UTF-16 newline unit, and if so returns that unit's absolute start.
#[inline]
fn utf16_unit_start(encoding: Encoding, block: &[u8], base: usize, pos: usize) -> Option<usize> {
    let abs = base + pos;

    match encoding {
        // 0A 00, the 0A is the low byte at an even offset.
        Encoding::Utf16Le => {
            (abs % 2 == 0 && encoding.is_newline_at(block, pos)).then_some(abs)
        }
        // 00 0A, the 0A is the low byte at an odd offset.
        Encoding::Utf16Be => {
            let unit = pos.checked_sub(1)?;

            (abs % 2 == 1 && encoding.is_newline_at(block, unit)).then_some(abs - 1)
        }
        Encoding::Utf8 | Encoding::Utf8Bom => Some(abs),
    }
}

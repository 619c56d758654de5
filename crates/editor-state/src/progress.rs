/// Status of an open session, rendered the way a status bar shows it.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    Indexing {
        /// Scanned share of the file, `0.0..=100.0`.
        percent: f64,
        lines: usize,
    },
    Ready {
        name: String,
        lines: usize,
        bytes: usize,
        encoding: io::encoding::Encoding,
        modified: bool,
    },
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Progress::Indexing { percent, lines } => {
                write!(f, "Indexing... {percent:.0}% - {} lines", group_thousands(*lines))
            }
            Progress::Ready {
                name,
                lines,
                bytes,
                encoding,
                modified,
            } => {
                #[allow(clippy::cast_precision_loss)]
                let megabytes = *bytes as f64 / (1024.0 * 1024.0);

                write!(
                    f,
                    "{name} - {} lines ({megabytes:.1} MB, {})",
                    group_thousands(*lines),
                    encoding.display_name()
                )?;

                if *modified {
                    f.write_str(" (modified)")?;
                }

                Ok(())
            }
        }
    }
}

/// `1234567` -> `"1,234,567"`.
fn group_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(digit);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_digits_by_three() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1_000), "1,000");
        assert_eq!(group_thousands(1_234_567), "1,234,567");
    }

    #[test]
    fn indexing_line() {
        let progress = Progress::Indexing {
            percent: 41.6,
            lines: 1_234,
        };

        assert_eq!(progress.to_string(), "Indexing... 42% - 1,234 lines");
    }

    #[test]
    fn ready_line() {
        let progress = Progress::Ready {
            name: "big.log".into(),
            lines: 1_234,
            bytes: 12_897_485,
            encoding: io::encoding::Encoding::Utf8,
            modified: true,
        };

        assert_eq!(
            progress.to_string(),
            "big.log - 1,234 lines (12.3 MB, UTF-8) (modified)"
        );
    }
}

//! Memory images: parsing and upload.

use std::fs;
use std::path::Path;

use clap::ValueEnum;
use link_core::{Link, MEMORY_END};
use log::info;

use crate::error::{ImageError, MonitorError};

/// On-disk image encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum ImageFormat {
    /// Raw bytes, paired little-endian into words.
    Bin,
    /// Whitespace-separated hex words with `#`/`;` comments.
    Text,
}

impl ImageFormat {
    /// Guesses the format from a file extension; anything unknown is binary.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("hex") || ext.eq_ignore_ascii_case("txt") => {
                Self::Text
            }
            _ => Self::Bin,
        }
    }
}

/// Pairs raw bytes into little-endian words; an odd trailing byte is zero-padded.
#[must_use]
pub fn words_from_binary(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair.get(1).copied().unwrap_or(0)]))
        .collect()
}

/// Parses a text image.
///
/// # Errors
///
/// [`ImageError::BadWord`] for the first token that is not a 16-bit hex number.
pub fn words_from_text(text: &str) -> Result<Vec<u16>, ImageError> {
    let mut words = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let content = line.split(['#', ';']).next().unwrap_or_default();
        for token in content.split_whitespace() {
            let digits = token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token);
            let word = u16::from_str_radix(digits, 16).map_err(|_| ImageError::BadWord {
                line: index + 1,
                token: token.to_string(),
            })?;
            words.push(word);
        }
    }
    Ok(words)
}

/// Loads an image file, checking that it fits in memory from `load_address`.
///
/// # Errors
///
/// [`MonitorError::Image`] when the file is unreadable, malformed or too large.
pub fn load_image(
    path: &Path,
    format: Option<ImageFormat>,
    load_address: u32,
) -> Result<Vec<u16>, MonitorError> {
    let wrap = |source| MonitorError::Image {
        path: path.to_path_buf(),
        source,
    };
    let bytes = fs::read(path).map_err(|err| wrap(ImageError::Read(err.to_string())))?;

    let words = match format.unwrap_or_else(|| ImageFormat::from_path(path)) {
        ImageFormat::Bin => words_from_binary(&bytes),
        ImageFormat::Text => words_from_text(&String::from_utf8_lossy(&bytes)).map_err(wrap)?,
    };

    let room = usize::try_from(MEMORY_END.saturating_sub(load_address) + 1).unwrap_or(usize::MAX);
    if load_address > MEMORY_END || words.len() > room {
        return Err(wrap(ImageError::TooLarge {
            load_address,
            words: words.len(),
        }));
    }
    Ok(words)
}

/// Writes an image into target memory.
///
/// # Errors
///
/// Any error from [`Link::write_memory`].
pub async fn upload(link: &Link, load_address: u32, words: &[u16]) -> Result<(), MonitorError> {
    info!("uploading {} word(s) to {load_address:#07X}", words.len());
    link.write_memory(load_address, words).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use rstest::rstest;

    use super::{load_image, words_from_binary, words_from_text, ImageFormat};
    use crate::error::{ImageError, MonitorError};

    #[test]
    fn binary_images_pair_bytes_little_endian() {
        assert_eq!(words_from_binary(&[0x34, 0x12, 0xCD, 0xAB]), vec![0x1234, 0xABCD]);
        assert_eq!(words_from_binary(&[0x34, 0x12, 0x7F]), vec![0x1234, 0x007F]);
        assert!(words_from_binary(&[]).is_empty());
    }

    #[test]
    fn text_images_skip_comments_and_accept_prefixes() {
        let text = "# boot stub\n0x1234 abcd ; trailing\n\n  FFFF 0X0001\n";
        assert_eq!(words_from_text(text), Ok(vec![0x1234, 0xABCD, 0xFFFF, 0x0001]));
    }

    #[test]
    fn text_images_report_the_bad_line() {
        assert_eq!(
            words_from_text("0001\n0002 12345\n"),
            Err(ImageError::BadWord {
                line: 2,
                token: "12345".to_string()
            })
        );
    }

    #[rstest]
    #[case("boot.hex", ImageFormat::Text)]
    #[case("boot.TXT", ImageFormat::Text)]
    #[case("boot.bin", ImageFormat::Bin)]
    #[case("boot", ImageFormat::Bin)]
    fn format_follows_the_extension(#[case] name: &str, #[case] expected: ImageFormat) {
        assert_eq!(ImageFormat::from_path(Path::new(name)), expected);
    }

    #[test]
    fn load_rejects_images_past_the_end_of_memory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("big.bin");
        fs::write(&path, [0_u8; 8]).expect("write image");

        assert_eq!(load_image(&path, None, 0x7FFFC).expect("fits").len(), 4);
        let err = load_image(&path, None, 0x7FFFD).expect_err("overruns");
        assert!(matches!(
            err,
            MonitorError::Image {
                source: ImageError::TooLarge { words: 4, .. },
                ..
            }
        ));
    }

    #[test]
    fn explicit_format_overrides_the_extension() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("words.bin");
        fs::write(&path, "0102 0304").expect("write image");

        assert_eq!(
            load_image(&path, Some(ImageFormat::Text), 0).expect("text image"),
            vec![0x0102, 0x0304]
        );
    }
}

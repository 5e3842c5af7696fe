//! The Iconv boundary (spec §9): every [`crate::AinFile`] holds its strings as
//! UTF-8 internally, never a mix of encodings. `conv_in`/`conv_out` are the
//! only place a CP932-authored byte stream is allowed to cross into or out of
//! that model, used when JAF/TEXT source files or CLI arguments were written
//! in the original engine's native encoding rather than UTF-8.

use crate::Str;

/// The text encoding a source stream (JAF, TEXT, file names on disk) was
/// authored in. `.ain` files shipped by the original toolchain default to
/// CP932; tool-generated sources are typically plain UTF-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Cp932,
    Utf8,
}

impl Default for Encoding {
    fn default() -> Self {
        Encoding::Cp932
    }
}

/// Decode a byte stream in `enc` into the UTF-8 [`Str`]/[`String`] every
/// in-memory model uses. Malformed sequences are replaced rather than
/// rejected, since source files arrive from outside this crate's control.
pub fn conv_in(bytes: &[u8], enc: Encoding) -> Str {
    match enc {
        Encoding::Utf8 => Str::from(String::from_utf8_lossy(bytes).into_owned()),
        Encoding::Cp932 => {
            let (text, _, _) = encoding_rs::SHIFT_JIS.decode(bytes);
            Str::from(text.into_owned())
        }
    }
}

/// Encode a UTF-8 string back to `enc`, the inverse of [`conv_in`]. Used when
/// writing a source stream (or a file name table entry) back out in its
/// original encoding rather than the UTF-8 the in-memory model carries.
pub fn conv_out(s: &str, enc: Encoding) -> Vec<u8> {
    match enc {
        Encoding::Utf8 => s.as_bytes().to_vec(),
        Encoding::Cp932 => {
            let (bytes, _, _) = encoding_rs::SHIFT_JIS.encode(s);
            bytes.into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_round_trips_identically_under_either_encoding() {
        for enc in [Encoding::Cp932, Encoding::Utf8] {
            let bytes = conv_out("main", enc);
            assert_eq!(conv_in(&bytes, enc).as_str(), "main");
        }
    }

    #[test]
    fn shift_jis_wide_characters_round_trip() {
        let original = "キャラクター";
        let bytes = conv_out(original, Encoding::Cp932);
        assert_eq!(conv_in(&bytes, Encoding::Cp932).as_str(), original);
    }

    #[test]
    fn defaults_to_cp932() {
        assert_eq!(Encoding::default(), Encoding::Cp932);
    }
}

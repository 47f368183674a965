//! Narrow (codepage) encodings
//!
//! Codepages are backed by `encoding_rs`. The WHATWG tables it implements
//! fold `iso-8859-1` and `us-ascii` into windows-1252, so [`Codepage::Latin1`]
//! and [`Codepage::Ascii`] narrow the windows-1252 encoding to the byte
//! ranges those codepages actually assign.

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

/// Narrow encoding used for legacy byte strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Codepage {
    #[serde(rename = "utf-8", alias = "utf8")]
    Utf8,
    #[serde(rename = "windows-1252", alias = "cp1252")]
    Windows1252,
    #[serde(rename = "latin1", alias = "iso-8859-1")]
    Latin1,
    #[serde(rename = "ascii", alias = "us-ascii")]
    Ascii,
}

impl Default for Codepage {
    fn default() -> Self {
        Codepage::Windows1252
    }
}

/// Where a byte sequence stops decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Malformed {
    pub offset: usize,
}

impl Codepage {
    pub fn name(self) -> &'static str {
        match self {
            Codepage::Utf8 => "utf-8",
            Codepage::Windows1252 => "windows-1252",
            Codepage::Latin1 => "latin1",
            Codepage::Ascii => "ascii",
        }
    }

    /// Numeric codepage identifier.
    pub fn id(self) -> u32 {
        match self {
            Codepage::Utf8 => 65001,
            Codepage::Windows1252 => 1252,
            Codepage::Latin1 => 28591,
            Codepage::Ascii => 20127,
        }
    }

    /// Underlying `encoding_rs` encoding.
    pub fn encoding(self) -> &'static Encoding {
        match self {
            Codepage::Utf8 => UTF_8,
            Codepage::Windows1252 | Codepage::Latin1 | Codepage::Ascii => WINDOWS_1252,
        }
    }

    /// Look up a codepage by name, WHATWG label or numeric id.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        match name.as_str() {
            "latin1" | "iso-8859-1" | "28591" => return Some(Codepage::Latin1),
            "ascii" | "us-ascii" | "20127" => return Some(Codepage::Ascii),
            "65001" => return Some(Codepage::Utf8),
            "1252" => return Some(Codepage::Windows1252),
            _ => {}
        }
        let encoding = Encoding::for_label(name.as_bytes())?;
        if encoding == UTF_8 {
            Some(Codepage::Utf8)
        } else if encoding == WINDOWS_1252 {
            Some(Codepage::Windows1252)
        } else {
            None
        }
    }

    /// Decode a whole byte string. Malformed or unassigned input is an error,
    /// never a replacement character.
    pub(crate) fn decode(self, bytes: &[u8]) -> Result<Cow<'_, str>, Malformed> {
        match self {
            Codepage::Latin1 => Ok(encoding_rs::mem::decode_latin1(bytes)),
            Codepage::Ascii => {
                let offset = Encoding::ascii_valid_up_to(bytes);
                if offset < bytes.len() {
                    return Err(Malformed { offset });
                }
                Ok(encoding_rs::mem::decode_latin1(bytes))
            }
            cp => cp
                .encoding()
                .decode_without_bom_handling_and_without_replacement(bytes)
                .ok_or_else(|| Malformed {
                    offset: cp.valid_up_to(bytes),
                }),
        }
    }

    fn valid_up_to(self, bytes: &[u8]) -> usize {
        if self == Codepage::Utf8 {
            return Encoding::utf8_valid_up_to(bytes);
        }
        let encoding = self.encoding();
        bytes
            .iter()
            .position(|&b| {
                encoding
                    .decode_without_bom_handling_and_without_replacement(&[b])
                    .is_none()
            })
            .unwrap_or(bytes.len())
    }

    /// Encode text, replacing what the codepage cannot represent with
    /// `substitution`.
    pub(crate) fn encode(self, text: &str, substitution: u8) -> Vec<u8> {
        match self.reverse_map() {
            None => text.as_bytes().to_vec(),
            Some(reverse) => text
                .chars()
                .map(|ch| reverse.get(&ch).copied().unwrap_or(substitution))
                .collect(),
        }
    }

    /// Encode one character. `None` when the codepage has no byte for it.
    pub(crate) fn encode_char(self, ch: char) -> Option<u8> {
        self.reverse_map()?.get(&ch).copied()
    }

    /// Character to byte table for single-byte codepages.
    fn reverse_map(self) -> Option<&'static HashMap<char, u8>> {
        static WINDOWS_1252_MAP: Lazy<HashMap<char, u8>> =
            Lazy::new(|| build_reverse_map(Codepage::Windows1252));
        static LATIN1_MAP: Lazy<HashMap<char, u8>> =
            Lazy::new(|| build_reverse_map(Codepage::Latin1));
        static ASCII_MAP: Lazy<HashMap<char, u8>> =
            Lazy::new(|| build_reverse_map(Codepage::Ascii));

        match self {
            Codepage::Utf8 => None,
            Codepage::Windows1252 => Some(Lazy::force(&WINDOWS_1252_MAP)),
            Codepage::Latin1 => Some(Lazy::force(&LATIN1_MAP)),
            Codepage::Ascii => Some(Lazy::force(&ASCII_MAP)),
        }
    }
}

fn build_reverse_map(codepage: Codepage) -> HashMap<char, u8> {
    let mut reverse = HashMap::with_capacity(256);
    for b in 0u8..=255 {
        let byte = [b];
        let Ok(decoded) = codepage.decode(&byte) else {
            continue;
        };
        let mut chars = decoded.chars();
        if let (Some(ch), None) = (chars.next(), chars.next()) {
            reverse.insert(ch, b);
        }
    }
    reverse
}

impl fmt::Display for Codepage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cp1252_high_range() {
        let cp = Codepage::Windows1252;
        assert_eq!(cp.decode(&[0x80]).unwrap(), "€");
        assert_eq!(cp.decode(&[0x9F]).unwrap(), "Ÿ");
        assert_eq!(cp.encode_char('€'), Some(0x80));
        assert_eq!(cp.encode_char('é'), Some(0xE9));
        assert_eq!(cp.encode_char('中'), None);
    }

    #[test]
    fn test_ascii_and_latin1() {
        assert_eq!(Codepage::Ascii.decode(b"ok\xE9"), Err(Malformed { offset: 2 }));
        assert_eq!(Codepage::Latin1.decode(&[0xE9]).unwrap(), "é");
        // Latin-1 has C1 controls where windows-1252 has punctuation
        assert_eq!(Codepage::Latin1.decode(&[0x80]).unwrap(), "\u{80}");
        assert_eq!(Codepage::Latin1.encode_char('€'), None);
        assert_eq!(Codepage::Ascii.encode("né", b'_'), b"n_".to_vec());
    }

    #[test]
    fn test_utf8_stops_at_malformed_byte() {
        assert_eq!(Codepage::Utf8.decode(&[b'a', 0xC3, 0x28]), Err(Malformed { offset: 1 }));
        assert_eq!(Codepage::Utf8.encode("dög", b'?'), "dög".as_bytes().to_vec());
    }

    #[test]
    fn test_from_name() {
        assert_eq!(Codepage::from_name("CP1252"), Some(Codepage::Windows1252));
        assert_eq!(Codepage::from_name("utf8"), Some(Codepage::Utf8));
        assert_eq!(Codepage::from_name("unicode-1-1-utf-8"), Some(Codepage::Utf8));
        assert_eq!(Codepage::from_name("x-cp1252"), Some(Codepage::Windows1252));
        assert_eq!(Codepage::from_name("iso-8859-1"), Some(Codepage::Latin1));
        assert_eq!(Codepage::from_name("ebcdic"), None);
        assert_eq!(Codepage::from_name("shift_jis"), None);
    }

    #[test]
    fn test_backing_encoding() {
        assert_eq!(Codepage::Utf8.encoding(), UTF_8);
        assert_eq!(Codepage::Latin1.encoding(), WINDOWS_1252);
    }
}

//! String codec
//!
//! Conversions between the three text forms that cross the bridge:
//! - UTF-8 (host strings)
//! - wide UTF-16 code units (foreign string handles, member names)
//! - narrow bytes in the process-wide active codepage (legacy callers)
//!
//! Decoding a malformed sequence fails with an [`EncodingError`]. Encoding
//! into a narrow codepage never fails: characters the codepage cannot
//! represent are replaced with the substitution byte.

pub mod codepage;

pub use codepage::Codepage;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::fmt;
use thiserror::Error;
use tracing::trace;

/// Codec failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("invalid UTF-8 sequence at byte {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("unpaired surrogate 0x{unit:04X} at index {index}")]
    UnpairedSurrogate { index: usize, unit: u16 },

    #[error("byte 0x{byte:02X} at offset {offset} is not valid in {codepage}")]
    Unmapped {
        byte: u8,
        offset: usize,
        codepage: Codepage,
    },
}

/// Narrow-text settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Codec {
    pub codepage: Codepage,
    /// Byte written for characters the codepage cannot encode.
    pub substitution: u8,
}

impl Default for Codec {
    fn default() -> Self {
        Self {
            codepage: Codepage::default(),
            substitution: b'?',
        }
    }
}

static ACTIVE: Lazy<RwLock<Codec>> = Lazy::new(|| RwLock::new(Codec::default()));

/// Codec settings used by the free functions in this module.
pub fn active() -> Codec {
    *ACTIVE.read()
}

/// Replace the process-wide codec settings.
pub fn set_active(codec: Codec) {
    trace!(target: "codec", event = "set_active", codepage = %codec.codepage);
    *ACTIVE.write() = codec;
}

impl Codec {
    pub fn new(codepage: Codepage) -> Self {
        Self {
            codepage,
            ..Self::default()
        }
    }

    pub fn with_substitution(mut self, byte: u8) -> Self {
        self.substitution = byte;
        self
    }

    /// Narrow bytes to UTF-8.
    pub fn narrow_to_utf8(&self, bytes: &[u8]) -> Result<String, EncodingError> {
        match self.codepage.decode(bytes) {
            Ok(text) => Ok(text.into_owned()),
            Err(codepage::Malformed { offset }) if self.codepage == Codepage::Utf8 => {
                Err(EncodingError::InvalidUtf8 { offset })
            }
            Err(codepage::Malformed { offset }) => Err(EncodingError::Unmapped {
                byte: bytes.get(offset).copied().unwrap_or_default(),
                offset,
                codepage: self.codepage,
            }),
        }
    }

    /// Narrow bytes to wide code units.
    pub fn narrow_to_wide(&self, bytes: &[u8]) -> Result<Vec<u16>, EncodingError> {
        let text = self.narrow_to_utf8(bytes)?;
        Ok(text.encode_utf16().collect())
    }

    /// Wide code units to narrow bytes, substituting what cannot be encoded.
    pub fn wide_to_narrow(&self, wide: &[u16]) -> Vec<u8> {
        let mut out = Vec::with_capacity(wide.len());
        for unit in char::decode_utf16(wide.iter().copied()) {
            match unit {
                Ok(ch) if self.codepage == Codepage::Utf8 => {
                    let mut buf = [0u8; 4];
                    out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                }
                Ok(ch) => out.push(self.codepage.encode_char(ch).unwrap_or(self.substitution)),
                Err(_) => out.push(self.substitution),
            }
        }
        out
    }

    pub fn utf8_to_narrow(&self, text: &str) -> Vec<u8> {
        self.codepage.encode(text, self.substitution)
    }

    pub fn narrow_to_bstr(&self, bytes: &[u8]) -> Result<BStr, EncodingError> {
        self.narrow_to_wide(bytes).map(BStr::from)
    }

    /// A null handle yields an empty byte string.
    pub fn bstr_to_narrow(&self, bstr: Option<&BStr>) -> Vec<u8> {
        bstr.map(|s| self.wide_to_narrow(s.as_wide()))
            .unwrap_or_default()
    }
}

/// UTF-8 bytes to wide code units.
pub fn utf8_to_wide(bytes: &[u8]) -> Result<Vec<u16>, EncodingError> {
    Codec::new(Codepage::Utf8).narrow_to_wide(bytes)
}

/// Wide code units to UTF-8. Unpaired surrogates are rejected.
pub fn wide_to_utf8(wide: &[u16]) -> Result<String, EncodingError> {
    let mut out = String::with_capacity(wide.len());
    let mut index = 0;
    for unit in char::decode_utf16(wide.iter().copied()) {
        match unit {
            Ok(ch) => {
                out.push(ch);
                index += ch.len_utf16();
            }
            Err(e) => {
                return Err(EncodingError::UnpairedSurrogate {
                    index,
                    unit: e.unpaired_surrogate(),
                })
            }
        }
    }
    Ok(out)
}

/// Wide code units to UTF-8, replacing unpaired surrogates with U+FFFD.
pub fn wide_to_utf8_lossy(wide: &[u16]) -> String {
    String::from_utf16_lossy(wide)
}

pub fn narrow_to_utf8(bytes: &[u8]) -> Result<String, EncodingError> {
    active().narrow_to_utf8(bytes)
}

pub fn utf8_to_narrow(text: &str) -> Vec<u8> {
    active().utf8_to_narrow(text)
}

pub fn narrow_to_wide(bytes: &[u8]) -> Result<Vec<u16>, EncodingError> {
    active().narrow_to_wide(bytes)
}

pub fn wide_to_narrow(wide: &[u16]) -> Vec<u8> {
    active().wide_to_narrow(wide)
}

pub fn narrow_to_bstr(bytes: &[u8]) -> Result<BStr, EncodingError> {
    active().narrow_to_bstr(bytes)
}

pub fn bstr_to_narrow(bstr: Option<&BStr>) -> Vec<u8> {
    active().bstr_to_narrow(bstr)
}

/// Length-prefixed wide string owned by a foreign value.
///
/// A null handle is modelled as `Option<BStr>::None` by the holders.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct BStr(Box<[u16]>);

impl BStr {
    pub fn from_wide(wide: &[u16]) -> Self {
        Self(wide.into())
    }

    pub fn as_wide(&self) -> &[u16] {
        &self.0
    }

    /// Length in code units.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_utf8(&self) -> Result<String, EncodingError> {
        wide_to_utf8(&self.0)
    }

    pub fn to_string_lossy(&self) -> String {
        wide_to_utf8_lossy(&self.0)
    }
}

impl From<&str> for BStr {
    fn from(text: &str) -> Self {
        Self(text.encode_utf16().collect())
    }
}

impl From<Vec<u16>> for BStr {
    fn from(wide: Vec<u16>) -> Self {
        Self(wide.into_boxed_slice())
    }
}

impl fmt::Debug for BStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BStr({:?})", self.to_string_lossy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_wide_roundtrip() {
        let wide = utf8_to_wide("héllo".as_bytes()).unwrap();
        assert_eq!(wide.len(), 5);
        assert_eq!(wide_to_utf8(&wide).unwrap(), "héllo");

        // Astral characters take a surrogate pair
        let wide = utf8_to_wide("𝄞".as_bytes()).unwrap();
        assert_eq!(wide.len(), 2);
        assert_eq!(wide_to_utf8(&wide).unwrap(), "𝄞");
    }

    #[test]
    fn test_empty_input() {
        assert!(utf8_to_wide(b"").unwrap().is_empty());
        assert_eq!(wide_to_utf8(&[]).unwrap(), "");
        assert!(Codec::default().bstr_to_narrow(None).is_empty());
    }

    #[test]
    fn test_invalid_utf8() {
        let err = utf8_to_wide(&[b'a', 0xC3, 0x28]).unwrap_err();
        assert_eq!(err, EncodingError::InvalidUtf8 { offset: 1 });
    }

    #[test]
    fn test_unpaired_surrogate() {
        let err = wide_to_utf8(&[0x0041, 0xD800]).unwrap_err();
        assert_eq!(
            err,
            EncodingError::UnpairedSurrogate {
                index: 1,
                unit: 0xD800
            }
        );
        assert_eq!(wide_to_utf8_lossy(&[0x0041, 0xD800]), "A\u{FFFD}");
    }

    #[test]
    fn test_narrow_substitution() {
        let codec = Codec::new(Codepage::Windows1252);
        let wide: Vec<u16> = "a€中".encode_utf16().collect();
        assert_eq!(codec.wide_to_narrow(&wide), vec![b'a', 0x80, b'?']);

        let codec = Codec::new(Codepage::Ascii).with_substitution(b'_');
        assert_eq!(codec.utf8_to_narrow("né"), b"n_".to_vec());
    }

    #[test]
    fn test_narrow_decode() {
        let codec = Codec::new(Codepage::Windows1252);
        assert_eq!(codec.narrow_to_utf8(&[b'c', 0xE9, 0x80]).unwrap(), "cé€");

        let ascii = Codec::new(Codepage::Ascii);
        assert_eq!(
            ascii.narrow_to_utf8(b"ok\x81"),
            Err(EncodingError::Unmapped {
                byte: 0x81,
                offset: 2,
                codepage: Codepage::Ascii
            })
        );
        assert_eq!(
            Codec::new(Codepage::Utf8).narrow_to_utf8(&[b'a', 0xFF]),
            Err(EncodingError::InvalidUtf8 { offset: 1 })
        );

        let utf8 = Codec::new(Codepage::Utf8);
        let bstr = utf8.narrow_to_bstr("héllo".as_bytes()).unwrap();
        assert_eq!(bstr.to_utf8().unwrap(), "héllo");
        assert_eq!(utf8.bstr_to_narrow(Some(&bstr)), "héllo".as_bytes());
    }
}

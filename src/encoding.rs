//! Provide methods and data structures for detecting and decoding the character
//! encoding of entities.
//!
//! Decoding is delegated to `encoding_rs`. ISO-8859-1 is decoded directly because
//! `encoding_rs` maps that label to windows-1252.

use std::{borrow::Cow, fmt::Display, str::FromStr};

use encoding_rs::{
    DecoderResult, EUC_JP, Encoding, ISO_2022_JP, ISO_8859_2, ISO_8859_3, ISO_8859_4,
    ISO_8859_5, ISO_8859_6, ISO_8859_7, ISO_8859_8, ISO_8859_10, ISO_8859_13, ISO_8859_14,
    ISO_8859_15, ISO_8859_16, SHIFT_JIS, UTF_8, UTF_16BE, UTF_16LE, WINDOWS_1254,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlCharEncoding {
    None,
    UTF8,
    UTF16LE,
    UTF16BE,
    UCS4LE,
    UCS4BE,
    EBCDIC,
    UCS4_2143,
    UCS4_3412,
    UCS2,
    ISO8859_1,
    ISO8859_2,
    ISO8859_3,
    ISO8859_4,
    ISO8859_5,
    ISO8859_6,
    ISO8859_7,
    ISO8859_8,
    ISO8859_9,
    ISO8859_10,
    ISO8859_13,
    ISO8859_14,
    ISO8859_15,
    ISO8859_16,
    ISO2022JP,
    ShiftJIS,
    EUCJP,
    ASCII,
}

impl XmlCharEncoding {
    pub fn get_name(&self) -> Option<&'static str> {
        match *self {
            Self::UTF8 => Some("UTF-8"),
            Self::UTF16LE | Self::UTF16BE => Some("UTF-16"),
            Self::EBCDIC => Some("EBCDIC"),
            Self::UCS4LE | Self::UCS4BE | Self::UCS4_2143 | Self::UCS4_3412 => {
                Some("ISO-10646-UCS-4")
            }
            Self::UCS2 => Some("ISO-10646-UCS-2"),
            Self::ISO8859_1 => Some("ISO-8859-1"),
            Self::ISO8859_2 => Some("ISO-8859-2"),
            Self::ISO8859_3 => Some("ISO-8859-3"),
            Self::ISO8859_4 => Some("ISO-8859-4"),
            Self::ISO8859_5 => Some("ISO-8859-5"),
            Self::ISO8859_6 => Some("ISO-8859-6"),
            Self::ISO8859_7 => Some("ISO-8859-7"),
            Self::ISO8859_8 => Some("ISO-8859-8"),
            Self::ISO8859_9 => Some("ISO-8859-9"),
            Self::ISO8859_10 => Some("ISO-8859-10"),
            Self::ISO8859_13 => Some("ISO-8859-13"),
            Self::ISO8859_14 => Some("ISO-8859-14"),
            Self::ISO8859_15 => Some("ISO-8859-15"),
            Self::ISO8859_16 => Some("ISO-8859-16"),
            Self::ISO2022JP => Some("ISO-2022-JP"),
            Self::ShiftJIS => Some("Shift-JIS"),
            Self::EUCJP => Some("EUC-JP"),
            Self::ASCII => Some("US-ASCII"),
            Self::None => None,
        }
    }

    fn encoding_rs(&self) -> Option<&'static Encoding> {
        match *self {
            Self::UTF8 | Self::ASCII | Self::None => Some(UTF_8),
            Self::UTF16LE => Some(UTF_16LE),
            Self::UTF16BE => Some(UTF_16BE),
            Self::ISO8859_2 => Some(ISO_8859_2),
            Self::ISO8859_3 => Some(ISO_8859_3),
            Self::ISO8859_4 => Some(ISO_8859_4),
            Self::ISO8859_5 => Some(ISO_8859_5),
            Self::ISO8859_6 => Some(ISO_8859_6),
            Self::ISO8859_7 => Some(ISO_8859_7),
            Self::ISO8859_8 => Some(ISO_8859_8),
            Self::ISO8859_9 => Some(WINDOWS_1254),
            Self::ISO8859_10 => Some(ISO_8859_10),
            Self::ISO8859_13 => Some(ISO_8859_13),
            Self::ISO8859_14 => Some(ISO_8859_14),
            Self::ISO8859_15 => Some(ISO_8859_15),
            Self::ISO8859_16 => Some(ISO_8859_16),
            Self::ISO2022JP => Some(ISO_2022_JP),
            Self::ShiftJIS => Some(SHIFT_JIS),
            Self::EUCJP => Some(EUC_JP),
            _ => None,
        }
    }

    /// Whether a document in this encoding can carry its encoding declaration as ASCII bytes.
    pub fn is_ascii_compatible(&self) -> bool {
        !matches!(
            self,
            Self::UTF16LE
                | Self::UTF16BE
                | Self::UCS4LE
                | Self::UCS4BE
                | Self::UCS4_2143
                | Self::UCS4_3412
                | Self::UCS2
                | Self::EBCDIC
        )
    }
}

impl FromStr for XmlCharEncoding {
    type Err = EncodingError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let name = name.to_uppercase();
        match name.as_str() {
            "" => Ok(Self::None),
            "UTF-8" | "UTF8" => Ok(Self::UTF8),
            "UTF-16" | "UTF16" => Ok(Self::UTF16LE),
            "UTF-16LE" => Ok(Self::UTF16LE),
            "UTF-16BE" => Ok(Self::UTF16BE),
            "ISO-10646-UCS-2" | "UCS-2" | "UCS2" => Ok(Self::UCS2),
            "ISO-10646-UCS-4" | "UCS-4" | "UCS4" => Ok(Self::UCS4LE),
            "ISO-8859-1" | "ISO-LATIN-1" | "ISO LATIN 1" | "LATIN1" => Ok(Self::ISO8859_1),
            "ISO-8859-2" | "ISO-LATIN-2" | "ISO LATIN 2" => Ok(Self::ISO8859_2),
            "ISO-8859-3" => Ok(Self::ISO8859_3),
            "ISO-8859-4" => Ok(Self::ISO8859_4),
            "ISO-8859-5" => Ok(Self::ISO8859_5),
            "ISO-8859-6" => Ok(Self::ISO8859_6),
            "ISO-8859-7" => Ok(Self::ISO8859_7),
            "ISO-8859-8" => Ok(Self::ISO8859_8),
            "ISO-8859-9" => Ok(Self::ISO8859_9),
            "ISO-8859-10" => Ok(Self::ISO8859_10),
            "ISO-8859-13" => Ok(Self::ISO8859_13),
            "ISO-8859-14" => Ok(Self::ISO8859_14),
            "ISO-8859-15" => Ok(Self::ISO8859_15),
            "ISO-8859-16" => Ok(Self::ISO8859_16),
            "ISO-2022-JP" => Ok(Self::ISO2022JP),
            "SHIFT_JIS" | "SHIFT-JIS" => Ok(Self::ShiftJIS),
            "EUC-JP" => Ok(Self::EUCJP),
            "US-ASCII" | "ASCII" => Ok(Self::ASCII),
            _ => Err(EncodingError::Unsupported {
                name: name.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// Malformed byte sequence is found.
    ///
    /// The input has been consumed up to `read` bytes.
    /// The malformed sequence occurs at `input[read-length-offset..read-offset]`.
    Malformed {
        read: usize,
        length: usize,
        offset: usize,
    },
    /// No decoder is available for the encoding.
    Unsupported { name: Cow<'static, str> },
    /// Other errors.
    Other { msg: Cow<'static, str> },
}

impl EncodingError {
    pub fn malformed(&self) -> bool {
        matches!(self, EncodingError::Malformed { .. })
    }

    pub fn unsupported(&self) -> bool {
        matches!(self, EncodingError::Unsupported { .. })
    }
}

impl Display for EncodingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Encoding Error: ")?;
        match self {
            Self::Malformed {
                read,
                length,
                offset,
            } => {
                let start = read.saturating_sub(length + offset);
                let end = read.saturating_sub(offset + 1);
                write!(f, "Malformed byte sequence occurs at {start}..={end}")
            }
            Self::Unsupported { name } => write!(f, "Unsupported encoding '{name}'"),
            Self::Other { msg } => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for EncodingError {}

/// Guess the encoding of an entity from its first four bytes.
///
/// This follows Appendix F of the XML Recommendation.
pub fn detect_encoding(input: &[u8]) -> XmlCharEncoding {
    match input {
        [0x00, 0x00, 0x00, 0x3C, ..] => XmlCharEncoding::UCS4BE,
        [0x3C, 0x00, 0x00, 0x00, ..] => XmlCharEncoding::UCS4LE,
        [0x00, 0x00, 0x3C, 0x00, ..] => XmlCharEncoding::UCS4_2143,
        [0x00, 0x3C, 0x00, 0x00, ..] => XmlCharEncoding::UCS4_3412,
        [0x4C, 0x6F, 0xA7, 0x94, ..] => XmlCharEncoding::EBCDIC,
        [0x3C, 0x3F, 0x78, 0x6D, ..] => XmlCharEncoding::UTF8,
        [0x3C, 0x00, 0x3F, 0x00, ..] => XmlCharEncoding::UTF16LE,
        [0x00, 0x3C, 0x00, 0x3F, ..] => XmlCharEncoding::UTF16BE,
        // UTF-8 BOM
        [0xEF, 0xBB, 0xBF, ..] => XmlCharEncoding::UTF8,
        // UTF-16 BOM (BE)
        [0xFE, 0xFF, ..] => XmlCharEncoding::UTF16BE,
        // UTF-16 BOM (LE)
        [0xFF, 0xFE, ..] => XmlCharEncoding::UTF16LE,
        _ => XmlCharEncoding::None,
    }
}

/// Read the `encoding` pseudo-attribute of an XML or text declaration
/// directly from ASCII-compatible bytes, before any decoder exists.
pub fn sniff_declared_encoding(input: &[u8]) -> Option<String> {
    let input = input.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(input);
    let decl = input.strip_prefix(b"<?xml")?;
    if !decl.first().is_some_and(|b| b.is_ascii_whitespace()) {
        return None;
    }
    let end = decl.windows(2).position(|w| w == b"?>")?;
    let decl = &decl[..end];
    let pos = decl.windows(8).position(|w| w == b"encoding")?;
    let mut rest = decl[pos + 8..].trim_ascii_start();
    rest = rest.strip_prefix(b"=")?.trim_ascii_start();
    let quote = *rest.first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }
    let rest = &rest[1..];
    let close = rest.iter().position(|&b| b == quote)?;
    let name = std::str::from_utf8(&rest[..close]).ok()?;
    is_valid_encoding_name(name).then(|| name.to_owned())
}

/// `EncName ::= [A-Za-z] ([A-Za-z0-9._] | '-')*`
pub fn is_valid_encoding_name(name: &str) -> bool {
    let mut bytes = name.bytes();
    bytes.next().is_some_and(|b| b.is_ascii_alphabetic())
        && bytes.all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'-')
}

enum DecoderKind {
    Latin1,
    EncodingRs(encoding_rs::Decoder),
}

/// An incremental decoder from the bytes of an entity to UTF-8 text.
pub struct XmlDecoder {
    name: &'static str,
    kind: DecoderKind,
    read: usize,
}

impl XmlDecoder {
    pub fn new(encoding: XmlCharEncoding) -> Result<Self, EncodingError> {
        if encoding == XmlCharEncoding::ISO8859_1 {
            return Ok(Self {
                name: "ISO-8859-1",
                kind: DecoderKind::Latin1,
                read: 0,
            });
        }
        let Some(enc) = encoding.encoding_rs() else {
            return Err(EncodingError::Unsupported {
                name: encoding.get_name().unwrap_or("unknown").into(),
            });
        };
        Ok(Self {
            name: encoding.get_name().unwrap_or("UTF-8"),
            kind: DecoderKind::EncodingRs(enc.new_decoder()),
            read: 0,
        })
    }

    /// Create a decoder for a declared encoding name.
    ///
    /// Names unknown to [`XmlCharEncoding`] are looked up as WHATWG labels
    /// when `allow_labels` is set.
    pub fn for_label(label: &str, allow_labels: bool) -> Result<Self, EncodingError> {
        match label.parse::<XmlCharEncoding>() {
            Ok(encoding) => Self::new(encoding),
            Err(err) if allow_labels => {
                let Some(enc) = Encoding::for_label(label.as_bytes()) else {
                    return Err(err);
                };
                Ok(Self {
                    name: enc.name(),
                    kind: DecoderKind::EncodingRs(enc.new_decoder()),
                    read: 0,
                })
            }
            Err(err) => Err(err),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Decode all of `src` and append it to `dst`.
    ///
    /// `last` must be set on the final chunk so that a truncated sequence is reported.
    pub fn decode(&mut self, src: &[u8], dst: &mut String, last: bool) -> Result<(), EncodingError> {
        match &mut self.kind {
            DecoderKind::Latin1 => {
                dst.extend(src.iter().map(|&b| b as char));
                self.read += src.len();
                Ok(())
            }
            DecoderKind::EncodingRs(decoder) => {
                let mut src = src;
                loop {
                    let needed = decoder
                        .max_utf8_buffer_length_without_replacement(src.len())
                        .unwrap_or(src.len() * 3 + 16);
                    dst.reserve(needed);
                    let (res, read) = decoder.decode_to_string_without_replacement(src, dst, last);
                    self.read += read;
                    src = &src[read..];
                    match res {
                        DecoderResult::InputEmpty => return Ok(()),
                        DecoderResult::OutputFull => continue,
                        DecoderResult::Malformed(length, offset) => {
                            return Err(EncodingError::Malformed {
                                read: self.read,
                                length: length as usize,
                                offset: offset as usize,
                            });
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_encoding_test() {
        assert_eq!(detect_encoding(b"<?xml"), XmlCharEncoding::UTF8);
        assert_eq!(detect_encoding(b"\xFF\xFE<\x00"), XmlCharEncoding::UTF16LE);
        assert_eq!(detect_encoding(b"\x00\x00\x00<"), XmlCharEncoding::UCS4BE);
        assert_eq!(detect_encoding(b"<a/>"), XmlCharEncoding::None);
    }

    #[test]
    fn sniff_declared_encoding_test() {
        assert_eq!(
            sniff_declared_encoding(b"<?xml version='1.0' encoding='ISO-8859-1'?><a/>"),
            Some("ISO-8859-1".to_owned())
        );
        assert_eq!(
            sniff_declared_encoding(b"<?xml version=\"1.0\"?><a/>"),
            None
        );
        assert_eq!(sniff_declared_encoding(b"<a encoding='x'/>"), None);
        assert_eq!(
            sniff_declared_encoding(b"<?xml version='1.0' encoding='9bad'?>"),
            None
        );
    }

    #[test]
    fn decode_latin1_test() {
        let mut decoder = XmlDecoder::for_label("iso-8859-1", false).unwrap();
        let mut out = String::new();
        decoder.decode(b"caf\xE9", &mut out, true).unwrap();
        assert_eq!(out, "café");
    }

    #[test]
    fn decode_utf16_test() {
        let mut decoder = XmlDecoder::new(XmlCharEncoding::UTF16LE).unwrap();
        let mut out = String::new();
        decoder.decode(b"\xFF\xFE<\x00a\x00", &mut out, false).unwrap();
        decoder.decode(b"/\x00>\x00", &mut out, true).unwrap();
        assert_eq!(out, "<a/>");
    }

    #[test]
    fn decode_malformed_test() {
        let mut decoder = XmlDecoder::new(XmlCharEncoding::UTF8).unwrap();
        let mut out = String::new();
        let err = decoder.decode(b"ab\xFFc", &mut out, true).unwrap_err();
        assert!(err.malformed());
        assert!(XmlDecoder::new(XmlCharEncoding::EBCDIC).err().unwrap().unsupported());
    }
}

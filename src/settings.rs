use encoding::{DecoderTrap, EncoderTrap, EncodingRef};
use std::borrow::Cow;
use std::fmt;

/// Knobs for decoding records and rendering their text fields.
#[derive(Clone)]
pub struct CodecSettings {
    /// Encoding of string fields. Only used when converting to and from text; the record always
    /// stores the raw bytes.
    text_encoding: EncodingRef,
    /// Reject trailing bytes the template does not describe, instead of preserving them.
    strict: bool,
}

impl fmt::Debug for CodecSettings {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CodecSettings")
            .field("text_encoding", &self.text_encoding.name())
            .field("strict", &self.strict)
            .finish()
    }
}

impl PartialEq for CodecSettings {
    fn eq(&self, other: &Self) -> bool {
        self.text_encoding.name() == other.text_encoding.name() && self.strict == other.strict
    }
}

impl Default for CodecSettings {
    fn default() -> Self {
        CodecSettings {
            text_encoding: encoding::all::MAC_ROMAN,
            strict: false,
        }
    }
}

impl CodecSettings {
    pub fn new() -> Self {
        CodecSettings::default()
    }

    /// Sets the encoding used to present string fields as text.
    pub fn text_encoding(mut self, text_encoding: EncodingRef) -> Self {
        self.text_encoding = text_encoding;
        self
    }

    /// Looks up an encoding by its WHATWG label (`macintosh`, `windows-1252`, ...).
    pub fn text_encoding_label(self, label: &str) -> Option<Self> {
        let text_encoding = encoding::label::encoding_from_whatwg_label(label)?;
        Some(self.text_encoding(text_encoding))
    }

    /// When set, decoding fails if the template does not consume the whole buffer.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn get_text_encoding(&self) -> EncodingRef {
        self.text_encoding
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Renders raw string bytes as text; unmappable bytes become U+FFFD.
    pub fn decode_text(&self, bytes: &[u8]) -> String {
        self.text_encoding
            .decode(bytes, DecoderTrap::Replace)
            .unwrap_or_else(|_| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Converts user text back into raw string bytes.
    pub fn encode_text(&self, text: &str) -> Result<Vec<u8>, Cow<'static, str>> {
        self.text_encoding.encode(text, EncoderTrap::Strict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_roman_by_default() {
        let settings = CodecSettings::default();
        // 0xA5 is a bullet in Mac Roman.
        assert_eq!(settings.decode_text(&[b'a', 0xA5]), "a\u{2022}");
        assert_eq!(settings.encode_text("a\u{2022}").unwrap(), vec![b'a', 0xA5]);
    }

    #[test]
    fn test_unmappable_text_is_rejected() {
        let settings = CodecSettings::default();
        assert!(settings.encode_text("\u{4e2d}").is_err());
    }

    #[test]
    fn test_label_lookup() {
        let settings = CodecSettings::new().text_encoding_label("windows-1252").unwrap();
        assert_eq!(settings.get_text_encoding().name(), "windows-1252");
        assert!(CodecSettings::new().text_encoding_label("no-such-thing").is_none());
    }
}

use crate::err::{FourCharCodeError, Result};
use crate::record::Record;
use crate::settings::CodecSettings;
use crate::template::Template;

use bitflags::bitflags;
use encoding::{DecoderTrap, EncoderTrap, Encoding};
use log::debug;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// A resource type such as `STR#` or `DLOG`. Stored as four raw bytes; shown through Mac Roman.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FourCharCode(pub [u8; 4]);

impl FourCharCode {
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for FourCharCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = encoding::all::MAC_ROMAN
            .decode(&self.0, DecoderTrap::Replace)
            .map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

impl fmt::Debug for FourCharCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCharCode({:?})", self.to_string())
    }
}

impl FromStr for FourCharCode {
    type Err = FourCharCodeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bytes = encoding::all::MAC_ROMAN
            .encode(s, EncoderTrap::Strict)
            .map_err(|_| FourCharCodeError(s.to_owned()))?;
        let code: [u8; 4] = bytes
            .try_into()
            .map_err(|_| FourCharCodeError(s.to_owned()))?;
        Ok(FourCharCode(code))
    }
}

bitflags! {
    /// Resource attribute bits, as kept in a resource map entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ResourceAttributes: u8 {
        const SYS_HEAP = 0x40;
        const PURGEABLE = 0x20;
        const LOCKED = 0x10;
        const PROTECTED = 0x08;
        const PRELOAD = 0x04;
        /// Set once the data differs from what was read from disk.
        const CHANGED = 0x02;
    }
}

/// One resource: its identity, attributes and raw payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub type_code: FourCharCode,
    pub id: i16,
    /// Raw (Mac Roman) name bytes, when the resource is named.
    pub name: Option<Vec<u8>>,
    pub attributes: ResourceAttributes,
    pub data: Vec<u8>,
}

impl Resource {
    pub fn new(type_code: FourCharCode, id: i16, data: Vec<u8>) -> Self {
        Resource {
            type_code,
            id,
            name: None,
            attributes: ResourceAttributes::empty(),
            data,
        }
    }

    pub fn with_name(mut self, name: impl Into<Vec<u8>>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_attributes(mut self, attributes: ResourceAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn is_changed(&self) -> bool {
        self.attributes.contains(ResourceAttributes::CHANGED)
    }

    /// Decodes the payload against `template`.
    pub fn decode(&self, template: &Arc<Template>, settings: &CodecSettings) -> Result<Record> {
        Record::decode_with(template, &self.data, settings)
    }

    /// Replaces the payload with the encoding of `record`. The resource is only marked changed
    /// when the bytes actually differ.
    pub fn store(&mut self, record: &Record) -> Result<()> {
        let data = record.encode()?;
        if data != self.data {
            debug!(
                "'{}' {}: payload changed ({} -> {} bytes)",
                self.type_code,
                self.id,
                self.data.len(),
                data.len()
            );
            self.data = data;
            self.attributes.insert(ResourceAttributes::CHANGED);
        }
        Ok(())
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' ID {}", self.type_code, self.id)?;
        if let Some(name) = &self.name {
            let name = encoding::all::MAC_ROMAN
                .decode(name, DecoderTrap::Replace)
                .map_err(|_| fmt::Error)?;
            write!(f, " \"{name}\"")?;
        }
        write!(f, ", {} bytes", self.data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Value;

    #[test]
    fn test_four_char_code() {
        let code: FourCharCode = "STR#".parse().unwrap();
        assert_eq!(code.as_bytes(), b"STR#");
        assert_eq!(code.to_string(), "STR#");

        let code: FourCharCode = "PNT ".parse().unwrap();
        assert_eq!(code.0, *b"PNT ");

        assert!("STR".parse::<FourCharCode>().is_err());
        assert!("TEXTS".parse::<FourCharCode>().is_err());
    }

    #[test]
    fn test_store_marks_changed_only_on_difference() {
        let template = Arc::new(Template::rect());
        let data = vec![0, 10, 0, 5, 0, 100, 0, 50];
        let mut resource = Resource::new("RECT".parse().unwrap(), 128, data.clone())
            .with_name("bounds")
            .with_attributes(ResourceAttributes::PURGEABLE);

        let mut record = resource.decode(&template, &CodecSettings::default()).unwrap();
        resource.store(&record).unwrap();
        assert!(!resource.is_changed());
        assert_eq!(resource.data, data);

        record.set_value("bottom", Value::Int(200)).unwrap();
        resource.store(&record).unwrap();
        assert!(resource.is_changed());
        assert!(resource.attributes.contains(ResourceAttributes::PURGEABLE));
        assert_eq!(resource.data, vec![0, 10, 0, 5, 0, 200, 0, 50]);
        assert_eq!(resource.to_string(), "'RECT' ID 128 \"bounds\", 8 bytes");
    }
}

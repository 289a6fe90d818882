use crate::err::Result;
use crate::model::Value;
use crate::path::FieldPath;
use crate::record::Record;
use crate::settings::CodecSettings;
use crate::template::Template;

use log::{debug, info};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// What happened to the field at [`ChangeEvent::path`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeKind {
    Value { old: Value, new: Value },
    ItemInserted { index: usize },
    ItemRemoved { index: usize },
}

/// Emitted after every successful update of a record.
///
/// Derived changes (a count field following its group, offsets moving) are not reported
/// separately; observers re-read whatever they display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub path: FieldPath,
    #[serde(flatten)]
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn new(path: FieldPath, kind: ChangeKind) -> Self {
        ChangeEvent { path, kind }
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ChangeKind::Value { old, new } => write!(f, "{}: {} -> {}", self.path, old, new),
            ChangeKind::ItemInserted { index } => {
                write!(f, "{}: inserted item {}", self.path, index)
            }
            ChangeKind::ItemRemoved { index } => write!(f, "{}: removed item {}", self.path, index),
        }
    }
}

/// Receives the changes made through an [`EditSession`].
pub trait ChangeObserver {
    fn on_change(&mut self, event: &ChangeEvent);
}

impl<F> ChangeObserver for F
where
    F: FnMut(&ChangeEvent),
{
    fn on_change(&mut self, event: &ChangeEvent) {
        self(event)
    }
}

/// An editor's view of one resource: the decoded record, the settings used to present it, and
/// whoever wants to hear about edits.
///
/// Failed edits leave the record as it was and notify no one.
pub struct EditSession {
    record: Record,
    settings: CodecSettings,
    observers: Vec<Box<dyn ChangeObserver>>,
    dirty: bool,
}

impl fmt::Debug for EditSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditSession")
            .field("record", &self.record)
            .field("settings", &self.settings)
            .field("observers", &self.observers.len())
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl EditSession {
    /// Decodes `data` and starts editing it.
    pub fn open(template: &Arc<Template>, data: &[u8], settings: CodecSettings) -> Result<Self> {
        let record = Record::decode_with(template, data, &settings)?;
        debug!(
            "Opened {} byte record with {} top-level fields",
            data.len(),
            template.len()
        );
        Ok(EditSession::new(record, settings))
    }

    pub fn new(record: Record, settings: CodecSettings) -> Self {
        EditSession {
            record,
            settings,
            observers: Vec::new(),
            dirty: false,
        }
    }

    pub fn subscribe(&mut self, observer: impl ChangeObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn settings(&self) -> &CodecSettings {
        &self.settings
    }

    /// Whether anything changed since the session was opened or last saved.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_value(&mut self, path: impl Into<FieldPath>, value: Value) -> Result<ChangeEvent> {
        let event = self.record.set_value(path, value)?;
        Ok(self.publish(event))
    }

    pub fn set_text(&mut self, path: impl Into<FieldPath>, text: &str) -> Result<ChangeEvent> {
        let event = self.record.set_text(path, text, &self.settings)?;
        Ok(self.publish(event))
    }

    pub fn insert_item(&mut self, path: impl Into<FieldPath>, index: usize) -> Result<ChangeEvent> {
        let event = self.record.insert_item(path, index)?;
        Ok(self.publish(event))
    }

    pub fn remove_item(&mut self, path: impl Into<FieldPath>, index: usize) -> Result<ChangeEvent> {
        let event = self.record.remove_item(path, index)?;
        Ok(self.publish(event))
    }

    /// Encodes the record for writing back, and marks the session clean.
    pub fn save(&mut self) -> Result<Vec<u8>> {
        let bytes = self.record.encode()?;
        self.dirty = false;
        info!("Saved record ({} bytes)", bytes.len());
        Ok(bytes)
    }

    /// Ends the session, handing back the record.
    pub fn close(self) -> Record {
        if self.dirty {
            debug!("Closing session with unsaved changes");
        }
        self.record
    }

    fn publish(&mut self, event: ChangeEvent) -> ChangeEvent {
        self.dirty = true;
        debug!("{}", event);
        for observer in &mut self.observers {
            observer.on_change(&event);
        }
        event
    }
}

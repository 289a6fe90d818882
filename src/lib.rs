#![deny(unused_must_use)]
#![forbid(unsafe_code)]
// Don't allow dbg! prints in release.
#![cfg_attr(not(debug_assertions), deny(clippy::dbg_macro))]

#[cfg(test)]
#[macro_use]
extern crate pretty_assertions;

pub use codec::{decode, encode};
pub use err::{CodecError, Result, TemplateError};
pub use events::{ChangeEvent, ChangeKind, ChangeObserver, EditSession};
pub use json_output::record_to_json_value;
pub use model::{FieldNode, FieldView, NodeContent, TypeTag, Value};
pub use path::{FieldPath, Segment};
pub use record::Record;
pub use resource::{FourCharCode, Resource, ResourceAttributes};
pub use settings::CodecSettings;
pub use template::{
    Condition, EnumEntry, FieldDescriptor, FieldType, IntType, RepeatPolicy, Template,
};

mod codec;
pub mod err;
mod events;
mod json_output;
mod model;
mod path;
mod record;
mod resource;
mod settings;
pub mod template;
pub mod utils;

#[cfg(test)]
use std::sync::Once;

#[cfg(test)]
static LOGGER_INIT: Once = Once::new();

// Rust runs the tests concurrently, so unless we synchronize logging access
// it will crash when attempting to run `cargo test` with some logging facilities.
#[cfg(test)]
pub(crate) fn ensure_env_logger_initialized() {
    use std::io::Write;

    LOGGER_INIT.call_once(|| {
        let mut builder = env_logger::Builder::from_default_env();
        builder
            .format(|buf, record| writeln!(buf, "[{}] - {}", record.level(), record.args()))
            .is_test(true)
            .init();
    });
}

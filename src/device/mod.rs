//! Bridge device records and their metric schema.
//!
//! This module turns a raw `/list` payload from the bridge into typed
//! device records, and splits each record into series labels and metric
//! values according to a schema declared on the record type itself.
//!
//! ```text
//! payload bytes → decode → DeviceRecord → classify → Classification
//! ```

mod record;
mod schema;

pub use record::{decode, DecodeError, DeviceRecord};
pub use schema::{classify, Classification, RecordSchema};

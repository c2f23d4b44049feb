//! Model persistence: a text dump and a binary snapshot.

mod format;
mod snapshot;

pub use format::{read_model, write_model};
pub use snapshot::{load_snapshot, save_snapshot, ComponentRecord, ModelRecord};

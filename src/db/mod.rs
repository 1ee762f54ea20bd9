mod records;
mod scratch;

pub use records::{create_todos_collection, RecordStore, UpgradeHook};
pub use scratch::ScratchStore;

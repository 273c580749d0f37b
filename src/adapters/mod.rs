// Adapters layer: concrete implementations of the domain ports.

pub mod sink;
pub mod storage;

pub use sink::StorageSink;
pub use storage::LocalStorage;

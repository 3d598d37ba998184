pub mod disk;
pub mod memory;

pub use disk::CacheFile;
pub use memory::{PriceEntry, PriceStore};

pub mod arena;
pub mod comparator;
pub mod config;
pub mod encoding;
pub mod error;
pub mod filter;
pub mod sstable;

pub use arena::Arena;
pub use comparator::{BytewiseComparator, Comparator};
pub use config::{Compression, Options};
pub use error::{Error, Result};
pub use filter::{BloomFilterPolicy, FilterPolicy};
pub use sstable::TableBuilder;

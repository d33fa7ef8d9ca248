//! In-memory forms of local and combined vector stores.

pub mod combined;
pub mod docstore;
pub mod local;
pub mod vec_index;

pub use combined::{CombinedPaths, CombinedStore};
pub use docstore::Docstore;
pub use local::{LocalIndex, LocalIndexPaths};
pub use vec_index::VecIndex;

//! In-memory dense index and fragment store.

pub mod dense;
pub mod store;

pub use dense::MemoryDenseIndex;
pub use store::MemoryFragmentStore;

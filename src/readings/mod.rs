pub mod cursor;
pub mod store;

pub use cursor::{BackwardCursor, ForwardCursor};
pub use store::ReadingStore;

//! Category tree: configuration, arena storage, and persistence
//!
//! Audio triggers are organized in a hierarchy of categories. Inner nodes
//! group related sounds and carry shared settings (bus routing, cooldowns,
//! blocking); leaves hold the clip lists that actually play.

pub mod arena;
pub mod category;
pub mod persist;

pub use arena::CategoryTree;
pub use category::Category;

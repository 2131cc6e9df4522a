pub mod collection;
pub mod context;
pub mod error;
pub mod executor;
pub mod stats;

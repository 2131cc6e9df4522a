pub mod cursor;
pub mod error;
pub mod limit;
pub mod pipeline;
pub mod stage;

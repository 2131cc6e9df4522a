pub mod deps;
pub mod explain;
pub mod sort;

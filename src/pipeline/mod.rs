pub mod consensus;
pub mod safety;
pub mod structuring;

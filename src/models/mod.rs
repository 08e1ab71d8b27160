pub mod discussion;
pub mod enums;

pub use discussion::*;
pub use enums::*;

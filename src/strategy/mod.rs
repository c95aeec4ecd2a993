// Drivers built on the scanner

pub mod direct;
pub mod parallel;
pub mod reader;
pub mod streaming;

pub use direct::*;
pub use parallel::*;
pub use reader::*;
pub use streaming::*;

pub mod cache;
pub mod logger;
pub mod process;

pub use cache::*;
pub use logger::*;
pub use process::*;

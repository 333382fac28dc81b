pub mod error;
pub mod hooks;
pub mod machine;

pub use error::EmuError;
pub use machine::{Machine, Step};

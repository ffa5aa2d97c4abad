#![doc = include_str!("../README.md")]

pub mod decode;
pub mod error;
pub mod handle;
pub mod traits;
pub mod types;

pub use decode::*;
pub use error::*;
pub use handle::*;
pub use traits::*;
pub use types::*;

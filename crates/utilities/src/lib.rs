#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

mod debug_trace;
mod random_test;
mod test_logger;

pub use random_test::*;
pub use test_logger::*;

#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

mod aterm;
mod aterm_list;
mod config;
mod error;
mod protected;
mod random_term;
mod symbol;
mod term_pool;

pub mod storage;

pub use aterm::*;
pub use aterm_list::*;
pub use config::*;
pub use error::*;
pub use protected::*;
pub use random_term::*;
pub use symbol::*;
pub use term_pool::*;

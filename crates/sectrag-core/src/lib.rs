#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod chunker;
pub mod config;
pub mod corpus;
pub mod error;
pub mod sentences;
pub mod traits;
pub mod types;

pub use chunker::Chunker;
pub use corpus::Corpus;
pub use error::{Error, ErrorKind, Result};

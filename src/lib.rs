pub mod command;
pub mod config;
pub mod discovery;
pub mod error;
pub mod hash;
pub mod html;
pub mod metadata;
pub mod path;
pub mod reader;
pub mod resolver;
pub mod retry;
pub mod storage;
pub mod upload;

pub use error::{Error, Result};

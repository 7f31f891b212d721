#![forbid(unsafe_code)]

pub mod assertion;
pub mod config;
pub mod digest;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod host;
pub mod loader;
pub mod metadata;
pub mod outcome;
pub mod reporter;
pub mod runner;
pub mod selection;
pub mod shell_engine;
pub mod value;

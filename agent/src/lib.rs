//! UP2DATE Agent Library
//!
//! Device-side deployment decisions and package lifecycle tracking.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod installer;
pub mod logs;
pub mod models;
pub mod storage;
pub mod utils;
pub mod workers;

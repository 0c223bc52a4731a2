//! Deployment decisions and package lifecycle

pub mod cancel;
pub mod download;
pub mod engine;
pub mod fsm;
pub mod gate;
pub mod tracker;

pub mod client;
pub mod options;
pub mod run;
pub mod setup;
pub mod state;

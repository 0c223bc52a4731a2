//! Data models exchanged with the transport

pub mod deployment;

//! Library crate for torscan-rs: run nmap through a SOCKS proxy chain and
//! reduce its report to open ports, fingerprints and SSH auth methods.
pub mod command;
pub mod config;
pub mod error;
pub mod normalize;
pub mod preflight;
pub mod runner;
pub mod scan;
pub mod server;
pub mod tree;
pub mod types;

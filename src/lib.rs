pub mod cli;
pub mod client;
pub mod config;
pub mod context;
pub mod git;
pub mod install;
pub mod migrate;
pub mod model;
pub mod reconcile;
pub mod remote;

mod api;
mod flock;

pub use api::{Modkeeper, ModkeeperBuilder, RemoteSettings};

//! Labgate - entrypoint and configuration layer for a JupyterLab host
//!
//! This library provides:
//! - Argument normalization and keyword-based dispatch to sub-program entrypoints
//! - Declarative descriptors for processes supervised by the host's server proxy
//! - A runner executing a descriptor's build → launch chain
//! - The host configuration document read by Jupyter at startup
//! - The notebook example page handler and its page configuration record

pub mod argv;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod logging;
pub mod page;
pub mod runner;
pub mod server_proxy;

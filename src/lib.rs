// Library surface for the binary and the integration tests.
pub mod app_dirs;
pub mod config;
pub mod error;
pub mod handshake;
pub mod history;
pub mod items;
pub mod link;
pub mod logging;
pub mod practice;
pub mod protocol;
pub mod runtime;
pub mod session;
pub mod settings;
pub mod telemetry;
pub mod terminal;
pub mod ui;

pub use error::{Error, Result};

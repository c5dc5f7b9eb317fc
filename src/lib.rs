// Library surface for headless/integration tests and reuse.
// Terminal rendering stays in main.rs.
pub mod app_dirs;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod game;
pub mod gateway;
pub mod input;
pub mod logging;
pub mod runtime;
pub mod session;
pub mod stats;
pub mod timer;
pub mod util;

//! External command surfaces
//!
//! Modern Rust module organization (Rust 2018+ style):
//! - Each command module is its own file in the commands/ directory
//! - Public exports are defined here for convenience

pub mod control_api;

pub use control_api::{ControlState, router};

#![forbid(unsafe_code)]

//! Copies public YouTube playlists into one playlist owned by the user,
//! through an interactive terminal flow or a small web front end.

pub mod cli;
pub mod config;
pub mod copy;
pub mod error;
pub mod logging;
pub mod progress;
pub mod server;
pub mod session;
pub mod youtube;

pub use error::{Error, Result};

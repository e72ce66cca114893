pub mod config;
pub mod io;
pub mod prompt;
pub mod state;

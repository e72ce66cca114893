pub mod core;
pub mod engine;
pub mod services;
pub mod utils;

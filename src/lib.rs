pub mod cli;
pub mod config;
pub mod errors;
pub mod logging;
pub mod models;
pub mod services;
pub mod utils;

#[cfg(test)]
mod test_support;

pub mod client;
pub mod error;
pub mod launch;
pub mod repository;
pub mod runner;

pub use launch::{launch, parse_selectors};

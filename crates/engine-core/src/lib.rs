pub mod connectors;
pub mod error;
pub mod fetch;
pub mod insert;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

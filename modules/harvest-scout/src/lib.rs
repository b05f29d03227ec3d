pub mod bootstrap;
pub mod pipeline;
pub mod stages;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;

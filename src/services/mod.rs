//! Service layer
//!
//! Infrastructure concerns (image I/O) kept apart from the pipeline logic.

pub mod io;

pub use io::ImageIOService;

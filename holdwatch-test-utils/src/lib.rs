//! Shared helpers for Holdwatch test suites.

mod builders;
pub mod fixtures;
mod server;

pub use builders::{date, holding, RecordBuilder};
pub use server::{MockHttpServer, MockRoute, RecordedRequest};

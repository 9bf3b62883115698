//! Source retrieval, parsing and normalization for Holdwatch.
//!
//! A run flows fetch → parse → normalize per source; [`ingest::Ingestor`] drives the sources
//! concurrently and merges their output into a [`ingest::RunContext`].

pub mod coerce;
pub mod error;
pub mod fetch;
pub mod ingest;
pub mod normalize;
pub mod parser;

pub use error::{FetchError, NormalizationError, ParseError, RowError};
pub use fetch::{FetchedDocument, FilingMeta, HttpFetcher, HttpFetcherConfig, SourceFetcher};
pub use ingest::{IngestOptions, Ingestor, RunContext, RunSummary, SourceReport, SourceStatus};
pub use normalize::{NormalizedRow, Normalizer, SourceContext};
pub use parser::RawRow;

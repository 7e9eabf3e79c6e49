//! `warehouse-etl` moves raw files (and query results) into a relational warehouse.
//!
//! A run detects the file format, extracts the file into records, normalizes them, archives the
//! normalized batch as JSON in an object store, infers a column schema, creates the destination
//! table if needed, loads the records row by row, tags the table's columns as dimensions or
//! facts, and (re)creates a `<table>_star_view` over the table.
//!
//! The primary entrypoint is [`pipeline::Pipeline`]; the individual stages are usable on their
//! own.
//!
//! ## What you can extract
//!
//! **File formats (detected by extension, then by content):**
//!
//! - **Delimited text**: `.csv` (first row is the header, all cells are text)
//! - **JSON**: `.json` (array of objects, or a single object)
//! - **Spreadsheets** (requires the Cargo feature `excel`): `.xlsx`, `.xls`
//! - **SQL dumps**: `.dump`, `.sql`, `.gz` (recognized; loading them is not supported, the
//!   extractor returns no records)
//!
//! Tar archives and unrecognized files fail with [`ExtractError::UnsupportedFormat`].
//!
//! ## Quick example: extract a file
//!
//! ```no_run
//! use warehouse_etl::ingestion::{extract_from_path, ExtractOptions};
//!
//! # fn main() -> Result<(), warehouse_etl::ExtractError> {
//! let out = extract_from_path("customers.csv", &ExtractOptions::default())?;
//! println!("format={} records={}", out.format, out.records.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Full run against the in-process warehouse
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use warehouse_etl::archive::{ObjectStoreSink, RawArchiver};
//! use warehouse_etl::pipeline::Pipeline;
//! use warehouse_etl::warehouse::MemoryWarehouse;
//!
//! # async fn run() -> Result<(), warehouse_etl::PipelineError> {
//! let store = object_store::memory::InMemory::new();
//! let archiver = RawArchiver::new(Arc::new(ObjectStoreSink::new(Arc::new(store), "raw")));
//! let pipeline = Pipeline::new(Arc::new(MemoryWarehouse::new()), archiver);
//!
//! let report = pipeline.run_file("customers.csv").await?;
//! println!("records={} view={:?}", report.records, report.view);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`ingestion`]: format detection, extractors, and the unified entrypoint
//! - [`transform`]: per-record normalization
//! - [`schema`]: identifier sanitization and column-type inference
//! - [`warehouse`]: the [`warehouse::Warehouse`] trait, Postgres and in-memory backends
//! - [`table`], [`loader`], [`classify`], [`view`]: warehouse-side stages
//! - [`archive`]: raw archiving to S3-compatible storage
//! - [`pipeline`]: end-to-end runs
//! - [`config`]: command-line / environment configuration
//! - [`error`]: error types

pub mod archive;
pub mod classify;
pub mod config;
pub mod error;
pub mod ingestion;
pub mod loader;
pub mod pipeline;
pub mod schema;
pub mod table;
pub mod transform;
pub mod types;
pub mod view;
pub mod warehouse;

pub use error::{ExtractError, ExtractResult, PipelineError, PipelineResult};

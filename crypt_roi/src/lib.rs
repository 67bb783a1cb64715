//!
//! Crate for reading crypt annotations marked on a CyCIF image
//!
//! Currently supports only the geojson format produced by qupath
//!
#![deny(missing_docs)]

pub mod qupath;

pub use qupath::{load_crypts, load_crypts_file, Crypt};

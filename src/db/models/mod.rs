// src/db/models/mod.rs

//! Data models for manifest store entities
//!
//! One struct per table, with the queries the distribution engine needs.

mod package;
mod path_entry;

pub use package::Package;
pub use path_entry::PathEntry;

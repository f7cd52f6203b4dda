//! Taxonomic annotation engine.
//!
//! Runs BLAST or VSEARCH against a reference database under a bounded
//! concurrency governor and normalizes their raw output into one
//! taxonomy-annotated [`normalize::ResultDocument`].

pub mod cli;
pub mod config;
pub mod error;
pub mod governor;
pub mod job;
pub mod normalize;
pub mod registry;
pub mod service;
pub mod summary;
pub mod tools;
pub mod ui;

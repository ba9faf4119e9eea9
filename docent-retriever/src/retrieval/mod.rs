//! Building the index and answering questions from it.
//!
//! - [`scanner`] finds supported files under a root
//! - [`build_state`] and [`index_builder`] run the incremental build
//! - [`retriever`] ranks stored embeddings against a query vector
//! - [`synthesizer`] turns the top documents into a grounded answer

pub mod build_state;
pub mod document;
pub mod index_builder;
pub mod retriever;
pub mod scanner;
pub mod synthesizer;

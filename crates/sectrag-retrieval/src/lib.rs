//! Query-time retrieval and the stage orchestrator.
//!
//! [`Retriever`] turns a query into a ranked, section-weighted result set over
//! a [`sectrag_vector::SharedIndex`]; [`Pipeline`] sequences chunking,
//! embedding, indexing and asking over one corpus.
#![deny(unused_imports)]

pub mod pipeline;
pub mod retriever;

pub use pipeline::Pipeline;
pub use retriever::{normalize_query, RankedChunk, Retriever};

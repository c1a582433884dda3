//! Processing of provider report payloads: a tolerant tree walker over
//! the nested Rows/ColData structure, the narrative summarizer, the
//! statement formatter, and the trend analyzer.

pub mod statements;
pub mod summary;
pub mod trends;
pub mod tree;

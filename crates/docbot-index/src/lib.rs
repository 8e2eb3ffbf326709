pub mod artifact;
pub mod builder;
pub mod chunker;
pub mod extractor;
mod migrations;
pub mod normalizer;
pub mod vector_index;

pub use artifact::{IndexArtifact, INDEX_FILE_NAME};
pub use builder::{BuildSettings, IndexBuilder};
pub use chunker::{chunk_words, DEFAULT_CHUNK_WORDS};
pub use extractor::{DocumentExtractor, ExtractedDocument, ExtractorSettings};
pub use normalizer::normalize;
pub use vector_index::{SearchHit, VectorIndex, DEFAULT_COLLECTION};

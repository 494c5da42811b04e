//! Natural-language front end: lemmatization, speaker attribution and
//! catalog matching.

pub mod lemmatizer;
pub mod normalizer;
pub mod transcript;

pub use lemmatizer::{Lemmatize, RuleLemmatizer};
pub use normalizer::TextNormalizer;
pub use transcript::{parse_transcript, SpeakerDirectory, SpeakerTurn};

// Module declarations
pub mod persistence;
pub mod sentiment;

// Re-export all implementations
pub use persistence::{
    InMemoryCourseRepository, InMemoryFeedbackRepository, InMemoryInstitutionRepository,
    InMemoryUserRepository,
};
pub use sentiment::{HttpSentimentAnalyzer, LexiconSentimentAnalyzer};

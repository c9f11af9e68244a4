pub mod http_analyzer;
pub mod lexicon;

pub use http_analyzer::HttpSentimentAnalyzer;
pub use lexicon::LexiconSentimentAnalyzer;

use application::{ApplicationError, SentimentAnalyzer};
use async_trait::async_trait;
use domain::Sentiment;
use tracing::{debug, instrument};

const POSITIVE_WORDS: &[&str] = &[
    "amazing", "awesome", "best", "brilliant", "clear", "engaging", "enjoy", "enjoyed",
    "excellent", "fantastic", "fun", "good", "great", "helpful", "interesting", "knowledgeable",
    "learned", "like", "liked", "love", "loved", "nice", "organized", "patient", "recommend",
    "supportive", "useful", "well", "wonderful",
];

const NEGATIVE_WORDS: &[&str] = &[
    "awful", "bad", "boring", "confusing", "disorganized", "dislike", "hard", "hate", "hated",
    "horrible", "late", "messy", "poor", "rude", "slow", "terrible", "unclear", "unfair",
    "unhelpful", "useless", "waste", "worst", "worse",
];

const NEGATORS: &[&str] = &["not", "no", "never", "hardly", "barely", "without"];

/// A negator flips the polarity of sentiment words up to this many tokens later.
const NEGATION_WINDOW: usize = 3;

/// Offline word-polarity classifier, used when no external service is configured.
/// Positive totals are `positive`, negative totals `negative`, zero is `neutral`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexiconSentimentAnalyzer;

impl LexiconSentimentAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Sums word polarities, flipping those shortly after a negator.
    pub fn score(text: &str) -> i32 {
        // Typographic apostrophes, as in "wasn’t", tokenize like ASCII ones
        let lowered = text.to_lowercase().replace(['\u{2019}', '\u{2018}'], "'");
        let tokens = lowered
            .split(|c: char| !(c.is_alphanumeric() || c == '\''))
            .filter(|t| !t.is_empty());

        let mut score = 0;
        let mut negated_for = 0usize;
        for token in tokens {
            if NEGATORS.contains(&token) || token.ends_with("n't") {
                negated_for = NEGATION_WINDOW;
                continue;
            }
            let polarity = if POSITIVE_WORDS.contains(&token) {
                1
            } else if NEGATIVE_WORDS.contains(&token) {
                -1
            } else {
                0
            };
            if polarity != 0 {
                score += if negated_for > 0 { -polarity } else { polarity };
            }
            negated_for = negated_for.saturating_sub(1);
        }
        score
    }
}

#[async_trait]
impl SentimentAnalyzer for LexiconSentimentAnalyzer {
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    async fn analyze(&self, text: &str) -> Result<Sentiment, ApplicationError> {
        let score = Self::score(text);
        debug!(score, "Lexicon sentiment scored");
        Ok(match score {
            s if s > 0 => Sentiment::Positive,
            s if s < 0 => Sentiment::Negative,
            _ => Sentiment::Neutral,
        })
    }
}

//! Institution-wide feedback statistics.
//!
//! [`aggregate`] makes one pass over an institution's feedback, joined against
//! its course catalog, and produces everything the admin dashboard shows:
//! rating averages, per-course stats, and a per-sentiment breakdown.

use domain::{Course, CourseId, Feedback, Sentiment};
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Courses listed under "top courses".
pub const TOP_COURSES_LIMIT: usize = 4;
/// Courses listed under "needs attention".
pub const NEEDS_ATTENTION_LIMIT: usize = 4;
/// Average overall rating below which a course needs attention.
pub const NEEDS_ATTENTION_THRESHOLD: f64 = 3.6;

/// Averages go over the wire as strings with one decimal, e.g. `"4.3"`.
/// Ties round half away from zero, so 4.25 becomes `"4.3"`.
fn one_decimal<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{:.1}", (value * 10.0).round() / 10.0))
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct AverageRatings {
    #[serde(serialize_with = "one_decimal")]
    pub overall: f64,
    #[serde(serialize_with = "one_decimal")]
    pub instructor: f64,
    #[serde(serialize_with = "one_decimal")]
    pub content: f64,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SentimentCount {
    pub positive: usize,
    pub neutral: usize,
    pub negative: usize,
}

impl SentimentCount {
    fn bump(&mut self, sentiment: Sentiment) {
        match sentiment {
            Sentiment::Positive => self.positive += 1,
            Sentiment::Neutral => self.neutral += 1,
            Sentiment::Negative => self.negative += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.positive + self.neutral + self.negative
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CourseStats {
    pub course_id: CourseId,
    pub code: String,
    pub instructor: String,
    #[serde(serialize_with = "one_decimal")]
    pub avg_rating: f64,
    pub count: usize,
    pub positive_count: usize,
    pub neutral_count: usize,
    pub negative_count: usize,
}

/// One row of the sentiment breakdown. Course fields are `None` when the
/// feedback refers to a course that has since been deleted.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SentimentCourse {
    pub code: Option<String>,
    pub instructor: Option<String>,
    pub sem: Option<String>,
    pub dept: Option<String>,
    pub count: usize,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct SentimentDetails {
    pub positive: Vec<SentimentCourse>,
    pub neutral: Vec<SentimentCourse>,
    pub negative: Vec<SentimentCourse>,
}

impl SentimentDetails {
    pub fn for_sentiment(&self, sentiment: Sentiment) -> &[SentimentCourse] {
        match sentiment {
            Sentiment::Positive => &self.positive,
            Sentiment::Neutral => &self.neutral,
            Sentiment::Negative => &self.negative,
        }
    }

    fn for_sentiment_mut(&mut self, sentiment: Sentiment) -> &mut Vec<SentimentCourse> {
        match sentiment {
            Sentiment::Positive => &mut self.positive,
            Sentiment::Neutral => &mut self.neutral,
            Sentiment::Negative => &mut self.negative,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub total_feedback: usize,
    pub average_rating: AverageRatings,
    pub sentiment_count: SentimentCount,
    pub sentiment_details: SentimentDetails,
    pub top_courses: Vec<CourseStats>,
    pub needs_attention: Vec<CourseStats>,
}

#[derive(Default)]
struct CourseAccumulator {
    overall_sum: u64,
    count: usize,
    sentiments: SentimentCount,
}

/// Course attributes the breakdown groups on. All `None` for orphaned feedback.
type BreakdownKey<'a> = (Sentiment, Option<(&'a str, &'a str, &'a str, &'a str)>);

fn mean(sum: u64, count: usize) -> f64 {
    if count == 0 { 0.0 } else { sum as f64 / count as f64 }
}

fn by_rating_desc(a: &CourseStats, b: &CourseStats) -> Ordering {
    b.avg_rating
        .partial_cmp(&a.avg_rating)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.code.cmp(&b.code))
        .then_with(|| a.course_id.cmp(&b.course_id))
}

fn by_rating_asc(a: &CourseStats, b: &CourseStats) -> Ordering {
    a.avg_rating
        .partial_cmp(&b.avg_rating)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.code.cmp(&b.code))
        .then_with(|| a.course_id.cmp(&b.course_id))
}

/// Aggregates one institution's feedback. `courses` is the catalog used to
/// resolve course details; feedback whose course is missing still counts
/// towards the totals and the sentiment breakdown but gets no course stats.
pub fn aggregate(feedback: &[Feedback], courses: &[Course]) -> AnalyticsReport {
    if feedback.is_empty() {
        return AnalyticsReport::default();
    }

    let catalog: HashMap<CourseId, &Course> = courses.iter().map(|c| (c.id, c)).collect();

    let (mut overall_sum, mut instructor_sum, mut content_sum) = (0u64, 0u64, 0u64);
    let mut sentiment_count = SentimentCount::default();
    let mut per_course: HashMap<CourseId, CourseAccumulator> = HashMap::new();
    let mut breakdown: HashMap<BreakdownKey<'_>, usize> = HashMap::new();

    for entry in feedback {
        overall_sum += u64::from(entry.ratings.overall);
        instructor_sum += u64::from(entry.ratings.instructor);
        content_sum += u64::from(entry.ratings.content);
        sentiment_count.bump(entry.sentiment);

        let acc = per_course.entry(entry.course).or_default();
        acc.overall_sum += u64::from(entry.ratings.overall);
        acc.count += 1;
        acc.sentiments.bump(entry.sentiment);

        let details = catalog.get(&entry.course).map(|c| {
            (
                c.course_code.as_str(),
                c.instructor.as_str(),
                c.semester.as_str(),
                c.department.as_str(),
            )
        });
        *breakdown.entry((entry.sentiment, details)).or_insert(0) += 1;
    }

    let total = feedback.len();
    let average_rating = AverageRatings {
        overall: mean(overall_sum, total),
        instructor: mean(instructor_sum, total),
        content: mean(content_sum, total),
    };

    let mut course_stats: Vec<CourseStats> = per_course
        .into_iter()
        .filter_map(|(course_id, acc)| {
            let course = catalog.get(&course_id)?;
            Some(CourseStats {
                course_id,
                code: course.course_code.clone(),
                instructor: course.instructor.clone(),
                avg_rating: mean(acc.overall_sum, acc.count),
                count: acc.count,
                positive_count: acc.sentiments.positive,
                neutral_count: acc.sentiments.neutral,
                negative_count: acc.sentiments.negative,
            })
        })
        .collect();
    course_stats.sort_by(by_rating_desc);

    let mut needs_attention: Vec<CourseStats> = course_stats
        .iter()
        .filter(|c| c.avg_rating < NEEDS_ATTENTION_THRESHOLD)
        .cloned()
        .collect();
    needs_attention.sort_by(by_rating_asc);
    needs_attention.truncate(NEEDS_ATTENTION_LIMIT);

    let top_courses: Vec<CourseStats> = course_stats.into_iter().take(TOP_COURSES_LIMIT).collect();

    let mut sentiment_details = SentimentDetails::default();
    for ((sentiment, details), count) in breakdown {
        let own = |s: &str| Some(s.to_string());
        let row = match details {
            Some((code, instructor, sem, dept)) => SentimentCourse {
                code: own(code),
                instructor: own(instructor),
                sem: own(sem),
                dept: own(dept),
                count,
            },
            None => SentimentCourse {
                code: None,
                instructor: None,
                sem: None,
                dept: None,
                count,
            },
        };
        sentiment_details.for_sentiment_mut(sentiment).push(row);
    }
    for sentiment in Sentiment::ALL {
        sentiment_details
            .for_sentiment_mut(sentiment)
            .sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.code.cmp(&b.code)));
    }

    AnalyticsReport {
        total_feedback: total,
        average_rating,
        sentiment_count,
        sentiment_details,
        top_courses,
        needs_attention,
    }
}

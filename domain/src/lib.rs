use chrono::{DateTime, Utc};
use rand::{Rng, thread_rng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// --- Domain Errors ---
#[derive(Error, Debug, PartialEq)]
pub enum DomainError {
    #[error("Missing required field '{0}'")]
    MissingField(String),
    #[error("Invalid value for field '{field}': {reason}")]
    InvalidField { field: String, reason: String },
    #[error("Rating '{field}' must be between 1 and 5, got {value}")]
    RatingOutOfRange { field: String, value: i64 },
    #[error("Unknown {kind} '{value}'")]
    UnknownVariant { kind: &'static str, value: String },
}

/// Trims `value` and rejects it when nothing is left.
fn required(field: &str, value: &str) -> Result<String, DomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::MissingField(field.to_string()));
    }
    Ok(trimmed.to_string())
}

// --- Identifiers ---

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|e| DomainError::InvalidField {
                        field: stringify!($name).to_string(),
                        reason: e.to_string(),
                    })
            }
        }
    };
}

entity_id!(
    /// Identifies a tenant.
    InstitutionId
);
entity_id!(UserId);
entity_id!(CourseId);
entity_id!(FeedbackId);

// --- Institution ---

const COLLEGE_CODE_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const COLLEGE_CODE_LENGTH: usize = 8;

/// Generates a join token. Look-alike characters (0/O, 1/I) are left out so
/// codes survive being read aloud or copied by hand.
pub fn generate_college_code() -> String {
    let mut rng = thread_rng();
    (0..COLLEGE_CODE_LENGTH)
        .map(|_| {
            let idx = rng.gen_range(0..COLLEGE_CODE_CHARSET.len());
            COLLEGE_CODE_CHARSET[idx] as char
        })
        .collect()
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionPlan {
    #[default]
    Pilot,
    Pro,
    Enterprise,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Institution {
    pub id: InstitutionId,
    pub name: String,
    pub college_code: String,
    pub subscription_plan: SubscriptionPlan,
    pub created_at: DateTime<Utc>,
}

impl Institution {
    /// Creates an institution on the pilot plan with a fresh college code.
    pub fn new(name: &str) -> Result<Self, DomainError> {
        Ok(Self {
            id: InstitutionId::new(),
            name: required("institutionName", name)?,
            college_code: generate_college_code(),
            subscription_plan: SubscriptionPlan::default(),
            created_at: Utc::now(),
        })
    }

    pub fn regenerate_college_code(&mut self) {
        self.college_code = generate_college_code();
    }
}

// --- Users ---

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Admin,
}

/// Fields only students carry.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StudentProfile {
    pub current_semester: String,
    pub department: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub institution: InstitutionId,
    #[serde(flatten, default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<StudentProfile>,
    pub created_at: DateTime<Utc>,
}

/// Lower-cases and trims an email address and checks it has a local part and a domain.
pub fn normalize_email(email: &str) -> Result<String, DomainError> {
    let email = required("email", email)?.to_lowercase();
    let well_formed = matches!(
        email.split_once('@'),
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@')
    );
    if !well_formed {
        return Err(DomainError::InvalidField {
            field: "email".to_string(),
            reason: format!("'{}' is not a valid email address", email),
        });
    }
    Ok(email)
}

impl User {
    pub fn new_admin(name: &str, email: &str, institution: InstitutionId) -> Result<Self, DomainError> {
        Ok(Self {
            id: UserId::new(),
            name: required("name", name)?,
            email: normalize_email(email)?,
            role: Role::Admin,
            institution,
            profile: None,
            created_at: Utc::now(),
        })
    }

    pub fn new_student(
        name: &str,
        email: &str,
        institution: InstitutionId,
        current_semester: &str,
        department: &str,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            id: UserId::new(),
            name: required("name", name)?,
            email: normalize_email(email)?,
            role: Role::Student,
            institution,
            profile: Some(StudentProfile {
                current_semester: required("currentSemester", current_semester)?,
                department: required("department", department)?,
            }),
            created_at: Utc::now(),
        })
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_student(&self) -> bool {
        self.role == Role::Student
    }

    pub fn rename(&mut self, name: &str) -> Result<(), DomainError> {
        self.name = required("name", name)?;
        Ok(())
    }

    /// Moves a student to another semester. Returns false for admins, who have none.
    pub fn change_semester(&mut self, semester: &str) -> Result<bool, DomainError> {
        let semester = required("currentSemester", semester)?;
        match self.profile.as_mut() {
            Some(profile) => {
                profile.current_semester = semester;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// --- Courses ---

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CourseDraft {
    #[serde(default)]
    pub course_code: String,
    #[serde(default)]
    pub course_name: String,
    #[serde(default)]
    pub instructor: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub semester: String,
}

/// Partial update; absent fields are left untouched.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CourseUpdate {
    pub course_code: Option<String>,
    pub course_name: Option<String>,
    pub instructor: Option<String>,
    pub department: Option<String>,
    pub semester: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: CourseId,
    pub institution: InstitutionId,
    pub course_code: String,
    pub course_name: String,
    pub instructor: String,
    pub department: String,
    pub semester: String,
}

impl Course {
    pub fn new(institution: InstitutionId, draft: CourseDraft) -> Result<Self, DomainError> {
        Ok(Self {
            id: CourseId::new(),
            institution,
            course_code: required("courseCode", &draft.course_code)?,
            course_name: required("courseName", &draft.course_name)?,
            instructor: required("instructor", &draft.instructor)?,
            department: required("department", &draft.department)?,
            semester: required("semester", &draft.semester)?,
        })
    }

    /// Applies a partial update. Nothing changes unless every supplied field is valid.
    pub fn apply(&mut self, update: CourseUpdate) -> Result<(), DomainError> {
        let check = |field: &str, value: Option<String>| -> Result<Option<String>, DomainError> {
            value.map(|v| required(field, &v)).transpose()
        };
        let course_code = check("courseCode", update.course_code)?;
        let course_name = check("courseName", update.course_name)?;
        let instructor = check("instructor", update.instructor)?;
        let department = check("department", update.department)?;
        let semester = check("semester", update.semester)?;

        if let Some(v) = course_code {
            self.course_code = v;
        }
        if let Some(v) = course_name {
            self.course_name = v;
        }
        if let Some(v) = instructor {
            self.instructor = v;
        }
        if let Some(v) = department {
            self.department = v;
        }
        if let Some(v) = semester {
            self.semester = v;
        }
        Ok(())
    }

    /// Whether `user` may see this course: same institution, and for students
    /// the same semester and department.
    pub fn visible_to(&self, user: &User) -> bool {
        if self.institution != user.institution {
            return false;
        }
        match (&user.role, &user.profile) {
            (Role::Admin, _) => true,
            (Role::Student, Some(profile)) => {
                self.semester == profile.current_semester && self.department == profile.department
            }
            (Role::Student, None) => false,
        }
    }
}

// --- Feedback ---

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ratings {
    pub overall: u8,
    pub instructor: u8,
    pub content: u8,
}

impl Ratings {
    pub fn new(overall: i64, instructor: i64, content: i64) -> Result<Self, DomainError> {
        let check = |field: &str, value: i64| -> Result<u8, DomainError> {
            if (1..=5).contains(&value) {
                Ok(value as u8)
            } else {
                Err(DomainError::RatingOutOfRange {
                    field: field.to_string(),
                    value,
                })
            }
        };
        Ok(Self {
            overall: check("overall", overall)?,
            instructor: check("instructor", instructor)?,
            content: check("content", content)?,
        })
    }
}

macro_rules! label_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $label:literal),+ $(,)? }) => {
        #[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $(#[serde(rename = $label)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($label => Ok(Self::$variant),)+
                    other => Err(DomainError::UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

label_enum!(Workload, "workload", {
    VeryLight => "very-light",
    Light => "light",
    Moderate => "moderate",
    Heavy => "heavy",
    VeryHeavy => "very-heavy",
});

label_enum!(Difficulty, "difficulty", {
    VeryEasy => "very-easy",
    Easy => "easy",
    Moderate => "moderate",
    Difficult => "difficult",
    VeryDifficult => "very-difficult",
});

label_enum!(Sentiment, "sentiment", {
    Positive => "positive",
    Neutral => "neutral",
    Negative => "negative",
});

impl Sentiment {
    pub const ALL: [Sentiment; 3] = [Sentiment::Positive, Sentiment::Neutral, Sentiment::Negative];

    /// Maps a classifier label onto a sentiment. Case-insensitive; also accepts
    /// the short forms and the `LABEL_n` ids emitted by three-class models
    /// (0 = negative, 1 = neutral, 2 = positive).
    pub fn from_label(label: &str) -> Result<Self, DomainError> {
        match label.trim().to_ascii_lowercase().as_str() {
            "positive" | "pos" | "label_2" => Ok(Sentiment::Positive),
            "neutral" | "neu" | "label_1" => Ok(Sentiment::Neutral),
            "negative" | "neg" | "label_0" => Ok(Sentiment::Negative),
            _ => Err(DomainError::UnknownVariant {
                kind: "sentiment",
                value: label.to_string(),
            }),
        }
    }
}

/// A validated submission that has not been classified yet.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackDraft {
    course: CourseId,
    semester: String,
    ratings: Ratings,
    workload: Workload,
    difficulty: Difficulty,
    text: String,
}

impl FeedbackDraft {
    pub fn new(
        course: CourseId,
        semester: &str,
        ratings: Ratings,
        workload: Workload,
        difficulty: Difficulty,
        text: &str,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            course,
            semester: required("semester", semester)?,
            ratings,
            workload,
            difficulty,
            text: required("feedback", text)?,
        })
    }

    pub fn course(&self) -> &CourseId {
        &self.course
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub id: FeedbackId,
    pub course: CourseId,
    pub student: UserId,
    pub institution: InstitutionId,
    pub semester: String,
    pub ratings: Ratings,
    pub workload: Workload,
    pub difficulty: Difficulty,
    pub feedback: String,
    pub sentiment: Sentiment,
    pub created_at: DateTime<Utc>,
}

impl Feedback {
    /// Attaches the author and the classifier's verdict to a draft.
    pub fn from_draft(draft: FeedbackDraft, student: &User, sentiment: Sentiment) -> Self {
        Self {
            id: FeedbackId::new(),
            course: draft.course,
            student: student.id,
            institution: student.institution,
            semester: draft.semester,
            ratings: draft.ratings,
            workload: draft.workload,
            difficulty: draft.difficulty,
            feedback: draft.text,
            sentiment,
            created_at: Utc::now(),
        }
    }
}

use async_trait::async_trait;
use domain::{
    Course, CourseDraft, CourseId, CourseUpdate, DomainError, Feedback, FeedbackDraft, FeedbackId,
    Institution, InstitutionId, Ratings, Sentiment, User, UserId, normalize_email,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

pub mod analytics;

pub use analytics::{AnalyticsReport, CourseStats, SentimentCourse, aggregate};

// --- Application Errors ---
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("{0}")]
    AlreadyExists(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Domain validation error: {0}")]
    DomainError(#[from] DomainError), // Propagate domain errors cleanly
    #[error("Sentiment analysis failed: {0}")]
    SentimentError(String),
    #[error("Infrastructure error: {0}")]
    InfrastructureError(String),
}

impl ApplicationError {
    fn not_found(entity: &'static str, id: impl ToString) -> Self {
        ApplicationError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

// --- Infrastructure Interfaces (Traits) ---

/// Optional narrowing of a course listing.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct CourseFilter {
    pub semester: Option<String>,
    pub department: Option<String>,
}

impl CourseFilter {
    /// Drops blank values so `?semester=` behaves like no filter.
    fn normalized(self) -> Self {
        let keep = |v: Option<String>| {
            v.map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        Self {
            semester: keep(self.semester),
            department: keep(self.department),
        }
    }

    pub fn matches(&self, course: &Course) -> bool {
        self.semester.as_ref().is_none_or(|s| &course.semester == s)
            && self
                .department
                .as_ref()
                .is_none_or(|d| &course.department == d)
    }
}

/// Storage for tenants. Names and college codes are unique.
#[async_trait]
pub trait InstitutionRepository: Send + Sync {
    /// Saves (creates or updates) an institution. Fails with `AlreadyExists`
    /// if another institution holds the same name or college code.
    async fn save(&self, institution: &Institution) -> Result<(), ApplicationError>;
    async fn get(&self, id: &InstitutionId) -> Result<Option<Institution>, ApplicationError>;
    /// Case-insensitive lookup by name.
    async fn find_by_name(&self, name: &str) -> Result<Option<Institution>, ApplicationError>;
    async fn find_by_college_code(
        &self,
        code: &str,
    ) -> Result<Option<Institution>, ApplicationError>;
    /// Deletes an institution. Returns true if deleted.
    async fn delete(&self, id: &InstitutionId) -> Result<bool, ApplicationError>;
    async fn list(&self) -> Result<Vec<Institution>, ApplicationError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Saves (creates or updates) a user. Fails with `AlreadyExists` if the
    /// email belongs to another user.
    async fn save(&self, user: &User) -> Result<(), ApplicationError>;
    async fn get(&self, id: &UserId) -> Result<Option<User>, ApplicationError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, ApplicationError>;
}

#[async_trait]
pub trait CourseRepository: Send + Sync {
    async fn save(&self, course: &Course) -> Result<(), ApplicationError>;
    async fn get(&self, id: &CourseId) -> Result<Option<Course>, ApplicationError>;
    /// Deletes a course by its ID. Returns true if deleted.
    async fn delete(&self, id: &CourseId) -> Result<bool, ApplicationError>;
    /// All courses of one institution that pass `filter`, in no particular order.
    async fn list(
        &self,
        institution: &InstitutionId,
        filter: &CourseFilter,
    ) -> Result<Vec<Course>, ApplicationError>;
}

#[async_trait]
pub trait FeedbackRepository: Send + Sync {
    async fn save(&self, feedback: &Feedback) -> Result<(), ApplicationError>;
    async fn list_for_institution(
        &self,
        institution: &InstitutionId,
    ) -> Result<Vec<Feedback>, ApplicationError>;
}

/// Classifies free text. Implementations report failures as `SentimentError`.
#[async_trait]
pub trait SentimentAnalyzer: Send + Sync {
    async fn analyze(&self, text: &str) -> Result<Sentiment, ApplicationError>;
}

// --- Request/Response Models (Data Transfer Objects - DTOs) ---

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAdminRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub institution_name: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAdminResponse {
    pub user_id: UserId,
    pub institution_id: InstitutionId,
    /// Students join with this code.
    pub college_code: String,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct RegisterStudentRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub college_code: String,
    #[serde(default)]
    pub current_semester: String,
    #[serde(default)]
    pub department: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RegisterStudentResponse {
    pub user_id: UserId,
    pub institution_id: InstitutionId,
    pub institution_name: String,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub current_semester: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct InstitutionSummary {
    pub id: InstitutionId,
    pub name: String,
}

#[derive(Deserialize, Debug, Default, Clone, Copy)]
pub struct RatingInput {
    pub overall: Option<i64>,
    pub instructor: Option<i64>,
    pub content: Option<i64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SubmitFeedbackRequest {
    pub course_id: Option<String>,
    pub rating: Option<RatingInput>,
    pub feedback: Option<String>,
    pub semester: Option<String>,
    pub workload: Option<String>,
    pub difficulty: Option<String>,
}

impl SubmitFeedbackRequest {
    /// Checks presence of every field, then validates them into a draft.
    fn into_draft(self) -> Result<FeedbackDraft, ApplicationError> {
        let missing = || ApplicationError::InvalidInput("Missing required feedback fields.".to_string());
        let rating = self.rating.ok_or_else(missing)?;
        let (Some(overall), Some(instructor), Some(content)) =
            (rating.overall, rating.instructor, rating.content)
        else {
            return Err(missing());
        };
        let course_id = self.course_id.ok_or_else(missing)?;
        let text = self.feedback.ok_or_else(missing)?;
        let semester = self.semester.ok_or_else(missing)?;
        let workload = self.workload.ok_or_else(missing)?;
        let difficulty = self.difficulty.ok_or_else(missing)?;

        let draft = FeedbackDraft::new(
            course_id.parse::<CourseId>()?,
            &semester,
            Ratings::new(overall, instructor, content)?,
            workload.parse()?,
            difficulty.parse()?,
            &text,
        )?;
        Ok(draft)
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SubmitFeedbackResponse {
    pub feedback_id: FeedbackId,
    pub sentiment: Sentiment,
}

// --- Application Services (Use Cases) ---

/// Attempts at drawing an unused college code before giving up.
const MAX_COLLEGE_CODE_ATTEMPTS: usize = 5;

fn require_admin(caller: &User) -> Result<(), ApplicationError> {
    if caller.is_admin() {
        Ok(())
    } else {
        warn!(user = %caller.id, "Admin-only operation attempted by non-admin");
        Err(ApplicationError::Forbidden("Admin access required".to_string()))
    }
}

/// Service for tenants, accounts and profiles.
pub struct DirectoryService {
    institutions: Arc<dyn InstitutionRepository>,
    users: Arc<dyn UserRepository>,
}

impl DirectoryService {
    pub fn new(institutions: Arc<dyn InstitutionRepository>, users: Arc<dyn UserRepository>) -> Self {
        Self {
            institutions,
            users,
        }
    }

    /// Creates a new institution together with its first admin.
    #[instrument(skip(self, request), fields(institution_name = %request.institution_name))]
    pub async fn register_admin(
        &self,
        request: RegisterAdminRequest,
    ) -> Result<RegisterAdminResponse, ApplicationError> {
        info!("Attempting to register admin and institution");

        // Validate everything before touching storage
        let mut institution = Institution::new(&request.institution_name)?;
        let admin = User::new_admin(&request.name, &request.email, institution.id)?;

        if self.users.find_by_email(&admin.email).await?.is_some() {
            warn!("Registration failed: email already registered");
            return Err(ApplicationError::AlreadyExists("Email already registered".to_string()));
        }
        if self.institutions.find_by_name(&institution.name).await?.is_some() {
            warn!("Registration failed: institution name taken");
            return Err(ApplicationError::AlreadyExists(
                "An institution with this name already exists".to_string(),
            ));
        }

        self.assign_unused_college_code(&mut institution).await?;
        self.institutions.save(&institution).await?;
        info!(institution = %institution.id, college_code = %institution.college_code, "Institution created");

        if let Err(e) = self.users.save(&admin).await {
            error!(institution = %institution.id, "Failed to save admin user: {}", e);
            // Roll back so the name is free for a retry
            if let Err(del_err) = self.institutions.delete(&institution.id).await {
                error!(institution = %institution.id, "Rollback failed: could not delete institution after admin save failure: {}", del_err);
            }
            return Err(e);
        }
        info!(user = %admin.id, institution = %institution.id, "Admin user created and linked to institution");

        Ok(RegisterAdminResponse {
            user_id: admin.id,
            institution_id: institution.id,
            college_code: institution.college_code,
        })
    }

    async fn assign_unused_college_code(
        &self,
        institution: &mut Institution,
    ) -> Result<(), ApplicationError> {
        for attempt in 1..=MAX_COLLEGE_CODE_ATTEMPTS {
            if self
                .institutions
                .find_by_college_code(&institution.college_code)
                .await?
                .is_none()
            {
                return Ok(());
            }
            debug!(attempt, "College code collision, regenerating");
            institution.regenerate_college_code();
        }
        error!("Could not find an unused college code");
        Err(ApplicationError::InfrastructureError(
            "Failed to generate a unique college code".to_string(),
        ))
    }

    /// Creates a student account inside the institution the college code points at.
    #[instrument(skip(self, request))]
    pub async fn register_student(
        &self,
        request: RegisterStudentRequest,
    ) -> Result<RegisterStudentResponse, ApplicationError> {
        info!("Attempting to register student");

        let email = normalize_email(&request.email)?;
        if self.users.find_by_email(&email).await?.is_some() {
            warn!("Registration failed: email already registered");
            return Err(ApplicationError::AlreadyExists("Email already registered".to_string()));
        }

        let code = request.college_code.trim().to_ascii_uppercase();
        if code.is_empty() {
            return Err(DomainError::MissingField("collegeCode".to_string()).into());
        }
        let institution = self
            .institutions
            .find_by_college_code(&code)
            .await?
            .ok_or_else(|| {
                warn!("Registration failed: unknown college code");
                ApplicationError::InvalidInput(
                    "Invalid College Code. Please check the code.".to_string(),
                )
            })?;

        let student = User::new_student(
            &request.name,
            &request.email,
            institution.id,
            &request.current_semester,
            &request.department,
        )?;
        self.users.save(&student).await?;
        info!(user = %student.id, institution = %institution.id, "Student user created");

        Ok(RegisterStudentResponse {
            user_id: student.id,
            institution_id: institution.id,
            institution_name: institution.name,
        })
    }

    /// Loads the user a request is made on behalf of.
    #[instrument(skip(self))]
    pub async fn resolve_caller(&self, id: &UserId) -> Result<User, ApplicationError> {
        self.users.get(id).await?.ok_or_else(|| {
            warn!(user = %id, "Unknown caller");
            ApplicationError::Unauthenticated("Unknown user".to_string())
        })
    }

    #[instrument(skip(self, caller), fields(user = %caller.id))]
    pub async fn get_profile(&self, caller: &User) -> Result<User, ApplicationError> {
        self.users
            .get(&caller.id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("User", caller.id))
    }

    /// Renames the caller and, for students, moves them to another semester.
    #[instrument(skip(self, caller, request), fields(user = %caller.id))]
    pub async fn update_profile(
        &self,
        caller: &User,
        request: UpdateProfileRequest,
    ) -> Result<User, ApplicationError> {
        info!("Attempting to update profile");
        let mut user = self.get_profile(caller).await?;

        if let Some(name) = request.name.as_deref() {
            user.rename(name)?;
        }
        if let Some(semester) = request.current_semester.as_deref() {
            if !user.change_semester(semester)? {
                debug!("Ignoring semester change for non-student");
            }
        }

        self.users.save(&user).await?;
        info!("Profile updated");
        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn list_institutions(&self) -> Result<Vec<InstitutionSummary>, ApplicationError> {
        let mut summaries: Vec<InstitutionSummary> = self
            .institutions
            .list()
            .await?
            .into_iter()
            .map(|i| InstitutionSummary {
                id: i.id,
                name: i.name,
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }
}

/// Service for an institution's course catalog.
pub struct CourseService {
    courses: Arc<dyn CourseRepository>,
}

impl CourseService {
    pub fn new(courses: Arc<dyn CourseRepository>) -> Self {
        Self { courses }
    }

    /// Students see their own semester and department only; admins may filter.
    #[instrument(skip(self, caller), fields(user = %caller.id, institution = %caller.institution))]
    pub async fn list_courses(
        &self,
        caller: &User,
        filter: CourseFilter,
    ) -> Result<Vec<Course>, ApplicationError> {
        let filter = match &caller.profile {
            Some(profile) if caller.is_student() => CourseFilter {
                semester: Some(profile.current_semester.clone()),
                department: Some(profile.department.clone()),
            },
            _ if caller.is_admin() => filter.normalized(),
            _ => return Err(ApplicationError::Forbidden("Student profile incomplete".to_string())),
        };
        debug!(?filter, "Fetching courses");

        let mut courses = self.courses.list(&caller.institution, &filter).await?;
        courses.retain(|course| course.visible_to(caller));
        courses.sort_by(|a, b| {
            a.course_code
                .cmp(&b.course_code)
                .then_with(|| a.course_name.cmp(&b.course_name))
        });
        Ok(courses)
    }

    #[instrument(skip(self, caller, draft), fields(user = %caller.id))]
    pub async fn create_course(
        &self,
        caller: &User,
        draft: CourseDraft,
    ) -> Result<Course, ApplicationError> {
        require_admin(caller)?;
        let course = Course::new(caller.institution, draft)?;
        self.courses.save(&course).await?;
        info!(course = %course.id, code = %course.course_code, "Course created");
        Ok(course)
    }

    #[instrument(skip(self, caller, update), fields(user = %caller.id))]
    pub async fn update_course(
        &self,
        caller: &User,
        id: &CourseId,
        update: CourseUpdate,
    ) -> Result<Course, ApplicationError> {
        require_admin(caller)?;
        let mut course = self.owned_course(caller, id).await?;
        course.apply(update)?;
        self.courses.save(&course).await?;
        info!(course = %course.id, "Course updated");
        Ok(course)
    }

    #[instrument(skip(self, caller), fields(user = %caller.id))]
    pub async fn delete_course(&self, caller: &User, id: &CourseId) -> Result<(), ApplicationError> {
        require_admin(caller)?;
        self.owned_course(caller, id).await?;
        if !self.courses.delete(id).await? {
            // Removed concurrently between the lookup and the delete
            return Err(ApplicationError::not_found("Course", id));
        }
        info!(course = %id, "Course deleted");
        Ok(())
    }

    /// A course of another tenant is reported as missing, not forbidden.
    async fn owned_course(&self, caller: &User, id: &CourseId) -> Result<Course, ApplicationError> {
        match self.courses.get(id).await? {
            Some(course) if course.institution == caller.institution => Ok(course),
            _ => {
                warn!(course = %id, "Course not found in caller's institution");
                Err(ApplicationError::not_found("Course", id))
            }
        }
    }
}

/// Service for feedback submission and institution analytics.
pub struct FeedbackService {
    courses: Arc<dyn CourseRepository>,
    feedback: Arc<dyn FeedbackRepository>,
    analyzer: Arc<dyn SentimentAnalyzer>,
}

impl FeedbackService {
    pub fn new(
        courses: Arc<dyn CourseRepository>,
        feedback: Arc<dyn FeedbackRepository>,
        analyzer: Arc<dyn SentimentAnalyzer>,
    ) -> Self {
        Self {
            courses,
            feedback,
            analyzer,
        }
    }

    #[instrument(skip(self, caller, request), fields(user = %caller.id, institution = %caller.institution))]
    pub async fn submit_feedback(
        &self,
        caller: &User,
        request: SubmitFeedbackRequest,
    ) -> Result<SubmitFeedbackResponse, ApplicationError> {
        info!("Attempting to submit feedback");
        if !caller.is_student() {
            return Err(ApplicationError::Forbidden(
                "Only students can submit feedback".to_string(),
            ));
        }

        let draft = request.into_draft()?;

        // The course must belong to the student's institution
        match self.courses.get(draft.course()).await? {
            Some(course) if course.institution == caller.institution => {}
            _ => {
                warn!(course = %draft.course(), "Feedback rejected: course not found in institution");
                return Err(ApplicationError::not_found("Course", draft.course()));
            }
        }

        let sentiment = self.analyzer.analyze(draft.text()).await.map_err(|e| {
            error!("Sentiment analysis failed: {}", e);
            match e {
                ApplicationError::SentimentError(_) => e,
                other => ApplicationError::SentimentError(other.to_string()),
            }
        })?;
        debug!(%sentiment, "Feedback classified");

        let feedback = Feedback::from_draft(draft, caller, sentiment);
        self.feedback.save(&feedback).await?;
        info!(feedback = %feedback.id, course = %feedback.course, %sentiment, "Feedback saved");

        Ok(SubmitFeedbackResponse {
            feedback_id: feedback.id,
            sentiment,
        })
    }

    #[instrument(skip(self, caller), fields(user = %caller.id, institution = %caller.institution))]
    pub async fn get_analytics(&self, caller: &User) -> Result<AnalyticsReport, ApplicationError> {
        require_admin(caller)?;
        info!("Generating analytics");
        let start_time = Instant::now();

        let all_courses = CourseFilter::default();
        let (feedback, courses) = tokio::join!(
            self.feedback.list_for_institution(&caller.institution),
            self.courses.list(&caller.institution, &all_courses),
        );
        let feedback = feedback.map_err(|e| {
            error!("Failed to load feedback for analytics: {}", e);
            e
        })?;
        let courses = courses.map_err(|e| {
            error!("Failed to load courses for analytics: {}", e);
            e
        })?;

        let report = aggregate(&feedback, &courses);
        info!(
            total_feedback = report.total_feedback,
            courses = courses.len(),
            time_ms = start_time.elapsed().as_millis(),
            "Analytics generated"
        );
        Ok(report)
    }
}

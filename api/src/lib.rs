use axum::{
    Json, Router, async_trait,
    extract::{FromRequest, FromRequestParts, Path, Query, Request, State},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use tracing::{error, info, warn};

use application::{
    AnalyticsReport, ApplicationError, CourseFilter, CourseService, DirectoryService,
    FeedbackService, RegisterAdminRequest, RegisterStudentRequest, SentimentAnalyzer,
    SubmitFeedbackRequest, UpdateProfileRequest,
};
use domain::{CourseDraft, CourseId, CourseUpdate, User, UserId};
use infrastructure::{
    InMemoryCourseRepository, InMemoryFeedbackRepository, InMemoryInstitutionRepository,
    InMemoryUserRepository,
};

pub mod config;

/// Header an upstream gateway sets to the authenticated user's id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub directory_service: Arc<DirectoryService>,
    pub course_service: Arc<CourseService>,
    pub feedback_service: Arc<FeedbackService>,
}

impl AppState {
    /// Wires the services against fresh in-memory repositories.
    pub fn in_memory(analyzer: Arc<dyn SentimentAnalyzer>) -> Self {
        // 1. Create infrastructure components
        let institution_repository = Arc::new(InMemoryInstitutionRepository::new());
        let user_repository = Arc::new(InMemoryUserRepository::new());
        let course_repository = Arc::new(InMemoryCourseRepository::new());
        let feedback_repository = Arc::new(InMemoryFeedbackRepository::new());

        // 2. Create application services, injecting dependencies
        Self {
            directory_service: Arc::new(DirectoryService::new(
                institution_repository,
                user_repository,
            )),
            course_service: Arc::new(CourseService::new(course_repository.clone())),
            feedback_service: Arc::new(FeedbackService::new(
                course_repository,
                feedback_repository,
                analyzer,
            )),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Accounts
        .route("/api/auth/register-admin", post(register_admin_handler))
        .route("/api/auth/register-student", post(register_student_handler))
        .route(
            "/api/auth/profile",
            get(get_profile_handler).put(update_profile_handler),
        )
        .route("/api/institutions", get(list_institutions_handler))
        // Course catalog
        .route(
            "/api/courses",
            get(list_courses_handler).post(create_course_handler),
        )
        .route(
            "/api/courses/:id",
            put(update_course_handler).delete(delete_course_handler),
        )
        // Feedback
        .route("/api/feedback", post(submit_feedback_handler))
        .route("/api/feedback/analytics", get(get_analytics_handler))
        .with_state(state)
}

// --- Response Envelopes ---

#[derive(Serialize)]
struct SuccessBody<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
}

#[derive(Serialize)]
struct AnalyticsBody {
    success: bool,
    #[serde(flatten)]
    report: AnalyticsReport,
}

fn success<T: Serialize>(status: StatusCode, data: T) -> Response {
    (
        status,
        Json(SuccessBody {
            success: true,
            message: None,
            data: Some(data),
        }),
    )
        .into_response()
}

fn success_message(status: StatusCode, message: &'static str) -> Response {
    (
        status,
        Json(SuccessBody::<()> {
            success: true,
            message: Some(message),
            data: None,
        }),
    )
        .into_response()
}

// --- Caller Extraction ---

/// The authenticated user a request runs for, resolved from [`USER_ID_HEADER`].
pub struct Caller(pub User);

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let unauthenticated = |reason: &str| {
            map_application_error_to_response(ApplicationError::Unauthenticated(reason.to_string()))
        };
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| unauthenticated("Missing caller identity"))?;
        let id = raw
            .to_str()
            .ok()
            .and_then(|value| value.parse::<UserId>().ok())
            .ok_or_else(|| unauthenticated("Malformed caller identity"))?;

        state
            .directory_service
            .resolve_caller(&id)
            .await
            .map(Caller)
            .map_err(map_application_error_to_response)
    }
}

/// JSON request body whose rejections use the same error envelope as the handlers.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                warn!("Rejected request body: {}", rejection.body_text());
                Err(map_application_error_to_response(
                    ApplicationError::InvalidInput(rejection.body_text()),
                ))
            }
        }
    }
}

fn parse_course_id(raw: &str) -> Result<CourseId, Response> {
    raw.parse::<CourseId>()
        .map_err(|e| map_application_error_to_response(e.into()))
}

// --- API Handlers ---

async fn health_check() -> impl IntoResponse {
    info!("Health check endpoint called");
    (StatusCode::OK, "OK")
}

// --- Account Handlers ---

async fn register_admin_handler(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<RegisterAdminRequest>,
) -> Response {
    info!("Received request to register admin");
    match state.directory_service.register_admin(payload).await {
        Ok(response) => {
            info!(institution = %response.institution_id, "Admin registered via handler");
            success(StatusCode::CREATED, response)
        }
        Err(e) => {
            warn!("Failed to register admin via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

async fn register_student_handler(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<RegisterStudentRequest>,
) -> Response {
    info!("Received request to register student");
    match state.directory_service.register_student(payload).await {
        Ok(response) => {
            info!(institution = %response.institution_id, "Student registered via handler");
            success(StatusCode::CREATED, response)
        }
        Err(e) => {
            warn!("Failed to register student via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

async fn get_profile_handler(State(state): State<AppState>, Caller(caller): Caller) -> Response {
    match state.directory_service.get_profile(&caller).await {
        Ok(user) => success(StatusCode::OK, user),
        Err(e) => map_application_error_to_response(e),
    }
}

async fn update_profile_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
    JsonBody(payload): JsonBody<UpdateProfileRequest>,
) -> Response {
    info!(user = %caller.id, "Received request to update profile");
    match state.directory_service.update_profile(&caller, payload).await {
        Ok(user) => success(StatusCode::OK, user),
        Err(e) => {
            warn!(user = %caller.id, "Failed to update profile via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

async fn list_institutions_handler(State(state): State<AppState>) -> Response {
    match state.directory_service.list_institutions().await {
        Ok(institutions) => success(StatusCode::OK, institutions),
        Err(e) => {
            error!("Failed to list institutions via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

// --- Course Handlers ---

/// Handler for listing courses (GET /api/courses?semester=..&department=..).
async fn list_courses_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Query(filter): Query<CourseFilter>,
) -> Response {
    info!(user = %caller.id, "Received request to list courses");
    match state.course_service.list_courses(&caller, filter).await {
        Ok(courses) => success(StatusCode::OK, courses),
        Err(e) => {
            warn!(user = %caller.id, "Failed to list courses via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

async fn create_course_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
    JsonBody(payload): JsonBody<CourseDraft>,
) -> Response {
    info!(user = %caller.id, "Received request to create course");
    match state.course_service.create_course(&caller, payload).await {
        Ok(course) => success(StatusCode::CREATED, course),
        Err(e) => {
            warn!(user = %caller.id, "Failed to create course via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

async fn update_course_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
    JsonBody(payload): JsonBody<CourseUpdate>,
) -> Response {
    info!(user = %caller.id, course = %id, "Received request to update course");
    let id = match parse_course_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match state.course_service.update_course(&caller, &id, payload).await {
        Ok(course) => success(StatusCode::OK, course),
        Err(e) => {
            warn!(user = %caller.id, course = %id, "Failed to update course via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

async fn delete_course_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Response {
    info!(user = %caller.id, course = %id, "Received request to delete course");
    let id = match parse_course_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match state.course_service.delete_course(&caller, &id).await {
        Ok(()) => success_message(StatusCode::OK, "Course deleted successfully"),
        Err(e) => {
            warn!(user = %caller.id, course = %id, "Failed to delete course via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

// --- Feedback Handlers ---

async fn submit_feedback_handler(
    State(state): State<AppState>,
    Caller(caller): Caller,
    JsonBody(payload): JsonBody<SubmitFeedbackRequest>,
) -> Response {
    info!(user = %caller.id, "Received feedback submission");
    match state.feedback_service.submit_feedback(&caller, payload).await {
        Ok(response) => {
            info!(user = %caller.id, sentiment = %response.sentiment, "Feedback submitted via handler");
            success(StatusCode::CREATED, response)
        }
        Err(e) => {
            warn!(user = %caller.id, "Failed to submit feedback via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

async fn get_analytics_handler(State(state): State<AppState>, Caller(caller): Caller) -> Response {
    info!(user = %caller.id, institution = %caller.institution, "Received request for analytics");
    match state.feedback_service.get_analytics(&caller).await {
        Ok(report) => (
            StatusCode::OK,
            Json(AnalyticsBody {
                success: true,
                report,
            }),
        )
            .into_response(),
        Err(e) => {
            error!(user = %caller.id, "Failed to get analytics via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

/// Maps ApplicationError to an HTTP status code and a JSON error body.
pub fn map_application_error_to_response(err: ApplicationError) -> Response {
    let (status, message) = match err {
        ApplicationError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
        ApplicationError::DomainError(domain_err) => {
            // Domain validation failures are the client's fault
            (StatusCode::BAD_REQUEST, domain_err.to_string())
        }
        ApplicationError::Unauthenticated(msg) => (StatusCode::UNAUTHORIZED, msg),
        ApplicationError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
        e @ ApplicationError::NotFound { .. } => (StatusCode::NOT_FOUND, e.to_string()),
        ApplicationError::AlreadyExists(msg) => (StatusCode::CONFLICT, msg),
        ApplicationError::SentimentError(msg) => {
            error!("Sentiment service error: {}", msg);
            (
                StatusCode::BAD_GATEWAY,
                "Error analyzing sentiment.".to_string(),
            )
        }
        ApplicationError::InfrastructureError(msg) => {
            error!("Underlying infrastructure error: {}", msg);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An internal server error occurred".to_string(),
            )
        }
    };
    (
        status,
        Json(ErrorBody {
            success: false,
            message,
        }),
    )
        .into_response()
}

use application::{
    ApplicationError, CourseFilter, CourseService, DirectoryService, FeedbackRepository,
    FeedbackService, InstitutionRepository, RatingInput, RegisterAdminRequest,
    RegisterStudentRequest, SentimentAnalyzer, SubmitFeedbackRequest, UpdateProfileRequest,
    UserRepository,
};
use async_trait::async_trait;
use domain::{CourseDraft, CourseId, CourseUpdate, DomainError, Sentiment, User, UserId};
use infrastructure::{
    InMemoryCourseRepository, InMemoryFeedbackRepository, InMemoryInstitutionRepository,
    InMemoryUserRepository, LexiconSentimentAnalyzer,
};
use std::sync::Arc;

/// Always returns the same label.
struct FixedAnalyzer(Sentiment);

#[async_trait]
impl SentimentAnalyzer for FixedAnalyzer {
    async fn analyze(&self, _text: &str) -> Result<Sentiment, ApplicationError> {
        Ok(self.0)
    }
}

struct FailingAnalyzer;

#[async_trait]
impl SentimentAnalyzer for FailingAnalyzer {
    async fn analyze(&self, _text: &str) -> Result<Sentiment, ApplicationError> {
        Err(ApplicationError::InfrastructureError("connection refused".to_string()))
    }
}

struct Harness {
    institutions: Arc<InMemoryInstitutionRepository>,
    users: Arc<InMemoryUserRepository>,
    feedback_repo: Arc<InMemoryFeedbackRepository>,
    directory: DirectoryService,
    courses: CourseService,
    feedback: FeedbackService,
}

fn harness_with(analyzer: Arc<dyn SentimentAnalyzer>) -> Harness {
    let institutions = Arc::new(InMemoryInstitutionRepository::new());
    let users = Arc::new(InMemoryUserRepository::new());
    let course_repo = Arc::new(InMemoryCourseRepository::new());
    let feedback_repo = Arc::new(InMemoryFeedbackRepository::new());
    Harness {
        directory: DirectoryService::new(institutions.clone(), users.clone()),
        courses: CourseService::new(course_repo.clone()),
        feedback: FeedbackService::new(course_repo, feedback_repo.clone(), analyzer),
        institutions,
        users,
        feedback_repo,
    }
}

fn harness() -> Harness {
    harness_with(Arc::new(LexiconSentimentAnalyzer::new()))
}

impl Harness {
    async fn admin(&self, institution: &str, email: &str) -> (User, String) {
        let response = self
            .directory
            .register_admin(RegisterAdminRequest {
                name: "Admin".to_string(),
                email: email.to_string(),
                institution_name: institution.to_string(),
            })
            .await
            .expect("admin registration");
        let user = self.directory.resolve_caller(&response.user_id).await.unwrap();
        (user, response.college_code)
    }

    async fn student(&self, code: &str, email: &str, semester: &str, department: &str) -> User {
        let response = self
            .directory
            .register_student(RegisterStudentRequest {
                name: "Student".to_string(),
                email: email.to_string(),
                college_code: code.to_string(),
                current_semester: semester.to_string(),
                department: department.to_string(),
            })
            .await
            .expect("student registration");
        self.directory.resolve_caller(&response.user_id).await.unwrap()
    }

    async fn course(&self, admin: &User, code: &str, semester: &str, department: &str) -> CourseId {
        self.courses
            .create_course(
                admin,
                CourseDraft {
                    course_code: code.to_string(),
                    course_name: format!("{} course", code),
                    instructor: "Dr. Rao".to_string(),
                    department: department.to_string(),
                    semester: semester.to_string(),
                },
            )
            .await
            .expect("course creation")
            .id
    }
}

fn submission(course: CourseId, overall: i64, text: &str) -> SubmitFeedbackRequest {
    SubmitFeedbackRequest {
        course_id: Some(course.to_string()),
        rating: Some(RatingInput {
            overall: Some(overall),
            instructor: Some(4),
            content: Some(4),
        }),
        feedback: Some(text.to_string()),
        semester: Some("Fall 2024".to_string()),
        workload: Some("moderate".to_string()),
        difficulty: Some("easy".to_string()),
    }
}

#[tokio::test]
async fn admin_registration_creates_institution_with_code() {
    let h = harness();
    let (admin, code) = h.admin("Riverside College", "dean@riverside.edu").await;

    assert!(admin.is_admin());
    let institution = h
        .institutions
        .find_by_college_code(&code)
        .await
        .unwrap()
        .expect("institution stored under its code");
    assert_eq!(institution.id, admin.institution);
    assert_eq!(institution.name, "Riverside College");
}

#[tokio::test]
async fn duplicate_institution_or_email_is_rejected() {
    let h = harness();
    h.admin("Riverside College", "dean@riverside.edu").await;

    let same_name = h
        .directory
        .register_admin(RegisterAdminRequest {
            name: "Other".to_string(),
            email: "other@riverside.edu".to_string(),
            institution_name: "riverside college".to_string(),
        })
        .await;
    assert!(matches!(same_name, Err(ApplicationError::AlreadyExists(_))));

    let same_email = h
        .directory
        .register_admin(RegisterAdminRequest {
            name: "Other".to_string(),
            email: "DEAN@riverside.edu".to_string(),
            institution_name: "Hillside College".to_string(),
        })
        .await;
    assert!(matches!(same_email, Err(ApplicationError::AlreadyExists(_))));
    assert!(h.institutions.find_by_name("Hillside College").await.unwrap().is_none());
}

#[tokio::test]
async fn student_joins_by_college_code() {
    let h = harness();
    let (admin, code) = h.admin("Riverside College", "dean@riverside.edu").await;

    let student = h
        .student(&code.to_lowercase(), "asha@riverside.edu", "Fall 2024", "CS")
        .await;
    assert!(student.is_student());
    assert_eq!(student.institution, admin.institution);

    let bad_code = h
        .directory
        .register_student(RegisterStudentRequest {
            name: "Ravi".to_string(),
            email: "ravi@riverside.edu".to_string(),
            college_code: "ZZZZZZZZ".to_string(),
            current_semester: "Fall 2024".to_string(),
            department: "CS".to_string(),
        })
        .await;
    assert!(matches!(bad_code, Err(ApplicationError::InvalidInput(_))));
}

#[tokio::test]
async fn taken_email_is_reported_before_college_code() {
    let h = harness();
    let (_, code) = h.admin("Riverside College", "dean@riverside.edu").await;
    h.student(&code, "asha@riverside.edu", "Fall 2024", "CS").await;

    let result = h
        .directory
        .register_student(RegisterStudentRequest {
            name: "Asha".to_string(),
            email: " ASHA@riverside.edu".to_string(),
            college_code: "ZZZZZZZZ".to_string(),
            current_semester: "Fall 2024".to_string(),
            department: "CS".to_string(),
        })
        .await;
    assert!(matches!(result, Err(ApplicationError::AlreadyExists(_))));
}

#[tokio::test]
async fn unknown_caller_is_unauthenticated() {
    let h = harness();
    let result = h.directory.resolve_caller(&UserId::new()).await;
    assert!(matches!(result, Err(ApplicationError::Unauthenticated(_))));
}

#[tokio::test]
async fn profile_update_ignores_semester_for_admins() {
    let h = harness();
    let (admin, code) = h.admin("Riverside College", "dean@riverside.edu").await;
    let student = h.student(&code, "asha@riverside.edu", "Fall 2024", "CS").await;

    let updated = h
        .directory
        .update_profile(
            &student,
            UpdateProfileRequest {
                name: Some("Asha K".to_string()),
                current_semester: Some("Spring 2025".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "Asha K");
    assert_eq!(updated.profile.unwrap().current_semester, "Spring 2025");

    let admin_updated = h
        .directory
        .update_profile(
            &admin,
            UpdateProfileRequest {
                name: None,
                current_semester: Some("Spring 2025".to_string()),
            },
        )
        .await
        .unwrap();
    assert!(admin_updated.profile.is_none());
    let stored = h.users.get(&admin.id).await.unwrap().unwrap();
    assert_eq!(stored.name, "Admin");
}

#[tokio::test]
async fn students_only_see_their_semester_and_department() {
    let h = harness();
    let (admin, code) = h.admin("Riverside College", "dean@riverside.edu").await;
    h.course(&admin, "CS101", "Fall 2024", "CS").await;
    h.course(&admin, "CS201", "Spring 2025", "CS").await;
    h.course(&admin, "MA101", "Fall 2024", "Math").await;

    let (other_admin, _) = h.admin("Hillside College", "dean@hillside.edu").await;
    h.course(&other_admin, "CS100", "Fall 2024", "CS").await;

    let student = h.student(&code, "asha@riverside.edu", "Fall 2024", "CS").await;
    // A student's own filter cannot widen what they see
    let visible = h
        .courses
        .list_courses(
            &student,
            CourseFilter {
                semester: Some("Spring 2025".to_string()),
                department: None,
            },
        )
        .await
        .unwrap();
    let codes: Vec<&str> = visible.iter().map(|c| c.course_code.as_str()).collect();
    assert_eq!(codes, vec!["CS101"]);

    let all = h.courses.list_courses(&admin, CourseFilter::default()).await.unwrap();
    let codes: Vec<&str> = all.iter().map(|c| c.course_code.as_str()).collect();
    assert_eq!(codes, vec!["CS101", "CS201", "MA101"]);

    let fall = h
        .courses
        .list_courses(
            &admin,
            CourseFilter {
                semester: Some("Fall 2024".to_string()),
                department: Some(" ".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(fall.len(), 2);
}

#[tokio::test]
async fn course_management_is_admin_only_and_tenant_scoped() {
    let h = harness();
    let (admin, code) = h.admin("Riverside College", "dean@riverside.edu").await;
    let (other_admin, _) = h.admin("Hillside College", "dean@hillside.edu").await;
    let student = h.student(&code, "asha@riverside.edu", "Fall 2024", "CS").await;
    let course = h.course(&admin, "CS101", "Fall 2024", "CS").await;

    let by_student = h
        .courses
        .create_course(&student, CourseDraft::default())
        .await;
    assert!(matches!(by_student, Err(ApplicationError::Forbidden(_))));

    let cross_tenant = h
        .courses
        .update_course(
            &other_admin,
            &course,
            CourseUpdate {
                instructor: Some("Mallory".to_string()),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(cross_tenant, Err(ApplicationError::NotFound { .. })));

    let updated = h
        .courses
        .update_course(
            &admin,
            &course,
            CourseUpdate {
                instructor: Some("Dr. Iyer".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.instructor, "Dr. Iyer");

    assert!(matches!(
        h.courses.delete_course(&other_admin, &course).await,
        Err(ApplicationError::NotFound { .. })
    ));
    h.courses.delete_course(&admin, &course).await.unwrap();
    assert!(matches!(
        h.courses.delete_course(&admin, &course).await,
        Err(ApplicationError::NotFound { .. })
    ));
}

#[tokio::test]
async fn feedback_requires_course_in_same_institution() {
    let h = harness();
    let (_, code) = h.admin("Riverside College", "dean@riverside.edu").await;
    let (other_admin, _) = h.admin("Hillside College", "dean@hillside.edu").await;
    let foreign_course = h.course(&other_admin, "CS100", "Fall 2024", "CS").await;
    let student = h.student(&code, "asha@riverside.edu", "Fall 2024", "CS").await;

    let result = h
        .feedback
        .submit_feedback(&student, submission(foreign_course, 5, "Great class"))
        .await;
    assert!(matches!(result, Err(ApplicationError::NotFound { entity: "Course", .. })));
    for institution in [student.institution, other_admin.institution] {
        assert!(h.feedback_repo.list_for_institution(&institution).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn feedback_is_validated_before_classification() {
    let h = harness_with(Arc::new(FailingAnalyzer));
    let (admin, code) = h.admin("Riverside College", "dean@riverside.edu").await;
    let course = h.course(&admin, "CS101", "Fall 2024", "CS").await;
    let student = h.student(&code, "asha@riverside.edu", "Fall 2024", "CS").await;

    let mut missing = submission(course, 5, "Great class");
    missing.workload = None;
    assert!(matches!(
        h.feedback.submit_feedback(&student, missing).await,
        Err(ApplicationError::InvalidInput(_))
    ));

    assert!(matches!(
        h.feedback.submit_feedback(&student, submission(course, 9, "Great class")).await,
        Err(ApplicationError::DomainError(DomainError::RatingOutOfRange { .. }))
    ));

    // A valid request reaches the analyzer, whose failure surfaces as a sentiment error
    assert!(matches!(
        h.feedback.submit_feedback(&student, submission(course, 5, "Great class")).await,
        Err(ApplicationError::SentimentError(_))
    ));
    assert!(h.feedback_repo.list_for_institution(&student.institution).await.unwrap().is_empty());
}

#[tokio::test]
async fn only_students_submit_and_only_admins_read_analytics() {
    let h = harness();
    let (admin, code) = h.admin("Riverside College", "dean@riverside.edu").await;
    let course = h.course(&admin, "CS101", "Fall 2024", "CS").await;
    let student = h.student(&code, "asha@riverside.edu", "Fall 2024", "CS").await;

    assert!(matches!(
        h.feedback.submit_feedback(&admin, submission(course, 5, "Great")).await,
        Err(ApplicationError::Forbidden(_))
    ));
    assert!(matches!(
        h.feedback.get_analytics(&student).await,
        Err(ApplicationError::Forbidden(_))
    ));
}

#[tokio::test]
async fn analytics_reflect_submitted_feedback() {
    let h = harness_with(Arc::new(FixedAnalyzer(Sentiment::Negative)));
    let (admin, code) = h.admin("Riverside College", "dean@riverside.edu").await;
    let cs101 = h.course(&admin, "CS101", "Fall 2024", "CS").await;
    let cs102 = h.course(&admin, "CS102", "Fall 2024", "CS").await;
    let student = h.student(&code, "asha@riverside.edu", "Fall 2024", "CS").await;

    let response = h
        .feedback
        .submit_feedback(&student, submission(cs101, 2, "Too fast"))
        .await
        .unwrap();
    assert_eq!(response.sentiment, Sentiment::Negative);
    h.feedback
        .submit_feedback(&student, submission(cs101, 3, "Still too fast"))
        .await
        .unwrap();
    h.feedback
        .submit_feedback(&student, submission(cs102, 5, "Fine"))
        .await
        .unwrap();

    // Feedback of another tenant must not leak in
    let (other_admin, other_code) = h.admin("Hillside College", "dean@hillside.edu").await;
    let other_course = h.course(&other_admin, "CS100", "Fall 2024", "CS").await;
    let other_student = h
        .student(&other_code, "ravi@hillside.edu", "Fall 2024", "CS")
        .await;
    h.feedback
        .submit_feedback(&other_student, submission(other_course, 1, "Bad"))
        .await
        .unwrap();

    let report = h.feedback.get_analytics(&admin).await.unwrap();
    assert_eq!(report.total_feedback, 3);
    assert_eq!(report.sentiment_count.negative, 3);
    assert!((report.average_rating.overall - 10.0 / 3.0).abs() < 1e-9);

    let top: Vec<&str> = report.top_courses.iter().map(|c| c.code.as_str()).collect();
    assert_eq!(top, vec!["CS102", "CS101"]);
    assert_eq!(report.needs_attention.len(), 1);
    assert_eq!(report.needs_attention[0].code, "CS101");
    assert_eq!(report.needs_attention[0].count, 2);

    // Deleting a course keeps its feedback in the totals only
    h.courses.delete_course(&admin, &cs101).await.unwrap();
    let report = h.feedback.get_analytics(&admin).await.unwrap();
    assert_eq!(report.total_feedback, 3);
    assert_eq!(report.top_courses.len(), 1);
    assert!(report.needs_attention.is_empty());
    assert!(
        report
            .sentiment_details
            .negative
            .iter()
            .any(|row| row.code.is_none() && row.count == 2)
    );
}

#[tokio::test]
async fn analytics_for_new_institution_are_empty() {
    let h = harness();
    let (admin, _) = h.admin("Riverside College", "dean@riverside.edu").await;
    let report = h.feedback.get_analytics(&admin).await.unwrap();
    assert_eq!(report.total_feedback, 0);
    assert!(report.top_courses.is_empty());
    assert!(report.sentiment_details.positive.is_empty());
}

#[tokio::test]
async fn listing_institutions_is_sorted() {
    let h = harness();
    h.admin("Westbrook", "a@westbrook.edu").await;
    h.admin("Aldermoor", "a@aldermoor.edu").await;
    let names: Vec<String> = h
        .directory
        .list_institutions()
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.name)
        .collect();
    assert_eq!(names, vec!["Aldermoor", "Westbrook"]);
}

#[tokio::test]
async fn user_email_index_follows_updates() {
    let users = InMemoryUserRepository::new();
    let inst = domain::InstitutionId::new();
    let mut user = User::new_admin("Dean", "dean@riverside.edu", inst).unwrap();
    users.save(&user).await.unwrap();

    user.email = "dean@new.edu".to_string();
    users.save(&user).await.unwrap();
    assert!(users.find_by_email("dean@riverside.edu").await.unwrap().is_none());
    assert_eq!(users.find_by_email("dean@new.edu").await.unwrap().unwrap().id, user.id);

    let clash = User::new_admin("Other", "dean@new.edu", inst).unwrap();
    assert!(matches!(
        users.save(&clash).await,
        Err(ApplicationError::AlreadyExists(_))
    ));
}

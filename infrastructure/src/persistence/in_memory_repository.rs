use application::{
    ApplicationError, CourseFilter, CourseRepository, FeedbackRepository, InstitutionRepository,
    UserRepository,
};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use domain::{Course, CourseId, Feedback, FeedbackId, Institution, InstitutionId, User, UserId};
use std::hash::Hash;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Reserves `key` in a uniqueness index for `owner`. Returns whether the key
/// was newly inserted, so a failed multi-index save can release it again.
fn claim<K, V>(index: &DashMap<K, V>, key: K, owner: V, what: &str) -> Result<bool, ApplicationError>
where
    K: Eq + Hash,
    V: PartialEq + Copy,
{
    match index.entry(key) {
        Entry::Occupied(existing) if *existing.get() != owner => {
            Err(ApplicationError::AlreadyExists(format!("{} already in use", what)))
        }
        Entry::Occupied(_) => Ok(false),
        Entry::Vacant(slot) => {
            slot.insert(owner);
            Ok(true)
        }
    }
}

/// Removes `key` from an index only while it still points at `owner`.
fn release<K, V>(index: &DashMap<K, V>, key: &K, owner: V)
where
    K: Eq + Hash,
    V: PartialEq + Copy,
{
    index.remove_if(key, |_, v| *v == owner);
}

// --- Institution Repository Implementation ---

#[derive(Debug, Clone, Default)]
pub struct InMemoryInstitutionRepository {
    institutions: Arc<DashMap<InstitutionId, Arc<Institution>>>,
    // Lower-cased name -> id
    names: Arc<DashMap<String, InstitutionId>>,
    // College code -> id
    codes: Arc<DashMap<String, InstitutionId>>,
}

impl InMemoryInstitutionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup(&self, id: Option<InstitutionId>) -> Option<Institution> {
        id.and_then(|id| self.institutions.get(&id).map(|r| (**r).clone()))
    }
}

#[async_trait]
impl InstitutionRepository for InMemoryInstitutionRepository {
    #[instrument(skip(self, institution), fields(institution = %institution.id))]
    async fn save(&self, institution: &Institution) -> Result<(), ApplicationError> {
        debug!("Saving institution to in-memory store");
        let id = institution.id;
        let name_key = institution.name.to_lowercase();

        let name_claimed = claim(&self.names, name_key.clone(), id, "Institution name")?;
        if let Err(e) = claim(&self.codes, institution.college_code.clone(), id, "College code") {
            if name_claimed {
                release(&self.names, &name_key, id);
            }
            return Err(e);
        }

        // Drop index entries left behind by a rename or code change
        if let Some(previous) = self.institutions.insert(id, Arc::new(institution.clone())) {
            let previous_name = previous.name.to_lowercase();
            if previous_name != name_key {
                release(&self.names, &previous_name, id);
            }
            if previous.college_code != institution.college_code {
                release(&self.codes, &previous.college_code, id);
            }
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, id: &InstitutionId) -> Result<Option<Institution>, ApplicationError> {
        Ok(self.lookup(Some(*id)))
    }

    #[instrument(skip(self))]
    async fn find_by_name(&self, name: &str) -> Result<Option<Institution>, ApplicationError> {
        let id = self.names.get(&name.trim().to_lowercase()).map(|r| *r);
        Ok(self.lookup(id))
    }

    #[instrument(skip(self, code))]
    async fn find_by_college_code(
        &self,
        code: &str,
    ) -> Result<Option<Institution>, ApplicationError> {
        let id = self.codes.get(code).map(|r| *r);
        Ok(self.lookup(id))
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &InstitutionId) -> Result<bool, ApplicationError> {
        debug!("Deleting institution from in-memory store");
        match self.institutions.remove(id) {
            Some((_, removed)) => {
                release(&self.names, &removed.name.to_lowercase(), *id);
                release(&self.codes, &removed.college_code, *id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    #[instrument(skip(self))]
    async fn list(&self) -> Result<Vec<Institution>, ApplicationError> {
        Ok(self
            .institutions
            .iter()
            .map(|entry| (**entry.value()).clone())
            .collect())
    }
}

// --- User Repository Implementation ---

#[derive(Debug, Clone, Default)]
pub struct InMemoryUserRepository {
    users: Arc<DashMap<UserId, Arc<User>>>,
    // Normalized email -> id
    emails: Arc<DashMap<String, UserId>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    #[instrument(skip(self, user), fields(user = %user.id))]
    async fn save(&self, user: &User) -> Result<(), ApplicationError> {
        debug!("Saving user to in-memory store");
        claim(&self.emails, user.email.clone(), user.id, "Email")?;
        if let Some(previous) = self.users.insert(user.id, Arc::new(user.clone())) {
            if previous.email != user.email {
                release(&self.emails, &previous.email, user.id);
            }
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, id: &UserId) -> Result<Option<User>, ApplicationError> {
        Ok(self.users.get(id).map(|r| (**r).clone()))
    }

    #[instrument(skip(self, email))]
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, ApplicationError> {
        let key = email.trim().to_lowercase();
        let id = self.emails.get(&key).map(|r| *r);
        Ok(id.and_then(|id| self.users.get(&id).map(|r| (**r).clone())))
    }
}

// --- Course Repository Implementation ---

#[derive(Debug, Clone, Default)]
pub struct InMemoryCourseRepository {
    courses: Arc<DashMap<CourseId, Arc<Course>>>,
}

impl InMemoryCourseRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CourseRepository for InMemoryCourseRepository {
    #[instrument(skip(self, course), fields(course = %course.id))]
    async fn save(&self, course: &Course) -> Result<(), ApplicationError> {
        debug!(institution = %course.institution, "Saving course to in-memory store");
        if let Some(existing) = self.courses.get(&course.id) {
            if existing.institution != course.institution {
                warn!("Refusing to move course to another institution");
                return Err(ApplicationError::InvalidInput(
                    "Course cannot change institution".to_string(),
                ));
            }
        }
        self.courses.insert(course.id, Arc::new(course.clone()));
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, id: &CourseId) -> Result<Option<Course>, ApplicationError> {
        Ok(self.courses.get(id).map(|r| (**r).clone()))
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &CourseId) -> Result<bool, ApplicationError> {
        debug!("Deleting course from in-memory store");
        Ok(self.courses.remove(id).is_some())
    }

    #[instrument(skip(self, filter))]
    async fn list(
        &self,
        institution: &InstitutionId,
        filter: &CourseFilter,
    ) -> Result<Vec<Course>, ApplicationError> {
        Ok(self
            .courses
            .iter()
            .filter(|entry| entry.institution == *institution && filter.matches(entry.value()))
            .map(|entry| (**entry.value()).clone())
            .collect())
    }
}

// --- Feedback Repository Implementation (Tenant-Partitioned) ---

#[derive(Debug, Clone, Default)]
pub struct InMemoryFeedbackRepository {
    // Institution -> (Feedback ID -> Feedback)
    store: Arc<DashMap<InstitutionId, DashMap<FeedbackId, Arc<Feedback>>>>,
}

impl InMemoryFeedbackRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FeedbackRepository for InMemoryFeedbackRepository {
    #[instrument(skip(self, feedback), fields(feedback = %feedback.id, institution = %feedback.institution))]
    async fn save(&self, feedback: &Feedback) -> Result<(), ApplicationError> {
        debug!("Saving feedback to in-memory store");
        // Get or create the partition for the institution
        let partition = self
            .store
            .entry(feedback.institution)
            .or_insert_with(DashMap::new);
        partition.insert(feedback.id, Arc::new(feedback.clone()));
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_for_institution(
        &self,
        institution: &InstitutionId,
    ) -> Result<Vec<Feedback>, ApplicationError> {
        let mut items: Vec<Feedback> = match self.store.get(institution) {
            Some(partition) => partition.iter().map(|r| (**r.value()).clone()).collect(),
            None => Vec::new(), // Nothing submitted yet
        };
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        debug!(count = items.len(), "Listed feedback from in-memory store");
        Ok(items)
    }
}

pub mod in_memory_repository;

// Re-export the repository types
pub use in_memory_repository::{
    InMemoryCourseRepository, InMemoryFeedbackRepository, InMemoryInstitutionRepository,
    InMemoryUserRepository,
};

pub mod memory_agreement_repository;
pub mod memory_batch_repository;
pub mod memory_organization_directory;

pub use memory_agreement_repository::InMemoryAgreementRepository;
pub use memory_batch_repository::InMemoryBatchRepository;
pub use memory_organization_directory::InMemoryOrganizationDirectory;

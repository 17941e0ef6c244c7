use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Provisioning batch not found: {0}")]
    BatchNotFound(String),

    #[error("Sharing agreement not found: {0}")]
    AgreementNotFound(String),

    #[error("Datastream '{datastream}' not found in agreement {agreement_id}")]
    DatastreamNotFound {
        agreement_id: String,
        datastream: String,
    },

    #[error("Organization not found: {0}")]
    OrganizationNotFound(String),

    #[error("Unknown resource type: {0}")]
    UnknownResourceType(String),

    #[error("Unknown dynamic value directive: {0}")]
    UnknownDirective(String),

    #[error("Invalid entity document: {0}")]
    InvalidDocument(String),

    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),

    #[error("SensorThings endpoint error: {0}")]
    EndpointError(anyhow::Error),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}

pub type DomainResult<T> = Result<T, DomainError>;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CleanCareError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid geography: {0}")]
    InvalidGeography(String),

    #[error("Referential integrity violation: {0}")]
    ReferentialIntegrity(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl CleanCareError {
    /// True for chain-consistency failures that should block the originating write.
    pub fn is_invalid_geography(&self) -> bool {
        matches!(self, CleanCareError::InvalidGeography(_))
    }
}

// ============================================================================
// Household Business Rule Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HouseholdError {
    #[error("household with provided ID already exists: {0}")]
    AlreadyExists(String),

    #[error("household with provided ID does not exist: {0}")]
    NotFound(String),

    #[error("invalid {kind} ID, must be a valid UUID: {value}")]
    InvalidId { kind: &'static str, value: String },

    #[error("{field} must be between {min} and {max} characters")]
    InvalidLength {
        field: &'static str,
        min: usize,
        max: usize,
    },

    #[error("room with ID {0} already exists")]
    RoomAlreadyExists(String),

    #[error("room with name {0} already exists")]
    RoomNameTaken(String),

    #[error("room with ID {0} does not exist")]
    RoomNotFound(String),

    #[error("item with ID {0} already exists")]
    ItemAlreadyExists(String),

    #[error("item with ID {0} does not exist")]
    ItemNotFound(String),
}

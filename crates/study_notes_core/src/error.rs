//! crates/study_notes_core/src/error.rs
//!
//! Error types surfaced to the user by the gate and the catalog.

use uuid::Uuid;

use crate::category::Category;
use crate::ports::PortError;

/// A required field of the upload form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftField {
    Title,
    Subject,
    File,
}

impl DraftField {
    pub fn as_str(&self) -> &'static str {
        match self {
            DraftField::Title => "title",
            DraftField::Subject => "subject",
            DraftField::File => "file",
        }
    }
}

fn missing_list(fields: &[DraftField]) -> String {
    fields.iter().map(DraftField::as_str).collect::<Vec<_>>().join(", ")
}

/// Raised before any remote call when the upload form is incomplete.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Please fill all fields (missing: {})", missing_list(.missing))]
pub struct ValidationError {
    pub missing: Vec<DraftField>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The action is not allowed for the current identity or configuration.
    /// Nothing was changed locally or remotely.
    #[error("Unauthorized: {0}")]
    Unauthorized(&'static str),

    /// A collaborator call failed. The operation stopped at that call.
    #[error(transparent)]
    Remote(#[from] PortError),

    #[error("The {0} category is not available")]
    CategoryUnavailable(Category),

    #[error("Note {0} is not in the catalog")]
    UnknownNote(Uuid),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error(transparent)]
    Remote(#[from] PortError),

    #[error("Already signed in as {0}")]
    AlreadySignedIn(String),
}

/// Any error raised by the notes screen.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScreenError {
    #[error(transparent)]
    Gate(#[from] GateError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl ScreenError {
    /// A stable, machine-readable name for the error family.
    pub fn kind(&self) -> &'static str {
        match self {
            ScreenError::Gate(GateError::Remote(e)) | ScreenError::Catalog(CatalogError::Remote(e)) => {
                match e {
                    PortError::Unauthorized => "unauthorized",
                    PortError::NotFound(_) => "not_found",
                    _ => "remote",
                }
            }
            ScreenError::Gate(GateError::AlreadySignedIn(_)) => "already_signed_in",
            ScreenError::Catalog(CatalogError::Validation(_)) => "validation",
            ScreenError::Catalog(CatalogError::Unauthorized(_)) => "unauthorized",
            ScreenError::Catalog(CatalogError::CategoryUnavailable(_)) => "validation",
            ScreenError::Catalog(CatalogError::UnknownNote(_)) => "not_found",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_lists_missing_fields() {
        let err = ValidationError {
            missing: vec![DraftField::Title, DraftField::File],
        };
        assert_eq!(err.to_string(), "Please fill all fields (missing: title, file)");
    }

    #[test]
    fn test_kind_follows_port_error() {
        let err = ScreenError::from(CatalogError::Remote(PortError::Unauthorized));
        assert_eq!(err.kind(), "unauthorized");
        let err = ScreenError::from(GateError::Remote(PortError::Rejected("Invalid login credentials".into())));
        assert_eq!(err.kind(), "remote");
        assert_eq!(err.to_string(), "Invalid login credentials");
    }
}

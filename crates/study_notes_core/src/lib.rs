pub mod app;
pub mod catalog;
pub mod category;
pub mod domain;
pub mod error;
pub mod features;
pub mod filter;
pub mod gate;
pub mod ports;

#[cfg(test)]
mod testing;

pub use app::StudyApp;
pub use catalog::{CatalogEngine, CatalogPorts, CatalogView, DeleteOutcome, FavoriteToggle, NoteCard, Reloaded};
pub use category::Category;
pub use domain::{
    AuthSession, DeleteRequest, FavoriteMark, FavoriteRow, Identity, NewNote, Note, NoteDraft, Role,
    SessionEvent, SignUpProfile, UploadFile,
};
pub use error::{CatalogError, GateError, ScreenError, ValidationError};
pub use features::{FavoritesMode, FeatureConfig};
pub use filter::{compute_visible, FavoriteSet};
pub use gate::{IdentityState, SessionGate};
pub use ports::{
    AuthProvider, FavoriteTable, NoteTable, ObjectStore, PortError, PortResult, SessionEventStream,
};

use crate::{auth::AuthMode, services::library_service::LibraryService};

/// Shared router state.
#[derive(Clone)]
pub struct AppState {
    pub service: LibraryService,
    pub auth: AuthMode,
}

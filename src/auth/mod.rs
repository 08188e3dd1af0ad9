pub mod devmode;
pub mod errors;
pub mod gatekeeper;
pub mod scope;
pub mod store;

pub use errors::{AuthError, DenialReason, StoreError};
pub use gatekeeper::{AuthDecision, Gatekeeper, Principal};
pub use scope::Scope;
pub use store::{ApiKeyRecord, CredentialStore, InMemoryStore};

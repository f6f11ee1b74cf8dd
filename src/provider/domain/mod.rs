//! Domain model for provider identity, credentials and invocations.

mod credential;
mod error;
mod invocation;
mod name;

pub use credential::{Credential, CredentialKind, PassthroughCredentialBundle};
pub use error::{ParseHttpMethodError, ProviderDomainError};
pub use invocation::{HttpMethod, ProviderFailure, ProviderRequest, ProviderResponse};
pub use name::ProviderName;

//! Domain model for webhook events, retry budgets and delivery
//! authentication.

mod error;
mod event;
mod retry;
mod webhook;

pub use error::{ParseWebhookSchemeError, WebhookAuthError};
pub use event::{DeadLetterEntry, EventId, FailureRecord, PersistedEventData, WebhookEvent};
pub use retry::RetryPolicy;
pub use webhook::{HeaderConvention, WebhookScheme, WebhookVerifier, sign, signature_header};

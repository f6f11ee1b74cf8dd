//! MCP session lifecycle and version negotiation.

use super::{ClientClass, HandshakeMetadata, ProtocolDomainError, detect_client_class};
use crate::tool_registry::domain::{TenantId, ToolsetEnablement};
use chrono::{DateTime, Utc};
use mockable::Clock;
use std::fmt;
use uuid::Uuid;

/// Newest protocol version the gateway speaks.
pub const LATEST_PROTOCOL_VERSION: &str = "2025-06-18";

/// Protocol versions the gateway speaks, newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: [&str; 3] =
    [LATEST_PROTOCOL_VERSION, "2025-03-26", "2024-11-05"];

/// Method names handled by the session layer.
pub mod methods {
    /// Handshake request.
    pub const INITIALIZE: &str = "initialize";
    /// Handshake completion notification.
    pub const INITIALIZED: &str = "initialized";
    /// Namespaced alias for [`INITIALIZED`].
    pub const NOTIFICATIONS_INITIALIZED: &str = "notifications/initialized";
    /// Cancellation notification for an in-flight request.
    pub const NOTIFICATIONS_CANCELLED: &str = "notifications/cancelled";
    /// Liveness probe.
    pub const PING: &str = "ping";
    /// Catalog listing.
    pub const TOOLS_LIST: &str = "tools/list";
    /// Tool invocation.
    pub const TOOLS_CALL: &str = "tools/call";
    /// Full schema lookup for an `$expand` placeholder.
    pub const SCHEMAS_EXPAND: &str = "schemas/expand";
}

/// Picks the protocol version for a session.
///
/// A supported requested version is echoed back. Anything else, including no
/// request at all, gets the newest supported version.
#[must_use]
pub fn negotiate_version(requested: Option<&str>) -> &'static str {
    requested
        .and_then(|version| {
            SUPPORTED_PROTOCOL_VERSIONS
                .iter()
                .copied()
                .find(|supported| *supported == version)
        })
        .unwrap_or(LATEST_PROTOCOL_VERSION)
}

/// Unique identifier for one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct McpSessionId(Uuid);

impl McpSessionId {
    /// Creates a new random session identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the wrapped UUID.
    #[must_use]
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for McpSessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for McpSessionId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Handshake state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// The transport is up; no handshake yet.
    Connected,
    /// `initialize` was answered; waiting for `initialized`.
    Initializing,
    /// Tools may be listed and called.
    Ready,
    /// The connection is gone.
    Closed,
}

impl SessionState {
    /// Returns the canonical representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// One live agent connection.
///
/// Sessions hold no persistent state. Dropping the session forgets
/// everything about the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McpSession {
    id: McpSessionId,
    tenant: TenantId,
    enablement: ToolsetEnablement,
    metadata: HandshakeMetadata,
    client_class: ClientClass,
    protocol_version: Option<&'static str>,
    state: SessionState,
    connected_at: DateTime<Utc>,
}

impl McpSession {
    /// Opens a session for an authenticated tenant.
    #[must_use]
    pub fn connect(
        tenant: TenantId,
        enablement: ToolsetEnablement,
        metadata: HandshakeMetadata,
        clock: &impl Clock,
    ) -> Self {
        let client_class = detect_client_class(&metadata);
        Self {
            id: McpSessionId::new(),
            tenant,
            enablement,
            metadata,
            client_class,
            protocol_version: None,
            state: SessionState::Connected,
            connected_at: clock.utc(),
        }
    }

    /// Returns the session identifier.
    #[must_use]
    pub const fn id(&self) -> McpSessionId {
        self.id
    }

    /// Returns the authenticated tenant.
    #[must_use]
    pub const fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Returns the tenant's toolset enablement.
    #[must_use]
    pub const fn enablement(&self) -> &ToolsetEnablement {
        &self.enablement
    }

    /// Returns the handshake metadata.
    #[must_use]
    pub const fn metadata(&self) -> &HandshakeMetadata {
        &self.metadata
    }

    /// Returns the detected client class.
    #[must_use]
    pub const fn client_class(&self) -> ClientClass {
        self.client_class
    }

    /// Returns the negotiated protocol version, once initialized.
    #[must_use]
    pub const fn protocol_version(&self) -> Option<&'static str> {
        self.protocol_version
    }

    /// Returns the handshake state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Returns when the connection was accepted.
    #[must_use]
    pub const fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Returns whether `method` may be requested in the current state.
    ///
    /// `ping` is admitted until the session closes, `initialize` only before
    /// the handshake starts, and everything else only once ready.
    #[must_use]
    pub fn admits(&self, method: &str) -> bool {
        match (self.state, method) {
            (SessionState::Closed, _) => false,
            (_, methods::PING) => true,
            (state, methods::INITIALIZE) => state == SessionState::Connected,
            (state, _) => state == SessionState::Ready,
        }
    }

    /// Handles `initialize`: negotiates the version and refines the client
    /// class from the announced client name.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolDomainError::InvalidTransition`] unless the session
    /// is still in [`SessionState::Connected`].
    pub fn initialize(
        &mut self,
        requested_version: Option<&str>,
        client_name: Option<&str>,
    ) -> Result<&'static str, ProtocolDomainError> {
        self.transition(SessionState::Connected, SessionState::Initializing)?;
        if let Some(name) = client_name {
            self.metadata.client_name = Some(name.to_owned());
            self.client_class = detect_client_class(&self.metadata);
        }
        let version = negotiate_version(requested_version);
        self.protocol_version = Some(version);
        Ok(version)
    }

    /// Handles `initialized`. Repeating it once ready is harmless.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolDomainError::InvalidTransition`] when `initialize`
    /// has not been answered or the session is closed.
    pub fn mark_ready(&mut self) -> Result<(), ProtocolDomainError> {
        if self.state == SessionState::Ready {
            return Ok(());
        }
        self.transition(SessionState::Initializing, SessionState::Ready)
    }

    /// Closes the session. Closing twice is a no-op.
    pub const fn close(&mut self) {
        self.state = SessionState::Closed;
    }

    fn transition(
        &mut self,
        expected: SessionState,
        next: SessionState,
    ) -> Result<(), ProtocolDomainError> {
        if self.state != expected {
            return Err(ProtocolDomainError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockable::DefaultClock;
    use rstest::{fixture, rstest};

    #[fixture]
    fn session() -> McpSession {
        McpSession::connect(
            TenantId::new("acme").expect("valid tenant"),
            ToolsetEnablement::read_only(),
            HandshakeMetadata::default(),
            &DefaultClock,
        )
    }

    #[rstest]
    #[case(Some("2025-03-26"), "2025-03-26")]
    #[case(Some("2024-11-05"), "2024-11-05")]
    #[case(Some("2023-01-01"), "2025-06-18")]
    #[case(None, "2025-06-18")]
    fn versions_are_negotiated(#[case] requested: Option<&str>, #[case] expected: &str) {
        assert_eq!(negotiate_version(requested), expected);
    }

    #[rstest]
    fn handshake_moves_through_every_state(mut session: McpSession) {
        assert_eq!(session.state(), SessionState::Connected);
        assert!(!session.admits(methods::TOOLS_LIST));

        let version = session
            .initialize(Some("2025-03-26"), Some("cursor"))
            .expect("initialize should succeed");
        assert_eq!(version, "2025-03-26");
        assert_eq!(session.state(), SessionState::Initializing);
        assert_eq!(session.client_class(), ClientClass::Ide);
        assert!(!session.admits(methods::TOOLS_CALL));
        assert!(session.admits(methods::PING));

        session.mark_ready().expect("initialized should succeed");
        assert!(session.admits(methods::TOOLS_CALL));
        assert!(!session.admits(methods::INITIALIZE));

        session.close();
        assert!(!session.admits(methods::PING));
    }

    #[rstest]
    fn initialized_before_initialize_is_rejected(mut session: McpSession) {
        let result = session.mark_ready();
        assert!(matches!(
            result,
            Err(ProtocolDomainError::InvalidTransition {
                from: SessionState::Connected,
                to: SessionState::Ready,
            })
        ));
    }

    #[rstest]
    fn initialize_cannot_be_repeated(mut session: McpSession) {
        session.initialize(None, None).expect("first initialize");
        assert!(session.initialize(None, None).is_err());
    }
}

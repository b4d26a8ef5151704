//! Handshake negotiation.
//!
//! The negotiator is a pure state machine: the session feeds it parsed
//! responses and acts on the outcome (finish, or reconnect and send the next
//! request). It allows a single fallback to a version the node proposes.

use crate::error::ClientError;
use ignite_protocol::{HandshakeRequest, HandshakeResponse, ProtocolVersion, StatusCode};

/// Negotiation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Unauthenticated,
    Ready(ProtocolVersion),
    Failed,
}

/// What the session should do after a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// Session is established at this version.
    Ready(ProtocolVersion),
    /// Reconnect and handshake again at this version.
    Retry(ProtocolVersion),
}

#[derive(Debug)]
pub struct HandshakeNegotiator {
    version: ProtocolVersion,
    username: Option<String>,
    password: Option<String>,
    fallback_used: bool,
    state: HandshakeState,
}

impl HandshakeNegotiator {
    pub fn new(
        version: ProtocolVersion,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<Self, ClientError> {
        if !version.is_supported() {
            return Err(ClientError::Config(format!(
                "unsupported protocol version {}",
                version
            )));
        }
        if username.is_some() != password.is_some() {
            return Err(ClientError::Config(
                "username and password must be set together".to_string(),
            ));
        }
        if username.is_some() && !version.supports_auth() {
            return Err(ClientError::Config(format!(
                "credentials require protocol {} or newer, got {}",
                ProtocolVersion::V1_1_0,
                version
            )));
        }
        Ok(Self {
            version,
            username,
            password,
            fallback_used: false,
            state: HandshakeState::Unauthenticated,
        })
    }

    /// Version the next request will propose.
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    fn has_credentials(&self) -> bool {
        self.username.is_some()
    }

    pub fn request(&self) -> HandshakeRequest {
        let mut request = HandshakeRequest::new(self.version);
        request.username = self.username.clone();
        request.password = self.password.clone();
        request
    }

    pub fn on_response(
        &mut self,
        response: HandshakeResponse,
    ) -> Result<HandshakeOutcome, ClientError> {
        let (server_version, message, status) = match response {
            HandshakeResponse::Accepted => {
                self.state = HandshakeState::Ready(self.version);
                return Ok(HandshakeOutcome::Ready(self.version));
            }
            HandshakeResponse::Rejected {
                server_version,
                message,
                status,
            } => (server_version, message, status),
        };

        if status == Some(StatusCode::AuthFailed) {
            self.state = HandshakeState::Failed;
            return Err(ClientError::Authentication(message));
        }

        let can_fall_back = !self.fallback_used
            && server_version != self.version
            && server_version.is_supported()
            && (!self.has_credentials() || server_version.supports_auth());
        if can_fall_back {
            tracing::debug!(
                "Node proposed protocol {} instead of {}, retrying",
                server_version,
                self.version
            );
            self.fallback_used = true;
            self.version = server_version;
            return Ok(HandshakeOutcome::Retry(server_version));
        }

        self.state = HandshakeState::Failed;
        Err(ClientError::Handshake {
            message,
            server_version: Some(server_version),
        })
    }
}

// ucentralctl - CLI for uCentral access-point fleet management
// Copyright (C) 2024 Mathias Uhl <mathiasuhl@gmx.de>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Authenticated session lifecycle against the security service.
//!
//! A session moves `Unauthenticated -> Authenticated -> EndpointsResolved ->
//! LoggedOut`. Device and firmware operations are only reachable through
//! [`SessionManager::devices`], which requires resolved endpoints. Dropping a
//! manager that still holds a token logs it out, so the token is released on
//! every exit path once login succeeded.

use crate::client::{Transport, TransportError};
use crate::config::EffectiveConfig;
use crate::devices::{ApiError, DeviceClient, decode_success};
use crate::model::{LoginRequest, SystemEndpoints, Token};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    EndpointsResolved,
    LoggedOut,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Hosts (`host:port`) of the two services resolved after login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub gateway: String,
    pub firmware: String,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("missing credentials; set them with `ucentralctl configure --username <u> --password <p>`")]
    MissingCredentials,
    #[error("missing security endpoint; set it with `ucentralctl configure --sec <host:port>`")]
    MissingSecurityEndpoint,
    #[error("session is {actual:?}; expected {expected}")]
    InvalidState {
        expected: &'static str,
        actual: SessionState,
    },
    #[error("security service returned an empty access token")]
    EmptyToken,
    #[error("did not find desired endpoints (gateway found: {gateway}, firmware found: {firmware})")]
    EndpointsIncomplete { gateway: bool, firmware: bool },
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        SessionError::Api(ApiError::Transport(err))
    }
}

#[derive(Debug)]
pub struct SessionManager {
    transport: Transport,
    credentials: Credentials,
    security_host: String,
    state: SessionState,
    token: Option<Token>,
    endpoints: Option<Endpoints>,
}

impl SessionManager {
    pub fn new(config: &EffectiveConfig) -> Result<Self, SessionError> {
        let transport = Transport::new(config.scheme, config.insecure)?;
        Ok(Self::with_transport(
            transport,
            Credentials {
                username: config.username.clone(),
                password: config.password.clone(),
            },
            &config.security_endpoint,
        ))
    }

    pub fn with_transport(
        transport: Transport,
        credentials: Credentials,
        security_host: &str,
    ) -> Self {
        Self {
            transport,
            credentials,
            security_host: security_host.trim().to_string(),
            state: SessionState::Unauthenticated,
            token: None,
            endpoints: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    #[cfg(test)]
    pub fn token(&self) -> Option<&Token> {
        self.token.as_ref()
    }

    #[cfg(test)]
    pub fn endpoints(&self) -> Option<&Endpoints> {
        self.endpoints.as_ref()
    }

    /// Requests a token. Empty credentials or an empty security host fail
    /// before anything is sent.
    pub fn authenticate(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Unauthenticated {
            return Err(SessionError::InvalidState {
                expected: "an unauthenticated session",
                actual: self.state,
            });
        }
        if self.credentials.username.is_empty() || self.credentials.password.is_empty() {
            return Err(SessionError::MissingCredentials);
        }
        if self.security_host.is_empty() {
            return Err(SessionError::MissingSecurityEndpoint);
        }

        let login = LoginRequest {
            user_id: &self.credentials.username,
            password: &self.credentials.password,
        };
        let response = self
            .transport
            .post_json(&self.security_host, "oauth2", Some(&login))?;
        let token: Token = decode_success(&response, "token")?;
        if token.access_token.is_empty() {
            return Err(SessionError::EmptyToken);
        }

        self.transport.set_token(&token.access_token);
        self.token = Some(token);
        self.state = SessionState::Authenticated;
        info!(
            user = %self.credentials.username,
            host = %self.security_host,
            "logged in"
        );
        Ok(())
    }

    pub fn discover_endpoints(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Authenticated || !self.transport.has_token() {
            return Err(SessionError::InvalidState {
                expected: "an authenticated session",
                actual: self.state,
            });
        }

        let response = self
            .transport
            .get(&self.security_host, "systemEndpoints", &[])?;
        let listing: SystemEndpoints = decode_success(&response, "system endpoints")?;
        let endpoints = resolve_endpoints(&listing)?;

        info!(
            gateway = %endpoints.gateway,
            firmware = %endpoints.firmware,
            "endpoints resolved"
        );
        self.endpoints = Some(endpoints);
        self.state = SessionState::EndpointsResolved;
        Ok(())
    }

    /// Deletes the token. The session is `LoggedOut` afterwards even when
    /// the request fails, so the release is attempted exactly once.
    pub fn terminate(&mut self) -> Result<(), SessionError> {
        if !matches!(
            self.state,
            SessionState::Authenticated | SessionState::EndpointsResolved
        ) {
            return Err(SessionError::InvalidState {
                expected: "an authenticated session",
                actual: self.state,
            });
        }
        self.state = SessionState::LoggedOut;
        self.endpoints = None;

        let access_token = self
            .token
            .take()
            .map(|t| t.access_token)
            .unwrap_or_default();
        let result = self
            .transport
            .delete(&self.security_host, &format!("oauth2/{access_token}"));
        self.transport.clear_token();

        let response = result?;
        if !matches!(response.status, 200 | 204) {
            return Err(ApiError::UnexpectedStatus(response.status).into());
        }
        info!(host = %self.security_host, "logged out");
        Ok(())
    }

    pub fn devices(&self) -> Result<DeviceClient<'_>, SessionError> {
        match (&self.state, &self.endpoints) {
            (SessionState::EndpointsResolved, Some(endpoints)) => {
                Ok(DeviceClient::new(&self.transport, endpoints))
            }
            _ => Err(SessionError::InvalidState {
                expected: "resolved endpoints",
                actual: self.state,
            }),
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if matches!(
            self.state,
            SessionState::Authenticated | SessionState::EndpointsResolved
        ) && let Err(err) = self.terminate()
        {
            error!(%err, "logout failed");
        }
    }
}

/// Picks the first `gw` and first `fms` typed entries. Other entry types are
/// reported and skipped.
pub fn resolve_endpoints(listing: &SystemEndpoints) -> Result<Endpoints, SessionError> {
    let mut gateway: Option<String> = None;
    let mut firmware: Option<String> = None;

    for entry in &listing.endpoints {
        let host = endpoint_host(&entry.uri);
        if entry.kind.contains("gw") {
            if gateway.is_none() && !host.is_empty() {
                gateway = Some(host);
            }
        } else if entry.kind.contains("fms") {
            if firmware.is_none() && !host.is_empty() {
                firmware = Some(host);
            }
        } else {
            info!(kind = %entry.kind, uri = %entry.uri, "ignoring endpoint");
        }
    }

    match (gateway, firmware) {
        (Some(gateway), Some(firmware)) => Ok(Endpoints { gateway, firmware }),
        (gateway, firmware) => Err(SessionError::EndpointsIncomplete {
            gateway: gateway.is_some(),
            firmware: firmware.is_some(),
        }),
    }
}

/// `https://gw.example.test:16002` -> `gw.example.test:16002`
pub fn endpoint_host(uri: &str) -> String {
    let rest = uri.split_once("//").map(|(_, rest)| rest).unwrap_or(uri);
    rest.trim_end_matches('/').to_string()
}

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

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const API_PREFIX: &str = "api/v1/";
const USER_AGENT_VALUE: &str = "ucentralctl/0.1";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    #[default]
    Https,
    Http,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Https => "https",
            Scheme::Http => "http",
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("building HTTP client: {0}")]
    Client(reqwest::Error),
    #[error("invalid request URL `{url}`: {reason}")]
    Url { url: String, reason: String },
    #[error("{method} {url} failed: {source}")]
    Send {
        method: Method,
        url: String,
        source: reqwest::Error,
    },
    #[error("reading response body from {url}: {source}")]
    Body { url: String, source: reqwest::Error },
}

#[derive(Debug, Clone)]
pub struct ResponseData {
    pub status: u16,
    pub body: String,
}

impl ResponseData {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

/// Issues requests against `{scheme}://{host}/api/v1/{path}`.
///
/// The bearer token is attached to every request once one is held; the
/// token request itself goes out before any token exists and so carries no
/// `Authorization` header. Requests never time out and are never retried.
#[derive(Debug)]
pub struct Transport {
    http: Client,
    scheme: Scheme,
    token: Option<String>,
}

impl Transport {
    pub fn new(scheme: Scheme, insecure: bool) -> Result<Self, TransportError> {
        let http = Client::builder()
            .user_agent(HeaderValue::from_static(USER_AGENT_VALUE))
            .danger_accept_invalid_certs(insecure)
            .timeout(None)
            .build()
            .map_err(TransportError::Client)?;

        Ok(Self {
            http,
            scheme,
            token: None,
        })
    }

    pub fn set_token(&mut self, token: &str) {
        self.token = Some(token.to_string());
    }

    pub fn clear_token(&mut self) {
        self.token = None;
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    pub fn get(
        &self,
        host: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<ResponseData, TransportError> {
        self.request(Method::GET, host, path, query, Option::<&()>::None)
    }

    pub fn post_json<T: Serialize + ?Sized>(
        &self,
        host: &str,
        path: &str,
        body: Option<&T>,
    ) -> Result<ResponseData, TransportError> {
        self.request(Method::POST, host, path, &[], body)
    }

    pub fn put_json<T: Serialize + ?Sized>(
        &self,
        host: &str,
        path: &str,
        body: Option<&T>,
    ) -> Result<ResponseData, TransportError> {
        self.request(Method::PUT, host, path, &[], body)
    }

    pub fn delete(&self, host: &str, path: &str) -> Result<ResponseData, TransportError> {
        self.request(Method::DELETE, host, path, &[], Option::<&()>::None)
    }

    fn url(&self, host: &str, path: &str) -> Result<Url, TransportError> {
        let raw = format!(
            "{}://{}/{}{}",
            self.scheme.as_str(),
            host.trim_end_matches('/'),
            API_PREFIX,
            path.trim_start_matches('/')
        );
        Url::parse(&raw).map_err(|e| TransportError::Url {
            url: raw.clone(),
            reason: e.to_string(),
        })
    }

    fn request<T: Serialize + ?Sized>(
        &self,
        method: Method,
        host: &str,
        path: &str,
        query: &[(&str, String)],
        body: Option<&T>,
    ) -> Result<ResponseData, TransportError> {
        let url = self.url(host, path)?;
        let url_str = url.to_string();

        let mut request = self
            .http
            .request(method.clone(), url)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!(%method, url = %url_str, "sending request");
        let response = request.send().map_err(|source| TransportError::Send {
            method: method.clone(),
            url: url_str.clone(),
            source,
        })?;

        let status = response.status().as_u16();
        debug!(%method, url = %url_str, status, "received response");
        let body = response.text().map_err(|source| TransportError::Body {
            url: url_str,
            source,
        })?;

        Ok(ResponseData { status, body })
    }
}

// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use reqwest::Url;

use crate::errors::CredentialsError;

#[derive(Clone, PartialEq, Eq, Default)]
pub enum Credentials {
    #[default]
    None,
    Basic {
        username: String,
        password: String,
    },
    Bearer(String),
}

impl Credentials {
    /// Builds bearer credentials, treating an empty token as none.
    #[must_use]
    pub fn bearer(token: Option<&str>) -> Self {
        match token.map(str::trim) {
            Some(token) if !token.is_empty() => Credentials::Bearer(token.to_string()),
            _ => Credentials::None,
        }
    }

    /// Value for the `Authorization` header of a bearer credential.
    ///
    /// Tokens that already carry a scheme (`Bearer ...`) are sent as-is.
    #[must_use]
    pub fn bearer_header(&self) -> Option<String> {
        match self {
            Credentials::Bearer(token) if token.contains(' ') => Some(token.clone()),
            Credentials::Bearer(token) => Some(format!("Bearer {token}")),
            _ => None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::None => write!(f, "None"),
            Credentials::Basic { username, .. } => {
                write!(f, "Basic {{ username: {username:?}, password: *** }}")
            }
            Credentials::Bearer(_) => write!(f, "Bearer(***)"),
        }
    }
}

/// Where batches go. Fixed for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkEndpoint {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    /// Path prefix without a trailing slash, empty for the root
    pub path: String,
    pub credentials: Credentials,
    /// Index name (search engine) or topic name (broker)
    pub target: String,
}

impl SinkEndpoint {
    /// Parses a base URL such as `https://proxy:8082/topics`.
    pub fn from_url(
        url: &str,
        credentials: Credentials,
        target: impl Into<String>,
    ) -> Result<Self, CredentialsError> {
        let parsed = Url::parse(url.trim())
            .map_err(|e| CredentialsError::Endpoint(format!("{url}: {e}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| CredentialsError::Endpoint(format!("{url}: missing host")))?
            .to_string();
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| CredentialsError::Endpoint(format!("{url}: missing port")))?;

        Ok(SinkEndpoint {
            protocol: parsed.scheme().to_string(),
            host,
            port,
            path: parsed.path().trim_end_matches('/').to_string(),
            credentials,
            target: target.into(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}{}", self.protocol, self.host, self.port, self.path)
    }

    /// Same endpoint, different index or topic.
    #[must_use]
    pub fn with_target(&self, target: impl Into<String>) -> Self {
        SinkEndpoint {
            target: target.into(),
            ..self.clone()
        }
    }
}

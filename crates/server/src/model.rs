//! Principal roles, flow paths and the single-use ticket types staged between
//! credential intake and code exchange.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use utoipa::ToSchema;

/// Prefix of every correlation-map key.
pub const CORRELATION_KEY_PREFIX: &str = "LoggedInUserID-";

/// Correlation-map key for a login attempt started by `client_or_email`.
pub fn correlation_key(client_or_email: &str) -> String {
    format!("{CORRELATION_KEY_PREFIX}{client_or_email}")
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown {kind} `{value}`")]
pub struct UnknownTag {
    pub kind: &'static str,
    pub value: String,
}

/// The two kinds of principal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Role {
    /// Human end user authenticating through the frontend client.
    #[serde(rename = "user")]
    User,
    /// Backend service authenticating at startup.
    #[serde(rename = "APIServer")]
    ApiServer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::ApiServer => "APIServer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "APIServer" => Ok(Role::ApiServer),
            other => Err(UnknownTag {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

/// Which flow a grant belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FlowPath {
    Signup,
    Signin,
    ApiAuth,
    RefreshOpenid,
}

impl FlowPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowPath::Signup => "signup",
            FlowPath::Signin => "signin",
            FlowPath::ApiAuth => "apiauth",
            FlowPath::RefreshOpenid => "refreshopenid",
        }
    }
}

impl fmt::Display for FlowPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlowPath {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "signup" => Ok(FlowPath::Signup),
            "signin" => Ok(FlowPath::Signin),
            "apiauth" => Ok(FlowPath::ApiAuth),
            "refreshopenid" => Ok(FlowPath::RefreshOpenid),
            other => Err(UnknownTag {
                kind: "path",
                value: other.to_string(),
            }),
        }
    }
}

/// Credentials staged by intake and consumed once by the openid-data hook.
#[derive(Clone, PartialEq, Eq)]
pub struct ClaimTicket {
    pub identifier: String,
    pub password: Option<String>,
    pub path: FlowPath,
}

impl ClaimTicket {
    pub fn user(identifier: &str, password: &str, path: FlowPath) -> Self {
        Self {
            identifier: identifier.to_string(),
            password: Some(password.to_string()),
            path,
        }
    }

    pub fn service(service_id: &str) -> Self {
        Self {
            identifier: service_id.to_string(),
            password: None,
            path: FlowPath::ApiAuth,
        }
    }
}

impl fmt::Debug for ClaimTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaimTicket")
            .field("identifier", &self.identifier)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("path", &self.path)
            .finish()
    }
}

/// Demo profile attached to new user accounts.
pub struct DemoProfile;

impl DemoProfile {
    pub const NAME: &'static str = "Robert";
    pub const AGE: &'static str = "35";
    pub const CITY: &'static str = "London";
}

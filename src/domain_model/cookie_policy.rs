use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for SameSite {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(SameSite::Strict),
            "lax" => Ok(SameSite::Lax),
            "none" => Ok(SameSite::None),
            other => Err(format!("unknown SameSite value: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

/// What the transport layer needs to know about the incoming request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Host the request was addressed to, with or without port.
    pub host: String,
    pub is_https: bool,
    /// `Origin` header, when the browser sent one.
    pub origin: Option<String>,
}

impl RequestContext {
    pub fn new(host: impl Into<String>, is_https: bool) -> Self {
        Self {
            host: host.into(),
            is_https,
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

/// Transport attributes for the refresh-token cookie, resolved per request.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct CookiePolicy {
    pub enabled: bool,
    pub name: String,
    pub samesite: SameSite,
    pub secure: bool,
    pub httponly: bool,
    pub path: String,
    pub domain: Option<String>,
    pub lifetime_secs: i64,
    pub environment: Environment,
}

impl CookiePolicy {
    fn builder(&self, value: String) -> cookie::CookieBuilder<'static> {
        let same_site = match self.samesite {
            SameSite::Strict => cookie::SameSite::Strict,
            SameSite::Lax => cookie::SameSite::Lax,
            SameSite::None => cookie::SameSite::None,
        };
        let mut builder = cookie::Cookie::build((self.name.clone(), value))
            .path(self.path.clone())
            .http_only(self.httponly)
            .secure(self.secure)
            .same_site(same_site);
        if let Some(domain) = &self.domain {
            builder = builder.domain(domain.clone());
        }
        builder
    }

    pub fn set_cookie_header(&self, value: &str) -> String {
        self.builder(value.to_string())
            .max_age(time::Duration::seconds(self.lifetime_secs))
            .build()
            .encoded()
            .to_string()
    }

    pub fn clear_cookie_header(&self) -> String {
        self.builder(String::new())
            .max_age(time::Duration::ZERO)
            .expires(time::OffsetDateTime::UNIX_EPOCH)
            .build()
            .encoded()
            .to_string()
    }

    /// Picks this cookie's value out of a `Cookie` request header.
    pub fn extract_from_header(&self, cookie_header: &str) -> Option<String> {
        cookie::Cookie::split_parse_encoded(cookie_header)
            .flatten()
            .find(|c| c.name() == self.name)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty())
    }
}

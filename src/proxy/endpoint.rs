use std::{fmt::Display, str::FromStr};

use url::Url;

use crate::result::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProxyScheme {
    Http,
    Https,
    Socks5,
}

impl ProxyScheme {
    fn as_str(self) -> &'static str {
        match self {
            ProxyScheme::Http => "http",
            ProxyScheme::Https => "https",
            ProxyScheme::Socks5 => "socks5",
        }
    }
}

/// A proxy, known to have a supported scheme and a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    scheme: ProxyScheme,
    /// `host[:port]`, safe to log
    host: String,
    url: String,
}

impl ProxyEndpoint {
    /// Parse a proxy URL. Both the scheme and the host must be present.
    pub fn parse(raw: &str) -> Result<Self, ErrorKind> {
        let url = Url::parse(raw.trim()).map_err(|_| ErrorKind::ProxyError)?;

        let scheme = match url.scheme() {
            "http" => ProxyScheme::Http,
            "https" => ProxyScheme::Https,
            "socks5" => ProxyScheme::Socks5,
            _ => return Err(ErrorKind::ProxyError),
        };

        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host,
            _ => return Err(ErrorKind::ProxyError),
        };
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_owned(),
        };

        let address = match (url.username(), url.password()) {
            ("", None) => host.clone(),
            (user, None) => format!("{user}@{host}"),
            (user, Some(password)) => format!("{user}:{password}@{host}"),
        };

        Ok(Self {
            scheme,
            url: format!("{}://{address}", scheme.as_str()),
            host,
        })
    }

    /// Parse a configured proxy candidate.
    ///
    /// Unlike [`ProxyEndpoint::parse`], a bare `host:port` is accepted
    /// and taken as an HTTP proxy.
    pub fn from_candidate(raw: &str) -> Result<Self, ErrorKind> {
        let raw = raw.trim();
        if raw.contains("://") {
            Self::parse(raw)
        } else {
            Self::parse(&format!("http://{raw}"))
        }
    }

    /// The full proxy URL, credentials included
    pub fn as_str(&self) -> &str {
        &self.url
    }
}

impl FromStr for ProxyEndpoint {
    type Err = ErrorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Credentials are left out so the endpoint can be logged
impl Display for ProxyEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}", self.scheme.as_str(), self.host)
    }
}

//! Route templates and bind points.

use std::fmt;
use std::str::FromStr;

use http::Method;
use thiserror::Error;

use crate::params::Params;

/// Errors raised while parsing a route template specification.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    /// The template string has no `METHOD /path` shape.
    #[error("template '{spec}' must be 'METHOD /path'")]
    MissingMethod {
        /// The offending template string.
        spec: String,
    },

    /// The method token is not a standard HTTP method.
    #[error("template '{spec}' has invalid method '{method}'")]
    InvalidMethod {
        /// The offending template string.
        spec: String,
        /// The rejected method token.
        method: String,
    },

    /// A `{}` parameter segment with an empty name.
    #[error("template '{spec}' contains an unnamed parameter segment")]
    UnnamedParam {
        /// The offending template string.
        spec: String,
    },

    /// The path part does not start with `/`.
    #[error("template '{spec}' path must start with '/'")]
    RelativePath {
        /// The offending template string.
        spec: String,
    },
}

/// The transport a listener speaks. TLS is never terminated by the
/// emulator; the protocol is part of bind and match identity only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Plain HTTP/1.1.
    Http,
    /// Endpoints declared as HTTPS by the emulated service. Served as
    /// HTTP/1.1 on the declared port.
    Https,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => f.write_str("http"),
            Self::Https => f.write_str("https"),
        }
    }
}

/// The (port, protocol) pair an endpoint is served on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindPoint {
    /// TCP port.
    pub port: u16,
    /// Declared protocol.
    pub protocol: Protocol,
}

impl BindPoint {
    /// An HTTP bind point on `port`.
    #[must_use]
    pub fn http(port: u16) -> Self {
        Self {
            port,
            protocol: Protocol::Http,
        }
    }

    /// An HTTPS-declared bind point on `port`.
    #[must_use]
    pub fn https(port: u16) -> Self {
        Self {
            port,
            protocol: Protocol::Https,
        }
    }
}

impl fmt::Display for BindPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.protocol, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// One parsed `METHOD /literal/{param}/...` route template.
///
/// # Example
///
/// ```rust
/// use http::Method;
/// use nimbus_router::RouteTemplate;
///
/// let template: RouteTemplate =
///     "PUT /subscriptions/{subscriptionId}/resourceGroups/{resourceGroupName}"
///         .parse()
///         .unwrap();
///
/// let params = template
///     .matches(&Method::PUT, "/subscriptions/sub1/resourceGroups/rg1")
///     .unwrap();
/// assert_eq!(params.get("subscriptionId"), Some("sub1"));
/// assert_eq!(params.get("resourceGroupName"), Some("rg1"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTemplate {
    method: Method,
    segments: Vec<Segment>,
    raw: String,
}

impl RouteTemplate {
    /// Parses a `METHOD /path` template specification.
    pub fn parse(spec: &str) -> Result<Self, TemplateError> {
        let mut parts = spec.splitn(2, char::is_whitespace);
        let method_token = parts.next().unwrap_or_default();
        let path = parts
            .next()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| TemplateError::MissingMethod {
                spec: spec.to_owned(),
            })?;

        // `Method::from_str` accepts arbitrary extension tokens; route
        // templates only ever use the standard methods.
        let method = match method_token {
            "GET" => Method::GET,
            "PUT" => Method::PUT,
            "POST" => Method::POST,
            "DELETE" => Method::DELETE,
            "PATCH" => Method::PATCH,
            "HEAD" => Method::HEAD,
            "OPTIONS" => Method::OPTIONS,
            other => {
                return Err(TemplateError::InvalidMethod {
                    spec: spec.to_owned(),
                    method: other.to_owned(),
                })
            }
        };

        if !path.starts_with('/') {
            return Err(TemplateError::RelativePath {
                spec: spec.to_owned(),
            });
        }

        let mut segments = Vec::new();
        for part in path.split('/').filter(|s| !s.is_empty()) {
            if let Some(name) = part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                if name.is_empty() {
                    return Err(TemplateError::UnnamedParam {
                        spec: spec.to_owned(),
                    });
                }
                segments.push(Segment::Param(name.to_owned()));
            } else {
                segments.push(Segment::Literal(part.to_owned()));
            }
        }

        Ok(Self {
            method,
            segments,
            raw: spec.to_owned(),
        })
    }

    /// The template's HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The original `METHOD /path` specification string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Matches a request against this template.
    ///
    /// Returns the captured parameters iff the method matches, the
    /// segment counts are equal, every literal equals its path segment
    /// exactly (case-sensitive), and every parameter segment is
    /// non-empty. Trailing slashes are normalized away by the empty
    /// segment filter.
    #[must_use]
    pub fn matches(&self, method: &Method, path: &str) -> Option<Params> {
        if method != self.method {
            return None;
        }

        let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if path_segments.len() != self.segments.len() {
            return None;
        }

        let mut params = Params::new();
        for (segment, candidate) in self.segments.iter().zip(&path_segments) {
            match segment {
                Segment::Literal(lit) => {
                    // One mismatched literal excludes the template.
                    if lit != candidate {
                        return None;
                    }
                }
                Segment::Param(name) => params.push(name.clone(), (*candidate).to_owned()),
            }
        }
        Some(params)
    }
}

impl FromStr for RouteTemplate {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RouteTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

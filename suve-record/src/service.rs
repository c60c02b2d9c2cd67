use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

/// Which AWS configuration service a record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    Param,
    Secret,
}

impl Service {
    pub const ALL: [Service; 2] = [Service::Param, Service::Secret];

    /// Parse the `service | ""` wire convention used throughout the
    /// protocol: an empty string means "all services", anything else must
    /// be exactly one of the two known services.
    pub fn parse_filter(raw: &str) -> Result<Option<Service>, ServiceUnknown> {
        if raw.is_empty() {
            Ok(None)
        } else {
            raw.parse().map(Some)
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Service::Param => write!(f, "param"),
            Service::Secret => write!(f, "secret"),
        }
    }
}

impl FromStr for Service {
    type Err = ServiceUnknown;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "param" => Ok(Service::Param),
            "secret" => Ok(Service::Secret),
            other => Err(ServiceUnknown(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown service: {0}")]
pub struct ServiceUnknown(pub String);

/// An opaque, byte-safe record identifier. Path-shaped for `Service::Param`,
/// flat for `Service::Secret` — this crate does not validate shape, that is
/// a concern of whatever strategy talks to the real API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Name(pub String);

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Name(s.to_string())
    }
}

impl From<String> for Name {
    fn from(s: String) -> Self {
        Name(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_filter_empty_is_all_services() {
        assert_eq!(Service::parse_filter("").unwrap(), None);
    }

    #[test]
    fn parse_filter_rejects_unknown() {
        assert!(Service::parse_filter("bogus").is_err());
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for s in Service::ALL {
            assert_eq!(s.to_string().parse::<Service>().unwrap(), s);
        }
    }
}

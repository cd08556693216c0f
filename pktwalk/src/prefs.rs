//! Per-protocol preferences, read from TOML.
//!
//! ```toml
//! [protocols.gopher]
//! tcp-ports = "70,1070-1075"
//!
//! [protocols.mndp]
//! heuristic = true
//!
//! [protocols.fefd]
//! enabled = false
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PrefsError>;

#[derive(Error, Debug)]
pub enum PrefsError {
    #[error("invalid port range: {0}")]
    InvalidPortRange(String),
    #[error("invalid preferences: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("cannot read preferences from {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Preferences for every protocol, keyed by protocol abbreviation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Preferences {
    #[serde(default)]
    pub protocols: BTreeMap<String, ProtocolPrefs>,
}

impl Preferences {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        Ok(toml::from_str(input)?)
    }

    pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let input = fs::read_to_string(path).map_err(|source| PrefsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&input)
    }

    pub fn protocol(&self, abbrev: &str) -> Option<&ProtocolPrefs> {
        self.protocols.get(abbrev)
    }

    /// Protocols are enabled unless their preferences say otherwise.
    pub fn is_enabled(&self, abbrev: &str) -> bool {
        self.protocol(abbrev).map_or(true, |p| p.enabled)
    }

    pub fn with_protocol(mut self, abbrev: impl Into<String>, prefs: ProtocolPrefs) -> Self {
        self.protocols.insert(abbrev.into(), prefs);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ProtocolPrefs {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub udp_ports: Option<PortRange>,
    #[serde(default)]
    pub tcp_ports: Option<PortRange>,
    /// Whether to try the protocol's heuristic on traffic not bound to its ports.
    #[serde(default)]
    pub heuristic: Option<bool>,
}

fn default_enabled() -> bool {
    true
}

impl Default for ProtocolPrefs {
    fn default() -> Self {
        Self {
            enabled: true,
            udp_ports: None,
            tcp_ports: None,
            heuristic: None,
        }
    }
}

/// A set of ports written as e.g. `70,1070-1075`. An empty string is an empty set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct PortRange(Vec<RangeInclusive<u16>>);

impl PortRange {
    pub fn single(port: u16) -> Self {
        Self(vec![port..=port])
    }

    pub fn contains(&self, port: u16) -> bool {
        self.0.iter().any(|r| r.contains(&port))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every port in the set, in the order the ranges were written.
    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.0.iter().flat_map(|r| r.clone())
    }
}

impl FromStr for PortRange {
    type Err = PrefsError;

    fn from_str(s: &str) -> Result<Self> {
        let parse = |port: &str| {
            port.trim()
                .parse::<u16>()
                .map_err(|_| PrefsError::InvalidPortRange(s.to_string()))
        };
        let mut ranges = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let range = match part.split_once('-') {
                Some((lo, hi)) => {
                    let (lo, hi) = (parse(lo)?, parse(hi)?);
                    if lo > hi {
                        return Err(PrefsError::InvalidPortRange(s.to_string()));
                    }
                    lo..=hi
                }
                None => {
                    let port = parse(part)?;
                    port..=port
                }
            };
            ranges.push(range);
        }
        Ok(Self(ranges))
    }
}

impl TryFrom<String> for PortRange {
    type Error = PrefsError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, range) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            if range.start() == range.end() {
                write!(f, "{}", range.start())?;
            } else {
                write!(f, "{}-{}", range.start(), range.end())?;
            }
        }
        Ok(())
    }
}

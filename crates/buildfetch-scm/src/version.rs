//! Dotted server/toolkit versions.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::RepositoryError;

/// A dotted numeric version such as `6.0.3` or `6.0.6.1`.
///
/// Missing trailing components compare as zero, so `6.0` == `6.0.0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServerVersion {
    parts: Vec<u32>,
}

impl ServerVersion {
    pub fn new(parts: &[u32]) -> Self {
        Self {
            parts: parts.to_vec(),
        }
    }

    fn part(&self, idx: usize) -> u32 {
        self.parts.get(idx).copied().unwrap_or(0)
    }
}

impl FromStr for ServerVersion {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(RepositoryError::InvalidData(
                "server version must not be empty".to_string(),
            ));
        }
        let parts = trimmed
            .split('.')
            .map(|p| {
                p.parse::<u32>().map_err(|_| {
                    RepositoryError::InvalidData(format!("invalid server version: {trimmed}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { parts })
    }
}

impl TryFrom<String> for ServerVersion {
    type Error = RepositoryError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ServerVersion> for String {
    fn from(v: ServerVersion) -> Self {
        v.to_string()
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.parts.iter().map(|p| p.to_string()).collect();
        write!(f, "{}", rendered.join("."))
    }
}

impl PartialEq for ServerVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ServerVersion {}

impl PartialOrd for ServerVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ServerVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        for idx in 0..len {
            match self.part(idx).cmp(&other.part(idx)) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

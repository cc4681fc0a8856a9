//! Operation categories used to select rate limits.

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::FiregateError;

/// The category of work a request represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    Scrape,
    Crawl,
    Search,
    Extract,
    Map,
    Batch,
    VectorSearch,
    General,
}

impl Operation {
    /// Every operation category, `General` last.
    pub const ALL: [Operation; 8] = [
        Operation::Scrape,
        Operation::Crawl,
        Operation::Search,
        Operation::Extract,
        Operation::Map,
        Operation::Batch,
        Operation::VectorSearch,
        Operation::General,
    ];

    /// Label used in configuration, scopes and status output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Scrape => "scrape",
            Operation::Crawl => "crawl",
            Operation::Search => "search",
            Operation::Extract => "extract",
            Operation::Map => "map",
            Operation::Batch => "batch",
            Operation::VectorSearch => "vector_search",
            Operation::General => "general",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = FiregateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| FiregateError::Config(format!("unknown operation '{}'", s)))
    }
}

// Serialized as the plain label so operations can key maps in any format.
impl Serialize for Operation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Operation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        label.parse().map_err(de::Error::custom)
    }
}

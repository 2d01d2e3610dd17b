//! Topic names and compiled topic filters
//!
//! Topics are `/`-separated levels. In a filter, `+` stands for exactly one
//! level and `#` for all remaining levels, including none. Both must occupy a
//! whole level and `#` must be the last one. A filter whose first level is a
//! wildcard does not match topics starting with `$`.

use crate::error::{BusError, BusResult};
use std::fmt;
use std::str::FromStr;

pub const SINGLE_LEVEL_WILDCARD: &str = "+";
pub const MULTI_LEVEL_WILDCARD: &str = "#";
pub const LEVEL_SEPARATOR: char = '/';

#[derive(Debug, Clone, PartialEq, Eq)]
enum Level {
    Literal(String),
    SingleLevel,
    MultiLevel,
}

/// A topic filter compiled into per-level matchers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicFilter {
    pattern: String,
    levels: Vec<Level>,
}

impl TopicFilter {
    pub fn new(pattern: &str) -> BusResult<Self> {
        let invalid = |reason| BusError::InvalidTopic {
            topic: pattern.to_string(),
            reason,
        };

        if pattern.is_empty() {
            return Err(invalid("topic filter is empty"));
        }
        if pattern.contains('\0') {
            return Err(invalid("topic filter contains NUL"));
        }

        let raw: Vec<&str> = pattern.split(LEVEL_SEPARATOR).collect();
        let last = raw.len() - 1;
        let mut levels = Vec::with_capacity(raw.len());
        for (i, level) in raw.into_iter().enumerate() {
            let compiled = match level {
                SINGLE_LEVEL_WILDCARD => Level::SingleLevel,
                MULTI_LEVEL_WILDCARD if i == last => Level::MultiLevel,
                MULTI_LEVEL_WILDCARD => return Err(invalid("'#' must be the last level")),
                literal if literal.contains(['+', '#']) => {
                    return Err(invalid("wildcards must occupy a whole level"))
                }
                literal => Level::Literal(literal.to_string()),
            };
            levels.push(compiled);
        }

        Ok(Self {
            pattern: pattern.to_string(),
            levels,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Whether the literal `topic` is covered by this filter
    pub fn matches(&self, topic: &str) -> bool {
        if topic.starts_with('$')
            && matches!(self.levels.first(), Some(Level::SingleLevel | Level::MultiLevel))
        {
            return false;
        }

        let mut parts = topic.split(LEVEL_SEPARATOR);
        for level in &self.levels {
            match level {
                Level::MultiLevel => return true,
                Level::SingleLevel => {
                    if parts.next().is_none() {
                        return false;
                    }
                }
                Level::Literal(expected) => {
                    if parts.next() != Some(expected.as_str()) {
                        return false;
                    }
                }
            }
        }
        parts.next().is_none()
    }
}

impl FromStr for TopicFilter {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for TopicFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

/// Check a concrete topic name used for publishing
pub fn validate_topic_name(topic: &str) -> BusResult<()> {
    let invalid = |reason| BusError::InvalidTopic {
        topic: topic.to_string(),
        reason,
    };
    if topic.is_empty() {
        return Err(invalid("topic is empty"));
    }
    if topic.contains(['+', '#']) {
        return Err(invalid("wildcards are not allowed in topic names"));
    }
    if topic.contains('\0') {
        return Err(invalid("topic contains NUL"));
    }
    Ok(())
}

// SPDX-License-Identifier: MPL-2.0

//! Topic names, topic filters and wildcard matching (MQTT 3.1.1, 4.7).

mod matcher;

pub use matcher::{matches, matches_any};

use thiserror::Error;

/// Longest UTF-8 encoded string the protocol can carry.
pub const MAX_TOPIC_LEN: usize = u16::MAX as usize;

pub const LEVEL_SEPARATOR: char = '/';
pub const SINGLE_LEVEL_WILDCARD: &str = "+";
pub const MULTI_LEVEL_WILDCARD: &str = "#";

/// Errors raised when a topic name or topic filter breaks the 3.1.1 rules.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopicError {
    #[error("topic must be at least one character long")]
    Empty,

    #[error("topic is {0} bytes, exceeding 65535")]
    TooLong(usize),

    #[error("topic contains the null character")]
    NullCharacter,

    #[error("topic name must not contain wildcard characters")]
    WildcardInName,

    #[error("wildcard in level '{level}' at position {position} must occupy the whole level")]
    InvalidWildcardLevel { level: String, position: usize },

    #[error("multi-level wildcard must be the last level")]
    MultiLevelWildcardNotLast,
}

fn check_common(topic: &str) -> Result<(), TopicError> {
    if topic.is_empty() {
        return Err(TopicError::Empty);
    }
    if topic.len() > MAX_TOPIC_LEN {
        return Err(TopicError::TooLong(topic.len()));
    }
    if topic.contains('\u{0000}') {
        return Err(TopicError::NullCharacter);
    }
    Ok(())
}

/// Validates a concrete topic name used in PUBLISH.
///
/// Empty levels (`a//b`, `/a`) are legal in 3.1.1 and accepted.
pub fn validate_topic_name(topic: &str) -> Result<(), TopicError> {
    check_common(topic)?;
    if topic.contains(['+', '#']) {
        return Err(TopicError::WildcardInName);
    }
    Ok(())
}

/// Validates a topic filter used in SUBSCRIBE / UNSUBSCRIBE.
pub fn validate_topic_filter(filter: &str) -> Result<(), TopicError> {
    check_common(filter)?;

    let levels: Vec<&str> = filter.split(LEVEL_SEPARATOR).collect();
    let last = levels.len() - 1;
    for (position, level) in levels.iter().enumerate() {
        if *level == MULTI_LEVEL_WILDCARD {
            if position != last {
                return Err(TopicError::MultiLevelWildcardNotLast);
            }
        } else if *level != SINGLE_LEVEL_WILDCARD && level.contains(['+', '#']) {
            return Err(TopicError::InvalidWildcardLevel {
                level: level.to_string(),
                position,
            });
        }
    }
    Ok(())
}

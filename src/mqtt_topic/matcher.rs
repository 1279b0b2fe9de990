// SPDX-License-Identifier: MPL-2.0

use super::{LEVEL_SEPARATOR, MULTI_LEVEL_WILDCARD, SINGLE_LEVEL_WILDCARD};

/// Returns true when `topic_name` is matched by `filter`.
///
/// Both arguments are expected to be valid; an invalid filter simply fails to
/// match. Topics starting with `$` are not matched by a leading `+` or `#`.
pub fn matches(filter: &str, topic_name: &str) -> bool {
    if topic_name.starts_with('$')
        && (filter.starts_with(SINGLE_LEVEL_WILDCARD) || filter.starts_with(MULTI_LEVEL_WILDCARD))
    {
        return false;
    }

    let mut filter_levels = filter.split(LEVEL_SEPARATOR);
    let mut topic_levels = topic_name.split(LEVEL_SEPARATOR);

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            // '#' also covers the parent level: "a/#" matches "a"
            (Some(MULTI_LEVEL_WILDCARD), _) => return filter_levels.next().is_none(),
            (Some(SINGLE_LEVEL_WILDCARD), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Filters out of `filters` that match `topic_name`, in iteration order.
pub fn matches_any<'a, I>(filters: I, topic_name: &str) -> Vec<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    filters
        .into_iter()
        .filter(|f| matches(f, topic_name))
        .collect()
}

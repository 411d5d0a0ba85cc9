//! MQTT topic names and filters.

/// Longest topic the MQTT protocol can carry
const MAX_TOPIC_LEN: usize = 65535;

/// Check that a topic can be subscribed to.
pub fn valid_subscribe_topic(topic: &str) -> Result<(), String> {
    if topic.is_empty() {
        return Err("topic must not be empty".to_string());
    }
    if topic.len() > MAX_TOPIC_LEN {
        return Err(format!("topic is longer than {} bytes", MAX_TOPIC_LEN));
    }
    if topic.contains('\0') {
        return Err("topic must not contain NUL".to_string());
    }
    Ok(())
}

/// Check that a topic can be published to. Wildcards are not allowed.
pub fn valid_publish_topic(topic: &str) -> Result<(), String> {
    valid_subscribe_topic(topic)?;
    if topic.contains(['+', '#']) {
        return Err("publish topic must not contain wildcards '+' or '#'".to_string());
    }
    Ok(())
}

/// Whether a message published on `topic` is delivered to a subscription on
/// `filter`.
///
/// `+` matches exactly one level, `#` matches the rest of the topic including
/// its parent level. Wildcards at the first level never match `$` topics.
pub fn matches(filter: &str, topic: &str) -> bool {
    if topic.starts_with('$') && filter.starts_with(['+', '#']) {
        return false;
    }

    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_validation() {
        assert!(valid_subscribe_topic("voip/+/state").is_ok());
        assert!(valid_subscribe_topic("voip/#").is_ok());
        assert!(valid_subscribe_topic("").is_err());
        assert!(valid_subscribe_topic("bad\0topic").is_err());
        assert!(valid_subscribe_topic(&"a".repeat(MAX_TOPIC_LEN)).is_ok());
        assert!(valid_subscribe_topic(&"a".repeat(MAX_TOPIC_LEN + 1)).is_err());

        assert!(valid_publish_topic("voip/line1/dial").is_ok());
        assert!(valid_publish_topic("voip/+/dial").is_err());
        assert!(valid_publish_topic("voip/#").is_err());
    }

    #[test]
    fn test_exact_match() {
        assert!(matches("voip/line1/state", "voip/line1/state"));
        assert!(!matches("voip/line1/state", "voip/line2/state"));
        assert!(!matches("voip/line1", "voip/line1/state"));
        assert!(!matches("voip/line1/state", "voip/line1"));
    }

    #[test]
    fn test_single_level_wildcard() {
        assert!(matches("voip/+/state", "voip/line1/state"));
        assert!(!matches("voip/+/state", "voip/line1/extra/state"));
        assert!(!matches("voip/+", "voip"));
    }

    #[test]
    fn test_multi_level_wildcard() {
        assert!(matches("voip/#", "voip/line1/state"));
        assert!(matches("voip/#", "voip"));
        assert!(matches("#", "voip/line1"));
        assert!(!matches("voip/#", "other/line1"));
    }

    #[test]
    fn test_system_topics() {
        assert!(!matches("#", "$SYS/broker/uptime"));
        assert!(!matches("+/broker/uptime", "$SYS/broker/uptime"));
        assert!(matches("$SYS/#", "$SYS/broker/uptime"));
    }
}

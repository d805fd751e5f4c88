use crate::DeviceId;

pub const TOPIC_ROOT: &str = "iot/devices";

/// Every data topic of every device.
pub const ALL_DATA: &str = "iot/devices/+/data";
/// Every status topic of every device.
pub const ALL_STATUS: &str = "iot/devices/+/status";
/// Everything under the device tree.
pub const ALL_DEVICE_TOPICS: &str = "iot/devices/+/+";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicKind {
    Data,
    Status,
}

impl TopicKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicKind::Data => "data",
            TopicKind::Status => "status",
        }
    }
}

pub fn device_topic(id: &DeviceId, kind: TopicKind) -> String {
    format!("{TOPIC_ROOT}/{}/{}", id.0, kind.as_str())
}

pub fn data_topic(id: &DeviceId) -> String {
    device_topic(id, TopicKind::Data)
}

pub fn status_topic(id: &DeviceId) -> String {
    device_topic(id, TopicKind::Status)
}

/// Split `iot/devices/{id}/{data|status}` into its device id and kind.
pub fn parse_device_topic(topic: &str) -> Option<(&str, TopicKind)> {
    let rest = topic.strip_prefix(TOPIC_ROOT)?.strip_prefix('/')?;
    let (id, suffix) = rest.split_once('/')?;
    if id.is_empty() {
        return None;
    }
    let kind = match suffix {
        "data" => TopicKind::Data,
        "status" => TopicKind::Status,
        _ => return None,
    };
    Some((id, kind))
}

/// MQTT topic filter matching with `+` (one level) and `#` (rest of tree).
pub fn matches_filter(filter: &str, topic: &str) -> bool {
    let mut levels = topic.split('/');

    for pattern in filter.split('/') {
        match pattern {
            "#" => return true,
            "+" => {
                if levels.next().is_none() {
                    return false;
                }
            }
            literal => {
                if levels.next() != Some(literal) {
                    return false;
                }
            }
        }
    }

    levels.next().is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_device_topics() {
        let id = DeviceId("51c11d31".into());
        assert_eq!(data_topic(&id), "iot/devices/51c11d31/data");
        assert_eq!(status_topic(&id), "iot/devices/51c11d31/status");
    }

    #[test]
    fn parses_device_topics() {
        assert_eq!(
            parse_device_topic("iot/devices/abc/data"),
            Some(("abc", TopicKind::Data))
        );
        assert_eq!(
            parse_device_topic("iot/devices/abc/status"),
            Some(("abc", TopicKind::Status))
        );
        assert_eq!(parse_device_topic("iot/devices/abc/command"), None);
        assert_eq!(parse_device_topic("iot/devices//data"), None);
        assert_eq!(parse_device_topic("device/status"), None);
        assert_eq!(parse_device_topic("iot/devicesX/abc/data"), None);
    }

    #[test]
    fn filter_matching() {
        assert!(matches_filter(ALL_DATA, "iot/devices/abc/data"));
        assert!(!matches_filter(ALL_DATA, "iot/devices/abc/status"));
        assert!(matches_filter(ALL_DEVICE_TOPICS, "iot/devices/abc/status"));
        assert!(!matches_filter(ALL_DEVICE_TOPICS, "iot/devices/abc"));
        assert!(!matches_filter(ALL_DEVICE_TOPICS, "iot/devices/abc/status/extra"));
        assert!(matches_filter("iot/#", "iot/devices/abc/data"));
        assert!(matches_filter("iot/devices/abc/data", "iot/devices/abc/data"));
    }
}

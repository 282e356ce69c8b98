use crate::{channel::ChannelKind, settings::SettingsField};

pub const TOPIC_STATUS: &str = "status";

pub const TOPIC_TEMPERATURE: &str = "temperature";
pub const TOPIC_HUMIDITY: &str = "humidity";
pub const TOPIC_INLET_TEMPERATURE: &str = "inletTemperature";

pub const TOPIC_SET_MODE: &str = "mode/set";
pub const TOPIC_SET_DEVICE_STATE: &str = "state/set";
pub const TOPIC_SET_DESIRED_TEMPERATURE: &str = "desiredTemperature/set";

pub const COMMAND_TOPICS: [(&str, SettingsField); 3] = [
    (TOPIC_SET_MODE, SettingsField::Mode),
    (TOPIC_SET_DEVICE_STATE, SettingsField::DeviceState),
    (TOPIC_SET_DESIRED_TEMPERATURE, SettingsField::DesiredTemperature),
];

pub fn topic(base: &str, suffix: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.is_empty() {
        suffix.to_string()
    } else {
        format!("{base}/{suffix}")
    }
}

pub fn average_topic(base: &str, kind: ChannelKind) -> String {
    let suffix = match kind {
        ChannelKind::Temperature => TOPIC_TEMPERATURE,
        ChannelKind::Humidity => TOPIC_HUMIDITY,
        ChannelKind::InletPipe => TOPIC_INLET_TEMPERATURE,
    };
    topic(base, suffix)
}

/// Maps an incoming command topic to the setting it changes.
pub fn command_field(base: &str, incoming: &str) -> Option<SettingsField> {
    COMMAND_TOPICS
        .into_iter()
        .find(|(suffix, _)| topic(base, suffix) == incoming)
        .map(|(_, field)| field)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_base_without_double_slash() {
        assert_eq!(topic("flat/FanCoil/", TOPIC_STATUS), "flat/FanCoil/status");
        assert_eq!(topic("", TOPIC_STATUS), "status");
        assert_eq!(
            average_topic("flat/FanCoil", ChannelKind::InletPipe),
            "flat/FanCoil/inletTemperature"
        );
    }

    #[test]
    fn resolves_command_topics() {
        assert_eq!(
            command_field("flat/FanCoil", "flat/FanCoil/desiredTemperature/set"),
            Some(SettingsField::DesiredTemperature)
        );
        assert_eq!(command_field("flat/FanCoil", "other/mode/set"), None);
        assert_eq!(command_field("flat/FanCoil", "flat/FanCoil/temperature"), None);
    }
}

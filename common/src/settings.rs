use crate::error::SettingsError;

pub const MQTT_SERVER_KEY: &str = "mqtt_server";
pub const MQTT_PORT_KEY: &str = "mqtt_port";
pub const MQTT_CLIENT_ID_KEY: &str = "mqtt_client_id";
pub const MQTT_USER_KEY: &str = "mqtt_user";
pub const MQTT_PASS_KEY: &str = "mqtt_pass";
pub const BASE_TOPIC_KEY: &str = "base_topic";
pub const MODE_KEY: &str = "mode";
pub const DEVICE_STATE_KEY: &str = "device_state";
pub const DESIRED_TEMPERATURE_KEY: &str = "desired_temperature";

const MIN_DESIRED_TEMP_C: f32 = 5.0;
const MAX_DESIRED_TEMP_C: f32 = 35.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingsField {
    MqttServer,
    MqttPort,
    MqttClientId,
    MqttUser,
    MqttPass,
    BaseTopic,
    Mode,
    DeviceState,
    DesiredTemperature,
}

impl SettingsField {
    pub const ALL: [SettingsField; 9] = [
        Self::MqttServer,
        Self::MqttPort,
        Self::MqttClientId,
        Self::MqttUser,
        Self::MqttPass,
        Self::BaseTopic,
        Self::Mode,
        Self::DeviceState,
        Self::DesiredTemperature,
    ];

    /// Fields the configuration portal lets the user edit.
    pub const PORTAL: [SettingsField; 6] = [
        Self::MqttServer,
        Self::MqttPort,
        Self::MqttClientId,
        Self::MqttUser,
        Self::MqttPass,
        Self::BaseTopic,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Self::MqttServer => MQTT_SERVER_KEY,
            Self::MqttPort => MQTT_PORT_KEY,
            Self::MqttClientId => MQTT_CLIENT_ID_KEY,
            Self::MqttUser => MQTT_USER_KEY,
            Self::MqttPass => MQTT_PASS_KEY,
            Self::BaseTopic => BASE_TOPIC_KEY,
            Self::Mode => MODE_KEY,
            Self::DeviceState => DEVICE_STATE_KEY,
            Self::DesiredTemperature => DESIRED_TEMPERATURE_KEY,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::MqttServer => "MQTT server",
            Self::MqttPort => "MQTT port",
            Self::MqttClientId => "Client name",
            Self::MqttUser => "MQTT user",
            Self::MqttPass => "MQTT pass",
            Self::BaseTopic => "Main topic",
            Self::Mode => "Mode",
            Self::DeviceState => "Device state",
            Self::DesiredTemperature => "Desired temperature",
        }
    }

    /// Maximum length in characters.
    pub fn max_len(self) -> usize {
        match self {
            Self::MqttServer => 40,
            Self::MqttPort => 6,
            Self::MqttClientId => 24,
            Self::MqttUser => 24,
            Self::MqttPass => 24,
            Self::BaseTopic => 64,
            Self::Mode => 8,
            Self::DeviceState => 4,
            Self::DesiredTemperature => 6,
        }
    }

    pub fn is_secret(self) -> bool {
        matches!(self, Self::MqttPass)
    }
}

/// Returns at most `max_len` leading characters of `value`.
pub fn truncate_to(value: &str, max_len: usize) -> String {
    value.chars().take(max_len).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSettings {
    mqtt_server: String,
    mqtt_port: String,
    mqtt_client_id: String,
    mqtt_user: String,
    mqtt_pass: String,
    base_topic: String,
    mode: String,
    device_state: String,
    desired_temperature: String,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            mqtt_server: String::new(),
            mqtt_port: "1883".to_string(),
            mqtt_client_id: "FanCoil".to_string(),
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
            base_topic: "flat/FanCoil".to_string(),
            mode: "Auto".to_string(),
            device_state: "On".to_string(),
            desired_temperature: "22".to_string(),
        }
    }
}

impl DeviceSettings {
    pub fn get(&self, field: SettingsField) -> &str {
        match field {
            SettingsField::MqttServer => &self.mqtt_server,
            SettingsField::MqttPort => &self.mqtt_port,
            SettingsField::MqttClientId => &self.mqtt_client_id,
            SettingsField::MqttUser => &self.mqtt_user,
            SettingsField::MqttPass => &self.mqtt_pass,
            SettingsField::BaseTopic => &self.base_topic,
            SettingsField::Mode => &self.mode,
            SettingsField::DeviceState => &self.device_state,
            SettingsField::DesiredTemperature => &self.desired_temperature,
        }
    }

    /// Copies `value` into `field`, truncated to the field's maximum length.
    /// Returns whether the stored value changed.
    pub fn set(&mut self, field: SettingsField, value: &str) -> bool {
        let value = truncate_to(value, field.max_len());
        let slot = match field {
            SettingsField::MqttServer => &mut self.mqtt_server,
            SettingsField::MqttPort => &mut self.mqtt_port,
            SettingsField::MqttClientId => &mut self.mqtt_client_id,
            SettingsField::MqttUser => &mut self.mqtt_user,
            SettingsField::MqttPass => &mut self.mqtt_pass,
            SettingsField::BaseTopic => &mut self.base_topic,
            SettingsField::Mode => &mut self.mode,
            SettingsField::DeviceState => &mut self.device_state,
            SettingsField::DesiredTemperature => &mut self.desired_temperature,
        };

        if *slot == value {
            false
        } else {
            *slot = value;
            true
        }
    }

    pub fn mqtt_server(&self) -> &str {
        &self.mqtt_server
    }

    pub fn mqtt_port(&self) -> Option<u16> {
        self.mqtt_port.trim().parse().ok()
    }

    pub fn mqtt_client_id(&self) -> &str {
        &self.mqtt_client_id
    }

    pub fn mqtt_user(&self) -> &str {
        &self.mqtt_user
    }

    pub fn mqtt_pass(&self) -> &str {
        &self.mqtt_pass
    }

    pub fn base_topic(&self) -> &str {
        &self.base_topic
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    pub fn device_state(&self) -> &str {
        &self.device_state
    }

    pub fn desired_temperature_c(&self) -> Option<f32> {
        self.desired_temperature
            .trim()
            .parse::<f32>()
            .ok()
            .filter(|value| value.is_finite())
    }

    /// Applies a setting received at runtime over the message bus. Only
    /// mode, device state and desired temperature may change this way.
    pub fn apply_remote(&mut self, field: SettingsField, value: &str) -> Result<bool, SettingsError> {
        let value = value.trim();
        match field {
            SettingsField::Mode | SettingsField::DeviceState => {
                if value.is_empty() {
                    return Err(SettingsError::Empty(field));
                }
            }
            SettingsField::DesiredTemperature => {
                let parsed = value
                    .parse::<f32>()
                    .map_err(|_| SettingsError::InvalidTemperature(value.to_string()))?;
                if !parsed.is_finite() || !(MIN_DESIRED_TEMP_C..=MAX_DESIRED_TEMP_C).contains(&parsed)
                {
                    return Err(SettingsError::InvalidTemperature(value.to_string()));
                }
            }
            _ => return Err(SettingsError::NotRemotelySettable(field)),
        }

        Ok(self.set(field, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_truncates_to_field_length() {
        let mut settings = DeviceSettings::default();

        assert!(settings.set(SettingsField::MqttPort, "18830000"));
        assert_eq!(settings.get(SettingsField::MqttPort), "188300");

        let topic = "t".repeat(100);
        settings.set(SettingsField::BaseTopic, &topic);
        assert_eq!(settings.base_topic().len(), SettingsField::BaseTopic.max_len());
    }

    #[test]
    fn truncation_counts_characters() {
        assert_eq!(truncate_to("Külmkapp", 3), "Kül");
        assert_eq!(truncate_to("abc", 10), "abc");
    }

    #[test]
    fn remote_updates_are_validated() {
        let mut settings = DeviceSettings::default();

        assert_eq!(settings.apply_remote(SettingsField::DesiredTemperature, " 23.5 "), Ok(true));
        assert_eq!(settings.desired_temperature_c(), Some(23.5));
        assert_eq!(settings.apply_remote(SettingsField::DesiredTemperature, "23.5"), Ok(false));

        assert_eq!(
            settings.apply_remote(SettingsField::DesiredTemperature, "90"),
            Err(SettingsError::InvalidTemperature("90".to_string()))
        );
        assert_eq!(
            settings.apply_remote(SettingsField::Mode, ""),
            Err(SettingsError::Empty(SettingsField::Mode))
        );
        assert_eq!(
            settings.apply_remote(SettingsField::BaseTopic, "other"),
            Err(SettingsError::NotRemotelySettable(SettingsField::BaseTopic))
        );
        assert_eq!(settings.base_topic(), "flat/FanCoil");
    }

    #[test]
    fn port_parses_when_numeric() {
        let mut settings = DeviceSettings::default();
        assert_eq!(settings.mqtt_port(), Some(1883));

        settings.set(SettingsField::MqttPort, "abc");
        assert_eq!(settings.mqtt_port(), None);
    }
}

use serde::{Deserialize, Serialize};

use crate::channel::ChannelKind;

/// A zero `sample_interval_ms` falls back to the channel default on sanitize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(rename = "sampleIntervalMs", default)]
    pub sample_interval_ms: u64,
}

fn enabled_by_default() -> bool {
    true
}

impl ChannelConfig {
    pub fn default_for(kind: ChannelKind) -> Self {
        let sample_interval_ms = match kind {
            ChannelKind::Temperature => 5_000,
            ChannelKind::Humidity => 10_000,
            ChannelKind::InletPipe => 5_000,
        };

        Self {
            enabled: true,
            sample_interval_ms,
        }
    }

    pub fn sanitize(&mut self, kind: ChannelKind) {
        if self.sample_interval_ms == 0 {
            self.sample_interval_ms = Self::default_for(kind).sample_interval_ms;
        }
        self.sample_interval_ms = self.sample_interval_ms.clamp(250, 3_600_000);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SensorConfig {
    pub temperature: ChannelConfig,
    pub humidity: ChannelConfig,
    #[serde(rename = "inletPipe")]
    pub inlet_pipe: ChannelConfig,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            temperature: ChannelConfig::default_for(ChannelKind::Temperature),
            humidity: ChannelConfig::default_for(ChannelKind::Humidity),
            inlet_pipe: ChannelConfig::default_for(ChannelKind::InletPipe),
        }
    }
}

impl SensorConfig {
    pub fn channel(&self, kind: ChannelKind) -> &ChannelConfig {
        match kind {
            ChannelKind::Temperature => &self.temperature,
            ChannelKind::Humidity => &self.humidity,
            ChannelKind::InletPipe => &self.inlet_pipe,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub sensors: SensorConfig,
    #[serde(rename = "portalWaitSeconds")]
    pub portal_wait_seconds: u32,
    #[serde(rename = "portalPort")]
    pub portal_port: u16,
    #[serde(rename = "tickIntervalMs")]
    pub tick_interval_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            sensors: SensorConfig::default(),
            portal_wait_seconds: 180,
            portal_port: 8080,
            tick_interval_ms: 1_000,
        }
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.sensors.temperature.sanitize(ChannelKind::Temperature);
        self.sensors.humidity.sanitize(ChannelKind::Humidity);
        self.sensors.inlet_pipe.sanitize(ChannelKind::InletPipe);

        self.portal_wait_seconds = self.portal_wait_seconds.clamp(10, 3_600);
        self.tick_interval_ms = self.tick_interval_ms.clamp(100, 10_000);

        if self.portal_port == 0 {
            self.portal_port = 8080;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_clamps_out_of_range_values() {
        let mut runtime = RuntimeConfig {
            portal_wait_seconds: 0,
            portal_port: 0,
            tick_interval_ms: 1,
            ..RuntimeConfig::default()
        };
        runtime.sensors.humidity.sample_interval_ms = 5;

        runtime.sanitize();

        assert_eq!(runtime.portal_wait_seconds, 10);
        assert_eq!(runtime.portal_port, 8080);
        assert_eq!(runtime.tick_interval_ms, 100);
        assert_eq!(runtime.sensors.humidity.sample_interval_ms, 250);
    }

    #[test]
    fn missing_sensor_section_uses_defaults() {
        let raw = r#"{"portalWaitSeconds":60,"portalPort":9090,"tickIntervalMs":500}"#;
        let runtime: RuntimeConfig = serde_json::from_str(raw).unwrap();

        assert_eq!(runtime.sensors, SensorConfig::default());
        assert_eq!(runtime.portal_port, 9090);
    }

    #[test]
    fn partial_document_keeps_other_defaults() {
        let raw = r#"{"sensors":{"humidity":{"enabled":false}}}"#;
        let mut runtime: RuntimeConfig = serde_json::from_str(raw).unwrap();
        runtime.sanitize();

        assert!(!runtime.sensors.humidity.enabled);
        assert_eq!(runtime.sensors.humidity.sample_interval_ms, 10_000);
        assert_eq!(
            runtime.sensors.temperature,
            ChannelConfig::default_for(ChannelKind::Temperature)
        );
        assert_eq!(runtime.portal_wait_seconds, 180);
        assert_eq!(runtime.portal_port, 8080);
        assert_eq!(runtime.tick_interval_ms, 1_000);
    }
}

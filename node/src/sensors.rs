use fancoil_common::{ChannelKind, SensorSource};

/// Deterministic readings for host runs.
// Hardware integration point: the target build reads the room probe, the
// humidity sensor and the inlet pipe probe here instead.
#[derive(Debug, Default)]
pub struct SimulatedSensors {
    ticks: [u64; 3],
}

impl SensorSource for SimulatedSensors {
    fn read(&mut self, kind: ChannelKind) -> Option<f32> {
        let slot = match kind {
            ChannelKind::Temperature => 0,
            ChannelKind::Humidity => 1,
            ChannelKind::InletPipe => 2,
        };
        let tick = self.ticks[slot];
        self.ticks[slot] = tick.saturating_add(1);

        let reading = match kind {
            ChannelKind::Temperature => 21.0 + (tick % 8) as f32 * 0.2,
            ChannelKind::Humidity => 45.0 + (tick % 6) as f32 * 0.5,
            ChannelKind::InletPipe => 38.0 + (tick % 10) as f32 * 0.3,
        };
        Some(reading)
    }
}

use tracing::{debug, info};

use crate::{
    channel::{ChannelKind, RollingAverageChannel, SensorSource},
    config::SensorConfig,
};

/// One rolling-average channel per sensor kind, owned by the composition root.
#[derive(Debug, Clone)]
pub struct SensorRegistry {
    channels: [RollingAverageChannel; 3],
}

impl SensorRegistry {
    pub fn new(config: &SensorConfig) -> Self {
        let channels = ChannelKind::ALL.map(|kind| {
            let channel_config = config.channel(kind);
            let mut channel = RollingAverageChannel::initialize(
                kind,
                kind.capacity(),
                kind.precision(),
                channel_config.sample_interval_ms,
            );
            if !channel_config.enabled {
                info!("{} channel disabled", kind.as_str());
                channel.mark_absent();
            }
            channel
        });

        Self { channels }
    }

    pub fn get(&self, kind: ChannelKind) -> &RollingAverageChannel {
        &self.channels[kind.index()]
    }

    pub fn current_average(&self, kind: ChannelKind) -> Option<f32> {
        self.get(kind).current_average()
    }

    /// Floods every present channel with its first available reading.
    /// Channels whose source has nothing yet are seeded by their first
    /// accepted sample instead.
    pub fn seed_from<S>(&mut self, source: &mut S, now_ms: u64) -> usize
    where
        S: SensorSource + ?Sized,
    {
        let mut seeded = 0;
        for channel in self.channels.iter_mut().filter(|channel| channel.exists()) {
            if channel.poll(now_ms, source).is_some() {
                seeded += 1;
            }
        }
        seeded
    }

    /// Samples every channel whose interval elapsed and returns the updated
    /// averages.
    pub fn tick<S>(&mut self, now_ms: u64, source: &mut S) -> Vec<(ChannelKind, f32)>
    where
        S: SensorSource + ?Sized,
    {
        let mut updated = Vec::new();
        for channel in self.channels.iter_mut() {
            if let Some(average) = channel.poll(now_ms, source) {
                debug!("{} average {average}", channel.kind().as_str());
                updated.push((channel.kind(), average));
            }
        }
        updated
    }
}

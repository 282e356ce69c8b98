use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChannelKind {
    Temperature,
    Humidity,
    InletPipe,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 3] = [Self::Temperature, Self::Humidity, Self::InletPipe];

    /// Number of samples averaged for this kind.
    pub const fn capacity(self) -> usize {
        match self {
            Self::Temperature => 10,
            Self::Humidity => 5,
            Self::InletPipe => 10,
        }
    }

    /// Decimal digits kept in the published average.
    pub const fn precision(self) -> u8 {
        match self {
            Self::Temperature => 1,
            Self::Humidity => 0,
            Self::InletPipe => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::InletPipe => "inletPipe",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Temperature => 0,
            Self::Humidity => 1,
            Self::InletPipe => 2,
        }
    }
}

/// Raw reading provider for the sensor channels (hardware drivers on target,
/// simulations on host).
pub trait SensorSource {
    fn read(&mut self, kind: ChannelKind) -> Option<f32>;
}

/// Fixed-capacity ring of samples. Always full: it is created by flooding
/// every slot with one value and each push overwrites the oldest slot.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRing {
    slots: Box<[f32]>,
    next: usize,
}

impl SampleRing {
    pub fn filled(capacity: usize, value: f32) -> Self {
        Self {
            slots: vec![value; capacity.max(1)].into_boxed_slice(),
            next: 0,
        }
    }

    pub fn push(&mut self, value: f32) {
        self.slots[self.next] = value;
        self.next = (self.next + 1) % self.slots.len();
    }

    pub fn mean(&self) -> f64 {
        let sum: f64 = self.slots.iter().map(|value| f64::from(*value)).sum();
        sum / self.slots.len() as f64
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.slots
    }
}

/// Rounds half away from zero at `precision` decimal digits.
pub fn round_to_precision(value: f64, precision: u8) -> f32 {
    let scale = 10_f64.powi(i32::from(precision));
    ((value * scale).round() / scale) as f32
}

#[derive(Debug, Clone)]
pub struct RollingAverageChannel {
    kind: ChannelKind,
    exists: bool,
    capacity: usize,
    precision: u8,
    sample_interval_ms: u64,
    history: Option<SampleRing>,
    average: f32,
    last_sample_ms: Option<u64>,
}

impl RollingAverageChannel {
    pub fn initialize(
        kind: ChannelKind,
        capacity: usize,
        precision: u8,
        sample_interval_ms: u64,
    ) -> Self {
        Self {
            kind,
            exists: true,
            capacity: capacity.max(1),
            precision,
            sample_interval_ms,
            history: None,
            average: 0.0,
            last_sample_ms: None,
        }
    }

    /// Marks the hardware channel as absent. Every later operation is a no-op.
    pub fn mark_absent(&mut self) {
        self.exists = false;
        self.history = None;
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    pub fn is_seeded(&self) -> bool {
        self.history.is_some()
    }

    pub fn history(&self) -> Option<&[f32]> {
        self.history.as_ref().map(SampleRing::as_slice)
    }

    pub fn current_average(&self) -> Option<f32> {
        self.history.as_ref().map(|_| self.average)
    }

    pub fn seed(&mut self, first: f32) {
        if !self.exists {
            return;
        }

        self.history = Some(SampleRing::filled(self.capacity, first));
        self.average = round_to_precision(f64::from(first), self.precision);
        debug!("{} channel seeded with {first}", self.kind.as_str());
    }

    /// Pushes a sample and returns the recomputed average. The first sample
    /// of an unseeded channel seeds it instead.
    pub fn record_sample(&mut self, value: f32) -> Option<f32> {
        if !self.exists {
            return None;
        }

        let Some(history) = self.history.as_mut() else {
            self.seed(value);
            return Some(self.average);
        };

        history.push(value);
        self.average = round_to_precision(history.mean(), self.precision);
        Some(self.average)
    }

    pub fn is_due(&self, now_ms: u64) -> bool {
        self.exists
            && self
                .last_sample_ms
                .map(|last| now_ms.saturating_sub(last) >= self.sample_interval_ms)
                .unwrap_or(true)
    }

    /// Reads the source if the sample interval elapsed. Returns the new
    /// average when a sample was accepted.
    pub fn poll<S>(&mut self, now_ms: u64, source: &mut S) -> Option<f32>
    where
        S: SensorSource + ?Sized,
    {
        if !self.is_due(now_ms) {
            return None;
        }

        let value = match source.read(self.kind) {
            Some(value) if value.is_finite() => value,
            Some(value) => {
                warn!("discarding non-finite {} reading {value}", self.kind.as_str());
                return None;
            }
            None => {
                warn!("no {} reading available", self.kind.as_str());
                return None;
            }
        };

        self.last_sample_ms = Some(now_ms);
        self.record_sample(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Option<f32>);

    impl SensorSource for Fixed {
        fn read(&mut self, _kind: ChannelKind) -> Option<f32> {
            self.0
        }
    }

    fn temperature_channel(capacity: usize, precision: u8) -> RollingAverageChannel {
        RollingAverageChannel::initialize(ChannelKind::Temperature, capacity, precision, 1_000)
    }

    #[test]
    fn average_walks_towards_new_value() {
        let mut channel = temperature_channel(5, 1);
        channel.seed(20.0);
        assert_eq!(channel.current_average(), Some(20.0));

        let observed: Vec<f32> = (0..4).filter_map(|_| channel.record_sample(21.0)).collect();

        assert_eq!(observed, vec![20.2, 20.4, 20.6, 20.8]);
        assert_eq!(channel.current_average(), Some(20.8));
    }

    #[test]
    fn history_length_stays_at_capacity() {
        let mut channel = temperature_channel(4, 2);
        channel.seed(1.0);

        for i in 0..23 {
            let value = i as f32 * 0.37;
            let average = channel.record_sample(value).unwrap();
            let history = channel.history().unwrap();

            assert_eq!(history.len(), 4);
            let mean = history.iter().map(|v| f64::from(*v)).sum::<f64>() / 4.0;
            assert_eq!(average, round_to_precision(mean, 2));
        }
    }

    #[test]
    fn ring_overwrites_oldest_slot() {
        let mut ring = SampleRing::filled(3, 0.0);
        for value in [1.0, 2.0, 3.0, 4.0] {
            ring.push(value);
        }

        assert_eq!(ring.as_slice(), &[4.0, 2.0, 3.0]);
        assert_eq!(ring.mean(), 3.0);
    }

    #[test]
    fn ties_round_away_from_zero() {
        assert_eq!(round_to_precision(0.25, 1), 0.3);
        assert_eq!(round_to_precision(-0.25, 1), -0.3);
        assert_eq!(round_to_precision(20.5, 0), 21.0);
        assert_eq!(round_to_precision(-20.5, 0), -21.0);

        let mut channel = temperature_channel(2, 1);
        channel.seed(0.0);
        assert_eq!(channel.record_sample(0.5), Some(0.3));

        let mut channel = temperature_channel(2, 1);
        channel.seed(0.0);
        assert_eq!(channel.record_sample(-0.5), Some(-0.3));
    }

    #[test]
    fn absent_channel_ignores_everything() {
        let mut channel = temperature_channel(5, 1);
        channel.mark_absent();

        channel.seed(20.0);
        assert_eq!(channel.record_sample(21.0), None);
        assert_eq!(channel.current_average(), None);
        assert!(channel.history().is_none());
        assert!(!channel.is_due(10_000));
        assert_eq!(channel.poll(10_000, &mut Fixed(Some(1.0))), None);
    }

    #[test]
    fn first_sample_seeds_unseeded_channel() {
        let mut channel = temperature_channel(3, 1);
        assert!(!channel.is_seeded());

        assert_eq!(channel.record_sample(18.4), Some(18.4));
        assert_eq!(channel.history(), Some(&[18.4, 18.4, 18.4][..]));
    }

    #[test]
    fn seeded_average_is_rounded() {
        let mut channel = temperature_channel(4, 1);
        channel.seed(20.37);

        assert_eq!(channel.current_average(), Some(20.4));
        assert_eq!(channel.history(), Some(&[20.37; 4][..]));
    }

    #[test]
    fn poll_respects_sample_interval() {
        let mut channel = temperature_channel(2, 1);
        let mut source = Fixed(Some(20.0));

        assert_eq!(channel.poll(0, &mut source), Some(20.0));
        source.0 = Some(22.0);
        assert_eq!(channel.poll(999, &mut source), None);
        assert_eq!(channel.poll(1_000, &mut source), Some(21.0));
    }

    #[test]
    fn poll_skips_missing_and_non_finite_readings() {
        let mut channel = temperature_channel(2, 1);
        channel.seed(20.0);

        assert_eq!(channel.poll(0, &mut Fixed(None)), None);
        assert_eq!(channel.poll(0, &mut Fixed(Some(f32::NAN))), None);
        assert_eq!(channel.current_average(), Some(20.0));
        assert!(channel.is_due(0));
    }
}

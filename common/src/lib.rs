pub mod channel;
pub mod config;
pub mod error;
pub mod provisioning;
pub mod registry;
pub mod settings;
pub mod store;
pub mod topics;

pub use channel::{ChannelKind, RollingAverageChannel, SampleRing, SensorSource};
pub use config::{ChannelConfig, RuntimeConfig, SensorConfig};
pub use error::{SettingsError, StoreError};
pub use provisioning::{FieldSet, NetworkStack, PortalOutcome, ProvisioningFlow, ProvisioningState};
pub use registry::SensorRegistry;
pub use settings::{DeviceSettings, SettingsField};
pub use store::{ConfigurationStore, DirVolume, MemoryVolume, StorageVolume, CONFIG_FILE_NAME};
pub use topics::*;

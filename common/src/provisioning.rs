use tracing::{info, warn};

use crate::{
    settings::{truncate_to, DeviceSettings, SettingsField},
    store::{ConfigurationStore, StorageVolume},
};

/// Editable values offered by the configuration portal, each bounded by its
/// field's maximum length.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSet {
    entries: Vec<(SettingsField, String)>,
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The portal fields seeded with the current settings.
    pub fn from_settings(settings: &DeviceSettings) -> Self {
        let mut fields = Self::new();
        for field in SettingsField::PORTAL {
            fields.register(field, settings.get(field));
        }
        fields
    }

    pub fn register(&mut self, field: SettingsField, default_value: &str) {
        let value = truncate_to(default_value, field.max_len());
        match self.entries.iter_mut().find(|(existing, _)| *existing == field) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((field, value)),
        }
    }

    /// Updates a registered field. Unregistered fields are ignored.
    pub fn set(&mut self, field: SettingsField, value: &str) -> bool {
        match self.entries.iter_mut().find(|(existing, _)| *existing == field) {
            Some((_, slot)) => {
                *slot = truncate_to(value, field.max_len());
                true
            }
            None => false,
        }
    }

    pub fn value(&self, field: SettingsField) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| *existing == field)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (SettingsField, &str)> {
        self.entries
            .iter()
            .map(|(field, value)| (*field, value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn apply_to(&self, settings: &mut DeviceSettings) {
        for (field, value) in self.iter() {
            settings.set(field, value);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortalOutcome {
    TimedOut,
    /// `edited` is present only when the user submitted the portal form.
    Connected { edited: Option<FieldSet> },
}

pub trait NetworkStack {
    fn is_connected(&self) -> bool;

    fn connect_with_stored_credentials(&mut self) -> bool;

    /// Starts the local configuration access point and blocks until the user
    /// submits the form and the connection comes up, or `wait_seconds` pass.
    fn run_config_portal(&mut self, fields: &FieldSet, wait_seconds: u32) -> PortalOutcome;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningState {
    Idle,
    LoadingConfig,
    AwaitingConnection,
    Connected,
    ConnectionTimedOut,
    Done,
}

struct ProvisioningSession {
    fields: FieldSet,
    wait_seconds: u32,
}

pub struct ProvisioningFlow<V, N> {
    store: ConfigurationStore<V>,
    network: N,
    state: ProvisioningState,
}

impl<V, N> ProvisioningFlow<V, N>
where
    V: StorageVolume,
    N: NetworkStack,
{
    pub fn new(store: ConfigurationStore<V>, network: N) -> Self {
        Self {
            store,
            network,
            state: ProvisioningState::Idle,
        }
    }

    pub fn state(&self) -> ProvisioningState {
        self.state
    }

    pub fn store(&self) -> &ConfigurationStore<V> {
        &self.store
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    pub fn into_parts(self) -> (ConfigurationStore<V>, N) {
        (self.store, self.network)
    }

    /// Loads settings, brings the network up and persists portal edits.
    /// Returns `false` when no connection was made within `wait_seconds`.
    pub fn run(&mut self, settings: &mut DeviceSettings, wait_seconds: u32) -> bool {
        self.state = ProvisioningState::LoadingConfig;
        self.store.load_into(settings);
        let session = ProvisioningSession {
            fields: FieldSet::from_settings(settings),
            wait_seconds,
        };

        self.state = ProvisioningState::AwaitingConnection;
        let outcome = if self.network.is_connected() || self.network.connect_with_stored_credentials()
        {
            info!("connected with stored credentials");
            PortalOutcome::Connected { edited: None }
        } else {
            info!(
                "stored credentials unavailable; waiting up to {}s on the configuration portal",
                session.wait_seconds
            );
            self.network
                .run_config_portal(&session.fields, session.wait_seconds)
        };

        let edited = match outcome {
            PortalOutcome::TimedOut => {
                warn!("failed to connect and hit timeout");
                self.state = ProvisioningState::ConnectionTimedOut;
                return false;
            }
            PortalOutcome::Connected { edited } => edited,
        };

        self.state = ProvisioningState::Connected;
        info!("network connected");

        if let Some(edited) = edited {
            info!("portal submitted; saving configuration");
            edited.apply_to(settings);
            self.store.save(settings);
        }

        self.state = ProvisioningState::Done;
        true
    }
}

use std::{
    io::ErrorKind,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use tokio::runtime::Handle;
use tracing::{info, warn};

use fancoil_common::{FieldSet, NetworkStack, PortalOutcome};

use crate::portal::{self, WifiCredentials};

pub const NETWORK_FILE_NAME: &str = "network.json";

/// Host stand-in for the station/AP radio. Station credentials live next to
/// the configuration document; the portal is served over HTTP.
pub struct HostNetwork {
    credentials_path: PathBuf,
    portal_addr: SocketAddr,
    runtime: Handle,
    connected: bool,
}

impl HostNetwork {
    pub fn new(data_dir: &Path, portal_port: u16, runtime: Handle) -> Self {
        Self {
            credentials_path: data_dir.join(NETWORK_FILE_NAME),
            portal_addr: SocketAddr::from(([0, 0, 0, 0], portal_port)),
            runtime,
            connected: false,
        }
    }

    fn load_credentials(&self) -> anyhow::Result<WifiCredentials> {
        match std::fs::read(&self.credentials_path) {
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(WifiCredentials::default()),
            Err(err) => Err(err.into()),
        }
    }

    fn save_credentials(&self, credentials: &WifiCredentials) -> anyhow::Result<()> {
        if let Some(parent) = self.credentials_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let payload = serde_json::to_vec_pretty(credentials)?;
        let staging = self.credentials_path.with_extension("tmp");
        std::fs::write(&staging, payload)?;
        std::fs::rename(&staging, &self.credentials_path)
            .with_context(|| format!("failed to replace {}", self.credentials_path.display()))?;
        Ok(())
    }
}

pub fn has_station_credentials(credentials: &WifiCredentials) -> bool {
    let ssid = credentials.ssid.trim();
    !ssid.is_empty() && ssid != "CHANGE_ME"
}

impl NetworkStack for HostNetwork {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn connect_with_stored_credentials(&mut self) -> bool {
        let credentials = match self.load_credentials() {
            Ok(credentials) => credentials,
            Err(err) => {
                warn!("failed to read stored network credentials: {err:#}");
                return false;
            }
        };

        if !has_station_credentials(&credentials) {
            warn!("network credentials missing");
            return false;
        }

        info!("connecting to `{}`", credentials.ssid);
        self.connected = true;
        true
    }

    fn run_config_portal(&mut self, fields: &FieldSet, wait_seconds: u32) -> PortalOutcome {
        let wait = Duration::from_secs(u64::from(wait_seconds));
        let submission = match self
            .runtime
            .block_on(portal::serve(self.portal_addr, fields.clone(), wait))
        {
            Ok(Some(submission)) => submission,
            Ok(None) => return PortalOutcome::TimedOut,
            Err(err) => {
                warn!("configuration portal unavailable: {err:#}");
                return PortalOutcome::TimedOut;
            }
        };

        if let Err(err) = self.save_credentials(&submission.credentials) {
            warn!("failed to store network credentials: {err:#}");
        }

        info!("connecting to `{}`", submission.credentials.ssid);
        self.connected = true;
        PortalOutcome::Connected {
            edited: Some(submission.fields),
        }
    }
}

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};

use anyhow::Context;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use tokio::{runtime::Handle, sync::Mutex};
use tracing::{info, warn};

use fancoil_common::{
    average_topic, command_field, topic, ChannelKind, ConfigurationStore, DeviceSettings,
    DirVolume, ProvisioningFlow, RuntimeConfig, SensorRegistry, COMMAND_TOPICS, TOPIC_STATUS,
};

use crate::{network::HostNetwork, sensors::SimulatedSensors};

const RUNTIME_FILE_NAME: &str = "runtime.json";

type SharedSettings = Arc<Mutex<DeviceSettings>>;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let data_dir = std::env::var("FANCOIL_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./.fancoil"));

    let mut runtime = load_runtime_config(&data_dir).await.unwrap_or_else(|err| {
        warn!("failed to load runtime config: {err:#}");
        RuntimeConfig::default()
    });
    if let Some(port) = std::env::var("FANCOIL_PORTAL_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
    {
        runtime.portal_port = port;
    }
    runtime.sanitize();

    let store = ConfigurationStore::new(DirVolume::new(&data_dir));
    let network = HostNetwork::new(&data_dir, runtime.portal_port, Handle::current());
    let wait_seconds = runtime.portal_wait_seconds;

    let (connected, settings, store) = tokio::task::spawn_blocking(move || {
        let mut settings = DeviceSettings::default();
        let mut flow = ProvisioningFlow::new(store, network);
        let connected = flow.run(&mut settings, wait_seconds);
        let (store, _network) = flow.into_parts();
        (connected, settings, store)
    })
    .await
    .context("provisioning task failed")?;

    let mut registry = SensorRegistry::new(&runtime.sensors);
    let mut sensors = SimulatedSensors::default();
    let seeded = registry.seed_from(&mut sensors, monotonic_ms());
    info!("{seeded} sensor channel(s) seeded");

    let settings: SharedSettings = Arc::new(Mutex::new(settings));
    let mqtt = if connected {
        Some(start_mqtt(settings.clone(), store).await?)
    } else {
        warn!("no network connection; continuing offline");
        None
    };

    let mut interval = tokio::time::interval(Duration::from_millis(runtime.tick_interval_ms));
    loop {
        interval.tick().await;

        let updated = registry.tick(monotonic_ms(), &mut sensors);
        if updated.is_empty() {
            continue;
        }

        let Some(mqtt) = mqtt.as_ref() else {
            for (kind, average) in updated {
                info!("{} average {average}", kind.as_str());
            }
            continue;
        };

        let base_topic = settings.lock().await.base_topic().to_string();
        for (kind, average) in updated {
            let payload = format_average(kind, average);
            if let Err(err) = mqtt
                .publish(average_topic(&base_topic, kind), QoS::AtLeastOnce, true, payload)
                .await
            {
                warn!("failed to publish {} average: {err}", kind.as_str());
            }
        }
    }
}

async fn load_runtime_config(data_dir: &Path) -> anyhow::Result<RuntimeConfig> {
    match tokio::fs::read(data_dir.join(RUNTIME_FILE_NAME)).await {
        Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
        Err(err) => Err(err.into()),
    }
}

async fn start_mqtt(
    settings: SharedSettings,
    store: ConfigurationStore<DirVolume>,
) -> anyhow::Result<AsyncClient> {
    let snapshot = settings.lock().await.clone();

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or_else(|_| {
        if snapshot.mqtt_server().is_empty() {
            "127.0.0.1".to_string()
        } else {
            snapshot.mqtt_server().to_string()
        }
    });
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .or_else(|| snapshot.mqtt_port())
        .unwrap_or(1883);

    let mut mqtt_options = MqttOptions::new(snapshot.mqtt_client_id(), mqtt_host, mqtt_port);
    if !snapshot.mqtt_user().is_empty() {
        mqtt_options.set_credentials(snapshot.mqtt_user(), snapshot.mqtt_pass());
    }

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 32);
    let base_topic = snapshot.base_topic().to_string();

    mqtt.publish(topic(&base_topic, TOPIC_STATUS), QoS::AtLeastOnce, true, "online")
        .await
        .context("failed to publish online status")?;
    for (suffix, _) in COMMAND_TOPICS {
        mqtt.subscribe(topic(&base_topic, suffix), QoS::AtMostOnce)
            .await
            .context("failed to subscribe to setting commands")?;
    }

    spawn_mqtt_loop(settings, store, base_topic, eventloop);
    info!("mqtt publisher started");
    Ok(mqtt)
}

fn spawn_mqtt_loop(
    settings: SharedSettings,
    mut store: ConfigurationStore<DirVolume>,
    base_topic: String,
    mut eventloop: rumqttc::EventLoop,
) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Err(err) = handle_setting_command(
                        &settings,
                        &mut store,
                        &base_topic,
                        &message.topic,
                        &message.payload,
                    )
                    .await
                    {
                        warn!("setting command on `{}` rejected: {err:#}", message.topic);
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

/// Applies a runtime setting command. The settings lock is held until the
/// document is written.
async fn handle_setting_command(
    settings: &Mutex<DeviceSettings>,
    store: &mut ConfigurationStore<DirVolume>,
    base_topic: &str,
    incoming: &str,
    payload: &[u8],
) -> anyhow::Result<()> {
    let Some(field) = command_field(base_topic, incoming) else {
        return Ok(());
    };
    let value = std::str::from_utf8(payload).context("payload is not valid utf-8")?;

    let mut guard = settings.lock().await;
    if !guard.apply_remote(field, value)? {
        return Ok(());
    }

    info!("`{}` set to `{}`", field.key(), guard.get(field));
    tokio::task::block_in_place(|| store.save(&guard));
    Ok(())
}

fn format_average(kind: ChannelKind, average: f32) -> String {
    format!("{:.*}", usize::from(kind.precision()), average)
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

use async_trait::async_trait;
use btleplug::{
    api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType},
    platform::{Manager, Peripheral},
};
use futures::stream::{BoxStream, StreamExt};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{sync::Mutex, time::timeout};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    error::{HubError, Result},
    types::{ConnectionParams, HubInfo, HubType},
    LEGO_MANUFACTURER_ID, LPF2_CHARACTERISTIC_UUID, LPF2_SERVICE_UUID,
};

/// Advertised name fragments identifying supported hubs
const HUB_NAMES: &[&str] = &["move hub", "technic"];

/// Byte-level link to one hub.
///
/// Inbound chunks arrive in order but carry no frame alignment; outbound
/// writes are fire-and-forget.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Stream of raw notification chunks; it ends when the hub disconnects
    async fn notifications(&self) -> Result<BoxStream<'static, Vec<u8>>>;

    /// Write raw bytes to the hub
    async fn write(&self, data: &[u8]) -> Result<()>;

    /// Drop the connection
    async fn disconnect(&self) -> Result<()>;
}

/// Whether an advertised name belongs to a supported hub
#[must_use]
pub fn is_hub_name(name: &str) -> bool {
    let name = name.to_lowercase();
    HUB_NAMES.iter().any(|fragment| name.contains(fragment))
}

fn parse_uuid(value: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| HubError::Protocol(format!("Invalid {what} UUID: {e}")))
}

/// BLE manager for Powered UP hub discovery
pub struct BleManager {
    manager: Manager,
    peripherals: Arc<Mutex<HashMap<String, Peripheral>>>,
}

impl BleManager {
    /// Create a new BLE manager
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Ble`] if the Bluetooth adapter cannot be initialized.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new().await?;

        Ok(Self {
            manager,
            peripherals: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Scan for Powered UP hubs
    ///
    /// # Errors
    ///
    /// Returns [`HubError::HubNotFound`] if no Bluetooth adapters are available,
    /// or [`HubError::Ble`] for other Bluetooth-related errors.
    pub async fn scan_for_hubs(&self, params: &ConnectionParams) -> Result<Vec<HubInfo>> {
        info!("Starting scan for Powered UP hubs...");

        let adapters = self.manager.adapters().await?;
        let central = adapters.first().ok_or(HubError::HubNotFound)?;

        let scan_filter = ScanFilter {
            services: vec![parse_uuid(LPF2_SERVICE_UUID, "service")?],
        };

        central.start_scan(scan_filter).await?;
        tokio::time::sleep(Duration::from_millis(params.scan_timeout_ms)).await;
        central.stop_scan().await?;

        let mut hubs = Vec::new();
        for peripheral in central.peripherals().await? {
            let Some(info) = Self::extract_hub_info(&peripheral).await else {
                continue;
            };
            info!("Found {} \"{}\" at {}", info.hub_type, info.name, info.address);
            self.peripherals
                .lock()
                .await
                .insert(info.address.clone(), peripheral);
            hubs.push(info);
        }

        info!("Scan completed. Found {} hub(s)", hubs.len());
        Ok(hubs)
    }

    /// Connect to a hub found by [`BleManager::scan_for_hubs`]
    ///
    /// # Errors
    ///
    /// Returns [`HubError::HubNotFound`] if the hub was not seen while scanning,
    /// [`HubError::Timeout`] if the connection times out,
    /// [`HubError::ConnectionFailed`] if the connection fails,
    /// or [`HubError::Protocol`] if the hub service is missing.
    pub async fn connect_to_hub(
        &self,
        hub_info: &HubInfo,
        params: &ConnectionParams,
    ) -> Result<HubConnection> {
        info!("Connecting to hub: {}", hub_info.name);

        let peripheral = self
            .peripherals
            .lock()
            .await
            .get(&hub_info.address)
            .cloned()
            .ok_or(HubError::HubNotFound)?;

        timeout(Duration::from_millis(params.timeout_ms), peripheral.connect())
            .await
            .map_err(|_| HubError::Timeout {
                timeout_ms: params.timeout_ms,
            })?
            .map_err(|e| HubError::ConnectionFailed(e.to_string()))?;

        peripheral.discover_services().await?;

        let service_uuid = parse_uuid(LPF2_SERVICE_UUID, "service")?;
        let char_uuid = parse_uuid(LPF2_CHARACTERISTIC_UUID, "characteristic")?;

        let services = peripheral.services();
        let service = services
            .iter()
            .find(|s| s.uuid == service_uuid)
            .ok_or_else(|| HubError::Protocol("Hub service not found".to_string()))?;

        let characteristic = service
            .characteristics
            .iter()
            .find(|c| c.uuid == char_uuid)
            .ok_or_else(|| HubError::Protocol("Hub characteristic not found".to_string()))?
            .clone();

        peripheral.subscribe(&characteristic).await?;

        info!("Successfully connected to {}", hub_info.name);

        Ok(HubConnection {
            peripheral,
            characteristic,
        })
    }

    /// Hub information from advertisement data, `None` for other devices
    async fn extract_hub_info(peripheral: &Peripheral) -> Option<HubInfo> {
        let properties = peripheral.properties().await.ok()??;
        let name = properties.local_name.clone()?;
        if !is_hub_name(&name) {
            return None;
        }

        let hub_type = properties
            .manufacturer_data
            .get(&LEGO_MANUFACTURER_ID)
            .map_or(HubType::Unknown, |data| HubType::from_manufacturer_data(data));

        Some(HubInfo {
            name,
            address: properties.address.to_string(),
            rssi: properties.rssi.unwrap_or(0),
            hub_type,
        })
    }
}

/// Active connection to a hub over its LPF2 characteristic
pub struct HubConnection {
    peripheral: Peripheral,
    characteristic: Characteristic,
}

impl HubConnection {
    /// Check if the hub is still connected
    pub async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }
}

#[async_trait]
impl Transport for HubConnection {
    async fn notifications(&self) -> Result<BoxStream<'static, Vec<u8>>> {
        let uuid = self.characteristic.uuid;
        let stream = self.peripheral.notifications().await?;
        Ok(stream
            .filter_map(move |notification| {
                futures::future::ready((notification.uuid == uuid).then_some(notification.value))
            })
            .boxed())
    }

    async fn write(&self, data: &[u8]) -> Result<()> {
        debug!("Sending: {:02X?}", data);
        self.peripheral
            .write(&self.characteristic, data, WriteType::WithoutResponse)
            .await
            .map_err(|e| HubError::Protocol(format!("Failed to send command: {e}")))
    }

    async fn disconnect(&self) -> Result<()> {
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use crate::{attached::AttachedDevice, types::HubType};

/// Symbolic port name to port id
pub type PortMap = BTreeMap<String, u8>;

const BOOST_PORTS: &[(&str, u8)] = &[
    ("A", 0),
    ("B", 1),
    ("C", 2),
    ("D", 3),
    ("HUB_LED", 50),
    ("TILT_SENSOR", 58),
    ("CURRENT_SENSOR", 59),
    ("VOLTAGE_SENSOR", 60),
];

const TECHNIC_PORTS: &[(&str, u8)] = &[
    ("A", 0),
    ("B", 1),
    ("C", 2),
    ("D", 3),
    ("HUB_LED", 50),
    ("CURRENT_SENSOR", 59),
    ("VOLTAGE_SENSOR", 60),
    ("ACCELEROMETER", 97),
    ("GYRO_SENSOR", 98),
    ("TILT_SENSOR", 99),
];

/// Default port names for a hub family
#[must_use]
pub fn default_port_map(hub_type: HubType) -> PortMap {
    let ports = match hub_type {
        HubType::Boost => BOOST_PORTS,
        HubType::Technic => TECHNIC_PORTS,
        HubType::Unknown => &[],
    };
    ports
        .iter()
        .map(|&(name, id)| (name.to_string(), id))
        .collect()
}

/// Ports of one hub and the devices attached to them.
///
/// Holds at most one device per port id. Every virtual port id has a
/// synthesized name in the port map; both are removed together.
#[derive(Debug, Default)]
pub struct PortRegistry {
    port_map: PortMap,
    virtual_ports: BTreeMap<u8, String>,
    devices: BTreeMap<u8, Arc<AttachedDevice>>,
}

impl PortRegistry {
    /// Registry seeded with the default port names of `hub_type`
    #[must_use]
    pub fn new(hub_type: HubType) -> Self {
        Self::with_port_map(default_port_map(hub_type))
    }

    /// Registry seeded with an explicit port map
    #[must_use]
    pub fn with_port_map(port_map: PortMap) -> Self {
        Self {
            port_map,
            ..Self::default()
        }
    }

    /// Current port map, virtual ports included
    #[must_use]
    pub const fn port_map(&self) -> &PortMap {
        &self.port_map
    }

    /// Ids of the virtual ports currently known
    pub fn virtual_ports(&self) -> impl Iterator<Item = u8> + '_ {
        self.virtual_ports.keys().copied()
    }

    /// Whether `port_id` is a virtual port
    #[must_use]
    pub fn is_virtual(&self, port_id: u8) -> bool {
        self.virtual_ports.contains_key(&port_id)
    }

    /// Device attached at `port_id`
    #[must_use]
    pub fn lookup_by_port_id(&self, port_id: u8) -> Option<Arc<AttachedDevice>> {
        self.devices.get(&port_id).cloned()
    }

    /// Port id registered under `name`
    #[must_use]
    pub fn lookup_port_id_by_name(&self, name: &str) -> Option<u8> {
        self.port_map.get(name).copied()
    }

    /// Device attached at the port registered under `name`
    #[must_use]
    pub fn lookup_by_name(&self, name: &str) -> Option<Arc<AttachedDevice>> {
        self.lookup_port_id_by_name(name)
            .and_then(|port_id| self.lookup_by_port_id(port_id))
    }

    /// First port name, in name order, that maps to `port_id`
    #[must_use]
    pub fn port_name(&self, port_id: u8) -> Option<&str> {
        self.port_map
            .iter()
            .find(|(_, &id)| id == port_id)
            .map(|(name, _)| name.as_str())
    }

    /// Attached devices in port order
    pub fn devices(&self) -> impl Iterator<Item = &Arc<AttachedDevice>> + '_ {
        self.devices.values()
    }

    /// Number of attached devices
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether no device is attached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Register a virtual port combining two physical ports.
    ///
    /// The name is the concatenation of the two physical port names; a name
    /// that cannot be resolved contributes an empty string. Creating an id
    /// again replaces the name it was created with before.
    pub fn add_virtual_port(&mut self, port_id: u8, first: u8, second: u8) -> String {
        let name = format!(
            "{}{}",
            self.port_name(first).unwrap_or_default(),
            self.port_name(second).unwrap_or_default()
        );
        if let Some(previous) = self.virtual_ports.insert(port_id, name.clone()) {
            self.port_map.remove(&previous);
        }
        self.port_map.insert(name.clone(), port_id);
        name
    }

    /// Store `device` at its port.
    ///
    /// Returns `false` and leaves the registry untouched when a device of
    /// the same type already occupies the port. A device of another type is
    /// detached and replaced.
    pub fn register(&mut self, device: Arc<AttachedDevice>) -> bool {
        let port_id = device.port_id();
        if let Some(existing) = self.devices.get(&port_id) {
            if existing.type_code() == device.type_code() {
                return false;
            }
            existing.detach();
        }
        self.devices.insert(port_id, device);
        true
    }

    /// Remove the device at `port_id`, along with the port itself if it is
    /// virtual. Returns the removed device, already marked detached.
    pub fn unregister(&mut self, port_id: u8) -> Option<Arc<AttachedDevice>> {
        let device = self.devices.remove(&port_id)?;
        device.detach();
        if let Some(name) = self.virtual_ports.remove(&port_id) {
            self.port_map.remove(&name);
        }
        Some(device)
    }

    /// Ids of every port with an attached device
    #[must_use]
    pub fn occupied_ports(&self) -> BTreeSet<u8> {
        self.devices.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attached::HubLink;
    use tokio::sync::{broadcast, mpsc};

    fn test_link() -> HubLink {
        let (command_tx, _) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(16);
        HubLink::new(command_tx, event_tx)
    }

    fn device(type_code: u16, port_id: u8) -> Arc<AttachedDevice> {
        Arc::new(AttachedDevice::new(type_code, port_id, test_link()))
    }

    #[test]
    fn test_default_port_maps() {
        let boost = default_port_map(HubType::Boost);
        assert_eq!(boost.get("A"), Some(&0));
        assert_eq!(boost.get("TILT_SENSOR"), Some(&58));
        assert!(boost.get("ACCELEROMETER").is_none());

        let technic = default_port_map(HubType::Technic);
        assert_eq!(technic.get("ACCELEROMETER"), Some(&97));
        assert_eq!(technic.get("TILT_SENSOR"), Some(&99));

        assert!(default_port_map(HubType::Unknown).is_empty());
    }

    #[test]
    fn test_lookup() {
        let mut registry = PortRegistry::new(HubType::Boost);
        assert!(registry.lookup_by_name("B").is_none());

        registry.register(device(39, 1));
        assert_eq!(registry.lookup_port_id_by_name("B"), Some(1));
        assert_eq!(registry.lookup_by_name("B").unwrap().port_id(), 1);
        assert_eq!(registry.lookup_by_port_id(1).unwrap().type_code(), 39);
        assert_eq!(registry.port_name(1), Some("B"));
        assert_eq!(registry.port_name(200), None);
    }

    #[test]
    fn test_register_same_type_is_idempotent() {
        let mut registry = PortRegistry::new(HubType::Boost);
        let first = device(39, 0);
        assert!(registry.register(Arc::clone(&first)));
        assert!(!registry.register(device(39, 0)));

        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(&registry.lookup_by_port_id(0).unwrap(), &first));
    }

    #[test]
    fn test_register_other_type_replaces() {
        let mut registry = PortRegistry::new(HubType::Boost);
        let first = device(39, 0);
        registry.register(Arc::clone(&first));
        assert!(registry.register(device(37, 0)));

        assert_eq!(registry.len(), 1);
        assert!(!first.is_attached());
        assert_eq!(registry.lookup_by_port_id(0).unwrap().type_code(), 37);
    }

    #[test]
    fn test_unregister_absent_port() {
        let mut registry = PortRegistry::new(HubType::Boost);
        registry.register(device(39, 0));
        assert!(registry.unregister(5).is_none());
        assert_eq!(registry.occupied_ports(), BTreeSet::from([0]));
    }

    #[test]
    fn test_virtual_port_round_trip() {
        let mut registry = PortRegistry::new(HubType::Boost);
        let port_map_before = registry.port_map().clone();

        let name = registry.add_virtual_port(0x10, 0, 1);
        assert_eq!(name, "AB");
        registry.register(device(39, 0x10));
        assert_eq!(registry.lookup_port_id_by_name("AB"), Some(0x10));
        assert!(registry.is_virtual(0x10));

        let removed = registry.unregister(0x10).unwrap();
        assert!(!removed.is_attached());
        assert_eq!(registry.port_map(), &port_map_before);
        assert_eq!(registry.virtual_ports().count(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_virtual_port_recreated_with_other_ports() {
        let mut registry = PortRegistry::new(HubType::Boost);
        let port_map_before = registry.port_map().clone();

        assert_eq!(registry.add_virtual_port(0x10, 0, 1), "AB");
        registry.register(device(39, 0x10));
        assert_eq!(registry.add_virtual_port(0x10, 2, 3), "CD");

        assert_eq!(registry.lookup_port_id_by_name("AB"), None);
        assert_eq!(registry.lookup_port_id_by_name("CD"), Some(0x10));

        registry.unregister(0x10);
        assert_eq!(registry.port_map(), &port_map_before);
        assert_eq!(registry.virtual_ports().count(), 0);
    }

    #[test]
    fn test_virtual_port_unresolved_name() {
        let mut registry = PortRegistry::new(HubType::Boost);
        assert_eq!(registry.add_virtual_port(0x11, 0, 200), "A");
        assert_eq!(registry.lookup_port_id_by_name("A"), Some(0x11));

        assert_eq!(registry.add_virtual_port(0x12, 200, 201), "");
        assert_eq!(registry.lookup_port_id_by_name(""), Some(0x12));
        assert_eq!(registry.virtual_ports().collect::<Vec<_>>(), vec![0x11, 0x12]);
    }
}

/// A discovered BLE peripheral that matched the scan name.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FoundDevice {
    adapter_name: String,
    device_id: String,
    local_name: Option<String>,
    rssi: Option<i16>,
}

impl FoundDevice {
    /// Creates a new discovered-device record.
    pub(crate) fn new(
        adapter_name: String,
        device_id: String,
        local_name: Option<String>,
        rssi: Option<i16>,
    ) -> Self {
        Self {
            adapter_name,
            device_id,
            local_name,
            rssi,
        }
    }

    /// Returns the adapter name used to discover this device.
    #[must_use]
    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// Returns the backend-specific device identifier.
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Returns the advertised local name, if present.
    #[must_use]
    pub fn local_name(&self) -> Option<&str> {
        self.local_name.as_deref()
    }

    /// Returns the latest observed RSSI value, if present.
    #[must_use]
    pub fn rssi(&self) -> Option<i16> {
        self.rssi
    }

    /// Returns whether the advertised name equals `name`, ignoring ASCII case.
    pub(crate) fn has_local_name(&self, name: &str) -> bool {
        matches_local_name(self.local_name.as_deref(), name)
    }
}

pub(crate) fn matches_local_name(local_name: Option<&str>, name: &str) -> bool {
    local_name.is_some_and(|value| value.trim().eq_ignore_ascii_case(name))
}

/// A characteristic description discovered on a connected peripheral.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CharacteristicInfo {
    uuid: String,
    properties: Vec<String>,
}

impl CharacteristicInfo {
    /// Creates a characteristic description.
    pub(crate) fn new(uuid: String, properties: Vec<String>) -> Self {
        Self { uuid, properties }
    }

    /// Returns the characteristic UUID.
    #[must_use]
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Returns property labels for this characteristic.
    #[must_use]
    pub fn properties(&self) -> &[String] {
        &self.properties
    }

    /// Returns whether the characteristic can notify or indicate.
    pub(crate) fn supports_notify(&self) -> bool {
        self.properties.iter().any(|property| {
            property.eq_ignore_ascii_case("notify") || property.eq_ignore_ascii_case("indicate")
        })
    }
}

/// A GATT service with discovered characteristics.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ServiceInfo {
    uuid: String,
    characteristics: Vec<CharacteristicInfo>,
}

impl ServiceInfo {
    /// Creates a service description.
    pub(crate) fn new(uuid: String, characteristics: Vec<CharacteristicInfo>) -> Self {
        Self {
            uuid,
            characteristics,
        }
    }

    /// Returns the service UUID.
    #[must_use]
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Returns discovered characteristics.
    #[must_use]
    pub fn characteristics(&self) -> &[CharacteristicInfo] {
        &self.characteristics
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Some("Nuimo"), true)]
    #[case(Some("NUIMO"), true)]
    #[case(Some("Nuimo Pro"), false)]
    #[case(None, false)]
    fn local_name_matching_ignores_case(#[case] local_name: Option<&str>, #[case] expected: bool) {
        assert_eq!(expected, matches_local_name(local_name, "nuimo"));
    }

    #[rstest]
    #[case(&["read", "notify"], true)]
    #[case(&["INDICATE"], true)]
    #[case(&["read", "write"], false)]
    fn supports_notify_checks_property_labels(#[case] labels: &[&str], #[case] expected: bool) {
        let characteristic = CharacteristicInfo::new(
            "00002a19-0000-1000-8000-00805f9b34fb".to_string(),
            labels.iter().map(|label| (*label).to_string()).collect(),
        );
        assert_eq!(expected, characteristic.supports_notify());
    }
}

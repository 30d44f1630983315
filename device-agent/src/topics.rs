use crate::config::DeviceArgs;

/// Who this device is. Every MQTT topic and the upload path derive from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub name: String,
    pub mac_address: String,
    pub user_uuid: String,
}

impl DeviceIdentity {
    pub fn new(
        name: impl Into<String>,
        mac_address: impl Into<String>,
        user_uuid: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            mac_address: mac_address.into(),
            user_uuid: user_uuid.into(),
        }
    }

    /// MAC address with `:` replaced by `_`, safe to embed in topics and URLs.
    pub fn normalized_mac(&self) -> String {
        self.mac_address.replace(':', "_")
    }

    pub fn client_id(&self) -> String {
        format!("esp32-{}", self.mac_address.replace(':', ""))
    }

    pub fn topics(&self) -> Topics {
        let mac = self.normalized_mac();
        let user = &self.user_uuid;
        let device_root = format!("/{}/devices/{}", user, mac);

        Topics {
            register: format!("/{}/devices", user),
            register_response: format!("/{}/devices/register-response", user),
            telemetry: format!("{}/telemetry", device_root),
            alarms: format!("{}/alarms", device_root),
            images: format!("{}/images", device_root),
            commands: format!("{}/commands", device_root),
            upload_path: format!("/images/{}/{}", user, mac),
        }
    }
}

impl From<&DeviceArgs> for DeviceIdentity {
    fn from(args: &DeviceArgs) -> Self {
        Self::new(&args.device_name, &args.mac_address, &args.user_uuid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub register: String,
    pub register_response: String,
    pub telemetry: String,
    pub alarms: String,
    /// Only used when the HTTP upload cannot connect
    pub images: String,
    pub commands: String,
    pub upload_path: String,
}

impl Topics {
    pub fn upload_url(&self, backend_url: &str) -> String {
        format!("{}{}", backend_url.trim_end_matches('/'), self.upload_path)
    }
}

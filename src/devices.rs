// ucentralctl - CLI for uCentral access-point fleet management
// Copyright (C) 2024 Mathias Uhl <mathiasuhl@gmx.de>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use crate::client::{ResponseData, Transport, TransportError};
use crate::model::{
    Device, DeviceList, DeviceTypeSet, FactoryRequest, Firmware, FirmwareDevices,
    FirmwareRecord, Firmwares, NotesUpdate, RebootRequest, UpgradeRequest,
};
use crate::session::Endpoints;
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_NOTE_AUTHOR: &str = "ucentralctl";

/// Status the gateway answers commands and updates with.
const COMMAND_OK: u16 = 200;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("decoding {what}: {source}")]
    Decode {
        what: &'static str,
        source: serde_json::Error,
    },
    #[error("unexpected status {0}")]
    UnexpectedStatus(u16),
    #[error("{0}: serial number not found")]
    NotFound(String),
    #[error("{serial}: latest revision {revision} is already installed")]
    AlreadyCurrent { serial: String, revision: String },
}

pub(crate) fn decode_success<T: DeserializeOwned>(
    response: &ResponseData,
    what: &'static str,
) -> Result<T, ApiError> {
    if !response.is_success() {
        return Err(ApiError::UnexpectedStatus(response.status));
    }
    response
        .decode()
        .map_err(|source| ApiError::Decode { what, source })
}

fn expect_ok(response: &ResponseData) -> Result<(), ApiError> {
    if response.status == COMMAND_OK {
        Ok(())
    } else {
        Err(ApiError::UnexpectedStatus(response.status))
    }
}

/// Remote device and firmware operations over a resolved session.
#[derive(Debug, Clone)]
pub struct DeviceClient<'a> {
    transport: &'a Transport,
    endpoints: &'a Endpoints,
    note_author: String,
}

impl<'a> DeviceClient<'a> {
    pub fn new(transport: &'a Transport, endpoints: &'a Endpoints) -> Self {
        Self {
            transport,
            endpoints,
            note_author: DEFAULT_NOTE_AUTHOR.to_string(),
        }
    }

    pub fn with_note_author(mut self, author: &str) -> Self {
        if !author.trim().is_empty() {
            self.note_author = author.trim().to_string();
        }
        self
    }

    pub fn list_devices(&self) -> Result<DeviceList, ApiError> {
        let response = self.transport.get(&self.endpoints.gateway, "devices", &[])?;
        decode_success(&response, "device list")
    }

    pub fn get_device(&self, serial: &str) -> Result<Device, ApiError> {
        let response =
            self.transport
                .get(&self.endpoints.gateway, &format!("device/{serial}"), &[])?;
        decode_success(&response, "device")
    }

    pub fn list_firmware_device_types(&self) -> Result<BTreeSet<String>, ApiError> {
        let response = self.transport.get(
            &self.endpoints.firmware,
            "firmwares",
            &[("deviceSet", "true".to_string())],
        )?;
        let set: DeviceTypeSet = decode_success(&response, "device types")?;
        Ok(set.into_types().into_iter().collect())
    }

    pub fn get_firmware_list_by_device(&self, device_type: &str) -> Result<Firmwares, ApiError> {
        let response = self.transport.get(
            &self.endpoints.firmware,
            "firmwares",
            &[("deviceType", device_type.to_string())],
        )?;
        decode_success(&response, "firmware list")
    }

    pub fn get_latest_firmware_by_device(&self, device_type: &str) -> Result<Firmware, ApiError> {
        let response = self.transport.get(
            &self.endpoints.firmware,
            "firmwares",
            &[
                ("latestOnly", "true".to_string()),
                ("deviceType", device_type.to_string()),
            ],
        )?;
        decode_success(&response, "latest firmware")
    }

    pub fn get_all_firmware_devices(&self) -> Result<FirmwareDevices, ApiError> {
        let response = self
            .transport
            .get(&self.endpoints.firmware, "connectedDevices", &[])?;
        decode_success(&response, "firmware devices")
    }

    /// The firmware service has no by-serial lookup, so the whole collection
    /// is fetched and scanned.
    pub fn get_firmware_device(&self, serial: &str) -> Result<FirmwareRecord, ApiError> {
        self.get_all_firmware_devices()?
            .devices
            .into_iter()
            .find(|record| record.serial_number.eq_ignore_ascii_case(serial))
            .ok_or_else(|| ApiError::NotFound(serial.to_string()))
    }

    pub fn upgrade_device_to_latest(&self, record: &FirmwareRecord) -> Result<(), ApiError> {
        let latest = self.get_latest_firmware_by_device(&record.device_type)?;
        if latest.revision == record.revision {
            return Err(ApiError::AlreadyCurrent {
                serial: record.serial_number.clone(),
                revision: latest.revision,
            });
        }
        debug!(
            serial = %record.serial_number,
            from = %record.revision,
            to = %latest.revision,
            "upgrading to latest firmware"
        );
        self.upgrade_device_firmware(&record.serial_number, &latest.uri)
    }

    pub fn upgrade_device_firmware(&self, serial: &str, uri: &str) -> Result<(), ApiError> {
        let body = UpgradeRequest {
            serial_number: serial,
            uri,
        };
        let response = self.transport.post_json(
            &self.endpoints.gateway,
            &format!("device/{serial}/upgrade"),
            Some(&body),
        )?;
        expect_ok(&response)
    }

    pub fn reboot_device(&self, serial: &str) -> Result<(), ApiError> {
        let body = RebootRequest {
            serial_number: serial,
        };
        let response = self.transport.post_json(
            &self.endpoints.gateway,
            &format!("device/{serial}/reboot"),
            Some(&body),
        )?;
        expect_ok(&response)
    }

    /// `keep_redirector` keeps the setting the device uses to find its
    /// controller; without it the device has to be re-provisioned.
    pub fn factory_reset_device(
        &self,
        serial: &str,
        keep_redirector: bool,
    ) -> Result<(), ApiError> {
        let body = FactoryRequest {
            serial_number: serial,
            keep_redirector,
        };
        let response = self.transport.post_json(
            &self.endpoints.gateway,
            &format!("device/{serial}/factory"),
            Some(&body),
        )?;
        expect_ok(&response)
    }

    pub fn add_notes_to_device(&self, serial: &str, notes: &[String]) -> Result<(), ApiError> {
        let created = chrono::Utc::now().timestamp();
        let body = NotesUpdate::new(serial, notes, &self.note_author, created);
        let response = self.transport.put_json(
            &self.endpoints.gateway,
            &format!("device/{serial}"),
            Some(&body),
        )?;
        expect_ok(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Scheme;
    use httpmock::prelude::*;
    use serde_json::json;

    const SERIAL: &str = "abcdef123456";

    fn fixture(server: &MockServer) -> (Transport, Endpoints) {
        let mut transport = Transport::new(Scheme::Http, false).unwrap();
        transport.set_token("tok");
        let host = server.address().to_string();
        (
            transport,
            Endpoints {
                gateway: host.clone(),
                firmware: host,
            },
        )
    }

    fn mock_connected_devices<'a>(server: &'a MockServer, revision: &str) -> httpmock::Mock<'a> {
        let revision = revision.to_string();
        server.mock(move |when, then| {
            when.method(GET).path("/api/v1/connectedDevices");
            then.status(200).json_body(json!({"devices": [
                {"serialNumber": "000000000001", "deviceType": "cig_wf188", "revision": "r1", "status": "connected"},
                {"serialNumber": SERIAL, "deviceType": "edgecore_eap101", "revision": revision, "status": "connected"}
            ]}));
        })
    }

    fn mock_latest<'a>(server: &'a MockServer, revision: &str) -> httpmock::Mock<'a> {
        let revision = revision.to_string();
        server.mock(move |when, then| {
            when.method(GET)
                .path("/api/v1/firmwares")
                .query_param("latestOnly", "true")
                .query_param("deviceType", "edgecore_eap101");
            then.status(200).json_body(json!({
                "id": "fw-2",
                "revision": revision,
                "uri": "https://images.example.test/eap101-2.bin"
            }));
        })
    }

    #[test]
    fn finds_firmware_record_by_serial() {
        let server = MockServer::start();
        let connected = mock_connected_devices(&server, "r1");
        let (transport, endpoints) = fixture(&server);
        let client = DeviceClient::new(&transport, &endpoints);

        let record = client.get_firmware_device(SERIAL).unwrap();
        assert_eq!(record.device_type, "edgecore_eap101");
        assert!(record.is_connected());

        let err = client.get_firmware_device("ffffffffffff").unwrap_err();
        assert!(matches!(err, ApiError::NotFound(ref sn) if sn == "ffffffffffff"));
        connected.assert_hits(2);
    }

    #[test]
    fn upgrade_to_latest_is_skipped_when_current() {
        let server = MockServer::start();
        let latest = mock_latest(&server, "r2");
        let upgrade = server.mock(|when, then| {
            when.method(POST).path(format!("/api/v1/device/{SERIAL}/upgrade"));
            then.status(200);
        });
        let (transport, endpoints) = fixture(&server);
        let client = DeviceClient::new(&transport, &endpoints);

        let record = FirmwareRecord {
            serial_number: SERIAL.to_string(),
            device_type: "edgecore_eap101".to_string(),
            revision: "r2".to_string(),
            ..Default::default()
        };
        let err = client.upgrade_device_to_latest(&record).unwrap_err();

        assert!(matches!(err, ApiError::AlreadyCurrent { ref revision, .. } if revision == "r2"));
        latest.assert_hits(1);
        upgrade.assert_hits(0);
    }

    #[test]
    fn upgrade_to_latest_posts_latest_uri() {
        let server = MockServer::start();
        let _latest = mock_latest(&server, "r2");
        let upgrade = server.mock(|when, then| {
            when.method(POST)
                .path(format!("/api/v1/device/{SERIAL}/upgrade"))
                .json_body(json!({
                    "serialNumber": SERIAL,
                    "uri": "https://images.example.test/eap101-2.bin"
                }));
            then.status(200).json_body(json!({}));
        });
        let (transport, endpoints) = fixture(&server);
        let client = DeviceClient::new(&transport, &endpoints);

        let record = FirmwareRecord {
            serial_number: SERIAL.to_string(),
            device_type: "edgecore_eap101".to_string(),
            revision: "r1".to_string(),
            ..Default::default()
        };
        client.upgrade_device_to_latest(&record).unwrap();
        upgrade.assert();
    }

    #[test]
    fn reboot_reports_unexpected_status() {
        let server = MockServer::start();
        let reboot = server.mock(|when, then| {
            when.method(POST)
                .path(format!("/api/v1/device/{SERIAL}/reboot"))
                .header("Authorization", "Bearer tok")
                .json_body(json!({"serialNumber": SERIAL}));
            then.status(202);
        });
        let (transport, endpoints) = fixture(&server);
        let client = DeviceClient::new(&transport, &endpoints);

        let err = client.reboot_device(SERIAL).unwrap_err();
        reboot.assert();
        assert!(matches!(err, ApiError::UnexpectedStatus(202)));
    }

    #[test]
    fn factory_reset_sends_redirector_flag() {
        let server = MockServer::start();
        let factory = server.mock(|when, then| {
            when.method(POST)
                .path(format!("/api/v1/device/{SERIAL}/factory"))
                .json_body(json!({"serialNumber": SERIAL, "keepRedirector": false}));
            then.status(200);
        });
        let (transport, endpoints) = fixture(&server);
        let client = DeviceClient::new(&transport, &endpoints);

        client.factory_reset_device(SERIAL, false).unwrap();
        factory.assert();
    }

    fn notes_share_one_instant(req: &HttpMockRequest) -> bool {
        let Some(body) = req.body.as_deref() else {
            return false;
        };
        let Ok(update) = serde_json::from_slice::<serde_json::Value>(body) else {
            return false;
        };
        let created: Vec<i64> = update["notes"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|note| note["created"].as_i64())
            .collect();
        created.len() == 2 && created[0] > 0 && created[0] == created[1]
    }

    #[test]
    fn annotate_puts_stamped_notes() {
        let server = MockServer::start();
        let notes = server.mock(|when, then| {
            when.method(PUT)
                .path(format!("/api/v1/device/{SERIAL}"))
                .body_contains("\"createdBy\":\"field-ops\"")
                .body_contains("\"note\":\"cold boot\"")
                .body_contains("\"note\":\"field retest\"")
                .matches(notes_share_one_instant);
            then.status(200);
        });
        let (transport, endpoints) = fixture(&server);
        let client = DeviceClient::new(&transport, &endpoints).with_note_author("field-ops");

        client
            .add_notes_to_device(SERIAL, &["cold boot".to_string(), "field retest".to_string()])
            .unwrap();
        notes.assert();
    }

    #[test]
    fn lists_device_types_from_either_shape() {
        let server = MockServer::start();
        let types = server.mock(|when, then| {
            when.method(GET)
                .path("/api/v1/firmwares")
                .query_param("deviceSet", "true");
            then.status(200)
                .json_body(json!({"deviceTypes": ["tplink_ex447", "cig_wf188"]}));
        });
        let (transport, endpoints) = fixture(&server);
        let client = DeviceClient::new(&transport, &endpoints);

        let set = client.list_firmware_device_types().unwrap();
        types.assert();
        assert_eq!(
            set.into_iter().collect::<Vec<_>>(),
            vec!["cig_wf188".to_string(), "tplink_ex447".to_string()]
        );
    }

    #[test]
    fn get_device_fails_on_error_status() {
        let server = MockServer::start();
        let _device = server.mock(|when, then| {
            when.method(GET).path(format!("/api/v1/device/{SERIAL}"));
            then.status(404).json_body(json!({"ErrorCode": 404}));
        });
        let (transport, endpoints) = fixture(&server);
        let client = DeviceClient::new(&transport, &endpoints);

        let err = client.get_device(SERIAL).unwrap_err();
        assert!(matches!(err, ApiError::UnexpectedStatus(404)));
    }
}

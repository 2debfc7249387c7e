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

//! Payloads exchanged with the security, gateway and firmware services.
//!
//! Only the fields this client acts on are typed. The device configuration
//! object is carried as raw JSON and read by the report builders.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Device types published by the firmware service's `deviceSet` query at the
/// time of writing. Types outside this list are checked against the service.
pub const KNOWN_DEVICE_TYPES: &[&str] = &[
    "cig_wf160d",
    "cig_wf188",
    "cig_wf194c",
    "edgecore_eap101",
    "edgecore_eap102",
    "edgecore_ecs4100-12ph",
    "edgecore_ecw5211",
    "edgecore_ecw5410",
    "edgecore_oap100",
    "edgecore_spw2ac1200",
    "edgecore_ssw2ac2600",
    "hfcl_ion4.yml",
    "indio_um-305ac",
    "linksys_e8450-ubi",
    "linksys_ea6350",
    "linksys_ea8300",
    "mikrotik_nand",
    "mikrotik_nand-large",
    "tplink_cpe210_v3",
    "tplink_cpe510_v3",
    "tplink_eap225_outdoor_v1",
    "tplink_ec420",
    "tplink_ex227",
    "tplink_ex228",
    "tplink_ex447",
    "wallys_dr40x9",
];

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    #[serde(rename = "userId")]
    pub user_id: &'a str,
    pub password: &'a str,
}

/// Token issued by the security service.
///
/// `expires_in` and `idle_timeout` are recorded but never enforced; the
/// session does not refresh its token.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub idle_timeout: i64,
    pub created: i64,
    pub username: String,
    #[serde(rename = "userMustChangePassword")]
    pub user_must_change_password: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SystemEndpoints {
    pub endpoints: Vec<SystemEndpoint>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SystemEndpoint {
    #[serde(rename = "type")]
    pub kind: String,
    pub uri: String,
    pub id: i64,
    pub vendor: String,
    pub authentication_type: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeviceList {
    pub devices: Vec<Device>,
}

/// Gateway-side device record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Device {
    pub serial_number: String,
    pub device_type: String,
    pub manufacturer: String,
    pub mac_address: String,
    pub firmware: String,
    #[serde(rename = "UUID")]
    pub uuid: i64,
    pub compatible: String,
    pub location: String,
    pub owner: String,
    pub venue: String,
    pub notes: Vec<Note>,
    pub configuration: Value,
}

/// The `deviceSet` query answers with either a bare array or an object
/// wrapping it, depending on the firmware service release.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DeviceTypeSet {
    Bare(Vec<String>),
    Wrapped {
        #[serde(rename = "deviceTypes")]
        device_types: Vec<String>,
    },
}

impl DeviceTypeSet {
    pub fn into_types(self) -> Vec<String> {
        match self {
            DeviceTypeSet::Bare(types) => types,
            DeviceTypeSet::Wrapped { device_types } => device_types,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FirmwareDevices {
    pub devices: Vec<FirmwareRecord>,
}

/// Firmware-service view of a device, used for upgrade decisions.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FirmwareRecord {
    pub serial_number: String,
    pub device_type: String,
    pub revision: String,
    pub status: String,
    pub end_point: String,
    pub last_update: i64,
}

impl FirmwareRecord {
    pub fn is_connected(&self) -> bool {
        self.status == "connected"
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Firmwares {
    pub firmwares: Vec<Firmware>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Firmware {
    pub id: String,
    pub device_type: String,
    pub description: String,
    pub release: String,
    pub revision: String,
    pub image: String,
    pub image_date: i64,
    pub created: i64,
    pub latest: bool,
    pub uri: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeRequest<'a> {
    pub serial_number: &'a str,
    pub uri: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebootRequest<'a> {
    pub serial_number: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FactoryRequest<'a> {
    pub serial_number: &'a str,
    pub keep_redirector: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Note {
    pub created: i64,
    pub created_by: String,
    pub note: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotesUpdate {
    pub serial_number: String,
    pub notes: Vec<Note>,
}

impl NotesUpdate {
    /// Stamps every note with the same instant and author.
    pub fn new(serial: &str, notes: &[String], author: &str, created: i64) -> Self {
        Self {
            serial_number: serial.to_string(),
            notes: notes
                .iter()
                .map(|note| Note {
                    created,
                    created_by: author.to_string(),
                    note: note.clone(),
                })
                .collect(),
        }
    }
}

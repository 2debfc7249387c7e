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

//! Human-readable report strings for devices and firmware.
//!
//! Builders return one string per entity with fields joined by `", "`;
//! [`display_list`] prints every field on its own indented line.

use crate::model::{Device, Firmware, Firmwares};
use serde_json::Value;
use std::fmt;
use std::io::{self, Write};

/// Qualifiers accepted after `listdevices` and `getdevice`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoType {
    Configuration,
    Interfaces,
    Capabilities,
    Status,
    Stats,
    Logs,
    Health,
}

impl InfoType {
    pub const ALL: [InfoType; 7] = [
        InfoType::Configuration,
        InfoType::Interfaces,
        InfoType::Capabilities,
        InfoType::Status,
        InfoType::Stats,
        InfoType::Logs,
        InfoType::Health,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            InfoType::Configuration => "configuration",
            InfoType::Interfaces => "interfaces",
            InfoType::Capabilities => "capabilities",
            InfoType::Status => "status",
            InfoType::Stats => "stats",
            InfoType::Logs => "logs",
            InfoType::Health => "health",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|info| info.as_str().eq_ignore_ascii_case(token))
    }
}

impl fmt::Display for InfoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn display_list<W: Write>(out: &mut W, id: &str, list: &[String]) -> io::Result<()> {
    write!(out, "SN: {id}")?;
    for entry in list {
        for field in entry.split(", ").filter(|f| !f.is_empty()) {
            write!(out, "\n\t{field}")?;
        }
    }
    writeln!(out)
}

/// Report for `info`; no qualifier yields the general description.
/// Qualifiers without a builder yield an empty report.
pub fn device_info(device: &Device, info: Option<InfoType>) -> Vec<String> {
    match info {
        None => vec![device_description(device)],
        Some(InfoType::Interfaces) => interface_descriptions(&device.configuration),
        Some(InfoType::Configuration) => {
            let mut list = vec![configuration_description(&device.configuration)];
            list.extend(radio_descriptions(&device.configuration));
            list
        }
        Some(_) => Vec::new(),
    }
}

pub fn device_description(device: &Device) -> String {
    format!(
        "Manufacturer: {}, Type: {}, MAC Address: {}, Firmware: {}, UUID: {}",
        device.manufacturer, device.device_type, device.mac_address, device.firmware, device.uuid
    )
}

pub fn configuration_description(configuration: &Value) -> String {
    let unit = &configuration["unit"];
    format!(
        "Name: {}, Location: {}, Timezone: {}",
        text(&unit["name"]),
        text(&unit["location"]),
        text(&unit["timezone"])
    )
}

pub fn radio_descriptions(configuration: &Value) -> Vec<String> {
    entries(&configuration["radios"])
        .map(|radio| {
            format!(
                "Band: {}, Channel: {}, Width: {}, Mode: {}",
                text(&radio["band"]),
                text(&radio["channel"]),
                text(&radio["channel-width"]),
                text(&radio["channel-mode"])
            )
        })
        .collect()
}

pub fn interface_descriptions(configuration: &Value) -> Vec<String> {
    entries(&configuration["interfaces"])
        .map(|iface| {
            let mut desc = format!(
                "Name: {}, Role: {}, IPv4 Addressing: {}, IPv6 Addressing: {}",
                text(&iface["name"]),
                text(&iface["role"]),
                text(&iface["ipv4"]["addressing"]),
                text(&iface["ipv6"]["addressing"])
            );
            for ssid in entries(&iface["ssids"]) {
                desc.push_str(", ");
                desc.push_str(&ssid_description(ssid));
            }
            desc
        })
        .collect()
}

fn ssid_description(ssid: &Value) -> String {
    format!(
        "SSID: {}, Mode: {}, Bands: {}, Services: {}",
        text(&ssid["name"]),
        text(&ssid["bss-mode"]),
        joined(&ssid["wifi-bands"]),
        joined(&ssid["services"])
    )
}

pub fn firmware_description(firmware: &Firmware) -> String {
    format!(
        "ID: {}, Release: {}, Revision: {}, Image Date: {}, Created: {}, URI: {}",
        firmware.id,
        firmware.release,
        firmware.revision,
        firmware.image_date,
        firmware.created,
        firmware.uri
    )
}

pub fn firmware_list(firmwares: &Firmwares) -> Vec<String> {
    firmwares.firmwares.iter().map(firmware_description).collect()
}

fn entries(value: &Value) -> impl Iterator<Item = &Value> {
    value.as_array().into_iter().flatten()
}

fn text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn joined(value: &Value) -> String {
    entries(value).map(text).collect::<Vec<_>>().join("/")
}

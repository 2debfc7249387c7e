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

//! Per-chain response cache.
//!
//! Holds at most one device list and one device detail. Entries live until
//! replaced by a fetch for a different key; mutating commands leave them
//! untouched, so a report after a reboot or upgrade in the same chain shows
//! the state fetched before it.

use crate::model::{Device, DeviceList};
use std::borrow::Borrow;

/// Single-entry cache. A lookup hits only when the key equals the stored one.
#[derive(Debug)]
pub struct Slot<K, V> {
    entry: Option<(K, V)>,
}

impl<K, V> Default for Slot<K, V> {
    fn default() -> Self {
        Self { entry: None }
    }
}

impl<K, V> Slot<K, V> {
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: PartialEq + ?Sized,
    {
        match &self.entry {
            Some((stored, value)) if stored.borrow() == key => Some(value),
            _ => None,
        }
    }

    /// Replaces whatever was stored.
    pub fn put(&mut self, key: K, value: V) -> &V {
        let (_, value) = self.entry.insert((key, value));
        value
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entry.is_none()
    }
}

#[derive(Debug, Default)]
pub struct SessionCache {
    device_list: Slot<(), DeviceList>,
    device: Slot<String, Device>,
}

impl SessionCache {
    pub fn device_list(&self) -> Option<&DeviceList> {
        self.device_list.get(&())
    }

    pub fn put_device_list(&mut self, list: DeviceList) -> &DeviceList {
        self.device_list.put((), list)
    }

    pub fn device(&self, serial: &str) -> Option<&Device> {
        self.device.get(serial)
    }

    pub fn put_device(&mut self, serial: &str, device: Device) -> &Device {
        self.device.put(serial.to_string(), device)
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.device_list.is_empty() && self.device.is_empty()
    }
}

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

//! Command-chain interpreter.
//!
//! A chain is a flat token list such as
//! `getdevice abcdef123456 interfaces reboot abcdef654321`. Each command name
//! is followed by its required argument and up to two optional ones; an
//! optional token is only taken when it passes that command's predicate,
//! otherwise it starts the next frame. The whole chain is decoded before the
//! session is opened, then frames run strictly in order.

use crate::cache::SessionCache;
use crate::config::EffectiveConfig;
use crate::devices::{ApiError, DeviceClient};
use crate::model::KNOWN_DEVICE_TYPES;
use crate::report::{self, InfoType};
use crate::session::{SessionError, SessionManager};
use std::collections::BTreeSet;
use std::fmt;
use std::io::{self, Write};
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub const SERIAL_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandName {
    ListDevices,
    GetDevice,
    GetFirmware,
    UpgradeFirmware,
    Reboot,
    Annotate,
    Factory,
}

impl CommandName {
    pub const ALL: [CommandName; 7] = [
        CommandName::ListDevices,
        CommandName::GetDevice,
        CommandName::GetFirmware,
        CommandName::UpgradeFirmware,
        CommandName::Reboot,
        CommandName::Annotate,
        CommandName::Factory,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CommandName::ListDevices => "listdevices",
            CommandName::GetDevice => "getdevice",
            CommandName::GetFirmware => "getfirmware",
            CommandName::UpgradeFirmware => "upgradefirmware",
            CommandName::Reboot => "reboot",
            CommandName::Annotate => "annotate",
            CommandName::Factory => "factory",
        }
    }

    pub fn usage(self) -> &'static str {
        match self {
            CommandName::ListDevices => "listdevices [info-type]",
            CommandName::GetDevice => "getdevice <serial> [info-type]",
            CommandName::GetFirmware => "getfirmware <device-type> [latest]",
            CommandName::UpgradeFirmware => "upgradefirmware <serial> [http-uri]",
            CommandName::Reboot => "reboot <serial>",
            CommandName::Annotate => "annotate <serial> \"<note>[,<note>...]\"",
            CommandName::Factory => "factory <serial> [true|false]  (false drops the redirector)",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str().eq_ignore_ascii_case(token))
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input errors abort the whole chain.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("{command}: must supply {what}")]
    MissingArgument {
        command: CommandName,
        what: &'static str,
    },
    #[error("{serial}: incorrect serial number length (expected 12 characters)")]
    InvalidSerial { serial: String },
    #[error("{device_type}: invalid device type supplied")]
    UnknownDeviceType { device_type: String },
    #[error("retrieving valid device types: {0}")]
    DeviceTypeLookup(ApiError),
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("writing report: {0}")]
    Output(#[from] io::Error),
}

/// Lowercased serial number of exactly [`SERIAL_LEN`] characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialNumber(String);

impl SerialNumber {
    pub fn parse(token: &str) -> Result<Self, InputError> {
        let serial = token.to_lowercase();
        if serial.chars().count() != SERIAL_LEN {
            return Err(InputError::InvalidSerial { serial });
        }
        Ok(Self(serial))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandFrame {
    ListDevices {
        info: Option<InfoType>,
    },
    GetDevice {
        serial: SerialNumber,
        info: Option<InfoType>,
    },
    GetFirmware {
        device_type: String,
        latest: bool,
    },
    UpgradeFirmware {
        serial: SerialNumber,
        uri: Option<String>,
    },
    Reboot {
        serial: SerialNumber,
    },
    Annotate {
        serial: SerialNumber,
        notes: Vec<String>,
    },
    Factory {
        serial: SerialNumber,
        keep_redirector: bool,
    },
}

impl CommandFrame {
    pub fn name(&self) -> CommandName {
        match self {
            CommandFrame::ListDevices { .. } => CommandName::ListDevices,
            CommandFrame::GetDevice { .. } => CommandName::GetDevice,
            CommandFrame::GetFirmware { .. } => CommandName::GetFirmware,
            CommandFrame::UpgradeFirmware { .. } => CommandName::UpgradeFirmware,
            CommandFrame::Reboot { .. } => CommandName::Reboot,
            CommandFrame::Annotate { .. } => CommandName::Annotate,
            CommandFrame::Factory { .. } => CommandName::Factory,
        }
    }

    /// Serial or device type the frame acts on, for log lines.
    pub fn subject(&self) -> &str {
        match self {
            CommandFrame::ListDevices { .. } => "all",
            CommandFrame::GetFirmware { device_type, .. } => device_type,
            CommandFrame::GetDevice { serial, .. }
            | CommandFrame::UpgradeFirmware { serial, .. }
            | CommandFrame::Reboot { serial }
            | CommandFrame::Annotate { serial, .. }
            | CommandFrame::Factory { serial, .. } => serial.as_str(),
        }
    }
}

/// A decoded frame and how many tokens it used, command name included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub frame: CommandFrame,
    pub consumed: usize,
}

#[derive(Debug, Clone)]
pub struct TokenCursor<'a> {
    tokens: &'a [String],
    pos: usize,
}

impl<'a> TokenCursor<'a> {
    pub fn new(tokens: &'a [String]) -> Self {
        Self { tokens, pos: 0 }
    }

    /// Token `n` places after the cursor, without consuming it.
    pub fn peek(&self, n: usize) -> Option<&'a str> {
        self.tokens.get(self.pos + n).map(String::as_str)
    }

    pub fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.tokens.len());
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    #[cfg(test)]
    pub fn is_done(&self) -> bool {
        self.pos >= self.tokens.len()
    }
}

pub fn parse_chain(tokens: &[String]) -> Result<Vec<CommandFrame>, InputError> {
    let mut cursor = TokenCursor::new(tokens);
    let mut frames = Vec::new();

    while let Some(token) = cursor.peek(0) {
        let Some(name) = CommandName::parse(token) else {
            warn!(token, position = cursor.position(), "skipping unknown command");
            cursor.advance(1);
            continue;
        };
        let decoded = decode_frame(name, &cursor)?;
        debug!(command = %name, consumed = decoded.consumed, "decoded frame");
        cursor.advance(decoded.consumed);
        frames.push(decoded.frame);
    }

    Ok(frames)
}

/// Decodes the frame whose command name sits under the cursor.
pub fn decode_frame(
    name: CommandName,
    cursor: &TokenCursor<'_>,
) -> Result<DecodedFrame, InputError> {
    match name {
        CommandName::ListDevices => decode_listdevices(cursor),
        CommandName::GetDevice => decode_getdevice(cursor),
        CommandName::GetFirmware => decode_getfirmware(cursor),
        CommandName::UpgradeFirmware => decode_upgradefirmware(cursor),
        CommandName::Reboot => decode_reboot(cursor),
        CommandName::Annotate => decode_annotate(cursor),
        CommandName::Factory => decode_factory(cursor),
    }
}

fn required<'a>(
    cursor: &TokenCursor<'a>,
    command: CommandName,
    what: &'static str,
) -> Result<&'a str, InputError> {
    cursor
        .peek(1)
        .ok_or(InputError::MissingArgument { command, what })
}

fn required_serial(
    cursor: &TokenCursor<'_>,
    command: CommandName,
) -> Result<SerialNumber, InputError> {
    SerialNumber::parse(required(cursor, command, "device serial number")?)
}

fn optional_info(cursor: &TokenCursor<'_>, n: usize) -> Option<InfoType> {
    cursor.peek(n).and_then(InfoType::parse)
}

fn decode_listdevices(cursor: &TokenCursor<'_>) -> Result<DecodedFrame, InputError> {
    let info = optional_info(cursor, 1);
    Ok(DecodedFrame {
        consumed: 1 + usize::from(info.is_some()),
        frame: CommandFrame::ListDevices { info },
    })
}

fn decode_getdevice(cursor: &TokenCursor<'_>) -> Result<DecodedFrame, InputError> {
    let serial = required_serial(cursor, CommandName::GetDevice)?;
    let info = optional_info(cursor, 2);
    Ok(DecodedFrame {
        consumed: 2 + usize::from(info.is_some()),
        frame: CommandFrame::GetDevice { serial, info },
    })
}

fn decode_getfirmware(cursor: &TokenCursor<'_>) -> Result<DecodedFrame, InputError> {
    let device_type = required(cursor, CommandName::GetFirmware, "device type")?.to_lowercase();
    let latest = cursor
        .peek(2)
        .is_some_and(|t| t.eq_ignore_ascii_case("latest"));
    Ok(DecodedFrame {
        consumed: 2 + usize::from(latest),
        frame: CommandFrame::GetFirmware {
            device_type,
            latest,
        },
    })
}

fn decode_upgradefirmware(cursor: &TokenCursor<'_>) -> Result<DecodedFrame, InputError> {
    let serial = required_serial(cursor, CommandName::UpgradeFirmware)?;
    let uri = cursor
        .peek(2)
        .filter(|t| t.starts_with("http"))
        .map(str::to_string);
    Ok(DecodedFrame {
        consumed: 2 + usize::from(uri.is_some()),
        frame: CommandFrame::UpgradeFirmware { serial, uri },
    })
}

fn decode_reboot(cursor: &TokenCursor<'_>) -> Result<DecodedFrame, InputError> {
    let serial = required_serial(cursor, CommandName::Reboot)?;
    Ok(DecodedFrame {
        consumed: 2,
        frame: CommandFrame::Reboot { serial },
    })
}

fn decode_annotate(cursor: &TokenCursor<'_>) -> Result<DecodedFrame, InputError> {
    let serial = required_serial(cursor, CommandName::Annotate)?;
    let raw = cursor.peek(2).ok_or(InputError::MissingArgument {
        command: CommandName::Annotate,
        what: "the notes",
    })?;
    let notes: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|note| !note.is_empty())
        .map(str::to_string)
        .collect();
    if notes.is_empty() {
        return Err(InputError::MissingArgument {
            command: CommandName::Annotate,
            what: "the notes",
        });
    }
    Ok(DecodedFrame {
        consumed: 3,
        frame: CommandFrame::Annotate { serial, notes },
    })
}

fn decode_factory(cursor: &TokenCursor<'_>) -> Result<DecodedFrame, InputError> {
    let serial = required_serial(cursor, CommandName::Factory)?;
    let flag = cursor.peek(2).and_then(|t| match t.to_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    });
    Ok(DecodedFrame {
        consumed: 2 + usize::from(flag.is_some()),
        frame: CommandFrame::Factory {
            serial,
            keep_redirector: flag.unwrap_or(true),
        },
    })
}

enum StepError {
    Fatal(ChainError),
    Remote(ApiError),
}

impl From<ApiError> for StepError {
    fn from(err: ApiError) -> Self {
        StepError::Remote(err)
    }
}

impl From<InputError> for StepError {
    fn from(err: InputError) -> Self {
        StepError::Fatal(err.into())
    }
}

impl From<io::Error> for StepError {
    fn from(err: io::Error) -> Self {
        StepError::Fatal(err.into())
    }
}

/// Executes frames against a resolved session. Remote failures are logged and
/// the chain moves on; input errors stop it.
pub struct Dispatcher<'a, W: Write> {
    devices: DeviceClient<'a>,
    cache: SessionCache,
    known_types: BTreeSet<String>,
    out: W,
}

impl<'a, W: Write> Dispatcher<'a, W> {
    pub fn new(devices: DeviceClient<'a>, out: W) -> Self {
        Self {
            devices,
            cache: SessionCache::default(),
            known_types: KNOWN_DEVICE_TYPES.iter().map(|t| t.to_string()).collect(),
            out,
        }
    }

    pub fn run(&mut self, frames: &[CommandFrame]) -> Result<(), ChainError> {
        for frame in frames {
            self.execute(frame)?;
        }
        Ok(())
    }

    pub fn execute(&mut self, frame: &CommandFrame) -> Result<(), ChainError> {
        let outcome = match frame {
            CommandFrame::ListDevices { info } => self.list_devices(*info),
            CommandFrame::GetDevice { serial, info } => self.get_device(serial, *info),
            CommandFrame::GetFirmware {
                device_type,
                latest,
            } => self.get_firmware(device_type, *latest),
            CommandFrame::UpgradeFirmware { serial, uri } => {
                self.upgrade_firmware(serial, uri.as_deref())
            }
            CommandFrame::Reboot { serial } => self.reboot(serial),
            CommandFrame::Annotate { serial, notes } => self.annotate(serial, notes),
            CommandFrame::Factory {
                serial,
                keep_redirector,
            } => self.factory(serial, *keep_redirector),
        };

        match outcome {
            Ok(()) => Ok(()),
            Err(StepError::Remote(err)) => {
                error!(command = %frame.name(), subject = frame.subject(), %err, "command failed");
                Ok(())
            }
            Err(StepError::Fatal(err)) => Err(err),
        }
    }

    #[cfg(test)]
    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    fn list_devices(&mut self, info: Option<InfoType>) -> Result<(), StepError> {
        if self.cache.device_list().is_none() {
            let list = self.devices.list_devices()?;
            self.cache.put_device_list(list);
        } else {
            debug!("using cached device list");
        }

        if let Some(list) = self.cache.device_list() {
            for device in &list.devices {
                report::display_list(
                    &mut self.out,
                    &device.serial_number,
                    &report::device_info(device, info),
                )?;
            }
        }
        Ok(())
    }

    fn get_device(
        &mut self,
        serial: &SerialNumber,
        info: Option<InfoType>,
    ) -> Result<(), StepError> {
        if self.cache.device(serial.as_str()).is_none() {
            let device = self.devices.get_device(serial.as_str())?;
            self.cache.put_device(serial.as_str(), device);
        } else {
            debug!(%serial, "using cached device");
        }

        if let Some(device) = self.cache.device(serial.as_str()) {
            report::display_list(
                &mut self.out,
                &device.serial_number,
                &report::device_info(device, info),
            )?;
        }
        Ok(())
    }

    fn get_firmware(&mut self, device_type: &str, latest: bool) -> Result<(), StepError> {
        self.validate_device_type(device_type)?;

        let list = if latest {
            let firmware = self.devices.get_latest_firmware_by_device(device_type)?;
            vec![report::firmware_description(&firmware)]
        } else {
            let firmwares = self.devices.get_firmware_list_by_device(device_type)?;
            report::firmware_list(&firmwares)
        };
        report::display_list(&mut self.out, device_type, &list)?;
        Ok(())
    }

    /// Checks the static list first and asks the firmware service only for
    /// types it does not contain.
    fn validate_device_type(&mut self, device_type: &str) -> Result<(), InputError> {
        if self.known_types.contains(device_type) {
            return Ok(());
        }

        info!(device_type, "retrieving valid device types");
        let remote = self
            .devices
            .list_firmware_device_types()
            .map_err(InputError::DeviceTypeLookup)?;
        let found = remote.iter().any(|t| t.eq_ignore_ascii_case(device_type));
        if !found {
            for valid in &remote {
                info!("\t{valid}");
            }
        }
        self.known_types
            .extend(remote.into_iter().map(|t| t.to_lowercase()));

        if found {
            Ok(())
        } else {
            Err(InputError::UnknownDeviceType {
                device_type: device_type.to_string(),
            })
        }
    }

    fn upgrade_firmware(
        &mut self,
        serial: &SerialNumber,
        uri: Option<&str>,
    ) -> Result<(), StepError> {
        let record = self.devices.get_firmware_device(serial.as_str())?;
        if !record.is_connected() {
            warn!(%serial, status = %record.status, "device is not connected");
        }

        match uri {
            Some(uri) => self
                .devices
                .upgrade_device_firmware(&record.serial_number, uri)?,
            None => self.devices.upgrade_device_to_latest(&record)?,
        }
        info!(%serial, uri = uri.unwrap_or("latest"), "upgrade requested");
        Ok(())
    }

    fn reboot(&mut self, serial: &SerialNumber) -> Result<(), StepError> {
        self.devices.reboot_device(serial.as_str())?;
        info!(%serial, "reboot requested");
        Ok(())
    }

    fn annotate(&mut self, serial: &SerialNumber, notes: &[String]) -> Result<(), StepError> {
        self.devices.add_notes_to_device(serial.as_str(), notes)?;
        info!(%serial, count = notes.len(), "notes added");
        Ok(())
    }

    fn factory(&mut self, serial: &SerialNumber, keep_redirector: bool) -> Result<(), StepError> {
        self.devices
            .factory_reset_device(serial.as_str(), keep_redirector)?;
        info!(%serial, keep_redirector, "factory reset requested");
        Ok(())
    }
}

/// Decodes the chain, opens a session, runs every frame and logs out.
///
/// Malformed input fails before any request is sent. Once login succeeded
/// the token is released exactly once, whatever happens afterwards.
pub fn run_chain<W: Write>(
    config: &EffectiveConfig,
    tokens: &[String],
    out: W,
) -> Result<(), ChainError> {
    let frames = parse_chain(tokens)?;
    if frames.is_empty() {
        warn!("no commands to run");
        return Ok(());
    }

    let mut session = SessionManager::new(config)?;
    session.authenticate()?;

    let result = drive(&mut session, config, &frames, out);
    debug!(state = ?session.state(), "chain finished");
    if let Err(err) = session.terminate() {
        error!(%err, "logout failed");
    }
    result
}

fn drive<W: Write>(
    session: &mut SessionManager,
    config: &EffectiveConfig,
    frames: &[CommandFrame],
    out: W,
) -> Result<(), ChainError> {
    session.discover_endpoints()?;
    let devices = session.devices()?.with_note_author(&config.note_author);
    Dispatcher::new(devices, out).run(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::session::test_support::*;
    use httpmock::prelude::*;
    use serde_json::json;

    const SN_A: &str = "abcdef123456";
    const SN_B: &str = "abcdef654321";

    fn tokens(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|t| t.to_string()).collect()
    }

    fn serial(raw: &str) -> SerialNumber {
        SerialNumber::parse(raw).unwrap()
    }

    fn mock_device<'a>(server: &'a MockServer, sn: &str) -> httpmock::Mock<'a> {
        let sn = sn.to_string();
        server.mock(move |when, then| {
            when.method(GET).path(format!("/api/v1/device/{sn}"));
            then.status(200).json_body(json!({
                "serialNumber": sn,
                "deviceType": "edgecore_eap101",
                "manufacturer": "Edgecore"
            }));
        })
    }

    #[test]
    fn cursor_peeks_without_consuming() {
        let raw = tokens(&["reboot", SN_A]);
        let mut cursor = TokenCursor::new(&raw);
        assert_eq!(cursor.peek(0), Some("reboot"));
        assert_eq!(cursor.peek(1), Some(SN_A));
        assert_eq!(cursor.peek(2), None);
        assert_eq!(cursor.position(), 0);

        cursor.advance(5);
        assert!(cursor.is_done());
        assert_eq!(cursor.position(), 2);
    }

    #[test]
    fn variable_width_frames_resynchronize() {
        let raw = tokens(&["getdevice", "ABCDEF123456", "configuration", "reboot", "ABCDEF654321"]);
        let frames = parse_chain(&raw).unwrap();
        assert_eq!(
            frames,
            vec![
                CommandFrame::GetDevice {
                    serial: serial(SN_A),
                    info: Some(InfoType::Configuration),
                },
                CommandFrame::Reboot {
                    serial: serial(SN_B)
                },
            ]
        );
    }

    #[test]
    fn decoded_widths_match_consumed_tokens() {
        let raw = tokens(&["getdevice", SN_A, "configuration", "reboot", SN_B]);
        let mut cursor = TokenCursor::new(&raw);

        let first = decode_frame(CommandName::GetDevice, &cursor).unwrap();
        assert_eq!(first.consumed, 3);
        cursor.advance(first.consumed);
        assert_eq!(cursor.peek(0), Some("reboot"));

        let second = decode_frame(CommandName::Reboot, &cursor).unwrap();
        assert_eq!(second.consumed, 2);
        cursor.advance(second.consumed);
        assert!(cursor.is_done());
    }

    #[test]
    fn optional_tokens_failing_predicate_start_next_frame() {
        let raw = tokens(&[
            "listdevices",
            "reboot",
            SN_A,
            "upgradefirmware",
            SN_B,
            "factory",
            SN_A,
            "false",
            "getfirmware",
            "EDGECORE_EAP101",
            "Latest",
        ]);
        let frames = parse_chain(&raw).unwrap();
        assert_eq!(
            frames,
            vec![
                CommandFrame::ListDevices { info: None },
                CommandFrame::Reboot {
                    serial: serial(SN_A)
                },
                CommandFrame::UpgradeFirmware {
                    serial: serial(SN_B),
                    uri: None
                },
                CommandFrame::Factory {
                    serial: serial(SN_A),
                    keep_redirector: false
                },
                CommandFrame::GetFirmware {
                    device_type: "edgecore_eap101".to_string(),
                    latest: true
                },
            ]
        );
    }

    #[test]
    fn upgrade_takes_http_uri_verbatim() {
        let raw = tokens(&["upgradefirmware", SN_A, "https://images.example.test/Img.bin"]);
        let frames = parse_chain(&raw).unwrap();
        assert_eq!(
            frames,
            vec![CommandFrame::UpgradeFirmware {
                serial: serial(SN_A),
                uri: Some("https://images.example.test/Img.bin".to_string()),
            }]
        );
    }

    #[test]
    fn annotate_splits_notes_and_consumes_any_token() {
        let raw = tokens(&["annotate", SN_A, "cold boot,field retest", "reboot", SN_B]);
        let frames = parse_chain(&raw).unwrap();
        assert_eq!(
            frames[0],
            CommandFrame::Annotate {
                serial: serial(SN_A),
                notes: vec!["cold boot".to_string(), "field retest".to_string()],
            }
        );
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn unknown_tokens_are_skipped() {
        let raw = tokens(&["bogus", "reboot", SN_A]);
        let frames = parse_chain(&raw).unwrap();
        assert_eq!(
            frames,
            vec![CommandFrame::Reboot {
                serial: serial(SN_A)
            }]
        );
    }

    #[test]
    fn malformed_required_arguments_are_fatal() {
        for raw in [
            tokens(&["reboot", "abc123"]),
            tokens(&["getdevice", "abcdef1234567"]),
            tokens(&["listdevices", "factory", "short"]),
            tokens(&["upgradefirmware", "abcdef12345"]),
            tokens(&["annotate", "abcdef1234567", "cold boot"]),
        ] {
            let err = parse_chain(&raw).unwrap_err();
            assert!(matches!(err, InputError::InvalidSerial { .. }), "{raw:?}");
        }

        let err = parse_chain(&tokens(&["reboot"])).unwrap_err();
        assert!(matches!(
            err,
            InputError::MissingArgument {
                command: CommandName::Reboot,
                ..
            }
        ));

        let err = parse_chain(&tokens(&["annotate", SN_A])).unwrap_err();
        assert!(matches!(
            err,
            InputError::MissingArgument {
                command: CommandName::Annotate,
                what: "the notes"
            }
        ));

        let err = parse_chain(&tokens(&["getfirmware"])).unwrap_err();
        assert!(matches!(err, InputError::MissingArgument { .. }));
    }

    #[test]
    fn annotate_with_only_separators_has_no_notes() {
        let err = parse_chain(&tokens(&["annotate", SN_A, " , ,", "reboot", SN_B])).unwrap_err();
        assert!(matches!(
            err,
            InputError::MissingArgument {
                command: CommandName::Annotate,
                what: "the notes"
            }
        ));
    }

    #[test]
    fn repeated_serial_hits_device_cache() {
        let server = MockServer::start();
        let device_a = mock_device(&server, SN_A);
        let device_b = mock_device(&server, SN_B);

        let mut transport =
            crate::client::Transport::new(crate::client::Scheme::Http, false).unwrap();
        transport.set_token(TOKEN);
        let endpoints = crate::session::Endpoints {
            gateway: server.address().to_string(),
            firmware: server.address().to_string(),
        };
        let mut out = Vec::new();
        {
            let mut dispatcher =
                Dispatcher::new(DeviceClient::new(&transport, &endpoints), &mut out);
            let frames = parse_chain(&tokens(&["getdevice", SN_A, "getdevice", SN_A])).unwrap();
            dispatcher.run(&frames).unwrap();
            device_a.assert_hits(1);

            let frames = parse_chain(&tokens(&["getdevice", SN_B])).unwrap();
            dispatcher.run(&frames).unwrap();
            device_b.assert_hits(1);
            assert!(dispatcher.cache().device(SN_B).is_some());
            assert!(dispatcher.cache().device(SN_A).is_none());
        }

        let printed = String::from_utf8(out).unwrap();
        assert_eq!(printed.matches("SN: abcdef123456").count(), 2);
        assert!(printed.contains("SN: abcdef654321\n\tManufacturer: Edgecore"));
    }

    #[test]
    fn chain_continues_after_remote_failures_and_logs_out_once() {
        let server = MockServer::start();
        let login = mock_login(&server);
        let _endpoints = mock_endpoints(&server);
        let logout = mock_logout(&server);
        let reboot = server.mock(|when, then| {
            when.method(POST).path(format!("/api/v1/device/{SN_A}/reboot"));
            then.status(500);
        });
        let devices = server.mock(|when, then| {
            when.method(GET).path("/api/v1/devices");
            then.status(503);
        });
        let connected = server.mock(|when, then| {
            when.method(GET).path("/api/v1/connectedDevices");
            then.status(200).json_body(json!({"devices": []}));
        });
        let factory = server.mock(|when, then| {
            when.method(POST).path(format!("/api/v1/device/{SN_B}/factory"));
            then.status(400);
        });

        let config = test_config(&server.address().to_string());
        let raw = tokens(&[
            "reboot",
            SN_A,
            "listdevices",
            "upgradefirmware",
            SN_A,
            "factory",
            SN_B,
        ]);
        let mut out = Vec::new();
        run_chain(&config, &raw, &mut out).unwrap();

        login.assert_hits(1);
        reboot.assert_hits(1);
        devices.assert_hits(1);
        connected.assert_hits(1);
        factory.assert_hits(1);
        logout.assert_hits(1);
        assert!(out.is_empty());
    }

    #[test]
    fn malformed_chain_fails_before_login() {
        let server = MockServer::start();
        let login = mock_login(&server);

        let config = test_config(&server.address().to_string());
        let err = run_chain(&config, &tokens(&["listdevices", "reboot", "123"]), Vec::new())
            .unwrap_err();

        assert!(matches!(err, ChainError::Input(InputError::InvalidSerial { .. })));
        login.assert_hits(0);
    }

    #[test]
    fn unknown_device_type_aborts_chain_but_logs_out() {
        let server = MockServer::start();
        let _login = mock_login(&server);
        let _endpoints = mock_endpoints(&server);
        let logout = mock_logout(&server);
        let types = server.mock(|when, then| {
            when.method(GET)
                .path("/api/v1/firmwares")
                .query_param("deviceSet", "true");
            then.status(200).json_body(json!(["cig_wf188", "edgecore_eap101"]));
        });
        let reboot = server.mock(|when, then| {
            when.method(POST).path(format!("/api/v1/device/{SN_A}/reboot"));
            then.status(200);
        });

        let config = test_config(&server.address().to_string());
        let raw = tokens(&["getfirmware", "acme_ap9000", "reboot", SN_A]);
        let err = run_chain(&config, &raw, Vec::new()).unwrap_err();

        assert!(matches!(
            err,
            ChainError::Input(InputError::UnknownDeviceType { ref device_type })
                if device_type == "acme_ap9000"
        ));
        types.assert_hits(1);
        reboot.assert_hits(0);
        logout.assert_hits(1);
    }

    #[test]
    fn remotely_confirmed_device_type_is_accepted() {
        let server = MockServer::start();
        let _login = mock_login(&server);
        let _endpoints = mock_endpoints(&server);
        let _logout = mock_logout(&server);
        let types = server.mock(|when, then| {
            when.method(GET)
                .path("/api/v1/firmwares")
                .query_param("deviceSet", "true");
            then.status(200).json_body(json!(["acme_ap9000"]));
        });
        let latest = server.mock(|when, then| {
            when.method(GET)
                .path("/api/v1/firmwares")
                .query_param("latestOnly", "true")
                .query_param("deviceType", "acme_ap9000");
            then.status(200).json_body(json!({
                "id": "fw-9",
                "release": "v3.0",
                "revision": "r9",
                "uri": "https://images.example.test/ap9000.bin"
            }));
        });

        let config = test_config(&server.address().to_string());
        let raw = tokens(&[
            "getfirmware",
            "acme_ap9000",
            "latest",
            "getfirmware",
            "acme_ap9000",
            "latest",
        ]);
        let mut out = Vec::new();
        run_chain(&config, &raw, &mut out).unwrap();

        types.assert_hits(1);
        latest.assert_hits(2);
        let printed = String::from_utf8(out).unwrap();
        assert!(
            printed.starts_with("SN: acme_ap9000\n\tID: fw-9\n\tRelease: v3.0\n\tRevision: r9")
        );
    }

    #[test]
    fn failed_discovery_still_logs_out() {
        let server = MockServer::start();
        let _login = mock_login(&server);
        let logout = mock_logout(&server);
        let _endpoints = server.mock(|when, then| {
            when.method(GET).path("/api/v1/systemEndpoints");
            then.status(200).json_body(json!({"endpoints": [
                {"type": "owgw", "uri": "https://gw.example.test:16002"}
            ]}));
        });

        let config = test_config(&server.address().to_string());
        let err = run_chain(&config, &tokens(&["listdevices"]), Vec::new()).unwrap_err();

        assert!(matches!(
            err,
            ChainError::Session(SessionError::EndpointsIncomplete { firmware: false, .. })
        ));
        logout.assert_hits(1);
    }

    #[test]
    fn empty_chain_does_not_log_in() {
        let server = MockServer::start();
        let login = mock_login(&server);
        let config = test_config(&server.address().to_string());

        run_chain(&config, &tokens(&["nothing", "here"]), Vec::new()).unwrap();
        login.assert_hits(0);
    }
}

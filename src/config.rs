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

use crate::client::Scheme;
use crate::devices::DEFAULT_NOTE_AUTHOR;
use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

pub const LOCAL_CONFIG_FILE: &str = ".ucentralctl.yaml";
pub const CONFIG_DIR_ENV: &str = "UCENTRALCTL_CONFIG_DIR";

/// One scope's settings as stored on disk. Every field is optional so a local
/// file can override just what it names.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    pub username: Option<String>,
    pub password: Option<String>,
    pub security_endpoint: Option<String>,
    pub scheme: Option<Scheme>,
    pub insecure: Option<bool>,
    pub note_author: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Local,
    User,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not locate a writable config directory for the current user")]
    MissingConfigDir,
}

/// Settings after merging user, local and command-line values. Missing
/// credentials stay empty here; the session refuses to log in with them.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub username: String,
    pub password: String,
    pub security_endpoint: String,
    pub scheme: Scheme,
    pub insecure: bool,
    pub note_author: String,
}

pub fn config_path(scope: Scope, cwd: &Path) -> Result<PathBuf> {
    match scope {
        Scope::Local => Ok(cwd.join(LOCAL_CONFIG_FILE)),
        Scope::User => {
            if let Ok(custom) = env::var(CONFIG_DIR_ENV) {
                return Ok(PathBuf::from(custom).join("config.yaml"));
            }
            let base = config_dir().ok_or(ConfigError::MissingConfigDir)?;
            Ok(base.join("ucentralctl").join("config.yaml"))
        }
    }
}

pub fn load(cwd: &Path) -> Result<Config> {
    let user = load_scope(Scope::User, cwd)?;
    let local = load_scope(Scope::Local, cwd)?;
    Ok(merge(user, local))
}

pub fn load_scope(scope: Scope, cwd: &Path) -> Result<Config> {
    Ok(read_if_exists(&config_path(scope, cwd)?)?.unwrap_or_default())
}

pub fn save(scope: Scope, config: &Config, cwd: &Path) -> Result<PathBuf> {
    let path = config_path(scope, cwd)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {:?}", parent))?;
    }
    let serialized = serde_yaml::to_string(config).context("serializing config")?;
    fs::write(&path, serialized).with_context(|| format!("writing {:?}", path))?;
    Ok(path)
}

/// Merges stored scopes with `overrides`, which win over both.
pub fn resolve(cwd: &Path, overrides: Config) -> Result<EffectiveConfig> {
    let merged = merge(load(cwd)?, overrides);

    Ok(EffectiveConfig {
        username: merged.username.unwrap_or_default().trim().to_string(),
        password: merged.password.unwrap_or_default(),
        security_endpoint: merged
            .security_endpoint
            .unwrap_or_default()
            .trim()
            .to_string(),
        scheme: merged.scheme.unwrap_or_default(),
        insecure: merged.insecure.unwrap_or(false),
        note_author: merged
            .note_author
            .filter(|author| !author.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_NOTE_AUTHOR.to_string()),
    })
}

fn read_if_exists(path: &Path) -> Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
    let config = serde_yaml::from_str(&contents).with_context(|| format!("parsing {:?}", path))?;
    Ok(Some(config))
}

/// Field-wise merge where `top` wins.
pub fn merge(base: Config, top: Config) -> Config {
    Config {
        username: top.username.or(base.username),
        password: top.password.or(base.password),
        security_endpoint: top.security_endpoint.or(base.security_endpoint),
        scheme: top.scheme.or(base.scheme),
        insecure: top.insecure.or(base.insecure),
        note_author: top.note_author.or(base.note_author),
    }
}

#[cfg(test)]
pub(crate) fn test_config(security_endpoint: &str) -> EffectiveConfig {
    EffectiveConfig {
        username: "tip@ucentral.com".to_string(),
        password: "openwifi".to_string(),
        security_endpoint: security_endpoint.to_string(),
        scheme: Scheme::Http,
        insecure: false,
        note_author: DEFAULT_NOTE_AUTHOR.to_string(),
    }
}

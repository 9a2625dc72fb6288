// rhc-enable - enable rule hit count on a PCE
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

use crate::prompt::Prompter;
use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::info;

pub const DEFAULT_PROFILE_NAME: &str = "default";
const CONFIG_FILE_NAME: &str = "pce.json";

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct PceProfile {
    #[serde(skip)]
    pub name: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default)]
    pub fqdn: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub port: String,
    #[serde(default)]
    pub org_id: String,
}

/// Several PCEs in one file, keyed by name.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct ProfileFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_pce_name: Option<String>,
    pub pces: BTreeMap<String, PceProfile>,
}

/// On-disk shape: the multi-profile object when it has a `pces` key,
/// otherwise a single flat profile.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum ConfigFile {
    Profiles(ProfileFile),
    Single(PceProfile),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not locate a writable config directory for the current user")]
    MissingConfigDir,
    #[error("no PCE selected; pass --pce <name> or set default_pce_name (available: {available})")]
    NoDefaultProfile { available: String },
    #[error("{field} is required for PCE `{name}`")]
    MissingField { name: String, field: &'static str },
}

#[derive(Clone, Copy)]
enum Field {
    ApiKey,
    ApiSecret,
    Fqdn,
    Port,
    OrgId,
}

const FIELDS: [Field; 5] = [
    Field::ApiKey,
    Field::ApiSecret,
    Field::Fqdn,
    Field::Port,
    Field::OrgId,
];

impl Field {
    fn label(self) -> &'static str {
        match self {
            Field::ApiKey => "API Key",
            Field::ApiSecret => "API Secret",
            Field::Fqdn => "FQDN",
            Field::Port => "Port",
            Field::OrgId => "Org ID",
        }
    }

    fn slot(self, profile: &mut PceProfile) -> &mut String {
        match self {
            Field::ApiKey => &mut profile.api_key,
            Field::ApiSecret => &mut profile.api_secret,
            Field::Fqdn => &mut profile.fqdn,
            Field::Port => &mut profile.port,
            Field::OrgId => &mut profile.org_id,
        }
    }
}

impl PceProfile {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// `https://<fqdn>:<port>`, honouring an explicit scheme in `fqdn`.
    /// A port already present in `fqdn` wins over `port`.
    pub fn base_url(&self) -> String {
        let host = self.fqdn.trim().trim_end_matches('/');
        let base = if host.contains("://") {
            host.to_string()
        } else {
            format!("https://{host}")
        };
        if has_port(&base) {
            base
        } else {
            format!("{base}:{}", self.port.trim())
        }
    }

    /// Prompts for every empty field, leaving filled ones untouched.
    /// Returns whether anything was filled in.
    fn backfill(&mut self, prompter: &mut dyn Prompter) -> Result<bool> {
        let mut changed = false;
        for field in FIELDS {
            if !field.slot(self).trim().is_empty() {
                continue;
            }
            let value = match field {
                Field::ApiSecret => prompter.secret(field.label())?,
                _ => prompter.input(field.label())?,
            };
            if value.is_empty() {
                return Err(ConfigError::MissingField {
                    name: self.name.clone(),
                    field: field.label(),
                }
                .into());
            }
            *field.slot(self) = value;
            changed = true;
        }
        Ok(changed)
    }
}

fn has_port(url: &str) -> bool {
    let authority = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = authority.split('/').next().unwrap_or(authority);
    // Skip past an IPv6 literal such as `[::1]`.
    let tail = authority.rsplit(']').next().unwrap_or(authority);
    tail.rsplit_once(':')
        .is_some_and(|(_, port)| !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()))
}

pub fn default_config_path() -> Result<PathBuf> {
    if let Ok(custom) = env::var("RHC_ENABLE_CONFIG_DIR") {
        return Ok(PathBuf::from(custom).join(CONFIG_FILE_NAME));
    }
    let base = config_dir().ok_or(ConfigError::MissingConfigDir)?;
    Ok(base.join("rhc-enable").join(CONFIG_FILE_NAME))
}

/// Loads the profile to use for this run, creating the file or filling in
/// missing fields interactively, and persists any change.
pub fn load_or_create(
    path: &Path,
    pce: Option<&str>,
    prompter: &mut dyn Prompter,
) -> Result<PceProfile> {
    let existing = read_if_exists(path)?;
    if existing.is_none() {
        info!(path = %path.display(), "configuration file not found, please provide the PCE details");
    }

    let (file, profile, changed) = match (existing, pce) {
        (None, None) => {
            let mut profile = PceProfile::named(DEFAULT_PROFILE_NAME);
            profile.backfill(prompter)?;
            (ConfigFile::Single(profile.clone()), profile, true)
        }
        (None, Some(name)) => {
            let mut profiles = ProfileFile::default();
            let (profile, _) = select_profile(&mut profiles, Some(name), prompter)?;
            (ConfigFile::Profiles(profiles), profile, true)
        }
        (Some(ConfigFile::Single(mut profile)), None | Some(DEFAULT_PROFILE_NAME)) => {
            profile.name = DEFAULT_PROFILE_NAME.to_string();
            let changed = profile.backfill(prompter)?;
            (ConfigFile::Single(profile.clone()), profile, changed)
        }
        (Some(ConfigFile::Single(flat)), Some(name)) => {
            let mut profiles = ProfileFile {
                default_pce_name: Some(DEFAULT_PROFILE_NAME.to_string()),
                pces: BTreeMap::from([(DEFAULT_PROFILE_NAME.to_string(), flat)]),
            };
            let (profile, _) = select_profile(&mut profiles, Some(name), prompter)?;
            (ConfigFile::Profiles(profiles), profile, true)
        }
        (Some(ConfigFile::Profiles(mut profiles)), selected) => {
            let (profile, changed) = select_profile(&mut profiles, selected, prompter)?;
            (ConfigFile::Profiles(profiles), profile, changed)
        }
    };

    if changed {
        save(path, &file)?;
        info!(path = %path.display(), pce = %profile.name, "saved configuration");
    }

    Ok(profile)
}

/// Picks the named, default or only profile, adding it when missing.
fn select_profile(
    profiles: &mut ProfileFile,
    requested: Option<&str>,
    prompter: &mut dyn Prompter,
) -> Result<(PceProfile, bool)> {
    let name = match requested {
        Some(name) => name.to_string(),
        None => match &profiles.default_pce_name {
            Some(name) => name.clone(),
            None if profiles.pces.is_empty() => DEFAULT_PROFILE_NAME.to_string(),
            None if profiles.pces.len() == 1 => {
                profiles.pces.keys().next().cloned().unwrap_or_default()
            }
            None => {
                return Err(ConfigError::NoDefaultProfile {
                    available: profiles.pces.keys().cloned().collect::<Vec<_>>().join(", "),
                }
                .into());
            }
        },
    };

    let mut changed = false;
    let entry = profiles.pces.entry(name.clone()).or_insert_with(|| {
        info!(pce = %name, "adding PCE profile");
        changed = true;
        PceProfile::default()
    });
    entry.name = name.clone();
    changed |= entry.backfill(prompter)?;
    let profile = entry.clone();

    if profiles.default_pce_name.is_none() {
        profiles.default_pce_name = Some(name);
        changed = true;
    }

    Ok((profile, changed))
}

pub fn save(path: &Path, file: &ConfigFile) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| format!("creating {:?}", parent))?;
    }
    let serialized = serde_json::to_string_pretty(file).context("serializing config")?;
    fs::write(path, serialized).with_context(|| format!("writing {:?}", path))?;
    restrict_permissions(path)?;
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .with_context(|| format!("restricting permissions on {:?}", path))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

fn read_if_exists(path: &Path) -> Result<Option<ConfigFile>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
    let config = serde_json::from_str(&contents).with_context(|| format!("parsing {:?}", path))?;
    Ok(Some(config))
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Text(String),
        Number(u64),
    }

    Ok(match Port::deserialize(deserializer)? {
        Port::Text(s) => s,
        Port::Number(n) => n.to_string(),
    })
}

//! Scope types for `rule_hit_count_enabled_scopes` and resolution of user
//! input (`all`, `disable` or label values) into a desired scope list.

use crate::pce::PceApi;
use crate::prompt::Prompter;
use anyhow::Result;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct LabelRef {
    pub href: String,
    #[serde(default)]
    pub value: String,
}

/// One member of a scope (the AND-ed inner list), kept as the JSON the PCE
/// sent. Usually `{"label": {"href": ...}}` or `{"label_group": {"href": ...}}`,
/// but any other shape is carried through untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ScopeEntry(Value);

impl ScopeEntry {
    pub fn label(href: &str) -> Self {
        ScopeEntry(json!({"label": {"href": href}}))
    }

    /// Identity used for set comparison. References reduce to their href,
    /// `null`/`false` siblings are dropped and the rest is kept verbatim.
    pub fn key(&self) -> String {
        let Some(fields) = self.0.as_object() else {
            return self.0.to_string();
        };
        let mut key = Map::new();
        for (name, value) in fields {
            match value {
                Value::Null | Value::Bool(false) => {}
                Value::Object(inner) if inner.contains_key("href") => {
                    key.insert(name.clone(), json!({"href": inner["href"]}));
                }
                other => {
                    key.insert(name.clone(), other.clone());
                }
            }
        }
        Value::Object(key).to_string()
    }
}

/// `[]` disables the feature, `[[]]` enables it for all traffic, anything
/// else restricts it to the listed label sets.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FirewallScopeSettings {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub rule_hit_count_enabled_scopes: Vec<Vec<ScopeEntry>>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Vec<ScopeEntry>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Vec<ScopeEntry>>>::deserialize(deserializer)?.unwrap_or_default())
}

impl FirewallScopeSettings {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            rule_hit_count_enabled_scopes: vec![Vec::new()],
        }
    }

    pub fn labels(entries: Vec<ScopeEntry>) -> Self {
        Self {
            rule_hit_count_enabled_scopes: vec![entries],
        }
    }

    pub fn describe(&self) -> String {
        match self.rule_hit_count_enabled_scopes.as_slice() {
            [] => "disabled".to_string(),
            [only] if only.is_empty() => "all scopes".to_string(),
            scopes => format!("{} scope(s)", scopes.len()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeRequest {
    Disable,
    All,
    Labels(Vec<String>),
}

impl ScopeRequest {
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.eq_ignore_ascii_case("disable") {
            ScopeRequest::Disable
        } else if trimmed.eq_ignore_ascii_case("all") {
            ScopeRequest::All
        } else {
            ScopeRequest::Labels(vec![trimmed.to_string()])
        }
    }

    /// Values from repeated `--scope` flags. `all` and `disable` only
    /// stand alone.
    pub fn from_args(values: &[String]) -> Result<Self, ScopeError> {
        match values {
            [single] => Ok(Self::parse(single)),
            many => many
                .iter()
                .map(|value| match Self::parse(value) {
                    ScopeRequest::Labels(mut label) => Ok(label.remove(0)),
                    _ => Err(ScopeError::MixedScope {
                        value: value.trim().to_string(),
                    }),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(ScopeRequest::Labels),
        }
    }
}

#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("label `{label}` not found after {attempts} attempt(s)")]
    LabelNotFound { label: String, attempts: u32 },
    #[error("`{value}` cannot be combined with other --scope values")]
    MixedScope { value: String },
}

#[derive(Debug, Clone, Copy)]
pub struct ResolveOptions {
    /// Lookups allowed per label before giving up; 0 keeps asking forever.
    pub max_label_attempts: u32,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            max_label_attempts: 3,
        }
    }
}

pub const SCOPE_PROMPT: &str =
    "Enter label to define the scope (or 'All' to enable for all scopes, 'disable' to disable)";
const RETRY_PROMPT: &str = "Please enter a valid label";
const ANOTHER_PROMPT: &str = "Do you want to add another label?";
const NEXT_LABEL_PROMPT: &str = "Enter another label";

/// Looks `value` up in the label catalog, trimmed and case-insensitive.
pub fn resolve_label(api: &PceApi, value: &str) -> Result<Option<LabelRef>> {
    let labels: Vec<LabelRef> = api
        .client()
        .get(&api.labels_path())?
        .expect_success("fetch labels")?
        .parse("label")?;

    let wanted = value.trim();
    Ok(labels
        .into_iter()
        .find(|label| label.value.trim().to_lowercase() == wanted.to_lowercase()))
}

/// Interactive resolution starting from the answer to [`SCOPE_PROMPT`].
pub fn resolve_scope_payload(
    api: &PceApi,
    prompter: &mut dyn Prompter,
    first_input: &str,
    options: ResolveOptions,
) -> Result<FirewallScopeSettings> {
    let mut input = match ScopeRequest::parse(first_input) {
        ScopeRequest::Disable => {
            info!("disabling rule hit count for all scopes");
            return Ok(FirewallScopeSettings::disabled());
        }
        ScopeRequest::All => {
            info!("enabling rule hit count for all scopes");
            return Ok(FirewallScopeSettings::all());
        }
        ScopeRequest::Labels(mut labels) => labels.remove(0),
    };

    let mut entries = Vec::new();
    loop {
        let label = resolve_with_retries(api, prompter, input, options)?;
        let entry = ScopeEntry::label(&label.href);
        if entries.contains(&entry) {
            warn!(label = %label.value.trim(), "label already in scope, skipping");
        } else {
            info!(label = %label.value.trim(), href = %label.href, "added label to scope");
            entries.push(entry);
        }

        if !prompter.confirm(ANOTHER_PROMPT, false)? {
            break;
        }
        input = prompter.input(NEXT_LABEL_PROMPT)?;
    }

    Ok(FirewallScopeSettings::labels(entries))
}

fn resolve_with_retries(
    api: &PceApi,
    prompter: &mut dyn Prompter,
    mut input: String,
    options: ResolveOptions,
) -> Result<LabelRef> {
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        if let Some(label) = resolve_label(api, &input)? {
            return Ok(label);
        }
        warn!(label = %input, "label not found");
        if options.max_label_attempts != 0 && attempts >= options.max_label_attempts {
            return Err(ScopeError::LabelNotFound {
                label: input,
                attempts,
            }
            .into());
        }
        input = prompter.input(RETRY_PROMPT)?;
    }
}

/// Non-interactive resolution for `--scope`; an unknown label is fatal.
pub fn resolve_scope_args(api: &PceApi, values: &[String]) -> Result<FirewallScopeSettings> {
    let labels = match ScopeRequest::from_args(values)? {
        ScopeRequest::Disable => return Ok(FirewallScopeSettings::disabled()),
        ScopeRequest::All => return Ok(FirewallScopeSettings::all()),
        ScopeRequest::Labels(labels) => labels,
    };
    anyhow::ensure!(!labels.is_empty(), "no scope given");

    let mut entries = Vec::new();
    for value in labels {
        let label = resolve_label(api, &value)?.ok_or(ScopeError::LabelNotFound {
            label: value.clone(),
            attempts: 1,
        })?;
        let entry = ScopeEntry::label(&label.href);
        if !entries.contains(&entry) {
            entries.push(entry);
        }
    }
    Ok(FirewallScopeSettings::labels(entries))
}

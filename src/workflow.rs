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

//! The end-to-end run: report template, scope resolution, firewall
//! settings and provisioning, in that order. Steps are not transactional;
//! a failure after a write leaves the PCE partially updated.

use crate::firewall::{Comparison, reconcile};
use crate::pce::PceApi;
use crate::prompt::Prompter;
use crate::provision::{DEFAULT_DESCRIPTION, provision_firewall_settings};
use crate::report::ensure_report_enabled;
use crate::scope::{
    ResolveOptions, SCOPE_PROMPT, resolve_scope_args, resolve_scope_payload,
};
use anyhow::{Error, Result};
use std::fmt;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    ReportChecked,
    ScopeResolved,
    SettingsChecked,
    Reconciled,
    Skipped,
    Provisioned,
    ProvisionSkipped,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeSource {
    Interactive,
    /// Values of repeated `--scope` flags.
    Args(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProvisionPolicy {
    #[default]
    Ask,
    Always,
    Never,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub scope: ScopeSource,
    pub resolve: ResolveOptions,
    pub comparison: Comparison,
    pub provision: ProvisionPolicy,
    pub description: String,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            scope: ScopeSource::Interactive,
            resolve: ResolveOptions::default(),
            comparison: Comparison::default(),
            provision: ProvisionPolicy::default(),
            description: DEFAULT_DESCRIPTION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub report_enabled: bool,
    pub scopes_applied: bool,
    pub provisioned: bool,
}

impl RunSummary {
    fn applied_changes(&self) -> Vec<&'static str> {
        let mut changes = Vec::new();
        if self.report_enabled {
            changes.push("report template enabled");
        }
        if self.scopes_applied {
            changes.push("draft firewall settings updated");
        }
        changes
    }

    /// Notes already-issued writes on an error that aborts the run.
    fn annotate(&self, err: Error) -> Error {
        let changes = self.applied_changes();
        if changes.is_empty() {
            err
        } else {
            err.context(format!(
                "run aborted, PCE left partially updated ({})",
                changes.join(", ")
            ))
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let yes_no = |b: bool| if b { "yes" } else { "no" };
        write!(
            f,
            "report enabled: {}, scopes updated: {}, provisioned: {}",
            yes_no(self.report_enabled),
            yes_no(self.scopes_applied),
            yes_no(self.provisioned)
        )
    }
}

struct Run<'a> {
    api: &'a PceApi,
    prompter: &'a mut dyn Prompter,
    options: &'a RunOptions,
    state: RunState,
    summary: RunSummary,
}

impl Run<'_> {
    fn advance(&mut self, next: RunState) {
        debug!(from = ?self.state, to = ?next, "state transition");
        self.state = next;
    }

    fn execute(&mut self) -> Result<()> {
        self.summary.report_enabled = ensure_report_enabled(self.api)?;
        self.advance(RunState::ReportChecked);

        let desired = match &self.options.scope {
            ScopeSource::Args(values) => resolve_scope_args(self.api, values)?,
            ScopeSource::Interactive => {
                let first = self.prompter.input(SCOPE_PROMPT)?;
                resolve_scope_payload(self.api, self.prompter, &first, self.options.resolve)?
            }
        };
        self.advance(RunState::ScopeResolved);

        let applied = reconcile(self.api, &desired, self.options.comparison)?;
        self.advance(RunState::SettingsChecked);
        self.summary.scopes_applied = applied;
        if !applied {
            self.advance(RunState::Skipped);
            self.advance(RunState::Done);
            return Ok(());
        }
        self.advance(RunState::Reconciled);

        let confirmed = match self.options.provision {
            ProvisionPolicy::Always => true,
            ProvisionPolicy::Never => false,
            ProvisionPolicy::Ask => self
                .prompter
                .confirm("Do you want to proceed with provisioning changes?", true)?,
        };
        if confirmed {
            provision_firewall_settings(self.api, &self.options.description)?;
            self.summary.provisioned = true;
            self.advance(RunState::Provisioned);
        } else {
            info!("provisioning skipped, change remains in draft");
            self.advance(RunState::ProvisionSkipped);
        }

        self.advance(RunState::Done);
        Ok(())
    }
}

pub fn run(api: &PceApi, prompter: &mut dyn Prompter, options: &RunOptions) -> Result<RunSummary> {
    let mut run = Run {
        api,
        prompter,
        options,
        state: RunState::Init,
        summary: RunSummary::default(),
    };

    match run.execute() {
        Ok(()) => Ok(run.summary),
        Err(err) => {
            debug!(state = ?run.state, "run aborted");
            Err(run.summary.annotate(err))
        }
    }
}

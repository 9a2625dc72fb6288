use crate::pce::PceApi;
use crate::scope::{FirewallScopeSettings, ScopeEntry};
use anyhow::Result;
use std::collections::BTreeSet;
use tracing::info;

/// How current and desired scope lists are compared before writing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Comparison {
    /// Same number of scopes and same number of entries per scope.
    /// Two different label sets of equal size compare equal.
    Shallow,
    /// Same set of scopes, each scope compared as a set of entry keys.
    #[default]
    Exact,
}

impl Comparison {
    pub fn matches(self, current: &FirewallScopeSettings, desired: &FirewallScopeSettings) -> bool {
        let current = &current.rule_hit_count_enabled_scopes;
        let desired = &desired.rule_hit_count_enabled_scopes;
        match self {
            Comparison::Shallow => {
                current.len() == desired.len()
                    && current.iter().zip(desired).all(|(c, d)| c.len() == d.len())
            }
            Comparison::Exact => as_sets(current) == as_sets(desired),
        }
    }
}

fn as_sets(scopes: &[Vec<ScopeEntry>]) -> BTreeSet<BTreeSet<String>> {
    scopes
        .iter()
        .map(|scope| scope.iter().map(ScopeEntry::key).collect())
        .collect()
}

/// Writes `desired` to the draft firewall settings unless it already
/// matches. Returns `true` when a PUT was issued.
pub fn reconcile(
    api: &PceApi,
    desired: &FirewallScopeSettings,
    comparison: Comparison,
) -> Result<bool> {
    info!("checking current firewall settings");

    let path = api.firewall_settings_path();
    let current: FirewallScopeSettings = api
        .client()
        .get(&path)?
        .expect_success("fetch current firewall settings")?
        .parse("current firewall settings")?;

    if comparison.matches(&current, desired) {
        info!(current = %current.describe(), "rule hit count is already configured as desired, no changes necessary");
        return Ok(false);
    }

    info!(from = %current.describe(), to = %desired.describe(), "updating rule hit count scopes");
    let response = api
        .client()
        .put_json(&path, desired)?
        .expect_success("enable rule hit count")?;
    info!(status = response.status, "firewall settings updated");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ApiClient;
    use httpmock::prelude::*;
    use serde_json::json;

    const PATH: &str = "/api/v2/orgs/1/sec_policy/draft/firewall_settings";

    fn api(server: &MockServer) -> PceApi {
        PceApi::new(
            ApiClient::new(&server.base_url(), "key", "secret", false).unwrap(),
            "1",
        )
    }

    fn scopes(hrefs: &[&[&str]]) -> FirewallScopeSettings {
        FirewallScopeSettings {
            rule_hit_count_enabled_scopes: hrefs
                .iter()
                .map(|scope| scope.iter().map(|h| ScopeEntry::label(h)).collect())
                .collect(),
        }
    }

    #[test]
    fn shallow_ignores_label_identity() {
        let current = scopes(&[&["/orgs/1/labels/1"], &["/orgs/1/labels/2"]]);
        let desired = scopes(&[&["/orgs/1/labels/3"], &["/orgs/1/labels/4"]]);
        assert!(Comparison::Shallow.matches(&current, &desired));
        assert!(!Comparison::Exact.matches(&current, &desired));
    }

    #[test]
    fn exact_ignores_order() {
        let current = scopes(&[&["/a", "/b"], &["/c"]]);
        let desired = scopes(&[&["/c"], &["/b", "/a"]]);
        assert!(Comparison::Exact.matches(&current, &desired));
    }

    #[test]
    fn disabled_and_all_differ_under_both() {
        for comparison in [Comparison::Shallow, Comparison::Exact] {
            assert!(!comparison.matches(
                &FirewallScopeSettings::disabled(),
                &FirewallScopeSettings::all()
            ));
            assert!(comparison.matches(&FirewallScopeSettings::all(), &FirewallScopeSettings::all()));
        }
    }

    #[test]
    fn shallow_reconcile_skips_equal_shapes() {
        let server = MockServer::start();
        let get = server.mock(|when, then| {
            when.method(GET).path(PATH);
            then.status(200).json_body(json!({
                "href": "/orgs/1/sec_policy/draft/firewall_settings",
                "rule_hit_count_enabled_scopes": [
                    [{"label": {"href": "/orgs/1/labels/1"}}],
                    [{"label_group": {"href": "/orgs/1/sec_policy/draft/label_groups/abc"}}]
                ]
            }));
        });
        let put = server.mock(|when, then| {
            when.method(PUT).path(PATH);
            then.status(204);
        });

        let desired = scopes(&[&["/orgs/1/labels/7"], &["/orgs/1/labels/8"]]);
        assert!(!reconcile(&api(&server), &desired, Comparison::Shallow).unwrap());
        get.assert_hits(1);
        put.assert_hits(0);
    }

    #[test]
    fn exact_reconcile_writes_different_labels() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path(PATH);
            then.status(200).json_body(json!({
                "rule_hit_count_enabled_scopes": [[{"label": {"href": "/orgs/1/labels/1"}}]]
            }));
        });
        let put = server.mock(|when, then| {
            when.method(PUT).path(PATH).json_body(json!({
                "rule_hit_count_enabled_scopes": [[{"label": {"href": "/orgs/1/labels/7"}}]]
            }));
            then.status(204);
        });

        let desired = scopes(&[&["/orgs/1/labels/7"]]);
        assert!(reconcile(&api(&server), &desired, Comparison::Exact).unwrap());
        put.assert_hits(1);
    }

    #[test]
    fn missing_scopes_field_counts_as_disabled() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path(PATH);
            then.status(200).json_body(json!({"ike_authentication_type": "psk"}));
        });
        let put = server.mock(|when, then| {
            when.method(PUT).path(PATH);
            then.status(204);
        });

        let api = api(&server);
        assert!(!reconcile(&api, &FirewallScopeSettings::disabled(), Comparison::Exact).unwrap());
        put.assert_hits(0);
        assert!(reconcile(&api, &FirewallScopeSettings::all(), Comparison::Exact).unwrap());
        put.assert_hits(1);
    }

    #[test]
    fn null_scopes_compare_equal_to_disabled() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path(PATH);
            then.status(200)
                .json_body(json!({"rule_hit_count_enabled_scopes": null}));
        });
        let put = server.mock(|when, then| {
            when.method(PUT).path(PATH);
            then.status(204);
        });

        assert!(!reconcile(&api(&server), &FirewallScopeSettings::disabled(), Comparison::Exact).unwrap());
        put.assert_hits(0);
    }

    #[test]
    fn tolerates_unrecognised_scope_entries() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path(PATH);
            then.status(200).json_body(json!({
                "rule_hit_count_enabled_scopes": [
                    [{"label": {"href": "/orgs/1/labels/1"}, "exclusion": false}],
                    [{"workload": {"href": "/orgs/1/workloads/abc"}}]
                ]
            }));
        });
        let put = server.mock(|when, then| {
            when.method(PUT).path(PATH);
            then.status(204);
        });

        let api = api(&server);
        let desired = scopes(&[&["/orgs/1/labels/1"], &["/orgs/1/labels/2"]]);
        assert!(!reconcile(&api, &desired, Comparison::Shallow).unwrap());
        put.assert_hits(0);

        assert!(reconcile(&api, &desired, Comparison::Exact).unwrap());
        put.assert_hits(1);
    }

    #[test]
    fn exact_matches_label_with_default_siblings() {
        let current: FirewallScopeSettings = serde_json::from_value(json!({
            "rule_hit_count_enabled_scopes": [
                [{"label": {"href": "/orgs/1/labels/1", "value": "Web"}, "exclusion": false}]
            ]
        }))
        .unwrap();
        let desired = scopes(&[&["/orgs/1/labels/1"]]);
        assert!(Comparison::Exact.matches(&current, &desired));
    }

    #[test]
    fn failed_update_names_status_code() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path(PATH);
            then.status(200).json_body(json!({"rule_hit_count_enabled_scopes": []}));
        });
        server.mock(|when, then| {
            when.method(PUT).path(PATH);
            then.status(406).body("{\"error\":\"invalid\"}");
        });

        let err = reconcile(&api(&server), &FirewallScopeSettings::all(), Comparison::Exact)
            .unwrap_err();
        assert!(err.to_string().contains("HTTP code: 406"));
    }
}

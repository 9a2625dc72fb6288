//! Endpoint paths of the PCE REST surface this tool touches.

use crate::client::ApiClient;
use crate::config::PceProfile;
use anyhow::Result;

#[derive(Debug, Clone)]
pub struct PceApi {
    client: ApiClient,
    org_id: String,
}

impl PceApi {
    pub fn new(client: ApiClient, org_id: &str) -> Self {
        Self {
            client,
            org_id: org_id.trim().to_string(),
        }
    }

    pub fn from_profile(profile: &PceProfile, insecure: bool) -> Result<Self> {
        let client = ApiClient::new(
            &profile.base_url(),
            &profile.api_key,
            &profile.api_secret,
            insecure,
        )?;
        Ok(Self::new(client, &profile.org_id))
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn report_template_path(&self) -> String {
        format!(
            "/api/v2/orgs/{}/report_templates/rule_hit_count_report",
            self.org_id
        )
    }

    pub fn labels_path(&self) -> String {
        format!("/api/v2/orgs/{}/labels", self.org_id)
    }

    pub fn firewall_settings_path(&self) -> String {
        format!("/api/v2{}", self.firewall_settings_href())
    }

    /// Resource href as referenced from a provisioning change subset.
    pub fn firewall_settings_href(&self) -> String {
        format!("/orgs/{}/sec_policy/draft/firewall_settings", self.org_id)
    }

    pub fn sec_policy_path(&self) -> String {
        format!("/api/v2/orgs/{}/sec_policy", self.org_id)
    }
}

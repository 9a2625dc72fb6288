use crate::pce::PceApi;
use anyhow::Result;
use serde::Serialize;
use tracing::info;

pub const DEFAULT_DESCRIPTION: &str = "Enable rule hit count";

#[derive(Debug, Serialize)]
struct ProvisionRequest<'a> {
    update_description: &'a str,
    change_subset: ChangeSubset,
}

#[derive(Debug, Serialize)]
struct ChangeSubset {
    firewall_settings: Vec<ResourceRef>,
}

#[derive(Debug, Serialize)]
struct ResourceRef {
    href: String,
}

/// Provisions the draft firewall settings.
pub fn provision_firewall_settings(api: &PceApi, description: &str) -> Result<()> {
    info!("provisioning changes");

    let request = ProvisionRequest {
        update_description: description,
        change_subset: ChangeSubset {
            firewall_settings: vec![ResourceRef {
                href: api.firewall_settings_href(),
            }],
        },
    };

    let response = api
        .client()
        .post_json(&api.sec_policy_path(), &request)?
        .expect_success("provision changes")?;
    info!(status = response.status, "provisioning complete");
    Ok(())
}

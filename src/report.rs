use crate::pce::PceApi;
use anyhow::Result;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct ReportStatus {
    #[serde(default)]
    pub enabled: bool,
}

/// Enables the rule hit count report template unless it already is.
/// Returns `true` when a PUT was issued.
pub fn ensure_report_enabled(api: &PceApi) -> Result<bool> {
    info!("checking if the rule hit count report is already enabled");

    let path = api.report_template_path();
    let status: ReportStatus = api
        .client()
        .get(&path)?
        .expect_success("fetch report status")?
        .parse("report status")?;

    if status.enabled {
        info!("report is already enabled, skipping");
        return Ok(false);
    }

    info!("enabling rule hit count report");
    let response = api
        .client()
        .put_json(&path, &json!({"enabled": true}))?
        .expect_success("enable report")?;
    info!(status = response.status, "report enabled");
    Ok(true)
}

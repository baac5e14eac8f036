use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::debug;

use crate::config::MetadataConfig;

use super::{lookup_name, Instance};

/// Fetch the instance type of the machine we are running on and resolve it
/// through the static table.
///
/// Best effort by design: callers treat any error as "no instance profile"
/// and carry on with compute-unit figures degraded to NaN.
pub async fn current_instance(cfg: &MetadataConfig) -> Result<&'static Instance> {
    let timeout = if cfg.timeout.is_zero() {
        Duration::from_secs(10)
    } else {
        cfg.timeout
    };

    let http = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("building HTTP client")?;

    debug!(endpoint = %cfg.endpoint, "fetching instance type");

    let response = http
        .get(&cfg.endpoint)
        .send()
        .await
        .context("requesting instance type")?;

    let status = response.status();
    if !status.is_success() {
        bail!("unexpected status {status} from instance metadata endpoint");
    }

    let body = response.text().await.context("reading instance type")?;
    let name = body.trim();

    match lookup_name(name) {
        Some(instance) => Ok(instance),
        None => bail!("unknown instance type {name:?}"),
    }
}

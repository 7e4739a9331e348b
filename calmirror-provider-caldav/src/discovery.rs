//! Resolve the calendar collection URL from a server root.
//!
//! current-user-principal -> calendar-home-set -> calendar collections.

use anyhow::{Context, Result};
use tracing::{debug, info};
use url::Url;

use crate::client::DavClient;
use crate::config::CalDavConfig;
use crate::multistatus::{self, CalendarCollection};

const PRINCIPAL_BODY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop>
    <d:current-user-principal/>
  </d:prop>
</d:propfind>"#;

const HOME_SET_BODY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<d:propfind xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  <d:prop>
    <c:calendar-home-set/>
  </d:prop>
</d:propfind>"#;

const CALENDARS_BODY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<d:propfind xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  <d:prop>
    <d:displayname/>
    <d:resourcetype/>
  </d:prop>
</d:propfind>"#;

/// The collection URL to sync from.
pub async fn resolve_calendar_url(client: &DavClient, config: &CalDavConfig) -> Result<Url> {
    if let Some(url) = config.calendar_url() {
        return Url::parse(url).with_context(|| format!("Invalid calendar_url: {}", url));
    }

    let server = Url::parse(&config.server_url)
        .with_context(|| format!("Invalid server_url: {}", config.server_url))?;

    let response = client.propfind(&server, "0", PRINCIPAL_BODY).await?;
    let principal = multistatus::property_href(&response.body, "current-user-principal")?
        .ok_or_else(|| anyhow::anyhow!("Server did not report a current-user-principal"))?;
    let principal = response.url.join(&principal)?;
    debug!(%principal, "Found principal");

    let response = client.propfind(&principal, "0", HOME_SET_BODY).await?;
    let home = multistatus::property_href(&response.body, "calendar-home-set")?
        .ok_or_else(|| anyhow::anyhow!("No calendar home set found for this account"))?;
    let home = response.url.join(&home)?;
    debug!(%home, "Found calendar home");

    let response = client.propfind(&home, "1", CALENDARS_BODY).await?;
    let collections = multistatus::calendar_collections(&response.body)?;
    let calendar = select_calendar(&collections, config.calendar_name(), config.calendar_index)?;

    info!(
        name = calendar.display_name.as_deref().unwrap_or(""),
        href = %calendar.href,
        "Using source calendar"
    );

    Ok(response.url.join(&calendar.href)?)
}

/// Pick by display name when given, otherwise by position.
fn select_calendar<'a>(
    collections: &'a [CalendarCollection],
    name: Option<&str>,
    index: usize,
) -> Result<&'a CalendarCollection> {
    if let Some(name) = name {
        return collections
            .iter()
            .find(|c| c.display_name.as_deref() == Some(name))
            .ok_or_else(|| {
                let available: Vec<&str> = collections
                    .iter()
                    .filter_map(|c| c.display_name.as_deref())
                    .collect();
                anyhow::anyhow!(
                    "No calendar named '{}' (available: {})",
                    name,
                    available.join(", ")
                )
            });
    }

    collections.get(index).ok_or_else(|| {
        anyhow::anyhow!(
            "Calendar index {} out of range ({} calendars found)",
            index,
            collections.len()
        )
    })
}

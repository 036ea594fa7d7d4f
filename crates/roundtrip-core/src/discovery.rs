//! Target discovery from an agent listing endpoint

use crate::error::DiscoveryError;
use crate::target::Target;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

/// One entity on the listing endpoint.
#[derive(Debug, Deserialize)]
struct ListedEntity {
    name: String,
    id: Value,
}

/// Listing bodies seen in the wild: a bare array or `{ "agents": [...] }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Listing {
    Bare(Vec<ListedEntity>),
    Wrapped { agents: Vec<ListedEntity> },
}

impl Listing {
    fn into_entities(self) -> Vec<ListedEntity> {
        match self {
            Self::Bare(entities) | Self::Wrapped { agents: entities } => entities,
        }
    }
}

/// Locate the agent named `role` on `agents_url` and target its send endpoint.
///
/// # Errors
///
/// Returns a [`DiscoveryError`] if the listing is unreachable, not a
/// recognizable collection, or contains no entity with that name.
pub async fn discover_agent(
    client: &Client,
    agents_url: &str,
    role: &str,
) -> Result<Target, DiscoveryError> {
    let base = agents_url.trim_end_matches('/');
    let listing_url = format!("{}/", base);
    debug!(url = %listing_url, role, "Listing agents");

    let response = client
        .get(&listing_url)
        .send()
        .await
        .map_err(|e| DiscoveryError::Transport(e.to_string()))?;

    if !response.status().is_success() {
        return Err(DiscoveryError::Status(response.status().as_u16()));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| DiscoveryError::Transport(e.to_string()))?;

    let id = find_agent_id(&body, role)?;
    let target = Target::agent_send(format!("{}/{}/send", base, id));
    info!(role, id = %id, endpoint = %target.endpoint, "Discovered agent");

    Ok(target)
}

/// Extract the identifier of the entity named `role` from a listing body.
pub fn find_agent_id(body: &[u8], role: &str) -> Result<String, DiscoveryError> {
    let listing: Listing =
        serde_json::from_slice(body).map_err(|e| DiscoveryError::Decode(e.to_string()))?;

    let entity = listing
        .into_entities()
        .into_iter()
        .find(|entity| entity.name == role)
        .ok_or_else(|| DiscoveryError::NotFound {
            role: role.to_string(),
        })?;

    // Only a non-empty string or a number can be placed in the send path
    match entity.id {
        Value::String(id) if !id.is_empty() => Ok(id),
        Value::Number(id) => Ok(id.to_string()),
        other => Err(DiscoveryError::Decode(format!(
            "agent `{}` has unusable id {}",
            role, other
        ))),
    }
}

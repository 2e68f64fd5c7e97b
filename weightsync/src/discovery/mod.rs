mod page;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ProfileCandidate, UserIdentity};
use crate::remote::GarminConnectClient;

pub use page::discover_profiles;

/// Source of candidate profiles for the logged-in account.
#[async_trait]
pub trait IdentityDiscovery: Send + Sync {
    async fn candidates(&self) -> Result<Vec<ProfileCandidate>>;
}

enum PageSource {
    Remote(GarminConnectClient),
    Static(String),
}

/// Discovers identities by scraping the logged-in landing page.
pub struct PageIdentityDiscovery {
    source: PageSource,
}

impl PageIdentityDiscovery {
    /// Fetch the page through the Garmin client on every call.
    pub fn remote(client: GarminConnectClient) -> Self {
        Self {
            source: PageSource::Remote(client),
        }
    }

    /// Use a page captured elsewhere, e.g. saved from a browser session.
    pub fn from_page(page: impl Into<String>) -> Self {
        Self {
            source: PageSource::Static(page.into()),
        }
    }
}

#[async_trait]
impl IdentityDiscovery for PageIdentityDiscovery {
    async fn candidates(&self) -> Result<Vec<ProfileCandidate>> {
        let page = match &self.source {
            PageSource::Remote(client) => client.fetch_session_page().await?,
            PageSource::Static(page) => page.clone(),
        };

        Ok(discover_profiles(&page))
    }
}

/// Validate candidates in order, dropping the ones that fail the profile schema.
pub fn valid_identities(candidates: Vec<ProfileCandidate>) -> Vec<UserIdentity> {
    candidates
        .into_iter()
        .filter_map(|candidate| match candidate.into_identity() {
            Ok(identity) => Some(identity),
            Err(e) => {
                tracing::debug!(error = %e, "Rejected profile candidate");
                None
            }
        })
        .collect()
}

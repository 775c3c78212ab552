use anyhow::{Result, bail};

/// AniList's public GraphQL endpoint.
pub const ANILIST_ENDPOINT: &str = "https://graphql.anilist.co";

/// AniList's documented request budget.
pub const ANILIST_REQUESTS_PER_MINUTE: u32 = 90;

/// External metadata source consulted while tagging.
#[cfg_attr(test, mockall::automock)]
pub trait MetadataApi: Send {
    fn initialize(&mut self) -> Result<()>;
}

/// AniList client state: where to send queries and how many may be sent per
/// minute.
#[derive(Debug, Clone)]
pub struct AniList {
    endpoint: String,
    requests_per_minute: u32,
    initialized: bool,
}

impl AniList {
    pub fn new() -> Self {
        Self::with_endpoint(ANILIST_ENDPOINT, ANILIST_REQUESTS_PER_MINUTE)
    }

    pub fn with_endpoint(endpoint: impl Into<String>, requests_per_minute: u32) -> Self {
        Self {
            endpoint: endpoint.into(),
            requests_per_minute,
            initialized: false,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

impl Default for AniList {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataApi for AniList {
    fn initialize(&mut self) -> Result<()> {
        if !self.endpoint.starts_with("https://") {
            bail!("AniList endpoint must use https: {}", self.endpoint);
        }
        if self.requests_per_minute == 0 {
            bail!("AniList request budget must be positive");
        }

        self.initialized = true;
        tracing::info!(
            "AniList client ready ({}, {} requests/min)",
            self.endpoint,
            self.requests_per_minute
        );
        Ok(())
    }
}

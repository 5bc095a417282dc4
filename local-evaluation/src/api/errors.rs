use thiserror::Error;

/// Failures of a definitions refresh.
///
/// None of these ever reach a flag evaluation: a failed refresh keeps the previous
/// snapshot in place, and only configuration errors and malformed responses are
/// forwarded to the caller's error channel.
#[derive(Error, Debug)]
pub enum FlagError {
    #[error(
        "Your personal_api_key is invalid. Are you sure you're not using your Project API key? \
         More information: https://posthog.com/docs/api/overview"
    )]
    Unauthorized,
    #[error("unexpected status {0} when fetching flag definitions")]
    UnexpectedStatus(u16),
    #[error("failed to fetch flag definitions: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("invalid response when getting feature flags: {0}")]
    MalformedResponse(String),
    #[error("failed to build definitions client: {0}")]
    ClientBuild(String),
}

impl FlagError {
    /// A bad credential will not fix itself on the next poll.
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, FlagError::Unauthorized | FlagError::ClientBuild(_))
    }

    /// Whether the caller's error channel should hear about this failure.
    pub fn is_reportable(&self) -> bool {
        self.is_configuration_error() || matches!(self, FlagError::MalformedResponse(_))
    }

    /// Label for the refresh outcome counter.
    pub fn outcome(&self) -> &'static str {
        match self {
            FlagError::Unauthorized => "unauthorized",
            FlagError::UnexpectedStatus(_) => "unexpected_status",
            FlagError::RequestFailed(_) => "request_failed",
            FlagError::MalformedResponse(_) => "malformed",
            FlagError::ClientBuild(_) => "client_build",
        }
    }
}

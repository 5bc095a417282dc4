use std::str::FromStr;
use std::time;

use envconfig::Envconfig;
use url::Url;

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(from = "POSTHOG_HOST", default = "https://us.i.posthog.com")]
    pub host: String,

    #[envconfig(from = "POSTHOG_PROJECT_API_KEY")]
    pub project_api_key: String,

    #[envconfig(from = "POSTHOG_PERSONAL_API_KEY")]
    pub personal_api_key: String,

    #[envconfig(from = "FEATURE_FLAGS_POLLING_INTERVAL", default = "30000")]
    pub polling_interval: EnvMsDuration,

    #[envconfig(from = "FEATURE_FLAGS_REQUEST_TIMEOUT", default = "10000")]
    pub request_timeout: EnvMsDuration,
}

impl Config {
    /// The definitions endpoint for this project, cohorts included.
    pub fn local_evaluation_url(&self) -> Result<Url, url::ParseError> {
        // Joined relative to the host so a path prefix like `/posthog` survives
        let base = Url::parse(&format!("{}/", self.host.trim_end_matches('/')))?;
        let mut url = base.join("api/feature_flag/local_evaluation")?;
        url.query_pairs_mut()
            .append_pair("token", &self.project_api_key)
            .append_key_only("send_cohorts");
        Ok(url)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

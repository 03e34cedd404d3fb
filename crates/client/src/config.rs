use std::fmt::{self, Debug, Formatter};

const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/v1";

/// Builder for [`ClientConfig`].
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct ClientConfigBuilder {
    base_url: Option<String>,
    token: Option<String>,
}

impl ClientConfigBuilder {
    /// Creates a builder with the given API base URL.
    #[inline]
    pub fn with_base_url<S: Into<String>>(base_url: S) -> Self {
        Self {
            base_url: Some(base_url.into()),
            token: None,
        }
    }

    /// Sets the bearer token sent with every request.
    #[inline]
    pub fn with_token<S: Into<String>>(mut self, token: S) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Builds the configuration.
    #[inline]
    pub fn build(self) -> ClientConfig {
        let base_url = self
            .base_url
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
        ClientConfig {
            base_url: base_url.trim_end_matches('/').to_owned(),
            token: self.token,
        }
    }
}

impl Debug for ClientConfigBuilder {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfigBuilder")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<deducted>"))
            .finish()
    }
}

/// Configuration for the LAYRA HTTP client.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ClientConfig {
    pub(crate) base_url: String,
    pub(crate) token: Option<String>,
}

impl ClientConfig {
    /// Returns the API base URL, without a trailing slash.
    #[inline]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

impl Default for ClientConfig {
    #[inline]
    fn default() -> Self {
        ClientConfigBuilder::default().build()
    }
}

impl Debug for ClientConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<deducted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build() {
        let config =
            ClientConfigBuilder::with_base_url("http://layra:8000/api/v1/")
                .with_token("secret")
                .build();
        assert_eq!(config.base_url(), "http://layra:8000/api/v1");
        assert_eq!(
            config.endpoint("/sse/chat"),
            "http://layra:8000/api/v1/sse/chat"
        );
        assert!(!format!("{config:?}").contains("secret"));

        let config = ClientConfig::default();
        assert_eq!(config.base_url(), DEFAULT_BASE_URL);
        assert_eq!(config.token, None);
    }
}

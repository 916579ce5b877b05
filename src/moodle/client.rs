//! HTTP transport seam. [HttpTransport] is the blocking reqwest implementation; tests substitute a fake.

use crate::moodle::error::MoodleError;
use std::time::Duration;

const DEFAULT_USER_AGENT: &str = concat!("moodle-book-sync/", env!("CARGO_PKG_VERSION"));
pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_REDIRECTS: usize = 10;

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One request in, one response out. No retries.
pub trait Transport {
    /// POST a url-encoded form.
    fn post_form(&mut self, url: &str, form: &[(String, String)])
        -> Result<HttpResponse, MoodleError>;

    /// GET a URL.
    fn get(&mut self, url: &str) -> Result<HttpResponse, MoodleError>;
}

/// Blocking HTTP transport with a bounded request timeout.
#[derive(Debug)]
pub struct HttpTransport {
    inner: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn builder() -> HttpTransportBuilder {
        HttpTransportBuilder::default()
    }

    fn finish(
        url: &str,
        result: Result<reqwest::blocking::Response, reqwest::Error>,
    ) -> Result<HttpResponse, MoodleError> {
        let response = result.map_err(|e| transport_error(url, e))?;
        let status = response.status().as_u16();
        let body = response.text().map_err(|e| transport_error(url, e))?;
        Ok(HttpResponse { status, body })
    }
}

/// Strip the query (which may carry the token) before a URL reaches an error or log line.
pub(crate) fn redact_url(url: &str) -> String {
    url.split('?').next().unwrap_or(url).to_string()
}

fn transport_error(url: &str, e: reqwest::Error) -> MoodleError {
    let url = redact_url(url);
    if e.is_timeout() {
        MoodleError::Timeout { url }
    } else {
        MoodleError::Network {
            url,
            source: e.without_url(),
        }
    }
}

impl Transport for HttpTransport {
    fn post_form(
        &mut self,
        url: &str,
        form: &[(String, String)],
    ) -> Result<HttpResponse, MoodleError> {
        Self::finish(url, self.inner.post(url).form(form).send())
    }

    fn get(&mut self, url: &str) -> Result<HttpResponse, MoodleError> {
        Self::finish(url, self.inner.get(url).send())
    }
}

/// Builder for HttpTransport with optional User-Agent and timeout.
#[derive(Debug)]
pub struct HttpTransportBuilder {
    user_agent: Option<String>,
    timeout_secs: u64,
}

impl Default for HttpTransportBuilder {
    fn default() -> Self {
        Self {
            user_agent: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl HttpTransportBuilder {
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Set request timeout in seconds. Default 30; zero is raised to one.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs.max(1);
        self
    }

    pub fn build(self) -> Result<HttpTransport, reqwest::Error> {
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let inner = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(self.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(HttpTransport { inner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_url_drops_query() {
        assert_eq!(
            redact_url("https://m.example/webservice/pluginfile.php/1/x.html?token=secret"),
            "https://m.example/webservice/pluginfile.php/1/x.html"
        );
        assert_eq!(redact_url("https://m.example/a"), "https://m.example/a");
    }

    #[test]
    fn response_success_range() {
        let ok = HttpResponse {
            status: 204,
            body: String::new(),
        };
        let denied = HttpResponse {
            status: 403,
            body: String::new(),
        };
        assert!(ok.is_success());
        assert!(!denied.is_success());
    }

    #[test]
    fn builder_clamps_zero_timeout() {
        let b = HttpTransport::builder().timeout_secs(0);
        assert_eq!(b.timeout_secs, 1);
    }
}

//! Canned-response transport for tests. Records every request it receives.

use crate::moodle::client::{HttpResponse, Transport};
use crate::moodle::error::MoodleError;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Recorded {
    pub method: &'static str,
    pub url: String,
    pub form: Vec<(String, String)>,
}

/// Responses are keyed by wsfunction for POSTs and by URL path (query stripped) for GETs.
#[derive(Debug, Default)]
pub(crate) struct FakeTransport {
    pub requests: Vec<Recorded>,
    responses: HashMap<String, VecDeque<Result<HttpResponse, MoodleError>>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, key: &str, status: u16, body: &str) -> Self {
        self.responses
            .entry(key.to_string())
            .or_default()
            .push_back(Ok(HttpResponse {
                status,
                body: body.to_string(),
            }));
        self
    }

    pub fn fail(mut self, key: &str, err: MoodleError) -> Self {
        self.responses
            .entry(key.to_string())
            .or_default()
            .push_back(Err(err));
        self
    }

    fn next(&mut self, key: &str) -> Result<HttpResponse, MoodleError> {
        self.responses
            .get_mut(key)
            .and_then(|q| q.pop_front())
            .unwrap_or_else(|| {
                Ok(HttpResponse {
                    status: 404,
                    body: format!("no canned response for {}", key),
                })
            })
    }
}

impl Transport for FakeTransport {
    fn post_form(
        &mut self,
        url: &str,
        form: &[(String, String)],
    ) -> Result<HttpResponse, MoodleError> {
        self.requests.push(Recorded {
            method: "POST",
            url: url.to_string(),
            form: form.to_vec(),
        });
        let key = form
            .iter()
            .find(|(k, _)| k == "wsfunction")
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        self.next(&key)
    }

    fn get(&mut self, url: &str) -> Result<HttpResponse, MoodleError> {
        self.requests.push(Recorded {
            method: "GET",
            url: url.to_string(),
            form: Vec::new(),
        });
        let key = url.split('?').next().unwrap_or(url).to_string();
        self.next(&key)
    }
}

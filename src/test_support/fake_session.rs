//! In-memory [`HttpSession`] that answers from a closure and records requests.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::session::{HttpResponse, HttpSession, SessionError};

#[derive(Debug, Clone)]
pub(crate) struct FakeRequest {
    pub(crate) method: &'static str,
    pub(crate) url: String,
    pub(crate) form: Vec<(String, String)>,
}

impl FakeRequest {
    pub(crate) fn action(&self) -> Option<&str> {
        self.form
            .iter()
            .find(|(key, _)| key == "action")
            .map(|(_, value)| value.as_str())
    }
}

type Handler = Box<dyn Fn(&FakeRequest) -> Result<HttpResponse, SessionError> + Send + Sync>;

pub(crate) struct FakeSession {
    handler: Handler,
    requests: Mutex<Vec<FakeRequest>>,
}

impl FakeSession {
    pub(crate) fn new(
        handler: impl Fn(&FakeRequest) -> Result<HttpResponse, SessionError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<FakeRequest> {
        self.requests
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn count(&self, predicate: impl Fn(&FakeRequest) -> bool) -> usize {
        self.requests().iter().filter(|r| predicate(r)).count()
    }

    fn record(&self, request: FakeRequest) -> Result<HttpResponse, SessionError> {
        let response = (self.handler)(&request);
        self.requests
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(request);
        response
    }
}

pub(crate) fn ok(body: &str) -> Result<HttpResponse, SessionError> {
    Ok(HttpResponse::new(200, body.as_bytes().to_vec()))
}

pub(crate) fn status(code: u16, body: &str) -> Result<HttpResponse, SessionError> {
    Ok(HttpResponse::new(code, body.as_bytes().to_vec()))
}

#[async_trait]
impl HttpSession for FakeSession {
    async fn get(
        &self,
        url: &str,
        _headers: &[(&str, &str)],
    ) -> Result<HttpResponse, SessionError> {
        self.record(FakeRequest {
            method: "GET",
            url: url.to_string(),
            form: Vec::new(),
        })
    }

    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<HttpResponse, SessionError> {
        self.record(FakeRequest {
            method: "POST",
            url: url.to_string(),
            form: form
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        })
    }
}

use std::time::Duration;

use super::error::HealthError;
use super::Probe;

/// Injectable so a probe's behavior can be tested without a real socket,
/// mirroring the sibling agent-control's `HttpClient` seam.
pub trait HttpClient: Send {
    fn get(&self, url: &str, method: &str, timeout: Duration) -> Result<u16, String>;
}

#[derive(Default)]
pub struct UreqClient;

impl HttpClient for UreqClient {
    fn get(&self, url: &str, method: &str, timeout: Duration) -> Result<u16, String> {
        // Per the probe contract, redirects are never followed: a 3xx is
        // just another status code to compare against `expected_status`.
        let agent = ureq::AgentBuilder::new().timeout(timeout).redirects(0).build();
        let result = match method {
            "HEAD" => agent.head(url).call(),
            "POST" => agent.post(url).call(),
            _ => agent.get(url).call(),
        };
        match result {
            Ok(response) => Ok(response.status()),
            Err(ureq::Error::Status(code, _)) => Ok(code),
            Err(err) => Err(err.to_string()),
        }
    }
}

pub struct HttpProbe<C: HttpClient = UreqClient> {
    name: String,
    url: String,
    method: String,
    expected_status: u16,
    client: C,
}

impl<C: HttpClient> HttpProbe<C> {
    pub fn new(name: String, url: String, method: String, expected_status: u16, client: C) -> Self {
        Self {
            name,
            url,
            method,
            expected_status,
            client,
        }
    }
}

impl<C: HttpClient> Probe for HttpProbe<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, timeout: Duration) -> Result<(), HealthError> {
        let status = self
            .client
            .get(&self.url, &self.method, timeout)
            .map_err(|err| HealthError::Http(self.name.clone(), err))?;
        if status == self.expected_status {
            Ok(())
        } else {
            Err(HealthError::HttpStatus(self.name.clone(), status))
        }
    }
}

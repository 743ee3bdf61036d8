//! HTTP push to a pushgateway
//!
//! Uses the gateway's "add" semantics: `POST <endpoint>/metrics/job/<job>`
//! replaces series with the same names in the job's group and leaves the
//! rest of the group alone.

use super::{PushError, PushFuture, PushTransport};
use crate::exposition::{encode_text, MetricFamily, CONTENT_TYPE};
use reqwest::Url;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct HttpPushTransport {
    client: reqwest::Client,
}

impl HttpPushTransport {
    pub fn new() -> Result<Self, PushError> {
        let client = reqwest::Client::builder().build()?;
        Ok(HttpPushTransport { client })
    }

    /// Build `<endpoint>/metrics/job/<job>`, percent-encoding the job name
    pub fn push_url(endpoint: &str, job: &str) -> Result<Url, PushError> {
        let mut url = Url::parse(endpoint)
            .map_err(|e| PushError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(PushError::InvalidEndpoint(format!(
                "{}: unsupported scheme {}",
                endpoint,
                url.scheme()
            )));
        }
        url.path_segments_mut()
            .map_err(|_| PushError::InvalidEndpoint(format!("{}: cannot be a base", endpoint)))?
            .pop_if_empty()
            .push("metrics")
            .push("job")
            .push(job);
        Ok(url)
    }
}

impl PushTransport for HttpPushTransport {
    fn push<'a>(
        &'a self,
        endpoint: &'a str,
        job: &'a str,
        families: &'a [MetricFamily],
    ) -> PushFuture<'a> {
        Box::pin(async move {
            let url = Self::push_url(endpoint, job)?;
            let body = encode_text(families)?;
            debug!(url = %url, bytes = body.len(), series = families.len(), "Pushing to gateway");

            let response = self
                .client
                .post(url)
                .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
                .body(body)
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                Ok(())
            } else {
                let body = match response.text().await {
                    Ok(body) => body,
                    Err(e) => {
                        debug!(error = %e, "Could not read pushgateway response body");
                        String::new()
                    }
                };
                Err(PushError::Status {
                    status: status.as_u16(),
                    body,
                })
            }
        })
    }
}

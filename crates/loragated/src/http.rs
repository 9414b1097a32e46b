//! HTTP collector — delivers packets as POST bodies over one long-lived
//! reqwest client.
//!
//! 429 and 503 are the collector's "not ready" answers and map to
//! [`SendOutcome::Retry`]. Redirects are followed by re-issuing the POST
//! to the new location; credentials are only sent to the configured host.

use anyhow::{Context, Result};
use bytes::Bytes;
use reqwest::header::{
    HeaderValue, AUTHORIZATION, CONTENT_TYPE, LOCATION, TRANSFER_ENCODING,
};
use reqwest::{StatusCode, Url};

use loragate_core::config::CollectorConfig;
use loragate_services::{
    ResponseAccumulator, SendOutcome, Transport, TransportError, TransportEvent,
};

pub struct HttpCollector {
    client: reqwest::Client,
    url: Url,
    auth: Option<HeaderValue>,
    content_type: HeaderValue,
    max_redirects: u32,
}

impl HttpCollector {
    pub fn new(config: &CollectorConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout())
            .redirect(reqwest::redirect::Policy::none());

        if let Some(path) = &config.ca_cert_path {
            let pem = std::fs::read(path)
                .with_context(|| format!("failed to read trust anchor: {}", path.display()))?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .with_context(|| format!("invalid trust anchor: {}", path.display()))?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder.build().context("failed to build HTTP client")?;
        let url = Url::parse(&config.url)
            .with_context(|| format!("invalid collector url: {}", config.url))?;

        let auth = if config.auth_token.is_empty() {
            None
        } else {
            let mut value = HeaderValue::from_str(&format!("Basic {}", config.auth_token))
                .context("auth token is not a valid header value")?;
            value.set_sensitive(true);
            Some(value)
        };
        let content_type = HeaderValue::from_str(&config.content_type)
            .context("content type is not a valid header value")?;

        Ok(Self {
            client,
            url,
            auth,
            content_type,
            max_redirects: config.max_redirects,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn same_origin(&self, url: &Url) -> bool {
        url.scheme() == self.url.scheme()
            && url.host_str() == self.url.host_str()
            && url.port_or_known_default() == self.url.port_or_known_default()
    }
}

impl Transport for HttpCollector {
    async fn perform(
        &mut self,
        body: &Bytes,
        response: &mut ResponseAccumulator,
    ) -> Result<SendOutcome, TransportError> {
        let mut url = self.url.clone();
        let mut redirects = 0;

        loop {
            let mut request = self
                .client
                .post(url.clone())
                .header(CONTENT_TYPE, self.content_type.clone())
                .body(body.clone());
            if let Some(auth) = &self.auth {
                if self.same_origin(&url) {
                    request = request.header(AUTHORIZATION, auth.clone());
                }
            }

            let mut resp = request.send().await.map_err(request_error)?;
            response.on_event(TransportEvent::Connected)?;
            response.on_event(TransportEvent::HeaderSent)?;

            let status = resp.status();
            for (name, value) in resp.headers() {
                if let Ok(value) = value.to_str() {
                    response.on_event(TransportEvent::Header {
                        name: name.as_str(),
                        value,
                    })?;
                }
            }

            if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE
            {
                tracing::debug!(%status, "collector busy");
                return Ok(SendOutcome::Retry);
            }

            if status.is_redirection() {
                let location = resp
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned);
                if let Some(location) = location {
                    if redirects >= self.max_redirects {
                        return Err(TransportError::TooManyRedirects(redirects));
                    }
                    let next = url
                        .join(&location)
                        .map_err(|e| TransportError::Request(format!("bad redirect: {e}")))?;
                    tracing::debug!(%status, from = %url, to = %next, "following redirect");
                    response.on_event(TransportEvent::Redirect {
                        location: next.as_str(),
                    })?;
                    redirects += 1;
                    url = next;
                    continue;
                }
            }

            let chunked = resp
                .headers()
                .get(TRANSFER_ENCODING)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"));
            let content_length = resp.content_length();

            loop {
                match resp.chunk().await {
                    Ok(Some(bytes)) => response.on_event(TransportEvent::Data {
                        bytes: &bytes,
                        chunked,
                        content_length,
                    })?,
                    Ok(None) => break,
                    Err(e) => {
                        response.on_event(TransportEvent::Disconnected)?;
                        return Err(body_error(e));
                    }
                }
            }
            response.on_event(TransportEvent::Finished)?;

            return Ok(SendOutcome::Complete {
                status: status.as_u16(),
                content_length,
            });
        }
    }
}

fn request_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Request(e.to_string())
    }
}

fn body_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Body(e.to_string())
    }
}

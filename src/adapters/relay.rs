use std::pin::Pin;
use std::time::Duration;

use crate::ports::{PushRelay, RelayError, RelayRequest, RelayResponse};

/// Relay error bodies are only kept for logs; anything past this is dropped.
pub(crate) const MAX_ERROR_BODY: usize = 512;

/// Sends relay requests over a pooled reqwest client with a per-request timeout.
/// Redirects are never followed.
#[derive(Debug, Clone)]
pub struct ReqwestRelay {
    client: reqwest::Client,
}

impl ReqwestRelay {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client })
    }
}

impl PushRelay for ReqwestRelay {
    type Fut<'a>
        = Pin<Box<dyn Future<Output = Result<RelayResponse, RelayError>> + Send + 'a>>
    where
        Self: 'a;

    fn post<'a>(&'a self, request: RelayRequest) -> Self::Fut<'a> {
        Box::pin(async move {
            let RelayRequest {
                endpoint,
                headers,
                body,
            } = request;
            let mut builder = self.client.post(endpoint.as_str());
            for (name, value) in &headers {
                builder = builder.header(*name, value.as_str());
            }
            let response = builder.body(body).send().await.map_err(transport_error)?;
            let status = response.status().as_u16();
            let body = if (200..300).contains(&status) {
                String::new()
            } else {
                read_limited(response).await
            };
            Ok(RelayResponse { status, body })
        })
    }
}

async fn read_limited(mut response: reqwest::Response) -> String {
    let mut bytes = Vec::new();
    while bytes.len() < MAX_ERROR_BODY {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let take = chunk.len().min(MAX_ERROR_BODY - bytes.len());
                bytes.extend_from_slice(&chunk[..take]);
            }
            Ok(None) | Err(_) => break,
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

fn transport_error(err: reqwest::Error) -> RelayError {
    if err.is_timeout() {
        RelayError::Timeout
    } else {
        RelayError::Transport(err.to_string())
    }
}

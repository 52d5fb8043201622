use thiserror::Error;

/// One outbound delivery attempt: a POST of `body` to `endpoint`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayRequest {
    pub endpoint: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Vec<u8>,
}

impl RelayRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relay request timed out")]
    Timeout,
    #[error("relay transport error: {0}")]
    Transport(String),
}

pub trait PushRelay: Clone + Send + Sync + 'static {
    type Fut<'a>: Future<Output = Result<RelayResponse, RelayError>> + Send + 'a
    where
        Self: 'a;

    fn post<'a>(&'a self, request: RelayRequest) -> Self::Fut<'a>;
}

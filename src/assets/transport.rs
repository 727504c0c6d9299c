use std::io::Read;

use crate::foundation::error::VestureResult;

/// An opened transfer. The body is read to the end by the downloader.
pub struct TransferStream {
    pub status: u16,
    /// Length of the body, not of the whole file when resuming.
    pub content_length: Option<u64>,
    pub body: Box<dyn Read + Send>,
}

impl std::fmt::Debug for TransferStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferStream")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

impl TransferStream {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The server honoured a byte-range request.
    pub fn is_partial(&self) -> bool {
        self.status == 206
    }
}

/// Source of model bytes.
///
/// `offset > 0` asks for the remainder of a file starting at that byte. Implementations may
/// ignore it and answer with the whole file (status 200).
pub trait Transport: Send + Sync {
    fn open(&self, url: &str, offset: u64) -> VestureResult<TransferStream>;
}

#[cfg(feature = "http")]
pub use http::HttpTransport;

#[cfg(feature = "http")]
mod http {
    use reqwest::blocking::Client;
    use reqwest::header::{RANGE, USER_AGENT};

    use super::{TransferStream, Transport};
    use crate::foundation::config::AssetConfig;
    use crate::foundation::error::{VestureError, VestureResult};

    /// Blocking HTTP(S) transport with a per-request timeout.
    #[derive(Clone, Debug)]
    pub struct HttpTransport {
        client: Client,
        user_agent: String,
    }

    impl HttpTransport {
        pub fn new(config: &AssetConfig) -> VestureResult<Self> {
            let client = Client::builder()
                .timeout(config.request_timeout())
                .build()
                .map_err(|e| VestureError::transport(format!("build http client: {e}")))?;
            Ok(Self {
                client,
                user_agent: config.user_agent.clone(),
            })
        }
    }

    impl Transport for HttpTransport {
        fn open(&self, url: &str, offset: u64) -> VestureResult<TransferStream> {
            let mut req = self.client.get(url).header(USER_AGENT, &self.user_agent);
            if offset > 0 {
                req = req.header(RANGE, format!("bytes={offset}-"));
            }
            let resp = req.send().map_err(|e| {
                if e.is_timeout() {
                    VestureError::transport(format!("timed out fetching {url}"))
                } else {
                    VestureError::transport(format!("fetch {url}: {e}"))
                }
            })?;
            Ok(TransferStream {
                status: resp.status().as_u16(),
                content_length: resp.content_length(),
                body: Box::new(resp),
            })
        }
    }
}

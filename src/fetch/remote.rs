// src/fetch/remote.rs
use super::ZipSource;
use crate::error::{ItpError, ItpResult, SourceFailure};
use reqwest::blocking::Client;
use std::time::{Duration, Instant};
use tracing::{info, instrument};
use url::Url;

/// A ZIP served over HTTP. One GET per fetch, no retries.
pub struct RemoteZipSource {
    client: Client,
    url: Url,
    timeout: Duration,
}

impl RemoteZipSource {
    pub fn new(url: &str, timeout_secs: u64) -> ItpResult<Self> {
        let url = Url::parse(url)
            .map_err(|e| ItpError::Config(format!("bad url '{}': {}", url, e)))?;
        let timeout = Duration::from_secs(timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ItpError::Config(format!("building HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url,
            timeout,
        })
    }

    fn classify(&self, year: u16, err: reqwest::Error) -> ItpError {
        let url = self.url.to_string();
        let failure = if err.is_timeout() {
            SourceFailure::Timeout {
                url,
                timeout_secs: self.timeout.as_secs(),
            }
        } else if let Some(status) = err.status() {
            SourceFailure::HttpStatus {
                url,
                status: status.as_u16(),
            }
        } else {
            SourceFailure::Connection {
                url,
                message: err.to_string(),
            }
        };
        ItpError::SourceUnavailable { year, failure }
    }
}

impl ZipSource for RemoteZipSource {
    fn describe(&self) -> String {
        self.url.to_string()
    }

    #[instrument(level = "info", skip(self), fields(url = %self.url))]
    fn fetch(&self, year: u16) -> ItpResult<Vec<u8>> {
        let start = Instant::now();
        let resp = self
            .client
            .get(self.url.as_str())
            .send()
            .map_err(|e| self.classify(year, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ItpError::SourceUnavailable {
                year,
                failure: SourceFailure::HttpStatus {
                    url: self.url.to_string(),
                    status: status.as_u16(),
                },
            });
        }

        let bytes = resp.bytes().map_err(|e| self.classify(year, e))?;
        info!(bytes = bytes.len(), elapsed = ?start.elapsed(), "downloaded");
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        io::{Read, Write},
        net::TcpListener,
        thread,
    };

    /// Serve exactly one canned HTTP response on a local port.
    fn serve_once(response: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf);
                let _ = stream.write_all(&response);
            }
        });
        format!("http://{}/itp.zip", addr)
    }

    #[test]
    fn returns_body_on_success() {
        let body = b"PK-fake";
        let mut resp = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        )
        .into_bytes();
        resp.extend_from_slice(body);
        let url = serve_once(resp);

        let src = RemoteZipSource::new(&url, 5).unwrap();
        assert_eq!(src.fetch(2025).unwrap(), body.to_vec());
    }

    #[test]
    fn non_success_status_is_reported() {
        let url = serve_once(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_vec(),
        );
        let src = RemoteZipSource::new(&url, 5).unwrap();
        match src.fetch(2024).unwrap_err() {
            ItpError::SourceUnavailable {
                year: 2024,
                failure: SourceFailure::HttpStatus { status, .. },
            } => assert_eq!(status, 404),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                thread::sleep(Duration::from_secs(4));
                drop(stream);
            }
        });

        let src = RemoteZipSource::new(&format!("http://{}/itp.zip", addr), 1).unwrap();
        match src.fetch(2025).unwrap_err() {
            ItpError::SourceUnavailable {
                year: 2025,
                failure: SourceFailure::Timeout { timeout_secs, .. },
            } => assert_eq!(timeout_secs, 1),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn refused_connection_is_reported() {
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let src = RemoteZipSource::new(&format!("http://127.0.0.1:{}/x.zip", port), 5).unwrap();
        assert!(matches!(
            src.fetch(2025).unwrap_err(),
            ItpError::SourceUnavailable {
                failure: SourceFailure::Connection { .. },
                ..
            }
        ));
    }

    #[test]
    fn rejects_malformed_url() {
        assert!(matches!(
            RemoteZipSource::new("::nope", 5),
            Err(ItpError::Config(_))
        ));
    }
}

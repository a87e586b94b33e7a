//! Minimal HTTP/1.1 framing for the device
//!
//! Only what the valve contract needs: the request line, a `Content-Length`
//! header so a request body can be drained, and fixed-shape responses.

use eyre::{Context, Result};
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use tracing::debug;

/// Upper bound on request line plus headers
const MAX_HEAD_SIZE: usize = 8 * 1024;

/// Request bodies are never used; anything larger than this is not drained
const MAX_BODY_SIZE: u64 = 1024;

const METHODS: &[&str] = &["GET", "HEAD", "POST", "PUT", "DELETE", "CONNECT", "OPTIONS", "TRACE", "PATCH"];

/// The parts of a request the router looks at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub path: String,
}

/// Status codes the device ever answers with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    NotFound,
    MethodNotAllowed,
}

impl StatusCode {
    pub fn code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::NotFound => 404,
            Self::MethodNotAllowed => 405,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::NotFound => "Not Found",
            Self::MethodNotAllowed => "Method Not Allowed",
        }
    }
}

/// A complete response, written in one go before the connection is closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    pub body: Option<String>,
}

impl Response {
    pub fn empty(status: StatusCode) -> Self {
        Self { status, body: None }
    }

    pub fn json<T: Serialize>(status: StatusCode, body: &T) -> Result<Self> {
        let body = serde_json::to_string(body).context("Failed to serialize response body")?;
        Ok(Self {
            status,
            body: Some(body),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = format!("HTTP/1.1 {} {}\r\n", self.status.code(), self.status.reason());
        match &self.body {
            Some(body) => {
                out.push_str("Content-Type: application/json\r\n");
                out.push_str(&format!("Content-Length: {}\r\n", body.len()));
                out.push_str("Connection: close\r\n\r\n");
                out.push_str(body);
            }
            None => {
                out.push_str("Content-Length: 0\r\n");
                out.push_str("Connection: close\r\n\r\n");
            }
        }
        out.into_bytes()
    }
}

/// Read one request head (and drain its body, if small)
///
/// Returns `Ok(None)` when the first line is not a request line; the caller
/// answers that like an unknown route.
pub async fn read_request<R>(reader: &mut R) -> Result<Option<Request>>
where
    R: AsyncBufRead + Unpin,
{
    let mut request = None;
    let mut first_line = true;
    let mut content_length: u64 = 0;
    let mut head_size = 0;

    loop {
        let mut line = String::new();
        // A line without a newline stops at the head limit
        let remaining = (MAX_HEAD_SIZE - head_size + 1) as u64;
        let bytes_read = (&mut *reader)
            .take(remaining)
            .read_line(&mut line)
            .await
            .context("Failed to read request")?;
        head_size += bytes_read;
        if head_size > MAX_HEAD_SIZE {
            return Err(eyre::eyre!("Request head too large: {} bytes", head_size));
        }

        let trimmed = line.trim_end_matches(['\r', '\n']);
        if bytes_read == 0 || trimmed.is_empty() {
            break;
        }

        if first_line {
            first_line = false;
            request = parse_request_line(trimmed);
            debug!(line = %trimmed, parsed = request.is_some(), "read_request: request line");
            continue;
        }

        if let Some((name, value)) = trimmed.split_once(':')
            && name.trim().eq_ignore_ascii_case("content-length")
        {
            content_length = value.trim().parse().unwrap_or(0);
        }
    }

    if content_length > 0 && content_length <= MAX_BODY_SIZE {
        let mut body = Vec::new();
        reader
            .take(content_length)
            .read_to_end(&mut body)
            .await
            .context("Failed to drain request body")?;
        debug!(bytes = body.len(), "read_request: drained body");
    }

    Ok(request)
}

fn parse_request_line(line: &str) -> Option<Request> {
    let mut parts = line.split_whitespace();
    let method = parts.next()?;
    let path = parts.next()?;
    if !METHODS.contains(&method) {
        return None;
    }
    Some(Request {
        method: method.to_string(),
        path: path.to_string(),
    })
}

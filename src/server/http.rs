/// Minimal HTTP/1.1 request parsing and response writing.
///
/// One request per connection; the connection is closed after the response.
use std::collections::HashMap;
use std::io::{self, BufRead, Read, Write};
use thiserror::Error;

const MAX_HEADER_LINE: usize = 8 * 1024;
const MAX_HEADERS: usize = 100;

#[derive(Error, Debug)]
pub enum HttpError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("request body of {size} bytes exceeds the limit of {limit} bytes")]
    TooLarge { size: usize, limit: usize },
}

impl HttpError {
    pub fn status(&self) -> u16 {
        match self {
            HttpError::TooLarge { .. } => 413,
            HttpError::Io(_) | HttpError::Malformed(_) => 400,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    /// Request target with any query string removed
    pub path: String,
    /// Header names are lowercased
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

fn read_line<R: BufRead>(reader: &mut R) -> Result<String, HttpError> {
    let mut line = Vec::new();
    let read = reader
        .by_ref()
        .take(MAX_HEADER_LINE as u64 + 1)
        .read_until(b'\n', &mut line)?;
    if read == 0 {
        return Err(HttpError::Malformed("connection closed".into()));
    }
    if line.len() > MAX_HEADER_LINE {
        return Err(HttpError::Malformed("header line too long".into()));
    }
    let text = String::from_utf8(line)
        .map_err(|_| HttpError::Malformed("header is not valid UTF-8".into()))?;
    Ok(text.trim_end_matches(['\r', '\n']).to_string())
}

/// Read one request, refusing bodies larger than `max_body` before reading them
pub fn read_request<R: BufRead>(reader: &mut R, max_body: usize) -> Result<Request, HttpError> {
    let request_line = read_line(reader)?;
    let mut parts = request_line.split_whitespace();
    let (method, target) = match (parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(target), Some(version)) if version.starts_with("HTTP/1.") => {
            (method.to_string(), target)
        }
        _ => {
            return Err(HttpError::Malformed(format!(
                "bad request line: {request_line}"
            )))
        }
    };
    let path = target.split('?').next().unwrap_or(target).to_string();

    let mut headers = HashMap::new();
    loop {
        let line = read_line(reader)?;
        if line.is_empty() {
            break;
        }
        if headers.len() >= MAX_HEADERS {
            return Err(HttpError::Malformed("too many headers".into()));
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| HttpError::Malformed(format!("bad header: {line}")))?;
        headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    let length = match headers.get("content-length") {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| HttpError::Malformed(format!("bad content-length: {value}")))?,
        None => 0,
    };
    if length > max_body {
        return Err(HttpError::TooLarge {
            size: length,
            limit: max_body,
        });
    }

    let mut body = vec![0; length];
    reader.read_exact(&mut body)?;

    Ok(Request {
        method,
        path,
        headers,
        body,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
    pub content_type: &'static str,
}

impl Response {
    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self {
            status,
            body: value.to_string().into_bytes(),
            content_type: "application/json",
        }
    }

    pub fn empty(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
            content_type: "text/plain",
        }
    }

    /// Serialize with CORS headers and `Connection: close`
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write!(
            writer,
            "HTTP/1.1 {} {}\r\n\
             Content-Type: {}\r\n\
             Content-Length: {}\r\n\
             Access-Control-Allow-Origin: *\r\n\
             Access-Control-Allow-Methods: GET, PUT, POST, DELETE\r\n\
             Access-Control-Allow-Headers: Content-Type\r\n\
             Connection: close\r\n\r\n",
            self.status,
            reason_phrase(self.status),
            self.content_type,
            self.body.len()
        )?;
        writer.write_all(&self.body)?;
        writer.flush()
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(raw: &str, limit: usize) -> Result<Request, HttpError> {
        read_request(&mut Cursor::new(raw.as_bytes().to_vec()), limit)
    }

    #[test]
    fn test_reads_body_by_content_length() {
        let req = parse(
            "POST /cli?x=1 HTTP/1.1\r\nHost: a\r\nContent-Length: 4\r\n\r\nbodyEXTRA",
            1024,
        )
        .unwrap();
        assert_eq!(req.method, "POST");
        assert_eq!(req.path, "/cli");
        assert_eq!(req.header("HOST"), Some("a"));
        assert_eq!(req.body, b"body");
    }

    #[test]
    fn test_rejects_oversized_body() {
        let err = parse("POST / HTTP/1.1\r\nContent-Length: 100\r\n\r\n", 10).unwrap_err();
        assert_eq!(err.status(), 413);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(parse("hello\r\n\r\n", 10), Err(HttpError::Malformed(_))));
        assert!(matches!(
            parse("GET / HTTP/1.1\r\nno-colon\r\n\r\n", 10),
            Err(HttpError::Malformed(_))
        ));
    }

    #[test]
    fn test_response_carries_cors_headers() {
        let mut out = Vec::new();
        Response::json(200, &serde_json::json!({"ok": true}))
            .write_to(&mut out)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Access-Control-Allow-Origin: *\r\n"));
        assert!(text.contains("Access-Control-Allow-Methods: GET, PUT, POST, DELETE\r\n"));
        assert!(text.ends_with("{\"ok\":true}"));
    }
}

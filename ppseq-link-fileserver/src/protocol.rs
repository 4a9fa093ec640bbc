use std::io::{self, BufRead, Write};

pub use ppseq_core::defined::DEFAULT_PORT;
use ppseq_core::link::LinkError;

const CONTENT_LENGTH: &str = "Content-Length:";
const ERROR: &str = "Error:";

/// Operations of the file-server protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Verb {
    /// Write a file
    Put,
    /// Read a file
    Get,
    /// Delete a file
    Del,
    /// Check whether a file exists
    Exists,
    /// List files matching a pattern
    Dir,
    /// Size of a file
    Size,
}

impl Verb {
    /// The keyword on the request line.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Verb::Put => "PUT",
            Verb::Get => "GET",
            Verb::Del => "DEL",
            Verb::Exists => "EXISTS",
            Verb::Dir => "DIR",
            Verb::Size => "SIZE",
        }
    }

    fn parse(keyword: &str) -> Option<Self> {
        [
            Verb::Put,
            Verb::Get,
            Verb::Del,
            Verb::Exists,
            Verb::Dir,
            Verb::Size,
        ]
        .into_iter()
        .find(|v| v.as_str() == keyword)
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request of the file-server protocol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    /// Operation
    pub verb: Verb,
    /// Path, or pattern for [`Verb::Dir`]
    pub path: String,
    /// Content of [`Verb::Put`]
    pub data: Vec<u8>,
}

impl Request {
    /// Creates a request without content.
    #[must_use]
    pub fn new(verb: Verb, path: impl Into<String>) -> Self {
        Self {
            verb,
            path: path.into(),
            data: Vec::new(),
        }
    }

    /// Creates a `PUT` request.
    #[must_use]
    pub fn put(path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            verb: Verb::Put,
            path: path.into(),
            data: data.into(),
        }
    }

    /// Appends the wire form of the request to `buf`.
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        match self.verb {
            Verb::Put => {
                let _ = write!(
                    buf,
                    "{} {}\n{} {}\n\n",
                    self.verb,
                    self.path,
                    CONTENT_LENGTH,
                    self.data.len()
                );
                buf.extend_from_slice(&self.data);
            }
            _ => {
                let _ = write!(buf, "{} {}\n\n", self.verb, self.path);
            }
        }
    }

    /// The wire form of the request.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.data.len() + self.path.len() + 32);
        self.write_to(&mut buf);
        buf
    }
}

/// Parses the first line of a request into its verb and path.
pub fn parse_request_line(line: &str) -> Result<(Verb, String), LinkError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (keyword, path) = line.split_once(' ').unwrap_or((line, ""));
    let verb = Verb::parse(keyword)
        .ok_or_else(|| LinkError::new(format!("Unknown request: {keyword}")))?;
    if path.is_empty() {
        return Err(LinkError::new(format!("Missing path in {verb} request")));
    }
    Ok((verb, path.to_owned()))
}

/// Parses a `Content-Length` header line. Other headers are ignored.
pub fn parse_content_length(line: &str) -> Result<Option<usize>, LinkError> {
    let line = line.trim_end_matches(['\r', '\n']);
    match line.strip_prefix(CONTENT_LENGTH) {
        Some(n) => n
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| LinkError::new(format!("Invalid header: {line}"))),
        None => Ok(None),
    }
}

/// Wire form of a successful response.
#[must_use]
pub fn response(body: &[u8]) -> Vec<u8> {
    let mut buf = format!("{} {}\n\n", CONTENT_LENGTH, body.len()).into_bytes();
    buf.extend_from_slice(body);
    buf
}

/// Wire form of an error response.
#[must_use]
pub fn error_response(msg: &str) -> Vec<u8> {
    format!("{} {}\n\n", ERROR, msg.replace(['\r', '\n'], " ")).into_bytes()
}

/// Reads one response.
///
/// The outer error is a transport failure, the inner one an error reported by the server.
pub fn read_response(reader: &mut impl BufRead) -> io::Result<Result<Vec<u8>, LinkError>> {
    let mut status = String::new();
    if reader.read_line(&mut status)? == 0 {
        return Err(io::ErrorKind::UnexpectedEof.into());
    }
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        if line.trim_end_matches(['\r', '\n']).is_empty() {
            break;
        }
    }

    let status = status.trim_end_matches(['\r', '\n']);
    if let Some(msg) = status.strip_prefix(ERROR) {
        return Ok(Err(LinkError::new(msg.trim())));
    }
    let len = parse_content_length(status)
        .ok()
        .flatten()
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid response: {status}"),
            )
        })?;
    let mut body = vec![0; len];
    reader.read_exact(&mut body)?;
    Ok(Ok(body))
}

/// Body of an `EXISTS` response.
#[must_use]
pub fn encode_bool(value: bool) -> &'static [u8] {
    if value {
        b"True\n"
    } else {
        b"False\n"
    }
}

/// Parses the body of an `EXISTS` response.
pub fn decode_bool(body: &[u8]) -> Result<bool, LinkError> {
    match String::from_utf8_lossy(body).trim() {
        "True" | "1" => Ok(true),
        "False" | "0" => Ok(false),
        other => Err(LinkError::new(format!("Invalid boolean: {other:?}"))),
    }
}

/// Parses the body of a `DIR` response.
#[must_use]
pub fn decode_list(body: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(body)
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Parses the body of a `SIZE` response.
pub fn decode_size(body: &[u8]) -> Result<u64, LinkError> {
    let text = String::from_utf8_lossy(body);
    text.trim()
        .parse()
        .map_err(|_| LinkError::new(format!("Invalid size: {:?}", text.trim())))
}

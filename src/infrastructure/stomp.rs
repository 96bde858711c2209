// STOMP 1.2 frame encoding and decoding
use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("frame command is not valid UTF-8")]
    InvalidCommand,
    #[error("malformed header line {0:?}")]
    InvalidHeader(String),
    #[error("invalid content-length {0:?}")]
    InvalidContentLength(String),
    #[error("frame body is not terminated by NUL")]
    MissingTerminator,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub command: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Frame {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// First occurrence wins, as STOMP 1.2 requires for repeated headers
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// CONNECT and CONNECTED frames are exempt from header escaping
    fn escapes_headers(command: &str) -> bool {
        command != "CONNECT" && command != "CONNECTED"
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        let escape = Self::escapes_headers(&self.command);
        dst.put_slice(self.command.as_bytes());
        dst.put_u8(b'\n');
        for (key, value) in &self.headers {
            if escape {
                dst.put_slice(escape_header(key).as_bytes());
                dst.put_u8(b':');
                dst.put_slice(escape_header(value).as_bytes());
            } else {
                dst.put_slice(key.as_bytes());
                dst.put_u8(b':');
                dst.put_slice(value.as_bytes());
            }
            dst.put_u8(b'\n');
        }
        if !self.body.is_empty() && self.get("content-length").is_none() {
            dst.put_slice(format!("content-length:{}\n", self.body.len()).as_bytes());
        }
        dst.put_u8(b'\n');
        dst.put_slice(&self.body);
        dst.put_u8(0);
    }

    /// Decode one frame from the front of `src`. Returns `Ok(None)` when more
    /// bytes are needed; heart-beat EOLs in front of a frame are consumed.
    pub fn decode(src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        while src.first().is_some_and(|b| *b == b'\n' || *b == b'\r') {
            src.advance(1);
        }
        if src.is_empty() {
            return Ok(None);
        }

        let Some(header_end) = find_header_end(src) else {
            return Ok(None);
        };
        let (head_len, body_start) = header_end;

        let head = std::str::from_utf8(&src[..head_len]).map_err(|_| FrameError::InvalidCommand)?;
        let mut lines = head.split('\n').map(|line| line.strip_suffix('\r').unwrap_or(line));
        let command = lines.next().unwrap_or_default().to_string();
        let unescape = Self::escapes_headers(&command);

        let mut headers = Vec::new();
        for line in lines {
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| FrameError::InvalidHeader(line.to_string()))?;
            if unescape {
                headers.push((unescape_header(key)?, unescape_header(value)?));
            } else {
                headers.push((key.to_string(), value.to_string()));
            }
        }

        let content_length = headers
            .iter()
            .find(|(key, _)| key == "content-length")
            .map(|(_, value)| {
                value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| FrameError::InvalidContentLength(value.clone()))
            })
            .transpose()?;

        let body_len = match content_length {
            Some(len) => {
                if src.len() < body_start + len + 1 {
                    return Ok(None);
                }
                if src[body_start + len] != 0 {
                    return Err(FrameError::MissingTerminator);
                }
                len
            }
            None => match src[body_start..].iter().position(|b| *b == 0) {
                Some(len) => len,
                None => return Ok(None),
            },
        };

        src.advance(body_start);
        let body = src.split_to(body_len).freeze();
        src.advance(1);

        Ok(Some(Frame {
            command,
            headers,
            body,
        }))
    }
}

/// Locate the blank line ending the headers. Returns the length of the
/// command+headers block and the offset where the body starts.
fn find_header_end(src: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i < src.len() {
        if src[i] == b'\n' {
            if src.get(i + 1) == Some(&b'\n') {
                return Some((i, i + 2));
            }
            if src.get(i + 1) == Some(&b'\r') && src.get(i + 2) == Some(&b'\n') {
                return Some((i, i + 3));
            }
        }
        i += 1;
    }
    None
}

fn escape_header(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\r' => escaped.push_str("\\r"),
            '\n' => escaped.push_str("\\n"),
            ':' => escaped.push_str("\\c"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn unescape_header(raw: &str) -> Result<String, FrameError> {
    let mut unescaped = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            unescaped.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => unescaped.push('\\'),
            Some('r') => unescaped.push('\r'),
            Some('n') => unescaped.push('\n'),
            Some('c') => unescaped.push(':'),
            _ => return Err(FrameError::InvalidHeader(raw.to_string())),
        }
    }
    Ok(unescaped)
}

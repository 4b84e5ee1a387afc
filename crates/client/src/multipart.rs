//! `multipart/form-data` body assembly.

use crate::Result;
use futures_lite::{io::Cursor, AsyncRead, AsyncReadExt};
use niquests_http::{Body, Error, Headers};
use std::fmt::{self, Debug, Formatter};

/// One field of a multipart body.
pub struct Part {
    name: String,
    filename: Option<String>,
    content_type: Option<String>,
    headers: Headers,
    content: Body,
}

impl Debug for Part {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Part")
            .field("name", &self.name)
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .finish()
    }
}

impl Part {
    /// a text field
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filename: None,
            content_type: None,
            headers: Headers::new(),
            content: Body::from(value.into()),
        }
    }

    /// a binary field
    pub fn bytes(name: impl Into<String>, content: impl Into<Body>) -> Self {
        Self {
            name: name.into(),
            filename: None,
            content_type: None,
            headers: Headers::new(),
            content: content.into(),
        }
    }

    /// attach a filename, marking this part as a file upload
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// set this part's content type
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// declare an additional header carried in the part's head
    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.append(name, value.into());
        self
    }

    fn head(&self, boundary: &str) -> String {
        let mut head = format!("--{boundary}\r\n");
        head.push_str(&format!(
            "Content-Disposition: form-data; name=\"{}\"",
            escape(&self.name)
        ));
        if let Some(filename) = &self.filename {
            head.push_str(&format!("; filename=\"{}\"", escape(filename)));
        }
        head.push_str("\r\n");

        if let Some(content_type) = &self.content_type {
            head.push_str(&format!("Content-Type: {content_type}\r\n"));
        }

        for (name, values) in &self.headers {
            for value in values {
                head.push_str(&format!("{name}: {value}\r\n"));
            }
        }

        head.push_str("\r\n");
        head
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// A `multipart/form-data` body under construction.
#[derive(Debug, Default)]
pub struct Multipart {
    parts: Vec<Part>,
    boundary: Option<String>,
}

impl Multipart {
    /// an empty multipart body
    pub fn new() -> Self {
        Self::default()
    }

    /// honor a caller-chosen boundary instead of generating one
    pub fn with_boundary(mut self, boundary: impl Into<String>) -> Self {
        self.boundary = Some(boundary.into());
        self
    }

    /// append a part
    pub fn part(mut self, part: Part) -> Self {
        self.parts.push(part);
        self
    }

    /// append a simple text field
    pub fn field(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.part(Part::text(name, value))
    }

    /// whether any parts have been added
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Encode into a request body and its `Content-Type` value. The
    /// body has a known length exactly when every part does;
    /// otherwise it streams.
    pub fn encode(self) -> Result<(Body, String)> {
        if self.parts.is_empty() {
            return Err(Error::InvalidBody("multipart body requires at least one part"));
        }

        let boundary = self
            .boundary
            .unwrap_or_else(|| format!("{:032x}", fastrand::u128(..)));
        let content_type = format!("multipart/form-data; boundary={boundary}");

        let all_static = self.parts.iter().all(|part| !part.content.is_streaming());

        let mut total_len = Some(0u64);
        let mut readers: Vec<Box<dyn AsyncRead + Send + Sync + Unpin>> = vec![];
        let mut assembled = Vec::new();

        for part in self.parts {
            let head = part.head(&boundary);
            match (total_len, part.content.len()) {
                (Some(so_far), Some(len)) => {
                    total_len = Some(so_far + head.len() as u64 + len + 2);
                }
                _ => total_len = None,
            }

            if all_static {
                assembled.extend_from_slice(head.as_bytes());
                if let Some(bytes) = part.content.static_bytes() {
                    assembled.extend_from_slice(bytes);
                }
                assembled.extend_from_slice(b"\r\n");
            } else {
                readers.push(Box::new(Cursor::new(head.into_bytes())));
                readers.push(Box::new(part.content.into_reader()));
                readers.push(Box::new(Cursor::new(b"\r\n".to_vec())));
            }
        }

        let terminator = format!("--{boundary}--\r\n");

        if all_static {
            assembled.extend_from_slice(terminator.as_bytes());
            return Ok((Body::from(assembled), content_type));
        }

        readers.push(Box::new(Cursor::new(terminator.clone().into_bytes())));
        let total_len = total_len.map(|len| len + terminator.len() as u64);

        let mut chained: Box<dyn AsyncRead + Send + Sync + Unpin> =
            Box::new(futures_lite::io::empty());
        for reader in readers {
            chained = Box::new(chained.chain(reader));
        }

        Ok((Body::new_streaming(chained, total_len), content_type))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use futures_lite::future::block_on;

    #[test]
    fn static_encoding_round_trip() {
        let (body, content_type) = Multipart::new()
            .with_boundary("xyz")
            .field("key", "value")
            .part(
                Part::bytes("upload", &b"\x01\x02"[..])
                    .with_filename("data.bin")
                    .with_content_type("application/octet-stream"),
            )
            .encode()
            .unwrap();

        assert_eq!(content_type, "multipart/form-data; boundary=xyz");

        let bytes = block_on(body.into_bytes()).unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.starts_with("--xyz\r\nContent-Disposition: form-data; name=\"key\"\r\n\r\nvalue\r\n"));
        assert!(text.contains("name=\"upload\"; filename=\"data.bin\"\r\n"));
        assert!(text.contains("Content-Type: application/octet-stream\r\n"));
        assert!(text.ends_with("--xyz--\r\n"));
    }

    #[test]
    fn random_boundaries_are_distinct() {
        let (_, a) = Multipart::new().field("a", "1").encode().unwrap();
        let (_, b) = Multipart::new().field("a", "1").encode().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn streaming_parts_make_the_body_stream() {
        let part = Part::bytes(
            "stream",
            Body::new_streaming(Cursor::new("streamed content"), None),
        );
        let (body, _) = Multipart::new().part(part).encode().unwrap();
        assert_eq!(body.len(), None);

        let bytes = block_on(body.into_bytes()).unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("streamed content"));
    }

    #[test]
    fn per_part_headers_are_carried() {
        let (body, _) = Multipart::new()
            .with_boundary("b")
            .part(Part::text("a", "1").with_header("x-part-meta", "yes"))
            .encode()
            .unwrap();
        let bytes = block_on(body.into_bytes()).unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("x-part-meta: yes\r\n"));
    }

    #[test]
    fn known_length_when_all_parts_sized() {
        let (body, _) = Multipart::new()
            .with_boundary("b")
            .field("a", "1")
            .encode()
            .unwrap();
        let expected = block_on(body.into_bytes()).unwrap().len() as u64;

        let (body, _) = Multipart::new()
            .with_boundary("b")
            .field("a", "1")
            .encode()
            .unwrap();
        assert_eq!(body.len(), Some(expected));
    }
}

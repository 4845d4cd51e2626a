//! Plain HTTP/1.1 transport over a TCP socket.
//!
//! This is the default real transport behind a [`TransportSlot`]: good
//! enough for the local servers and plain-HTTP endpoints that whitelisted
//! calls typically reach. Responses are read whole; requests are sent with
//! `Connection: close` unless the caller set one. TLS endpoints are outside
//! its remit — the decision-service client handles those.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::debug;

use crate::errors::Error;
use crate::response::{Headers, HttpResponse};

use super::{Call, HeaderValue, Transport};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct TcpTransport {
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl TcpTransport {
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            read_timeout,
        }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT, DEFAULT_TIMEOUT)
    }
}

impl Transport for TcpTransport {
    fn open(&self, host: &str, port: u16) -> Result<Box<dyn Call>, Error> {
        let address = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Error::Simple(format!("could not resolve {host}:{port}")))?;

        let stream = TcpStream::connect_timeout(&address, self.connect_timeout)?;
        stream.set_read_timeout(Some(self.read_timeout))?;
        debug!("connected to {host}:{port}");

        Ok(Box::new(TcpCall {
            stream,
            host: host.to_string(),
            head: Vec::new(),
            body: Vec::new(),
            has_host: false,
            has_connection: false,
            has_content_length: false,
            begun: false,
            sent: false,
        }))
    }
}

struct TcpCall {
    stream: TcpStream,
    host: String,
    // Request line and headers, accumulated until finalize.
    head: Vec<u8>,
    body: Vec<u8>,
    has_host: bool,
    has_connection: bool,
    has_content_length: bool,
    begun: bool,
    sent: bool,
}

impl Call for TcpCall {
    fn begin(&mut self, method: &str, url: &str) -> Result<(), Error> {
        if self.begun {
            return Ok(());
        }
        self.head.extend_from_slice(format!("{method} {url} HTTP/1.1\r\n").as_bytes());
        self.begun = true;
        Ok(())
    }

    fn add_header(&mut self, name: &str, values: &[HeaderValue]) -> Result<(), Error> {
        if !self.begun {
            return Err(Error::Simple("header before request line".to_string()));
        }
        if name.eq_ignore_ascii_case("host") {
            self.has_host = true;
        } else if name.eq_ignore_ascii_case("connection") {
            self.has_connection = true;
        } else if name.eq_ignore_ascii_case("content-length") {
            self.has_content_length = true;
        }
        for value in values {
            self.head.extend_from_slice(format!("{name}: {}\r\n", value.as_text()).as_bytes());
        }
        Ok(())
    }

    fn add_body(&mut self, chunk: &[u8]) -> Result<(), Error> {
        self.body.extend_from_slice(chunk);
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), Error> {
        if self.sent {
            return Ok(());
        }
        if !self.begun {
            return Err(Error::Simple("finalize before request line".to_string()));
        }

        let mut message = std::mem::take(&mut self.head);
        if !self.has_host {
            message.extend_from_slice(format!("Host: {}\r\n", self.host).as_bytes());
        }
        if !self.has_connection {
            message.extend_from_slice(b"Connection: close\r\n");
        }
        if !self.body.is_empty() && !self.has_content_length {
            message.extend_from_slice(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        }
        message.extend_from_slice(b"\r\n");
        message.extend_from_slice(&self.body);

        self.stream.write_all(&message)?;
        self.stream.flush()?;
        self.sent = true;
        debug!("-> {} bytes to {}", message.len(), self.host);

        Ok(())
    }

    fn response(&mut self) -> Result<HttpResponse, Error> {
        if !self.sent {
            return Err(Error::Simple("response fetched before request was sent".to_string()));
        }

        let mut reader = BufReader::new(self.stream.try_clone()?);

        let status_line = read_line(&mut reader)?;
        let (status, reason) = parse_status_line(&status_line)?;

        let mut headers = Headers::default();
        loop {
            let line = read_line(&mut reader)?;
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                headers.append(name.trim(), value.trim());
            }
        }

        let body = match headers.get("Content-Length") {
            Some(length) => {
                let length: usize = length.parse().map_err(|_| Error::Simple(format!("bad Content-Length: {length}")))?;
                let mut body = vec![0_u8; length];
                reader.read_exact(&mut body)?;
                body
            }
            None => {
                let mut body = Vec::new();
                reader.read_to_end(&mut body)?;
                body
            }
        };

        debug!("<- {status} {reason} ({} bytes)", body.len());

        Ok(HttpResponse::from_parts(status, &reason, headers, body))
    }
}

fn read_line<R: BufRead>(reader: &mut R) -> Result<String, Error> {
    let mut line = String::new();
    reader.read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

// "HTTP/1.1 200 OK" -> (200, "OK"). The reason phrase may be empty.
fn parse_status_line(line: &str) -> Result<(u16, String), Error> {
    let mut parts = line.splitn(3, ' ');
    let _version = parts.next();
    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| Error::Simple(format!("malformed status line: {line}")))?;
    let reason = parts.next().unwrap_or("").to_string();

    Ok((status, reason))
}

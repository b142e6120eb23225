//! Instrumentation Agent Reader
//!
//! RPC client for an agent running inside the target process. The channel
//! carries newline-delimited JSON:
//!
//! ```text
//! -> {"id":1,"method":"enumerateRanges","params":["rw-"]}
//! <- {"id":1,"result":[{"base":"0x7f0000000000","size":4096,"protection":"rw-"}]}
//! -> {"id":2,"method":"readMemory","params":["0x7f0000000000",4096]}
//! <- {"id":2,"result":"<base64>"}
//! <- {"id":2,"error":{"type":"access-violation","message":"..."}}
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::debug;

use crate::{Error, MemoryReader, MemoryRegion, Protection, Result};

const ACCESS_VIOLATION: &str = "access-violation";

#[derive(Serialize)]
struct Request<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct Response {
    id: u64,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RemoteError>,
}

#[derive(Deserialize)]
struct RemoteError {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    message: String,
}

type RemoteResult = std::result::Result<Value, RemoteError>;

#[derive(Deserialize)]
struct RemoteRange {
    base: String,
    size: u64,
    protection: String,
}

/// Memory reader backed by an agent's RPC exports
pub struct AgentReader<R = BufReader<TcpStream>, W = TcpStream> {
    reader: R,
    writer: W,
    next_id: u64,
    /// Bytes of a response line not yet terminated, kept across timeouts
    pending: Vec<u8>,
}

impl AgentReader {
    /// Connect to an agent listening on `addr`
    pub fn connect<A: ToSocketAddrs>(addr: A, timeout: Option<Duration>) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(timeout)?;
        stream.set_nodelay(true)?;

        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self::from_parts(reader, stream))
    }
}

impl<R: BufRead, W: Write> AgentReader<R, W> {
    pub fn from_parts(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            next_id: 1,
            pending: Vec::new(),
        }
    }

    /// Issue one call and wait for its response
    fn call(&mut self, method: &str, params: Value) -> Result<RemoteResult> {
        let id = self.next_id;
        self.next_id += 1;

        let mut line = serde_json::to_vec(&Request { id, method, params })?;
        line.push(b'\n');
        self.writer.write_all(&line)?;
        self.writer.flush()?;

        loop {
            let raw = self.next_line()?;
            let line = String::from_utf8_lossy(&raw);
            if line.trim().is_empty() {
                continue;
            }

            let response: Response = serde_json::from_str(line.trim())?;
            if response.id != id {
                debug!("Discarding stale agent response {} (waiting for {})", response.id, id);
                continue;
            }

            return Ok(match (response.error, response.result) {
                (Some(error), _) => Err(error),
                (None, Some(result)) => Ok(result),
                (None, None) => Ok(Value::Null),
            });
        }
    }

    /// Next complete line from the agent
    ///
    /// A read error (such as a timeout) leaves the partial line buffered, so
    /// the remainder is joined to it on the next call instead of being parsed
    /// on its own.
    fn next_line(&mut self) -> Result<Vec<u8>> {
        loop {
            let read = self.reader.read_until(b'\n', &mut self.pending)?;
            if self.pending.ends_with(b"\n") {
                return Ok(std::mem::take(&mut self.pending));
            }
            if read == 0 {
                return Err(Error::Agent("connection closed by agent".to_string()));
            }
        }
    }
}

impl<R: BufRead, W: Write> MemoryReader for AgentReader<R, W> {
    fn enumerate_regions(&mut self, filter: Protection) -> Result<Vec<MemoryRegion>> {
        let result = self
            .call("enumerateRanges", json!([filter.to_string()]))?
            .map_err(|e| Error::Agent(format!("enumerateRanges failed: {}", e.message)))?;

        let ranges: Vec<RemoteRange> = serde_json::from_value(result)?;
        let mut regions = Vec::with_capacity(ranges.len());
        for range in ranges {
            let base = parse_address(&range.base)
                .ok_or_else(|| Error::Agent(format!("bad range base {:?}", range.base)))?;
            regions.push(MemoryRegion::new(base, range.size, range.protection.parse()?));
        }
        Ok(regions)
    }

    fn read_bytes(&mut self, base: u64, size: u64) -> Result<Vec<u8>> {
        let violation = |reason: String| Error::AccessViolation { base, size, reason };

        match self.call("readMemory", json!([format!("{:#x}", base), size]))? {
            Ok(Value::String(encoded)) => {
                let bytes = STANDARD
                    .decode(encoded)
                    .map_err(|e| Error::Agent(format!("bad payload at {:#x}: {}", base, e)))?;
                if bytes.len() as u64 != size {
                    return Err(Error::Agent(format!(
                        "payload size mismatch at {:#x}: expected {:#x} bytes, got {:#x}",
                        base,
                        size,
                        bytes.len()
                    )));
                }
                Ok(bytes)
            }
            Ok(Value::Null) => Err(violation("agent returned no data".to_string())),
            Ok(other) => Err(Error::Agent(format!("unexpected readMemory result: {}", other))),
            Err(e) if e.kind == ACCESS_VIOLATION => Err(violation(e.message)),
            Err(e) => Err(Error::Agent(format!("readMemory failed: {}", e.message))),
        }
    }
}

/// Parse a `0x` prefixed hex or a decimal address
pub(crate) fn parse_address(s: &str) -> Option<u64> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

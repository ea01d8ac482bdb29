//! Host gateway client
//!
//! The gateway adapter sits next to the host application and exposes
//! its scripting engine over a line-delimited JSON protocol: one
//! request envelope out, one response envelope back, strictly in
//! order. [`GatewayClient`] speaks that protocol over TCP, over the
//! stdio pipes of a spawned adapter process, or over HTTP for
//! adapters that only embed a web endpoint.
//!
//! Request envelopes are `{ "id", "op", "params" }`; responses carry
//! the same `id` and exactly one of `result` or `error`. A structured
//! `error` becomes a [`ProtocolFault`]; everything else that can go
//! wrong is an ordinary transport error.

pub mod wire;

use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::Duration;

use serde_json::{Value, json};

use crate::PROTOCOL_VERSION;
use crate::error::{GatewayError, GatewayResult, ProtocolFault};
use crate::gateway::wire::WireValue;
use crate::session::{Connector, HostInfo, HostPort, RollbackReport, UndoMode};
use crate::value::RawValue;

#[derive(Debug)]
enum Transport {
    Tcp {
        reader: BufReader<TcpStream>,
        writer: BufWriter<TcpStream>,
    },
    Process {
        child: Child,
        reader: BufReader<ChildStdout>,
        writer: BufWriter<ChildStdin>,
    },
    Http {
        client: reqwest::blocking::Client,
        url: String,
    },
}

impl Transport {
    fn round_trip(&mut self, envelope: &Value) -> GatewayResult<Value> {
        match self {
            Transport::Tcp { reader, writer } => exchange_line(envelope, reader, writer),
            Transport::Process { reader, writer, .. } => exchange_line(envelope, reader, writer),
            Transport::Http { client, url } => Ok(client
                .post(url.as_str())
                .json(envelope)
                .send()?
                .error_for_status()?
                .json()?),
        }
    }
}

fn exchange_line<R, W>(envelope: &Value, reader: &mut R, writer: &mut W) -> GatewayResult<Value>
where
    R: BufRead,
    W: Write,
{
    let mut line = serde_json::to_vec(envelope)?;
    line.push(b'\n');
    writer.write_all(&line)?;
    writer.flush()?;

    let mut reply = Vec::new();
    let read = reader.read_until(b'\n', &mut reply)?;
    if read == 0 {
        return Err(GatewayError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "gateway closed the stream",
        )));
    }
    Ok(serde_json::from_slice(&reply)?)
}

/// Synchronous client for one gateway connection. At most one request
/// is in flight at a time; every call blocks until its reply arrives.
#[derive(Debug)]
pub struct GatewayClient {
    transport: Transport,
    next_request_id: u64,
    client_name: String,
}

impl GatewayClient {
    /// Dial a TCP gateway, trying every resolved address in turn.
    pub fn connect_tcp(addr: &str, client_name: &str) -> GatewayResult<Self> {
        let mut last_err = None;
        for candidate in addr.to_socket_addrs()? {
            match TcpStream::connect(candidate) {
                Ok(stream) => {
                    let _ = stream.set_nodelay(true);
                    let reader = BufReader::new(stream.try_clone()?);
                    let writer = BufWriter::new(stream);
                    return Ok(Self::with_transport(
                        Transport::Tcp { reader, writer },
                        client_name,
                    ));
                }
                Err(err) => last_err = Some(err),
            }
        }
        Err(GatewayError::Io(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no usable address for {addr}"),
            )
        })))
    }

    /// Spawn a stdio bridge adapter and attach to its pipes. The child
    /// is killed when the client drops.
    pub fn connect_stdio(command: &[String], client_name: &str) -> GatewayResult<Self> {
        let (program, args) = command
            .split_first()
            .ok_or(GatewayError::EmptyBridgeCommand)?;
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;
        let stdout = child.stdout.take().ok_or(GatewayError::MissingStdout)?;
        let stdin = child.stdin.take().ok_or(GatewayError::MissingStdin)?;
        Ok(Self::with_transport(
            Transport::Process {
                child,
                reader: BufReader::new(stdout),
                writer: BufWriter::new(stdin),
            },
            client_name,
        ))
    }

    /// Attach to an HTTP gateway endpoint. The client carries no
    /// request timeout; host calls are allowed to take as long as the
    /// host takes.
    pub fn connect_http(url: &str, client_name: &str) -> GatewayResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(None::<Duration>)
            .build()?;
        Ok(Self::with_transport(
            Transport::Http {
                client,
                url: url.to_string(),
            },
            client_name,
        ))
    }

    fn with_transport(transport: Transport, client_name: &str) -> Self {
        Self {
            transport,
            next_request_id: 0,
            client_name: client_name.to_string(),
        }
    }

    fn call(&mut self, op: &str, params: Value) -> GatewayResult<Value> {
        self.next_request_id += 1;
        let request_id = self.next_request_id;
        let envelope = json!({ "id": request_id, "op": op, "params": params });
        let response = self.transport.round_trip(&envelope)?;

        let response_id = response.get("id").and_then(Value::as_u64).ok_or_else(|| {
            GatewayError::MalformedResponse("response envelope missing id".to_string())
        })?;
        if response_id != request_id {
            return Err(GatewayError::MalformedResponse(format!(
                "response id {response_id} does not match request id {request_id}"
            )));
        }
        if let Some(error) = response.get("error").filter(|error| !error.is_null()) {
            let fault = ProtocolFault {
                code: error.get("code").and_then(Value::as_str).map(String::from),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unspecified gateway fault")
                    .to_string(),
                details: error.get("details").cloned().unwrap_or(Value::Null),
            };
            return Err(GatewayError::Fault(fault));
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }
}

impl HostPort for GatewayClient {
    fn hello(&mut self) -> GatewayResult<HostInfo> {
        let params = json!({
            "client": self.client_name.as_str(),
            "protocol_version": PROTOCOL_VERSION,
        });
        let result = self.call("hello", params)?;
        Ok(HostInfo {
            protocol_version: required_str(&result, "protocol_version")?,
            application: required_str(&result, "application")?,
            version: required_str(&result, "version")?,
            document: result
                .get("document")
                .and_then(Value::as_str)
                .map(String::from),
        })
    }

    fn evaluate(
        &mut self,
        script: &str,
        undo_mode: UndoMode,
        undo_name: Option<&str>,
    ) -> GatewayResult<RawValue> {
        let mut params = json!({ "script": script, "undo_mode": undo_mode.as_str() });
        if let Some(name) = undo_name {
            params["undo_name"] = Value::String(name.to_string());
        }
        let result = self.call("evaluate", params)?;
        let value = result.get("value").cloned().ok_or_else(|| {
            GatewayError::MalformedResponse("evaluate result missing value".to_string())
        })?;
        let wire: WireValue = serde_json::from_value(value)?;
        Ok(wire::from_wire(&wire)?)
    }

    fn rollback(&mut self, steps: u32) -> GatewayResult<RollbackReport> {
        let result = self.call("rollback", json!({ "steps": steps }))?;
        Ok(serde_json::from_value(result)?)
    }
}

fn required_str(value: &Value, key: &str) -> GatewayResult<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| GatewayError::MalformedResponse(format!("handshake reply missing {key}")))
}

impl Drop for GatewayClient {
    fn drop(&mut self) {
        if let Transport::Process { child, .. } = &mut self.transport {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Connector dialing a TCP gateway address.
pub struct TcpConnector {
    addr: String,
    client_name: String,
}

impl TcpConnector {
    /// Connector for the given `host:port` address.
    pub fn new(addr: impl Into<String>, client_name: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            client_name: client_name.into(),
        }
    }
}

impl Connector for TcpConnector {
    fn connect(&self) -> GatewayResult<Box<dyn HostPort>> {
        Ok(Box::new(GatewayClient::connect_tcp(
            &self.addr,
            &self.client_name,
        )?))
    }

    fn describe(&self) -> String {
        format!("tcp {}", self.addr)
    }
}

/// Connector spawning a stdio bridge adapter per connection.
pub struct StdioConnector {
    command: Vec<String>,
    client_name: String,
}

impl StdioConnector {
    /// Connector for the given adapter command line.
    pub fn new(command: Vec<String>, client_name: impl Into<String>) -> Self {
        Self {
            command,
            client_name: client_name.into(),
        }
    }
}

impl Connector for StdioConnector {
    fn connect(&self) -> GatewayResult<Box<dyn HostPort>> {
        Ok(Box::new(GatewayClient::connect_stdio(
            &self.command,
            &self.client_name,
        )?))
    }

    fn describe(&self) -> String {
        format!("stdio {}", self.command.join(" "))
    }
}

/// Connector for an HTTP gateway endpoint.
pub struct HttpConnector {
    url: String,
    client_name: String,
}

impl HttpConnector {
    /// Connector for the given endpoint URL.
    pub fn new(url: impl Into<String>, client_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client_name: client_name.into(),
        }
    }
}

impl Connector for HttpConnector {
    fn connect(&self) -> GatewayResult<Box<dyn HostPort>> {
        Ok(Box::new(GatewayClient::connect_http(
            &self.url,
            &self.client_name,
        )?))
    }

    fn describe(&self) -> String {
        format!("http {}", self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn exchange_line_writes_one_line_and_parses_the_reply() {
        let envelope = json!({ "id": 1, "op": "hello", "params": {} });
        let mut reader = Cursor::new(b"{\"id\":1,\"result\":{}}\n".to_vec());
        let mut writer = Vec::new();
        let reply = exchange_line(&envelope, &mut reader, &mut writer).unwrap();
        assert_eq!(reply, json!({ "id": 1, "result": {} }));

        let written = String::from_utf8(writer).unwrap();
        assert!(written.ends_with('\n'));
        let parsed: Value = serde_json::from_str(written.trim_end()).unwrap();
        assert_eq!(parsed, envelope);
    }

    #[test]
    fn exchange_line_reports_eof_as_io_error() {
        let envelope = json!({ "id": 1, "op": "hello", "params": {} });
        let mut reader = Cursor::new(Vec::new());
        let mut writer = Vec::new();
        let err = exchange_line(&envelope, &mut reader, &mut writer).unwrap_err();
        assert!(matches!(err, GatewayError::Io(_)));
    }

    #[test]
    fn empty_bridge_command_is_rejected() {
        let err = GatewayClient::connect_stdio(&[], "galley").unwrap_err();
        assert!(matches!(err, GatewayError::EmptyBridgeCommand));
    }
}

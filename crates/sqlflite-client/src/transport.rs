//! Transport seam and the TCP/TLS transport
//!
//! [`Transport`] is the only boundary between the client and the remote
//! engine: list tables, fetch a schema, execute a plan, close. The
//! production implementation is [`TcpTransport`], a blocking socket (plain
//! or TLS via native-tls) guarded by a mutex; the protocol is strictly
//! request/response, so there is never more than one outstanding message.

use crate::protocol::{Request, Response};
use async_trait::async_trait;
use sqlflite_core::{
    ConnectionConfig, QueryPlan, Result, ResultSet, Row, SqlfliteError, TableSchema,
};
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Logical connection to the remote engine
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch the catalog's table names
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Fetch one table's schema
    async fn table_schema(&self, table: &str) -> Result<TableSchema>;

    /// Submit a plan and block until the full result (or an error) returns
    async fn execute(&self, plan: &QueryPlan) -> Result<ResultSet>;

    /// Release the connection; later calls fail
    async fn close(&self) -> Result<()>;

    /// Check if the transport has been closed
    fn is_closed(&self) -> bool;
}

trait StreamIo: Read + Write + Send {}
impl<T: Read + Write + Send> StreamIo for T {}

struct Framed {
    stream: Box<dyn StreamIo>,
    carry: Vec<u8>,
}

impl Framed {
    fn round_trip(&mut self, request: &Request) -> Result<Response> {
        let mut line = serde_json::to_vec(request)?;
        line.push(b'\n');
        self.stream.write_all(&line)?;
        self.stream.flush()?;
        self.read_response()
    }

    fn read_response(&mut self) -> Result<Response> {
        let mut chunk = [0u8; 4096];
        loop {
            if let Some(pos) = self.carry.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = self.carry.drain(..=pos).collect();
                return Ok(serde_json::from_slice(&line)?);
            }
            let n = self.stream.read(&mut chunk).map_err(map_read_error)?;
            if n == 0 {
                return Err(SqlfliteError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "engine closed the connection",
                )));
            }
            self.carry.extend_from_slice(&chunk[..n]);
        }
    }
}

fn map_read_error(e: std::io::Error) -> SqlfliteError {
    match e.kind() {
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
            SqlfliteError::Timeout("no response from engine within the configured timeout".into())
        }
        _ => SqlfliteError::Io(e),
    }
}

/// TCP transport, optionally wrapped in TLS
pub struct TcpTransport {
    framed: Mutex<Framed>,
    server_version: String,
    closed: AtomicBool,
}

impl TcpTransport {
    /// Open a socket, negotiate transport security, and perform the
    /// `Hello` handshake
    ///
    /// Unreachable hosts, rejected credentials, and protocol mismatches all
    /// surface as [`SqlfliteError::Connection`].
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        tracing::debug!(
            host = %config.host,
            port = config.port,
            encrypted = config.use_encryption,
            "connecting to sqlflite engine"
        );

        let tcp = open_socket(config)?;
        let stream: Box<dyn StreamIo> = if config.use_encryption {
            Box::new(negotiate_tls(config, tcp)?)
        } else {
            Box::new(tcp)
        };

        let mut framed = Framed {
            stream,
            carry: Vec::new(),
        };

        let hello = Request::Hello {
            username: config.username.clone(),
            password: config.password().to_string(),
        };
        let server_version = match framed.round_trip(&hello) {
            Ok(Response::HelloAck { server_version }) => server_version,
            Ok(Response::Error { kind, message }) => return Err(kind.into_error(message)),
            Ok(other) => {
                return Err(SqlfliteError::Connection(format!(
                    "protocol mismatch: unexpected handshake response {:?}",
                    other
                )));
            }
            Err(SqlfliteError::Serialization(e)) => {
                return Err(SqlfliteError::Connection(format!(
                    "protocol mismatch: {}",
                    e
                )));
            }
            Err(SqlfliteError::Io(e)) => {
                return Err(SqlfliteError::Connection(format!("handshake failed: {}", e)));
            }
            Err(other) => return Err(other),
        };

        tracing::info!(
            host = %config.host,
            port = config.port,
            server_version = %server_version,
            "sqlflite connection established"
        );

        Ok(Self {
            framed: Mutex::new(framed),
            server_version,
            closed: AtomicBool::new(false),
        })
    }

    /// Version string the engine reported during the handshake
    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    fn ensure_not_closed(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SqlfliteError::Connection("connection is closed".into()));
        }
        Ok(())
    }

    fn round_trip(&self, request: &Request) -> Result<Response> {
        let mut framed = self
            .framed
            .lock()
            .map_err(|e| SqlfliteError::Connection(format!("lock poisoned: {}", e)))?;
        framed.round_trip(request)
    }
}

fn open_socket(config: &ConnectionConfig) -> Result<TcpStream> {
    let stream = match config.timeout {
        Some(timeout) => {
            let addr = (config.host.as_str(), config.port)
                .to_socket_addrs()
                .map_err(|e| {
                    SqlfliteError::Connection(format!(
                        "cannot resolve {}:{}: {}",
                        config.host, config.port, e
                    ))
                })?
                .next()
                .ok_or_else(|| {
                    SqlfliteError::Connection(format!(
                        "cannot resolve {}:{}",
                        config.host, config.port
                    ))
                })?;
            TcpStream::connect_timeout(&addr, timeout)
        }
        None => TcpStream::connect((config.host.as_str(), config.port)),
    }
    .map_err(|e| {
        SqlfliteError::Connection(format!(
            "cannot reach {}:{}: {}",
            config.host, config.port, e
        ))
    })?;

    stream.set_read_timeout(config.timeout).ok();
    stream.set_write_timeout(config.timeout).ok();
    stream.set_nodelay(true).ok();
    Ok(stream)
}

fn negotiate_tls(
    config: &ConnectionConfig,
    tcp: TcpStream,
) -> Result<native_tls::TlsStream<TcpStream>> {
    let mut builder = native_tls::TlsConnector::builder();
    if !config.verify_certificate {
        tracing::warn!(
            host = %config.host,
            "certificate verification disabled; accepting any server certificate"
        );
        builder.danger_accept_invalid_certs(true);
        builder.danger_accept_invalid_hostnames(true);
    }
    let connector = builder
        .build()
        .map_err(|e| SqlfliteError::Connection(format!("failed to build TLS connector: {}", e)))?;

    connector
        .connect(&config.host, tcp)
        .map_err(|e| SqlfliteError::Connection(format!("TLS negotiation failed: {}", e)))
}

#[async_trait]
impl Transport for TcpTransport {
    async fn list_tables(&self) -> Result<Vec<String>> {
        self.ensure_not_closed()?;
        match self.round_trip(&Request::ListTables).map_err(io_to_connection)? {
            Response::Tables { names } => Ok(names),
            Response::Error { kind, message } => Err(kind.into_error(message)),
            other => Err(unexpected(other)),
        }
    }

    async fn table_schema(&self, table: &str) -> Result<TableSchema> {
        self.ensure_not_closed()?;
        let request = Request::GetSchema {
            table: table.to_string(),
        };
        match self.round_trip(&request).map_err(io_to_connection)? {
            Response::Schema { schema } => Ok(schema),
            Response::Error { kind, message } => Err(kind.into_error(message)),
            other => Err(unexpected(other)),
        }
    }

    async fn execute(&self, plan: &QueryPlan) -> Result<ResultSet> {
        self.ensure_not_closed()?;
        let start = std::time::Instant::now();
        let request = Request::Execute { plan: plan.clone() };

        // A dropped connection mid-query is an execution failure, not a
        // connect-time failure.
        let response = self.round_trip(&request).map_err(|e| match e {
            SqlfliteError::Io(err) => {
                SqlfliteError::Execution(format!("connection lost during query: {}", err))
            }
            other => other,
        })?;

        match response {
            Response::Result {
                columns,
                rows,
                execution_time_ms,
                warnings,
            } => {
                tracing::debug!(
                    row_count = rows.len(),
                    remote_ms = execution_time_ms,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "query completed"
                );
                let mut result =
                    ResultSet::new(columns, rows.into_iter().map(Row::new).collect());
                result.execution_time_ms = execution_time_ms;
                result.warnings = warnings;
                Ok(result)
            }
            Response::Error { kind, message } => Err(kind.into_error(message)),
            other => Err(unexpected(other)),
        }
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        // Best-effort goodbye; the socket is released either way.
        if let Ok(mut framed) = self.framed.lock() {
            let mut line = serde_json::to_vec(&Request::Goodbye).unwrap_or_default();
            line.push(b'\n');
            let _ = framed.stream.write_all(&line);
            let _ = framed.stream.flush();
        }
        tracing::debug!("sqlflite connection closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("server_version", &self.server_version)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

fn io_to_connection(e: SqlfliteError) -> SqlfliteError {
    match e {
        SqlfliteError::Io(err) => SqlfliteError::Connection(format!("connection lost: {}", err)),
        other => other,
    }
}

fn unexpected(response: Response) -> SqlfliteError {
    SqlfliteError::Connection(format!(
        "protocol mismatch: unexpected response {:?}",
        response
    ))
}

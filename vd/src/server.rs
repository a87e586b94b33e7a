//! Device accept loop
//!
//! One connection is handled to completion before the next is accepted; the
//! valve is owned by the loop and returned when it shuts down.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use eyre::{Context, Result};
use serde::Serialize;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::http::{Request, Response, StatusCode, read_request};
use crate::routes::{Dispatch, Route, resolve};
use crate::valve::{Valve, ValveState};

/// How long a client may take to deliver its request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct StatusBody {
    status: ValveState,
}

/// The valve device: a listener plus the valve it controls
pub struct DeviceServer {
    listener: TcpListener,
    valve: Valve,
}

impl DeviceServer {
    /// Bind the device to an address with a closed valve
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.context("Failed to bind device listener")?;
        Ok(Self {
            listener,
            valve: Valve::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().context("Failed to read listener address")
    }

    /// Serve until `shutdown` resolves, then hand the valve back
    pub async fn serve<F>(mut self, shutdown: F) -> Result<Valve>
    where
        F: Future<Output = ()>,
    {
        info!(addr = ?self.listener.local_addr().ok(), "device listening");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("device shutting down");
                    break;
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!(%peer, "serve: client connected");
                            if let Err(e) = handle_connection(stream, &mut self.valve).await {
                                warn!(%peer, error = %e, "connection failed");
                            }
                        }
                        Err(e) => warn!(error = %e, "accept failed"),
                    }
                }
            }
        }

        Ok(self.valve)
    }
}

/// Read one request, apply it to the valve and write the response
pub async fn handle_connection(mut stream: TcpStream, valve: &mut Valve) -> Result<()> {
    let request = {
        let mut reader = BufReader::new(&mut stream);
        tokio::time::timeout(REQUEST_TIMEOUT, read_request(&mut reader))
            .await
            .context("Request timeout")??
    };

    let response = dispatch(request.as_ref(), valve)?;
    debug!(?request, status = response.status.code(), "handle_connection: responding");

    stream
        .write_all(&response.to_bytes())
        .await
        .context("Failed to write response")?;
    stream.flush().await.context("Failed to flush response")?;
    stream.shutdown().await.context("Failed to close connection")?;
    Ok(())
}

/// Route a parsed request to its handler
pub fn dispatch(request: Option<&Request>, valve: &mut Valve) -> Result<Response> {
    let Some(request) = request else {
        return Ok(Response::empty(StatusCode::NotFound));
    };

    match resolve(&request.method, &request.path) {
        Dispatch::NotFound => Ok(Response::empty(StatusCode::NotFound)),
        Dispatch::MethodNotAllowed => Ok(Response::empty(StatusCode::MethodNotAllowed)),
        Dispatch::Handler(Route::Status) => Response::json(StatusCode::Ok, &StatusBody { status: valve.state() }),
        Dispatch::Handler(Route::Open) => {
            valve.open();
            Ok(Response::empty(StatusCode::Ok))
        }
        Dispatch::Handler(Route::Close) => {
            valve.close();
            Ok(Response::empty(StatusCode::Ok))
        }
    }
}

/// A device running on a background task
pub struct DeviceHandle {
    addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<Result<Valve>>,
}

impl DeviceHandle {
    /// Address clients should connect to
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop the device and return its valve
    pub async fn shutdown(self) -> Result<Valve> {
        // The task may already have exited; its result is reported below.
        let _ = self.shutdown_tx.send(());
        self.task.await.context("Device task panicked")?
    }
}

/// Bind and serve a device on a background task
pub async fn spawn_device<A: ToSocketAddrs>(addr: A) -> Result<DeviceHandle> {
    let server = DeviceServer::bind(addr).await?;
    let addr = server.local_addr()?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(server.serve(async move {
        let _ = shutdown_rx.await;
    }));

    Ok(DeviceHandle {
        addr,
        shutdown_tx,
        task,
    })
}

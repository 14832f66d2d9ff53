//! TCP front end of the dispatcher.
//!
//! One accept loop hands each connection to its own task. Every request line
//! is handled under the store lock, held across the whole transition sequence
//! so no intermediate state is visible to other connections or the periodic
//! tasks. A `host` connection stays open as the liveness token for the CPUs
//! it holds; everything else is answered and closed.

pub mod request;

use std::net::Ipv4Addr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::config::DispatcherConfig;
use crate::error::Result;
use crate::hosts_file::HostsInfoFile;
use crate::inventory::{ClientId, HostState, SharedInventory};
use crate::server::request::Request;

/// Longest request line we will read, terminator included.
pub const MAX_LINE: usize = 1024;

pub struct Dispatcher {
    config: DispatcherConfig,
    store: SharedInventory,
    hosts_file: Arc<HostsInfoFile>,
    shutdown: CancellationToken,
}

impl Dispatcher {
    pub fn new(
        config: DispatcherConfig,
        store: SharedInventory,
        hosts_file: Arc<HostsInfoFile>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            store,
            hosts_file,
            shutdown,
        }
    }

    /// Bind the listening socket and serve until shutdown. Connection ids are
    /// handed out monotonically; they key CPU assignments to their owning
    /// connection.
    pub async fn run(self) -> Result<()> {
        let listener =
            TcpListener::bind((Ipv4Addr::UNSPECIFIED, self.config.port)).await?;
        tracing::info!(port = self.config.port, "Listening for requests");

        let mut next_client: ClientId = 0;
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Dispatcher shutting down");
                    break;
                }
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::warn!(error = %e, "Accept failed");
                            continue;
                        }
                    };
                    next_client += 1;
                    let client_id = next_client;
                    tracing::debug!(peer = %peer, client_id, "Connection accepted");
                    let store = self.store.clone();
                    let hosts_file = self.hosts_file.clone();
                    tokio::spawn(async move {
                        handle_connection(stream, client_id, store, hosts_file).await;
                    });
                }
            }
        }
        Ok(())
    }
}

/// Serve one connection, then release whatever it still holds. The release is
/// unconditional and a no-op for connections that held nothing.
async fn handle_connection(
    stream: TcpStream,
    client_id: ClientId,
    store: SharedInventory,
    hosts_file: Arc<HostsInfoFile>,
) {
    if let Err(e) = serve_connection(stream, client_id, &store, &hosts_file).await {
        tracing::debug!(client_id, error = %e, "Connection error");
    }
    let released = store.lock().await.release_client(client_id);
    if released > 0 {
        tracing::info!(client_id, released, "Released CPUs on disconnect");
    }
}

async fn serve_connection(
    stream: TcpStream,
    client_id: ClientId,
    store: &SharedInventory,
    hosts_file: &HostsInfoFile,
) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        line.clear();
        let n = read_request_line(&mut reader, &mut line).await?;
        if n == 0 {
            // EOF: for host connections this is the release trigger.
            return Ok(());
        }
        let request = match Request::parse(line.trim_end()) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(client_id, error = %e, "Bad request, closing");
                return Ok(());
            }
        };
        match request {
            Request::Host => handle_host(client_id, store, &mut write_half).await?,
            Request::Load {
                host,
                ld1,
                ld5,
                ld10,
            } => {
                handle_load(host, ld1, ld5, ld10, store, hosts_file).await;
                return Ok(());
            }
            Request::Status { host, up, .. } => {
                handle_status(host, up, store, hosts_file).await;
                return Ok(());
            }
            Request::Monitor => {
                let snapshot = store.lock().await.serialize();
                write_half.write_all(snapshot.as_bytes()).await?;
                return Ok(());
            }
        }
    }
}

/// Hand out the best available CPU, or `0.0.0.0` when the pool is empty (an
/// empty pool is not recorded as an assignment). The connection stays open
/// either way; further `host` lines stack additional assignments.
async fn handle_host(
    client_id: ClientId,
    store: &SharedInventory,
    write_half: &mut OwnedWriteHalf,
) -> Result<()> {
    let cpu = {
        let mut inventory = store.lock().await;
        match inventory.best_avail_cpu() {
            Some(cpu) => {
                inventory.assign(cpu, client_id);
                cpu
            }
            None => {
                tracing::info!(client_id, "No CPU available");
                Ipv4Addr::UNSPECIFIED
            }
        }
    };
    write_half.write_all(format!("{}\n", cpu).as_bytes()).await?;
    Ok(())
}

/// Worker heartbeat: create the host on first sight, revive it unless an
/// operator marked it down, then reclassify from the new load averages.
async fn handle_load(
    host: Ipv4Addr,
    ld1: f32,
    ld5: f32,
    ld10: f32,
    store: &SharedInventory,
    hosts_file: &HostsInfoFile,
) {
    let declared = hosts_file.declared(host);
    let mut inventory = store.lock().await;
    if !inventory.contains(host) {
        let (num_cpus, power_index) = declared;
        inventory.add_host(host, num_cpus, power_index);
    }
    if inventory.get(host).map(|h| h.state) != Some(HostState::Unavailable) {
        inventory.set_available(host);
    }
    inventory.update_load(host, ld1, ld5, ld10);
    if tracing::enabled!(tracing::Level::DEBUG) {
        inventory.dump();
    }
}

async fn handle_status(
    host: Ipv4Addr,
    up: bool,
    store: &SharedInventory,
    hosts_file: &HostsInfoFile,
) {
    let declared = hosts_file.declared(host);
    let mut inventory = store.lock().await;
    if up {
        if inventory.contains(host) {
            inventory.set_available(host);
        } else {
            let (num_cpus, power_index) = declared;
            inventory.add_host(host, num_cpus, power_index);
        }
    } else {
        match inventory.host(host) {
            Ok(_) => inventory.set_unavailable(host),
            Err(e) => tracing::warn!(error = %e, "Dropping status-down request"),
        }
    }
    if tracing::enabled!(tracing::Level::DEBUG) {
        inventory.dump();
    }
}

/// Read one `\n`-terminated line of at most [`MAX_LINE`] bytes. Returns the
/// byte count, `0` at EOF. An overlong line is an error and closes the
/// connection.
async fn read_request_line(
    reader: &mut BufReader<OwnedReadHalf>,
    line: &mut String,
) -> Result<usize> {
    let mut limited = reader.take(MAX_LINE as u64);
    let n = limited.read_line(line).await?;
    if n == MAX_LINE && !line.ends_with('\n') {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "request line exceeds maximum length",
        )
        .into());
    }
    Ok(n)
}

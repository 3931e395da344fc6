use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{TcpListener, UnixListener, UnixStream};
use tokio::sync::broadcast;

use orp_core::{config, BusRequest, BusResponse, Settings};
use orp_resolver::Resolver;

use crate::bus::{self, BusHandle, BUS_CAPACITY};
use crate::error::{io_err, InterceptorError};
use crate::first_run;
use crate::gateway::{self, Gateway};
use crate::paths::{run_dir, socket_path, state_dir};

/// Start the Interceptor and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), InterceptorError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Load settings for `home`, bind the gateway and run until shutdown.
pub async fn run(home: PathBuf) -> Result<(), InterceptorError> {
    let settings = config::load_at(&home)?;
    let listen = settings.gateway.listen;
    let listener = TcpListener::bind(listen)
        .await
        .map_err(|e| io_err(format!("gateway {listen}"), e))?;
    let resolver = Arc::new(Resolver::new(&settings));
    run_with(home, &settings, resolver, listener).await
}

/// Run with an already built resolver and gateway listener.
pub async fn run_with(
    home: PathBuf,
    settings: &Settings,
    resolver: Arc<Resolver>,
    listener: TcpListener,
) -> Result<(), InterceptorError> {
    tracing::info!(phase = "init", home = %home.display(), "interceptor starting");
    ensure_runtime_dirs(&home)?;

    let addr = listener
        .local_addr()
        .map_err(|e| io_err("gateway listener", e))?;
    let gateway = Gateway::for_addr(Arc::clone(&resolver), addr);

    if first_run::claim(&home)? {
        tracing::info!(url = %gateway.welcome_url(), "first run, welcome page available");
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    let (bus_handle, bus_rx) = BusHandle::channel(BUS_CAPACITY);

    let sweep_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown.subscribe();
        let resolver = Arc::clone(&resolver);
        let period = settings.cache.sweep_interval();
        tokio::spawn(async move {
            sweep_task(resolver, period, shutdown_rx).await;
            let _ = shutdown.send(());
            Ok(())
        })
    };

    let bus_task = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown.subscribe();
        let resolver = Arc::clone(&resolver);
        tokio::spawn(async move {
            bus::serve(resolver, bus_rx, shutdown_rx).await;
            let _ = shutdown.send(());
            Ok(())
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown.subscribe();
        let home = home.clone();
        let bus_handle = bus_handle.clone();
        tokio::spawn(async move {
            let result = socket_server_task(home, bus_handle, shutdown.clone(), shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let gateway_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = gateway::serve(gateway, listener, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let detect_handle = {
        let mut shutdown_rx = shutdown_tx.subscribe();
        let resolver = Arc::clone(&resolver);
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => {}
                present = resolver.daemon_present() => {
                    if present {
                        tracing::info!("resolution daemon detected");
                    } else {
                        tracing::warn!("resolution daemon not detected, fallback probing will be used");
                    }
                }
            }
            Ok(())
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down interceptor");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(InterceptorError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    tracing::info!(phase = "running", gateway = %addr, "interceptor ready");

    let (sweep_result, bus_result, socket_result, gateway_result, detect_result, signal_result) = tokio::join!(
        sweep_handle,
        bus_task,
        socket_handle,
        gateway_handle,
        detect_handle,
        signal_handle
    );

    // The bus handle outlives the bus task only until here.
    drop(bus_handle);
    tracing::info!(phase = "teardown", "interceptor stopped");

    handle_join("cache_sweep", sweep_result)?;
    handle_join("message_bus", bus_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("gateway", gateway_result)?;
    handle_join("daemon_detection", detect_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

async fn sweep_task(
    resolver: Arc<Resolver>,
    period: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; there is nothing to sweep yet.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let removed = resolver.sweep().await;
                if removed > 0 {
                    tracing::debug!(removed, "expired cache entries swept");
                }
            }
        }
    }
}

async fn socket_server_task(
    home: PathBuf,
    bus_handle: BusHandle,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), InterceptorError> {
    let socket = socket_path(&home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "control socket listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let bus_handle = bus_handle.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, bus_handle, shutdown_tx).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    bus_handle: BusHandle,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), InterceptorError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("control socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<BusRequest>(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &BusResponse::rejected(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        tracing::debug!(kind = request.kind(), "control socket request");
        if request == BusRequest::Shutdown {
            write_response(&mut writer, &BusResponse::ack()).await?;
            tracing::info!("shutdown requested over control socket");
            let _ = shutdown_tx.send(());
            break;
        }

        let response = bus_handle
            .call(request)
            .await
            .unwrap_or_else(|err| BusResponse::rejected(err.to_string()));
        write_response(&mut writer, &response).await?;
    }

    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &BusResponse,
) -> Result<(), InterceptorError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("control socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("control socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("control socket write", e))
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), InterceptorError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(InterceptorError::Protocol(format!(
                "control socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale control socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), InterceptorError> {
    for dir in [run_dir(home), state_dir(home)] {
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        }
    }
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), InterceptorError>, tokio::task::JoinError>,
) -> Result<(), InterceptorError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(InterceptorError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

/// `RUST_LOG` filters (default `info`); `ORP_LOG_FORMAT=json` switches to
/// JSON lines.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("ORP_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let _ = if json {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
    } else {
        fmt().with_env_filter(filter).with_target(false).try_init()
    };
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), InterceptorError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), InterceptorError> {
    Ok(())
}

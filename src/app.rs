use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, error, info, instrument, warn};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::cli::{Args, LogFormat, LogLevel};
use crate::error::InteractionError;
use crate::fhem::FhemClient;
use crate::handlers::IconRenderer;
use crate::hw::{self, BleTransport, DeviceSessionManager, FakeTransport, SessionState};
use crate::scenes::{CommandRouter, SceneConfig, SceneController, SceneTable, resolve_config_path};
use crate::telemetry;

/// Prefix of commands sent to the FHEM telnet client.
pub const FHEM_PREFIX: &str = "fhem";
/// Prefix of commands drawn as icons on the device.
pub const NUIMO_PREFIX: &str = "nuimo";

const LISTENER_QUEUE_CAPACITY: usize = 100;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Runs the bridge until Ctrl+C.
///
/// ```no_run
/// # async fn demo() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// let args = nuimo_bridge::Args::try_parse_from([
///     "nuimo-bridge",
///     "--fake",
///     "--fake-notifications",
///     "click=01",
///     "--scenes",
///     "scenes.json",
/// ])?;
/// nuimo_bridge::run(args).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if telemetry, scene configuration, the BLE backend or the
/// first device connection fails.
pub async fn run(args: Args) -> Result<()> {
    let format = args.log_format().unwrap_or(if io::stderr().is_terminal() {
        LogFormat::Pretty
    } else {
        LogFormat::Json
    });
    telemetry::initialise_tracing(
        env!("CARGO_PKG_NAME"),
        format,
        args.log_level().map(LogLevel::as_level_filter),
    )?;

    let config_path = resolve_config_path(args.scenes_path())?;
    let table = SceneConfig::load(&config_path)
        .with_context(|| format!("failed to load scenes from `{}`", config_path.display()))?
        .into_table();
    info!(path = %config_path.display(), scenes = table.len(), "scene configuration loaded");

    let transport: Arc<dyn BleTransport> = match args.fake_transport_config() {
        Some(config) => {
            info!("using fake BLE transport");
            Arc::new(FakeTransport::new(config))
        }
        None => hw::real_transport().await?,
    };

    run_with_transport(&args, transport, table).await
}

/// Runs the bridge against an injected transport until Ctrl+C.
///
/// # Errors
///
/// Returns an error if the first device connection fails or Ctrl+C cannot be
/// awaited.
pub async fn run_with_transport(
    args: &Args,
    transport: Arc<dyn BleTransport>,
    table: SceneTable,
) -> Result<()> {
    let cancel = CancellationToken::new();
    let (session, events) = DeviceSessionManager::new(transport, args.session_config());
    let session = Arc::new(session);
    let router = Arc::new(CommandRouter::new());
    let mut tasks = JoinSet::new();

    tasks.spawn(log_state_changes(session.subscribe_state(), cancel.clone()));
    connect_device(&session).await?;

    start_fhem_listener(&router, &args.fhem_address(), &mut tasks, &cancel).await;

    let (_, icons) = router.listen(NUIMO_PREFIX, LISTENER_QUEUE_CAPACITY).await;
    let renderer = IconRenderer::new(session.clone())
        .with_frame_settings(args.icon_brightness(), args.icon_timeout());
    tasks.spawn(renderer.run(icons, cancel.clone()));

    match args.keepalive() {
        Some(interval) => {
            let session = Arc::clone(&session);
            let cancel = cancel.clone();
            tasks.spawn(async move { session.keepalive(interval, cancel).await });
        }
        None => info!("keepalive disabled"),
    }

    let controller = SceneController::new(table);
    {
        let router = Arc::clone(&router);
        let cancel = cancel.clone();
        tasks.spawn(async move { controller.listen(events, &router, cancel).await });
    }
    drop(router);

    tokio::signal::ctrl_c()
        .await
        .map_err(|source| InteractionError::CtrlC { source })?;
    info!("shutting down");

    cancel.cancel();
    session.disconnect().await;
    let drained = timeout(SHUTDOWN_GRACE, async {
        while tasks.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!("background tasks did not stop in time; aborting them");
        tasks.abort_all();
    }
    Ok(())
}

#[instrument(skip(session), level = "info", fields(device_name = session.config().device_name()))]
async fn connect_device(session: &DeviceSessionManager) -> Result<()> {
    let span = Span::current();
    span.pb_set_message(&format!(
        "Scanning for {} and connecting",
        session.config().device_name()
    ));
    span.pb_set_finish_message(&format!("{} Connected", "✓".green()));

    session
        .connect()
        .await
        .inspect_err(|_| span.pb_set_finish_message(&format!("{} Connection failed", "✗".red())))
        .context("initial connection to the Nuimo failed")
}

async fn start_fhem_listener(
    router: &CommandRouter,
    address: &str,
    tasks: &mut JoinSet<()>,
    cancel: &CancellationToken,
) {
    let client = match FhemClient::connect(address).await {
        Ok(client) => client,
        Err(error) => {
            error!(%error, address, "FHEM is unreachable; `fhem:` commands will be dropped");
            return;
        }
    };

    let (_, commands) = router.listen(FHEM_PREFIX, LISTENER_QUEUE_CAPACITY).await;
    let (reply_sender, replies) = mpsc::channel(LISTENER_QUEUE_CAPACITY);
    tasks.spawn(async move {
        if let Err(error) = client.run(commands, reply_sender).await {
            error!(%error, "FHEM client stopped");
        }
    });
    tasks.spawn(log_replies(replies, cancel.clone()));
}

async fn log_replies(mut replies: mpsc::Receiver<String>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            maybe_reply = replies.recv() => {
                let Some(reply) = maybe_reply else {
                    break;
                };
                info!(reply = reply.trim_end(), "FHEM reply");
            }
        }
    }
    debug!("FHEM reply logger stopped");
}

async fn log_state_changes(state: watch::Receiver<SessionState>, cancel: CancellationToken) {
    let mut states = WatchStream::from_changes(state);
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            maybe_state = states.next() => {
                let Some(state) = maybe_state else {
                    break;
                };
                info!(%state, "device link state changed");
            }
        }
    }
}

use std::sync::Arc;
use std::time::Duration;

use nuimo_bridge::{
    CommandRouter, DeviceSessionManager, EndpointId, FHEM_PREFIX, FakeTransport,
    FakeTransportConfig, FhemClient, Icon, IconRenderer, NUIMO_PREFIX, SceneConfig,
    SceneController, SessionConfig,
};
use pretty_assertions::assert_eq;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const SCENES: &str = r#"{
    "default": {
        "connected": "nuimo:bulb",
        "battery_low": "fhem:set nuimo battery low"
    },
    "scenes": {
        "light": {
            "id": "nuimo:bulb",
            "press": "fhem:set lamp toggle",
            "rotate_right": "fhem:set lamp dim {{ value }}"
        },
        "media": {
            "id": "nuimo:media",
            "press": "fhem:set amp play"
        }
    }
}"#;

const WAIT: Duration = Duration::from_secs(5);

struct Bridge {
    transport: FakeTransport,
    session: Arc<DeviceSessionManager>,
    cancel: CancellationToken,
}

async fn start_bridge(
    transport: FakeTransport,
    router: Arc<CommandRouter>,
) -> anyhow::Result<Bridge> {
    let (session, events) =
        DeviceSessionManager::new(Arc::new(transport.clone()), SessionConfig::default());
    let session = Arc::new(session);
    let cancel = CancellationToken::new();

    let (_, icons) = router.listen(NUIMO_PREFIX, 8).await;
    tokio::spawn(IconRenderer::new(session.clone()).run(icons, cancel.clone()));

    let controller = SceneController::new(SceneConfig::from_json_str(SCENES)?.into_table());
    let controller_cancel = cancel.clone();
    tokio::spawn(async move { controller.listen(events, &router, controller_cancel).await });

    session.connect().await?;
    Ok(Bridge {
        transport,
        session,
        cancel,
    })
}

async fn wait_for_frames(transport: &FakeTransport, count: usize) -> Vec<Vec<u8>> {
    timeout(WAIT, async {
        loop {
            let frames = transport.writes_to(EndpointId::LedMatrix);
            if frames.len() >= count {
                return frames;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("LED frames should be written")
}

fn frame(icon: Icon) -> Vec<u8> {
    let mut frame = icon.matrix().bytes().to_vec();
    frame.extend([255, 10]);
    frame
}

#[tokio::test]
async fn click_and_swipes_reach_fhem_and_led_listeners() -> anyhow::Result<()> {
    let transport = FakeTransport::new(
        FakeTransportConfig::builder()
            .notifications("click=01,swipe=01,click=01,rotate=2c01".parse()?)
            .build(),
    );
    let router = Arc::new(CommandRouter::new());
    let (_, mut fhem) = router.listen(FHEM_PREFIX, 8).await;
    let bridge = start_bridge(transport, router).await?;

    assert_eq!(Some("set lamp toggle".to_string()), timeout(WAIT, fhem.recv()).await?);
    assert_eq!(Some("set amp play".to_string()), timeout(WAIT, fhem.recv()).await?);

    let frames = wait_for_frames(&bridge.transport, 2).await;
    assert_eq!(vec![frame(Icon::Bulb), frame(Icon::Media)], frames);

    bridge.cancel.cancel();
    bridge.session.disconnect().await;
    Ok(())
}

#[tokio::test]
async fn live_notifications_follow_the_current_scene() -> anyhow::Result<()> {
    let transport = FakeTransport::new(FakeTransportConfig::builder().build());
    let router = Arc::new(CommandRouter::new());
    let (_, mut fhem) = router.listen(FHEM_PREFIX, 8).await;
    let bridge = start_bridge(transport, router).await?;

    assert!(bridge.transport.notify(EndpointId::RotateInput, &[0x05, 0x00]));
    assert!(bridge.transport.notify(EndpointId::RotateInput, &[0x2C, 0x01]));
    assert_eq!(
        Some("set lamp dim 300".to_string()),
        timeout(WAIT, fhem.recv()).await?
    );

    assert!(bridge.transport.notify(EndpointId::BatteryLevel, &[25]));
    assert_eq!(
        Some("set nuimo battery low".to_string()),
        timeout(WAIT, fhem.recv()).await?
    );

    bridge.cancel.cancel();
    Ok(())
}

#[tokio::test]
async fn click_notification_reaches_fhem_over_telnet() -> anyhow::Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let address = listener.local_addr()?.to_string();
    let (lines_tx, mut lines_rx) = mpsc::channel(8);
    tokio::spawn(async move {
        let Ok((socket, _)) = listener.accept().await else {
            return;
        };
        let mut lines = BufReader::new(socket).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if lines_tx.send(line).await.is_err() {
                break;
            }
        }
    });

    let router = Arc::new(CommandRouter::new());
    let (_, commands) = router.listen(FHEM_PREFIX, 8).await;
    let (replies_tx, mut replies_rx) = mpsc::channel(8);
    let client = FhemClient::connect(&address).await?;
    tokio::spawn(client.run(commands, replies_tx));

    let transport = FakeTransport::new(
        FakeTransportConfig::builder()
            .notifications("click=01".parse()?)
            .build(),
    );
    let bridge = start_bridge(transport, router).await?;

    assert_eq!(
        Some("set lamp toggle".to_string()),
        timeout(WAIT, lines_rx.recv()).await?
    );
    assert_eq!(Some("ok".to_string()), timeout(WAIT, replies_rx.recv()).await?);

    bridge.cancel.cancel();
    Ok(())
}

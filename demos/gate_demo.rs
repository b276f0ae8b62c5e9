use callgate::{CallRequest, FilterConfig, PendingKind, PendingMessage, ThreadId, Transport};
use std::time::Duration;

const SPOOLER_FILTER: &str = r#"
max_retry_duration_ms = 2000
retry_delay_ms = 40
reject_reentrant_calls = true
"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::TRACE).init();

    // Two processes: a client and a spooler that is itself waiting on the client.
    let client = Transport::new(ThreadId(1));
    let client_handle = client.register(FilterConfig::default())?;

    let spooler = Transport::new(ThreadId(2));
    let spooler_handle = spooler.register(FilterConfig::from_toml_str(SPOOLER_FILTER)?)?;
    let queue = spooler.endpoint(|req: &CallRequest| {
        let mut reply = b"queued:".to_vec();
        reply.extend_from_slice(&req.payload);
        reply
    });

    let (pipeline, pending) = client.pipeline(queue.clone());
    let mut pipeline = pipeline.with_pump(|msg: PendingMessage| {
        let payload = String::from_utf8_lossy(&msg.payload);
        tracing::info!(kind = ?msg.kind, "client pumped {payload}");
    });
    pending.send(PendingMessage::new(PendingKind::TopLevel, b"repaint".to_vec()))?;

    let busy = queue.enter_outgoing(client.thread());
    let report = CallRequest::new(client.thread(), b"report.pdf".to_vec());
    let (reply, _) = tokio::join!(pipeline.invoke(report), async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        drop(busy);
    });
    tracing::info!("spooler replied {}", String::from_utf8_lossy(&reply?));

    queue.begin_shutdown();
    let late = CallRequest::new(client.thread(), b"late.pdf".to_vec());
    match pipeline.invoke(late).await {
        Ok(_) => tracing::warn!("shutting-down spooler accepted a call"),
        Err(e) => tracing::info!("late call failed: {e}"),
    }

    client.unregister(client_handle)?;
    spooler.unregister(spooler_handle)?;
    Ok(())
}

mod demo;
mod scheduler;

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use redrive_core::domain::{EnqueueContext, ErrorInfo, OrganizationId};
use redrive_core::impls::{InMemoryDlqStore, LogAlertSink};
use redrive_core::typed::Payload;
use redrive_core::{DlqConfig, EngineBuilder, MessageType};
use serde_json::{Map, json};
use tracing::info;
use tracing_subscriber::EnvFilter;

use demo::{BrokenNotifier, FlakyPublisher, PublishPayload};
use scheduler::RedriveScheduler;

const TICK: Duration = Duration::from_millis(200);
const DEADLINE: Duration = Duration::from_secs(30);

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();

    // (A) 設定: 引数でファイルを指定できる（無ければ config/redrive + REDRIVE__* 環境変数）
    let config_path = std::env::args().nth(1);
    let config = DlqConfig::load(config_path.as_deref())?;
    let batch_size = config.list_limit_cap;

    // (B) エンジンを組み立てる（processor が足りなければ起動時に失敗）
    let engine = EngineBuilder::new(Arc::new(InMemoryDlqStore::new()))
        .config(config)
        .alert_sink(Arc::new(LogAlertSink))
        .register_typed::<PublishPayload, _>(FlakyPublisher::new(2))?
        .register(MessageType::Notification, Arc::new(BrokenNotifier))?
        .expect_types(&[MessageType::Publish, MessageType::Notification])
        .build()?;
    let engine = Arc::new(engine);

    // (C) 失敗したメッセージを DLQ に入れる
    let organization_id = OrganizationId::generate();
    let payload = PublishPayload {
        post_id: "post-42".to_string(),
        channel: "linkedin".to_string(),
    };
    let publish = engine
        .enqueue(
            organization_id,
            MessageType::Publish,
            serde_json::to_string(&payload)?,
            ErrorInfo::new("ChannelUnavailable", "linkedin returned 503"),
            EnqueueContext::default()
                .with_message_data(payload.to_message_data()?)
                .with_source("publish-jobs", "publish.linkedin"),
        )
        .await?;
    let notify = engine
        .enqueue(
            organization_id,
            MessageType::Notification,
            json!({"to": "ops@example.com"}).to_string(),
            ErrorInfo::new("SmtpError", "connection refused"),
            EnqueueContext::default()
                .with_metadata(Map::from_iter([(
                    "template".to_string(),
                    json!("daily-digest"),
                )]))
                .with_max_retries(2),
        )
        .await?;
    info!(publish = %publish.id, notify = %notify.id, "sample messages enqueued");

    // (D) スケジューラを起動し、全件が決着するか Ctrl-C まで待つ
    let scheduler = RedriveScheduler::spawn(engine.clone(), TICK, batch_size);
    let settle = async {
        loop {
            let stats = engine.stats(Some(organization_id)).await?;
            if stats.retryable() == 0 {
                return Ok::<_, redrive_core::DlqError>(());
            }
            tokio::time::sleep(TICK).await;
        }
    };
    tokio::select! {
        result = tokio::time::timeout(DEADLINE, settle) => match result {
            Ok(settled) => settled?,
            Err(_) => info!("deadline reached with messages still pending"),
        },
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }
    scheduler.shutdown_and_join().await;

    // (E) 結果を表示
    let stats = engine.stats(Some(organization_id)).await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    for failed in engine.list_failed(Some(organization_id), None, 10).await? {
        println!("{}", serde_json::to_string_pretty(&failed)?);
    }
    Ok(())
}

use std::sync::Arc;
use std::time::Duration;

use futures::TryStreamExt;
use streamkeeper::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::info;

const SOURCES: [&str; 3] = ["order-1", "order-2", "order-3"];

#[tokio::main]
async fn main() {
    CliApp::new("streamkeeper")
        .with_default_filter("streamkeeper=info")
        .run(run_demo)
        .await
}

/// Parse and validate command-line arguments
fn parse_args(args: Vec<String>) -> Result<Option<String>, AppError> {
    match args.len() {
        1 => Ok(None),
        2 => Ok(Some(args[1].clone())),
        _ => Err(AppError::InvalidArguments(
            "Usage: streamkeeper [processor-config.json]".to_string(),
        )),
    }
}

async fn load_config(path: Option<String>) -> Result<ProcessorConfig, AppError> {
    let Some(path) = path else {
        return Ok(ProcessorConfig::default().with_idle_poll_interval(Duration::from_millis(200)));
    };
    let contents = tokio::fs::read_to_string(&path).await?;
    Ok(serde_json::from_str(&contents)?)
}

/// Runs an unpartitioned and a partitioned processor over an in-memory log
/// that keeps growing until the application is stopped
async fn run_demo(cancel: CancellationToken) -> Result<(), AppError> {
    let config = load_config(parse_args(std::env::args().collect())?).await?;
    let scope = ScopeId::default_scope();
    let tenant = TenantId::new("demo");

    let log = Arc::new(InMemoryEventLog::new());
    let repository = Arc::new(InMemoryStateRepository::new());
    for (index, source) in SOURCES.iter().enumerate() {
        log.append(&scope, *source, "OrderPlaced", format!(r#"{{"order":{index}}}"#));
    }

    let audit = FnProcessor::new("audit", false, |request: &ProcessingRequest<'_>| {
        info!(
            position = %request.position,
            event_type = %request.event.event.event_type,
            "Audited event"
        );
        Ok(ProcessingResult::Succeeded)
    });
    // The first attempt at order-2 fails so its partition goes through catch-up
    let shipping = FnProcessor::new("shipping", true, |request: &ProcessingRequest<'_>| {
        if request.partition.as_str() == "order-2"
            && request.attempt == 0
            && request.failure_reason.is_none()
        {
            return Ok(ProcessingResult::retry("warehouse busy", Duration::from_secs(2)));
        }
        info!(partition = %request.partition, position = %request.position, "Shipped order");
        Ok(ProcessingResult::Succeeded)
    });

    let processors = StreamProcessors::new(cancel.child_token());
    processors.register(
        ScopedStreamProcessor::new(
            tenant.clone(),
            StreamProcessorId::new(scope.clone(), "audit", "orders"),
            Arc::new(log.stream(scope.clone(), StreamFilter::all(), false)),
            Arc::new(audit),
            Arc::clone(&repository),
        )
        .with_config(config.clone()),
    )?;
    processors.register(
        ScopedStreamProcessor::new(
            tenant.clone(),
            StreamProcessorId::new(scope.clone(), "shipping", "orders"),
            Arc::new(log.stream(
                scope.clone(),
                StreamFilter::by_event_type(&["OrderPlaced"]),
                true,
            )),
            Arc::new(shipping),
            Arc::clone(&repository),
        )
        .with_config(config),
    )?;

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let mut appended = 0usize;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let source = SOURCES[appended % SOURCES.len()];
                let event_type = if appended % 2 == 0 { "OrderShipped" } else { "OrderPlaced" };
                let sequence = log.append(&scope, source, event_type, "{}");
                info!(%sequence, source, event_type, "Appended event");
                appended += 1;
            }
        }
    }

    processors.shutdown().await;
    let states: Vec<StoredStreamProcessorState> = repository
        .get_for_scope(&scope, &CancellationToken::new())
        .try_collect()
        .await?;
    for (id, state) in states {
        info!(processor = %id, position = %state.position(), "Final state");
    }
    Ok(())
}

use std::sync::Arc;

use alb_logs_shipper::{
    config::Config,
    elb::{ElbTagSource, MetadataCache},
    line::parser_for,
    loki::PushClient,
    metrics::{router, serve, setup_metrics_recorder},
    processor::Processor,
    shipper::Shipper,
    storage::S3ObjectStore,
};
use anyhow::{Context, Error};
use aws_config::BehaviorVersion;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

fn setup_tracing() {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

/// Cancels `token` on SIGINT or SIGTERM.
fn spawn_shutdown_listener(token: CancellationToken) -> Result<(), Error> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = interrupt.recv() => {}
            _ = terminate.recv() => {}
            _ = token.cancelled() => return,
        }
        info!("received SIGINT or SIGTERM, shutting down");
        token.cancel();
    });
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    setup_tracing();
    info!("Starting up...");

    let config = Config::init_with_defaults()?;
    let token = CancellationToken::new();
    spawn_shutdown_listener(token.clone())?;

    let recorder = setup_metrics_recorder().context("failed to install metrics recorder")?;

    let aws = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let store = Arc::new(S3ObjectStore::new(
        aws_sdk_s3::Client::new(&aws),
        config.bucket_name.clone(),
    ));
    let tags = Arc::new(ElbTagSource::new(aws.clone(), config.role_arns.clone()));
    let cache = Arc::new(MetadataCache::new(tags, config.labels.clone()));
    let client = PushClient::new(
        &config.loki_url,
        &config.loki_user,
        config.loki_password.as_deref(),
    )
    .context("failed to build push client")?;

    let processor = Arc::new(Processor::new(
        store.clone(),
        cache,
        client,
        parser_for(config.parser),
        config.format,
        config.strict_parsing,
    ));
    let shipper = Shipper::new(
        store,
        processor,
        config.workers,
        config.wait_interval(),
        config.queue_capacity(),
        token.clone(),
    );

    let bind = format!("{}:{}", config.host, config.port);
    let app = router(recorder, shipper.queue_depth());
    let server_token = token.clone();
    let server = tokio::spawn(async move {
        let result = serve(app, &bind, server_token.clone()).await;
        if let Err(e) = &result {
            error!("metrics server failed: {e}");
            server_token.cancel();
        }
        result
    });

    info!(
        bucket = %config.bucket_name,
        format = %config.format,
        workers = config.workers,
        port = config.port,
        "shipping access logs"
    );
    let result = shipper.run().await;
    token.cancel();
    server.await?.context("metrics server failed")?;

    result.context("pipeline stopped")?;
    info!("shut down cleanly");
    Ok(())
}

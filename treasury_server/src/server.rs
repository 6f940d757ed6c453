use std::{collections::HashMap, fs, pin::Pin, sync::Arc};

use actix_web::{
    dev::{Server, Service},
    http::KeepAlive,
    middleware::Logger,
    web,
    App,
    HttpServer,
};
use futures::future::{ok, Either};
use log::*;
use treasury_engine::{
    chain::{PolygonClient, StaticKeyProvider},
    dispatch::{
        decode_notification,
        DeliveryFn,
        DirectDispatcher,
        DispatchOutcome,
        Dispatcher,
        LogNotifier,
        OutboxDrainApi,
        QueuedDispatcher,
        WebhookNotifier,
    },
    fiat::StripeRail,
    traits::{AuditLedger, Notification, NotificationSender, NotifyError},
    DepositMonitorApi,
    PayoutBatcherApi,
    PayoutExecutorApi,
    PayoutSettings,
    SqliteLedger,
    SweepApi,
    TreasuryMonitorApi,
};
use trs_common::Secret;

use crate::{
    auth::cron_token_matches,
    config::{DispatchMode, ServerConfig},
    errors::ServerError,
    routes::{
        execute_single_payout,
        health,
        run_deposit_monitor,
        run_outbox_drain,
        run_payout_batcher,
        run_payout_executor,
        run_sweep_dispatch,
        run_sweep_fund,
        run_sweep_verify,
        run_treasury_monitor,
    },
};

// The HTTP layer is wired against concrete backends; the generics stop at the pipeline APIs.
pub type Monitor = DepositMonitorApi<SqliteLedger, PolygonClient>;
pub type Batcher = PayoutBatcherApi<SqliteLedger, PolygonClient>;
pub type Executor = PayoutExecutorApi<SqliteLedger, PolygonClient, StripeRail>;
pub type Sweeper = SweepApi<SqliteLedger, PolygonClient>;
pub type TreasuryMon = TreasuryMonitorApi<SqliteLedger, PolygonClient>;
pub type Drain = OutboxDrainApi<SqliteLedger, ServerDispatcher>;

//-------------------------------------------  Notifier wiring  -------------------------------------------------------

/// The sender selected at startup: a webhook to the notification service, or log-only.
#[derive(Clone)]
pub enum ServerNotifier {
    Webhook(WebhookNotifier),
    Log(LogNotifier),
}

impl NotificationSender for ServerNotifier {
    async fn notify(
        &self,
        member_id: i64,
        notification: &Notification,
        correlation_id: &str,
    ) -> Result<(), NotifyError> {
        match self {
            ServerNotifier::Webhook(w) => w.notify(member_id, notification, correlation_id).await,
            ServerNotifier::Log(l) => l.notify(member_id, notification, correlation_id).await,
        }
    }
}

/// The dispatch strategy selected at startup.
#[derive(Clone)]
pub enum ServerDispatcher {
    Direct(DirectDispatcher<SqliteLedger, ServerNotifier>),
    Queued(QueuedDispatcher),
}

impl Dispatcher for ServerDispatcher {
    async fn dispatch(&self, message: treasury_engine::db_types::OutboxMessage) -> DispatchOutcome {
        match self {
            ServerDispatcher::Direct(d) => d.dispatch(message).await,
            ServerDispatcher::Queued(q) => q.dispatch(message).await,
        }
    }
}

fn build_notifier(config: &ServerConfig) -> ServerNotifier {
    match &config.notify_webhook_url {
        Some(url) => ServerNotifier::Webhook(WebhookNotifier::new(url.clone())),
        None => ServerNotifier::Log(LogNotifier),
    }
}

fn build_dispatcher(config: &ServerConfig, db: SqliteLedger, notifier: ServerNotifier) -> ServerDispatcher {
    match config.dispatch_mode {
        DispatchMode::Direct => ServerDispatcher::Direct(DirectDispatcher::new(db, notifier)),
        DispatchMode::Queued => {
            let delivery: DeliveryFn = Arc::new(move |message| {
                let db = db.clone();
                let notifier = notifier.clone();
                Box::pin(async move {
                    let Some(notification) = decode_notification(&message) else { return };
                    match notifier.notify(message.member_id, &notification, &message.correlation_id).await {
                        Ok(()) => {
                            if let Err(e) = db.mark_outbox_sent(message.id).await {
                                warn!("📬️ Could not mark outbox row #{} sent: {e}", message.id);
                            }
                        },
                        Err(e) => warn!("📬️ Delivery of outbox row #{} failed: {e}", message.id),
                    }
                }) as Pin<Box<dyn std::future::Future<Output = ()> + Send>>
            });
            ServerDispatcher::Queued(QueuedDispatcher::start(delivery, 128))
        },
    }
}

fn load_custodial_keys(config: &ServerConfig) -> Result<StaticKeyProvider, ServerError> {
    let Some(path) = &config.custodial_keys_file else {
        info!("🪛️ No custodial keys file configured; sweep dispatch will report missing keys.");
        return Ok(StaticKeyProvider::default());
    };
    let raw = fs::read_to_string(path)
        .map_err(|e| ServerError::ConfigurationError(format!("Cannot read custodial keys file {path}: {e}")))?;
    let keys: HashMap<i64, String> = serde_json::from_str(&raw)
        .map_err(|e| ServerError::ConfigurationError(format!("Malformed custodial keys file {path}: {e}")))?;
    info!("🪛️ Loaded {} custodial signing keys", keys.len());
    Ok(StaticKeyProvider::new(keys.into_iter().map(|(k, v)| (k, Secret::new(v))).collect()))
}

//-------------------------------------------  Server assembly  -------------------------------------------------------

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteLedger::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let custodial_keys = load_custodial_keys(&config)?;
    let chain = PolygonClient::new(config.polygon_config(), Arc::new(custodial_keys))
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let rail = StripeRail::new(config.stripe_config())
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let srv = create_server_instance(config, db, chain, rail)?;
    srv.await.map_err(|e| ServerError::BackendError(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteLedger,
    chain: PolygonClient,
    rail: StripeRail,
) -> Result<Server, ServerError> {
    let notifier = build_notifier(&config);
    let dispatcher = build_dispatcher(&config, db.clone(), notifier);
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let monitor = Monitor::new(db.clone(), chain.clone(), config.pricing.clone());
        let batcher = Batcher::new(db.clone(), chain.clone(), PayoutSettings::default());
        let executor = Executor::new(db.clone(), chain.clone(), rail.clone(), PayoutSettings::default());
        let sweeper = Sweeper::new(db.clone(), chain.clone(), config.sweep.clone());
        let treasury = TreasuryMon::new(db.clone(), chain.clone(), config.treasury.clone());
        let drain = Drain::new(db.clone(), dispatcher.clone(), 100);
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("trs::access_log"))
            .app_data(web::Data::new(monitor))
            .app_data(web::Data::new(batcher))
            .app_data(web::Data::new(executor))
            .app_data(web::Data::new(sweeper))
            .app_data(web::Data::new(treasury))
            .app_data(web::Data::new(drain));
        let cron_secret = config.cron_secret.clone();
        let cron_scope = web::scope("/cron")
            .wrap_fn(move |req, srv| {
                if cron_token_matches(&req, &cron_secret) {
                    Either::Left(srv.call(req))
                } else {
                    warn!("🔐️ Rejected cron request to {} without a valid token", req.path());
                    Either::Right(ok(req.error_response(ServerError::Unauthorized)))
                }
            })
            .service(run_deposit_monitor)
            .service(run_payout_batcher)
            .service(run_payout_executor)
            .service(run_sweep_fund)
            .service(run_sweep_dispatch)
            .service(run_sweep_verify)
            .service(run_treasury_monitor)
            .service(run_outbox_drain);
        let admin_secret = config.cron_secret.clone();
        let admin_scope = web::scope("/api")
            .wrap_fn(move |req, srv| {
                if cron_token_matches(&req, &admin_secret) {
                    Either::Left(srv.call(req))
                } else {
                    Either::Right(ok(req.error_response(ServerError::Unauthorized)))
                }
            })
            .service(execute_single_payout);
        app.service(health).service(cron_scope).service(admin_scope)
    })
    .keep_alive(KeepAlive::Timeout(std::time::Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}

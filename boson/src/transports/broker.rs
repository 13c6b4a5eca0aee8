//! Broker-mediated transport (§4.7): a shared request queue per service
//! contract, a private anonymous reply queue per dispatcher, a polling
//! consumer on each side, and an expiry reaper on the dispatcher side.
//! This is the most intricate transport -- correlation is carried through
//! broker message properties rather than an open connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, BasicQosOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::codec::Codec;
use crate::config::Config;
use crate::envelope::{Request, Response};
use crate::error::{BosonError, ErrorKind, Result};
use crate::executor::SharedExecutor;
use crate::receiver::ReceiverCore;
use crate::router::{ResponseRouter, SharedResponseRouter};
use crate::service::ServiceAdapter;
use crate::transports::{DispatchTransport, ReceiveTransport};

/// Backoff applied by both pump loops after a transient decode/channel
/// error, to avoid flooding logs under sustained broker failure (§4.7,
/// §7 "Pump-loop failures back off 250 ms").
const PUMP_BACKOFF: Duration = Duration::from_millis(250);

async fn connect_channel(config: &Config) -> Result<(Connection, Channel)> {
    let mut properties = ConnectionProperties::default()
        .with_executor(tokio_executor_trait::Tokio::current())
        .with_reactor(tokio_reactor_trait::Tokio);
    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        properties = properties.with_connection_name(format!("boson:{username}").into());
        let _ = password; // credentials travel via the connection URI's userinfo component.
    }
    let connection = Connection::connect(&config.uri, properties)
        .await
        .map_err(|e| BosonError::with_cause(ErrorKind::Transport, "failed to connect to broker", e))?;
    let channel = connection
        .create_channel()
        .await
        .map_err(|e| BosonError::with_cause(ErrorKind::Transport, "failed to open broker channel", e))?;
    Ok((connection, channel))
}

async fn declare_request_queue(channel: &Channel, name: &str) -> Result<()> {
    channel
        .queue_declare(
            name,
            QueueDeclareOptions {
                durable: false,
                exclusive: false,
                auto_delete: false,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| BosonError::with_cause(ErrorKind::Transport, format!("failed to declare queue '{name}'"), e))?;
    Ok(())
}

/// Dispatcher-side half (§4.7 "Dispatcher lifecycle").
pub struct BrokerDispatchTransport {
    contract: String,
    config: Config,
    codec: Arc<dyn Codec>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
    state: Mutex<Option<DispatcherState>>,
}

struct DispatcherState {
    connection: Connection,
    publish_channel: Channel,
    reply_queue_name: String,
    router: SharedResponseRouter,
    response_loop: tokio::task::JoinHandle<()>,
    reaper: tokio::task::JoinHandle<()>,
}

impl BrokerDispatchTransport {
    pub fn new(contract: impl Into<String>, config: Config, codec: Arc<dyn Codec>) -> Self {
        BrokerDispatchTransport {
            contract: contract.into(),
            config,
            codec,
            connected: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
            state: Mutex::new(None),
        }
    }
}

#[async_trait]
impl DispatchTransport for BrokerDispatchTransport {
    async fn connect(&self) -> Result<()> {
        let executor = self.config.executor()?;
        let (connection, channel) = connect_channel(&self.config).await?;
        declare_request_queue(&channel, &self.contract).await?;

        let reply_queue = channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    durable: false,
                    exclusive: true,
                    auto_delete: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BosonError::with_cause(ErrorKind::Transport, "failed to declare reply queue", e))?;
        let reply_queue_name = reply_queue.name().as_str().to_string();

        let consumer = channel
            .basic_consume(
                &reply_queue_name,
                &format!("boson-dispatcher-{}", uuid::Uuid::new_v4()),
                BasicConsumeOptions {
                    no_ack: true,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BosonError::with_cause(ErrorKind::Transport, "failed to consume reply queue", e))?;

        let router: SharedResponseRouter = Arc::new(ResponseRouter::new(executor.clone()));
        self.connected.store(true, Ordering::SeqCst);

        let response_loop = tokio::spawn(response_loop(
            consumer,
            router.clone(),
            self.codec.clone(),
            self.connected.clone(),
            self.cancel.clone(),
        ));

        let reaper = tokio::spawn(reaper_loop(
            router.clone(),
            self.config.reaper_interval,
            self.connected.clone(),
            self.cancel.clone(),
        ));

        *self.state.lock() = Some(DispatcherState {
            connection,
            publish_channel: channel,
            reply_queue_name,
            router,
            response_loop,
            reaper,
        });

        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.cancel.cancel();
        if let Some(state) = self.state.lock().take() {
            let _ = state.response_loop.await;
            let _ = state.reaper.await;
            let _ = state.connection.close(200, "disconnect").await;
        }
        Ok(())
    }

    async fn dispatch(&self, request: Request) -> Result<Response> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(BosonError::not_connected("broker dispatcher is not connected"));
        }

        let guard = self.state.lock();
        let state = guard
            .as_ref()
            .ok_or_else(|| BosonError::not_connected("broker dispatcher is not connected"))?;

        let request = request.with_correlation(state.reply_queue_name.clone());
        let completion = state.router.open(&request);

        let body = self.codec.encode_request(&request)?;
        let expiration_ms = self.config.request_ttl.unwrap_or(crate::config::DEFAULT_REQUEST_TTL).as_millis();
        let properties = BasicProperties::default()
            .with_correlation_id(request.id.to_string().into())
            .with_reply_to(request.correlation.clone().into())
            .with_expiration(expiration_ms.to_string().into());

        let publish_channel = state.publish_channel.clone();
        let contract = self.contract.clone();
        drop(guard);

        publish_channel
            .basic_publish(
                "",
                &contract,
                BasicPublishOptions::default(),
                &body,
                properties,
            )
            .await
            .map_err(|e| BosonError::with_cause(ErrorKind::Transport, "failed to publish request", e))?;

        completion.await
    }
}

async fn response_loop(
    mut consumer: lapin::Consumer,
    router: SharedResponseRouter,
    codec: Arc<dyn Codec>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = consumer.next() => {
                match next {
                    Some(Ok(delivery)) => {
                        match codec.decode_response(&delivery.data) {
                            Ok(response) => router.complete(response),
                            Err(e) => {
                                tracing::error!(error = %e, "failed to decode broker response, dropping");
                                tokio::time::sleep(PUMP_BACKOFF).await;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "broker reply consumer error");
                        if !connected.load(Ordering::SeqCst) {
                            break;
                        }
                        tokio::time::sleep(PUMP_BACKOFF).await;
                    }
                    None => break,
                }
            }
        }
        if !connected.load(Ordering::SeqCst) {
            break;
        }
    }
}

async fn reaper_loop(
    router: SharedResponseRouter,
    interval: Duration,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
        if !connected.load(Ordering::SeqCst) {
            break;
        }
        router.reap_expired();
    }
}

/// Receiver-side half (§4.7 "Receiver lifecycle").
pub struct BrokerReceiveTransport {
    contract: String,
    config: Config,
    codec: Arc<dyn Codec>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
    listener: Mutex<Option<tokio::task::JoinHandle<()>>>,
    connection: Mutex<Option<Connection>>,
}

impl BrokerReceiveTransport {
    pub fn new(contract: impl Into<String>, config: Config, codec: Arc<dyn Codec>) -> Self {
        BrokerReceiveTransport {
            contract: contract.into(),
            config,
            codec,
            connected: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
            listener: Mutex::new(None),
            connection: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ReceiveTransport for BrokerReceiveTransport {
    async fn connect(&self, adapter: Arc<dyn ServiceAdapter>) -> Result<()> {
        let executor = self.config.executor()?;
        let (connection, channel) = connect_channel(&self.config).await?;
        declare_request_queue(&channel, &self.contract).await?;

        // Prefetch is scoped to this receiver's dedicated channel only
        // (§9(c): the source sets it on a shared channel, which leaks into
        // unrelated consumers on that channel; we give every role its own
        // channel so this can't happen).
        channel
            .basic_qos(1, BasicQosOptions::default())
            .await
            .map_err(|e| BosonError::with_cause(ErrorKind::Transport, "failed to set prefetch", e))?;

        let consumer = channel
            .basic_consume(
                &self.contract,
                &format!("boson-receiver-{}", uuid::Uuid::new_v4()),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BosonError::with_cause(ErrorKind::Transport, "failed to consume request queue", e))?;

        let core = Arc::new(ReceiverCore::new(adapter));
        self.connected.store(true, Ordering::SeqCst);

        let task = tokio::spawn(request_listener(
            consumer,
            channel,
            core,
            self.codec.clone(),
            executor,
            self.config.reply_ttl,
            self.connected.clone(),
            self.cancel.clone(),
        ));

        *self.listener.lock() = Some(task);
        *self.connection.lock() = Some(connection);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.cancel.cancel();
        if let Some(task) = self.listener.lock().take() {
            let _ = task.await;
        }
        if let Some(connection) = self.connection.lock().take() {
            let _ = connection.close(200, "disconnect").await;
        }
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
async fn request_listener(
    mut consumer: lapin::Consumer,
    channel: Channel,
    core: Arc<ReceiverCore>,
    codec: Arc<dyn Codec>,
    executor: SharedExecutor,
    reply_ttl: Duration,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = consumer.next() => {
                match next {
                    Some(Ok(delivery)) => {
                        if !connected.load(Ordering::SeqCst) {
                            tokio::time::sleep(PUMP_BACKOFF).await;
                            continue;
                        }
                        match codec.decode_request(&delivery.data) {
                            Ok(request) => {
                                let core = core.clone();
                                let codec = codec.clone();
                                let channel = channel.clone();
                                let acker = delivery.acker.clone();
                                executor.submit(Box::pin(async move {
                                    let response = core.apply(request).await;
                                    let reply_to = response.correlation.clone();
                                    match codec.encode_response(&response) {
                                        Ok(body) => {
                                            let properties = BasicProperties::default()
                                                .with_correlation_id(response.id.to_string().into())
                                                .with_expiration(reply_ttl.as_millis().to_string().into());
                                            if let Err(e) = channel
                                                .basic_publish("", &reply_to, BasicPublishOptions::default(), &body, properties)
                                                .await
                                            {
                                                tracing::error!(error = %e, "failed to publish broker reply");
                                            }
                                        }
                                        Err(e) => tracing::error!(error = %e, "failed to encode broker response"),
                                    }
                                    let _ = acker.ack(lapin::options::BasicAckOptions::default()).await;
                                }));
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "failed to decode broker request, dropping");
                                tokio::time::sleep(PUMP_BACKOFF).await;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "broker request consumer error");
                        tokio::time::sleep(PUMP_BACKOFF).await;
                    }
                    None => break,
                }
            }
        }
        if !connected.load(Ordering::SeqCst) {
            break;
        }
    }
}

//! Cumulative acks tracker.
//!
//! Keeps the ids a subscription has received but not yet acked, in receipt
//! order, and answers which of them may be the target of a cumulative ack.
//! Every request goes through one channel into one task that owns the record,
//! so callers on any number of tasks see a single total order of operations.
//!
//! Callers must stop issuing requests once [`CumulativeAcksTracker::close`] is
//! called. Requests that reach a stopped tracker fail with
//! [`crate::Error::Shutdown`].

mod record;

use tally_common::{message_id::MessageId, utils::defer::defer};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::ShutdownSnafu;

use self::record::TrackedMessages;

pub struct Config {
    /// expected number of in-flight messages, only used to size the record
    pub capacity_hint: usize,
    /// pending requests the channel buffers before senders wait
    pub channel_capacity: usize,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder {
            capacity_hint: 1000,
            channel_capacity: 1,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::builder().build()
    }
}

pub struct ConfigBuilder {
    capacity_hint: usize,
    channel_capacity: usize,
}

impl ConfigBuilder {
    pub fn capacity_hint(mut self, capacity_hint: usize) -> Self {
        self.capacity_hint = capacity_hint;
        self
    }

    pub fn channel_capacity(mut self, channel_capacity: usize) -> Self {
        self.channel_capacity = channel_capacity;
        self
    }

    pub fn build(self) -> Config {
        Config {
            capacity_hint: self.capacity_hint,
            channel_capacity: self.channel_capacity.max(1),
        }
    }
}

enum Request<M> {
    MessagesReceived(Vec<M>),
    AckSent(M),
    CumulativeAckSent(M),
    GetCumulativeMessageId(M, oneshot::Sender<Option<M>>),
    TrackedMessageIds(oneshot::Sender<Vec<M>>),
}

#[derive(Clone)]
pub struct CumulativeAcksTracker<M> {
    request_tx: mpsc::Sender<Request<M>>,
    token: CancellationToken,
}

impl<M> CumulativeAcksTracker<M>
where
    M: MessageId,
{
    /// Starts a tracker on the current tokio runtime.
    pub fn new(capacity_hint: usize) -> Self {
        Self::with_config(Config::builder().capacity_hint(capacity_hint).build())
    }

    pub fn with_config(config: Config) -> Self {
        let (request_tx, request_rx) = mpsc::channel(config.channel_capacity.max(1));
        let token = CancellationToken::new();
        let record = TrackedMessages::with_capacity(config.capacity_hint);
        tokio::spawn(start_tracker(record, request_rx, token.clone()));
        debug!("created new cumulative acks tracker");
        Self { request_tx, token }
    }

    /// Appends newly received ids after everything already tracked.
    #[tracing::instrument(skip_all, fields(count = message_ids.len()))]
    pub async fn messages_received(&self, message_ids: Vec<M>) -> Result<(), crate::Error> {
        self.send(Request::MessagesReceived(message_ids)).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn ack_sent(&self, message_id: &M) -> Result<(), crate::Error> {
        self.send(Request::AckSent(message_id.clone())).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn cumulative_ack_sent(&self, message_id: &M) -> Result<(), crate::Error> {
        self.send(Request::CumulativeAckSent(message_id.clone())).await
    }

    /// Resolves the id a cumulative ack covering `message_id` should target.
    ///
    /// Returns `None` when `message_id` is no longer tracked, or when it is an
    /// unfinished batch fragment with nothing tracked before it. The answer
    /// reflects every request sent before this one.
    #[tracing::instrument(skip(self))]
    pub async fn get_cumulative_message_id(
        &self,
        message_id: &M,
    ) -> Result<Option<M>, crate::Error> {
        let (res_tx, res_rx) = oneshot::channel();
        self.send(Request::GetCumulativeMessageId(message_id.clone(), res_tx))
            .await?;
        res_rx.await.map_err(|_| ShutdownSnafu.build())
    }

    /// Copy of the tracked ids, in receipt order.
    #[tracing::instrument(skip(self))]
    pub async fn tracked_message_ids(&self) -> Result<Vec<M>, crate::Error> {
        let (res_tx, res_rx) = oneshot::channel();
        self.send(Request::TrackedMessageIds(res_tx)).await?;
        res_rx.await.map_err(|_| ShutdownSnafu.build())
    }

    /// Stops the tracker. Requests already queued behind the close are dropped.
    pub fn close(&self) {
        self.token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    async fn send(&self, request: Request<M>) -> Result<(), crate::Error> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => ShutdownSnafu.fail(),
            res = self.request_tx.send(request) => res.map_err(|_| ShutdownSnafu.build()),
        }
    }
}

async fn start_tracker<M>(
    mut record: TrackedMessages<M>,
    mut request_rx: mpsc::Receiver<Request<M>>,
    token: CancellationToken,
) where
    M: MessageId,
{
    debug!("starting cumulative acks tracker request processor");
    let _guard = defer(|| debug!("stopped cumulative acks tracker request processor"));
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            request = request_rx.recv() => match request {
                Some(Request::MessagesReceived(message_ids)) => record.extend(message_ids),
                Some(Request::AckSent(message_id)) => {
                    if !record.remove(&message_id) {
                        trace!("ack sent for untracked message {message_id:?}");
                    }
                }
                Some(Request::CumulativeAckSent(message_id)) => {
                    if !record.remove_until(&message_id) {
                        trace!("cumulative ack sent for untracked message {message_id:?}");
                    }
                }
                Some(Request::GetCumulativeMessageId(message_id, res_tx)) => {
                    res_tx.send(record.greatest_cumulative(&message_id)).ok();
                }
                Some(Request::TrackedMessageIds(res_tx)) => {
                    res_tx.send(record.snapshot()).ok();
                }
                // every handle dropped
                None => break,
            },
        }
    }
}

use crate::errors::*;
use crate::listener::events::{FirestoreTargetChangeType, FirestoreWatchEvent};
use crate::listener::inventory::FirestoreInventory;
use crate::listener::retry::*;
use crate::listener::target::*;
use crate::{
    FirestoreDocumentListenSnapshot, FirestoreListenSupport, FirestoreQuerySnapshot,
    FirestoreResult,
};
use futures::StreamExt;
use futures::TryStreamExt;
use gcloud_sdk::google::firestore::v1::ListenRequest;
use rsb_derive::*;
use rvstruct::ValueStruct;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::*;

#[derive(Debug, Clone, Builder)]
pub struct FirestoreListenerParams {
    #[default = "FIRESTORE_LISTENER_DEFAULT_RETRY_INITIAL_DELAY"]
    pub retry_initial_delay: Duration,
    #[default = "FIRESTORE_LISTENER_DEFAULT_RETRY_MULTIPLIER"]
    pub retry_multiplier: f64,
    #[default = "FIRESTORE_LISTENER_DEFAULT_MAX_RETRIES"]
    pub max_retries: usize,
    #[default = "FirestoreListenerTarget::default()"]
    pub target_id: FirestoreListenerTarget,
    pub labels: Option<HashMap<String, String>>,
}

impl FirestoreListenerParams {
    fn retry_policy(&self) -> FirestoreListenerRetryPolicy {
        FirestoreListenerRetryPolicy::new(
            self.retry_initial_delay,
            self.retry_multiplier,
            self.max_retries,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirestoreListenerStatus {
    Idle,
    Running,
    /// Waiting out a backoff delay before reconnecting.
    Suspended,
    Stopping,
    Stopped,
}

impl FirestoreListenerStatus {
    pub fn is_stopped(&self) -> bool {
        matches!(
            self,
            FirestoreListenerStatus::Stopping | FirestoreListenerStatus::Stopped
        )
    }
}

// State shared between the public API and the background task.
// A callback is only started while holding the lock and with a status that isn't stopped.
struct FirestoreListenerShared {
    status: FirestoreListenerStatus,
    request_sender: Option<UnboundedSender<ListenRequest>>,
    shutdown_writer: Option<UnboundedSender<i8>>,
}

tokio::task_local! {
    // The listener whose callback is running on the current task.
    static FIRESTORE_LISTENER_DISPATCH: Arc<Mutex<FirestoreListenerShared>>;
}

/// Keeps a live, ordered view of a listen target and publishes a
/// [`FirestoreQuerySnapshot`] to the callback on every consistent change.
///
/// The stream is reopened from the last resume token when the server closes
/// it, and with exponential backoff after transient errors.
pub struct FirestoreListener<D>
where
    D: FirestoreListenSupport,
{
    db: D,
    target_params: FirestoreListenerTargetParams,
    listener_params: FirestoreListenerParams,
    shared: Arc<Mutex<FirestoreListenerShared>>,
    handle: Option<JoinHandle<FirestoreResult<()>>>,
    dispatching: Option<watch::Receiver<bool>>,
}

impl<D> FirestoreListener<D>
where
    D: FirestoreListenSupport + Clone + Send + Sync + 'static,
{
    pub fn new(
        db: D,
        target_type: FirestoreListenerTargetType,
        listener_params: FirestoreListenerParams,
    ) -> FirestoreResult<FirestoreListener<D>> {
        let target_params = FirestoreListenerTargetParams::new(target_type)
            .with_target(listener_params.target_id.clone())
            .opt_labels(listener_params.labels.clone());
        target_params.validate()?;

        Ok(FirestoreListener {
            db,
            target_params,
            listener_params,
            shared: Arc::new(Mutex::new(FirestoreListenerShared {
                status: FirestoreListenerStatus::Idle,
                request_sender: None,
                shutdown_writer: None,
            })),
            handle: None,
            dispatching: None,
        })
    }

    pub fn target_params(&self) -> &FirestoreListenerTargetParams {
        &self.target_params
    }

    pub async fn start<FN, F>(&mut self, cb: FN) -> FirestoreResult<()>
    where
        FN: Fn(FirestoreQuerySnapshot) -> F + Send + Sync + 'static,
        F: Future<Output = AnyBoxedErrResult<()>> + Send + 'static,
    {
        let (shutdown_writer, shutdown_receiver): (UnboundedSender<i8>, UnboundedReceiver<i8>) =
            tokio::sync::mpsc::unbounded_channel();

        {
            let mut shared = self.shared.lock().await;
            if shared.status != FirestoreListenerStatus::Idle {
                return Err(FirestoreError::SystemError(FirestoreSystemError::new(
                    FirestoreErrorPublicGenericDetails::new("ListenerNotIdle".into()),
                    format!("Listener can't be started in status: {:?}", shared.status),
                )));
            }
            shared.status = FirestoreListenerStatus::Running;
            shared.shutdown_writer = Some(shutdown_writer);
        }

        info!(
            target_id = self.target_params.target.value(),
            "Starting a Firestore listener."
        );

        let (dispatching_sender, dispatching_receiver) = watch::channel(false);
        self.dispatching = Some(dispatching_receiver);

        let worker = FirestoreListenerWorker {
            db: self.db.clone(),
            target_params: self.target_params.clone(),
            shared: self.shared.clone(),
            shutdown_receiver,
            dispatching: dispatching_sender,
            inventory: FirestoreInventory::new(self.target_params.target_type.ordering()),
            retry_policy: self.listener_params.retry_policy(),
            cb,
        };

        self.handle = Some(tokio::spawn(worker.run()));
        Ok(())
    }

    /// Requests the listener to stop. Returns once no further callback can be invoked.
    ///
    /// A callback that is already running is awaited, unless `stop` is called
    /// from that callback itself.
    pub async fn stop(&self) {
        let running = {
            let mut shared = self.shared.lock().await;
            match shared.status {
                FirestoreListenerStatus::Idle => {
                    shared.status = FirestoreListenerStatus::Stopped;
                    false
                }
                FirestoreListenerStatus::Running | FirestoreListenerStatus::Suspended => {
                    debug!("Stopping Firestore listener...");
                    shared.status = FirestoreListenerStatus::Stopping;
                    // Closing the outbound stream half-closes the gRPC call.
                    shared.request_sender.take();
                    if let Some(shutdown_writer) = shared.shutdown_writer.take() {
                        shutdown_writer.send(1).ok();
                    }
                    true
                }
                FirestoreListenerStatus::Stopping => true,
                FirestoreListenerStatus::Stopped => false,
            }
        };

        if running && !self.is_own_callback() {
            if let Some(mut dispatching) = self.dispatching.clone() {
                // Closed once the background task has exited
                let _ = dispatching.wait_for(|dispatching| !*dispatching).await;
            }
        }
    }

    fn is_own_callback(&self) -> bool {
        FIRESTORE_LISTENER_DISPATCH
            .try_with(|shared| Arc::ptr_eq(shared, &self.shared))
            .unwrap_or(false)
    }

    pub async fn is_stopped(&self) -> bool {
        self.shared.lock().await.status.is_stopped()
    }

    pub async fn status(&self) -> FirestoreListenerStatus {
        self.shared.lock().await.status
    }

    /// Stops the listener and waits for the background task.
    /// A fatal error that terminated the listener earlier is returned here.
    pub async fn shutdown(&mut self) -> FirestoreResult<()> {
        self.stop().await;
        self.join().await
    }

    /// Waits until the background task exits on its own or after [`stop`](Self::stop).
    pub async fn join(&mut self) -> FirestoreResult<()> {
        match self.handle.take() {
            Some(handle) => {
                let result = handle.await.map_err(|err| {
                    FirestoreError::SystemError(FirestoreSystemError::new(
                        FirestoreErrorPublicGenericDetails::new("ListenerTaskError".into()),
                        format!("Firestore listener task failed: {}", err),
                    ))
                })?;
                debug!("Firestore listener has been finished.");
                result
            }
            None => Ok(()),
        }
    }
}

/// A listener over a single document.
///
/// The callback receives a [`FirestoreDocumentListenSnapshot`] without a
/// document while it doesn't exist.
pub struct FirestoreDocumentListener<D>
where
    D: FirestoreListenSupport,
{
    document_path: String,
    listener: FirestoreListener<D>,
}

impl<D> FirestoreDocumentListener<D>
where
    D: FirestoreListenSupport + Clone + Send + Sync + 'static,
{
    pub fn new(
        db: D,
        document_path: String,
        listener_params: FirestoreListenerParams,
    ) -> FirestoreResult<Self> {
        Ok(Self {
            listener: FirestoreListener::new(
                db,
                FirestoreListenerTargetType::Document(document_path.clone()),
                listener_params,
            )?,
            document_path,
        })
    }

    pub fn document_path(&self) -> &str {
        &self.document_path
    }

    pub async fn start<FN, F>(&mut self, cb: FN) -> FirestoreResult<()>
    where
        FN: Fn(FirestoreDocumentListenSnapshot) -> F + Send + Sync + 'static,
        F: Future<Output = AnyBoxedErrResult<()>> + Send + 'static,
    {
        let document_path = self.document_path.clone();
        self.listener
            .start(move |snapshot| {
                cb(FirestoreDocumentListenSnapshot::from_query_snapshot(
                    &document_path,
                    &snapshot,
                ))
            })
            .await
    }

    pub async fn stop(&self) {
        self.listener.stop().await
    }

    pub async fn is_stopped(&self) -> bool {
        self.listener.is_stopped().await
    }

    pub async fn status(&self) -> FirestoreListenerStatus {
        self.listener.status().await
    }

    pub async fn shutdown(&mut self) -> FirestoreResult<()> {
        self.listener.shutdown().await
    }

    pub async fn join(&mut self) -> FirestoreResult<()> {
        self.listener.join().await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FirestoreListenPassOutcome {
    Continue,
    Restart,
    Stopped,
}

struct FirestoreListenerWorker<D, FN> {
    db: D,
    target_params: FirestoreListenerTargetParams,
    shared: Arc<Mutex<FirestoreListenerShared>>,
    shutdown_receiver: UnboundedReceiver<i8>,
    dispatching: watch::Sender<bool>,
    inventory: FirestoreInventory,
    retry_policy: FirestoreListenerRetryPolicy,
    cb: FN,
}

impl<D, FN, F> FirestoreListenerWorker<D, FN>
where
    D: FirestoreListenSupport + Send + Sync,
    FN: Fn(FirestoreQuerySnapshot) -> F + Send + Sync,
    F: Future<Output = AnyBoxedErrResult<()>> + Send,
{
    async fn run(mut self) -> FirestoreResult<()> {
        let result = self.run_loop().await;

        let mut shared = self.shared.lock().await;
        shared.status = FirestoreListenerStatus::Stopped;
        shared.request_sender = None;
        shared.shutdown_writer = None;
        drop(shared);

        match result {
            Ok(()) => debug!("Firestore listener loop exited."),
            Err(ref err) => error!("Firestore listener terminated with an error: {}", err),
        }
        result
    }

    async fn run_loop(&mut self) -> FirestoreResult<()> {
        loop {
            let requests = match self.open_requests().await? {
                Some(requests) => requests,
                None => return Ok(()),
            };

            match self.listen(requests).await {
                Ok(FirestoreListenPassOutcome::Stopped) => return Ok(()),
                Ok(_) => {
                    self.retry_policy.reset();
                }
                Err(err) if err.is_transient() => match self.retry_policy.next_delay() {
                    Some(delay) => {
                        warn!(
                            attempt = self.retry_policy.attempts(),
                            "Listen stream error: {}. Restarting in {:?}...", err, delay
                        );
                        if !self.suspend(delay).await {
                            return Ok(());
                        }
                    }
                    None => {
                        error!(
                            "Listen stream error: {}. Giving up after {} retries.",
                            err,
                            self.retry_policy.max_retries()
                        );
                        return Err(err);
                    }
                },
                Err(err) => return Err(err),
            }
        }
    }

    // Restarts the inventory and prepares the outbound stream with the initial request.
    // None when the listener is stopping.
    async fn open_requests(&mut self) -> FirestoreResult<Option<UnboundedReceiverStream<ListenRequest>>> {
        let mut shared = self.shared.lock().await;
        if shared.status.is_stopped() {
            return Ok(None);
        }

        self.inventory.restart();
        let request = self
            .target_params
            .to_listen_request(self.db.database_path(), self.inventory.resume_token())?;

        trace!(
            resumed = self.inventory.resume_token().is_some(),
            "Opening a listen stream."
        );

        let (request_sender, request_receiver) = tokio::sync::mpsc::unbounded_channel();
        request_sender.send(request).map_err(|err| {
            FirestoreError::SystemError(FirestoreSystemError::new(
                FirestoreErrorPublicGenericDetails::new("ListenRequestError".into()),
                format!("Unable to queue a listen request: {}", err),
            ))
        })?;
        shared.request_sender = Some(request_sender);

        Ok(Some(UnboundedReceiverStream::new(request_receiver)))
    }

    async fn listen(
        &mut self,
        requests: UnboundedReceiverStream<ListenRequest>,
    ) -> FirestoreResult<FirestoreListenPassOutcome> {
        let opened = tokio::select! {
            _ = self.shutdown_receiver.recv() => None,
            opened = self.db.listen_stream(requests.boxed()) => Some(opened),
        };
        let mut listen_stream = match opened {
            Some(opened) => opened?,
            None => return Ok(FirestoreListenPassOutcome::Stopped),
        };

        loop {
            let next = tokio::select! {
                _ = self.shutdown_receiver.recv() => None,
                tried = listen_stream.try_next() => Some(tried),
            };

            match next {
                None => {
                    debug!("Exiting from the listen stream.");
                    return Ok(FirestoreListenPassOutcome::Stopped);
                }
                Some(Ok(Some(response))) => {
                    let event = FirestoreWatchEvent::try_from(response)?;
                    trace!(kind = event.kind(), "Received a listen event.");
                    match self.handle_event(event).await? {
                        FirestoreListenPassOutcome::Continue => {}
                        outcome => return Ok(outcome),
                    }
                }
                Some(Ok(None)) => {
                    debug!("Listen stream has been closed by the server. Reconnecting...");
                    return Ok(FirestoreListenPassOutcome::Restart);
                }
                Some(Err(err)) => return Err(err),
            }
        }
    }

    async fn handle_event(
        &mut self,
        event: FirestoreWatchEvent,
    ) -> FirestoreResult<FirestoreListenPassOutcome> {
        let target_id = *self.target_params.target.value() as i32;

        match event {
            FirestoreWatchEvent::TargetChange(change) => match change.change_type {
                FirestoreTargetChangeType::NoChange => {
                    self.inventory
                        .commit(change.token().cloned(), change.read_time)?;
                    if self.inventory.is_current() && self.inventory.changed() {
                        return self.publish().await;
                    }
                }
                FirestoreTargetChangeType::Current => {
                    self.inventory
                        .commit(change.token().cloned(), change.read_time)?;
                    self.inventory.mark_current();
                }
                FirestoreTargetChangeType::Reset => {
                    debug!("Listen target has been reset. Resyncing...");
                    self.inventory.reset();
                    return Ok(FirestoreListenPassOutcome::Restart);
                }
                FirestoreTargetChangeType::Add => {
                    trace!(target_ids = ?change.target_ids, "Listen target has been added.");
                }
                FirestoreTargetChangeType::Remove => {
                    return Err(match change.cause {
                        Some(cause) => cause.into(),
                        None => FirestoreError::SystemError(FirestoreSystemError::new(
                            FirestoreErrorPublicGenericDetails::new("TargetRemoved".into()),
                            format!("Listen target has been removed: {:?}", change.target_ids),
                        )),
                    });
                }
            },
            FirestoreWatchEvent::DocumentChange {
                document,
                removed_target_ids,
                ..
            } => {
                if removed_target_ids.contains(&target_id) {
                    self.inventory.delete(&document.name);
                } else {
                    self.inventory.add(document);
                }
            }
            FirestoreWatchEvent::DocumentDelete { path, .. }
            | FirestoreWatchEvent::DocumentRemove { path, .. } => {
                self.inventory.delete(path);
            }
            FirestoreWatchEvent::ExistenceFilter { count, .. } => {
                if count.max(0) as usize != self.inventory.size() {
                    debug!(
                        expected = count,
                        actual = self.inventory.size(),
                        "Existence filter mismatch. Resyncing..."
                    );
                    self.inventory.reset();
                    return Ok(FirestoreListenPassOutcome::Restart);
                }
            }
        }

        Ok(FirestoreListenPassOutcome::Continue)
    }

    async fn publish(&mut self) -> FirestoreResult<FirestoreListenPassOutcome> {
        let snapshot = {
            let shared = self.shared.lock().await;
            if shared.status.is_stopped() {
                return Ok(FirestoreListenPassOutcome::Stopped);
            }
            self.dispatching.send_replace(true);
            self.inventory.build_snapshot()
        };

        trace!(
            documents = snapshot.len(),
            changes = snapshot.changes.len(),
            "Publishing a query snapshot."
        );

        let result = FIRESTORE_LISTENER_DISPATCH
            .scope(self.shared.clone(), (self.cb)(snapshot))
            .await;
        self.dispatching.send_replace(false);

        result.map_err(|err| {
            FirestoreError::SystemError(FirestoreSystemError::new(
                FirestoreErrorPublicGenericDetails::new("ListenerCallbackError".into()),
                format!("Listener callback function error occurred: {}", err),
            ))
        })?;

        if self.shared.lock().await.status.is_stopped() {
            return Ok(FirestoreListenPassOutcome::Stopped);
        }
        Ok(FirestoreListenPassOutcome::Continue)
    }

    // Sleeps before a reconnect unless stopped meanwhile. False when the listener is stopping.
    async fn suspend(&mut self, delay: Duration) -> bool {
        {
            let mut shared = self.shared.lock().await;
            if shared.status.is_stopped() {
                return false;
            }
            shared.status = FirestoreListenerStatus::Suspended;
        }

        let resumed = tokio::select! {
            _ = self.shutdown_receiver.recv() => false,
            _ = tokio::time::sleep(delay) => true,
        };

        let mut shared = self.shared.lock().await;
        if !resumed || shared.status.is_stopped() {
            return false;
        }
        shared.status = FirestoreListenerStatus::Running;
        true
    }
}

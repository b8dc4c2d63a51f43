use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::TrackingConfig;
use crate::coordinate::{self, Coordinate};
use crate::error::{Error, Result};
use crate::route::RouteSource;
use crate::storage::{Position, Session, SessionId, Storage};

/* Simulated movement along a fetched route.

State is just `is_tracking`: Idle -> Tracking on a successful
`start_tracking`, back to Idle on `stop_tracking` or when a tick fails. While
tracking there is exactly one background task that, once per interval,
persists the position at the route cursor and then announces it. Past the end
of the route the last point is repeated until the task is cancelled.

Events are delivered through an unbounded channel so a slow subscriber never
holds up a tick.
*/

#[derive(Clone, Debug, PartialEq)]
pub enum TrackingEvent {
    PositionUpdated(Position),
    Error(String),
}

// Everything the background task shares with the simulator.
#[derive(Clone)]
struct Shared {
    storage: Arc<dyn Storage>,
    events: mpsc::UnboundedSender<TrackingEvent>,
    is_tracking: Arc<AtomicBool>,
}

impl Shared {
    fn emit(&self, event: TrackingEvent) {
        if self.events.send(event).is_err() {
            debug!("[tracking] no subscriber, event dropped");
        }
    }

    fn report(&self, error: &Error) {
        if error.is_cancellation() {
            debug!("[tracking] {}", error.log_message());
            return;
        }
        error!("[tracking] {}", error.log_message());
        self.emit(TrackingEvent::Error(error.user_message()));
    }

    // Used when the loop ends without `stop_tracking`: go back to Idle and
    // close the session so it does not stay active forever.
    async fn abort(&self, mut session: Session, error: Error) {
        self.is_tracking.store(false, Ordering::SeqCst);
        self.report(&error);
        session.finish(Utc::now());
        if let Err(e) = self.storage.update_session(&session).await {
            warn!(
                "[tracking] failed to close session {:?} after error: {:#}",
                session.id, e
            );
        }
    }
}

struct TrackingRun {
    session_id: SessionId,
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct MovementSimulator {
    shared: Shared,
    route_source: Arc<dyn RouteSource>,
    config: TrackingConfig,
    run: Option<TrackingRun>,
}

impl MovementSimulator {
    pub fn new(
        storage: Arc<dyn Storage>,
        route_source: Arc<dyn RouteSource>,
        config: TrackingConfig,
    ) -> (Self, mpsc::UnboundedReceiver<TrackingEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let simulator = MovementSimulator {
            shared: Shared {
                storage,
                events,
                is_tracking: Arc::new(AtomicBool::new(false)),
            },
            route_source,
            config,
            run: None,
        };
        (simulator, receiver)
    }

    pub fn is_tracking(&self) -> bool {
        self.shared.is_tracking.load(Ordering::SeqCst)
    }

    pub fn current_session_id(&self) -> Option<SessionId> {
        if self.is_tracking() {
            self.run.as_ref().map(|run| run.session_id)
        } else {
            None
        }
    }

    /// Returns `false` (and sends an error event) when already tracking or
    /// when no usable route could be fetched. In both cases no session is
    /// created and the state stays Idle.
    pub async fn start_tracking(&mut self, origin: Coordinate, destination: Coordinate) -> bool {
        if self.is_tracking() {
            warn!("[tracking] `start_tracking` called while tracking");
            self.shared
                .emit(TrackingEvent::Error("Tracking is already in progress".to_string()));
            return false;
        }
        self.reap_finished_run().await;

        match self.prepare(origin, destination).await {
            Ok((route, session)) => {
                self.spawn_ticker(route, session);
                true
            }
            Err(error) => {
                self.shared.report(&error);
                false
            }
        }
    }

    async fn prepare(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<(Vec<Coordinate>, Session)> {
        coordinate::validate_origin_and_destination(&origin, &destination)?;
        let route = self.fetch_route(origin, destination).await?;

        let mut session = Session::start(origin, destination, Utc::now());
        let session_id = self
            .shared
            .storage
            .create_session(&session)
            .await
            .map_err(|e| Error::storage("Failed to create session", e))?;
        session.id = Some(session_id);
        Ok((route, session))
    }

    async fn fetch_route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<Vec<Coordinate>> {
        let response = self
            .route_source
            .fetch_route(origin, destination)
            .await
            .map_err(|e| Error::network("Failed to fetch route", e))?;
        if !response.is_ok() {
            return Err(Error::malformed_response(format!(
                "Route request failed with status: {}",
                response.status
            )));
        }
        if response.points.is_empty() {
            return Err(Error::malformed_response("Route contains no points"));
        }
        info!(
            "[tracking] route fetched: points={}, distance={}m, duration={}s",
            response.points.len(),
            response.total_distance,
            response.total_duration
        );
        Ok(response.points)
    }

    fn spawn_ticker(&mut self, route: Vec<Coordinate>, session: Session) {
        // `prepare` always sets the id
        let session_id = session.id.unwrap_or_default();
        let (cancel, cancel_receiver) = watch::channel(false);
        let ticker = Ticker {
            shared: self.shared.clone(),
            route,
            cursor: 0,
            session,
            interval: self.config.tick_interval(),
        };
        self.shared.is_tracking.store(true, Ordering::SeqCst);
        let handle = tokio::spawn(supervise(ticker, cancel_receiver));
        info!("[tracking] started: session_id={}", session_id);
        self.run = Some(TrackingRun {
            session_id,
            cancel,
            handle,
        });
    }

    // A run that ended on its own (tick failure) still has a handle around.
    async fn reap_finished_run(&mut self) {
        if let Some(run) = self.run.take() {
            if let Err(e) = run.handle.await {
                warn!("[tracking] previous tracking task ended abnormally: {}", e);
            }
        }
    }

    /// No-op when Idle. Once this returns the background task has finished,
    /// so nothing else is persisted or announced for the session.
    pub async fn stop_tracking(&mut self) {
        let Some(run) = self.run.take() else {
            return;
        };
        if !self.is_tracking() {
            // the loop already failed and closed its session
            let _ = run.handle.await;
            return;
        }

        // the receiver may already be gone if the task ended, that's fine
        let _ = run.cancel.send(true);
        self.shared.is_tracking.store(false, Ordering::SeqCst);
        if let Err(e) = run.handle.await {
            warn!("[tracking] tracking task ended abnormally: {}", e);
        }

        if let Err(error) = self.finish_active_session().await {
            self.shared.report(&error);
        }
        info!("[tracking] stopped: session_id={}", run.session_id);
    }

    async fn finish_active_session(&self) -> Result<()> {
        let storage = &self.shared.storage;
        let session = storage
            .get_active_session()
            .await
            .map_err(|e| Error::storage("Failed to load active session", e))?;
        match session {
            None => {
                warn!("[tracking] no active session to finish");
                Ok(())
            }
            Some(mut session) => {
                session.finish(Utc::now());
                storage
                    .update_session(&session)
                    .await
                    .map_err(|e| Error::storage("Failed to finish session", e))
            }
        }
    }
}

struct Ticker {
    shared: Shared,
    // never empty, checked before the ticker is created
    route: Vec<Coordinate>,
    cursor: usize,
    session: Session,
    interval: Duration,
}

impl Ticker {
    async fn run(mut self, mut cancel: watch::Receiver<bool>) {
        loop {
            if *cancel.borrow() {
                break;
            }
            if let Err(error) = self.tick().await {
                self.shared.abort(self.session, error).await;
                return;
            }
            tokio::select! {
                biased;
                changed = cancel.changed() => {
                    if changed.is_err() {
                        // the simulator was dropped without stopping
                        self.shared.abort(self.session, Error::cancelled()).await;
                        return;
                    }
                    break;
                }
                _ = wait(self.interval) => (),
            }
        }
        self.shared.report(&Error::cancelled());
        debug!("[tracking] ticker stopped at cursor={}", self.cursor);
    }

    async fn tick(&mut self) -> Result<()> {
        let index = self.cursor.min(self.route.len() - 1);
        let session_id = self.session.id.unwrap_or_default();
        let mut position = Position::new(self.route[index], Utc::now(), session_id);
        let id = self
            .shared
            .storage
            .save_location(&position)
            .await
            .map_err(|e| Error::storage("Failed to save position", e))?;
        position.id = Some(id);
        if self.cursor < self.route.len() {
            self.cursor += 1;
        }
        debug!(
            "[tracking] tick: cursor={}, position={:?}",
            self.cursor, position.coordinate
        );
        self.shared.emit(TrackingEvent::PositionUpdated(position));
        Ok(())
    }
}

// A panic inside the ticker must not go unnoticed until `stop_tracking`.
async fn supervise(ticker: Ticker, cancel: watch::Receiver<bool>) {
    let shared = ticker.shared.clone();
    let session = ticker.session.clone();
    match tokio::spawn(ticker.run(cancel)).await {
        Ok(()) => (),
        Err(e) if e.is_panic() => {
            shared
                .abort(
                    session,
                    Error::unexpected("Tracking stopped unexpectedly", anyhow!("{}", e)),
                )
                .await;
        }
        Err(e) => warn!("[tracking] ticker task cancelled: {}", e),
    }
}

async fn wait(interval: Duration) {
    if interval.is_zero() {
        tokio::task::yield_now().await;
    } else {
        tokio::time::sleep(interval).await;
    }
}

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::config::Config;
use crate::coordinate::Coordinate;
use crate::error;
use crate::heatmap::{self, HeatmapAggregator, HeatmapPoint};
use crate::logs;
use crate::main_db::{MainDb, Setting};
use crate::renderer::HeatmapRenderer;
use crate::route::RouteSource;
use crate::storage::{Position, SessionId};
use crate::tracking::{MovementSimulator, TrackingEvent};

/// Owns one tracking setup: the db, the simulator and what the UI shows
/// (path so far, last heatmap, last error). Nothing here is global, create
/// one per app.
pub struct TrackingApp {
    cache_dir: String,
    main_db: Arc<MainDb>,
    simulator: MovementSimulator,
    events: mpsc::UnboundedReceiver<TrackingEvent>,
    aggregator: HeatmapAggregator,
    crowd_mode: bool,
    path: Vec<Position>,
    heatmap: Vec<HeatmapPoint>,
    last_error: Option<String>,
}

impl TrackingApp {
    pub fn init(
        support_dir: String,
        cache_dir: String,
        route_source: Arc<dyn RouteSource>,
        config: Config,
    ) -> Result<TrackingApp> {
        if let Err(e) = logs::init(&cache_dir) {
            warn!("logging is already initialized: {}", e);
        }

        let main_db = Arc::new(MainDb::open(&support_dir)?);
        let crowd_mode = main_db.get_setting_with_default(Setting::CrowdMode, false);
        let (simulator, events) =
            MovementSimulator::new(main_db.clone(), route_source, config.tracking.clone());
        info!("initialized, crowd_mode={}", crowd_mode);

        Ok(TrackingApp {
            cache_dir,
            main_db,
            simulator,
            events,
            aggregator: HeatmapAggregator::from_config(&config),
            crowd_mode,
            path: Vec::new(),
            heatmap: Vec::new(),
            last_error: None,
        })
    }

    pub fn main_db(&self) -> &MainDb {
        &self.main_db
    }

    pub async fn start_tracking(&mut self, origin: Coordinate, destination: Coordinate) -> bool {
        let started = self.simulator.start_tracking(origin, destination).await;
        if started {
            self.path.clear();
        }
        // surface a failed start right away
        self.pump_events();
        started
    }

    pub async fn stop_tracking(&mut self) {
        self.simulator.stop_tracking().await;
        self.pump_events();
    }

    pub fn is_tracking(&self) -> bool {
        self.simulator.is_tracking()
    }

    pub fn current_session_id(&self) -> Option<SessionId> {
        self.simulator.current_session_id()
    }

    fn apply(&mut self, event: &TrackingEvent) {
        match event {
            TrackingEvent::PositionUpdated(position) => self.path.push(position.clone()),
            TrackingEvent::Error(message) => self.last_error = Some(message.clone()),
        }
    }

    /// Applies every event that is already queued, returns how many.
    pub fn pump_events(&mut self) -> usize {
        let mut count = 0;
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    self.apply(&event);
                    count += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        count
    }

    /// Waits for the next event (and applies it), `None` on timeout.
    pub async fn wait_for_event(&mut self, timeout: Duration) -> Option<TrackingEvent> {
        match tokio::time::timeout(timeout, self.events.recv()).await {
            Ok(Some(event)) => {
                self.apply(&event);
                Some(event)
            }
            Ok(None) | Err(_) => None,
        }
    }

    pub fn path(&self) -> &[Position] {
        &self.path
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    pub fn crowd_mode(&self) -> bool {
        self.crowd_mode
    }

    pub fn set_crowd_mode(&mut self, enable: bool) -> Result<()> {
        self.main_db.set_setting(Setting::CrowdMode, enable)?;
        self.crowd_mode = enable;
        Ok(())
    }

    /// Recomputes the heatmap from stored positions, either of one session
    /// or of everything recorded so far.
    pub async fn refresh_heatmap(
        &mut self,
        scope: Option<SessionId>,
    ) -> error::Result<&[HeatmapPoint]> {
        let positions = match heatmap::load_positions(self.main_db.as_ref(), scope).await {
            Ok(positions) => positions,
            Err(error) => {
                error!("[api] {}", error.log_message());
                self.last_error = Some(error.user_message());
                return Err(error);
            }
        };
        self.heatmap =
            self.aggregator
                .aggregate_with_crowd(&positions, self.crowd_mode, &mut rand::rng());
        debug!(
            "[api] heatmap refreshed: positions={}, points={}",
            positions.len(),
            self.heatmap.len()
        );
        Ok(&self.heatmap)
    }

    pub fn heatmap(&self) -> &[HeatmapPoint] {
        &self.heatmap
    }

    pub fn render(&self, renderer: &mut dyn HeatmapRenderer) -> Result<()> {
        renderer.render(&self.heatmap, &self.path)
    }

    /// Every log line from now on is also sent to the returned receiver,
    /// replacing any earlier subscriber.
    pub fn subscribe_to_log_stream(&self) -> std::sync::mpsc::Receiver<String> {
        let (sink, lines) = std::sync::mpsc::channel();
        logs::set_log_sink(sink);
        lines
    }

    pub fn export_logs(&self, target_file_path: String) -> Result<()> {
        logs::export(&self.cache_dir, &target_file_path)
    }
}

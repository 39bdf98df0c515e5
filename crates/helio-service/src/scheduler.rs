//! Background loops
//!
//! Periodic re-adaptation, sync-mode polling of the reference display,
//! session polling, topology polling with a debouncer, and config file
//! reloads. Each loop waits in `tokio::select!` on its timer, an optional
//! wake-up and the shutdown channel. A shutdown only cancels waiting; a DDC
//! call already on the worker runs to completion.

use helio_config::{ConfigWatcher, SettingsEvent};
use helio_hal::PlatformDisplay;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until};

use crate::controller::Controller;
use crate::error::Result;

/// Coalesces bursts of events into one action
///
/// Every [`touch`](Debouncer::touch) pushes the deadline out by the window;
/// the action is due once the window passes without another touch.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    pub fn set_window(&mut self, window: Duration) {
        self.window = window;
    }

    pub fn touch(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// True once, when the pending deadline has passed
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Output set as seen by the platform, ignoring order
fn fingerprint(mut outputs: Vec<PlatformDisplay>) -> Vec<PlatformDisplay> {
    outputs.sort_by_key(|o| o.id);
    outputs
}

/// Running background loops; dropping it without [`Scheduler::shutdown`]
/// leaves the tasks running until the runtime stops
pub struct Scheduler {
    controller: Arc<Controller>,
    adapt_wake: Arc<Notify>,
    topology_wake: Arc<Notify>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    watcher: Option<ConfigWatcher>,
}

impl Scheduler {
    /// Spawn the adapt, sync, session and topology loops
    pub fn start(controller: Arc<Controller>) -> Self {
        let (shutdown, _) = watch::channel(false);
        let adapt_wake = Arc::new(Notify::new());
        let topology_wake = Arc::new(Notify::new());

        let tasks = vec![
            tokio::spawn(adapt_loop(
                Arc::clone(&controller),
                Arc::clone(&adapt_wake),
                shutdown.subscribe(),
            )),
            tokio::spawn(sync_loop(Arc::clone(&controller), shutdown.subscribe())),
            tokio::spawn(session_loop(
                Arc::clone(&controller),
                Arc::clone(&adapt_wake),
                Arc::clone(&topology_wake),
                shutdown.subscribe(),
            )),
            tokio::spawn(topology_loop(
                Arc::clone(&controller),
                Arc::clone(&adapt_wake),
                Arc::clone(&topology_wake),
                shutdown.subscribe(),
            )),
        ];

        tracing::info!("Background loops started");
        Self {
            controller,
            adapt_wake,
            topology_wake,
            shutdown,
            tasks,
            watcher: None,
        }
    }

    /// Reload settings and re-adapt whenever the config file changes
    pub fn watch_config(&mut self, path: &Path) -> Result<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = ConfigWatcher::watch(path, move |event| {
            let _ = tx.send(event);
        })?;
        self.tasks.push(tokio::spawn(reload_loop(
            Arc::clone(&self.controller),
            Arc::clone(&self.adapt_wake),
            rx,
            self.shutdown.subscribe(),
        )));
        self.watcher = Some(watcher);
        Ok(())
    }

    /// Re-adapt now instead of at the next interval
    pub fn request_adapt(&self) {
        self.adapt_wake.notify_one();
    }

    /// Report a hot-plug or wake event; re-enumeration follows after the
    /// debounce window
    pub fn request_topology(&self) {
        self.topology_wake.notify_one();
    }

    /// Stop every loop and wait for them to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        drop(self.watcher);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!("Background task ended abnormally: {}", e);
            }
        }
        tracing::info!("Background loops stopped");
    }
}

async fn adapt_loop(controller: Arc<Controller>, wake: Arc<Notify>, mut shutdown: watch::Receiver<bool>) {
    loop {
        match controller.trigger_adapt().await {
            Ok(outcome) if !outcome.applied.is_empty() => {
                tracing::debug!(
                    "Adapted {} display(s) in {} mode",
                    outcome.applied.len(),
                    outcome.mode
                );
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Adaptation failed: {}", e),
        }

        let interval = controller.settings().daemon.adapt_interval();
        tokio::select! {
            _ = sleep(interval) => {}
            _ = wake.notified() => {
                tracing::debug!("Adapt loop woken up");
            }
            _ = shutdown.changed() => break,
        }
    }
    tracing::debug!("Adapt loop stopped");
}

async fn sync_loop(controller: Arc<Controller>, mut shutdown: watch::Receiver<bool>) {
    loop {
        let poll = controller.settings().daemon.sync_poll();
        tokio::select! {
            _ = sleep(poll) => {}
            _ = shutdown.changed() => break,
        }
        if let Err(e) = controller.sync_tick().await {
            tracing::warn!("Sync update failed: {}", e);
        }
    }
    tracing::debug!("Sync loop stopped");
}

async fn session_loop(
    controller: Arc<Controller>,
    adapt_wake: Arc<Notify>,
    topology_wake: Arc<Notify>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let state = controller.session_provider().state();
        let change = controller.set_session_state(state);
        if change.resumed {
            // Outputs often reconnect on wake
            topology_wake.notify_one();
            adapt_wake.notify_one();
        } else if change.mode_changed {
            let lid = if state.lid_closed { "closed" } else { "opened" };
            tracing::info!("Lid {}, mode now {}", lid, controller.mode());
            adapt_wake.notify_one();
        }

        let poll = controller.settings().daemon.session_poll();
        tokio::select! {
            _ = sleep(poll) => {}
            _ = shutdown.changed() => break,
        }
    }
    tracing::debug!("Session loop stopped");
}

async fn topology_loop(
    controller: Arc<Controller>,
    adapt_wake: Arc<Notify>,
    topology_wake: Arc<Notify>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut debouncer = Debouncer::new(controller.settings().daemon.debounce());
    let mut last = controller.platform().connected().ok().map(fingerprint);

    loop {
        let poll = controller.settings().daemon.topology_poll();
        tokio::select! {
            _ = sleep(poll) => {
                match controller.platform().connected() {
                    Ok(outputs) => {
                        let current = Some(fingerprint(outputs));
                        if current != last {
                            last = current;
                            debouncer.touch(Instant::now());
                        }
                    }
                    Err(e) => tracing::debug!("Listing outputs failed: {}", e),
                }
            }
            _ = topology_wake.notified() => {
                debouncer.touch(Instant::now());
            }
            _ = until(debouncer.deadline()) => {
                if debouncer.fire(Instant::now()) {
                    match controller.refresh_topology().await {
                        Ok(diff) if !diff.added.is_empty() => adapt_wake.notify_one(),
                        Ok(_) => {}
                        Err(e) => tracing::warn!("Display enumeration failed: {}", e),
                    }
                    debouncer.set_window(controller.settings().daemon.debounce());
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    tracing::debug!("Topology loop stopped");
}

async fn reload_loop(
    controller: Arc<Controller>,
    adapt_wake: Arc<Notify>,
    mut events: mpsc::UnboundedReceiver<SettingsEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut debouncer = Debouncer::new(controller.settings().daemon.debounce());
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(SettingsEvent::Changed(_)) => debouncer.touch(Instant::now()),
                Some(SettingsEvent::Removed(path)) => {
                    tracing::warn!("{} was removed, keeping current settings", path.display());
                }
                None => break,
            },
            _ = until(debouncer.deadline()) => {
                if debouncer.fire(Instant::now()) {
                    match controller.reload_settings() {
                        Ok(()) => adapt_wake.notify_one(),
                        Err(e) => tracing::warn!("Settings reload failed, keeping current settings: {}", e),
                    }
                    debouncer.set_window(controller.settings().daemon.debounce());
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    tracing::debug!("Reload loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debouncer_coalesces_bursts() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_secs(1));
        assert!(!debouncer.fire(start));

        debouncer.touch(start);
        debouncer.touch(start + Duration::from_millis(400));
        debouncer.touch(start + Duration::from_millis(800));

        assert!(!debouncer.fire(start + Duration::from_millis(1200)));
        assert!(debouncer.fire(start + Duration::from_millis(1800)));
        // Fires once per burst
        assert!(!debouncer.fire(start + Duration::from_secs(5)));
        assert!(!debouncer.is_pending());
    }

    #[test]
    fn test_debouncer_deadline_tracks_last_touch() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(500));
        debouncer.touch(start + Duration::from_millis(100));
        assert_eq!(
            debouncer.deadline(),
            Some(start + Duration::from_millis(600))
        );
    }
}

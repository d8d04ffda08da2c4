//! Alert countdown
//!
//! ```text
//! Idle ──arm──▶ Arming(5) ──tick──▶ … ──tick──▶ Arming(1) ──tick──▶ Firing ──dispatch──▶ Idle
//!                  │
//!                  └──────────────── cancel ─────────────────────────▶ Idle
//! ```
//!
//! `Countdown` is the pure state machine. `CountdownController` drives it on
//! tokio timers, one controller per user session. Every arm or cancel bumps a
//! generation counter; a tick task whose generation is stale exits without
//! touching state, so re-arming restarts the count and a cancel observed
//! before `Firing` suppresses the dispatch.

use crate::fanout::Dispatcher;
use crate::message::AlertSender;
use crate::{AlertResult, Contact, DispatchError, Position, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Seconds of grace before an armed alert fires
pub const COUNTDOWN_TICKS: u32 = 5;

pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound on position acquisition
pub const POSITION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CountdownState {
    Idle,
    Arming { seconds_remaining: u32 },
    Firing,
}

/// Pure countdown state machine
#[derive(Debug, Clone)]
pub struct Countdown {
    state: CountdownState,
    ticks: u32,
}

impl Countdown {
    pub fn new(ticks: u32) -> Self {
        Self {
            state: CountdownState::Idle,
            ticks: ticks.max(1),
        }
    }

    pub fn state(&self) -> CountdownState {
        self.state
    }

    /// Start (or restart) from the full duration
    pub fn arm(&mut self) -> CountdownState {
        self.state = CountdownState::Arming {
            seconds_remaining: self.ticks,
        };
        self.state
    }

    /// Advance one second; reaching zero fires
    pub fn tick(&mut self) -> CountdownState {
        if let CountdownState::Arming { seconds_remaining } = self.state {
            self.state = match seconds_remaining.saturating_sub(1) {
                0 => CountdownState::Firing,
                n => CountdownState::Arming {
                    seconds_remaining: n,
                },
            };
        }
        self.state
    }

    pub fn cancel(&mut self) -> Result<()> {
        match self.state {
            CountdownState::Arming { .. } => {
                self.state = CountdownState::Idle;
                Ok(())
            }
            _ => Err(DispatchError::NotArming),
        }
    }

    /// Dispatch handed off; back to idle
    pub fn finish(&mut self) {
        if self.state == CountdownState::Firing {
            self.state = CountdownState::Idle;
        }
    }
}

impl Default for Countdown {
    fn default() -> Self {
        Self::new(COUNTDOWN_TICKS)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PositionError {
    #[error("position unavailable: {0}")]
    Unavailable(String),
    #[error("position request timed out")]
    Timeout,
}

/// Source of the user's current position (high accuracy requested)
#[async_trait]
pub trait PositionProvider: Send + Sync {
    async fn current_position(&self) -> std::result::Result<Position, PositionError>;
}

/// Position already known to the caller (e.g. reported by the client)
#[derive(Debug, Clone, Copy)]
pub struct FixedPosition(pub Option<Position>);

#[async_trait]
impl PositionProvider for FixedPosition {
    async fn current_position(&self) -> std::result::Result<Position, PositionError> {
        self.0
            .ok_or_else(|| PositionError::Unavailable("no position reported".to_string()))
    }
}

/// What to send once the countdown fires
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertRequest {
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub sender: AlertSender,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CountdownConfig {
    pub ticks: u32,
    pub tick_interval: Duration,
    pub position_timeout: Duration,
    /// Used when no position can be acquired
    pub default_position: Position,
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self {
            ticks: COUNTDOWN_TICKS,
            tick_interval: TICK_INTERVAL,
            position_timeout: POSITION_TIMEOUT,
            default_position: Position::fallback(),
        }
    }
}

struct PendingAlert {
    position: Position,
    request: AlertRequest,
}

struct Inner {
    countdown: Countdown,
    generation: u64,
    pending: Option<PendingAlert>,
    last_result: Option<Result<AlertResult>>,
}

struct Shared {
    inner: Mutex<Inner>,
    state_tx: watch::Sender<CountdownState>,
    dispatcher: Dispatcher,
    config: CountdownConfig,
}

/// Async countdown driver, one per session
#[derive(Clone)]
pub struct CountdownController {
    shared: Arc<Shared>,
}

impl CountdownController {
    pub fn new(dispatcher: Dispatcher, config: CountdownConfig) -> Self {
        let (state_tx, _) = watch::channel(CountdownState::Idle);
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    countdown: Countdown::new(config.ticks),
                    generation: 0,
                    pending: None,
                    last_result: None,
                }),
                state_tx,
                dispatcher,
                config,
            }),
        }
    }

    pub fn state(&self) -> CountdownState {
        self.shared.inner.lock().countdown.state()
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<CountdownState> {
        self.shared.state_tx.subscribe()
    }

    /// Outcome of the most recent dispatch
    pub fn last_result(&self) -> Option<Result<AlertResult>> {
        self.shared.inner.lock().last_result.clone()
    }

    /// Capture the position and start the countdown
    ///
    /// Re-arming while armed restarts from the full duration. The state
    /// reads `Arming` at the full count while the fix is pending; ticking
    /// starts once it arrives. A cancel or newer arm during that wait wins.
    pub async fn arm(
        &self,
        consent: bool,
        request: AlertRequest,
        positions: &dyn PositionProvider,
    ) -> Result<CountdownState> {
        if !consent {
            return Err(DispatchError::ConsentRequired);
        }
        if request.contacts.is_empty() {
            return Err(DispatchError::NoContacts);
        }

        // Supersede any running countdown before waiting on the fix
        let generation = {
            let mut inner = self.shared.inner.lock();
            inner.generation += 1;
            inner.pending = None;
            let state = inner.countdown.arm();
            self.shared.state_tx.send_replace(state);
            inner.generation
        };

        let position = self.acquire_position(positions).await;

        let state = {
            let mut inner = self.shared.inner.lock();
            if inner.generation != generation {
                debug!("Arm generation {} superseded during position fix", generation);
                return Ok(inner.countdown.state());
            }
            inner.pending = Some(PendingAlert { position, request });
            let state = inner.countdown.arm();
            self.shared.state_tx.send_replace(state);
            state
        };
        info!(
            "Alert armed at ({:.6}, {:.6}), firing in {}s",
            position.lat, position.lng, self.shared.config.ticks
        );

        let controller = self.clone();
        tokio::spawn(async move { controller.run(generation).await });

        Ok(state)
    }

    /// Abort an armed countdown; nothing is sent
    pub fn cancel(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        inner.countdown.cancel()?;
        inner.generation += 1;
        inner.pending = None;
        self.shared.state_tx.send_replace(CountdownState::Idle);
        info!("Alert countdown cancelled");
        Ok(())
    }

    async fn acquire_position(&self, positions: &dyn PositionProvider) -> Position {
        let config = &self.shared.config;
        match tokio::time::timeout(config.position_timeout, positions.current_position()).await {
            Ok(Ok(position)) => position,
            Ok(Err(e)) => {
                warn!("{}, using default location", e);
                config.default_position
            }
            Err(_) => {
                warn!(
                    "No position fix within {:?}, using default location",
                    config.position_timeout
                );
                config.default_position
            }
        }
    }

    async fn run(self, generation: u64) {
        loop {
            tokio::time::sleep(self.shared.config.tick_interval).await;

            // Cancel and the Firing transition share this lock
            let alert = {
                let mut inner = self.shared.inner.lock();
                if inner.generation != generation {
                    debug!("Countdown generation {} superseded", generation);
                    return;
                }
                let state = inner.countdown.tick();
                self.shared.state_tx.send_replace(state);
                if state != CountdownState::Firing {
                    debug!("Countdown {:?}", state);
                    continue;
                }
                inner.pending.take()
            };

            let result = match alert {
                Some(alert) => {
                    self.shared
                        .dispatcher
                        .dispatch(
                            alert.position,
                            &alert.request.contacts,
                            &alert.request.sender,
                            alert.request.message.as_deref(),
                        )
                        .await
                }
                None => Err(DispatchError::NotArming),
            };

            let mut inner = self.shared.inner.lock();
            inner.last_result = Some(result);
            if inner.generation == generation {
                inner.countdown.finish();
                self.shared.state_tx.send_replace(CountdownState::Idle);
            }
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fanout::tests::{contacts, RecordingTransport};
    use crate::AlertMode;
    use tokio::time::sleep;

    /// Never produces a fix
    struct NoFix;

    #[async_trait]
    impl PositionProvider for NoFix {
        async fn current_position(&self) -> std::result::Result<Position, PositionError> {
            std::future::pending().await
        }
    }

    /// Fix arrives after a delay
    struct SlowFix(Duration, Position);

    #[async_trait]
    impl PositionProvider for SlowFix {
        async fn current_position(&self) -> std::result::Result<Position, PositionError> {
            sleep(self.0).await;
            Ok(self.1)
        }
    }

    fn controller() -> (CountdownController, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = Dispatcher::new(Some(transport.clone()));
        (
            CountdownController::new(dispatcher, CountdownConfig::default()),
            transport,
        )
    }

    fn request() -> AlertRequest {
        AlertRequest {
            contacts: contacts(),
            ..Default::default()
        }
    }

    fn here() -> FixedPosition {
        FixedPosition(Some(Position::new(12.9716, 77.5946)))
    }

    #[test]
    fn test_countdown_state_machine() {
        let mut c = Countdown::default();
        assert_eq!(c.state(), CountdownState::Idle);
        assert_eq!(c.cancel(), Err(DispatchError::NotArming));

        assert_eq!(
            c.arm(),
            CountdownState::Arming {
                seconds_remaining: 5
            }
        );
        for n in (1..5).rev() {
            assert_eq!(
                c.tick(),
                CountdownState::Arming {
                    seconds_remaining: n
                }
            );
        }
        assert_eq!(c.tick(), CountdownState::Firing);
        // Ticks and cancel do nothing while firing
        assert_eq!(c.tick(), CountdownState::Firing);
        assert_eq!(c.cancel(), Err(DispatchError::NotArming));
        c.finish();
        assert_eq!(c.state(), CountdownState::Idle);
    }

    #[test]
    fn test_rearm_restarts() {
        let mut c = Countdown::default();
        c.arm();
        c.tick();
        c.tick();
        assert_eq!(
            c.arm(),
            CountdownState::Arming {
                seconds_remaining: 5
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_never_dispatches() {
        let (controller, transport) = controller();
        controller.arm(true, request(), &here()).await.unwrap();

        sleep(Duration::from_millis(2500)).await;
        assert_eq!(
            controller.state(),
            CountdownState::Arming {
                seconds_remaining: 3
            }
        );
        controller.cancel().unwrap();
        assert_eq!(controller.state(), CountdownState::Idle);

        sleep(Duration::from_secs(10)).await;
        assert!(transport.sent.lock().is_empty());
        assert!(controller.last_result().is_none());
        assert_eq!(controller.cancel(), Err(DispatchError::NotArming));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_countdown_dispatches_once() {
        let (controller, transport) = controller();
        let mut rx = controller.subscribe();
        controller.arm(true, request(), &here()).await.unwrap();
        assert_eq!(
            *rx.borrow_and_update(),
            CountdownState::Arming {
                seconds_remaining: 5
            }
        );

        sleep(Duration::from_millis(5500)).await;
        assert_eq!(controller.state(), CountdownState::Idle);
        assert_eq!(*rx.borrow_and_update(), CountdownState::Idle);

        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 3);
        assert!(sent[0].body.contains("12.971600, 77.594600"));
        drop(sent);

        match controller.last_result() {
            Some(Ok(result)) => {
                assert_eq!(result.mode, AlertMode::Live);
                assert_eq!(result.delivered, 3);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_restarts_countdown() {
        let (controller, transport) = controller();
        controller.arm(true, request(), &here()).await.unwrap();
        sleep(Duration::from_millis(3500)).await;

        controller.arm(true, request(), &here()).await.unwrap();
        sleep(Duration::from_millis(3500)).await;
        // 7s after the first arm, 3.5s after the second
        assert!(transport.sent.lock().is_empty());
        assert_eq!(
            controller.state(),
            CountdownState::Arming {
                seconds_remaining: 2
            }
        );

        sleep(Duration::from_secs(5)).await;
        assert_eq!(transport.sent.lock().len(), 3);
        assert_eq!(controller.state(), CountdownState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_supersedes_while_acquiring_position() {
        let (controller, transport) = controller();
        controller.arm(true, request(), &here()).await.unwrap();
        sleep(Duration::from_millis(3500)).await;

        let slow = SlowFix(Duration::from_secs(3), Position::new(28.6139, 77.209));
        controller.arm(true, request(), &slow).await.unwrap();
        // First countdown would have fired at 5s
        assert!(transport.sent.lock().is_empty());
        assert_eq!(
            controller.state(),
            CountdownState::Arming {
                seconds_remaining: 5
            }
        );

        sleep(Duration::from_millis(5500)).await;
        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|sms| sms.body.contains("28.613900, 77.209000")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_acquiring_position() {
        let (controller, transport) = controller();
        let arming = controller.clone();
        let handle = tokio::spawn(async move {
            let slow = SlowFix(Duration::from_secs(3), Position::new(28.6139, 77.209));
            arming.arm(true, request(), &slow).await
        });

        sleep(Duration::from_secs(1)).await;
        assert_eq!(
            controller.state(),
            CountdownState::Arming {
                seconds_remaining: 5
            }
        );
        controller.cancel().unwrap();

        assert_eq!(handle.await.unwrap(), Ok(CountdownState::Idle));
        sleep(Duration::from_secs(10)).await;
        assert!(transport.sent.lock().is_empty());
        assert_eq!(controller.state(), CountdownState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_position_timeout_uses_default() {
        let (controller, transport) = controller();
        controller.arm(true, request(), &NoFix).await.unwrap();

        sleep(Duration::from_secs(6)).await;
        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 3);
        assert!(sent[0].body.contains("13.082700, 80.270700"));
    }

    #[tokio::test]
    async fn test_arm_preconditions() {
        let (controller, _) = controller();
        assert_eq!(
            controller.arm(false, request(), &here()).await,
            Err(DispatchError::ConsentRequired)
        );
        assert_eq!(
            controller
                .arm(true, AlertRequest::default(), &here())
                .await,
            Err(DispatchError::NoContacts)
        );
        assert_eq!(controller.state(), CountdownState::Idle);
    }
}

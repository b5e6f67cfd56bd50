//! Session Scheduler
//!
//! Drives each session's timers. One background task per session follows the
//! session state: it rolls for bites while WAITING, closes the bite window in
//! BITE and ticks the fight while FIGHTING. Nothing runs while IDLE.
//!
//! Player transitions that change which timer applies (cast, hook) cancel the
//! running task, apply the transition under the session lock, then start a
//! task for the resulting state. A cancelled task never observes the new
//! state, so no stale tick lands on a fresh fight.

use std::sync::Arc;

use chrono::Timelike;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::game::events::SessionEvent;
use crate::game::input::{CastInput, FightAction};
use crate::game::services::PlayerId;
use crate::game::session::{CastResult, FishingSession, SessionError, SessionSnapshot, SessionState};
use crate::network::protocol::ServerMessage;

/// Outbound channel to one connection.
pub type Outbound = mpsc::Sender<ServerMessage>;

/// Result of handing a message to a connection.
pub(crate) enum Phase {
    /// Delivered; carry on.
    Next,
    /// Connection gone.
    Stop,
}

impl Phase {
    pub(crate) fn is_stop(&self) -> bool {
        matches!(self, Phase::Stop)
    }
}

/// A live session plus the task that drives its timers.
pub struct SessionHandle {
    id: Uuid,
    player: PlayerId,
    session: Arc<Mutex<FishingSession>>,
    driver: Mutex<Option<JoinHandle<()>>>,
    outbound: Outbound,
    config: EngineConfig,
}

impl SessionHandle {
    /// Wrap a freshly joined session.
    pub fn new(session: FishingSession, outbound: Outbound, config: EngineConfig) -> Self {
        Self {
            id: session.id(),
            player: session.player(),
            session: Arc::new(Mutex::new(session)),
            driver: Mutex::new(None),
            outbound,
            config,
        }
    }

    /// Session id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Owning player.
    pub fn player(&self) -> PlayerId {
        self.player
    }

    /// Current state.
    pub async fn state(&self) -> SessionState {
        self.session.lock().await.state()
    }

    /// Snapshot of the session.
    pub async fn snapshot(&self) -> SessionSnapshot {
        self.session.lock().await.snapshot()
    }

    /// A timer task is running.
    pub async fn is_driving(&self) -> bool {
        self.driver
            .lock()
            .await
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    /// Cast and start bite checks.
    #[instrument(skip(self), fields(session = %self.id))]
    pub async fn cast(&self, input: CastInput) -> Result<CastResult, SessionError> {
        self.reject_unless("cast", SessionState::Idle).await?;

        let mut driver = self.driver.lock().await;
        stop(&mut driver).await;
        let result = self.session.lock().await.cast(input, Instant::now());
        *driver = self.spawn_driver();
        result
    }

    /// Set the hook and start fight ticks.
    ///
    /// A late hook sends `bite_timeout` before the error comes back.
    #[instrument(skip(self), fields(session = %self.id))]
    pub async fn hook(&self) -> Result<SessionEvent, SessionError> {
        self.reject_unless("hook", SessionState::Bite).await?;

        let mut driver = self.driver.lock().await;
        stop(&mut driver).await;
        let result = self.session.lock().await.hook(Instant::now());
        *driver = self.spawn_driver();

        if result == Err(SessionError::BiteExpired) {
            emit(&self.outbound, ServerMessage::bite_timeout()).await;
        }
        result
    }

    /// Apply a fight action. The running fight task picks it up next tick.
    pub async fn apply_action(&self, action: FightAction) -> Result<(), SessionError> {
        self.session.lock().await.apply_action(action)
    }

    /// Cancel the timer task and wait for it to finish.
    pub async fn shutdown(&self) {
        let mut driver = self.driver.lock().await;
        stop(&mut driver).await;
        debug!(session = %self.id, "Session driver stopped");
    }

    async fn reject_unless(&self, action: &'static str, expected: SessionState) -> Result<(), SessionError> {
        let state = self.session.lock().await.state();
        if state == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidState { action, state })
        }
    }

    fn spawn_driver(&self) -> Option<JoinHandle<()>> {
        let session = self.session.clone();
        let outbound = self.outbound.clone();
        let config = self.config.clone();
        Some(tokio::spawn(drive(session, outbound, config)))
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("player", &self.player)
            .finish()
    }
}

async fn stop(driver: &mut Option<JoinHandle<()>>) {
    if let Some(task) = driver.take() {
        task.abort();
        let _ = task.await;
    }
}

// =============================================================================
// DRIVER
// =============================================================================

/// Run timers for a session until it goes idle or the connection closes.
async fn drive(session: Arc<Mutex<FishingSession>>, outbound: Outbound, config: EngineConfig) {
    loop {
        let state = session.lock().await.state();
        let phase = match state {
            SessionState::Idle => break,
            SessionState::Waiting => run_waiting(&session, &outbound, &config).await,
            SessionState::Bite => run_bite(&session, &outbound).await,
            SessionState::Fighting => run_fight(&session, &outbound, &config).await,
        };
        if let Phase::Stop = phase {
            break;
        }
    }
}

async fn run_waiting(session: &Mutex<FishingSession>, outbound: &Outbound, config: &EngineConfig) -> Phase {
    let period = config.bite_check_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let result = {
            let mut session = session.lock().await;
            if session.state() != SessionState::Waiting {
                return Phase::Next;
            }
            session.check_bite(Instant::now(), hour_of_day(config))
        };

        match result {
            Ok(None) => {}
            Ok(Some(event)) => return emit(outbound, event.into()).await,
            Err(err) => return emit(outbound, reset_notice(&err)).await,
        }
    }
}

async fn run_bite(session: &Mutex<FishingSession>, outbound: &Outbound) -> Phase {
    let deadline = {
        let mut session = session.lock().await;
        match session.bite_deadline() {
            Some(deadline) => deadline,
            None => {
                let err = session.force_reset("bite without a deadline");
                drop(session);
                return emit(outbound, reset_notice(&err)).await;
            }
        }
    };

    sleep_until(deadline).await;

    let result = {
        let mut session = session.lock().await;
        if session.state() != SessionState::Bite {
            return Phase::Next;
        }
        session.expire_bite(Instant::now())
    };

    match result {
        Ok(Some(event)) => emit(outbound, event.into()).await,
        Ok(None) => Phase::Next,
        Err(err) => emit(outbound, reset_notice(&err)).await,
    }
}

async fn run_fight(session: &Mutex<FishingSession>, outbound: &Outbound, config: &EngineConfig) -> Phase {
    let period = config.fight_tick_interval;
    let dt = config.fight_dt();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let result = {
            let mut session = session.lock().await;
            if session.state() != SessionState::Fighting {
                return Phase::Next;
            }
            session.advance_fight(dt, Instant::now())
        };

        match result {
            Ok(event) => {
                let finished = event.is_fight_end();
                if let Phase::Stop = emit(outbound, event.into()).await {
                    return Phase::Stop;
                }
                if finished {
                    return Phase::Next;
                }
            }
            Err(err) => return emit(outbound, reset_notice(&err)).await,
        }
    }
}

/// Timer-side errors only come from a forced reset back to idle.
fn reset_notice(err: &SessionError) -> ServerMessage {
    SessionEvent::Reset { message: err.to_string() }.into()
}

/// Queue a message for the connection.
pub(crate) async fn emit(outbound: &Outbound, msg: ServerMessage) -> Phase {
    let name = msg.name();
    match outbound.send(msg).await {
        Ok(()) => Phase::Next,
        Err(_) => {
            warn!(message = name, "Connection gone, dropping message");
            Phase::Stop
        }
    }
}

fn hour_of_day(config: &EngineConfig) -> u8 {
    config
        .fixed_hour
        .unwrap_or_else(|| chrono::Local::now().hour() as u8)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Duration;

    use crate::game::catalog::{ActiveHours, CatalogFile, FishSpecies, InMemoryCatalog, Location, Rarity};
    use crate::game::services::InMemoryPlayerServices;
    use crate::network::protocol::{CatchResult, ErrorCode};

    fn player() -> PlayerId {
        PlayerId::new([3; 16])
    }

    fn catalog() -> Arc<InMemoryCatalog> {
        let fish = (1..=10)
            .map(|id| FishSpecies {
                id,
                name: "Roach".into(),
                min_weight: 0.2,
                max_weight: 0.6,
                rarity: Rarity::Common,
                base_price: 10,
                strength: 20,
                stamina: 30,
                aggressiveness: 20,
                active_hours: ActiveHours::default(),
                depth_min: 0.0,
                depth_max: 10.0,
                locations: vec![1],
                bait_attraction: BTreeMap::new(),
            })
            .collect();
        let locations = vec![Location {
            id: 1,
            name: "Pond".into(),
            max_depth: 10.0,
            required_level: 1,
            is_active: true,
        }];
        Arc::new(InMemoryCatalog::from_file(CatalogFile { locations, fish }).unwrap())
    }

    fn config() -> EngineConfig {
        EngineConfig { fixed_hour: Some(12), ..EngineConfig::default() }
    }

    fn open() -> (SessionHandle, mpsc::Receiver<ServerMessage>) {
        let services = Arc::new(InMemoryPlayerServices::default());
        services.create_profile(player());
        let config = config();
        let session = FishingSession::join(player(), 1, catalog(), services, config.session_timings(), 9).unwrap();
        let (tx, rx) = mpsc::channel(64);
        (SessionHandle::new(session, tx, config), rx)
    }

    async fn cast_until_bite(handle: &SessionHandle, rx: &mut mpsc::Receiver<ServerMessage>) -> Instant {
        handle.cast(CastInput::new(1.0, 45.0)).await.unwrap();
        match rx.recv().await {
            Some(ServerMessage::Bite { .. }) => Instant::now(),
            other => panic!("expected bite, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_bite_times_out_after_window() {
        let (handle, mut rx) = open();
        let bite_at = cast_until_bite(&handle, &mut rx).await;

        let msg = rx.recv().await.unwrap();
        assert!(matches!(msg, ServerMessage::BiteTimeout { .. }));
        assert_eq!(Instant::now() - bite_at, Duration::from_secs(8));

        let session = handle.session.lock().await;
        assert_eq!(session.state(), SessionState::Waiting);
        assert_eq!(session.next_bite_check_at(), Some(bite_at + Duration::from_secs(18)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_bite_check_after_one_interval() {
        let (handle, _rx) = open();
        let cast_at = Instant::now();
        handle.cast(CastInput::new(0.5, 45.0)).await.unwrap();

        assert_eq!(handle.state().await, SessionState::Waiting);
        assert!(handle.is_driving().await);
        assert_eq!(handle.session.lock().await.next_bite_check_at(), Some(cast_at));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hook_starts_fight_ticks() {
        let (handle, mut rx) = open();
        cast_until_bite(&handle, &mut rx).await;

        let event = handle.hook().await.unwrap();
        assert!(matches!(event, SessionEvent::FightStarted { .. }));
        let hooked_at = Instant::now();

        match rx.recv().await {
            Some(ServerMessage::FightUpdate(view)) => assert!(view.stamina <= 100.0),
            other => panic!("expected fight update, got {:?}", other),
        }
        assert_eq!(Instant::now() - hooked_at, Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fish_escapes_when_given_line() {
        let (handle, mut rx) = open();
        cast_until_bite(&handle, &mut rx).await;
        handle.hook().await.unwrap();

        // Fight starts at 40 m on a 100 m line; give line past 90 m.
        for _ in 0..60 {
            handle.apply_action(FightAction::Release).await.unwrap();
        }

        let result = loop {
            match rx.recv().await {
                Some(ServerMessage::Catch { result }) => break result,
                Some(ServerMessage::FightUpdate(_)) => continue,
                other => panic!("unexpected {:?}", other),
            }
        };
        match result {
            CatchResult::Failure(failure) => assert_eq!(failure.reason, "fish_escaped"),
            CatchResult::Success(_) => panic!("fish should have escaped"),
        }

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(handle.state().await, SessionState::Idle);
        assert!(!handle.is_driving().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_broken_fight_resets_session() {
        let (handle, mut rx) = open();
        cast_until_bite(&handle, &mut rx).await;
        handle.hook().await.unwrap();
        handle.session.lock().await.drop_hooked_fish();

        match rx.recv().await {
            Some(ServerMessage::Error(err)) => assert_eq!(err.code, ErrorCode::SessionReset),
            other => panic!("expected session reset, got {:?}", other),
        }

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(handle.state().await, SessionState::Idle);
        assert!(!handle.is_driving().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_hook_reports_timeout() {
        let (handle, mut rx) = open();
        cast_until_bite(&handle, &mut rx).await;

        // Stop the driver so the window closes without it.
        handle.shutdown().await;
        tokio::time::sleep(Duration::from_secs(9)).await;

        assert_eq!(handle.hook().await, Err(SessionError::BiteExpired));
        assert!(matches!(rx.recv().await, Some(ServerMessage::BiteTimeout { .. })));
        assert_eq!(handle.state().await, SessionState::Waiting);
        assert!(handle.is_driving().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_actions_rejected() {
        let (handle, _rx) = open();

        assert!(matches!(handle.hook().await, Err(SessionError::InvalidState { .. })));
        assert!(matches!(
            handle.apply_action(FightAction::Hold).await,
            Err(SessionError::InvalidState { .. })
        ));
        assert!(!handle.is_driving().await);

        handle.cast(CastInput::new(0.5, 45.0)).await.unwrap();
        assert!(matches!(
            handle.cast(CastInput::new(0.5, 45.0)).await,
            Err(SessionError::InvalidState { .. })
        ));
        assert!(handle.is_driving().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_outbound() {
        let (handle, mut rx) = open();
        handle.cast(CastInput::new(0.5, 45.0)).await.unwrap();

        handle.shutdown().await;
        assert!(!handle.is_driving().await);
        drop(handle);

        assert!(rx.recv().await.is_none());
    }
}

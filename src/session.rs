use std::any::Any;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::broadcast::{BroadcastHub, PushMode, SubscriberId, Subscription};
use crate::constants::{BROADCAST_INTERVAL_MS, SUBSCRIBER_QUEUE_CAPACITY, TICK_INTERVAL_MS};
use crate::engine::{ClockTick, GameEngine};
use crate::error::{Rejection, SessionError};
use crate::types::{Position, Role, Snapshot};

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub seed: Option<u32>,
    pub tick_interval: Duration,
    pub broadcast_interval: Duration,
    pub subscriber_queue: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            seed: None,
            tick_interval: Duration::from_millis(TICK_INTERVAL_MS),
            broadcast_interval: Duration::from_millis(BROADCAST_INTERVAL_MS),
            subscriber_queue: SUBSCRIBER_QUEUE_CAPACITY,
        }
    }
}

/// One live game: the engine behind a single lock, the subscriber hub, and
/// the two background tasks (clock ticker and periodic broadcaster).
///
/// Lock order is engine, then ticker handle, then hub. Forced pushes happen
/// while the engine write lock is still held, so subscribers receive
/// snapshots in mutation order.
pub struct GameSession {
    engine: RwLock<GameEngine>,
    hub: Mutex<BroadcastHub>,
    ticker: Mutex<Option<AbortHandle>>,
    broadcaster: Mutex<Option<AbortHandle>>,
    faults: mpsc::Sender<SessionError>,
    config: SessionConfig,
}

impl GameSession {
    pub fn new(config: SessionConfig) -> (Arc<Self>, mpsc::Receiver<SessionError>) {
        let seed = config.seed.unwrap_or_else(rand::random);
        let (faults, fault_rx) = mpsc::channel(8);
        let session = Arc::new(Self {
            engine: RwLock::new(GameEngine::new(seed)),
            hub: Mutex::new(BroadcastHub::new(
                config.broadcast_interval,
                config.subscriber_queue,
            )),
            ticker: Mutex::new(None),
            broadcaster: Mutex::new(None),
            faults,
            config,
        });
        info!(seed, "session created");
        (session, fault_rx)
    }

    pub async fn start(self: &Arc<Self>) {
        let engine = self.engine.write().await;
        let epoch = engine.epoch();

        let mut ticker = self.ticker.lock().await;
        if ticker.is_none() {
            *ticker = Some(self.spawn_ticker(epoch));
        }
        drop(ticker);

        let mut broadcaster = self.broadcaster.lock().await;
        if broadcaster.is_none() {
            let session = Arc::downgrade(self);
            let period = self.config.broadcast_interval;
            *broadcaster = Some(self.spawn_supervised(
                "broadcast",
                epoch,
                run_broadcaster(session, period),
            ));
        }
        info!(epoch, "session scheduler started");
    }

    pub async fn shutdown(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
        if let Some(handle) = self.broadcaster.lock().await.take() {
            handle.abort();
        }
        info!("session scheduler stopped");
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.engine.read().await.snapshot()
    }

    pub async fn subscribe(&self) -> Subscription {
        self.hub.lock().await.subscribe()
    }

    pub async fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.hub.lock().await.unsubscribe(id)
    }

    pub async fn register(&self, name: &str, role: Role, avatar: &str) -> bool {
        self.register_acked(name, role, avatar, |_| {}).await
    }

    /// Like `register`, but hands the outcome to `ack` before the forced
    /// snapshot goes out, so a reply queued there reaches the client first.
    pub async fn register_acked<A>(&self, name: &str, role: Role, avatar: &str, ack: A) -> bool
    where
        A: FnOnce(bool),
    {
        self.apply_acked(
            "register",
            PushMode::Forced,
            |engine| engine.register(name, role, avatar),
            ack,
        )
        .await
    }

    pub async fn move_player(&self, name: &str, position: Position, rotation: f64) -> bool {
        self.apply("move", PushMode::Periodic, |engine| {
            engine.move_player(name, position, rotation)
        })
        .await
    }

    pub async fn collect_key(&self, name: &str, key_id: u32) -> bool {
        self.apply("collect_key", PushMode::Forced, |engine| {
            engine.collect_key(name, key_id)
        })
        .await
    }

    pub async fn escape(&self, name: &str, position: Option<Position>) -> bool {
        self.apply("escape", PushMode::Forced, |engine| engine.escape(name, position))
            .await
    }

    /// Swaps in a new level and, if the clock is running, a new ticker bound
    /// to the new epoch. Both happen under the engine write lock.
    pub async fn reset(self: &Arc<Self>) -> bool {
        let mut engine = self.engine.write().await;
        engine.reset();
        let epoch = engine.epoch();

        let mut ticker = self.ticker.lock().await;
        if let Some(previous) = ticker.take() {
            previous.abort();
            *ticker = Some(self.spawn_ticker(epoch));
        }
        drop(ticker);

        self.push_locked(&engine, PushMode::Forced).await;
        true
    }

    async fn apply<F>(&self, intent: &'static str, mode: PushMode, op: F) -> bool
    where
        F: FnOnce(&mut GameEngine) -> Result<(), Rejection>,
    {
        self.apply_acked(intent, mode, op, |_| {}).await
    }

    async fn apply_acked<F, A>(&self, intent: &'static str, mode: PushMode, op: F, ack: A) -> bool
    where
        F: FnOnce(&mut GameEngine) -> Result<(), Rejection>,
        A: FnOnce(bool),
    {
        let mut engine = self.engine.write().await;
        let accepted = match op(&mut engine) {
            Ok(()) => true,
            Err(rejection) => {
                debug!(intent, %rejection, "intent rejected");
                false
            }
        };
        ack(accepted);
        if accepted {
            self.push_locked(&engine, mode).await;
        }
        accepted
    }

    async fn publish(&self, mode: PushMode) {
        let engine = self.engine.read().await;
        self.push_locked(&engine, mode).await;
    }

    async fn push_locked(&self, engine: &GameEngine, mode: PushMode) {
        let mut hub = self.hub.lock().await;
        hub.push(mode, || engine.snapshot());
    }

    /// Returns false once the ticker belongs to a superseded epoch.
    async fn tick(&self, epoch: u64) -> bool {
        let mut engine = self.engine.write().await;
        if engine.epoch() != epoch {
            debug!(epoch, current = engine.epoch(), "stale ticker stopped");
            return false;
        }
        if engine.tick_clock() == ClockTick::Expired {
            self.push_locked(&engine, PushMode::Forced).await;
        }
        true
    }

    fn spawn_ticker(self: &Arc<Self>, epoch: u64) -> AbortHandle {
        let session = Arc::downgrade(self);
        let period = self.config.tick_interval;
        self.spawn_supervised("tick", epoch, run_ticker(session, epoch, period))
    }

    fn spawn_supervised<F>(&self, task: &'static str, epoch: u64, future: F) -> AbortHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        let abort = handle.abort_handle();
        let faults = self.faults.clone();
        tokio::spawn(async move {
            let Err(err) = handle.await else {
                return;
            };
            if !err.is_panic() {
                return;
            }
            let message = panic_message(err.into_panic());
            error!(task, epoch, %message, "scheduler task panicked");
            let _ = faults.try_send(SessionError::SchedulerFault {
                task,
                epoch,
                message,
            });
        });
        abort
    }
}

async fn run_ticker(session: Weak<GameSession>, epoch: u64, period: Duration) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    loop {
        interval.tick().await;
        let Some(session) = session.upgrade() else {
            break;
        };
        if !session.tick(epoch).await {
            break;
        }
    }
}

async fn run_broadcaster(session: Weak<GameSession>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        let Some(session) = session.upgrade() else {
            break;
        };
        session.publish(PushMode::Periodic).await;
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Winner;

    fn config() -> SessionConfig {
        SessionConfig {
            seed: Some(4_321),
            ..SessionConfig::default()
        }
    }

    async fn remaining(session: &GameSession) -> u32 {
        session.snapshot().await.game_state.time_remaining
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_decrements_once_per_second() {
        let (session, _faults) = GameSession::new(config());
        session.start().await;
        assert!(session.register("alice", Role::Survivor, "").await);

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(remaining(&session).await, 297);
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn clock_waits_for_first_registration() {
        let (session, _faults) = GameSession::new(config());
        session.start().await;
        tokio::time::sleep(Duration::from_millis(5_500)).await;
        assert_eq!(remaining(&session).await, 300);
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn reset_replaces_the_ticker() {
        let (session, _faults) = GameSession::new(config());
        session.start().await;
        assert!(session.register("alice", Role::Survivor, "").await);
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(remaining(&session).await, 298);

        assert!(session.reset().await);
        let after_reset = session.snapshot().await;
        assert!(after_reset.players.is_empty());
        assert_eq!(after_reset.game_state.time_remaining, 300);
        assert!(!after_reset.game_state.started);

        assert!(session.register("bob", Role::Survivor, "").await);
        // the old ticker would have fired at 3.0s; the new one fires at 3.5s
        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(remaining(&session).await, 300);
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(remaining(&session).await, 299);
        session.shutdown().await;
    }

    #[tokio::test]
    async fn stale_epoch_tick_is_a_no_op() {
        let (session, _faults) = GameSession::new(config());
        assert!(session.register("alice", Role::Survivor, "").await);
        assert!(session.tick(0).await);
        assert_eq!(remaining(&session).await, 299);

        session.reset().await;
        assert!(session.register("alice", Role::Survivor, "").await);
        assert!(!session.tick(0).await);
        assert_eq!(remaining(&session).await, 300);
        assert!(session.tick(1).await);
        assert_eq!(remaining(&session).await, 299);
    }

    #[tokio::test(start_paused = true)]
    async fn clock_expiry_ends_the_game_for_the_hunter() {
        let (session, _faults) = GameSession::new(config());
        session.start().await;
        assert!(session.register("alice", Role::Survivor, "").await);
        tokio::time::sleep(Duration::from_millis(300_500)).await;

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.game_state.time_remaining, 0);
        assert!(snapshot.game_state.over);
        assert_eq!(snapshot.game_state.winner, Some(Winner::Hunter));
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn significant_events_push_immediately_and_moves_are_limited() {
        let (session, _faults) = GameSession::new(config());
        let mut sub = session.subscribe().await;

        assert!(session.register("hank", Role::Hunter, "").await);
        let pushed = sub.receiver.try_recv().expect("register push");
        assert!(pushed.players.contains_key("hank"));

        let free = Position::new(0.0, 1.0);
        assert!(session.move_player("hank", free, 0.0).await);
        assert!(sub.receiver.try_recv().is_err(), "move inside the window is held back");

        tokio::time::advance(Duration::from_millis(150)).await;
        assert!(session.move_player("hank", Position::new(0.0, 0.5), 0.0).await);
        let pushed = sub.receiver.try_recv().expect("move push after window");
        assert_eq!(
            pushed.players.get("hank").map(|p| p.position),
            Some(Position::new(0.0, 0.5))
        );

        assert!(session.reset().await);
        let pushed = sub.receiver.try_recv().expect("reset push");
        assert!(pushed.players.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_broadcast_reaches_idle_subscribers() {
        let (session, _faults) = GameSession::new(config());
        let mut sub = session.subscribe().await;
        session.start().await;

        tokio::time::sleep(Duration::from_millis(350)).await;
        let mut received = 0;
        while sub.receiver.try_recv().is_ok() {
            received += 1;
        }
        assert!(received >= 3, "received {received} periodic snapshots");
        session.shutdown().await;
    }

    #[tokio::test]
    async fn rejected_intents_do_not_push() {
        let (session, _faults) = GameSession::new(config());
        assert!(session.register("alice", Role::Survivor, "").await);
        let mut sub = session.subscribe().await;

        assert!(!session.register("alice", Role::Hunter, "").await);
        assert!(!session.collect_key("nobody", 0).await);
        assert!(!session.escape("alice", None).await);
        assert!(sub.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn slow_subscriber_never_blocks_mutations() {
        let (session, _faults) = GameSession::new(SessionConfig {
            subscriber_queue: 1,
            ..config()
        });
        let _stalled = session.subscribe().await;
        for index in 0..20 {
            let name = format!("player_{index}");
            assert!(session.register(&name, Role::Survivor, "").await);
        }
        assert_eq!(session.snapshot().await.players.len(), 20);
    }

    fn drain(sub: &mut Subscription) -> usize {
        let mut drained = 0;
        while sub.receiver.try_recv().is_ok() {
            drained += 1;
        }
        drained
    }

    #[tokio::test(start_paused = true)]
    async fn key_collection_pushes_inside_the_limiter_window() {
        let (session, _faults) = GameSession::new(config());
        let mut sub = session.subscribe().await;
        assert!(session.register("alice", Role::Survivor, "").await);
        assert_eq!(drain(&mut sub), 1);

        let key_id = session.snapshot().await.keys[0].id;
        assert!(session.collect_key("alice", key_id).await);
        let pushed = sub.receiver.try_recv().expect("collect_key push");
        assert_eq!(pushed.game_state.keys_found, 1);
        assert!(pushed.keys.iter().any(|key| key.id == key_id && key.found));
    }

    #[tokio::test(start_paused = true)]
    async fn escape_pushes_inside_the_limiter_window() {
        let (session, _faults) = GameSession::new(config());
        let mut sub = session.subscribe().await;
        assert!(session.register("alice", Role::Survivor, "").await);
        let snapshot = session.snapshot().await;
        for key in &snapshot.keys {
            assert!(session.collect_key("alice", key.id).await);
        }
        drain(&mut sub);

        let exit = snapshot.escape_point.to_position();
        assert!(session.escape("alice", Some(exit)).await);
        let pushed = sub.receiver.try_recv().expect("escape push");
        assert!(pushed.game_state.over);
        assert_eq!(pushed.game_state.winner, Some(Winner::Survivors));
        assert!(pushed.players.get("alice").map(|p| p.escaped).unwrap_or(false));
    }

    #[tokio::test(start_paused = true)]
    async fn clock_expiry_pushes_the_final_snapshot() {
        let (session, _faults) = GameSession::new(config());
        let mut sub = session.subscribe().await;
        assert!(session.register("alice", Role::Survivor, "").await);
        for _ in 0..299 {
            assert!(session.tick(0).await);
        }
        drain(&mut sub);

        assert!(session.tick(0).await);
        let pushed = sub.receiver.try_recv().expect("expiry push");
        assert_eq!(pushed.game_state.time_remaining, 0);
        assert!(pushed.game_state.over);
        assert_eq!(pushed.game_state.winner, Some(Winner::Hunter));
    }

    #[tokio::test(start_paused = true)]
    async fn register_ack_runs_before_the_forced_push() {
        let (session, _faults) = GameSession::new(config());
        let mut sub = session.subscribe().await;

        let mut outcome = None;
        let accepted = session
            .register_acked("alice", Role::Hunter, "", |accepted| {
                outcome = Some((accepted, sub.receiver.try_recv().is_err()));
            })
            .await;
        assert!(accepted);
        assert_eq!(outcome, Some((true, true)), "ack saw an empty queue");
        assert!(sub.receiver.try_recv().is_ok());

        let mut rejected = None;
        assert!(
            !session
                .register_acked("alice", Role::Survivor, "", |accepted| {
                    rejected = Some(accepted);
                })
                .await
        );
        assert_eq!(rejected, Some(false));
        assert!(sub.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn panicking_task_is_reported_as_fault() {
        let (session, mut faults) = GameSession::new(config());
        session.spawn_supervised("tick", 7, async {
            panic!("clock exploded");
        });
        let fault = faults.recv().await.expect("fault reported");
        match fault {
            SessionError::SchedulerFault {
                task,
                epoch,
                message,
            } => {
                assert_eq!(task, "tick");
                assert_eq!(epoch, 7);
                assert_eq!(message, "clock exploded");
            }
        }
    }
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

use crate::models::messages::{envelope, TimeUpdate};
use crate::services::coordinator::SessionCoordinator;
use crate::services::game_room::GameRoom;

/// Render a second count as the `MM:SS` string clients display.
pub fn format_clock(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

struct ClockState {
    white_seconds: u64,
    black_seconds: u64,
    whites_turn: bool,
}

/// Two-sided countdown driven by a 1 Hz tick.
///
/// Each tick decrements the side to move; a side that is already at zero
/// when its tick arrives loses on time. The side-to-move flag lives here,
/// under the clock's own lock, so ticks never touch the room lock.
///
/// Both room and coordinator handles are non-owning: the registry owns the
/// room, the room owns the clock.
pub struct GameClock {
    room_id: String,
    room: Weak<GameRoom>,
    coordinator: Weak<SessionCoordinator>,
    state: Mutex<ClockState>,
    stopped: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl GameClock {
    pub fn new(
        room_id: String,
        room: Weak<GameRoom>,
        coordinator: Weak<SessionCoordinator>,
        budget: Duration,
    ) -> Self {
        let seconds = budget.as_secs();
        GameClock {
            room_id,
            room,
            coordinator,
            state: Mutex::new(ClockState {
                white_seconds: seconds,
                black_seconds: seconds,
                whites_turn: true,
            }),
            stopped: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    /// Spawn the tick loop. Starting a running clock is a no-op.
    pub async fn start(self: &Arc<Self>) {
        let mut task = self.task.lock().await;
        if task.is_some() || self.stopped.load(Ordering::SeqCst) {
            return;
        }

        let clock = Arc::clone(self);
        *task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            // The first tick of a tokio interval resolves immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                if clock.stopped.load(Ordering::SeqCst) {
                    return;
                }
                if clock.tick().await {
                    return;
                }
            }
        }));
    }

    /// One 1 Hz step. Returns true once the clock has terminated.
    async fn tick(&self) -> bool {
        let mut flag_winner = None;
        let (white, black, whites_turn) = {
            let mut state = self.state.lock().await;
            if state.whites_turn {
                if state.white_seconds == 0 {
                    flag_winner = Some("black");
                } else {
                    state.white_seconds -= 1;
                }
            } else if state.black_seconds == 0 {
                flag_winner = Some("white");
            } else {
                state.black_seconds -= 1;
            }
            (state.white_seconds, state.black_seconds, state.whites_turn)
        };

        if let Some(winner) = flag_winner {
            // Mark ourselves stopped before calling out, so the teardown's
            // own clock.stop() becomes a no-op instead of aborting the task
            // that is running it.
            self.stopped.store(true, Ordering::SeqCst);
            info!(
                "Flag fall in room {}: {} wins on time",
                self.room_id, winner
            );
            if let Some(coordinator) = self.coordinator.upgrade() {
                coordinator
                    .handle_flag_fall(&self.room_id, winner, white, black)
                    .await;
            }
            return true;
        }

        let Some(room) = self.room.upgrade() else {
            self.stopped.store(true, Ordering::SeqCst);
            return true;
        };

        room.set_times(format_clock(white), format_clock(black)).await;
        self.broadcast_time_update(&room, white, black, whites_turn).await;
        false
    }

    /// Flip the side to move and push a fresh `time_update`.
    pub async fn switch_turn(&self) {
        let (white, black, whites_turn) = {
            let mut state = self.state.lock().await;
            state.whites_turn = !state.whites_turn;
            (state.white_seconds, state.black_seconds, state.whites_turn)
        };

        if let Some(room) = self.room.upgrade() {
            self.broadcast_time_update(&room, white, black, whites_turn).await;
        }
    }

    /// Idempotent. After `stop` returns no further tick runs.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self.task.lock().await.take() {
            task.abort();
        }
    }

    pub async fn seconds(&self) -> (u64, u64) {
        let state = self.state.lock().await;
        (state.white_seconds, state.black_seconds)
    }

    pub async fn is_whites_turn(&self) -> bool {
        self.state.lock().await.whites_turn
    }

    async fn broadcast_time_update(&self, room: &GameRoom, white: u64, black: u64, whites_turn: bool) {
        let update = TimeUpdate {
            room_id: self.room_id.clone(),
            white_time: white,
            black_time: black,
            whites_time: format_clock(white),
            blacks_time: format_clock(black),
            is_whites_turn: whites_turn,
        };
        room.broadcast(&envelope("time_update", &update)).await;
    }
}

use tracing::info;

use crate::types::{Role, SessionPhase, Winner};

use super::GameEngine;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockTick {
    /// Not started yet, or already over.
    Idle,
    Running(u32),
    Expired,
}

impl GameEngine {
    pub fn phase(&self) -> SessionPhase {
        match (self.status.started, self.status.over, self.status.winner) {
            (_, true, Some(winner)) => SessionPhase::Over(winner),
            (true, _, _) => SessionPhase::Running,
            _ => SessionPhase::Waiting,
        }
    }

    pub fn tick_clock(&mut self) -> ClockTick {
        if !self.status.started || self.status.over {
            return ClockTick::Idle;
        }
        self.status.time_remaining = self.status.time_remaining.saturating_sub(1);
        if self.status.time_remaining == 0 {
            self.finish(Winner::Hunter, "clock expired");
            return ClockTick::Expired;
        }
        ClockTick::Running(self.status.time_remaining)
    }

    /// Idempotent: once a winner is recorded nothing here fires again.
    /// A session with no survivors never ends by capture.
    pub(super) fn evaluate_outcome(&mut self) {
        if self.status.over {
            return;
        }

        let mut survivors = 0usize;
        let mut caught = 0usize;
        let mut escaped = false;
        for player in self.players.values() {
            if player.role != Role::Survivor {
                continue;
            }
            survivors += 1;
            caught += usize::from(player.caught);
            escaped |= player.escaped;
        }

        if escaped {
            self.finish(Winner::Survivors, "survivor escaped");
        } else if survivors > 0 && caught == survivors {
            self.finish(Winner::Hunter, "every survivor caught");
        }
    }

    fn finish(&mut self, winner: Winner, reason: &'static str) {
        self.status.over = true;
        self.status.winner = Some(winner);
        info!(
            epoch = self.epoch,
            ?winner,
            reason,
            time_remaining = self.status.time_remaining,
            "game over"
        );
    }
}

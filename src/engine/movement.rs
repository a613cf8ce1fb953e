use tracing::info;

use crate::constants::{
    AUTO_ESCAPE_RADIUS, CATCH_RADIUS, ESCAPE_RADIUS, KEY_PICKUP_RADIUS, MOVE_LIMIT,
    OBSTACLE_COLLISION_RADIUS,
};
use crate::error::Rejection;
use crate::types::{PlayerView, Position, Role};

use super::GameEngine;

impl GameEngine {
    pub fn move_player(
        &mut self,
        name: &str,
        position: Position,
        rotation: f64,
    ) -> Result<(), Rejection> {
        self.active_player(name)?;
        if !position.is_finite() || position.x.abs() > MOVE_LIMIT || position.y.abs() > MOVE_LIMIT
        {
            return Err(Rejection::OutOfBounds {
                x: position.x,
                y: position.y,
            });
        }
        if self.collides_with_obstacle(position) {
            return Err(Rejection::Collision {
                x: position.x,
                y: position.y,
            });
        }

        if let Some(player) = self.players.get_mut(name) {
            player.position = position;
            player.rotation = rotation;
        }
        self.run_proximity_checks();
        Ok(())
    }

    pub fn collect_key(&mut self, name: &str, key_id: u32) -> Result<(), Rejection> {
        let player = self.active_player(name)?;
        if player.role != Role::Survivor {
            return Err(Rejection::NotSurvivor);
        }
        let key = self
            .keys
            .iter()
            .find(|key| key.id == key_id)
            .ok_or(Rejection::UnknownKey(key_id))?;
        if key.found {
            return Err(Rejection::KeyAlreadyFound(key_id));
        }

        self.grant_key(name, key_id);
        self.evaluate_outcome();
        Ok(())
    }

    pub fn escape(&mut self, name: &str, position: Option<Position>) -> Result<(), Rejection> {
        let player = self.active_player(name)?;
        if player.role != Role::Survivor {
            return Err(Rejection::NotSurvivor);
        }
        if player.keys_collected < self.status.total_keys {
            return Err(Rejection::MissingKeys {
                have: player.keys_collected,
                need: self.status.total_keys,
            });
        }
        let from = position.unwrap_or(player.position);
        let distance = from.distance_to_cell(self.escape_point);
        if distance >= ESCAPE_RADIUS {
            return Err(Rejection::TooFarFromExit { distance });
        }

        self.mark_escaped(name);
        self.evaluate_outcome();
        Ok(())
    }

    fn active_player(&self, name: &str) -> Result<&PlayerView, Rejection> {
        let player = self.players.get(name).ok_or(Rejection::UnknownPlayer)?;
        if player.is_terminal() {
            return Err(Rejection::PlayerInactive);
        }
        Ok(player)
    }

    fn collides_with_obstacle(&self, position: Position) -> bool {
        self.obstacles.iter().any(|obstacle| {
            position.distance_to_cell(obstacle.position) < OBSTACLE_COLLISION_RADIUS
        })
    }

    // Survivors first (keys, then exit), hunters only after every survivor
    // has been checked.
    fn run_proximity_checks(&mut self) {
        let survivors: Vec<String> = self
            .players
            .iter()
            .filter(|(_, player)| player.is_active_survivor())
            .map(|(name, _)| name.clone())
            .collect();

        for name in &survivors {
            let Some(position) = self.players.get(name).map(|player| player.position) else {
                continue;
            };

            let nearby: Vec<u32> = self
                .keys
                .iter()
                .filter(|key| {
                    !key.found && position.distance_to_cell(key.position) < KEY_PICKUP_RADIUS
                })
                .map(|key| key.id)
                .collect();
            for key_id in nearby {
                self.grant_key(name, key_id);
                self.evaluate_outcome();
            }

            let holds_every_key = self
                .players
                .get(name)
                .map(|player| player.keys_collected >= self.status.total_keys)
                .unwrap_or(false);
            if holds_every_key
                && position.distance_to_cell(self.escape_point) < AUTO_ESCAPE_RADIUS
            {
                self.mark_escaped(name);
                self.evaluate_outcome();
            }
        }

        let hunters: Vec<(String, Position)> = self
            .players
            .iter()
            .filter(|(_, player)| player.role == Role::Hunter)
            .map(|(name, player)| (name.clone(), player.position))
            .collect();

        for (hunter, hunter_position) in hunters {
            let caught: Vec<String> = self
                .players
                .iter()
                .filter(|(_, player)| {
                    player.is_active_survivor()
                        && player.position.distance(hunter_position) < CATCH_RADIUS
                })
                .map(|(name, _)| name.clone())
                .collect();
            for name in caught {
                if let Some(player) = self.players.get_mut(&name) {
                    player.caught = true;
                }
                info!(player = %name, hunter = %hunter, "survivor caught");
                self.evaluate_outcome();
            }
        }
    }

    fn grant_key(&mut self, name: &str, key_id: u32) {
        let Some(key) = self.keys.iter_mut().find(|key| key.id == key_id) else {
            return;
        };
        key.found = true;
        if let Some(player) = self.players.get_mut(name) {
            player.keys_collected += 1;
        }
        self.status.keys_found += 1;
        info!(
            player = name,
            key_id,
            keys_found = self.status.keys_found,
            "key collected"
        );
    }

    fn mark_escaped(&mut self, name: &str) {
        if let Some(player) = self.players.get_mut(name) {
            player.escaped = true;
            info!(player = name, "survivor escaped");
        }
    }
}

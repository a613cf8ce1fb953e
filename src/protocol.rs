use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::types::{Position, Role, Snapshot};

#[derive(Debug, PartialEq)]
pub enum Intent {
    Register {
        name: String,
        role: Role,
        avatar: String,
    },
    Move {
        name: String,
        position: Position,
        rotation: f64,
    },
    CollectKey {
        name: String,
        key_id: u32,
    },
    Escape {
        name: String,
        position: Option<Position>,
    },
    Reset,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    GameState { state: Arc<Snapshot> },
    RegisterSuccess { role: Role },
    RegisterFailed { reason: String },
    Error { message: String },
}

impl ServerMessage {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"error","message":"failed to encode message"}"#.to_string()
        })
    }
}

pub fn parse_intent(raw: &str) -> Option<Intent> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let message_type = object.get("type")?.as_str()?;

    match message_type {
        "register" => {
            let name = parse_name(object.get("name")?)?;
            let role = Role::parse(object.get("role")?.as_str()?)?;
            let avatar = match object.get("avatar") {
                None | Some(Value::Null) => String::new(),
                Some(value) => value.as_str()?.to_string(),
            };
            Some(Intent::Register { name, role, avatar })
        }
        "move" => {
            let name = parse_name(object.get("name")?)?;
            let position = parse_position(object.get("position")?)?;
            let rotation = match object.get("rotation") {
                None | Some(Value::Null) => 0.0,
                Some(value) => finite(value.as_f64()?)?,
            };
            Some(Intent::Move {
                name,
                position,
                rotation,
            })
        }
        "collect_key" => {
            let name = parse_name(object.get("name")?)?;
            let key_id = u32::try_from(object.get("key_id")?.as_u64()?).ok()?;
            Some(Intent::CollectKey { name, key_id })
        }
        "escape" => {
            let name = parse_name(object.get("name")?)?;
            let position = match object.get("position") {
                None | Some(Value::Null) => None,
                Some(value) => Some(parse_position(value)?),
            };
            Some(Intent::Escape { name, position })
        }
        "reset" => Some(Intent::Reset),
        _ => None,
    }
}

fn parse_name(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}

/// Accepts `{"x":..,"y":..}` as well as the `[x, y]` pair older clients send.
fn parse_position(value: &Value) -> Option<Position> {
    let (x, y) = match value {
        Value::Object(object) => (object.get("x")?.as_f64()?, object.get("y")?.as_f64()?),
        Value::Array(items) if items.len() == 2 => (items[0].as_f64()?, items[1].as_f64()?),
        _ => return None,
    };
    Some(Position::new(finite(x)?, finite(y)?))
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

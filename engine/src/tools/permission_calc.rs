//! Permission calculator backend
//!
//! Purely local: folds recognized permission names into a bitfield, or
//! decodes a bitfield back into names. No network involved.

use super::{Result, ToolError};
use serde_json::json;

/// Recognized permissions and their bit values
const PERMISSIONS: &[(&str, u64)] = &[
    ("KICK_MEMBERS", 1 << 1),
    ("BAN_MEMBERS", 1 << 2),
    ("ADMINISTRATOR", 1 << 3),
    ("MANAGE_CHANNELS", 1 << 4),
    ("MANAGE_GUILD", 1 << 5),
    ("VIEW_CHANNEL", 1 << 10),
    ("SEND_MESSAGES", 1 << 11),
    ("MANAGE_MESSAGES", 1 << 13),
    ("CONNECT", 1 << 20),
    ("SPEAK", 1 << 21),
    ("MANAGE_ROLES", 1 << 28),
    ("MANAGE_WEBHOOKS", 1 << 29),
];

pub struct PermissionCalcTool;

impl PermissionCalcTool {
    pub fn new() -> Self {
        Self
    }

    /// Params: `{"action": "calculate", "permissions": ["..."]}` or
    /// `{"action": "parse", "bitfield": 1234}`. Action defaults to
    /// `calculate`.
    pub fn invoke(&self, params: &serde_json::Value) -> Result<serde_json::Value> {
        let action = params
            .get("action")
            .and_then(|v| v.as_str())
            .unwrap_or("calculate");

        match action {
            "calculate" => self.calculate(params),
            "parse" => self.parse(params),
            other => Err(ToolError::Backend(format!(
                "unknown action '{}', expected 'calculate' or 'parse'",
                other
            ))),
        }
    }

    fn calculate(&self, params: &serde_json::Value) -> Result<serde_json::Value> {
        let names = params
            .get("permissions")
            .and_then(|v| v.as_array())
            .ok_or_else(|| ToolError::MissingParameter("permissions".to_string()))?;

        let mut bitfield = 0u64;
        let mut recognized = Vec::new();
        let mut unrecognized = Vec::new();

        for name in names.iter().filter_map(|v| v.as_str()) {
            let upper = name.to_uppercase();
            match PERMISSIONS.iter().find(|(n, _)| *n == upper) {
                Some((n, bit)) => {
                    bitfield |= bit;
                    recognized.push(*n);
                }
                None => unrecognized.push(upper),
            }
        }

        Ok(json!({
            "bitfield": bitfield,
            "permissions": recognized,
            "unrecognized": unrecognized,
        }))
    }

    fn parse(&self, params: &serde_json::Value) -> Result<serde_json::Value> {
        let bitfield = params
            .get("bitfield")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| ToolError::MissingParameter("bitfield".to_string()))?;

        let names: Vec<&str> = PERMISSIONS
            .iter()
            .filter(|(_, bit)| bitfield & bit != 0)
            .map(|(name, _)| *name)
            .collect();

        Ok(json!({
            "bitfield": bitfield,
            "permissions": names,
        }))
    }
}

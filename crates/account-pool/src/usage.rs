//! Defensive usage parsing for GoFile account documents
//!
//! The account document has no stable schema. Traffic figures have appeared as
//! a nested object (`traffic`, `monthlyTraffic`, `bandwidth`) or as flat keys
//! (`trafficUsed`, `monthlyTrafficLimit`, ...), as integers, floats, or numeric
//! strings. Anything unrecognised yields `None` rather than an error.

use serde_json::Value;

const NESTED_KEYS: &[&str] = &["traffic", "monthlyTraffic", "bandwidth"];
const NESTED_USED_KEYS: &[&str] = &["used", "current", "value"];
const NESTED_LIMIT_KEYS: &[&str] = &["limit", "max", "quota"];
const FLAT_USED_KEYS: &[&str] = &["trafficUsed", "monthlyTrafficUsed"];
const FLAT_LIMIT_KEYS: &[&str] = &["trafficLimit", "monthlyTrafficLimit"];

/// Traffic figures read from an account document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub used_bytes: u64,
    pub limit_bytes: u64,
}

/// Extract used and limit bytes from an account-info document.
///
/// Returns `None` unless both figures are present and the limit is non-zero.
pub fn parse_usage(info: &Value) -> Option<Usage> {
    let data = info.get("data").filter(|d| d.is_object()).unwrap_or(info);

    for key in NESTED_KEYS {
        if let Some(traffic) = data.get(*key).filter(|t| t.is_object())
            && let Some(usage) = usage_from(traffic, NESTED_USED_KEYS, NESTED_LIMIT_KEYS)
        {
            return Some(usage);
        }
    }

    usage_from(data, FLAT_USED_KEYS, FLAT_LIMIT_KEYS)
}

fn usage_from(obj: &Value, used_keys: &[&str], limit_keys: &[&str]) -> Option<Usage> {
    let used = first_number(obj, used_keys)?;
    let limit = first_number(obj, limit_keys)?;
    if limit == 0 {
        return None;
    }
    Some(Usage {
        used_bytes: used,
        limit_bytes: limit,
    })
}

fn first_number(obj: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|key| obj.get(*key).and_then(as_bytes))
}

/// Interpret a JSON value as a non-negative byte count.
fn as_bytes(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite() && *f >= 0.0)
                    .map(|f| f as u64)
            })
        }
        _ => None,
    }
}

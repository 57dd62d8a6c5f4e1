//! Environment variable helpers for `TW_*` overrides
//!
//! Unset or unparsable variables fall back to the supplied default, so a
//! typo in the environment never aborts startup.

use std::str::FromStr;

/// Read `key` parsed as `T`, or `default`
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Read `key` as a boolean switch
///
/// `1`, `true`, `yes`, `on` are true and `0`, `false`, `no`, `off` are false
/// (case-insensitive). Anything else, including unset, yields `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => parse_switch(&val).unwrap_or(default),
        Err(_) => default,
    }
}

/// Read `key` parsed as `T` if it is set and valid
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn parse_switch(val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

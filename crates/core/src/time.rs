//! `serde` (de)serialization helpers for human-readable durations in
//! config, e.g. `"60s"`, `"10m"`.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

/// Parse durations like `"60s"`, `"10m"`, `"1h"`, or a bare integer of
/// seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
	let s = s.trim();
	if let Ok(secs) = s.parse::<u64>() {
		return Ok(Duration::from_secs(secs));
	}
	let (num, unit) = s.split_at(s.len().saturating_sub(1));
	let n: u64 = num
		.parse()
		.map_err(|_| format!("invalid duration: {s:?}"))?;
	let mul = match unit {
		"s" => 1,
		"m" => 60,
		"h" => 3600,
		_ => return Err(format!("invalid duration unit in {s:?}")),
	};
	Ok(Duration::from_secs(n * mul))
}

pub mod serde_dur {
	use super::*;

	pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
		s.serialize_str(&format!("{}s", d.as_secs()))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
		let s = String::deserialize(d)?;
		parse_duration(&s).map_err(serde::de::Error::custom)
	}
}

pub mod serde_dur_option {
	use super::*;

	pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
		match d {
			Some(d) => s.serialize_str(&format!("{}s", d.as_secs())),
			None => s.serialize_none(),
		}
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
		let s: Option<String> = Option::deserialize(d)?;
		match s {
			Some(s) => parse_duration(&s).map(Some).map_err(serde::de::Error::custom),
			None => Ok(None),
		}
	}
}

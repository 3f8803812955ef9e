//! The upstream retry policy (§4.4): a bounded retry count plus a fixed
//! delay between attempts, in the same declarative shape the rest of this
//! codebase uses for its own retry policies.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// `attempts` is the number of *retries* after the first attempt (so a
/// failing iteration-0 call is still only ever tried once; see
/// `UpstreamClient`, which never consults this policy for iteration 0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Policy {
	pub attempts: u32,
	#[serde(with = "humantime_secs")]
	pub delay: Duration,
}

impl Default for Policy {
	fn default() -> Self {
		Policy {
			attempts: 2,
			delay: Duration::from_secs(5),
		}
	}
}

mod humantime_secs {
	use std::time::Duration;

	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
		s.serialize_u64(d.as_secs())
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
		Ok(Duration::from_secs(u64::deserialize(d)?))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_matches_spec_defaults() {
		let policy = Policy::default();
		assert_eq!(policy.attempts, 2);
		assert_eq!(policy.delay, Duration::from_secs(5));
	}
}

//! Resource limits configuration for sandboxed execution

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Resource limits for one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Wall-clock limit per RUN; the run is interrupted when it passes.
    /// `"none"` (or a zero duration) disables it.
    #[serde(with = "optional_limit")]
    pub max_duration: Option<Duration>,

    /// Output forwarded per RUN before the rest is dropped; 0 disables it
    #[serde(with = "optional_bytes")]
    pub max_output_bytes: Option<usize>,

    /// How long the host waits for READY after INIT
    #[serde(with = "humantime_serde")]
    pub init_timeout: Duration,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        LimitsProfile::Standard.limits()
    }
}

impl ResourceLimits {
    pub fn for_profile(profile: LimitsProfile) -> Self {
        profile.limits()
    }
}

/// Named limit presets, selectable from the CLI or `RUNBOX_LIMITS`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LimitsProfile {
    #[default]
    Standard,
    /// Short runs and small output, for untrusted code
    Strict,
    /// Long runs, for trusted code
    Permissive,
    /// No run deadline and no output cap (dangerous!)
    Unlimited,
}

impl LimitsProfile {
    pub fn limits(self) -> ResourceLimits {
        match self {
            LimitsProfile::Standard => ResourceLimits {
                max_duration: Some(Duration::from_secs(30)), // 30 seconds default
                max_output_bytes: Some(1024 * 1024),         // 1 MB default
                init_timeout: Duration::from_secs(30),
            },
            LimitsProfile::Strict => ResourceLimits {
                max_duration: Some(Duration::from_secs(5)), // 5 seconds
                max_output_bytes: Some(64 * 1024),          // 64 KB
                init_timeout: Duration::from_secs(10),
            },
            LimitsProfile::Permissive => ResourceLimits {
                max_duration: Some(Duration::from_secs(300)), // 5 minutes
                max_output_bytes: Some(16 * 1024 * 1024),     // 16 MB
                init_timeout: Duration::from_secs(60),
            },
            LimitsProfile::Unlimited => ResourceLimits {
                max_duration: None,
                max_output_bytes: None,
                init_timeout: Duration::from_secs(30),
            },
        }
    }
}

impl fmt::Display for LimitsProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitsProfile::Standard => write!(f, "standard"),
            LimitsProfile::Strict => write!(f, "strict"),
            LimitsProfile::Permissive => write!(f, "permissive"),
            LimitsProfile::Unlimited => write!(f, "unlimited"),
        }
    }
}

impl FromStr for LimitsProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standard" | "default" => Ok(LimitsProfile::Standard),
            "strict" => Ok(LimitsProfile::Strict),
            "permissive" => Ok(LimitsProfile::Permissive),
            "unlimited" | "none" => Ok(LimitsProfile::Unlimited),
            other => Err(format!("unknown limits profile: {}", other)),
        }
    }
}

/// `Option<Duration>` as a humantime string, with `None` written as `"none"`.
mod optional_limit {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    const NONE: &str = "none";

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => humantime_serde::serialize(duration, s),
            None => s.serialize_str(NONE),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let text = String::deserialize(d)?;
        if text.trim().eq_ignore_ascii_case(NONE) {
            return Ok(None);
        }
        let duration = humantime_serde::re::humantime::parse_duration(&text)
            .map_err(serde::de::Error::custom)?;
        Ok((!duration.is_zero()).then_some(duration))
    }
}

/// `Option<usize>` with `None` written as 0.
mod optional_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<usize>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.unwrap_or(0) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<usize>, D::Error> {
        let bytes = usize::deserialize(d)?;
        Ok((bytes > 0).then_some(bytes))
    }
}

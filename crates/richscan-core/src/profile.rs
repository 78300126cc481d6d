//! Adaptive scanner profiles.
//!
//! A local indexer (loopback, private network, cluster-internal DNS) can take
//! large batches with short timeouts; a public, rate-limited one gets small
//! batches, long timeouts and frequent checkpoints. Selection is a pure
//! function of the endpoint URL, overridable field-by-field.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::{Host, Url};

/// Apparent locality of an indexer endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointClass {
    Local,
    Public,
}

/// Named profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Low latency indexer: big batches, rare checkpoints.
    Aggressive,
    /// Third-party indexer: small batches, frequent checkpoints.
    Conservative,
}

impl ScanMode {
    /// The mode used for an endpoint of the given class.
    pub fn for_class(class: EndpointClass) -> Self {
        match class {
            EndpointClass::Local => Self::Aggressive,
            EndpointClass::Public => Self::Conservative,
        }
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aggressive => write!(f, "aggressive"),
            Self::Conservative => write!(f, "conservative"),
        }
    }
}

impl FromStr for ScanMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aggressive" | "local" => Ok(Self::Aggressive),
            "conservative" | "public" => Ok(Self::Conservative),
            other => Err(format!("unknown scanner mode '{other}'")),
        }
    }
}

/// Pacing parameters the scan engine runs with. All fields are positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannerProfile {
    pub mode: ScanMode,
    /// Per-request timeout for indexer calls.
    pub timeout_ms: u64,
    /// Retries after the first attempt on transient errors.
    pub retry_limit: u32,
    /// Blocks scanned between throttle pauses.
    pub batch_size: u64,
    /// Pause after every `batch_size` blocks.
    pub throttle_delay_ms: u64,
    /// Blocks scanned between checkpoint writes.
    pub checkpoint_interval: u64,
}

impl ScannerProfile {
    pub const AGGRESSIVE: Self = Self {
        mode: ScanMode::Aggressive,
        timeout_ms: 10_000,
        retry_limit: 3,
        batch_size: 500,
        throttle_delay_ms: 10,
        checkpoint_interval: 1_000,
    };

    pub const CONSERVATIVE: Self = Self {
        mode: ScanMode::Conservative,
        timeout_ms: 30_000,
        retry_limit: 5,
        batch_size: 25,
        throttle_delay_ms: 500,
        checkpoint_interval: 100,
    };

    /// The unmodified base profile for a mode.
    pub fn base(mode: ScanMode) -> Self {
        match mode {
            ScanMode::Aggressive => Self::AGGRESSIVE,
            ScanMode::Conservative => Self::CONSERVATIVE,
        }
    }

    /// Re-resolve this profile under a different mode, keeping `overrides`.
    pub fn update_profile(&self, mode: ScanMode, overrides: &ProfileOverrides) -> Self {
        resolve_profile(mode, overrides)
    }
}

/// Explicitly configured profile fields. Unset (or zero) fields keep the
/// base profile's value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileOverrides {
    /// Force a mode instead of classifying the endpoint.
    pub mode: Option<ScanMode>,
    pub timeout_ms: Option<u64>,
    pub retry_limit: Option<u32>,
    pub batch_size: Option<u64>,
    pub throttle_delay_ms: Option<u64>,
    pub checkpoint_interval: Option<u64>,
}

/// Merge the named base profile with `overrides`.
pub fn resolve_profile(mode: ScanMode, overrides: &ProfileOverrides) -> ScannerProfile {
    fn pick<T: Copy + PartialOrd + Default>(value: Option<T>, base: T) -> T {
        match value {
            Some(v) if v > T::default() => v,
            _ => base,
        }
    }

    let base = ScannerProfile::base(mode);
    ScannerProfile {
        mode,
        timeout_ms: pick(overrides.timeout_ms, base.timeout_ms),
        retry_limit: pick(overrides.retry_limit, base.retry_limit),
        batch_size: pick(overrides.batch_size, base.batch_size),
        throttle_delay_ms: pick(overrides.throttle_delay_ms, base.throttle_delay_ms),
        checkpoint_interval: pick(overrides.checkpoint_interval, base.checkpoint_interval),
    }
}

/// Resolve the profile for an endpoint: an explicit mode override wins,
/// otherwise the URL is classified.
pub fn profile_for_endpoint(endpoint: &str, overrides: &ProfileOverrides) -> ScannerProfile {
    let mode = overrides
        .mode
        .unwrap_or_else(|| ScanMode::for_class(classify(endpoint)));
    resolve_profile(mode, overrides)
}

// ─── Classification ───────────────────────────────────────────────────────────

const INTERNAL_SUFFIXES: &[&str] = &[".localhost", ".local", ".internal", ".svc", ".cluster.local", ".lan"];

/// Classify an indexer URL as local or public.
///
/// Unparseable input is public.
pub fn classify(endpoint: &str) -> EndpointClass {
    let endpoint = endpoint.trim();
    let parsed = Url::parse(endpoint)
        .ok()
        .filter(|u| u.has_host())
        .or_else(|| Url::parse(&format!("http://{endpoint}")).ok());

    let Some(url) = parsed else {
        return EndpointClass::Public;
    };

    let local = match url.host() {
        Some(Host::Ipv4(ip)) => is_local_v4(ip),
        Some(Host::Ipv6(ip)) => is_local_v6(ip),
        Some(Host::Domain(domain)) => match domain.parse::<IpAddr>() {
            Ok(IpAddr::V4(ip)) => is_local_v4(ip),
            Ok(IpAddr::V6(ip)) => is_local_v6(ip),
            Err(_) => is_internal_name(domain),
        },
        None => false,
    };

    if local {
        EndpointClass::Local
    } else {
        EndpointClass::Public
    }
}

fn is_local_v4(ip: Ipv4Addr) -> bool {
    ip.is_loopback() || ip.is_private() || ip.is_link_local() || ip.is_unspecified()
}

/// Loopback, unique local (`fc00::/7`), link-local (`fe80::/10`) and
/// IPv4-mapped local addresses.
fn is_local_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || (first & 0xfe00) == 0xfc00
        || (first & 0xffc0) == 0xfe80
        || ip.to_ipv4_mapped().is_some_and(is_local_v4)
}

fn is_internal_name(host: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    if host.is_empty() {
        return false;
    }
    // Single-label names ("indexer", "blockbook") are compose/k8s service names.
    host == "localhost"
        || !host.contains('.')
        || INTERNAL_SUFFIXES.iter().any(|suffix| host.ends_with(suffix))
}

// ─── Tests ────────────────────────────────────────────────────────────────────

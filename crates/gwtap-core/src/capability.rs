//! Negotiated gateway capability bitmask.
//!
//! The bitmask is captured from the first identify the client sends and then
//! persists across reconnects until [`CapabilityNegotiator::reset`] is called.
//! Operators may override it at any time; the interception pipeline reads it
//! through a single atomic snapshot per frame.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CapabilityError;

// ─── Constants ────────────────────────────────────────────────────

/// Number of addressable capability bits.
pub const CAPABILITY_BITS: u8 = 32;

/// Sentinel stored while no bitmask has been negotiated. Any value above
/// `u32::MAX` works; only this one is ever written.
const UNSET: u64 = 1 << 32;

// ─── Flag catalog ─────────────────────────────────────────────────

/// Capability bits with known semantics. Positions not listed here are
/// reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum CapabilityFlag {
    LazyUserNotes,
    NoAffineUserIds,
    VersionedReadStates,
    VersionedUserGuildSettings,
    DedupeUserObjects,
    PrioritizedReadyPayload,
    MultipleGuildExperimentPopulations,
    NonChannelReadStates,
    AuthTokenRefresh,
    UserSettingsProto,
    ClientStateV2,
    PassiveGuildUpdate,
    AutoCallConnect,
    DebounceMessageReactions,
    PassiveGuildUpdateV2,
    AutoLobbyConnect,
}

impl CapabilityFlag {
    pub const ALL: [Self; 16] = [
        Self::LazyUserNotes,
        Self::NoAffineUserIds,
        Self::VersionedReadStates,
        Self::VersionedUserGuildSettings,
        Self::DedupeUserObjects,
        Self::PrioritizedReadyPayload,
        Self::MultipleGuildExperimentPopulations,
        Self::NonChannelReadStates,
        Self::AuthTokenRefresh,
        Self::UserSettingsProto,
        Self::ClientStateV2,
        Self::PassiveGuildUpdate,
        Self::AutoCallConnect,
        Self::DebounceMessageReactions,
        Self::PassiveGuildUpdateV2,
        Self::AutoLobbyConnect,
    ];

    /// Bit position of this flag.
    pub fn position(self) -> u8 {
        match self {
            Self::LazyUserNotes => 0,
            Self::NoAffineUserIds => 1,
            Self::VersionedReadStates => 2,
            Self::VersionedUserGuildSettings => 3,
            Self::DedupeUserObjects => 4,
            Self::PrioritizedReadyPayload => 5,
            Self::MultipleGuildExperimentPopulations => 6,
            Self::NonChannelReadStates => 7,
            Self::AuthTokenRefresh => 8,
            Self::UserSettingsProto => 9,
            Self::ClientStateV2 => 10,
            Self::PassiveGuildUpdate => 11,
            Self::AutoCallConnect => 12,
            Self::DebounceMessageReactions => 13,
            Self::PassiveGuildUpdateV2 => 14,
            Self::AutoLobbyConnect => 16,
        }
    }

    pub fn bit(self) -> u32 {
        1 << self.position()
    }

    pub fn from_position(position: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|flag| flag.position() == position)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LazyUserNotes => "LAZY_USER_NOTES",
            Self::NoAffineUserIds => "NO_AFFINE_USER_IDS",
            Self::VersionedReadStates => "VERSIONED_READ_STATES",
            Self::VersionedUserGuildSettings => "VERSIONED_USER_GUILD_SETTINGS",
            Self::DedupeUserObjects => "DEDUPE_USER_OBJECTS",
            Self::PrioritizedReadyPayload => "PRIORITIZED_READY_PAYLOAD",
            Self::MultipleGuildExperimentPopulations => "MULTIPLE_GUILD_EXPERIMENT_POPULATIONS",
            Self::NonChannelReadStates => "NON_CHANNEL_READ_STATES",
            Self::AuthTokenRefresh => "AUTH_TOKEN_REFRESH",
            Self::UserSettingsProto => "USER_SETTINGS_PROTO",
            Self::ClientStateV2 => "CLIENT_STATE_V2",
            Self::PassiveGuildUpdate => "PASSIVE_GUILD_UPDATE",
            Self::AutoCallConnect => "AUTO_CALL_CONNECT",
            Self::DebounceMessageReactions => "DEBOUNCE_MESSAGE_REACTIONS",
            Self::PassiveGuildUpdateV2 => "PASSIVE_GUILD_UPDATE_V2",
            Self::AutoLobbyConnect => "AUTO_LOBBY_CONNECT",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::LazyUserNotes => "User notes are fetched on demand instead of shipped in READY",
            Self::NoAffineUserIds => "READY omits affine user id hints",
            Self::VersionedReadStates => {
                "read_state arrives as a versioned object instead of a bare array"
            }
            Self::VersionedUserGuildSettings => {
                "user_guild_settings arrives as a versioned object instead of a bare array"
            }
            Self::DedupeUserObjects => "User objects are deduplicated into a top-level users list",
            Self::PrioritizedReadyPayload => {
                "Low-priority READY data is deferred to READY_SUPPLEMENTAL"
            }
            Self::MultipleGuildExperimentPopulations => {
                "Guild experiments may carry several populations"
            }
            Self::NonChannelReadStates => "Read states cover non-channel entities",
            Self::AuthTokenRefresh => "Server may rotate the auth token mid-session",
            Self::UserSettingsProto => "User settings are delivered as protobuf",
            Self::ClientStateV2 => "Guild records nest their fields under a properties object",
            Self::PassiveGuildUpdate => "Unfocused guilds receive passive updates",
            Self::AutoCallConnect => "Calls connect automatically when ringing",
            Self::DebounceMessageReactions => "Reaction events are debounced server-side",
            Self::PassiveGuildUpdateV2 => "Passive guild updates use the v2 event shape",
            Self::AutoLobbyConnect => "Lobbies connect automatically",
        }
    }

    /// Known flags set in `mask`, in bit order.
    pub fn flags(mask: u32) -> Vec<Self> {
        Self::ALL
            .into_iter()
            .filter(|flag| mask & flag.bit() != 0)
            .collect()
    }

    /// Combine flags into a bitmask.
    pub fn mask(flags: &[Self]) -> u32 {
        flags.iter().fold(0, |acc, flag| acc | flag.bit())
    }
}

impl fmt::Display for CapabilityFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-readable description of one bit position, known or reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BitDescription {
    pub position: u8,
    pub name: &'static str,
    pub description: &'static str,
    pub known: bool,
}

/// Describe bit `position` (0..=31).
pub fn describe_bit(position: u8) -> Result<BitDescription, CapabilityError> {
    if position >= CAPABILITY_BITS {
        return Err(CapabilityError::BitOutOfRange(position));
    }
    Ok(match CapabilityFlag::from_position(position) {
        Some(flag) => BitDescription {
            position,
            name: flag.as_str(),
            description: flag.description(),
            known: true,
        },
        None => BitDescription {
            position,
            name: "RESERVED",
            description: "Reserved or unknown capability",
            known: false,
        },
    })
}

// ─── Negotiator ───────────────────────────────────────────────────

/// Owner of the negotiated capability bitmask.
///
/// Create one per logical session and share it (`Arc`) between the
/// interception pipeline and whatever operator surface edits the mask.
#[derive(Debug)]
pub struct CapabilityNegotiator {
    bits: AtomicU64,
}

impl Default for CapabilityNegotiator {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityNegotiator {
    /// Create a negotiator with no bitmask captured yet.
    pub fn new() -> Self {
        Self {
            bits: AtomicU64::new(UNSET),
        }
    }

    /// Create a negotiator pre-seeded with `mask`, as if already captured.
    pub fn with_mask(mask: u32) -> Self {
        Self {
            bits: AtomicU64::new(u64::from(mask)),
        }
    }

    /// Record `initial` unless a bitmask is already held (first write wins).
    ///
    /// Returns `true` when this call performed the capture.
    pub fn capture(&self, initial: u32) -> bool {
        self.bits
            .compare_exchange(UNSET, u64::from(initial), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Current bitmask, or `None` before the first capture.
    pub fn get(&self) -> Option<u32> {
        decode(self.bits.load(Ordering::Acquire))
    }

    /// Overwrite the bitmask unconditionally.
    ///
    /// Negative or out-of-range values are rejected before anything is
    /// written.
    pub fn set_raw(&self, value: i64) -> Result<u32, CapabilityError> {
        if value < 0 {
            return Err(CapabilityError::Negative(value));
        }
        let mask =
            u32::try_from(value).map_err(|_| CapabilityError::OutOfRange(value.to_string()))?;
        self.bits.store(u64::from(mask), Ordering::Release);
        Ok(mask)
    }

    /// Overwrite the bitmask from an untyped JSON value.
    pub fn set_raw_json(&self, value: &Value) -> Result<u32, CapabilityError> {
        let mask = mask_from_json(value)?;
        self.bits.store(u64::from(mask), Ordering::Release);
        Ok(mask)
    }

    /// Flip bit `position` and return the resulting mask.
    ///
    /// An unset bitmask is treated as 0.
    pub fn toggle_bit(&self, position: u8) -> Result<u32, CapabilityError> {
        if position >= CAPABILITY_BITS {
            return Err(CapabilityError::BitOutOfRange(position));
        }
        let bit = 1u64 << position;
        let previous = match self
            .bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(decode(current).map_or(0, u64::from) ^ bit)
            }) {
            Ok(prev) | Err(prev) => prev,
        };
        let base = decode(previous).unwrap_or(0);
        // The closure always yields Some, so the stored value is base ^ bit.
        Ok(base ^ (1u32 << position))
    }

    /// Forget the negotiated bitmask; the next identify captures afresh.
    pub fn reset(&self) {
        self.bits.store(UNSET, Ordering::Release);
    }

    /// Parse operator text into a bitmask.
    ///
    /// Only a non-empty run of ASCII decimal digits that fits in 32 bits is
    /// accepted. Signs, whitespace and hex prefixes are all rejected.
    pub fn validate_str(text: &str) -> Result<u32, CapabilityError> {
        if text.is_empty() {
            return Err(CapabilityError::Empty);
        }
        if !text.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CapabilityError::NotDecimal(text.to_owned()));
        }
        text.parse::<u32>()
            .map_err(|_| CapabilityError::OutOfRange(text.to_owned()))
    }
}

fn decode(raw: u64) -> Option<u32> {
    u32::try_from(raw).ok()
}

/// Interpret a JSON value (e.g. an identify's `capabilities` field) as a
/// bitmask. Integral floats such as `5.0` are accepted.
pub fn mask_from_json(value: &Value) -> Result<u32, CapabilityError> {
    let Value::Number(number) = value else {
        return Err(CapabilityError::NotInteger(value.to_string()));
    };
    if let Some(unsigned) = number.as_u64() {
        return u32::try_from(unsigned).map_err(|_| CapabilityError::OutOfRange(number.to_string()));
    }
    if let Some(signed) = number.as_i64() {
        return Err(CapabilityError::Negative(signed));
    }
    match number.as_f64() {
        Some(float) if float.fract() == 0.0 && float < 0.0 => {
            #[allow(clippy::cast_possible_truncation)]
            let signed = float as i64;
            Err(CapabilityError::Negative(signed))
        }
        Some(float) if float.fract() == 0.0 && float <= f64::from(u32::MAX) => {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let mask = float as u32;
            Ok(mask)
        }
        Some(float) if float.fract() == 0.0 => Err(CapabilityError::OutOfRange(number.to_string())),
        _ => Err(CapabilityError::NotInteger(number.to_string())),
    }
}

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Poll interval for a monitored domain, in minutes.
///
/// The set is closed: the external providers only accept these cadences, so
/// anything else is rejected at the input boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckInterval {
    Min10,
    Min20,
    Min30,
    Min60,
    Min120,
}

impl CheckInterval {
    pub fn from_minutes(minutes: i32) -> Option<Self> {
        match minutes {
            10 => Some(CheckInterval::Min10),
            20 => Some(CheckInterval::Min20),
            30 => Some(CheckInterval::Min30),
            60 => Some(CheckInterval::Min60),
            120 => Some(CheckInterval::Min120),
            _ => None,
        }
    }

    pub fn minutes(self) -> i32 {
        match self {
            CheckInterval::Min10 => 10,
            CheckInterval::Min20 => 20,
            CheckInterval::Min30 => 30,
            CheckInterval::Min60 => 60,
            CheckInterval::Min120 => 120,
        }
    }
}

/// Logical probing region for a domain.
///
/// Stored in the database as the two-letter code. Unknown codes read back
/// from storage resolve to the default region instead of erroring; strict
/// parsing is only applied to user input (batch add).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    Us,
    Gb,
    De,
    Fr,
    Sg,
    Th,
    Jp,
    Au,
    In,
    Br,
}

pub const DEFAULT_REGION: Region = Region::Us;

impl Region {
    pub const ALL: [Region; 10] = [
        Region::Us,
        Region::Gb,
        Region::De,
        Region::Fr,
        Region::Sg,
        Region::Th,
        Region::Jp,
        Region::Au,
        Region::In,
        Region::Br,
    ];

    pub fn as_code(self) -> &'static str {
        match self {
            Region::Us => "US",
            Region::Gb => "GB",
            Region::De => "DE",
            Region::Fr => "FR",
            Region::Sg => "SG",
            Region::Th => "TH",
            Region::Jp => "JP",
            Region::Au => "AU",
            Region::In => "IN",
            Region::Br => "BR",
        }
    }

    /// Strict parse, used to validate user input.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "US" => Some(Region::Us),
            "GB" => Some(Region::Gb),
            "DE" => Some(Region::De),
            "FR" => Some(Region::Fr),
            "SG" => Some(Region::Sg),
            "TH" => Some(Region::Th),
            "JP" => Some(Region::Jp),
            "AU" => Some(Region::Au),
            "IN" => Some(Region::In),
            "BR" => Some(Region::Br),
            _ => None,
        }
    }

    /// Lossy parse, used wherever a stored value is resolved. Probing the
    /// default region is preferable to not monitoring at all, so unknown
    /// codes never fail.
    pub fn parse_lossy(code: &str) -> Self {
        Self::from_code(code).unwrap_or(DEFAULT_REGION)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_code())
    }
}

/// Lifecycle state of a (domain, provider) monitor registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationState {
    Pending,
    Active,
    OrphanedPendingDelete,
    Deleted,
}

impl RegistrationState {
    pub fn as_str(self) -> &'static str {
        match self {
            RegistrationState::Pending => "PENDING",
            RegistrationState::Active => "ACTIVE",
            RegistrationState::OrphanedPendingDelete => "ORPHANED_PENDING_DELETE",
            RegistrationState::Deleted => "DELETED",
        }
    }
}

impl FromStr for RegistrationState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(RegistrationState::Pending),
            "ACTIVE" => Ok(RegistrationState::Active),
            "ORPHANED_PENDING_DELETE" => Ok(RegistrationState::OrphanedPendingDelete),
            "DELETED" => Ok(RegistrationState::Deleted),
            _ => Err(()),
        }
    }
}

impl fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of a notification event. Derived per dispatch from the domain's
/// current availability and the caller's transition signal; never stored on
/// the domain itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    Down,
    Up,
    Status,
}

impl NotificationKind {
    pub fn derive(available: bool, transitioned: bool) -> Self {
        if !available {
            NotificationKind::Down
        } else if transitioned {
            NotificationKind::Up
        } else {
            NotificationKind::Status
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::Down => "down",
            NotificationKind::Up => "up",
            NotificationKind::Status => "status",
        }
    }

    /// A transition re-alerts faster than a routine status ping.
    pub fn is_transition(self) -> bool {
        !matches!(self, NotificationKind::Status)
    }
}

impl FromStr for NotificationKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "down" => Ok(NotificationKind::Down),
            "up" => Ok(NotificationKind::Up),
            "status" => Ok(NotificationKind::Status),
            _ => Err(()),
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_roundtrip_and_rejection() {
        assert_eq!(CheckInterval::from_minutes(20), Some(CheckInterval::Min20));
        assert_eq!(CheckInterval::Min120.minutes(), 120);
        assert_eq!(CheckInterval::from_minutes(15), None);
    }

    #[test]
    fn unknown_region_codes_fall_back_to_default() {
        assert_eq!(Region::from_code("XX"), None);
        assert_eq!(Region::parse_lossy("XX"), DEFAULT_REGION);
        assert_eq!(Region::parse_lossy("th"), Region::Th);
    }

    #[test]
    fn kind_derivation() {
        assert_eq!(NotificationKind::derive(false, false), NotificationKind::Down);
        assert_eq!(NotificationKind::derive(false, true), NotificationKind::Down);
        assert_eq!(NotificationKind::derive(true, true), NotificationKind::Up);
        assert_eq!(NotificationKind::derive(true, false), NotificationKind::Status);
    }
}

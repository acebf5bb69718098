use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970).
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

/// 64-bit NTP timestamp: upper 32 bits seconds, lower 32 bits fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeTag(u64);

impl TimeTag {
    /// The special value meaning "process on receipt".
    pub const IMMEDIATE: TimeTag = TimeTag(1);

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub fn is_immediate(self) -> bool {
        self == Self::IMMEDIATE
    }

    /// Time tag for the current wall-clock time.
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    pub fn from_system_time(time: SystemTime) -> Self {
        let since_unix = time.duration_since(UNIX_EPOCH).unwrap_or_default();
        // NTP seconds wrap every 136 years; truncation is the wire behaviour.
        let secs = (since_unix.as_secs() + NTP_UNIX_OFFSET) as u32 as u64;
        let frac = ((since_unix.subsec_nanos() as u64) << 32) / 1_000_000_000;
        Self((secs << 32) | frac)
    }

    /// Wall-clock time this tag denotes, or `None` for [`TimeTag::IMMEDIATE`]
    /// and tags before the Unix epoch.
    pub fn to_system_time(self) -> Option<SystemTime> {
        if self.is_immediate() {
            return None;
        }
        let secs = (self.0 >> 32).checked_sub(NTP_UNIX_OFFSET)?;
        let nanos = ((self.0 & 0xFFFF_FFFF) * 1_000_000_000) >> 32;
        Some(UNIX_EPOCH + Duration::from_secs(secs) + Duration::from_nanos(nanos))
    }
}

impl fmt::Display for TimeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_epoch_maps_to_ntp_offset() {
        let tag = TimeTag::from_system_time(UNIX_EPOCH);
        assert_eq!(tag.raw() >> 32, NTP_UNIX_OFFSET);
        assert_eq!(tag.raw() & 0xFFFF_FFFF, 0);
    }

    #[test]
    fn system_time_survives_within_a_microsecond() {
        let time = UNIX_EPOCH + Duration::new(1_700_000_000, 123_456_789);
        let back = TimeTag::from_system_time(time).to_system_time().unwrap();
        let diff = back
            .duration_since(time)
            .unwrap_or_else(|e| e.duration());
        assert!(diff < Duration::from_micros(1));
    }

    #[test]
    fn immediate_has_no_wall_clock_time() {
        assert!(TimeTag::IMMEDIATE.to_system_time().is_none());
        assert!(TimeTag::IMMEDIATE.is_immediate());
        assert!(!TimeTag::now().is_immediate());
    }
}

//! Channel state as reported by `CHANNEL STATUS`.

use std::fmt;

/// Result codes of `CHANNEL STATUS`, from Asterisk's `ast_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[repr(u8)]
pub enum ChannelStatus {
    /// Channel is down and available
    DownAvailable = 0,
    /// Channel is down, but reserved
    DownReserved = 1,
    /// Channel is off hook
    OffHook = 2,
    /// Digits (or equivalent) have been dialed
    DigitsDialed = 3,
    /// Line is ringing
    Ringing = 4,
    /// Remote end is ringing
    RemoteRinging = 5,
    /// Line is up
    Up = 6,
    /// Line is busy
    Busy = 7,
}

impl ChannelStatus {
    /// Parse from the numeric `result=` value.
    pub fn from_number(n: i32) -> Option<Self> {
        match n {
            0 => Some(Self::DownAvailable),
            1 => Some(Self::DownReserved),
            2 => Some(Self::OffHook),
            3 => Some(Self::DigitsDialed),
            4 => Some(Self::Ringing),
            5 => Some(Self::RemoteRinging),
            6 => Some(Self::Up),
            7 => Some(Self::Busy),
            _ => None,
        }
    }

    /// Integer code as sent on the wire.
    pub fn as_number(&self) -> i32 {
        *self as i32
    }

    /// `true` only for [`ChannelStatus::Up`]; every other state needs `ANSWER`.
    pub fn is_answered(&self) -> bool {
        *self == Self::Up
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DownAvailable => "DOWN_AVAILABLE",
            Self::DownReserved => "DOWN_RESERVED",
            Self::OffHook => "OFF_HOOK",
            Self::DigitsDialed => "DIGITS_DIALED",
            Self::Ringing => "RINGING",
            Self::RemoteRinging => "REMOTE_RINGING",
            Self::Up => "UP",
            Self::Busy => "BUSY",
        };
        f.write_str(name)
    }
}

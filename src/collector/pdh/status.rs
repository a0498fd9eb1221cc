//! PDH status codes.

use std::fmt;

/// A `PDH_STATUS` value returned by a PDH call or carried by a raw item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PdhStatus(pub u32);

impl PdhStatus {
    pub const SUCCESS: Self = Self(0x0000_0000);
    pub const CSTATUS_VALID_DATA: Self = Self(0x0000_0000);
    pub const CSTATUS_NEW_DATA: Self = Self(0x0000_0001);
    pub const CSTATUS_NO_MACHINE: Self = Self(0x8000_07D0);
    pub const CSTATUS_NO_INSTANCE: Self = Self(0x8000_07D1);
    pub const MORE_DATA: Self = Self(0x8000_07D2);
    pub const CSTATUS_ITEM_NOT_VALIDATED: Self = Self(0x8000_07D3);
    pub const RETRY: Self = Self(0x8000_07D4);
    pub const NO_DATA: Self = Self(0x8000_07D5);
    pub const CALC_NEGATIVE_DENOMINATOR: Self = Self(0x8000_07D6);
    pub const CALC_NEGATIVE_TIMEBASE: Self = Self(0x8000_07D7);
    pub const CALC_NEGATIVE_VALUE: Self = Self(0x8000_07D8);
    pub const CSTATUS_NO_OBJECT: Self = Self(0xC000_0BB8);
    pub const CSTATUS_NO_COUNTER: Self = Self(0xC000_0BB9);
    pub const CSTATUS_INVALID_DATA: Self = Self(0xC000_0BBA);
    pub const MEMORY_ALLOCATION_FAILURE: Self = Self(0xC000_0BBB);
    pub const INVALID_HANDLE: Self = Self(0xC000_0BBC);
    pub const INVALID_ARGUMENT: Self = Self(0xC000_0BBD);
    pub const FUNCTION_NOT_FOUND: Self = Self(0xC000_0BBE);
    pub const CSTATUS_NO_COUNTERNAME: Self = Self(0xC000_0BBF);
    pub const CSTATUS_BAD_COUNTERNAME: Self = Self(0xC000_0BC0);
    pub const INVALID_BUFFER: Self = Self(0xC000_0BC1);
    pub const INSUFFICIENT_BUFFER: Self = Self(0xC000_0BC2);
    pub const CANNOT_CONNECT_MACHINE: Self = Self(0xC000_0BC3);
    pub const INVALID_PATH: Self = Self(0xC000_0BC4);
    pub const INVALID_INSTANCE: Self = Self(0xC000_0BC5);
    pub const INVALID_DATA: Self = Self(0xC000_0BC6);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    pub fn is_more_data(self) -> bool {
        self == Self::MORE_DATA
    }

    /// Item status whose value may be emitted.
    pub fn is_valid_item(self) -> bool {
        self == Self::CSTATUS_VALID_DATA || self == Self::CSTATUS_NEW_DATA
    }

    /// Item statuses expected during warm-up or instance churn.
    pub fn is_transient_item(self) -> bool {
        matches!(
            self,
            Self::NO_DATA
                | Self::CSTATUS_NO_INSTANCE
                | Self::CSTATUS_INVALID_DATA
                | Self::CSTATUS_ITEM_NOT_VALIDATED
                | Self::CALC_NEGATIVE_DENOMINATOR
                | Self::CALC_NEGATIVE_TIMEBASE
                | Self::CALC_NEGATIVE_VALUE
                | Self::INVALID_DATA
        )
    }

    pub fn message(self) -> Option<&'static str> {
        let msg = match self {
            Self::CSTATUS_VALID_DATA => "the returned data is valid",
            Self::CSTATUS_NEW_DATA => "the return data value is valid and different from the last sample",
            Self::CSTATUS_NO_MACHINE => "unable to connect to the specified computer, or the computer is offline",
            Self::CSTATUS_NO_INSTANCE => "the specified instance is not present",
            Self::MORE_DATA => "there is more data to return than would fit in the supplied buffer",
            Self::CSTATUS_ITEM_NOT_VALIDATED => "the data item has been added to the query but has not been validated",
            Self::RETRY => "selected operation should be retried",
            Self::NO_DATA => "no data to return",
            Self::CALC_NEGATIVE_DENOMINATOR => "a counter with a negative denominator value was detected",
            Self::CALC_NEGATIVE_TIMEBASE => "a counter with a negative time base value was detected",
            Self::CALC_NEGATIVE_VALUE => "a counter with a negative value was detected",
            Self::CSTATUS_NO_OBJECT => "the specified object is not found on the system",
            Self::CSTATUS_NO_COUNTER => "the specified counter could not be found",
            Self::CSTATUS_INVALID_DATA => "the returned data is not valid",
            Self::MEMORY_ALLOCATION_FAILURE => "a PDH function could not allocate enough temporary memory",
            Self::INVALID_HANDLE => "the handle is not a valid PDH object",
            Self::INVALID_ARGUMENT => "a required argument is missing or incorrect",
            Self::FUNCTION_NOT_FOUND => "unable to find the specified function",
            Self::CSTATUS_NO_COUNTERNAME => "no counter was specified",
            Self::CSTATUS_BAD_COUNTERNAME => "unable to parse the counter path",
            Self::INVALID_BUFFER => "the buffer passed by the caller is not valid",
            Self::INSUFFICIENT_BUFFER => "the requested data is larger than the buffer supplied",
            Self::CANNOT_CONNECT_MACHINE => "unable to connect to the requested computer",
            Self::INVALID_PATH => "the specified counter path could not be interpreted",
            Self::INVALID_INSTANCE => "the instance name could not be read from the counter path",
            Self::INVALID_DATA => "the data is not valid",
            _ => return None,
        };
        Some(msg)
    }
}

impl fmt::Display for PdhStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            Some(msg) => write!(f, "{} ({:#010x})", msg, self.0),
            None => write!(f, "PDH status {:#010x}", self.0),
        }
    }
}

impl std::error::Error for PdhStatus {}

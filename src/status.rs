use alloc::string::String;
use strum::Display;

#[repr(i32)]
#[derive(Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverStatus {
    Success = 0x0000_0000,
    Pending = 0x0000_0103,
    Unsuccessful = 0xC000_0001u32 as i32,
    InvalidParameter = 0xC000_000Du32 as i32,
    NoSuchDevice = 0xC000_000Eu32 as i32,
    NotFound = 0xC000_0034u32 as i32,
    AlreadyExists = 0xC000_0035u32 as i32,
    InsufficientResources = 0xC000_009Au32 as i32,
    NotSupported = 0xC000_00BBu32 as i32,
    Busy = 0xC000_00BFu32 as i32,
    DeletePending = 0xC000_0056u32 as i32,
    InvalidState = 0xC000_0184u32 as i32,
    BadFormat = 0xC000_007Bu32 as i32,
    IncompatibleVersion = 0xC000_036Bu32 as i32,
}

impl DriverStatus {
    /// Success or pending; everything with the error severity bits set fails.
    #[inline]
    pub fn is_success(self) -> bool {
        (self as i32) >= 0
    }

    #[inline]
    pub fn code(self) -> u32 {
        self as i32 as u32
    }

    pub fn into_result(self) -> Result<(), DriverStatus> {
        if self.is_success() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegError {
    KeyAlreadyExists,
    KeyNotFound,
    ValueNotFound,
    BadType,
    PersistenceFailed,
}

impl From<RegError> for DriverStatus {
    fn from(e: RegError) -> Self {
        match e {
            RegError::KeyNotFound | RegError::ValueNotFound => DriverStatus::NotFound,
            RegError::BadType => DriverStatus::BadFormat,
            RegError::KeyAlreadyExists => DriverStatus::AlreadyExists,
            RegError::PersistenceFailed => DriverStatus::Unsuccessful,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum Data {
    U32(u32),
    U64(u64),
    Bool(bool),
    Str(String),
}

impl Data {
    pub fn as_str(&self) -> Result<&str, RegError> {
        match self {
            Data::Str(s) => Ok(s.as_str()),
            _ => Err(RegError::BadType),
        }
    }

    pub fn as_u32(&self) -> Result<u32, RegError> {
        match self {
            Data::U32(v) => Ok(*v),
            Data::Bool(b) => Ok(*b as u32),
            _ => Err(RegError::BadType),
        }
    }
}

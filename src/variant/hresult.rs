//! Foreign status codes
//!
//! Status codes follow the component model's 32-bit layout: severity bit,
//! facility, and a 16-bit code. Only the codes the dispatch protocol and the
//! array handle produce are named here.

use std::fmt;

/// Facility for codes lifted from the operating system's error space.
const FACILITY_WIN32: u32 = 7;

/// 32-bit foreign status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HResult(pub i32);

impl HResult {
    pub const S_OK: Self = Self(0);
    pub const S_FALSE: Self = Self(1);
    pub const E_NOTIMPL: Self = Self(0x8000_4001_u32 as i32);
    pub const E_NOINTERFACE: Self = Self(0x8000_4002_u32 as i32);
    pub const E_POINTER: Self = Self(0x8000_4003_u32 as i32);
    pub const E_FAIL: Self = Self(0x8000_4005_u32 as i32);
    pub const E_UNEXPECTED: Self = Self(0x8000_FFFF_u32 as i32);
    pub const E_ACCESSDENIED: Self = Self(0x8007_0005_u32 as i32);
    pub const E_OUTOFMEMORY: Self = Self(0x8007_000E_u32 as i32);
    pub const E_INVALIDARG: Self = Self(0x8007_0057_u32 as i32);

    pub const DISP_E_UNKNOWNINTERFACE: Self = Self(0x8002_0001_u32 as i32);
    pub const DISP_E_MEMBERNOTFOUND: Self = Self(0x8002_0003_u32 as i32);
    pub const DISP_E_PARAMNOTFOUND: Self = Self(0x8002_0004_u32 as i32);
    pub const DISP_E_TYPEMISMATCH: Self = Self(0x8002_0005_u32 as i32);
    pub const DISP_E_UNKNOWNNAME: Self = Self(0x8002_0006_u32 as i32);
    pub const DISP_E_NONAMEDARGS: Self = Self(0x8002_0007_u32 as i32);
    pub const DISP_E_BADVARTYPE: Self = Self(0x8002_0008_u32 as i32);
    pub const DISP_E_EXCEPTION: Self = Self(0x8002_0009_u32 as i32);
    pub const DISP_E_OVERFLOW: Self = Self(0x8002_000A_u32 as i32);
    pub const DISP_E_BADINDEX: Self = Self(0x8002_000B_u32 as i32);
    pub const DISP_E_ARRAYISLOCKED: Self = Self(0x8002_000D_u32 as i32);
    pub const DISP_E_BADPARAMCOUNT: Self = Self(0x8002_000E_u32 as i32);
    pub const DISP_E_PARAMNOTOPTIONAL: Self = Self(0x8002_000F_u32 as i32);

    /// Lift an operating-system error code into the status space.
    ///
    /// Non-positive values are already status codes and pass through.
    #[inline]
    pub const fn from_win32(code: i32) -> Self {
        if code <= 0 {
            Self(code)
        } else {
            Self(((code as u32 & 0x0000_FFFF) | (FACILITY_WIN32 << 16) | 0x8000_0000) as i32)
        }
    }

    #[inline]
    pub const fn is_success(self) -> bool {
        self.0 >= 0
    }

    #[inline]
    pub const fn is_failure(self) -> bool {
        self.0 < 0
    }

    /// Unsigned view, the form host errors carry.
    #[inline]
    pub const fn code(self) -> u32 {
        self.0 as u32
    }

    #[inline]
    pub const fn facility(self) -> u32 {
        (self.0 as u32 >> 16) & 0x1FFF
    }

    /// System error-text lookup.
    pub fn message(self) -> String {
        match known_message(self) {
            Some(text) => text.to_string(),
            None => format!("Unknown error 0x{:08X}", self.code()),
        }
    }
}

impl fmt::Display for HResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.code())
    }
}

impl From<i32> for HResult {
    fn from(code: i32) -> Self {
        Self(code)
    }
}

fn known_message(hr: HResult) -> Option<&'static str> {
    let text = match hr {
        HResult::S_OK => "The operation completed successfully.",
        HResult::S_FALSE => "Incorrect function.",
        HResult::E_NOTIMPL => "Not implemented",
        HResult::E_NOINTERFACE => "No such interface supported",
        HResult::E_POINTER => "Invalid pointer",
        HResult::E_FAIL => "Unspecified error",
        HResult::E_UNEXPECTED => "Catastrophic failure",
        HResult::E_ACCESSDENIED => "Access is denied.",
        HResult::E_OUTOFMEMORY => "Not enough storage is available to complete this operation.",
        HResult::E_INVALIDARG => "The parameter is incorrect.",
        HResult::DISP_E_UNKNOWNINTERFACE => "Unknown interface.",
        HResult::DISP_E_MEMBERNOTFOUND => "Member not found.",
        HResult::DISP_E_PARAMNOTFOUND => "Parameter not found.",
        HResult::DISP_E_TYPEMISMATCH => "Type mismatch.",
        HResult::DISP_E_UNKNOWNNAME => "Unknown name.",
        HResult::DISP_E_NONAMEDARGS => "No named arguments.",
        HResult::DISP_E_BADVARTYPE => "Bad variable type.",
        HResult::DISP_E_EXCEPTION => "Exception occurred.",
        HResult::DISP_E_OVERFLOW => "Out of present range.",
        HResult::DISP_E_BADINDEX => "Invalid index.",
        HResult::DISP_E_ARRAYISLOCKED => "Memory is locked.",
        HResult::DISP_E_BADPARAMCOUNT => "Invalid number of parameters.",
        HResult::DISP_E_PARAMNOTOPTIONAL => "Parameter not optional.",
        _ => return win32_message(hr),
    };
    Some(text)
}

fn win32_message(hr: HResult) -> Option<&'static str> {
    if hr.facility() != FACILITY_WIN32 {
        return None;
    }
    let text = match hr.code() & 0xFFFF {
        1 => "Incorrect function.",
        2 => "The system cannot find the file specified.",
        3 => "The system cannot find the path specified.",
        6 => "The handle is invalid.",
        8 => "Not enough storage is available to process this command.",
        32 => "The process cannot access the file because it is being used by another process.",
        170 => "The requested resource is in use.",
        1460 => "This operation returned because the timeout period expired.",
        _ => return None,
    };
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_win32() {
        assert_eq!(HResult::from_win32(5), HResult::E_ACCESSDENIED);
        assert_eq!(HResult::from_win32(5).code(), 0x8007_0005);
        assert_eq!(HResult::from_win32(0), HResult::S_OK);
        // Already a status code
        assert_eq!(HResult::from_win32(HResult::E_FAIL.0), HResult::E_FAIL);
    }

    #[test]
    fn test_messages() {
        assert_eq!(HResult::DISP_E_UNKNOWNNAME.message(), "Unknown name.");
        assert_eq!(HResult::from_win32(2).message(), "The system cannot find the file specified.");
        assert_eq!(HResult(0x8004_1234_u32 as i32).message(), "Unknown error 0x80041234");
    }

    #[test]
    fn test_display_and_severity() {
        assert_eq!(HResult::DISP_E_EXCEPTION.to_string(), "0x80020009");
        assert!(HResult::S_FALSE.is_success());
        assert!(HResult::E_FAIL.is_failure());
    }
}

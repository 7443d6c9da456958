use core::fmt::{self, Display, Formatter};

/// The SMTP reply codes the server speaks (RFC 5321 §4.2.3).
#[repr(u16)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Debug)]
pub enum Status {
    Ready = 220,
    Closing = 221,
    Ok = 250,
    StartData = 354,
    ShuttingDown = 421,
    SyntaxError = 500,
    SyntaxErrorParam = 501,
    NotImplemented = 502,
    BadSequence = 503,
}

impl Status {
    /// Checks if the status is a permanent rejection
    #[must_use]
    pub fn is_permanent(self) -> bool {
        u16::from(self) >= 500
    }

    /// Checks if the status is a temporary rejection
    #[must_use]
    pub fn is_temporary(self) -> bool {
        u16::from(self) >= 400 && u16::from(self) < 500
    }
}

impl From<Status> for u16 {
    fn from(value: Status) -> Self {
        value as Self
    }
}

impl Display for Status {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(fmt, "{}", u16::from(*self))
    }
}

#[cfg(test)]
mod test {
    use super::Status;

    #[test]
    fn status() {
        assert!(Status::SyntaxError.is_permanent());
        assert!(!Status::SyntaxError.is_temporary());

        assert!(Status::ShuttingDown.is_temporary());
        assert!(!Status::ShuttingDown.is_permanent());

        assert_eq!(u16::from(Status::BadSequence), 503);
        assert_eq!(Status::Ready.to_string(), "220");
    }
}

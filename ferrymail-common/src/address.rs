use std::fmt::{self, Debug, Display, Formatter};

use mailparse::MailAddr;

/// A mail address as it appears in a MAIL FROM or RCPT TO path.
///
/// The session engine treats this as an opaque value type; parsing and
/// validation live here. The null reverse-path `<>` is a valid address
/// (used by delivery status notifications) and is represented as
/// [`Address::null`].
#[derive(Clone, Debug, PartialEq)]
pub struct Address(Option<MailAddr>);

impl Address {
    /// Parses an SMTP path, accepting both `<user@domain>` and the bare
    /// `user@domain` form.
    ///
    /// # Errors
    /// Returns a human-readable reason when the path cannot be parsed,
    /// suitable for use in a 501 reply.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        let inner = trimmed
            .strip_prefix('<')
            .and_then(|rest| rest.strip_suffix('>'))
            .unwrap_or(trimmed);

        if inner.is_empty() {
            return Ok(Self::null());
        }

        let mut parsed = mailparse::addrparse(inner)
            .map_err(|err| format!("Invalid address {trimmed}: {err}"))?;

        if parsed.is_empty() {
            return Err(format!("Invalid address {trimmed}"));
        }

        Ok(Self(Some(parsed.remove(0))))
    }

    /// The null reverse-path `<>`.
    #[must_use]
    pub const fn null() -> Self {
        Self(None)
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.0.is_none()
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(mailparse::MailAddr::Group(group)) => Display::fmt(group, f),
            Some(mailparse::MailAddr::Single(single)) => Display::fmt(single, f),
            None => f.write_str("<>"),
        }
    }
}

impl From<MailAddr> for Address {
    fn from(value: MailAddr) -> Self {
        Self(Some(value))
    }
}

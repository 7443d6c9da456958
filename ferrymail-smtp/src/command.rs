//! The command and reply vocabulary of the session engine.

use core::fmt::{self, Display, Formatter};

use ferrymail_common::{address::Address, status::Status};

/// The closed set of commands a protocol adapter may yield.
///
/// `Invalid` carries a known verb whose arguments the parser rejected;
/// `Unknown` carries a verb the parser does not recognize. Keeping the
/// set closed lets the engine's dispatch prove exhaustiveness at compile
/// time.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Helo { domain: String },
    Ehlo { domain: String },
    Mail { from: Address, eight_bit_mime: bool },
    Rcpt { to: Address },
    Data,
    Rset,
    StartTls,
    Noop,
    Quit,
    Vrfy,
    Expn,
    Send,
    Soml,
    Saml,
    Invalid { reason: String },
    Unknown { verb: String },
}

impl Command {
    /// Parses one command line (terminator already stripped).
    ///
    /// Never fails: malformed input maps to the `Invalid` and `Unknown`
    /// variants so the engine can answer 501/500.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        let (verb, args) = match trimmed.split_once(char::is_whitespace) {
            Some((verb, args)) => (verb, args.trim()),
            None => (trimmed, ""),
        };

        match verb.to_ascii_uppercase().as_str() {
            "HELO" => Self::parse_helo(args, false),
            "EHLO" => Self::parse_helo(args, true),
            "MAIL" => Self::parse_mail(args),
            "RCPT" => Self::parse_rcpt(args),
            "DATA" => Self::Data,
            "RSET" => Self::Rset,
            "STARTTLS" => Self::StartTls,
            "NOOP" => Self::Noop,
            "QUIT" => Self::Quit,
            "VRFY" => Self::Vrfy,
            "EXPN" => Self::Expn,
            "SEND" => Self::Send,
            "SOML" => Self::Soml,
            "SAML" => Self::Saml,
            other => Self::Unknown {
                verb: other.to_string(),
            },
        }
    }

    fn parse_helo(args: &str, extended: bool) -> Self {
        if args.is_empty() {
            let verb = if extended { "EHLO" } else { "HELO" };
            return Self::Invalid {
                reason: format!("{verb} requires a domain"),
            };
        }

        let domain = args.to_string();
        if extended {
            Self::Ehlo { domain }
        } else {
            Self::Helo { domain }
        }
    }

    fn parse_mail(args: &str) -> Self {
        let Some(rest) = strip_keyword(args, "FROM:") else {
            return Self::Invalid {
                reason: "MAIL requires FROM:<address>".to_string(),
            };
        };

        let (path, params) = split_path(rest.trim_start());

        let from = match Address::parse(path) {
            Ok(from) => from,
            Err(reason) => return Self::Invalid { reason },
        };

        let mut eight_bit_mime = false;
        for param in params.split_whitespace() {
            match param.split_once('=') {
                Some((key, value)) if key.eq_ignore_ascii_case("BODY") => {
                    if value.eq_ignore_ascii_case("8BITMIME") {
                        eight_bit_mime = true;
                    } else if value.eq_ignore_ascii_case("7BIT") {
                        eight_bit_mime = false;
                    } else {
                        return Self::Invalid {
                            reason: format!("Unknown BODY value {value}"),
                        };
                    }
                }
                _ => {
                    return Self::Invalid {
                        reason: format!("Unknown MAIL parameter {param}"),
                    };
                }
            }
        }

        Self::Mail {
            from,
            eight_bit_mime,
        }
    }

    fn parse_rcpt(args: &str) -> Self {
        let Some(rest) = strip_keyword(args, "TO:") else {
            return Self::Invalid {
                reason: "RCPT requires TO:<address>".to_string(),
            };
        };

        let (path, params) = split_path(rest.trim_start());
        if !params.is_empty() {
            return Self::Invalid {
                reason: format!("Unknown RCPT parameter {params}"),
            };
        }

        match Address::parse(path) {
            Ok(to) => Self::Rcpt { to },
            Err(reason) => Self::Invalid { reason },
        }
    }
}

/// Strips a case-insensitive keyword prefix such as `FROM:` or `TO:`.
fn strip_keyword<'a>(args: &'a str, keyword: &str) -> Option<&'a str> {
    let prefix = args.get(..keyword.len())?;
    prefix
        .eq_ignore_ascii_case(keyword)
        .then(|| &args[keyword.len()..])
}

/// Splits `<path> [params]`, keeping an angle-bracketed path intact even
/// if it contains spaces.
fn split_path(rest: &str) -> (&str, &str) {
    if rest.starts_with('<') {
        if let Some(end) = rest.find('>') {
            return (&rest[..=end], rest[end + 1..].trim());
        }
    }

    match rest.split_once(char::is_whitespace) {
        Some((path, params)) => (path, params.trim()),
        None => (rest, ""),
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Helo { .. } => "HELO",
            Self::Ehlo { .. } => "EHLO",
            Self::Mail { .. } => "MAIL",
            Self::Rcpt { .. } => "RCPT",
            Self::Data => "DATA",
            Self::Rset => "RSET",
            Self::StartTls => "STARTTLS",
            Self::Noop => "NOOP",
            Self::Quit => "QUIT",
            Self::Vrfy => "VRFY",
            Self::Expn => "EXPN",
            Self::Send => "SEND",
            Self::Soml => "SOML",
            Self::Saml => "SAML",
            Self::Invalid { .. } => "INVALID",
            Self::Unknown { .. } => "UNKNOWN",
        })
    }
}

/// One SMTP reply, single- or multi-line.
///
/// Rendered per RFC 5321 §4.2: every line but the last joins code and
/// text with `-`, the last with a space. The trailing CRLF is written by
/// the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    status: Status,
    lines: Vec<String>,
}

impl Reply {
    #[must_use]
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            lines: vec![message.into()],
        }
    }

    #[must_use]
    pub fn multi(status: Status, lines: Vec<String>) -> Self {
        debug_assert!(!lines.is_empty());
        Self { status, lines }
    }

    #[must_use]
    pub const fn status(&self) -> Status {
        self.status
    }

    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

impl Display for Reply {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let code = u16::from(self.status);
        let last = self.lines.len().saturating_sub(1);

        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                f.write_str("\r\n")?;
            }
            let separator = if i == last { ' ' } else { '-' };
            write!(f, "{code}{separator}{line}")?;
        }

        Ok(())
    }
}

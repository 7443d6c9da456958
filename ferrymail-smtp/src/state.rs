//! Per-connection session state and the command-ordering predicates.

use ferrymail_common::address::Address;

use crate::id::SessionId;

/// Everything one client connection accumulates: the envelope under
/// construction plus connection-scoped facts.
///
/// `remote_ip` and `session_id` are set once at accept time. `secure`
/// only ever transitions `false` → `true` (after a completed STARTTLS
/// handshake). `hostname` tracks the most recent HELO/EHLO argument.
/// The remaining fields form the envelope and are cleared by [`reset`].
///
/// [`reset`]: SessionState::reset
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub remote_ip: String,
    pub session_id: SessionId,
    pub secure: bool,
    pub hostname: Option<String>,
    pub from: Option<Address>,
    pub to: Vec<Address>,
    pub data: Vec<u8>,
    pub eight_bit_mime: bool,
}

impl SessionState {
    /// Fresh state for a connection from `remote_ip`, with a newly
    /// minted session id and an empty envelope.
    #[must_use]
    pub fn new(remote_ip: impl Into<String>) -> Self {
        Self {
            remote_ip: remote_ip.into(),
            session_id: SessionId::generate(),
            ..Self::default()
        }
    }

    /// Clears the envelope. Connection-scoped fields (`session_id`,
    /// `remote_ip`, `secure`, `hostname`) are untouched.
    pub fn reset(&mut self) {
        self.from = None;
        self.to.clear();
        self.data.clear();
        self.eight_bit_mime = false;
    }

    /// Checks the state if the client can send a MAIL command.
    pub fn can_receive_mail(&self) -> Result<(), &'static str> {
        if self.from.is_some() {
            return Err("Sender already specified");
        }

        Ok(())
    }

    /// Checks the state if the client can send a RCPT command.
    pub fn can_receive_rcpt(&self) -> Result<(), &'static str> {
        if self.from.is_none() {
            return Err("Need mail before RCPT");
        }

        Ok(())
    }

    /// Checks the state if the client can send a DATA command.
    pub fn can_receive_data(&self) -> Result<(), &'static str> {
        if self.from.is_none() {
            return Err("Need mail before DATA");
        }

        if self.to.is_empty() {
            return Err("Need RCPT before DATA");
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use ferrymail_common::address::Address;

    use super::SessionState;

    fn populated() -> SessionState {
        let mut state = SessionState::new("192.0.2.7");
        state.hostname = Some("client.example.com".to_string());
        state.from = Some(Address::parse("<sender@example.com>").unwrap());
        state.to.push(Address::parse("<rcpt@example.com>").unwrap());
        state.data.extend_from_slice(b"Subject: hi\r\n\r\nhello\r\n");
        state.eight_bit_mime = true;
        state
    }

    #[test]
    fn reset_clears_envelope_only() {
        let mut state = populated();
        state.secure = true;
        let id = state.session_id;

        state.reset();

        assert!(state.from.is_none());
        assert!(state.to.is_empty());
        assert!(state.data.is_empty());
        assert!(!state.eight_bit_mime);

        assert!(state.secure);
        assert_eq!(state.session_id, id);
        assert_eq!(state.remote_ip, "192.0.2.7");
        assert_eq!(state.hostname.as_deref(), Some("client.example.com"));
    }

    #[test]
    fn mail_ordering() {
        let mut state = SessionState::new("192.0.2.7");
        assert!(state.can_receive_mail().is_ok());

        state.from = Some(Address::parse("<sender@example.com>").unwrap());
        assert_eq!(state.can_receive_mail(), Err("Sender already specified"));
    }

    #[test]
    fn rcpt_ordering() {
        let mut state = SessionState::new("192.0.2.7");
        assert_eq!(state.can_receive_rcpt(), Err("Need mail before RCPT"));

        state.from = Some(Address::parse("<sender@example.com>").unwrap());
        assert!(state.can_receive_rcpt().is_ok());
    }

    #[test]
    fn data_ordering() {
        let mut state = SessionState::new("192.0.2.7");
        assert_eq!(state.can_receive_data(), Err("Need mail before DATA"));

        state.from = Some(Address::parse("<sender@example.com>").unwrap());
        assert_eq!(state.can_receive_data(), Err("Need RCPT before DATA"));

        state.to.push(Address::parse("<rcpt@example.com>").unwrap());
        assert!(state.can_receive_data().is_ok());
    }
}

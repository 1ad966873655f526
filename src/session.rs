//! Session manager
//!
//! [`Session`] tracks the state of one PKCS#11 session (open, logged in,
//! closed) on top of a provider session. A successful login turns it into
//! an [`AuthenticatedSession`], a scoped guard that logs out and closes
//! exactly once however control leaves the protected region: explicit
//! [`AuthenticatedSession::release`], early return through `?`, or a panic
//! unwinding through its `Drop`.

use std::marker::PhantomData;

use tracing::{debug, info, warn};

use crate::error::{EdhsmError, EdhsmResult, SessionError};
use crate::model::{Pin, SessionMode, SlotInfo, UserType};
use crate::ports::TokenSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Open,
    LoggedIn(UserType),
    Closed,
}

/// An open session; borrows the [`crate::Device`] it came from
#[derive(Debug)]
pub struct Session<'d, S: TokenSession> {
    inner: S,
    slot: SlotInfo,
    mode: SessionMode,
    state: SessionState,
    _device: PhantomData<&'d ()>,
}

impl<'d, S: TokenSession> Session<'d, S> {
    pub(crate) fn new(inner: S, slot: SlotInfo, mode: SessionMode) -> Self {
        Self {
            inner,
            slot,
            mode,
            state: SessionState::Open,
            _device: PhantomData,
        }
    }

    pub fn slot(&self) -> &SlotInfo {
        &self.slot
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn is_logged_in(&self) -> bool {
        matches!(self.state, SessionState::LoggedIn(_))
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    pub fn login(&mut self, pin: &Pin, user_type: UserType) -> EdhsmResult<()> {
        match self.state {
            SessionState::Open => {}
            SessionState::LoggedIn(_) => return Err(SessionError::AlreadyLoggedIn.into()),
            SessionState::Closed => return Err(SessionError::Closed.into()),
        }
        self.inner.login(user_type, pin)?;
        self.state = SessionState::LoggedIn(user_type);
        info!("Logged in to slot {} as {:?}", self.slot.id, user_type);
        Ok(())
    }

    pub fn logout(&mut self) -> EdhsmResult<()> {
        match self.state {
            SessionState::LoggedIn(_) => {}
            SessionState::Open => return Err(SessionError::NotLoggedIn.into()),
            SessionState::Closed => return Err(SessionError::Closed.into()),
        }
        // Logged out even if the device complains; never retried.
        self.state = SessionState::Open;
        self.inner.logout()?;
        debug!("Logged out of slot {}", self.slot.id);
        Ok(())
    }

    pub fn close(&mut self) -> EdhsmResult<()> {
        if self.state == SessionState::Closed {
            return Err(SessionError::Closed.into());
        }
        self.state = SessionState::Closed;
        self.inner.close()?;
        debug!("Closed session on slot {}", self.slot.id);
        Ok(())
    }

    /// Log in and hand back the scoped guard
    ///
    /// If login fails the session is closed before the error is returned,
    /// so no session leaks on a rejected PIN.
    pub fn authenticate(
        mut self,
        pin: &Pin,
        user_type: UserType,
    ) -> EdhsmResult<AuthenticatedSession<'d, S>> {
        if let Err(err) = self.login(pin, user_type) {
            if let Err(close_err) = self.close() {
                warn!("Failed to close session after login error: {}", close_err);
            }
            return Err(err);
        }
        Ok(AuthenticatedSession {
            session: self,
            released: false,
        })
    }

    fn release(&mut self) -> EdhsmResult<()> {
        let logout = if self.is_logged_in() {
            self.logout()
        } else {
            Ok(())
        };
        let close = if self.is_closed() { Ok(()) } else { self.close() };
        match (logout, close) {
            (Err(err), _) | (Ok(()), Err(err)) => Err(release_error(err)),
            (Ok(()), Ok(())) => Ok(()),
        }
    }
}

impl<S: TokenSession> Drop for Session<'_, S> {
    fn drop(&mut self) {
        if !self.is_closed() {
            if let Err(err) = self.release() {
                warn!("Failed to release dropped session: {}", err);
            }
        }
    }
}

fn release_error(err: EdhsmError) -> EdhsmError {
    match err {
        EdhsmError::Session(SessionError::Release { .. }) => err,
        other => SessionError::Release {
            reason: other.to_string(),
        }
        .into(),
    }
}

/// A logged-in session whose logout and close are guaranteed
///
/// Key provisioning and signing only accept this type, so neither can run
/// against a session that is unauthenticated or already closed.
#[derive(Debug)]
pub struct AuthenticatedSession<'d, S: TokenSession> {
    session: Session<'d, S>,
    released: bool,
}

impl<'d, S: TokenSession> AuthenticatedSession<'d, S> {
    pub fn slot(&self) -> &SlotInfo {
        self.session.slot()
    }

    pub(crate) fn token(&self) -> &S {
        &self.session.inner
    }

    pub(crate) fn token_mut(&mut self) -> &mut S {
        &mut self.session.inner
    }

    /// Log out, then close
    ///
    /// Close runs even when logout fails; the first failure is returned.
    pub fn release(mut self) -> EdhsmResult<()> {
        self.released = true;
        self.session.release()
    }

    /// Run `f` inside the session and release afterwards on every path
    ///
    /// An error from `f` takes precedence over a release error, which is
    /// then only logged.
    pub fn run<T>(
        mut self,
        f: impl FnOnce(&mut AuthenticatedSession<'d, S>) -> EdhsmResult<T>,
    ) -> EdhsmResult<T> {
        let outcome = f(&mut self);
        let released = self.release();
        match (outcome, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(release_err)) => {
                warn!("Session release also failed: {}", release_err);
                Err(err)
            }
        }
    }
}

impl<S: TokenSession> Drop for AuthenticatedSession<'_, S> {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            if let Err(err) = self.session.release() {
                warn!("Failed to release authenticated session: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::soft_token::{Fault, SoftHsm};
    use crate::device::Device;

    fn initialized(token: &SoftHsm) -> Device<SoftHsm> {
        let mut device = Device::with_provider(token.clone(), "SoftHSM");
        device.initialize().unwrap();
        device
    }

    #[test]
    fn test_login_twice_fails() {
        let token = SoftHsm::new(Pin::default());
        let device = initialized(&token);
        let slot = device.select_slot(0).unwrap();
        let mut session = device.open_session(&slot, SessionMode::read_write()).unwrap();
        session.login(&Pin::default(), UserType::User).unwrap();
        assert!(matches!(
            session.login(&Pin::default(), UserType::User).unwrap_err(),
            EdhsmError::Session(SessionError::AlreadyLoggedIn)
        ));
    }

    #[test]
    fn test_wrong_pin_closes_session() {
        let token = SoftHsm::new(Pin::default());
        let device = initialized(&token);
        let slot = device.select_slot(0).unwrap();
        let session = device.open_session(&slot, SessionMode::read_write()).unwrap();
        let result = session.authenticate(&Pin::from_str("9999").unwrap(), UserType::User);
        assert!(matches!(
            result.unwrap_err(),
            EdhsmError::Session(SessionError::Authentication { .. })
        ));
        let journal = token.journal();
        assert_eq!(journal.logouts, 0);
        assert_eq!(journal.closes, 1);
        assert_eq!(token.open_sessions(), 0);
    }

    #[test]
    fn test_logout_when_not_logged_in() {
        let token = SoftHsm::new(Pin::default());
        let device = initialized(&token);
        let slot = device.select_slot(0).unwrap();
        let mut session = device.open_session(&slot, SessionMode::read_write()).unwrap();
        assert!(matches!(
            session.logout().unwrap_err(),
            EdhsmError::Session(SessionError::NotLoggedIn)
        ));
    }

    #[test]
    fn test_close_twice_fails() {
        let token = SoftHsm::new(Pin::default());
        let device = initialized(&token);
        let slot = device.select_slot(0).unwrap();
        let mut session = device.open_session(&slot, SessionMode::read_write()).unwrap();
        session.close().unwrap();
        assert!(matches!(
            session.close().unwrap_err(),
            EdhsmError::Session(SessionError::Closed)
        ));
        assert!(matches!(
            session.login(&Pin::default(), UserType::User).unwrap_err(),
            EdhsmError::Session(SessionError::Closed)
        ));
        assert_eq!(token.journal().closes, 1);
    }

    #[test]
    fn test_release_runs_logout_then_close_once() {
        let token = SoftHsm::new(Pin::default());
        let device = initialized(&token);
        let slot = device.select_slot(0).unwrap();
        let session = device
            .open_session(&slot, SessionMode::read_write())
            .unwrap()
            .authenticate(&Pin::default(), UserType::User)
            .unwrap();
        session.release().unwrap();
        let journal = token.journal();
        assert_eq!(journal.logouts, 1);
        assert_eq!(journal.closes, 1);
    }

    #[test]
    fn test_drop_releases_guard() {
        let token = SoftHsm::new(Pin::default());
        let device = initialized(&token);
        let slot = device.select_slot(0).unwrap();
        {
            let _session = device
                .open_session(&slot, SessionMode::read_write())
                .unwrap()
                .authenticate(&Pin::default(), UserType::User)
                .unwrap();
        }
        let journal = token.journal();
        assert_eq!(journal.logouts, 1);
        assert_eq!(journal.closes, 1);
        assert_eq!(token.open_sessions(), 0);
    }

    #[test]
    fn test_run_releases_after_error() {
        let token = SoftHsm::new(Pin::default());
        let device = initialized(&token);
        let slot = device.select_slot(0).unwrap();
        let session = device
            .open_session(&slot, SessionMode::read_write())
            .unwrap()
            .authenticate(&Pin::default(), UserType::User)
            .unwrap();
        let result: EdhsmResult<()> =
            session.run(|_| Err(SessionError::Closed.into()));
        assert!(result.is_err());
        let journal = token.journal();
        assert_eq!(journal.logouts, 1);
        assert_eq!(journal.closes, 1);
    }

    #[test]
    fn test_close_runs_even_if_logout_fails() {
        let token = SoftHsm::new(Pin::default());
        let device = initialized(&token);
        let slot = device.select_slot(0).unwrap();
        let session = device
            .open_session(&slot, SessionMode::read_write())
            .unwrap()
            .authenticate(&Pin::default(), UserType::User)
            .unwrap();
        token.inject_fault(Fault::Logout);
        assert!(matches!(
            session.release().unwrap_err(),
            EdhsmError::Session(SessionError::Release { .. })
        ));
        let journal = token.journal();
        assert_eq!(journal.logouts, 1);
        assert_eq!(journal.closes, 1);
    }

    #[test]
    fn test_close_without_login_is_allowed() {
        let token = SoftHsm::new(Pin::default());
        let device = initialized(&token);
        let slot = device.select_slot(0).unwrap();
        let mut session = device.open_session(&slot, SessionMode::read_write()).unwrap();
        session.close().unwrap();
        let journal = token.journal();
        assert_eq!(journal.logins, 0);
        assert_eq!(journal.closes, 1);
        assert_eq!(token.open_sessions(), 0);
    }

    #[test]
    fn test_close_fault_reported_by_release() {
        let token = SoftHsm::new(Pin::default());
        let device = initialized(&token);
        let slot = device.select_slot(0).unwrap();
        let session = device
            .open_session(&slot, SessionMode::read_write())
            .unwrap()
            .authenticate(&Pin::default(), UserType::User)
            .unwrap();
        token.inject_fault(Fault::Close);
        assert!(matches!(
            session.release().unwrap_err(),
            EdhsmError::Session(SessionError::Release { .. })
        ));
        let journal = token.journal();
        assert_eq!(journal.logouts, 1);
        assert_eq!(journal.closes, 1);
        assert_eq!(token.open_sessions(), 0);
    }

    #[test]
    fn test_run_reports_close_fault_after_success() {
        let token = SoftHsm::new(Pin::default());
        let device = initialized(&token);
        let slot = device.select_slot(0).unwrap();
        let session = device
            .open_session(&slot, SessionMode::read_write())
            .unwrap()
            .authenticate(&Pin::default(), UserType::User)
            .unwrap();
        token.inject_fault(Fault::Close);
        let result = session.run(|_| Ok(7));
        assert!(matches!(
            result.unwrap_err(),
            EdhsmError::Session(SessionError::Release { .. })
        ));
        assert_eq!(token.journal().closes, 1);
    }

    #[test]
    fn test_run_keeps_body_error_over_close_fault() {
        let token = SoftHsm::new(Pin::default());
        let device = initialized(&token);
        let slot = device.select_slot(0).unwrap();
        let session = device
            .open_session(&slot, SessionMode::read_write())
            .unwrap()
            .authenticate(&Pin::default(), UserType::User)
            .unwrap();
        token.inject_fault(Fault::Close);
        let result: EdhsmResult<()> = session.run(|_| Err(SessionError::NotLoggedIn.into()));
        assert!(matches!(
            result.unwrap_err(),
            EdhsmError::Session(SessionError::NotLoggedIn)
        ));
        let journal = token.journal();
        assert_eq!(journal.logouts, 1);
        assert_eq!(journal.closes, 1);
    }

    #[test]
    fn test_login_fault_closes_session() {
        let token = SoftHsm::new(Pin::default());
        let device = initialized(&token);
        let slot = device.select_slot(0).unwrap();
        token.inject_fault(Fault::Login);
        let result = device
            .open_session(&slot, SessionMode::read_write())
            .unwrap()
            .authenticate(&Pin::default(), UserType::User);
        assert!(matches!(
            result.unwrap_err(),
            EdhsmError::Session(SessionError::Authentication { .. })
        ));
        let journal = token.journal();
        assert_eq!(journal.logins, 1);
        assert_eq!(journal.logouts, 0);
        assert_eq!(journal.closes, 1);
        assert_eq!(token.open_sessions(), 0);
    }
}

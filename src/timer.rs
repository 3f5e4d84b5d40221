//! Resend gating for the "send verification code" button.
//!
//! [`ResendTimer`] is the plain state machine: at most one send in flight, and
//! after a successful send a countdown during which further requests are
//! refused. [`ResendGate`] drives it: it calls the [`CodeSender`]
//! collaborator and runs the one-second tick on a tokio task that stops at
//! zero, on [`ResendGate::reset`], or when the gate is dropped.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::SendActionError;

/// Seconds before another code may be requested.
pub const RESEND_COUNTDOWN_SECS: u32 = 60;

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResendState {
    pub remaining_seconds: u32,
    pub sending: bool,
}

impl ResendState {
    /// Whether the button may be pressed, given the readiness predicate.
    pub fn is_available(&self, ready: bool) -> bool {
        ready && !self.sending && self.remaining_seconds == 0
    }
}

/// Why a send request was refused.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    #[error("destination is not ready")]
    NotReady,
    #[error("a code is already being sent")]
    Sending,
    #[error("wait {0}s before requesting another code")]
    CoolingDown(u32),
}

#[derive(Debug, Clone)]
pub struct ResendTimer {
    state: ResendState,
    countdown: u32,
}

impl ResendTimer {
    pub fn new(countdown: u32) -> Self {
        Self {
            state: ResendState::default(),
            countdown,
        }
    }

    pub fn state(&self) -> ResendState {
        self.state
    }

    /// Claims the single send slot. State is unchanged on rejection.
    pub fn request_send(&mut self, ready: bool) -> Result<(), Rejection> {
        if !ready {
            return Err(Rejection::NotReady);
        }
        if self.state.sending {
            return Err(Rejection::Sending);
        }
        if self.state.remaining_seconds > 0 {
            return Err(Rejection::CoolingDown(self.state.remaining_seconds));
        }
        self.state.sending = true;
        Ok(())
    }

    /// Records the send outcome: success starts the countdown, failure frees
    /// the slot immediately.
    pub fn complete(
        &mut self,
        outcome: Result<(), SendActionError>,
    ) -> Result<(), SendActionError> {
        self.state.sending = false;
        if outcome.is_ok() {
            self.state.remaining_seconds = self.countdown;
        }
        outcome
    }

    /// Frees the send slot without starting a countdown.
    pub fn release(&mut self) {
        self.state.sending = false;
    }

    /// Stops the countdown. A send in flight keeps its slot.
    pub fn clear_countdown(&mut self) {
        self.state.remaining_seconds = 0;
    }

    /// One second passed. Returns whether the countdown was running.
    pub fn tick(&mut self) -> bool {
        if self.state.remaining_seconds == 0 {
            return false;
        }
        self.state.remaining_seconds -= 1;
        true
    }

    pub fn reset(&mut self) {
        self.state = ResendState::default();
    }
}

impl Default for ResendTimer {
    fn default() -> Self {
        Self::new(RESEND_COUNTDOWN_SECS)
    }
}

/// The external action that delivers a verification code.
#[async_trait]
pub trait CodeSender: Send + Sync {
    async fn send_code(&self, destination: &str) -> Result<(), SendActionError>;
}

/// Called with the new state after every transition.
pub type StateObserver = Arc<dyn Fn(ResendState) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Rejected(Rejection),
    /// The gate was reset while the send ran; its result was dropped.
    Discarded,
}

pub struct ResendGate {
    timer: Arc<Mutex<ResendTimer>>,
    sender: Arc<dyn CodeSender>,
    cancel: Mutex<CancellationToken>,
    observer: Option<StateObserver>,
}

impl ResendGate {
    pub fn new(sender: Arc<dyn CodeSender>) -> Self {
        Self::with_countdown(sender, RESEND_COUNTDOWN_SECS)
    }

    pub fn with_countdown(sender: Arc<dyn CodeSender>, countdown: u32) -> Self {
        Self {
            timer: Arc::new(Mutex::new(ResendTimer::new(countdown))),
            sender,
            cancel: Mutex::new(CancellationToken::new()),
            observer: None,
        }
    }

    pub fn observe(mut self, observer: StateObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn state(&self) -> ResendState {
        self.timer.lock().unwrap().state()
    }

    #[cfg(test)]
    pub(crate) fn timer_handle(&self) -> Arc<Mutex<ResendTimer>> {
        self.timer.clone()
    }

    fn publish(&self, state: ResendState) {
        if let Some(observer) = &self.observer {
            observer(state);
        }
    }

    /// Runs one send attempt for `destination`.
    ///
    /// Refused requests leave the state untouched. A failed send is returned
    /// as an error and the gate is immediately usable again. If the gate is
    /// reset while the send runs, the slot stays taken until the send returns
    /// and its result is discarded.
    pub async fn request(
        &self,
        destination: &str,
        ready: bool,
    ) -> Result<SendOutcome, SendActionError> {
        let (state, token) = {
            let mut timer = self.timer.lock().unwrap();
            if let Err(rejection) = timer.request_send(ready) {
                debug!(%rejection, "send request refused");
                return Ok(SendOutcome::Rejected(rejection));
            }
            (timer.state(), self.cancel.lock().unwrap().clone())
        };
        self.publish(state);

        info!(destination, "sending verification code");
        let result = self.sender.send_code(destination).await;

        let (state, result) = {
            let mut timer = self.timer.lock().unwrap();
            if token.is_cancelled() {
                timer.release();
                (timer.state(), None)
            } else {
                let result = timer.complete(result);
                (timer.state(), Some(result))
            }
        };
        self.publish(state);

        let Some(result) = result else {
            debug!(destination, "gate reset during send, result discarded");
            return Ok(SendOutcome::Discarded);
        };
        match result {
            Ok(()) => {
                self.spawn_countdown(token);
                Ok(SendOutcome::Sent)
            }
            Err(err) => {
                warn!(destination, error = %err, "verification code not sent");
                Err(err)
            }
        }
    }

    fn spawn_countdown(&self, token: CancellationToken) {
        let timer = self.timer.clone();
        let observer = self.observer.clone();
        tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + TICK, TICK);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("countdown cancelled");
                        break;
                    }
                    _ = interval.tick() => {
                        let state = {
                            let mut timer = timer.lock().unwrap();
                            if token.is_cancelled() {
                                break;
                            }
                            timer.tick();
                            timer.state()
                        };
                        if let Some(observer) = &observer {
                            observer(state);
                        }
                        if state.remaining_seconds == 0 {
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Stops any running countdown. A send in flight is discarded when it
    /// returns.
    pub fn reset(&self) {
        let state = {
            let mut timer = self.timer.lock().unwrap();
            let old = std::mem::take(&mut *self.cancel.lock().unwrap());
            old.cancel();
            timer.clear_countdown();
            timer.state()
        };
        self.publish(state);
    }
}

impl Drop for ResendGate {
    fn drop(&mut self) {
        if let Ok(token) = self.cancel.lock() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn second_request_is_refused_until_countdown_ends() {
        let mut timer = ResendTimer::default();
        assert_eq!(timer.request_send(true), Ok(()));
        assert_eq!(timer.request_send(true), Err(Rejection::Sending));

        timer.complete(Ok(())).unwrap();
        assert_eq!(
            timer.state(),
            ResendState {
                remaining_seconds: 60,
                sending: false,
            }
        );
        assert_eq!(timer.request_send(true), Err(Rejection::CoolingDown(60)));

        for _ in 0..60 {
            assert!(timer.tick());
        }
        assert!(!timer.tick());
        assert_eq!(timer.request_send(true), Ok(()));
    }

    #[test]
    fn refused_when_not_ready() {
        let mut timer = ResendTimer::default();
        assert_eq!(timer.request_send(false), Err(Rejection::NotReady));
        assert_eq!(timer.state(), ResendState::default());
        assert!(!timer.state().is_available(false));
        assert!(timer.state().is_available(true));
    }

    #[test]
    fn failure_frees_the_slot_without_countdown() {
        let mut timer = ResendTimer::default();
        timer.request_send(true).unwrap();
        let err = timer.complete(Err(SendActionError("gateway down".to_string()))).unwrap_err();
        assert_eq!(err.0, "gateway down");
        assert_eq!(timer.state(), ResendState::default());
        assert_eq!(timer.request_send(true), Ok(()));
    }

    struct FakeSender {
        calls: AtomicUsize,
        active: AtomicUsize,
        peak: AtomicUsize,
        delay: Duration,
        fail: bool,
    }

    impl FakeSender {
        fn new(delay: Duration, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                delay,
                fail,
            })
        }
    }

    #[async_trait]
    impl CodeSender for FakeSender {
        async fn send_code(&self, _destination: &str) -> Result<(), SendActionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(active, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            if self.fail {
                Err(SendActionError("sms gateway rejected the number".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_runs_on_the_clock() {
        let sender = FakeSender::new(Duration::ZERO, false);
        let gate = ResendGate::new(sender.clone());

        assert_eq!(gate.request("13800138000", true).await, Ok(SendOutcome::Sent));
        assert_eq!(gate.state().remaining_seconds, 60);
        assert_eq!(
            gate.request("13800138000", true).await,
            Ok(SendOutcome::Rejected(Rejection::CoolingDown(60)))
        );

        tokio::time::sleep(Duration::from_millis(30_500)).await;
        assert_eq!(gate.state().remaining_seconds, 30);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(gate.state().remaining_seconds, 0);
        assert_eq!(gate.request("13800138000", true).await, Ok(SendOutcome::Sent));
        assert_eq!(sender.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_request_is_single_flight() {
        let sender = FakeSender::new(Duration::from_secs(1), false);
        let gate = Arc::new(ResendGate::new(sender.clone()));

        let first = tokio::spawn({
            let gate = gate.clone();
            async move { gate.request("13800138000", true).await }
        });
        tokio::task::yield_now().await;
        assert!(gate.state().sending);
        assert_eq!(
            gate.request("13800138000", true).await,
            Ok(SendOutcome::Rejected(Rejection::Sending))
        );

        assert_eq!(first.await.unwrap(), Ok(SendOutcome::Sent));
        assert_eq!(sender.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_send_is_retryable() {
        let gate = ResendGate::new(FakeSender::new(Duration::ZERO, true));
        assert!(gate.request("13800138000", true).await.is_err());
        assert_eq!(gate.state(), ResendState::default());
        assert!(gate.request("13800138000", true).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn reset_stops_the_ticker() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let gate = ResendGate::with_countdown(FakeSender::new(Duration::ZERO, false), 5).observe({
            let seen = seen.clone();
            Arc::new(move |state: ResendState| seen.lock().unwrap().push(state.remaining_seconds))
        });

        gate.request("13800138000", true).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        gate.reset();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(gate.state(), ResendState::default());
        // sending, sent (5), two ticks, reset
        assert_eq!(*seen.lock().unwrap(), [0, 5, 4, 3, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_during_send_keeps_single_flight() {
        let sender = FakeSender::new(Duration::from_secs(1), false);
        let gate = Arc::new(ResendGate::new(sender.clone()));

        let first = tokio::spawn({
            let gate = gate.clone();
            async move { gate.request("13800138000", true).await }
        });
        tokio::task::yield_now().await;
        gate.reset();

        // The slot stays taken until the first send returns.
        assert!(gate.state().sending);
        assert_eq!(
            gate.request("13800138000", true).await,
            Ok(SendOutcome::Rejected(Rejection::Sending))
        );
        assert_eq!(first.await.unwrap(), Ok(SendOutcome::Discarded));
        assert_eq!(gate.state(), ResendState::default());

        // No countdown from the discarded send.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(gate.state(), ResendState::default());

        assert_eq!(gate.request("13800138000", true).await, Ok(SendOutcome::Sent));
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(gate.state().remaining_seconds, 59);
        assert_eq!(sender.calls.load(Ordering::SeqCst), 2);
        assert_eq!(sender.peak.load(Ordering::SeqCst), 1);
    }
}

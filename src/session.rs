//! Session store: the lifecycle state machine.
//!
//! `setup -> loading -> playing -> result`, with `reset_game` going back to
//! `setup` from anywhere. The store is the only mutable owner of session
//! state. Every gateway call is split into a `begin_*` half that hands out a
//! ticket and a `complete_*` half that applies the reply, so a reply that
//! arrives after a reset or a restart is recognised by its epoch and dropped.
//! The async helpers (`start_game`, `submit_answer`, `tick`, ...) just run
//! both halves back to back.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tracing::{debug, info, warn};

use crate::engine::validate_settings;
use crate::error::{GameError, Result};
use crate::game::{GameCode, GameMode, GameSession, GameSettings, PlayerChoice, Trial, TrialOutcome};
use crate::gateway::{Gateway, StartedGame};
use crate::stats::{compute_metrics, SessionMetrics};
use crate::timer::{Clock, RoundTimer, TimeUpHandler, TimerStatus};

/// Gateway failures tolerated per call before the session is aborted.
pub const MAX_RETRIES: u32 = 1;

pub const UNSAVED_NOTICE: &str = "results were not saved: the session has no durable id";

/// Proof that a start was requested in the current epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct StartTicket {
    epoch: u64,
    pub code: GameCode,
    pub settings: GameSettings,
}

/// A mid-session gateway call the store is waiting on.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    Submit {
        session_key: i64,
        trial_index: usize,
        choice: PlayerChoice,
        response_time_ms: u64,
        confidence: Option<u8>,
    },
    FetchNext {
        session_key: i64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallReply {
    Submitted(TrialOutcome),
    Next(Option<Trial>),
}

impl GatewayCall {
    pub async fn run(&self, gateway: &dyn Gateway) -> Result<CallReply> {
        match self {
            GatewayCall::Submit {
                session_key,
                trial_index,
                choice,
                response_time_ms,
                confidence,
            } => gateway
                .submit_answer(
                    *session_key,
                    *trial_index,
                    choice.clone(),
                    *response_time_ms,
                    *confidence,
                )
                .await
                .map(CallReply::Submitted),
            GatewayCall::FetchNext { session_key } => gateway
                .get_next_problem(*session_key)
                .await
                .map(CallReply::Next),
        }
    }
}

/// Identifies one in-flight call by epoch and trial.
#[derive(Debug, Clone, PartialEq)]
pub struct CallTicket {
    epoch: u64,
    trial_index: usize,
    pub call: GatewayCall,
}

#[derive(Debug, Clone)]
struct Pending {
    trial_index: usize,
    call: GatewayCall,
    failures: u32,
}

pub struct SessionStore {
    gateway: Arc<dyn Gateway>,
    clock: Arc<dyn Clock>,
    mode: GameMode,
    session: Option<GameSession>,
    /// Id used for gateway calls; local-only ids never reach `session`.
    session_key: Option<i64>,
    current: Option<Trial>,
    results: Vec<TrialOutcome>,
    trial_timer: RoundTimer,
    session_timer: RoundTimer,
    trial_started_at: Duration,
    epoch: u64,
    pending: Option<Pending>,
    last_error: Option<GameError>,
    result_notice: Option<String>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("mode", &self.mode)
            .field("session", &self.session)
            .field("current", &self.current.as_ref().map(|t| t.index))
            .field("results", &self.results.len())
            .field("epoch", &self.epoch)
            .field("pending", &self.pending)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    pub fn new(gateway: Arc<dyn Gateway>, clock: Arc<dyn Clock>) -> Self {
        Self {
            trial_timer: RoundTimer::new(Arc::clone(&clock), 0),
            session_timer: RoundTimer::new(Arc::clone(&clock), 0),
            gateway,
            clock,
            mode: GameMode::Setup,
            session: None,
            session_key: None,
            current: None,
            results: Vec::new(),
            trial_started_at: Duration::ZERO,
            epoch: 0,
            pending: None,
            last_error: None,
            result_notice: None,
        }
    }

    pub fn game_mode(&self) -> GameMode {
        self.mode
    }

    /// Durable session id; `None` for local-only sessions.
    pub fn session_id(&self) -> Option<i64> {
        self.session.as_ref().and_then(|s| s.session_id)
    }

    pub fn session(&self) -> Option<&GameSession> {
        self.session.as_ref()
    }

    pub fn results(&self) -> &[TrialOutcome] {
        &self.results
    }

    pub fn current_trial(&self) -> Option<&Trial> {
        self.current.as_ref()
    }

    pub fn last_error(&self) -> Option<&GameError> {
        self.last_error.as_ref()
    }

    /// Display-only message shown with the results, e.g. when nothing was saved.
    pub fn result_notice(&self) -> Option<&str> {
        self.result_notice.as_deref()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn gateway(&self) -> Arc<dyn Gateway> {
        Arc::clone(&self.gateway)
    }

    /// Metrics over the outcomes so far.
    pub fn metrics(&self) -> SessionMetrics {
        compute_metrics(&self.results)
    }

    pub fn remaining_ms(&self) -> u64 {
        self.trial_timer.remaining_ms()
    }

    pub fn progress(&self) -> f64 {
        self.trial_timer.progress()
    }

    pub fn elapsed_in_trial_ms(&self) -> u64 {
        self.clock
            .now()
            .saturating_sub(self.trial_started_at)
            .as_millis() as u64
    }

    /// Observer for trial timeouts. Replaces any earlier handler.
    pub fn set_time_up_handler(&mut self, handler: TimeUpHandler) {
        self.trial_timer.set_on_time_up(handler);
    }

    pub fn begin_start(&mut self, code: GameCode, settings: GameSettings) -> Result<StartTicket> {
        if matches!(self.mode, GameMode::Loading | GameMode::Playing) {
            return Err(GameError::InvalidState {
                operation: "start a game",
                mode: self.mode,
            });
        }
        if self.mode == GameMode::Result {
            self.reset_game();
        }
        if let Err(err) = validate_settings(code, &settings) {
            warn!(game = %code, error = %err, "rejected settings");
            self.last_error = Some(err.clone());
            return Err(err);
        }

        self.epoch += 1;
        self.mode = GameMode::Loading;
        self.last_error = None;
        self.result_notice = None;
        debug!(game = %code, epoch = self.epoch, "loading");

        Ok(StartTicket {
            epoch: self.epoch,
            code,
            settings,
        })
    }

    /// Applies the gateway's answer to a start request. Returns `Ok(false)`
    /// when the ticket no longer matches the store; a session the gateway
    /// opened for it is abandoned.
    pub fn complete_start(&mut self, ticket: StartTicket, reply: Result<StartedGame>) -> Result<bool> {
        if ticket.epoch != self.epoch || self.mode != GameMode::Loading {
            debug!(epoch = ticket.epoch, current = self.epoch, "dropping stale start reply");
            if let Ok(started) = reply {
                self.release(started.session_id);
            }
            return Ok(false);
        }

        let started = match reply {
            Ok(started) => started,
            Err(err) => {
                warn!(game = %ticket.code, error = %err, "failed to start session");
                self.mode = GameMode::Setup;
                self.last_error = Some(err.clone());
                return Err(err);
            }
        };

        let settings = ticket.settings;
        self.trial_timer.set_time_limit(settings.time_limit_ms);
        self.session_timer
            .set_time_limit(settings.session_time_limit_ms.unwrap_or(0));
        if settings.session_time_limit_ms.is_some() {
            self.session_timer.start();
        }

        self.session = Some(GameSession {
            session_id: started.durable.then_some(started.session_id),
            game_code: ticket.code,
            settings,
            started_at: Local::now(),
        });
        self.session_key = Some(started.session_id);
        self.results.clear();
        self.pending = None;
        self.mode = GameMode::Playing;
        info!(
            session_id = started.session_id,
            durable = started.durable,
            game = %ticket.code,
            "session started"
        );
        self.enter_trial(started.first_problem);
        Ok(true)
    }

    pub async fn start_game(&mut self, code: GameCode, settings: GameSettings) -> Result<()> {
        let ticket = self.begin_start(code, settings)?;
        let gateway = Arc::clone(&self.gateway);
        let reply = gateway.start_game(ticket.code, &ticket.settings).await;
        self.complete_start(ticket, reply).map(|_| ())
    }

    fn enter_trial(&mut self, trial: Trial) {
        debug!(trial = trial.index, "trial started");
        self.trial_started_at = self.clock.now();
        if trial.deadline_ms.is_some() {
            self.trial_timer.start();
        } else {
            self.trial_timer.stop();
        }
        self.current = Some(trial);
    }

    /// Restarts the countdown of the current trial after a rejected call.
    fn rearm(&mut self) {
        if self.current.as_ref().is_some_and(|t| t.deadline_ms.is_some()) {
            debug!("trial timer re-armed");
            self.trial_timer.start();
        }
    }

    fn release(&self, session_key: i64) {
        if let Err(err) = self.gateway.abandon(session_key) {
            warn!(session_key, error = %err, "failed to abandon session");
        }
    }

    /// Registers an answer for `trial_index` and returns the call to run.
    pub fn begin_submit(
        &mut self,
        trial_index: usize,
        choice: PlayerChoice,
        response_time_ms: u64,
        confidence: Option<u8>,
    ) -> Result<CallTicket> {
        if self.mode != GameMode::Playing {
            return Err(GameError::InvalidState {
                operation: "submit an answer",
                mode: self.mode,
            });
        }
        if let Some(pending) = &self.pending {
            return Err(GameError::UnresolvedTrial(pending.trial_index));
        }
        let (Some(current), Some(session_key)) = (self.current.as_ref(), self.session_key) else {
            return Err(GameError::InvalidState {
                operation: "submit an answer",
                mode: self.mode,
            });
        };
        if current.index != trial_index {
            warn!(got = trial_index, expected = current.index, "stale submission dropped");
            return Err(GameError::StaleSubmission {
                expected: Some(current.index),
                got: trial_index,
            });
        }

        self.trial_timer.stop();
        let call = GatewayCall::Submit {
            session_key,
            trial_index,
            choice,
            response_time_ms,
            confidence,
        };
        Ok(self.park(trial_index, call))
    }

    fn park(&mut self, trial_index: usize, call: GatewayCall) -> CallTicket {
        self.pending = Some(Pending {
            trial_index,
            call: call.clone(),
            failures: 0,
        });
        CallTicket {
            epoch: self.epoch,
            trial_index,
            call,
        }
    }

    /// Applies a gateway reply. Returns the follow-up call, if any.
    ///
    /// Replies for an older epoch or a different trial are ignored. A
    /// transport failure leaves the trial pending for one [`retry_pending`];
    /// a second failure aborts to `result` with the outcomes gathered so far.
    /// A submission the gateway calls stale is followed by a fetch of the
    /// gateway's active trial. Other rejections re-arm the trial timer.
    ///
    /// [`retry_pending`]: SessionStore::retry_pending
    pub fn complete_resolve(
        &mut self,
        ticket: CallTicket,
        reply: Result<CallReply>,
    ) -> Result<Option<CallTicket>> {
        let matches_pending = self
            .pending
            .as_ref()
            .map_or(false, |p| p.trial_index == ticket.trial_index && p.call == ticket.call);
        if ticket.epoch != self.epoch || self.mode != GameMode::Playing || !matches_pending {
            debug!(trial = ticket.trial_index, epoch = ticket.epoch, "dropping stale gateway reply");
            return Ok(None);
        }

        let reply = match reply {
            Ok(reply) => reply,
            Err(err) if err.is_transport() => return Err(self.fail_pending(err)),
            Err(err) => {
                warn!(trial = ticket.trial_index, error = %err, "gateway rejected the call");
                self.pending = None;
                self.last_error = Some(err.clone());
                match (&err, &ticket.call) {
                    (
                        GameError::StaleSubmission { expected: Some(_), .. },
                        GatewayCall::Submit { session_key, .. },
                    ) => {
                        let call = GatewayCall::FetchNext {
                            session_key: *session_key,
                        };
                        return Ok(Some(self.park(ticket.trial_index, call)));
                    }
                    (
                        GameError::StaleSubmission { expected: None, .. }
                        | GameError::SessionExhausted
                        | GameError::UnknownSession(_),
                        _,
                    ) => self.finish(),
                    _ => self.rearm(),
                }
                return Err(err);
            }
        };

        self.pending = None;
        self.last_error = None;
        match reply {
            CallReply::Submitted(outcome) => {
                debug!(trial = outcome.trial_index, correct = outcome.is_correct, "trial resolved");
                self.results.push(outcome);
                let round_count = self.session.as_ref().map_or(0, |s| s.settings.round_count);
                if self.results.len() >= round_count {
                    self.finish();
                    return Ok(None);
                }
                let Some(session_key) = self.session_key else {
                    self.finish();
                    return Ok(None);
                };
                Ok(Some(self.park(ticket.trial_index, GatewayCall::FetchNext { session_key })))
            }
            CallReply::Next(Some(trial)) => {
                self.enter_trial(trial);
                Ok(None)
            }
            CallReply::Next(None) => {
                self.finish();
                Ok(None)
            }
        }
    }

    fn fail_pending(&mut self, err: GameError) -> GameError {
        let failures = match self.pending.as_mut() {
            Some(pending) => {
                pending.failures += 1;
                pending.failures
            }
            None => 0,
        };
        warn!(error = %err, failures, "gateway call failed; trial left unresolved");
        self.last_error = Some(err.clone());
        if failures > MAX_RETRIES {
            warn!(results = self.results.len(), "giving up; finishing with partial results");
            self.finish();
        }
        err
    }

    /// The ticket for re-running the pending call, if one is waiting.
    pub fn pending_ticket(&self) -> Option<CallTicket> {
        self.pending.as_ref().map(|p| CallTicket {
            epoch: self.epoch,
            trial_index: p.trial_index,
            call: p.call.clone(),
        })
    }

    async fn drive(&mut self, mut ticket: CallTicket) -> Result<()> {
        let gateway = Arc::clone(&self.gateway);
        loop {
            let reply = ticket.call.run(gateway.as_ref()).await;
            match self.complete_resolve(ticket, reply)? {
                Some(next) => ticket = next,
                None => return Ok(()),
            }
        }
    }

    pub async fn submit_answer(
        &mut self,
        choice: PlayerChoice,
        response_time_ms: u64,
        confidence: Option<u8>,
    ) -> Result<()> {
        let index = match (self.mode, self.current.as_ref()) {
            (GameMode::Playing, Some(trial)) => trial.index,
            _ => {
                return Err(GameError::InvalidState {
                    operation: "submit an answer",
                    mode: self.mode,
                })
            }
        };
        self.submit_answer_for(index, choice, response_time_ms, confidence)
            .await
    }

    /// Like [`SessionStore::submit_answer`] but names the trial explicitly,
    /// so late answers for an earlier trial are rejected as stale.
    pub async fn submit_answer_for(
        &mut self,
        trial_index: usize,
        choice: PlayerChoice,
        response_time_ms: u64,
        confidence: Option<u8>,
    ) -> Result<()> {
        let ticket = self.begin_submit(trial_index, choice, response_time_ms, confidence)?;
        self.drive(ticket).await
    }

    /// Re-runs the call left pending by a transport failure.
    pub async fn retry_pending(&mut self) -> Result<()> {
        match self.pending_ticket() {
            Some(ticket) if self.mode == GameMode::Playing => {
                info!(trial = ticket.trial_index, "retrying gateway call");
                self.drive(ticket).await
            }
            _ => Ok(()),
        }
    }

    /// Samples both timers. A session timeout ends the game; a trial timeout
    /// is submitted as `Timeout` through the normal submission path.
    pub async fn tick(&mut self) -> Result<()> {
        if self.mode != GameMode::Playing {
            return Ok(());
        }
        if self.session_timer.tick()? == TimerStatus::Expired {
            info!("session time limit reached");
            self.finish();
            return Ok(());
        }
        if self.pending.is_some() {
            return Ok(());
        }
        if self.trial_timer.tick()? != TimerStatus::Expired {
            return Ok(());
        }
        let Some(index) = self.current.as_ref().map(|t| t.index) else {
            return Ok(());
        };
        info!(trial = index, "trial timed out");
        let limit = self.trial_timer.time_limit_ms();
        let ticket = self.begin_submit(index, PlayerChoice::Timeout, limit, None)?;
        self.drive(ticket).await
    }

    fn finish(&mut self) {
        self.trial_timer.stop();
        self.session_timer.stop();
        self.pending = None;
        self.current = None;
        self.mode = GameMode::Result;
        self.epoch += 1;
        if let Some(session_key) = self.session_key {
            self.release(session_key);
        }

        match self.session_id() {
            Some(session_id) => {
                info!(session_id, trials = self.results.len(), "session finished")
            }
            None => {
                warn!(trials = self.results.len(), "session finished without a durable id");
                self.result_notice = Some(UNSAVED_NOTICE.to_string());
            }
        }
    }

    /// Back to `setup`, dropping the session and cancelling timers. Calling it
    /// again, or while already in `setup`, changes nothing.
    pub fn reset_game(&mut self) {
        let active = self.mode != GameMode::Setup || self.session.is_some() || self.pending.is_some();
        if !active {
            return;
        }
        self.trial_timer.stop();
        self.session_timer.stop();
        if let Some(session_key) = self.session_key.take() {
            self.release(session_key);
        }
        self.session = None;
        self.current = None;
        self.results.clear();
        self.pending = None;
        self.last_error = None;
        self.result_notice = None;
        self.mode = GameMode::Setup;
        self.epoch += 1;
        debug!(epoch = self.epoch, "session reset");
    }
}

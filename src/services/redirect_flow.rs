//! Redirect view state machine.
//!
//! `Idle -> Validating -> AdLoading -> AdDisplayed -> Verifying -> Unlocked`,
//! with `Failed` reachable from every step before `Unlocked`. Verification is
//! only issued once the countdown finishes or an allowed skip happens, and at
//! most once per attempt. Dispatch only follows a successful verification.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::config::GatePolicy;
use crate::errors::ValidationError;
use crate::models::{Advertisement, PendingDownload, UnlockGrant};
use crate::services::ad_service::AdSource;
use crate::services::countdown::{Countdown, Tick};
use crate::services::dispatcher::{DownloadDispatcher, Navigator};
use crate::services::verification::ViewVerifier;
use crate::services::PendingDownloadStore;

pub const INVALID_REQUEST_MESSAGE: &str = "invalid or missing download request";
pub const NO_AD_MESSAGE: &str = "no advertisement is available right now";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    InvalidRequest,
    NoAdvertisement,
    AdFetch,
    Verification,
    Dispatch,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl FlowFailure {
    fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// An invalid request can only be fixed from the app page; every other
    /// failure keeps the pending download so the redirect view can retry.
    pub fn can_retry_in_place(&self) -> bool {
        self.kind != FailureKind::InvalidRequest
    }

    pub fn retry_hint(&self) -> &'static str {
        if self.can_retry_in_place() {
            "retry to watch the advertisement again"
        } else {
            "go back to the app page and start the download again"
        }
    }
}

impl fmt::Display for FlowFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.retry_hint())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    Validating,
    AdLoading,
    AdDisplayed {
        ad_id: String,
        ad_name: Option<String>,
        remaining: u32,
        total: u32,
        can_skip: bool,
    },
    Verifying,
    Unlocked {
        expires_at: DateTime<Utc>,
    },
    Failed(FlowFailure),
}

impl FlowState {
    pub fn is_displaying_ad(&self) -> bool {
        matches!(self, FlowState::AdDisplayed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            FlowState::Idle => "idle",
            FlowState::Validating => "validating",
            FlowState::AdLoading => "ad_loading",
            FlowState::AdDisplayed { .. } => "ad_displayed",
            FlowState::Verifying => "verifying",
            FlowState::Unlocked { .. } => "unlocked",
            FlowState::Failed(_) => "failed",
        }
    }
}

/// Input from the redirect view while the flow runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowEvent {
    Skip,
    Retry,
    Cancel,
}

pub struct RedirectFlow<A, V, N> {
    ads: A,
    verifier: V,
    dispatcher: DownloadDispatcher<N>,
    store: PendingDownloadStore,
    policy: GatePolicy,
    state_tx: watch::Sender<FlowState>,
    pending: Option<PendingDownload>,
    ad: Option<Advertisement>,
    countdown: Option<Countdown>,
    verification_issued: bool,
    grant: Option<UnlockGrant>,
}

impl<A, V, N> RedirectFlow<A, V, N>
where
    A: AdSource,
    V: ViewVerifier,
    N: Navigator,
{
    pub fn new(
        ads: A,
        verifier: V,
        navigator: N,
        store: PendingDownloadStore,
        policy: GatePolicy,
    ) -> Self {
        let (state_tx, _) = watch::channel(FlowState::Idle);
        Self {
            ads,
            verifier,
            dispatcher: DownloadDispatcher::new(navigator, store.clone()),
            store,
            policy,
            state_tx,
            pending: None,
            ad: None,
            countdown: None,
            verification_issued: false,
            grant: None,
        }
    }

    pub fn state(&self) -> FlowState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FlowState> {
        self.state_tx.subscribe()
    }

    pub fn ads(&self) -> &A {
        &self.ads
    }

    pub fn verifier(&self) -> &V {
        &self.verifier
    }

    pub fn dispatcher(&self) -> &DownloadDispatcher<N> {
        &self.dispatcher
    }

    pub fn pending(&self) -> Option<&PendingDownload> {
        self.pending.as_ref()
    }

    pub fn grant(&self) -> Option<&UnlockGrant> {
        self.grant.as_ref()
    }

    /// Arrival at the redirect view: validate the stored request and load
    /// the advertisement. Only runs from `Idle`.
    pub async fn enter(&mut self) -> FlowState {
        if self.state() != FlowState::Idle {
            tracing::warn!(state = self.state().label(), "redirect flow already entered");
            return self.state();
        }

        self.set_state(FlowState::Validating);
        let pending = match self.load_pending() {
            Ok(pending) => pending,
            Err(err) => {
                tracing::warn!("rejecting download request: {}", err);
                if let Err(clear_err) = self.store.clear() {
                    tracing::warn!("failed to clear invalid pending download: {}", clear_err);
                }
                return self.fail(FailureKind::InvalidRequest, INVALID_REQUEST_MESSAGE);
            }
        };
        self.pending = Some(pending);

        self.set_state(FlowState::AdLoading);
        let ad = match self.ads.fetch_download_ad().await {
            Ok(Some(ad)) => ad,
            Ok(None) => return self.fail(FailureKind::NoAdvertisement, NO_AD_MESSAGE),
            Err(err) => return self.fail(FailureKind::AdFetch, err.to_string()),
        };
        let Some(ad_id) = ad.id.clone().filter(|id| !id.trim().is_empty()) else {
            tracing::warn!("advertisement without an id cannot be verified");
            return self.fail(FailureKind::NoAdvertisement, NO_AD_MESSAGE);
        };

        let countdown = Countdown::for_ad(&ad.settings, &self.policy);
        tracing::info!(
            ad_id = %ad_id,
            countdown = countdown.total(),
            "showing download advertisement"
        );
        self.set_state(FlowState::AdDisplayed {
            ad_id,
            ad_name: ad.name.clone(),
            remaining: countdown.remaining(),
            total: countdown.total(),
            can_skip: countdown.can_skip(),
        });
        self.ad = Some(ad);
        self.countdown = Some(countdown);
        self.state()
    }

    /// One elapsed second. The tick that reaches zero issues verification.
    pub async fn on_tick(&mut self) -> FlowState {
        let displaying = self.state().is_displaying_ad();
        let tick = match self.countdown.as_mut() {
            Some(countdown) if displaying => countdown.tick(),
            _ => Tick::Spent,
        };
        match tick {
            Tick::Counting(_) => {
                self.refresh_countdown();
                self.state()
            }
            Tick::Finished => {
                self.refresh_countdown();
                self.complete_view().await
            }
            Tick::Spent => self.state(),
        }
    }

    pub async fn on_skip(&mut self) -> FlowState {
        let displaying = self.state().is_displaying_ad();
        let skipped = match self.countdown.as_mut() {
            Some(countdown) if displaying => countdown.skip(),
            _ => false,
        };
        if !skipped {
            tracing::debug!("skip ignored");
            return self.state();
        }
        tracing::info!("advertisement skipped");
        self.complete_view().await
    }

    /// Exchanges the finished view for an unlock grant and releases the
    /// download. Repeated calls are no-ops.
    async fn complete_view(&mut self) -> FlowState {
        let ready = self.countdown.as_ref().is_some_and(Countdown::is_done);
        if self.verification_issued || !ready || !self.state().is_displaying_ad() {
            return self.state();
        }
        let (Some(ad_id), Some(pending)) = (
            self.ad.as_ref().and_then(|ad| ad.id.clone()),
            self.pending.clone(),
        ) else {
            return self.state();
        };

        self.verification_issued = true;
        self.set_state(FlowState::Verifying);

        let grant = match self.verifier.verify_view(&ad_id, &pending.url).await {
            Ok(grant) => grant,
            Err(err) => {
                tracing::warn!(ad_id = %ad_id, "advertisement view not verified: {}", err);
                return self.fail(FailureKind::Verification, err.to_string());
            }
        };

        if let Err(err) = self.dispatcher.dispatch(&grant, &pending) {
            return self.fail(FailureKind::Dispatch, err.to_string());
        }

        let expires_at = grant.expires_at;
        self.grant = Some(grant);
        self.set_state(FlowState::Unlocked { expires_at });
        self.state()
    }

    /// Starts a new attempt from the stored request. Only valid from `Failed`.
    pub async fn retry(&mut self) -> FlowState {
        if !matches!(self.state(), FlowState::Failed(_)) {
            return self.state();
        }
        tracing::info!("retrying download unlock");
        self.reset();
        self.enter().await
    }

    /// Gives up on a failed attempt for good. The pending download is cleared
    /// so a later visit does not resume a stale redirect.
    pub fn abandon(&mut self) -> FlowState {
        if !matches!(self.state(), FlowState::Failed(_)) {
            return self.state();
        }
        if let Err(err) = self.store.clear() {
            tracing::warn!("failed to clear abandoned pending download: {}", err);
        }
        tracing::info!("download unlock abandoned");
        self.reset();
        self.state()
    }

    /// Abandons the in-memory attempt. The pending download stays stored.
    pub fn cancel(&mut self) {
        if matches!(self.state(), FlowState::Unlocked { .. }) {
            return;
        }
        tracing::info!(state = self.state().label(), "redirect flow cancelled");
        self.reset();
    }

    /// Drives the attempt to completion: enters if idle, counts down once per
    /// second, and reacts to skip/cancel events. The interval lives inside
    /// this future, so dropping it stops the countdown.
    pub async fn run(&mut self, events: &mut mpsc::Receiver<FlowEvent>) -> FlowState {
        if self.state() == FlowState::Idle {
            self.enter().await;
        }
        if !self.state().is_displaying_ad() {
            return self.state();
        }

        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        let mut events_open = true;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let state = self.on_tick().await;
                    if !state.is_displaying_ad() {
                        return state;
                    }
                }
                event = events.recv(), if events_open => match event {
                    Some(FlowEvent::Skip) => {
                        let state = self.on_skip().await;
                        if !state.is_displaying_ad() {
                            return state;
                        }
                    }
                    Some(FlowEvent::Cancel) => {
                        self.cancel();
                        return self.state();
                    }
                    Some(FlowEvent::Retry) => tracing::debug!("retry ignored while ad is showing"),
                    None => events_open = false,
                },
            }
        }
    }

    fn load_pending(&self) -> Result<PendingDownload, ValidationError> {
        let pending = self.store.get().ok_or(ValidationError::Missing)?;
        pending.validate()?;
        Ok(pending)
    }

    fn refresh_countdown(&mut self) {
        let (Some(countdown), Some(ad)) = (self.countdown.as_ref(), self.ad.as_ref()) else {
            return;
        };
        let state = FlowState::AdDisplayed {
            ad_id: ad.id.clone().unwrap_or_default(),
            ad_name: ad.name.clone(),
            remaining: countdown.remaining(),
            total: countdown.total(),
            can_skip: countdown.can_skip(),
        };
        self.state_tx.send_replace(state);
    }

    fn reset(&mut self) {
        self.pending = None;
        self.ad = None;
        self.countdown = None;
        self.verification_issued = false;
        self.grant = None;
        self.set_state(FlowState::Idle);
    }

    fn fail(&mut self, kind: FailureKind, message: impl Into<String>) -> FlowState {
        let failure = FlowFailure::new(kind, message);
        self.set_state(FlowState::Failed(failure));
        self.state()
    }

    fn set_state(&mut self, state: FlowState) {
        let previous = self.state_tx.borrow().label();
        if let FlowState::Failed(failure) = &state {
            tracing::warn!(from = previous, kind = ?failure.kind, "download unlock failed: {}", failure.message);
        } else {
            tracing::info!(from = previous, to = state.label(), "redirect flow transition");
        }
        self.state_tx.send_replace(state);
    }
}

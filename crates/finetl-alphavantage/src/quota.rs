//! Per-minute and per-day API quota accounting.

use chrono::{DateTime, Days, TimeDelta, Utc};
use finetl_core::{EtlError, QuotaSnapshot, QuotaStateStore, Result, StopSignal};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Length of the rolling per-minute window.
pub const MINUTE_WINDOW: Duration = Duration::from_secs(60);

/// Key the quota snapshot is persisted under when none is given.
pub const DEFAULT_QUOTA_KEY: &str = "alphavantage";

/// Longest single sleep between stop checks while waiting.
const STOP_POLL: Duration = Duration::from_secs(1);

/// Source of the current time for quota accounting.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Call caps enforced by a [`QuotaTracker`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuotaLimits {
    /// Calls allowed in any trailing 60 s window.
    pub per_minute: u32,
    /// Calls allowed per UTC day.
    pub per_day: u32,
}

impl Default for QuotaLimits {
    /// The free-tier limits: 5 calls per minute, 25 per day.
    fn default() -> Self {
        Self {
            per_minute: 5,
            per_day: 25,
        }
    }
}

/// Proof that a call slot was taken.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Permit {
    /// When the slot was taken.
    pub granted_at: DateTime<Utc>,
    /// Calls made today, this one included.
    pub day_count: u32,
}

/// Outcome of [`QuotaTracker::reserve`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reservation {
    /// A slot was taken and recorded.
    Granted(Permit),
    /// No slot is free; one frees up after this long.
    Wait(Duration),
}

/// Tracks API calls against a per-minute and a per-day cap.
///
/// The minute cap uses a rolling log of call timestamps; the day cap resets
/// at UTC midnight. State sits behind one async mutex so concurrent callers
/// cannot both take the last slot. When a [`QuotaStateStore`] is attached,
/// every change is persisted before it takes effect, so a restarted process
/// resumes with the same counters.
pub struct QuotaTracker {
    limits: QuotaLimits,
    key: String,
    state: Mutex<QuotaSnapshot>,
    backend: Option<Arc<dyn QuotaStateStore>>,
    clock: Clock,
}

impl fmt::Debug for QuotaTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuotaTracker")
            .field("limits", &self.limits)
            .field("key", &self.key)
            .field("persistent", &self.backend.is_some())
            .finish_non_exhaustive()
    }
}

impl QuotaTracker {
    /// Create a tracker whose counters live only in memory.
    #[must_use]
    pub fn new(limits: QuotaLimits) -> Self {
        Self {
            limits,
            key: DEFAULT_QUOTA_KEY.to_string(),
            state: Mutex::new(QuotaSnapshot::empty(Utc::now())),
            backend: None,
            clock: Arc::new(Utc::now),
        }
    }

    /// Create a tracker backed by `backend`, resuming from the snapshot stored
    /// under `key` if there is one.
    ///
    /// # Errors
    /// Returns an error if the stored snapshot cannot be read.
    pub fn load(
        limits: QuotaLimits,
        key: impl Into<String>,
        backend: Arc<dyn QuotaStateStore>,
    ) -> Result<Self> {
        let key = key.into();
        let snapshot = backend
            .load_quota(&key)?
            .unwrap_or_else(|| QuotaSnapshot::empty(Utc::now()));
        debug!(
            key = %key,
            day = %snapshot.day,
            day_count = snapshot.day_count,
            "Loaded quota state"
        );

        Ok(Self {
            limits,
            key,
            state: Mutex::new(snapshot),
            backend: Some(backend),
            clock: Arc::new(Utc::now),
        })
    }

    /// Read the time from `clock` instead of the system clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// The tracker's notion of now.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// The caps this tracker enforces.
    #[must_use]
    pub const fn limits(&self) -> QuotaLimits {
        self.limits
    }

    /// Current counters.
    pub async fn snapshot(&self) -> QuotaSnapshot {
        self.state.lock().await.clone()
    }

    /// Try to take a slot now.
    ///
    /// # Errors
    /// Only fails if the new state cannot be persisted.
    pub async fn reserve(&self) -> Result<Reservation> {
        self.reserve_at(self.now()).await
    }

    /// Try to take a slot at `now`.
    ///
    /// Exhaustion is reported as [`Reservation::Wait`], never as an error.
    ///
    /// # Errors
    /// Only fails if the new state cannot be persisted.
    pub async fn reserve_at(&self, now: DateTime<Utc>) -> Result<Reservation> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        roll(&mut next, now);

        if next.day_count >= self.limits.per_day {
            return Ok(Reservation::Wait(until_next_midnight(now)));
        }

        let per_minute = self.limits.per_minute as usize;
        if next.minute_calls.len() >= per_minute {
            let wait = next
                .minute_calls
                .iter()
                .min()
                .map_or(MINUTE_WINDOW, |oldest| {
                    to_std(*oldest + window() - now)
                });
            return Ok(Reservation::Wait(wait));
        }

        next.minute_calls.push(now);
        next.day_count += 1;
        next.updated_at = now;
        self.persist(&next)?;

        let permit = Permit {
            granted_at: now,
            day_count: next.day_count,
        };
        *state = next;
        Ok(Reservation::Granted(permit))
    }

    /// Take a slot, sleeping until one is free.
    ///
    /// # Errors
    /// Only fails if the new state cannot be persisted.
    pub async fn acquire(&self) -> Result<Permit> {
        self.acquire_until(&StopSignal::never()).await
    }

    /// Take a slot, sleeping until one is free or `stop` fires.
    ///
    /// A wait that would outlast the deadline is refused up front.
    ///
    /// # Errors
    /// Returns [`EtlError::Cancelled`] when `stop` fires first, or an error
    /// if the new state cannot be persisted.
    pub async fn acquire_until(&self, stop: &StopSignal) -> Result<Permit> {
        loop {
            match self.reserve().await? {
                Reservation::Granted(permit) => return Ok(permit),
                Reservation::Wait(wait) => {
                    if stop.remaining().is_some_and(|left| left < wait) {
                        info!(
                            wait_secs = wait.as_secs_f64(),
                            "API quota frees up after the run deadline, giving up"
                        );
                        return Err(EtlError::Cancelled);
                    }
                    info!(wait_secs = wait.as_secs_f64(), "API quota exhausted, waiting");
                    pause(wait, stop).await?;
                }
            }
        }
    }

    /// Take a slot if one is free right now.
    ///
    /// # Errors
    /// Returns [`EtlError::QuotaExhausted`] with the wait when no slot is free.
    pub async fn try_acquire(&self) -> Result<Permit> {
        match self.reserve().await? {
            Reservation::Granted(permit) => Ok(permit),
            Reservation::Wait(retry_after) => Err(EtlError::QuotaExhausted { retry_after }),
        }
    }

    /// Treat the minute window as full as of `now`.
    ///
    /// Called when the API rejects a request for rate reasons, which means
    /// the local counters have drifted from the server's.
    ///
    /// # Errors
    /// Fails if the new state cannot be persisted.
    pub async fn mark_exhausted(&self, now: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        roll(&mut next, now);
        next.minute_calls = vec![now; self.limits.per_minute.max(1) as usize];
        next.updated_at = now;
        self.persist(&next)?;
        *state = next;
        debug!("Minute window marked exhausted");
        Ok(())
    }

    /// Treat the daily budget as spent as of `now`.
    ///
    /// # Errors
    /// Fails if the new state cannot be persisted.
    pub async fn mark_day_exhausted(&self, now: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        roll(&mut next, now);
        next.day_count = next.day_count.max(self.limits.per_day);
        next.updated_at = now;
        self.persist(&next)?;
        *state = next;
        debug!("Daily quota marked exhausted");
        Ok(())
    }

    fn persist(&self, snapshot: &QuotaSnapshot) -> Result<()> {
        match &self.backend {
            Some(backend) => backend.save_quota(&self.key, snapshot),
            None => Ok(()),
        }
    }
}

/// Sleeps for `wait` in short slices, returning early with
/// [`EtlError::Cancelled`] once `stop` fires.
pub(crate) async fn pause(wait: Duration, stop: &StopSignal) -> Result<()> {
    let until = tokio::time::Instant::now() + wait;
    loop {
        if stop.is_stopped() {
            return Err(EtlError::Cancelled);
        }
        let now = tokio::time::Instant::now();
        if now >= until {
            return Ok(());
        }
        let mut slice = (until - now).min(STOP_POLL);
        if let Some(left) = stop.remaining() {
            slice = slice.min(left);
        }
        tokio::time::sleep(slice).await;
    }
}

fn window() -> TimeDelta {
    TimeDelta::seconds(MINUTE_WINDOW.as_secs() as i64)
}

fn to_std(delta: TimeDelta) -> Duration {
    delta.to_std().unwrap_or(Duration::ZERO)
}

/// Drops timestamps that left the minute window and resets the day counter
/// when `now` falls on a later UTC day.
fn roll(state: &mut QuotaSnapshot, now: DateTime<Utc>) {
    let today = now.date_naive();
    if state.day != today {
        state.day = today;
        state.day_count = 0;
    }
    state
        .minute_calls
        .retain(|t| now.signed_duration_since(*t) < window());
}

fn until_next_midnight(now: DateTime<Utc>) -> Duration {
    let midnight = now
        .date_naive()
        .checked_add_days(Days::new(1))
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc());
    midnight.map_or(MINUTE_WINDOW, |m| to_std(m - now))
}

//! Review status of a correction order.
//!
//! Orders persist their status as independent boolean columns. This module is the
//! only place that interprets them: it maps flag combinations onto a [`ReviewState`],
//! moves an order between states when a corrector changes a flag, and reports which
//! transitions a change produced so the lifecycle controller can notify the requester.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusFlags {
    pub corrected: bool,
    pub reported: bool,
    pub rejected: bool,
    pub user_confirmed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReviewState {
    Pending,
    Corrected { confirmed: bool },
    Rejected,
    InfoRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IllegalStatus {
    #[error("the requester already confirmed this correction; it cannot be reverted")]
    ConfirmedCorrectionReverted,
    #[error("an order cannot be confirmed before it has been corrected")]
    ConfirmedBeforeCorrection,
    #[error("an order cannot be both {0} and {1}")]
    Conflicting(&'static str, &'static str),
}

impl ReviewState {
    pub fn from_flags(flags: StatusFlags) -> Result<Self, IllegalStatus> {
        let StatusFlags {
            corrected,
            reported,
            rejected,
            user_confirmed,
        } = flags;

        match (corrected, rejected, reported) {
            (true, true, _) => Err(IllegalStatus::Conflicting("corrected", "rejected")),
            (true, _, true) => Err(IllegalStatus::Conflicting("corrected", "reported")),
            (_, true, true) => Err(IllegalStatus::Conflicting("rejected", "reported")),
            _ if user_confirmed && !corrected => Err(IllegalStatus::ConfirmedBeforeCorrection),
            (true, false, false) => Ok(ReviewState::Corrected {
                confirmed: user_confirmed,
            }),
            (false, true, false) => Ok(ReviewState::Rejected),
            (false, false, true) => Ok(ReviewState::InfoRequested),
            (false, false, false) => Ok(ReviewState::Pending),
        }
    }

    pub fn flags(self) -> StatusFlags {
        match self {
            ReviewState::Pending => StatusFlags::default(),
            ReviewState::Corrected { confirmed } => StatusFlags {
                corrected: true,
                user_confirmed: confirmed,
                ..StatusFlags::default()
            },
            ReviewState::Rejected => StatusFlags {
                rejected: true,
                ..StatusFlags::default()
            },
            ReviewState::InfoRequested => StatusFlags {
                reported: true,
                ..StatusFlags::default()
            },
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ReviewState::Pending => "new",
            ReviewState::Corrected { confirmed: false } => "corrected",
            ReviewState::Corrected { confirmed: true } => "confirmed",
            ReviewState::Rejected => "rejected",
            ReviewState::InfoRequested => "info_requested",
        }
    }
}

/// Sparse change of the status flags; `None` leaves a flag untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusChange {
    pub corrected: Option<bool>,
    pub reported: Option<bool>,
    pub rejected: Option<bool>,
    pub user_confirmed: Option<bool>,
}

/// Review outcome a change asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Keep,
    Pending,
    Corrected,
    Rejected,
    InfoRequested,
}

impl StatusChange {
    /// Setting an outcome moves the order into it and clears the other two.
    /// When several are set at once, correction wins over rejection, which wins over
    /// an info request. Clearing the current outcome returns the order to pending;
    /// clearing any other outcome is a no-op.
    fn outcome(&self, state: ReviewState) -> Outcome {
        if self.corrected == Some(true) {
            return Outcome::Corrected;
        }
        if self.rejected == Some(true) {
            return Outcome::Rejected;
        }
        if self.reported == Some(true) {
            return Outcome::InfoRequested;
        }

        let cleared = match state {
            ReviewState::Pending => false,
            ReviewState::Corrected { .. } => self.corrected == Some(false),
            ReviewState::Rejected => self.rejected == Some(false),
            ReviewState::InfoRequested => self.reported == Some(false),
        };
        if cleared {
            Outcome::Pending
        } else {
            Outcome::Keep
        }
    }
}

/// Applies `change` to the current flags and returns the resulting flags.
///
/// Only two requests are refused: moving a confirmed correction out of the corrected
/// state, and confirming an order that does not end up corrected.
pub fn review(current: StatusFlags, change: StatusChange) -> Result<StatusFlags, IllegalStatus> {
    let state = ReviewState::from_flags(current)?;

    let next = match (state, change.outcome(state)) {
        (ReviewState::Corrected { confirmed: true }, Outcome::Pending)
        | (ReviewState::Corrected { confirmed: true }, Outcome::Rejected)
        | (ReviewState::Corrected { confirmed: true }, Outcome::InfoRequested) => {
            return Err(IllegalStatus::ConfirmedCorrectionReverted)
        }
        (kept, Outcome::Keep) => kept,
        (ReviewState::Corrected { confirmed }, Outcome::Corrected) => {
            ReviewState::Corrected { confirmed }
        }
        (_, Outcome::Corrected) => ReviewState::Corrected { confirmed: false },
        (_, Outcome::Rejected) => ReviewState::Rejected,
        (_, Outcome::InfoRequested) => ReviewState::InfoRequested,
        (_, Outcome::Pending) => ReviewState::Pending,
    };

    let next = match (next, change.user_confirmed) {
        (ReviewState::Corrected { .. }, Some(confirmed)) => ReviewState::Corrected { confirmed },
        (_, Some(true)) => return Err(IllegalStatus::ConfirmedBeforeCorrection),
        (next, _) => next,
    };

    Ok(next.flags())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Corrected,
    Uncorrected,
    Rejected,
    InfoRequested,
}

/// Transitions between two flag sets, in the order notifications are dispatched.
pub fn transitions(previous: StatusFlags, next: StatusFlags) -> Vec<Transition> {
    let mut detected = Vec::new();
    match (previous.corrected, next.corrected) {
        (false, true) => detected.push(Transition::Corrected),
        (true, false) => detected.push(Transition::Uncorrected),
        _ => {}
    }
    if !previous.rejected && next.rejected {
        detected.push(Transition::Rejected);
    }
    if !previous.reported && next.reported {
        detected.push(Transition::InfoRequested);
    }
    detected
}

//! Gating policy - activation threshold and redirect decisions
//!
//! Pure decision logic: balance + threshold + current route in, decision
//! out. The route is an explicit enum - no path-string sniffing anywhere
//! near the policy, so it tests without a DOM or browser. `from_path`
//! exists only as a parser at the presentation boundary.
//!
//! The [`AccessController`] wraps the pure function with a one-shot
//! latch: a decision for a given (balance, route) pair is acted on at
//! most once per session, which is what prevents redirect loops. The
//! latch resets only on session change.

use crate::core_types::Cents;
use serde::Serialize;

/// Application areas relevant to gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AppRoute {
    /// Public marketing pages
    Landing,
    /// Deposit-to-activate flow
    Activation,
    /// The main application
    Dashboard,
    /// Back-office
    Admin,
    /// Anything else
    Other,
}

impl AppRoute {
    /// Boundary parser for presentation code that only has a URL path.
    /// Everything past the boundary carries the enum.
    pub fn from_path(path: &str) -> Self {
        if path.starts_with("/activation") {
            AppRoute::Activation
        } else if path.starts_with("/dashboard") {
            AppRoute::Dashboard
        } else if path.starts_with("/admin") {
            AppRoute::Admin
        } else if path == "/" || path.is_empty() {
            AppRoute::Landing
        } else {
            AppRoute::Other
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AccessDecision {
    Stay,
    RedirectToActivation,
    RedirectToDashboard,
}

/// The pure gating rules:
/// - below threshold, outside the activation flow -> to activation
/// - at/above threshold, inside the activation flow -> to dashboard
/// - otherwise stay
pub fn decide_access(balance: Cents, threshold: Cents, route: AppRoute) -> AccessDecision {
    let activated = balance >= threshold;
    match route {
        AppRoute::Activation if activated => AccessDecision::RedirectToDashboard,
        AppRoute::Activation => AccessDecision::Stay,
        _ if !activated => AccessDecision::RedirectToActivation,
        _ => AccessDecision::Stay,
    }
}

/// One-shot latch around [`decide_access`].
///
/// `evaluate` returns the decision the FIRST time a given
/// (balance, route) pair produces a redirect; the same pair afterwards
/// yields `Stay`. A different pair re-arms the latch. `reset` on session
/// change.
#[derive(Debug)]
pub struct AccessController {
    threshold: Cents,
    acted_on: Option<(Cents, AppRoute)>,
}

impl AccessController {
    pub fn new(threshold: Cents) -> Self {
        Self {
            threshold,
            acted_on: None,
        }
    }

    pub fn evaluate(&mut self, balance: Cents, route: AppRoute) -> AccessDecision {
        let decision = decide_access(balance, self.threshold, route);
        if decision == AccessDecision::Stay {
            return decision;
        }
        if self.acted_on == Some((balance, route)) {
            return AccessDecision::Stay; // latch holds
        }
        self.acted_on = Some((balance, route));
        decision
    }

    /// Has any redirect been acted on this session?
    pub fn decided(&self) -> bool {
        self.acted_on.is_some()
    }

    /// Session change: re-arm the latch.
    pub fn reset(&mut self) {
        self.acted_on = None;
    }
}

//! Core types used throughout the system
//!
//! These are fundamental type aliases used by all modules.
//! They provide semantic meaning and enable future type evolution.

use uuid::Uuid;

/// User ID - globally unique, immutable after assignment.
///
/// # Constraints:
/// - Issued by the external auth collaborator at registration
/// - Primary key for `user_credits` and the filter key for every
///   realtime subscription
pub type UserId = Uuid;

/// Monetary amount in minor currency units (euro cents).
///
/// # Contract:
/// - ALL business logic operates on integer cents
/// - Signed, so balance deltas (debits) are first-class values
/// - Conversion to euros happens only in [`crate::money`], at the
///   presentation boundary, with fixed 2-decimal rounding
pub type Cents = i64;

/// Minimum balance (in cents) that unlocks the full application.
///
/// 250 EUR expressed in minor units. Compile-time constant, never mutated.
pub const ACTIVATION_THRESHOLD_CENTS: Cents = 25_000;

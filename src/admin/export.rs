//! Ledger export - CSV account statement
//!
//! Rebuilds a user's balance history from the rows that actually moved
//! it: completed payments, trade executions, completed withdrawals.
//! Events are merged by timestamp and a running balance is carried
//! through, so the final line must equal the live balance row. Pending
//! and rejected rows are excluded by construction.

use crate::backend::store::{PaymentStore, StoreError, TradeStore, WithdrawalStore};
use crate::core_types::{Cents, UserId};
use crate::models::{PaymentStatus, WithdrawalStatus};
use crate::money;
use chrono::{DateTime, Utc};
use std::io::Write;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Write error: {0}")]
    Io(#[from] std::io::Error),
}

/// One balance-affecting event, normalized for the statement.
#[derive(Debug, Clone)]
struct LedgerLine {
    at: DateTime<Utc>,
    kind: &'static str,
    reference: String,
    delta_cents: Cents,
}

pub struct LedgerExporter {
    payments: Arc<dyn PaymentStore>,
    trades: Arc<dyn TradeStore>,
    withdrawals: Arc<dyn WithdrawalStore>,
}

impl LedgerExporter {
    pub fn new(
        payments: Arc<dyn PaymentStore>,
        trades: Arc<dyn TradeStore>,
        withdrawals: Arc<dyn WithdrawalStore>,
    ) -> Self {
        Self {
            payments,
            trades,
            withdrawals,
        }
    }

    /// Write the statement as CSV. Returns the number of event lines
    /// and the closing balance.
    pub async fn export_csv<W: Write>(
        &self,
        user_id: UserId,
        out: &mut W,
    ) -> Result<(usize, Cents), ExportError> {
        let mut lines = self.collect(user_id).await?;
        lines.sort_by_key(|l| l.at);

        writeln!(out, "timestamp,kind,reference,delta_eur,balance_eur")?;
        let mut balance: Cents = 0;
        for line in &lines {
            balance += line.delta_cents;
            writeln!(
                out,
                "{},{},{},{},{}",
                line.at.to_rfc3339(),
                line.kind,
                line.reference,
                money::format_euros(line.delta_cents),
                money::format_euros(balance),
            )?;
        }
        Ok((lines.len(), balance))
    }

    async fn collect(&self, user_id: UserId) -> Result<Vec<LedgerLine>, ExportError> {
        let mut lines = Vec::new();

        for p in self.payments.list_for_user(user_id).await? {
            if p.status != PaymentStatus::Completed {
                continue;
            }
            lines.push(LedgerLine {
                // Balance moved when the admin decided, not at submission
                at: p.decided_at.unwrap_or(p.created_at),
                kind: "deposit",
                reference: p.reference,
                delta_cents: p.amount_cents,
            });
        }

        for t in self.trades.list_recent(user_id, usize::MAX).await? {
            lines.push(LedgerLine {
                at: t.executed_at,
                kind: t.side.as_str(),
                reference: t.symbol.clone(),
                delta_cents: t.balance_delta(),
            });
        }

        for w in self.withdrawals.list_for_user(user_id).await? {
            if w.status != WithdrawalStatus::Completed {
                continue;
            }
            lines.push(LedgerLine {
                at: w.decided_at.unwrap_or(w.created_at),
                kind: "withdrawal",
                reference: w.reference,
                delta_cents: -w.amount_cents,
            });
        }

        Ok(lines)
    }
}

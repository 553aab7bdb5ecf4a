//! Bank reconciliation: pairing statement credits with batch deposits.

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::money::Amount;

/// An unmatched bank transaction
#[derive(Debug, Clone)]
pub struct OpenTransaction {
    pub id: Uuid,
    pub posted_date: NaiveDate,
    pub amount: Amount,
}

/// An uncleared batch with its deposit total
#[derive(Debug, Clone)]
pub struct OpenBatch {
    pub id: Uuid,
    pub batch_date: NaiveDate,
    pub total: Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MatchPair {
    pub transaction_id: Uuid,
    pub batch_id: Uuid,
}

/// Pair each transaction with at most one batch of exactly the same amount.
///
/// Transactions are taken in posted-date order (then id). For each one the
/// candidate batch closest in date wins; ties go to the earlier batch date,
/// then the lower id. A batch is used at most once. Zero and negative
/// amounts never match.
pub fn auto_match(transactions: &[OpenTransaction], batches: &[OpenBatch]) -> Vec<MatchPair> {
    let mut txns: Vec<&OpenTransaction> = transactions
        .iter()
        .filter(|t| t.amount.is_positive())
        .collect();
    txns.sort_by(|a, b| a.posted_date.cmp(&b.posted_date).then(a.id.cmp(&b.id)));

    let mut used = vec![false; batches.len()];
    let mut pairs = Vec::new();

    for txn in txns {
        let best = batches
            .iter()
            .enumerate()
            .filter(|(i, b)| !used[*i] && b.total == txn.amount)
            .min_by(|(_, a), (_, b)| {
                let da = (a.batch_date - txn.posted_date).num_days().abs();
                let db = (b.batch_date - txn.posted_date).num_days().abs();
                da.cmp(&db)
                    .then(a.batch_date.cmp(&b.batch_date))
                    .then(a.id.cmp(&b.id))
            });

        if let Some((i, batch)) = best {
            used[i] = true;
            pairs.push(MatchPair {
                transaction_id: txn.id,
                batch_id: batch.id,
            });
        }
    }

    pairs
}

/// Period totals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Balance {
    pub batch_total: Amount,
    pub bank_total: Amount,
    /// bank minus batches
    pub difference: Amount,
    pub balanced: bool,
}

pub fn summarise(batch_total: Amount, bank_total: Amount) -> Balance {
    let difference = bank_total - batch_total;
    Balance {
        batch_total,
        bank_total,
        difference,
        balanced: difference == Amount::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    fn txn(id: u128, day: u32, cents: i64) -> OpenTransaction {
        OpenTransaction {
            id: Uuid::from_u128(id),
            posted_date: d(day),
            amount: Amount::from_cents(cents),
        }
    }

    fn batch(id: u128, day: u32, cents: i64) -> OpenBatch {
        OpenBatch {
            id: Uuid::from_u128(id),
            batch_date: d(day),
            total: Amount::from_cents(cents),
        }
    }

    #[test]
    fn matches_exact_amounts_only() {
        let pairs = auto_match(&[txn(1, 3, 5000), txn(2, 3, 7000)], &[batch(10, 2, 5000)]);
        assert_eq!(
            pairs,
            vec![MatchPair {
                transaction_id: Uuid::from_u128(1),
                batch_id: Uuid::from_u128(10)
            }]
        );
    }

    #[test]
    fn prefers_closest_date() {
        let pairs = auto_match(
            &[txn(1, 10, 5000)],
            &[batch(10, 1, 5000), batch(11, 9, 5000), batch(12, 20, 5000)],
        );
        assert_eq!(pairs[0].batch_id, Uuid::from_u128(11));
    }

    #[test]
    fn equal_distance_prefers_earlier_batch() {
        let pairs = auto_match(&[txn(1, 10, 5000)], &[batch(11, 12, 5000), batch(10, 8, 5000)]);
        assert_eq!(pairs[0].batch_id, Uuid::from_u128(10));
    }

    #[test]
    fn each_batch_used_once() {
        let pairs = auto_match(
            &[txn(2, 5, 5000), txn(1, 4, 5000)],
            &[batch(10, 4, 5000)],
        );
        assert_eq!(pairs.len(), 1);
        // earlier posted date is processed first
        assert_eq!(pairs[0].transaction_id, Uuid::from_u128(1));
    }

    #[test]
    fn ignores_debits() {
        assert!(auto_match(&[txn(1, 1, -5000)], &[batch(10, 1, -5000)]).is_empty());
    }

    #[test]
    fn summary_difference() {
        let b = summarise(Amount::from_cents(10_000), Amount::from_cents(9_500));
        assert_eq!(b.difference.cents(), -500);
        assert!(!b.balanced);
        assert!(summarise(Amount::from_cents(1), Amount::from_cents(1)).balanced);
    }
}

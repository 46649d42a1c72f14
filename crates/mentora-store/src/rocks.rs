//! `RocksDB` storage implementation.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};

use mentora_core::{Balance, Transaction, TransactionId, UserId};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{Credit, Debit, Store};

/// RocksDB-backed storage implementation.
///
/// Compound read-modify-write operations (`allocate`, `settle`,
/// `sweep_expired`) run under a store-level mutex so the conditional debit is
/// checked-and-applied, never read-then-written-later. Concurrent settlements
/// against the same balance serialize; the loser of an affordability race
/// fails its settlement rather than driving the balance negative.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn write_balance_into(&self, batch: &mut WriteBatch, balance: &Balance) -> Result<()> {
        let cf = self.cf(cf::BALANCES)?;
        batch.put_cf(&cf, keys::balance_key(&balance.user_id), Self::serialize(balance)?);
        Ok(())
    }

    fn write_transaction_into(&self, batch: &mut WriteBatch, tx: &Transaction) -> Result<()> {
        let cf_tx = self.cf(cf::TRANSACTIONS)?;
        let cf_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;
        batch.put_cf(&cf_tx, keys::transaction_key(&tx.id), Self::serialize(tx)?);
        batch.put_cf(
            &cf_by_user,
            keys::user_transaction_key(&tx.user_id, &tx.id),
            [], // Index entry (empty value)
        );
        Ok(())
    }

    fn commit(&self, batch: WriteBatch) -> Result<()> {
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| StoreError::Database("store write lock poisoned".into()))
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Balance Operations
    // =========================================================================

    fn put_balance(&self, balance: &Balance) -> Result<()> {
        let cf = self.cf(cf::BALANCES)?;
        self.db
            .put_cf(&cf, keys::balance_key(&balance.user_id), Self::serialize(balance)?)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn get_balance(&self, user_id: &UserId) -> Result<Option<Balance>> {
        let cf = self.cf(cf::BALANCES)?;
        self.db
            .get_cf(&cf, keys::balance_key(user_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    // =========================================================================
    // Transaction Operations
    // =========================================================================

    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<Transaction>> {
        let cf = self.cf(cf::TRANSACTIONS)?;
        self.db
            .get_cf(&cf, keys::transaction_key(transaction_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>> {
        let cf_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;
        let prefix = keys::user_transactions_prefix(user_id);

        let iter = self.db.iterator_cf(
            &cf_by_user,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );

        // ULIDs are time-ordered, so forward iteration yields oldest first.
        let mut all_keys: Vec<Vec<u8>> = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            all_keys.push(key.to_vec());
        }
        all_keys.reverse(); // Newest first

        let mut transactions = Vec::new();
        for key in all_keys.into_iter().skip(offset) {
            if transactions.len() >= limit {
                break;
            }
            let tx_id = keys::extract_transaction_id_from_user_key(&key);
            if let Some(tx) = self.get_transaction(&tx_id)? {
                transactions.push(tx);
            }
        }

        Ok(transactions)
    }

    fn has_settlement(
        &self,
        user_id: &UserId,
        reference_type: &str,
        reference_id: &str,
    ) -> Result<bool> {
        let cf = self.cf(cf::SETTLEMENTS)?;
        let key = keys::settlement_key(user_id, reference_type, reference_id);
        Ok(self
            .db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .is_some())
    }

    // =========================================================================
    // Compound Operations
    // =========================================================================

    fn allocate(&self, credit: &Credit) -> Result<(Transaction, Balance)> {
        if !credit.transaction_type.is_credit() {
            return Err(StoreError::InvalidMutation(format!(
                "allocate with debit type {:?}",
                credit.transaction_type
            )));
        }

        let _guard = self.lock()?;

        // Balance records are created lazily on the first credit-bearing event.
        let mut balance = self
            .get_balance(&credit.user_id)?
            .unwrap_or_else(|| Balance::new(credit.user_id));

        let amount = credit.amount.abs();
        let tx = Transaction::allocation(
            credit.user_id,
            credit.transaction_type,
            amount,
            balance.available,
            credit.description.clone(),
            credit.expires_at,
        );

        balance.available += amount;
        balance.total_allocated += amount;
        if let Some(expires_at) = credit.expires_at {
            balance.expiring_credits += amount;
            balance.credits_expire_at = Some(expires_at);
        } else if credit.transaction_type == mentora_core::TransactionType::TopUp {
            balance.purchased_credits += amount;
        }
        // Re-arm the one-shot low-credit notification once the balance recovers.
        if balance.available >= balance.low_credit_threshold {
            balance.low_credit_notified = false;
        }
        balance.updated_at = chrono::Utc::now();

        let mut batch = WriteBatch::default();
        self.write_balance_into(&mut batch, &balance)?;
        self.write_transaction_into(&mut batch, &tx)?;
        self.commit(batch)?;

        Ok((tx, balance))
    }

    fn settle(&self, debit: &Debit) -> Result<(Transaction, Balance)> {
        if debit.transaction_type.is_credit() {
            return Err(StoreError::InvalidMutation(format!(
                "settle with credit type {:?}",
                debit.transaction_type
            )));
        }

        let _guard = self.lock()?;

        // At-most-once application per logical reference.
        if let Some((reference_type, reference_id)) = &debit.reference {
            if self.has_settlement(&debit.user_id, reference_type, reference_id)? {
                return Err(StoreError::DuplicateSettlement {
                    reference_type: reference_type.clone(),
                    reference_id: reference_id.clone(),
                });
            }
        }

        let mut balance = self
            .get_balance(&debit.user_id)?
            .ok_or(StoreError::NotFound)?;

        let cost = debit.cost.abs();

        // Conditional debit: checked inside the critical section, so a race
        // can fail this settlement but never produce a negative balance.
        if balance.available < cost {
            return Err(StoreError::InsufficientCredits {
                available: balance.available,
                required: cost,
            });
        }

        let mut tx = Transaction::consumption(
            debit.user_id,
            debit.transaction_type,
            cost,
            balance.available,
            debit.description.clone(),
            &debit.usage,
            debit.breakdown.clone(),
        )
        .with_model(debit.model.clone())
        .with_client(debit.ip_address.clone(), debit.user_agent.clone())
        .with_metadata(debit.metadata.clone());
        if let Some((reference_type, reference_id)) = &debit.reference {
            tx = tx.with_reference(reference_type.clone(), reference_id.clone());
        }

        balance.available -= cost;
        balance.total_consumed += cost;
        balance.updated_at = chrono::Utc::now();

        // The one-shot low-credit flag flips in the same atomic write as the
        // debit that crossed the threshold.
        let low_credit_triggered = balance.should_notify_low_credit();
        if low_credit_triggered {
            balance.low_credit_notified = true;
        }

        let mut batch = WriteBatch::default();
        self.write_balance_into(&mut batch, &balance)?;
        self.write_transaction_into(&mut batch, &tx)?;
        if let Some((reference_type, reference_id)) = &debit.reference {
            let cf = self.cf(cf::SETTLEMENTS)?;
            batch.put_cf(
                &cf,
                keys::settlement_key(&debit.user_id, reference_type, reference_id),
                tx.id.to_bytes(),
            );
        }
        self.commit(batch)?;

        if low_credit_triggered {
            tracing::warn!(
                user_id = %debit.user_id,
                available = balance.available,
                threshold = balance.low_credit_threshold,
                "Balance dropped below low-credit threshold"
            );
        }

        Ok((tx, balance))
    }

    fn sweep_expired(
        &self,
        user_id: &UserId,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Option<Transaction>> {
        let _guard = self.lock()?;

        let Some(mut balance) = self.get_balance(user_id)? else {
            return Ok(None);
        };
        if !balance.has_expired_credits(now) {
            return Ok(None);
        }

        // Expiring credits never exceed what is still spendable.
        let amount = balance.expiring_credits.min(balance.available);
        let tx = Transaction::expiration(*user_id, amount, balance.available);

        balance.available -= amount;
        balance.expiring_credits = 0.0;
        balance.credits_expire_at = None;
        balance.updated_at = chrono::Utc::now();

        let mut batch = WriteBatch::default();
        self.write_balance_into(&mut batch, &balance)?;
        self.write_transaction_into(&mut batch, &tx)?;
        self.commit(batch)?;

        tracing::info!(user_id = %user_id, amount = %amount, "Swept expired credits");
        Ok(Some(tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use mentora_core::{TokenUsage, TransactionType};
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn credit(user_id: UserId, amount: f64) -> Credit {
        Credit {
            user_id,
            transaction_type: TransactionType::Allocation,
            amount,
            description: "Plan allocation".into(),
            expires_at: None,
        }
    }

    fn debit(user_id: UserId, cost: f64, reference_id: &str) -> Debit {
        Debit {
            user_id,
            transaction_type: TransactionType::AiQuestion,
            cost,
            description: "AI question".into(),
            usage: TokenUsage::new(100, 50),
            model: None,
            breakdown: None,
            reference: Some(("question".into(), reference_id.into())),
            ip_address: None,
            user_agent: None,
            metadata: serde_json::Value::Null,
        }
    }

    #[test]
    fn allocate_creates_balance_lazily() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();

        assert!(store.get_balance(&user_id).unwrap().is_none());

        let (tx, balance) = store.allocate(&credit(user_id, 100.0)).unwrap();
        assert_eq!(tx.balance_before, 0.0);
        assert_eq!(tx.balance_after, 100.0);
        assert_eq!(balance.available, 100.0);
        assert_eq!(balance.total_allocated, 100.0);

        let stored = store.get_balance(&user_id).unwrap().unwrap();
        assert_eq!(stored.available, 100.0);
    }

    #[test]
    fn settle_debits_atomically() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        store.allocate(&credit(user_id, 100.0)).unwrap();

        let (tx, balance) = store.settle(&debit(user_id, 5.0, "q-1")).unwrap();

        assert_eq!(tx.amount, -5.0);
        assert_eq!(tx.balance_before, 100.0);
        assert_eq!(tx.balance_after, 95.0);
        // Store balance equals the transaction's balance_after.
        assert_eq!(balance.available, tx.balance_after);
        assert_eq!(balance.total_consumed, 5.0);
        assert_eq!(
            balance.available,
            balance.total_allocated - balance.total_consumed
        );
    }

    #[test]
    fn settle_is_idempotent_per_reference() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        store.allocate(&credit(user_id, 100.0)).unwrap();

        store.settle(&debit(user_id, 5.0, "q-1")).unwrap();
        let result = store.settle(&debit(user_id, 5.0, "q-1"));
        assert!(matches!(result, Err(StoreError::DuplicateSettlement { .. })));

        // Balance was debited exactly once.
        let balance = store.get_balance(&user_id).unwrap().unwrap();
        assert_eq!(balance.available, 95.0);

        // A different reference settles fine.
        store.settle(&debit(user_id, 5.0, "q-2")).unwrap();
        assert!(store.has_settlement(&user_id, "question", "q-2").unwrap());
    }

    #[test]
    fn settle_rejects_insufficient_balance() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        store.allocate(&credit(user_id, 3.0)).unwrap();

        let result = store.settle(&debit(user_id, 5.0, "q-1"));
        assert!(matches!(
            result,
            Err(StoreError::InsufficientCredits {
                available,
                required,
            }) if available == 3.0 && required == 5.0
        ));

        // Nothing was written.
        let balance = store.get_balance(&user_id).unwrap().unwrap();
        assert_eq!(balance.available, 3.0);
        assert!(!store.has_settlement(&user_id, "question", "q-1").unwrap());
    }

    #[test]
    fn concurrent_settlements_never_overdraw() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let user_id = UserId::generate();
        store.allocate(&credit(user_id, 5.0)).unwrap();

        // Two racing debits of 4.0 against 5.0 available.
        let handles: Vec<_> = ["q-1", "q-2"]
            .into_iter()
            .map(|reference| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.settle(&debit(user_id, 4.0, reference)))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        // Exactly one wins; the loser fails its settlement with the
        // post-winner balance, and the balance never goes negative.
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(|r| matches!(
            r,
            Err(StoreError::InsufficientCredits { available, required })
                if *available == 1.0 && *required == 4.0
        )));

        let balance = store.get_balance(&user_id).unwrap().unwrap();
        assert_eq!(balance.available, 1.0);
        assert_eq!(balance.total_consumed, 4.0);
    }

    #[test]
    fn settle_without_balance_fails() {
        let (store, _dir) = create_test_store();
        let result = store.settle(&debit(UserId::generate(), 5.0, "q-1"));
        assert!(matches!(result, Err(StoreError::NotFound)));
    }

    #[test]
    fn mutation_type_mismatch_is_rejected() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();

        let mut bad_credit = credit(user_id, 10.0);
        bad_credit.transaction_type = TransactionType::AiChat;
        assert!(matches!(
            store.allocate(&bad_credit),
            Err(StoreError::InvalidMutation(_))
        ));

        let mut bad_debit = debit(user_id, 10.0, "q-1");
        bad_debit.transaction_type = TransactionType::TopUp;
        assert!(matches!(
            store.settle(&bad_debit),
            Err(StoreError::InvalidMutation(_))
        ));
    }

    #[test]
    fn list_transactions_newest_first_with_pagination() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();

        store.allocate(&credit(user_id, 100.0)).unwrap();
        // ULIDs are generated at transaction-creation time; space them out.
        std::thread::sleep(std::time::Duration::from_millis(2));
        store.settle(&debit(user_id, 5.0, "q-1")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        store.settle(&debit(user_id, 7.0, "q-2")).unwrap();

        let all = store.list_transactions_by_user(&user_id, 10, 0).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].reference_id.as_deref(), Some("q-2")); // Newest first
        assert_eq!(all[2].transaction_type, TransactionType::Allocation);

        let page2 = store.list_transactions_by_user(&user_id, 1, 1).unwrap();
        assert_eq!(page2.len(), 1);
        assert_eq!(page2[0].reference_id.as_deref(), Some("q-1"));
    }

    #[test]
    fn expiring_credits_are_swept() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        let now = Utc::now();

        store
            .allocate(&Credit {
                user_id,
                transaction_type: TransactionType::Promotional,
                amount: 50.0,
                description: "Promo credits".into(),
                expires_at: Some(now - Duration::hours(1)),
            })
            .unwrap();
        store.allocate(&credit(user_id, 20.0)).unwrap();

        let swept = store.sweep_expired(&user_id, now).unwrap().unwrap();
        assert_eq!(swept.transaction_type, TransactionType::Expiration);
        assert_eq!(swept.amount, -50.0);

        let balance = store.get_balance(&user_id).unwrap().unwrap();
        assert_eq!(balance.available, 20.0);
        assert_eq!(balance.expiring_credits, 0.0);
        assert!(balance.credits_expire_at.is_none());

        // Second sweep is a no-op.
        assert!(store.sweep_expired(&user_id, now).unwrap().is_none());
    }

    #[test]
    fn sweep_without_expiry_is_noop() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        store.allocate(&credit(user_id, 20.0)).unwrap();

        assert!(store.sweep_expired(&user_id, Utc::now()).unwrap().is_none());
        assert!(store
            .sweep_expired(&UserId::generate(), Utc::now())
            .unwrap()
            .is_none());
    }

    #[test]
    fn low_credit_flag_flips_with_the_crossing_debit() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        store.allocate(&credit(user_id, 10.0)).unwrap();

        // Dropping below the threshold sets the flag in the same settle
        // write, so a follow-up debit cannot observe it unset.
        let (_, balance) = store.settle(&debit(user_id, 6.0, "q-1")).unwrap();
        assert!(balance.low_credit_notified);
        assert!(!balance.should_notify_low_credit());

        let (_, balance) = store.settle(&debit(user_id, 1.0, "q-2")).unwrap();
        assert!(balance.low_credit_notified);

        // An allocation bringing the balance back up re-arms the flag.
        store.allocate(&credit(user_id, 10.0)).unwrap();
        assert!(!store.get_balance(&user_id).unwrap().unwrap().low_credit_notified);
    }
}

//! The result reconciliation engine: merges a freshly fetched batch of
//! business records against the persisted dataset, classifying each
//! record as new, changed, unchanged, or vanished, and computing the
//! mutation to apply to the persisted snapshot.

use crate::models::{Record, RecordStatus, SearchContext, format_timestamp};
use crate::store::StoreClient;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::HashSet;

/// Classification counts of one reconciliation run.
#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ReconcileSummary {
    pub new: usize,
    pub changed: usize,
    pub unchanged: usize,
    pub vanished: usize,
}

/// What one run produced: the current batch (statuses escalated where a
/// partial match was found), the classification counts, and whether the
/// mutated snapshot reached the store.
#[derive(Debug)]
pub(crate) struct ReconcileOutcome {
    pub records: Vec<Record>,
    pub summary: ReconcileSummary,
    /// False when a store error forced the fallback path; callers must
    /// treat the records as display-only, not saved.
    pub persisted: bool,
}

/// Scope filter: typed searches compare only against rows of the exact
/// same input context; map searches compare against every map search of
/// the same category, regardless of center and radius.
fn in_scope(record: &Record, context: &SearchContext) -> bool {
    if context.is_typed() {
        record
            .input_context
            .eq_ignore_ascii_case(&context.input_context)
    } else {
        record
            .input_context
            .to_lowercase()
            .starts_with(&context.map_scope_prefix())
    }
}

/// Case-insensitive field agreement count between two comparison tuples.
fn matching_fields(a: &[String; 5], b: &[String; 5]) -> usize {
    a.iter()
        .zip(b.iter())
        .filter(|(x, y)| x.to_lowercase() == y.to_lowercase())
        .count()
}

/// Pure classification core. Mutates `snapshot` (status/date stamps and
/// appended rows) and escalates statuses on `batch` in place.
///
/// `scope` holds snapshot indices in store order. Each scoped row can be
/// partial-matched by at most one batch record per run (first match wins
/// and consumes the row); rows touched this run are excluded from the
/// vanished sweep so a fresh change-candidate flag is never clobbered to
/// Inactive in the same pass.
fn classify_batch(
    snapshot: &mut Vec<Record>,
    scope: &[usize],
    batch: &mut [Record],
    typed_scope: bool,
    timestamp: &str,
) -> ReconcileSummary {
    let mut summary = ReconcileSummary::default();
    let scoped_tuples: Vec<[String; 5]> = scope
        .iter()
        .map(|&i| snapshot[i].comparison_tuple())
        .collect();
    let batch_tuples: Vec<[String; 5]> = batch.iter().map(|r| r.comparison_tuple()).collect();

    let mut consumed: HashSet<usize> = HashSet::new();
    let mut touched: HashSet<usize> = HashSet::new();
    let mut appended: Vec<Record> = Vec::new();

    for (record, tuple) in batch.iter_mut().zip(&batch_tuples) {
        // Identical row already persisted: refresh its date, no new row.
        if let Some(pos) = scoped_tuples.iter().position(|t| t == tuple) {
            summary.unchanged += 1;
            let idx = scope[pos];
            snapshot[idx].last_seen = timestamp.to_string();
            touched.insert(pos);
            continue;
        }

        // First not-yet-consumed row sharing >= 2 of 5 fields: the pair
        // is flagged as a change candidate, old and new side.
        let partial = (0..scope.len()).find(|pos| {
            !consumed.contains(pos) && matching_fields(tuple, &scoped_tuples[*pos]) >= 2
        });

        match partial {
            Some(pos) => {
                summary.changed += 1;
                let idx = scope[pos];
                snapshot[idx].status = RecordStatus::ChangeCandidateOld;
                snapshot[idx].last_seen = timestamp.to_string();
                consumed.insert(pos);
                touched.insert(pos);
                record.status = RecordStatus::ChangeCandidateNew;
                appended.push(record.clone());
            }
            None => {
                summary.new += 1;
                appended.push(record.clone());
            }
        }
    }

    // Vanished sweep, typed scope only: a category-wide map scope covers
    // many areas, so absence from one run means nothing there.
    if typed_scope {
        let batch_set: HashSet<&[String; 5]> = batch_tuples.iter().collect();
        for (pos, &idx) in scope.iter().enumerate() {
            if touched.contains(&pos) || batch_set.contains(&scoped_tuples[pos]) {
                continue;
            }
            summary.vanished += 1;
            snapshot[idx].status = RecordStatus::Inactive;
            snapshot[idx].last_seen = timestamp.to_string();
        }
    }

    snapshot.extend(appended);
    summary
}

/// Runs one reconciliation: read the full store, classify the batch
/// against the in-scope rows, persist the mutated superset, and return
/// the current batch.
///
/// Any store error is reported and degrades to returning the unpersisted
/// batch; the run's fetch is never lost, the store is left unchanged.
pub(crate) async fn reconcile(
    store: &dyn StoreClient,
    mut batch: Vec<Record>,
    context: &SearchContext,
    now: DateTime<Local>,
) -> ReconcileOutcome {
    let timestamp = format_timestamp(now);

    let snapshot = match store.read_all().await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(target: "reconcile_task", "Failed to read persisted store: {}", e);
            return ReconcileOutcome {
                records: batch,
                summary: ReconcileSummary::default(),
                persisted: false,
            };
        }
    };

    let mut records = snapshot.records;
    let scope: Vec<usize> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| in_scope(r, context))
        .map(|(i, _)| i)
        .collect();

    let summary = if scope.is_empty() {
        // Bootstrap: nothing to compare against, the whole batch is new.
        records.extend(batch.iter().cloned());
        ReconcileSummary {
            new: batch.len(),
            ..ReconcileSummary::default()
        }
    } else {
        classify_batch(
            &mut records,
            &scope,
            &mut batch,
            context.is_typed(),
            &timestamp,
        )
    };

    tracing::info!(
        target: "reconcile_task",
        "Reconciled '{}': {} new, {} changed, {} unchanged, {} vanished",
        context.input_context, summary.new, summary.changed, summary.unchanged, summary.vanished
    );

    match store.overwrite_all(&records, snapshot.revision).await {
        Ok(()) => ReconcileOutcome {
            records: batch,
            summary,
            persisted: true,
        },
        Err(e) => {
            tracing::error!(target: "reconcile_task", "Failed to persist store: {}", e);
            ReconcileOutcome {
                records: batch,
                summary,
                persisted: false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, Result};
    use crate::store::{Revision, StoreSnapshot};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// In-memory store double with a bumping revision and switchable
    /// failure modes.
    #[derive(Default)]
    struct MemStore {
        data: Mutex<(Vec<Record>, Revision)>,
        fail_read: bool,
        fail_write: bool,
        race_on_read: bool,
    }

    impl MemStore {
        fn with_records(records: Vec<Record>) -> Self {
            MemStore {
                data: Mutex::new((records, 1)),
                ..MemStore::default()
            }
        }

        fn records(&self) -> Vec<Record> {
            self.data.lock().unwrap().0.clone()
        }
    }

    #[async_trait]
    impl StoreClient for MemStore {
        async fn read_all(&self) -> Result<StoreSnapshot> {
            if self.fail_read {
                return Err(AppError::Store("read failed".to_string()));
            }
            let mut guard = self.data.lock().unwrap();
            let snapshot = StoreSnapshot {
                records: guard.0.clone(),
                revision: guard.1,
            };
            if self.race_on_read {
                guard.1 += 1;
            }
            Ok(snapshot)
        }

        async fn overwrite_all(&self, records: &[Record], expected: Revision) -> Result<()> {
            if self.fail_write {
                return Err(AppError::Store("write failed".to_string()));
            }
            let mut guard = self.data.lock().unwrap();
            if guard.1 != expected {
                return Err(AppError::StoreConflict("revision moved".to_string()));
            }
            guard.0 = records.to_vec();
            guard.1 += 1;
            Ok(())
        }
    }

    fn now() -> DateTime<Local> {
        Local::now()
    }

    fn record(
        context: &str,
        name: &str,
        address: &str,
        phone: &str,
        website: &str,
        email: Option<&str>,
    ) -> Record {
        let field = |s: &str| {
            if s.is_empty() {
                None
            } else {
                Some(s.to_string())
            }
        };
        Record {
            input_context: context.to_string(),
            name: field(name),
            address: field(address),
            phone: field(phone),
            website: field(website),
            email: email.map(|e| e.to_string()),
            latitude: None,
            longitude: None,
            status: RecordStatus::New,
            last_seen: "01-01-2026 00:00:00".to_string(),
        }
    }

    const TYPED: &str = "Typed: cafe in Town";

    fn typed_context() -> SearchContext {
        SearchContext::typed("cafe", "Town")
    }

    #[tokio::test]
    async fn test_bootstrap_inserts_whole_batch() {
        let store = MemStore::with_records(vec![record(
            "Typed: bakery in Elsewhere",
            "Bakery B",
            "Other St 2",
            "020",
            "b.nl",
            None,
        )]);
        let batch = vec![
            record(TYPED, "Cafe A", "Main St 1", "010", "a.nl", None),
            record(TYPED, "Cafe B", "Main St 2", "011", "b2.nl", None),
        ];

        let outcome = reconcile(&store, batch.clone(), &typed_context(), now()).await;
        assert!(outcome.persisted);
        assert_eq!(outcome.summary.new, 2);
        assert_eq!(outcome.records, batch);

        let stored = store.records();
        assert_eq!(stored.len(), 3);
        // Out-of-scope row is byte-identical to what was there before.
        assert_eq!(stored[0].status, RecordStatus::New);
        assert_eq!(stored[0].last_seen, "01-01-2026 00:00:00");
        assert!(stored[1..].iter().all(|r| r.status == RecordStatus::New));
    }

    #[tokio::test]
    async fn test_exact_match_stability() {
        let store = MemStore::default();
        let batch = vec![record(TYPED, "Cafe A", "Main St 1", "010", "a.nl", None)];

        let first = reconcile(&store, batch.clone(), &typed_context(), now()).await;
        assert_eq!(first.summary.new, 1);
        let size_after_first = store.records().len();

        let second = reconcile(&store, batch.clone(), &typed_context(), now()).await;
        assert_eq!(second.summary.unchanged, 1);
        assert_eq!(second.summary.new, 0);
        assert_eq!(store.records().len(), size_after_first);
        assert_eq!(store.records()[0].status, RecordStatus::New);
    }

    #[tokio::test]
    async fn test_unchanged_refreshes_date_only() {
        let mut existing = record(TYPED, "Cafe A", "Main St 1", "010", "a.nl", None);
        existing.last_seen = "01-01-2020 00:00:00".to_string();
        let store = MemStore::with_records(vec![existing]);

        let batch = vec![record(TYPED, "Cafe A", "Main St 1", "010", "a.nl", None)];
        let outcome = reconcile(&store, batch, &typed_context(), now()).await;
        assert_eq!(outcome.summary.unchanged, 1);

        let stored = store.records();
        assert_eq!(stored.len(), 1);
        assert_ne!(stored[0].last_seen, "01-01-2020 00:00:00");
        assert_eq!(stored[0].status, RecordStatus::New);
    }

    #[tokio::test]
    async fn test_one_shared_field_is_new() {
        let store = MemStore::with_records(vec![record(
            TYPED, "Cafe A", "Main St 1", "010", "a.nl",
            Some("info@a.nl"),
        )]);
        // Only the name agrees; every other field differs and is non-empty.
        let batch = vec![record(
            TYPED, "Cafe A", "Side St 9", "099", "z.nl",
            Some("info@z.nl"),
        )];

        let outcome = reconcile(&store, batch, &typed_context(), now()).await;
        assert_eq!(outcome.summary.new, 1);
        assert_eq!(outcome.summary.changed, 0);
        assert_eq!(store.records().len(), 2);
    }

    #[tokio::test]
    async fn test_two_shared_fields_is_changed() {
        let store = MemStore::with_records(vec![record(
            TYPED, "Cafe A", "Main St 1", "010", "a.nl",
            Some("info@a.nl"),
        )]);
        // Name and address agree, the other three differ.
        let batch = vec![record(
            TYPED, "Cafe A", "Main St 1", "099", "z.nl",
            Some("info@z.nl"),
        )];

        let outcome = reconcile(&store, batch, &typed_context(), now()).await;
        assert_eq!(outcome.summary.changed, 1);
        assert_eq!(outcome.records[0].status, RecordStatus::ChangeCandidateNew);

        let stored = store.records();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].status, RecordStatus::ChangeCandidateOld);
        assert_eq!(stored[1].status, RecordStatus::ChangeCandidateNew);
    }

    #[tokio::test]
    async fn test_phone_change_scenario() {
        // Store has the row; the same business returns with a new phone:
        // 4 of 5 fields still agree, so the pair is flagged.
        let store = MemStore::with_records(vec![record(
            TYPED, "Cafe A", "Main St 1", "010", "a.nl", None,
        )]);
        let batch = vec![record(TYPED, "Cafe A", "Main St 1", "999", "a.nl", None)];

        let outcome = reconcile(&store, batch, &typed_context(), now()).await;
        assert_eq!(outcome.summary.changed, 1);

        let stored = store.records();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].status, RecordStatus::ChangeCandidateOld);
        assert_eq!(stored[1].status, RecordStatus::ChangeCandidateNew);
        assert_eq!(stored[1].phone.as_deref(), Some("999"));
    }

    #[tokio::test]
    async fn test_empty_batch_marks_typed_scope_inactive() {
        let store = MemStore::with_records(vec![record(
            TYPED, "Cafe A", "Main St 1", "010", "a.nl", None,
        )]);

        let outcome = reconcile(&store, vec![], &typed_context(), now()).await;
        assert_eq!(outcome.summary.vanished, 1);
        assert!(outcome.records.is_empty());

        let stored = store.records();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, RecordStatus::Inactive);
    }

    #[tokio::test]
    async fn test_vanished_only_in_typed_mode() {
        let map_row = record(
            "Map: cafe in 52.00000, 5.00000 (radius 1000 m)",
            "Cafe A",
            "Main St 1",
            "010",
            "a.nl",
            None,
        );
        let store = MemStore::with_records(vec![map_row]);
        let context = SearchContext::map("cafe", 52.1, 5.1, 500);

        // Fresh batch from a different area, no overlap with the stored
        // row: a map run must not declare it vanished.
        let mut batch_record = record(
            &context.input_context,
            "Cafe Z",
            "Far St 9",
            "090",
            "zz.nl",
            Some("hi@zz.nl"),
        );
        batch_record.latitude = Some(52.1);
        batch_record.longitude = Some(5.1);

        let outcome = reconcile(&store, vec![batch_record], &context, now()).await;
        assert_eq!(outcome.summary.vanished, 0);
        assert_eq!(store.records()[0].status, RecordStatus::New);
    }

    #[tokio::test]
    async fn test_map_scope_groups_category_across_areas() {
        // Same category, different center: still in scope, so the
        // identical tuple classifies as unchanged.
        let stored = record(
            "Map: cafe in 52.00000, 5.00000 (radius 1000 m)",
            "Cafe A",
            "Main St 1",
            "010",
            "a.nl",
            None,
        );
        let store = MemStore::with_records(vec![stored]);

        let context = SearchContext::map("cafe", 53.0, 6.0, 2000);
        let batch = vec![record(
            &context.input_context,
            "Cafe A",
            "Main St 1",
            "010",
            "a.nl",
            None,
        )];

        let outcome = reconcile(&store, batch, &context, now()).await;
        assert_eq!(outcome.summary.unchanged, 1);
        assert_eq!(store.records().len(), 1);
    }

    #[tokio::test]
    async fn test_scope_isolation() {
        let other_context = "Typed: bakery in Elsewhere";
        let other = record(other_context, "Cafe A", "Main St 1", "010", "a.nl", None);
        let store = MemStore::with_records(vec![other.clone()]);

        // The batch record's tuple is identical to the out-of-scope row,
        // but cross-scope records are never compared: it's a bootstrap.
        let batch = vec![record(TYPED, "Cafe A", "Main St 1", "010", "a.nl", None)];
        let outcome = reconcile(&store, batch, &typed_context(), now()).await;
        assert_eq!(outcome.summary.new, 1);

        let stored = store.records();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0], other);
    }

    #[tokio::test]
    async fn test_partial_match_consumes_existing_row() {
        let store = MemStore::with_records(vec![record(
            TYPED, "Cafe A", "Main St 1", "010", "a.nl",
            Some("info@a.nl"),
        )]);
        // Both batch records share exactly (name, address) with the one
        // stored row; only the first may flag it.
        let batch = vec![
            record(TYPED, "Cafe A", "Main St 1", "111", "x.nl", Some("x@x.nl")),
            record(TYPED, "Cafe A", "Main St 1", "222", "y.nl", Some("y@y.nl")),
        ];

        let outcome = reconcile(&store, batch, &typed_context(), now()).await;
        assert_eq!(outcome.summary.changed, 1);
        assert_eq!(outcome.summary.new, 1);
        assert_eq!(outcome.records[0].status, RecordStatus::ChangeCandidateNew);
        assert_eq!(outcome.records[1].status, RecordStatus::New);

        let stored = store.records();
        assert_eq!(stored.len(), 3);
        // Flagged once, and the typed-mode vanished sweep must not
        // clobber the fresh flag to Inactive.
        assert_eq!(stored[0].status, RecordStatus::ChangeCandidateOld);
    }

    #[tokio::test]
    async fn test_duplicate_exact_tuples_do_not_insert_twice() {
        let store = MemStore::with_records(vec![record(
            TYPED, "Cafe A", "Main St 1", "010", "a.nl", None,
        )]);
        let one = record(TYPED, "Cafe A", "Main St 1", "010", "a.nl", None);
        let batch = vec![one.clone(), one];

        let outcome = reconcile(&store, batch, &typed_context(), now()).await;
        assert_eq!(outcome.summary.unchanged, 2);
        assert_eq!(store.records().len(), 1);
    }

    #[tokio::test]
    async fn test_normalized_null_markers_compare_equal() {
        // A round trip through the store can turn a missing email into
        // the literal "None"; identity must not break on it.
        let mut existing = record(TYPED, "Cafe A", "Main St 1", "010", "a.nl", None);
        existing.email = Some("None".to_string());
        let store = MemStore::with_records(vec![existing]);

        let batch = vec![record(TYPED, "Cafe A", "Main St 1", "010", "a.nl", None)];
        let outcome = reconcile(&store, batch, &typed_context(), now()).await;
        assert_eq!(outcome.summary.unchanged, 1);
        assert_eq!(store.records().len(), 1);
    }

    #[tokio::test]
    async fn test_read_failure_returns_unpersisted_batch() {
        let mut store = MemStore::with_records(vec![]);
        store.fail_read = true;
        let batch = vec![record(TYPED, "Cafe A", "Main St 1", "010", "a.nl", None)];

        let outcome = reconcile(&store, batch.clone(), &typed_context(), now()).await;
        assert!(!outcome.persisted);
        assert_eq!(outcome.records, batch);
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_returns_unpersisted_batch() {
        let mut store = MemStore::with_records(vec![]);
        store.fail_write = true;
        let batch = vec![record(TYPED, "Cafe A", "Main St 1", "010", "a.nl", None)];

        let outcome = reconcile(&store, batch.clone(), &typed_context(), now()).await;
        assert!(!outcome.persisted);
        assert_eq!(outcome.records, batch);
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_writer_surfaces_as_conflict() {
        let mut store = MemStore::with_records(vec![]);
        store.race_on_read = true; // another run writes between our read and write
        let batch = vec![record(TYPED, "Cafe A", "Main St 1", "010", "a.nl", None)];

        let outcome = reconcile(&store, batch.clone(), &typed_context(), now()).await;
        assert!(!outcome.persisted);
        assert_eq!(outcome.records, batch);
        assert!(store.records().is_empty());
    }
}

//! Replay driver and per-mailbox state machine.

use crate::config::ReplayConfig;
use crate::error::{CoreError, CoreResult};
use crate::replay::policy::{Disposition, IdempotencyPolicy};
use crate::replay::report::{
    AbortedMailbox, ReplayReport, ReplayState, SegmentFailure, SkipReason, SkippedRecord,
};
use crate::target::{MailboxResolver, MailboxTarget, ResolveError, TargetErrorClass};
use crate::types::{MailboxId, SegmentId, TransactionId};
use crate::wal::ScannedRecord;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;

/// Records queued per worker before the scanning thread blocks.
const WORKER_QUEUE_DEPTH: usize = 1024;

/// Replay progress of one mailbox.
struct MailboxSlot<H> {
    state: ReplayState,
    /// Exclusive hold, present only while `Replaying`.
    handle: Option<H>,
    last_txn: Option<TransactionId>,
    /// Index into `ReplayReport::aborted` once aborted.
    aborted_at: Option<usize>,
}

/// Applies records to mailboxes one at a time.
///
/// The engine holds each mailbox from its first record until
/// [`finish`](Self::finish), so live traffic never interleaves with a
/// mailbox's replay.
pub struct ReplayEngine<'r, R: MailboxResolver + 'r> {
    resolver: &'r R,
    policy: IdempotencyPolicy,
    mailboxes: HashMap<MailboxId, MailboxSlot<R::Handle<'r>>>,
    missing: HashSet<MailboxId>,
    report: ReplayReport,
}

impl<'r, R: MailboxResolver + 'r> ReplayEngine<'r, R> {
    /// Creates an engine resolving mailboxes through `resolver`.
    pub fn new(resolver: &'r R) -> Self {
        Self {
            resolver,
            policy: IdempotencyPolicy,
            mailboxes: HashMap::new(),
            missing: HashSet::new(),
            report: ReplayReport::default(),
        }
    }

    /// Report so far.
    #[must_use]
    pub fn report(&self) -> &ReplayReport {
        &self.report
    }

    /// Current state of `mailbox_id`.
    #[must_use]
    pub fn state_of(&self, mailbox_id: MailboxId) -> ReplayState {
        self.mailboxes
            .get(&mailbox_id)
            .map_or(ReplayState::Idle, |slot| slot.state)
    }

    /// Replays one record.
    pub fn process(&mut self, scanned: &ScannedRecord) {
        let record = &scanned.record;
        let kind = record.kind();
        let mailbox_id = record.mailbox_id();
        let txn = record.transaction_id();
        self.report.records_seen += 1;

        if kind.is_marker() {
            self.report.markers += 1;
            return;
        }
        if self.missing.contains(&mailbox_id) {
            self.skip(scanned, SkipReason::MailboxNotFound);
            return;
        }

        if !self.mailboxes.contains_key(&mailbox_id) {
            match self.resolver.resolve(mailbox_id) {
                Ok(handle) => {
                    tracing::debug!(mailbox = %mailbox_id, "mailbox held for replay");
                    self.mailboxes.insert(
                        mailbox_id,
                        MailboxSlot {
                            state: ReplayState::Replaying,
                            handle: Some(handle),
                            last_txn: None,
                            aborted_at: None,
                        },
                    );
                }
                Err(ResolveError::NotFound(_)) => {
                    self.missing.insert(mailbox_id);
                    self.skip(scanned, SkipReason::MailboxNotFound);
                    return;
                }
                Err(err @ ResolveError::Unavailable { .. }) => {
                    let index = self.abort(scanned, err.to_string(), None);
                    self.mailboxes.insert(
                        mailbox_id,
                        MailboxSlot {
                            state: ReplayState::Aborted,
                            handle: None,
                            last_txn: None,
                            aborted_at: Some(index),
                        },
                    );
                    return;
                }
            }
        }

        let Some(slot) = self.mailboxes.get_mut(&mailbox_id) else {
            return;
        };
        if slot.state == ReplayState::Aborted {
            if let Some(aborted) = slot.aborted_at.and_then(|i| self.report.aborted.get_mut(i)) {
                aborted.records_not_replayed += 1;
            }
            return;
        }
        if let Some(last) = slot.last_txn.filter(|last| txn <= *last) {
            self.skip(scanned, SkipReason::OutOfOrder { last });
            return;
        }
        let Some(handle) = slot.handle.as_mut() else {
            return;
        };
        let target: &mut dyn MailboxTarget = handle;

        match self.policy.classify(kind, record.payload.apply(target)) {
            Disposition::Applied => {
                slot.last_txn = Some(txn);
                self.report.applied += 1;
                tracing::debug!(mailbox = %mailbox_id, %txn, %kind, "applied");
            }
            Disposition::Absorbed(signal) => {
                slot.last_txn = Some(txn);
                self.report.absorbed += 1;
                tracing::debug!(mailbox = %mailbox_id, %txn, %kind, ?signal, "already applied");
            }
            Disposition::Fatal(err) => {
                slot.state = ReplayState::Aborted;
                slot.handle = None;
                let class = Some(err.class());
                let index = self.abort(scanned, err.to_string(), class);
                if let Some(slot) = self.mailboxes.get_mut(&mailbox_id) {
                    slot.aborted_at = Some(index);
                }
            }
        }
    }

    fn skip(&mut self, scanned: &ScannedRecord, reason: SkipReason) {
        let record = &scanned.record;
        tracing::warn!(
            mailbox = %record.mailbox_id(),
            txn = %record.transaction_id(),
            kind = %record.kind(),
            ?reason,
            "record skipped"
        );
        self.report.skipped.push(SkippedRecord {
            segment_id: scanned.segment_id,
            offset: scanned.offset,
            mailbox_id: record.mailbox_id(),
            transaction_id: record.transaction_id(),
            kind: record.kind(),
            reason,
        });
    }

    fn abort(
        &mut self,
        scanned: &ScannedRecord,
        error: String,
        error_class: Option<TargetErrorClass>,
    ) -> usize {
        let record = &scanned.record;
        tracing::error!(
            mailbox = %record.mailbox_id(),
            txn = %record.transaction_id(),
            kind = %record.kind(),
            segment = %scanned.segment_id,
            offset = scanned.offset,
            error = %error,
            "mailbox replay aborted"
        );
        self.report.aborted.push(AbortedMailbox {
            mailbox_id: record.mailbox_id(),
            segment_id: scanned.segment_id,
            offset: scanned.offset,
            transaction_id: record.transaction_id(),
            kind: record.kind(),
            error,
            error_class,
            records_not_replayed: 0,
        });
        self.report.aborted.len() - 1
    }

    /// Ends the pass: releases every held mailbox and returns the report.
    ///
    /// Mailboxes still replaying become `Complete` unless `interrupted`.
    pub fn finish(mut self, interrupted: bool) -> ReplayReport {
        for (mailbox_id, slot) in self.mailboxes.drain() {
            let state = if slot.state == ReplayState::Replaying && !interrupted {
                ReplayState::Complete
            } else {
                slot.state
            };
            drop(slot.handle);
            self.report.mailboxes.insert(mailbox_id, state);
        }
        self.report
    }
}

/// Scan-level bookkeeping shared by the sequential and parallel drivers.
#[derive(Default)]
struct Progress {
    current: Option<SegmentId>,
    last_completed: Option<SegmentId>,
    cancelled: bool,
    resume_from: Option<SegmentId>,
    failures: Vec<SegmentFailure>,
}

impl Progress {
    /// Pulls records from `scanner` and hands each to `dispatch` until the
    /// scan ends, fails or is cancelled.
    fn drive<I, F>(scanner: I, config: &ReplayConfig, mut dispatch: F) -> Self
    where
        I: IntoIterator<Item = CoreResult<ScannedRecord>>,
        F: FnMut(ScannedRecord),
    {
        let mut progress = Self::default();
        for item in scanner {
            match item {
                Ok(scanned) => {
                    if config.cancel.is_cancelled() {
                        tracing::info!(segment = %scanned.segment_id, "replay cancelled");
                        progress.cancelled = true;
                        progress.resume_from = Some(scanned.segment_id);
                        return progress;
                    }
                    if progress.current != Some(scanned.segment_id) {
                        if progress.current.is_some() {
                            progress.last_completed = progress.current;
                        }
                        progress.current = Some(scanned.segment_id);
                    }
                    dispatch(scanned);
                }
                Err(err) => {
                    progress.fail(err);
                    return progress;
                }
            }
        }
        progress.last_completed = progress.current.or(progress.last_completed);
        progress
    }

    fn fail(&mut self, err: CoreError) {
        let (segment_id, offset) = match &err {
            CoreError::Decode {
                segment_id, offset, ..
            } => (Some(*segment_id), Some(*offset)),
            _ => (self.current, None),
        };
        if segment_id.is_some() && segment_id != self.current {
            self.last_completed = self.current.or(self.last_completed);
        }
        self.failures.push(SegmentFailure {
            segment_id,
            offset,
            error: err.to_string(),
        });
    }

    fn into_report(self, mut report: ReplayReport) -> ReplayReport {
        report.cancelled = self.cancelled;
        report.resume_from = self.resume_from;
        report.last_completed_segment = self.last_completed;
        report.segment_failures.extend(self.failures);
        tracing::info!(%report, "replay finished");
        report
    }
}

/// Replays every record from `scanner` on the calling thread.
pub fn replay<I, R>(scanner: I, resolver: &R) -> ReplayReport
where
    I: IntoIterator<Item = CoreResult<ScannedRecord>>,
    R: MailboxResolver,
{
    replay_with(scanner, resolver, &ReplayConfig::default())
}

/// Replays on the calling thread, honoring `config`'s cancellation token.
pub fn replay_with<I, R>(scanner: I, resolver: &R, config: &ReplayConfig) -> ReplayReport
where
    I: IntoIterator<Item = CoreResult<ScannedRecord>>,
    R: MailboxResolver,
{
    let mut engine = ReplayEngine::new(resolver);
    let progress = Progress::drive(scanner, config, |scanned| engine.process(&scanned));
    let report = engine.finish(progress.cancelled);
    progress.into_report(report)
}

fn worker_for(mailbox_id: MailboxId, workers: usize) -> usize {
    mailbox_id.as_i32().unsigned_abs() as usize % workers
}

/// Replays with `config.workers` threads.
///
/// Every record of a mailbox goes to the same worker, so each mailbox is
/// still replayed by one thread in log order while different mailboxes
/// proceed in parallel. Markers go to the first worker.
pub fn replay_parallel<I, R>(scanner: I, resolver: &R, config: &ReplayConfig) -> ReplayReport
where
    I: IntoIterator<Item = CoreResult<ScannedRecord>>,
    R: MailboxResolver + Sync,
{
    let workers = config.workers.max(1);
    if workers == 1 {
        return replay_with(scanner, resolver, config);
    }
    tracing::info!(workers, "parallel replay");

    let interrupted = AtomicBool::new(false);
    thread::scope(|scope| {
        let mut senders = Vec::with_capacity(workers);
        let mut joins = Vec::with_capacity(workers);
        for _ in 0..workers {
            let (tx, rx) = mpsc::sync_channel::<ScannedRecord>(WORKER_QUEUE_DEPTH);
            senders.push(tx);
            let interrupted = &interrupted;
            joins.push(scope.spawn(move || {
                let mut engine = ReplayEngine::new(resolver);
                for scanned in rx {
                    engine.process(&scanned);
                }
                engine.finish(interrupted.load(Ordering::SeqCst))
            }));
        }

        let progress = Progress::drive(scanner, config, |scanned| {
            let worker = if scanned.record.kind().is_marker() {
                0
            } else {
                worker_for(scanned.record.mailbox_id(), workers)
            };
            // A worker only hangs up by panicking, which the join surfaces.
            let _ = senders[worker].send(scanned);
        });
        interrupted.store(progress.cancelled, Ordering::SeqCst);
        drop(senders);

        let mut report = ReplayReport::default();
        for join in joins {
            match join.join() {
                Ok(worker_report) => report.merge(worker_report),
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
        progress.into_report(report)
    })
}

//! Which apply failures mean "already applied".

use crate::record::{ApplyOutcome, RecordKind};
use crate::target::{TargetError, TargetErrorClass, TargetResult};

/// Per-kind table of target failures that replay absorbs.
///
/// | Kind                   | Absorbed         |
/// |------------------------|------------------|
/// | `AlterItemTag`         | `AlreadyInState` |
/// | `CreateMountpoint`     | `AlreadyExists`  |
/// | `CreateFolder`         | `AlreadyExists`  |
/// | `ImapCopyItem`         | `AlreadyExists`  |
/// | `DismissCalendarAlarm` | `AlreadyInState` |
/// | `EnableSharedReminder` | `AlreadyInState` |
/// | `SetItemColor`         | `AlreadyInState` |
/// | markers                | (never applied)  |
///
/// Anything not listed aborts replay of the mailbox.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdempotencyPolicy;

/// How replay should count one apply attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// The mutation was performed.
    Applied,
    /// The mailbox already reflected the mutation. Carries the signal the
    /// target raised, or `None` if the payload skipped the call itself.
    Absorbed(Option<TargetErrorClass>),
    /// The mutation failed and the mailbox cannot continue.
    Fatal(TargetError),
}

impl IdempotencyPolicy {
    /// Error classes absorbed for `kind`.
    #[must_use]
    pub const fn absorbed(kind: RecordKind) -> &'static [TargetErrorClass] {
        match kind {
            RecordKind::AlterItemTag
            | RecordKind::DismissCalendarAlarm
            | RecordKind::EnableSharedReminder
            | RecordKind::SetItemColor => &[TargetErrorClass::AlreadyInState],
            RecordKind::CreateMountpoint
            | RecordKind::CreateFolder
            | RecordKind::ImapCopyItem => &[TargetErrorClass::AlreadyExists],
            RecordKind::BackupMarker | RecordKind::SealSegment => &[],
        }
    }

    /// Returns true if `class` raised while applying `kind` is absorbed.
    #[must_use]
    pub fn absorbs(self, kind: RecordKind, class: TargetErrorClass) -> bool {
        Self::absorbed(kind).contains(&class)
    }

    /// Classifies the result of applying a record of `kind`.
    #[must_use]
    pub fn classify(self, kind: RecordKind, result: TargetResult<ApplyOutcome>) -> Disposition {
        match result {
            Ok(ApplyOutcome::Applied) => Disposition::Applied,
            Ok(ApplyOutcome::NoOp) => Disposition::Absorbed(None),
            Err(err) if self.absorbs(kind, err.class()) => Disposition::Absorbed(Some(err.class())),
            Err(err) => Disposition::Fatal(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ItemId;

    #[test]
    fn creation_absorbs_only_already_exists() {
        let policy = IdempotencyPolicy;
        for kind in [
            RecordKind::CreateMountpoint,
            RecordKind::CreateFolder,
            RecordKind::ImapCopyItem,
        ] {
            assert!(policy.absorbs(kind, TargetErrorClass::AlreadyExists));
            assert!(!policy.absorbs(kind, TargetErrorClass::AlreadyInState));
            assert!(!policy.absorbs(kind, TargetErrorClass::NoSuchFolder));
        }
    }

    #[test]
    fn state_changes_absorb_already_in_state() {
        let policy = IdempotencyPolicy;
        assert!(policy.absorbs(RecordKind::AlterItemTag, TargetErrorClass::AlreadyInState));
        assert!(!policy.absorbs(RecordKind::AlterItemTag, TargetErrorClass::AlreadyExists));
        assert!(!policy.absorbs(RecordKind::AlterItemTag, TargetErrorClass::NoSuchItem));
    }

    #[test]
    fn markers_absorb_nothing() {
        assert!(IdempotencyPolicy::absorbed(RecordKind::BackupMarker).is_empty());
        assert!(IdempotencyPolicy::absorbed(RecordKind::SealSegment).is_empty());
    }

    #[test]
    fn classify_results() {
        let policy = IdempotencyPolicy;
        assert_eq!(
            policy.classify(RecordKind::ImapCopyItem, Ok(ApplyOutcome::NoOp)),
            Disposition::Absorbed(None)
        );
        assert_eq!(
            policy.classify(
                RecordKind::CreateMountpoint,
                Err(TargetError::already_exists("mountpoint 300"))
            ),
            Disposition::Absorbed(Some(TargetErrorClass::AlreadyExists))
        );
        assert_eq!(
            policy.classify(
                RecordKind::DismissCalendarAlarm,
                Err(TargetError::NoSuchItem(ItemId::new(4)))
            ),
            Disposition::Fatal(TargetError::NoSuchItem(ItemId::new(4)))
        );
    }
}

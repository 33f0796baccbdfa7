//! Single-writer replicated values with per-tick change coalescing.
//!
//! A [`ReplicatedField`] holds one authoritative value. Only its designated
//! [`WriterRole`] may write it; everyone may read it. Writes are not announced
//! immediately: the first write in a tick remembers the pre-tick value, later
//! writes in the same tick just overwrite the current value, and [`commit`]
//! at the tick boundary emits one `(before, after)` change to listeners.
//!
//! [`commit`]: ReplicatedField::commit

use muster_common::{ReplicationError, Role, WriterRole};
use std::fmt;

/// Callback invoked with `(previous, current)` when a tick's writes commit.
pub type ChangeListener<T> = Box<dyn FnMut(&T, &T) + Send>;

/// A committed change of one field across one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange<T> {
    /// Value at the start of the tick
    pub previous: T,
    /// Value at the end of the tick
    pub current: T,
}

/// An authoritative value with exactly one writer role.
pub struct ReplicatedField<T> {
    name: &'static str,
    writer: WriterRole,
    value: T,
    /// Value before the first write of the current tick; `Some` means dirty.
    tick_start: Option<T>,
    retired: bool,
    listeners: Vec<ChangeListener<T>>,
}

impl<T: Clone + PartialEq> ReplicatedField<T> {
    /// Creates a field with the given writer and initial value.
    #[must_use]
    pub fn new(name: &'static str, writer: WriterRole, initial: T) -> Self {
        Self {
            name,
            writer,
            value: initial,
            tick_start: None,
            retired: false,
            listeners: Vec::new(),
        }
    }

    /// Creates a server-written field.
    #[must_use]
    pub fn server(name: &'static str, initial: T) -> Self {
        Self::new(name, WriterRole::Server, initial)
    }

    /// Returns the field name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the designated writer.
    #[must_use]
    pub const fn writer(&self) -> WriterRole {
        self.writer
    }

    /// Returns the current value. The writer sees its own uncommitted
    /// writes here; use [`Self::committed`] for what readers were last told.
    #[must_use]
    pub const fn read(&self) -> &T {
        &self.value
    }

    /// Returns the value as of the last commit.
    #[must_use]
    pub fn committed(&self) -> &T {
        self.tick_start.as_ref().unwrap_or(&self.value)
    }

    /// Writes a new value on behalf of `role`.
    ///
    /// Writing the current value again is accepted and changes nothing.
    pub fn write(&mut self, role: Role, value: T) -> Result<(), ReplicationError> {
        if self.retired {
            return Err(ReplicationError::FieldRetired { field: self.name });
        }
        if !self.writer.permits(role) {
            return Err(ReplicationError::WriteRejected {
                field: self.name,
                attempted: role,
                writer: self.writer,
            });
        }
        if value == self.value {
            return Ok(());
        }
        let previous = std::mem::replace(&mut self.value, value);
        if self.tick_start.is_none() {
            self.tick_start = Some(previous);
        }
        Ok(())
    }

    /// Returns whether uncommitted writes exist.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.tick_start.is_some()
    }

    /// Attaches a listener notified at every commit that changed the value.
    pub fn subscribe(&mut self, listener: ChangeListener<T>) {
        self.listeners.push(listener);
    }

    /// Returns the number of attached listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Closes the current tick for this field.
    ///
    /// Returns the coalesced change, or `None` when nothing was written or the
    /// writes ended on the value the tick started with.
    pub fn commit(&mut self) -> Option<FieldChange<T>> {
        let previous = self.tick_start.take()?;
        if previous == self.value {
            return None;
        }
        for listener in &mut self.listeners {
            listener(&previous, &self.value);
        }
        Some(FieldChange {
            previous,
            current: self.value.clone(),
        })
    }

    /// Permanently closes the field: pending changes are dropped, listeners
    /// detached, and further writes fail with [`ReplicationError::FieldRetired`].
    pub fn retire(&mut self) {
        self.retired = true;
        self.tick_start = None;
        self.listeners.clear();
    }

    /// Returns whether the field has been retired.
    #[must_use]
    pub const fn is_retired(&self) -> bool {
        self.retired
    }
}

impl<T: fmt::Debug> fmt::Debug for ReplicatedField<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicatedField")
            .field("name", &self.name)
            .field("writer", &self.writer)
            .field("value", &self.value)
            .field("dirty", &self.tick_start.is_some())
            .field("retired", &self.retired)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use muster_common::ClientId;
    use parking_lot::Mutex;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn recording_field(initial: i32) -> (ReplicatedField<i32>, Arc<Mutex<Vec<(i32, i32)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut field = ReplicatedField::server("value", initial);
        let sink = Arc::clone(&seen);
        field.subscribe(Box::new(move |prev, cur| sink.lock().push((*prev, *cur))));
        (field, seen)
    }

    #[test]
    fn test_writes_in_one_tick_coalesce() {
        let (mut field, seen) = recording_field(1);

        field.write(Role::Server, 2).expect("server write");
        field.write(Role::Server, 3).expect("server write");
        assert!(seen.lock().is_empty(), "no synchronous notification");

        let change = field.commit().expect("change");
        assert_eq!(change.previous, 1);
        assert_eq!(change.current, 3);
        assert_eq!(*seen.lock(), vec![(1, 3)]);

        assert!(field.commit().is_none());
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_write_back_to_start_value_is_silent() {
        let (mut field, seen) = recording_field(5);
        field.write(Role::Server, 6).expect("server write");
        field.write(Role::Server, 5).expect("server write");
        assert!(field.commit().is_none());
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_committed_lags_until_commit() {
        let mut field = ReplicatedField::server("value", 1);
        field.write(Role::Server, 2).expect("server write");
        assert_eq!(*field.read(), 2);
        assert_eq!(*field.committed(), 1);

        field.commit();
        assert_eq!(*field.committed(), 2);
    }

    #[test]
    fn test_same_value_write_does_not_dirty() {
        let mut field = ReplicatedField::server("flag", true);
        field.write(Role::Server, true).expect("server write");
        assert!(!field.is_dirty());
    }

    #[test]
    fn test_non_writer_rejected_without_corruption() {
        let mut field = ReplicatedField::server("value", 10);
        let a = field.write(Role::Client(ClientId::new(1)), 11);
        let b = field.write(Role::Client(ClientId::new(2)), 12);

        assert!(matches!(a, Err(ReplicationError::WriteRejected { .. })));
        assert!(matches!(b, Err(ReplicationError::WriteRejected { .. })));
        assert_eq!(*field.read(), 10);
        assert!(!field.is_dirty());
    }

    #[test]
    fn test_owner_field_rejects_server() {
        let owner = ClientId::new(4);
        let mut field = ReplicatedField::new("ready", WriterRole::Owner(owner), false);
        assert!(field.write(Role::Server, true).is_err());
        field.write(Role::Client(owner), true).expect("owner write");
        assert!(*field.read());
    }

    #[test]
    fn test_retire_drops_pending_and_rejects() {
        let (mut field, seen) = recording_field(0);
        field.write(Role::Server, 9).expect("server write");
        field.retire();

        assert!(field.commit().is_none());
        assert!(seen.lock().is_empty());
        assert_eq!(
            field.write(Role::Server, 1),
            Err(ReplicationError::FieldRetired { field: "value" })
        );
        assert_eq!(field.listener_count(), 0);
    }

    proptest! {
        #[test]
        fn prop_commit_reports_first_and_last(start in -100i32..100, writes in proptest::collection::vec(-100i32..100, 0..12)) {
            let mut field = ReplicatedField::server("value", start);
            for w in &writes {
                field.write(Role::Server, *w).expect("server write");
            }
            let last = writes.last().copied().unwrap_or(start);
            match field.commit() {
                Some(change) => {
                    prop_assert_eq!(change.previous, start);
                    prop_assert_eq!(change.current, last);
                    prop_assert_ne!(start, last);
                },
                None => prop_assert_eq!(start, last),
            }
        }

        #[test]
        fn prop_client_writes_never_land(start in any::<i32>(), attempts in proptest::collection::vec((1u32..50, any::<i32>()), 1..10)) {
            let mut field = ReplicatedField::server("value", start);
            for (client, value) in attempts {
                prop_assert!(field.write(Role::Client(ClientId::new(client)), value).is_err());
            }
            prop_assert_eq!(*field.read(), start);
            prop_assert!(field.commit().is_none());
        }
    }
}

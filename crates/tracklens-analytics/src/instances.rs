//! Ordered repeatable instances: enrollments per (entity, program) and
//! events per (enrollment, stage), stored once in an arena and addressed by
//! offset.

use std::cmp::Ordering;
use std::collections::HashMap;

use tracklens_storage::{Enrollment, Event};

/// Maps a repeatable offset onto an index into `len` ordered instances.
///
/// No offset and `-1` pick the latest, `0` the first, `n > 0` the n-th after
/// the first and `-n` the n-th from the latest.
pub fn resolve_offset(len: usize, offset: Option<i32>) -> Option<usize> {
    if len == 0 {
        return None;
    }
    match offset {
        None => Some(len - 1),
        Some(n) if n >= 0 => {
            let index = usize::try_from(n).ok()?;
            (index < len).then_some(index)
        }
        Some(n) => {
            let back = usize::try_from(n.unsigned_abs()).ok()?;
            len.checked_sub(back)
        }
    }
}

#[derive(Debug)]
pub struct InstanceArena<T> {
    items: Vec<T>,
    index: HashMap<String, HashMap<String, Vec<usize>>>,
}

impl<T> Default for InstanceArena<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T> InstanceArena<T> {
    fn build<K, O>(items: Vec<T>, key: K, order: O) -> Self
    where
        K: Fn(&T) -> (&str, &str),
        O: Fn(&T, &T) -> Ordering,
    {
        let mut index: HashMap<String, HashMap<String, Vec<usize>>> = HashMap::new();
        for (i, item) in items.iter().enumerate() {
            let (owner, scope) = key(item);
            index
                .entry(owner.to_string())
                .or_default()
                .entry(scope.to_string())
                .or_default()
                .push(i);
        }
        for slots in index.values_mut().flat_map(HashMap::values_mut) {
            slots.sort_by(|&a, &b| order(&items[a], &items[b]));
        }
        Self { items, index }
    }

    /// Instances for `(owner, scope)`, oldest first.
    pub fn instances(&self, owner: &str, scope: &str) -> Vec<&T> {
        self.slots(owner, scope)
            .iter()
            .filter_map(|&i| self.items.get(i))
            .collect()
    }

    pub fn select(&self, owner: &str, scope: &str, offset: Option<i32>) -> Option<&T> {
        let slots = self.slots(owner, scope);
        resolve_offset(slots.len(), offset).and_then(|i| self.items.get(slots[i]))
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn slots(&self, owner: &str, scope: &str) -> &[usize] {
        self.index
            .get(owner)
            .and_then(|scopes| scopes.get(scope))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Enrollments keyed by (tracked entity, program).
pub type EnrollmentArena = InstanceArena<Enrollment>;

/// Events keyed by (enrollment, program stage).
pub type EventArena = InstanceArena<Event>;

impl EnrollmentArena {
    pub fn from_enrollments(enrollments: Vec<Enrollment>) -> Self {
        Self::build(
            enrollments,
            |e| (e.tracked_entity.as_str(), e.program.as_str()),
            |a, b| {
                a.enrollment_date
                    .cmp(&b.enrollment_date)
                    .then_with(|| a.created.cmp(&b.created))
                    .then_with(|| a.uid.cmp(&b.uid))
            },
        )
    }

    /// True when the entity has any enrollment in `program`.
    pub fn is_enrolled(&self, entity: &str, program: &str) -> bool {
        !self.slots(entity, program).is_empty()
    }
}

impl EventArena {
    /// Events without an occurred date are ordered by creation time.
    pub fn from_events(events: Vec<Event>) -> Self {
        Self::build(
            events,
            |e| (e.enrollment.as_str(), e.program_stage.as_str()),
            |a, b| {
                a.occurred_date
                    .unwrap_or(a.created)
                    .cmp(&b.occurred_date.unwrap_or(b.created))
                    .then_with(|| a.created.cmp(&b.created))
                    .then_with(|| a.uid.cmp(&b.uid))
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tracklens_core::AnalyticsDateTime;
    use tracklens_storage::EventStatus;

    fn event(uid: &str, enrollment: &str, stage: &str, occurred: Option<&str>, created: &str) -> Event {
        Event {
            uid: uid.into(),
            enrollment: enrollment.into(),
            program_stage: stage.into(),
            org_unit: "DiszpKrYNg8".into(),
            status: EventStatus::Completed,
            occurred_date: occurred.map(|d| d.parse::<AnalyticsDateTime>().unwrap()),
            scheduled_date: None,
            created: created.parse().unwrap(),
            geometry: None,
            data_values: BTreeMap::new(),
        }
    }

    #[test]
    fn offsets() {
        assert_eq!(resolve_offset(3, None), Some(2));
        assert_eq!(resolve_offset(3, Some(-1)), Some(2));
        assert_eq!(resolve_offset(3, Some(0)), Some(0));
        assert_eq!(resolve_offset(3, Some(1)), Some(1));
        assert_eq!(resolve_offset(3, Some(2)), Some(2));
        assert_eq!(resolve_offset(3, Some(3)), None);
        assert_eq!(resolve_offset(3, Some(-2)), Some(1));
        assert_eq!(resolve_offset(3, Some(-3)), Some(0));
        assert_eq!(resolve_offset(3, Some(-4)), None);
        assert_eq!(resolve_offset(0, None), None);
        assert_eq!(resolve_offset(0, Some(0)), None);
    }

    #[test]
    fn events_are_ordered_per_enrollment_and_stage() {
        let arena = EventArena::from_events(vec![
            event("e3", "en1", "A03MvHHogjR", Some("2022-03-01"), "2022-03-01"),
            event("e1", "en1", "A03MvHHogjR", Some("2022-01-01"), "2022-01-05"),
            event("e2", "en1", "A03MvHHogjR", None, "2022-02-01"),
            event("x1", "en2", "A03MvHHogjR", Some("2021-01-01"), "2021-01-01"),
            event("y1", "en1", "ZzYYXq4fJie", Some("2021-01-01"), "2021-01-01"),
        ]);
        let uids: Vec<&str> = arena
            .instances("en1", "A03MvHHogjR")
            .iter()
            .map(|e| e.uid.as_str())
            .collect();
        assert_eq!(uids, vec!["e1", "e2", "e3"]);
        assert_eq!(arena.select("en1", "A03MvHHogjR", None).unwrap().uid, "e3");
        assert_eq!(arena.select("en1", "A03MvHHogjR", Some(0)).unwrap().uid, "e1");
        assert_eq!(arena.select("en1", "A03MvHHogjR", Some(-2)).unwrap().uid, "e2");
        assert!(arena.select("en1", "A03MvHHogjR", Some(5)).is_none());
        assert!(arena.select("missing", "A03MvHHogjR", None).is_none());
        assert_eq!(arena.len(), 5);
    }
}

//! Attendee status machine, derived read-side facts and reassignment lineage.
//!
//! Every read path reports status through [`effective_status`]: an observed
//! payment outranks whatever the stored field says. The stored field itself is
//! only rewritten by an explicit status update.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use uuid::Uuid;

use super::error::SchedulingError;
use super::types::{Attendee, AttendeeStatus, CallerRole, Meeting, MeetingStatus};

/// Status as every reader must see it.
pub fn effective_status(attendee: &Attendee) -> AttendeeStatus {
    match (attendee.contract_paid_at, attendee.status) {
        // an administrative refund is the only thing that outranks a payment
        (Some(_), AttendeeStatus::Refunded) => AttendeeStatus::Refunded,
        (Some(_), _) => AttendeeStatus::ContractPaid,
        (None, status) => status,
    }
}

/// Reassigned non-partner attendee whose new placement has not concluded yet.
pub fn is_pending_reassignment(attendee: &Attendee) -> bool {
    !attendee.is_partner
        && attendee.parent_attendee_id.is_some()
        && !matches!(
            effective_status(attendee),
            AttendeeStatus::ContractPaid
                | AttendeeStatus::Completed
                | AttendeeStatus::Refunded
                | AttendeeStatus::Approved
                | AttendeeStatus::Rejected
        )
}

fn operator_allows(from: AttendeeStatus, to: AttendeeStatus) -> bool {
    use AttendeeStatus::*;

    if from == ContractPaid {
        return false;
    }
    if from == to || to == Canceled {
        return true;
    }
    matches!(
        (from, to),
        (Invited, Completed | NoShow)
            | (Completed, ContractPaid | Approved | Rejected)
            | (Approved, ContractPaid)
    )
}

/// Validates a stored-status change requested by a caller with `role`.
///
/// `from` must be the effective status. Administrators may set anything; a
/// sync process never overwrites a terminal status; everyone else follows the
/// transition table, in which `contract_paid` has no exits. `rescheduled` is
/// only reachable through [`check_reschedule`], which pairs it with a new
/// placement.
pub fn check_transition(
    from: AttendeeStatus,
    to: AttendeeStatus,
    role: CallerRole,
) -> Result<(), SchedulingError> {
    let allowed = match role {
        CallerRole::Admin => true,
        _ if to == AttendeeStatus::Rescheduled => false,
        CallerRole::Sync if from.is_terminal() => from == to,
        CallerRole::Sync | CallerRole::Operator => operator_allows(from, to),
    };
    if allowed {
        Ok(())
    } else {
        Err(SchedulingError::InvalidTransition { from, to })
    }
}

/// Whether an attendee in effective status `from` may be moved to a new placement.
pub fn check_reschedule(from: AttendeeStatus) -> Result<(), SchedulingError> {
    match from {
        AttendeeStatus::Invited | AttendeeStatus::NoShow => Ok(()),
        _ => Err(SchedulingError::InvalidTransition {
            from,
            to: AttendeeStatus::Rescheduled,
        }),
    }
}

/// Meeting outcome implied by its seated attendees, when they all agree.
pub fn rollup_meeting_status(meeting: &Meeting) -> Option<MeetingStatus> {
    let mut seated = meeting
        .attendees
        .iter()
        .filter(|a| a.holds_seat())
        .map(effective_status);
    let first = seated.next()?;
    if !seated.all(|s| s == first) {
        return None;
    }
    match first {
        AttendeeStatus::Completed | AttendeeStatus::Approved | AttendeeStatus::Rejected => {
            Some(MeetingStatus::Completed)
        }
        AttendeeStatus::NoShow => Some(MeetingStatus::NoShow),
        AttendeeStatus::ContractPaid => Some(MeetingStatus::ContractPaid),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendeeView {
    #[serde(flatten)]
    pub attendee: Attendee,
    pub effective_status: AttendeeStatus,
    pub pending_reassignment: bool,
}

impl From<&Attendee> for AttendeeView {
    fn from(attendee: &Attendee) -> Self {
        Self {
            attendee: attendee.clone(),
            effective_status: effective_status(attendee),
            pending_reassignment: is_pending_reassignment(attendee),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingView {
    pub id: Uuid,
    pub closer_id: Uuid,
    pub meeting_type: super::types::MeetingType,
    pub scheduled_at: chrono::NaiveDateTime,
    pub duration_minutes: u32,
    pub status: MeetingStatus,
    pub deal_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    pub booked_by: Option<String>,
    pub orphan: bool,
    pub occupancy: u32,
    pub attendees: Vec<AttendeeView>,
}

impl From<&Meeting> for MeetingView {
    fn from(meeting: &Meeting) -> Self {
        Self {
            id: meeting.id,
            closer_id: meeting.closer_id,
            meeting_type: meeting.meeting_type,
            scheduled_at: meeting.scheduled_at,
            duration_minutes: meeting.duration_minutes,
            status: meeting.status,
            deal_id: meeting.deal_id,
            contact_id: meeting.contact_id,
            booked_by: meeting.booked_by.clone(),
            orphan: meeting.is_orphan(),
            occupancy: meeting.seats_taken(),
            attendees: meeting.attendees.iter().map(AttendeeView::from).collect(),
        }
    }
}

/// Arena of attendee records indexed by their parent pointer.
///
/// Only used for audit and display lookups; nothing here implies ownership.
#[derive(Debug, Clone, Default)]
pub struct AttendeeLineage {
    records: HashMap<Uuid, Attendee>,
    children: HashMap<Uuid, Vec<Uuid>>,
}

impl AttendeeLineage {
    pub fn new(records: impl IntoIterator<Item = Attendee>) -> Self {
        let mut lineage = Self::default();
        for record in records {
            lineage.insert(record);
        }
        lineage
    }

    pub fn insert(&mut self, record: Attendee) {
        if self.records.contains_key(&record.id) {
            return;
        }
        if let Some(parent) = record.parent_attendee_id {
            self.children.entry(parent).or_default().push(record.id);
        }
        self.records.insert(record.id, record);
    }

    pub fn get(&self, id: Uuid) -> Option<&Attendee> {
        self.records.get(&id)
    }

    /// Ancestors of `id` from the oldest known record down to `id` itself.
    /// Stops at a missing parent or at the first repeated id.
    pub fn ancestry(&self, id: Uuid) -> Vec<&Attendee> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = self.records.get(&id);
        while let Some(record) = cursor {
            if !seen.insert(record.id) {
                break;
            }
            chain.push(record);
            cursor = record
                .parent_attendee_id
                .and_then(|parent| self.records.get(&parent));
        }
        chain.reverse();
        chain
    }

    /// Every placement derived from `id`, breadth first, `id` excluded.
    pub fn descendants(&self, id: Uuid) -> Vec<&Attendee> {
        let mut out = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            for child in self.children.get(&current).into_iter().flatten() {
                if seen.insert(*child) {
                    if let Some(record) = self.records.get(child) {
                        out.push(record);
                    }
                    queue.push_back(*child);
                }
            }
        }
        out
    }

    /// Full chain through `id`: ancestry followed by descendants.
    pub fn chain(&self, id: Uuid) -> Vec<&Attendee> {
        let mut chain = self.ancestry(id);
        chain.extend(self.descendants(id));
        chain
    }

    /// Latest placement in the chain through `id`.
    pub fn current(&self, id: Uuid) -> Option<&Attendee> {
        self.chain(id).into_iter().max_by_key(|a| a.created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduling::types::NewAttendee;
    use chrono::Utc;

    fn attendee(status: AttendeeStatus) -> Attendee {
        let mut a = Attendee::invited(Uuid::new_v4(), &NewAttendee::default());
        a.status = status;
        a
    }

    #[test]
    fn test_payment_timestamp_overrides_stored_status() {
        let mut a = attendee(AttendeeStatus::Completed);
        assert_eq!(effective_status(&a), AttendeeStatus::Completed);
        a.contract_paid_at = Some(Utc::now());
        assert_eq!(effective_status(&a), AttendeeStatus::ContractPaid);
        a.status = AttendeeStatus::NoShow;
        assert_eq!(effective_status(&a), AttendeeStatus::ContractPaid);
        a.status = AttendeeStatus::Refunded;
        assert_eq!(effective_status(&a), AttendeeStatus::Refunded);
    }

    #[test]
    fn test_operator_transition_table() {
        use AttendeeStatus::*;
        let op = CallerRole::Operator;
        assert!(check_transition(Invited, Completed, op).is_ok());
        assert!(check_transition(Invited, NoShow, op).is_ok());
        assert!(check_transition(Completed, ContractPaid, op).is_ok());
        assert!(check_transition(NoShow, Canceled, op).is_ok());
        assert!(check_transition(Invited, Rescheduled, op).is_err());
        assert!(check_transition(NoShow, Rescheduled, op).is_err());
        assert!(check_transition(Completed, Invited, op).is_err());
        assert!(check_transition(Invited, ContractPaid, op).is_err());
        assert!(check_transition(ContractPaid, Canceled, op).is_err());
        assert!(check_transition(ContractPaid, Refunded, op).is_err());
    }

    #[test]
    fn test_sync_never_overwrites_terminal_status() {
        use AttendeeStatus::*;
        let sync = CallerRole::Sync;
        assert!(check_transition(Invited, Completed, sync).is_ok());
        assert!(check_transition(Completed, ContractPaid, sync).is_err());
        assert!(check_transition(NoShow, Rescheduled, sync).is_err());
        assert!(check_transition(Canceled, Invited, sync).is_err());
        assert!(check_transition(Completed, Completed, sync).is_ok());
    }

    #[test]
    fn test_reschedule_edges() {
        use AttendeeStatus::*;
        assert!(check_reschedule(Invited).is_ok());
        assert!(check_reschedule(NoShow).is_ok());
        for from in [Completed, ContractPaid, Canceled, Rescheduled, Refunded] {
            assert_eq!(
                check_reschedule(from),
                Err(SchedulingError::InvalidTransition {
                    from,
                    to: Rescheduled
                })
            );
        }
    }

    #[test]
    fn test_admin_may_override_anything() {
        use AttendeeStatus::*;
        assert!(check_transition(ContractPaid, Refunded, CallerRole::Admin).is_ok());
        assert!(check_transition(Canceled, Invited, CallerRole::Admin).is_ok());
    }

    #[test]
    fn test_pending_reassignment_is_derived() {
        let mut a = attendee(AttendeeStatus::Invited);
        assert!(!is_pending_reassignment(&a));
        a.parent_attendee_id = Some(Uuid::new_v4());
        assert!(is_pending_reassignment(&a));
        a.is_partner = true;
        assert!(!is_pending_reassignment(&a));
        a.is_partner = false;
        a.status = AttendeeStatus::NoShow;
        assert!(is_pending_reassignment(&a));
        a.contract_paid_at = Some(Utc::now());
        assert!(!is_pending_reassignment(&a));
    }

    #[test]
    fn test_lineage_chain_and_cycle_guard() {
        let root = attendee(AttendeeStatus::Rescheduled);
        let middle = root.reassigned_to(Uuid::new_v4());
        let mut leaf = middle.reassigned_to(Uuid::new_v4());
        leaf.created_at = middle.created_at + chrono::Duration::seconds(1);
        let lineage = AttendeeLineage::new(vec![leaf.clone(), root.clone(), middle.clone()]);

        let ids: Vec<Uuid> = lineage.chain(middle.id).iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![root.id, middle.id, leaf.id]);
        assert_eq!(lineage.current(root.id).map(|a| a.id), Some(leaf.id));

        let mut a = attendee(AttendeeStatus::Invited);
        let mut b = attendee(AttendeeStatus::Invited);
        a.parent_attendee_id = Some(b.id);
        b.parent_attendee_id = Some(a.id);
        let looped = AttendeeLineage::new(vec![a.clone(), b.clone()]);
        assert_eq!(looped.ancestry(a.id).len(), 2);
        assert_eq!(looped.descendants(a.id).len(), 1);
    }

    #[test]
    fn test_rollup_requires_agreement() {
        let mut meeting = Meeting {
            id: Uuid::new_v4(),
            closer_id: Uuid::new_v4(),
            meeting_type: crate::scheduling::types::MeetingType::R1,
            scheduled_at: chrono::NaiveDate::from_ymd_opt(2025, 6, 10)
                .unwrap()
                .and_hms_opt(14, 0, 0)
                .unwrap(),
            duration_minutes: 30,
            status: MeetingStatus::Scheduled,
            deal_id: None,
            contact_id: None,
            booked_by: None,
            created_at: Utc::now(),
            attendees: vec![attendee(AttendeeStatus::NoShow), attendee(AttendeeStatus::Canceled)],
        };
        assert_eq!(rollup_meeting_status(&meeting), Some(MeetingStatus::NoShow));
        meeting.attendees.push(attendee(AttendeeStatus::Completed));
        assert_eq!(rollup_meeting_status(&meeting), None);
    }
}

use chrono::NaiveDateTime;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

use super::ranking::{rank_all, ratio, CloserRanks};
use crate::core::config::MetricsConfig;
use crate::scheduling::availability::AvailabilityRegistry;
use crate::scheduling::lifecycle::effective_status;
use crate::scheduling::types::{
    weekday_index, AttendeeStatus, AvailabilitySlot, Closer, DateRange, Meeting, MeetingStatus,
    MeetingType, Warning,
};

const UNKNOWN_CLOSER_NAME: &str = "Unknown closer";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloserCounters {
    pub scheduled: u32,
    pub realized: u32,
    pub no_show: u32,
    pub contract_paid: u32,
    pub follow_on: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloserMetricRow {
    pub closer_id: Uuid,
    pub closer_name: String,
    pub active: bool,
    /// Has at least one availability slot on a weekday inside the range.
    pub configured: bool,
    #[serde(flatten)]
    pub counters: CloserCounters,
    pub lead_quota: u64,
    pub quota_attainment: f64,
    pub ranks: CloserRanks,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamAverages {
    pub closers_counted: u32,
    pub scheduled: f64,
    pub realized: f64,
    pub no_show: f64,
    pub contract_paid: f64,
    pub follow_on: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloserMetricsReport {
    pub range: DateRange,
    pub meeting_type: MeetingType,
    pub rows: Vec<CloserMetricRow>,
    pub team_average: TeamAverages,
    /// Team lead target for the whole range.
    pub team_meta: u64,
    pub warnings: Vec<Warning>,
}

impl CloserMetricsReport {
    pub fn row(&self, closer_id: Uuid) -> Option<&CloserMetricRow> {
        self.rows.iter().find(|r| r.closer_id == closer_id)
    }
}

/// Everything the fold reads. `follow_ons` are next-stage meetings in the range
/// and `prior_stage` the same-stage meetings of their deals, at any date.
#[derive(Debug, Clone, Copy)]
pub struct MetricsInput<'a> {
    pub range: DateRange,
    pub meeting_type: MeetingType,
    pub closers: &'a [Closer],
    pub availability: &'a [AvailabilitySlot],
    pub meetings: &'a [Meeting],
    pub follow_ons: &'a [Meeting],
    pub prior_stage: &'a [Meeting],
}

pub struct CloserMetricsAggregator<'a> {
    config: &'a MetricsConfig,
}

impl<'a> CloserMetricsAggregator<'a> {
    pub fn new(config: &'a MetricsConfig) -> Self {
        Self { config }
    }

    pub fn aggregate(&self, input: MetricsInput<'_>) -> CloserMetricsReport {
        let mut warnings = Vec::new();
        let registry = AvailabilityRegistry::new(input.closers, input.availability);
        let weekdays: BTreeSet<u8> = input
            .range
            .start
            .iter_days()
            .take(input.range.days().min(7) as usize)
            .map(weekday_index)
            .collect();

        let mut rows: Vec<CloserMetricRow> = Vec::new();
        let mut index: HashMap<Uuid, usize> = HashMap::new();
        for closer in input.closers.iter().filter(|c| c.meeting_type == input.meeting_type) {
            let has_activity = input.meetings.iter().any(|m| m.closer_id == closer.id);
            if !closer.active && !has_activity {
                continue;
            }
            let configured = weekdays
                .iter()
                .any(|&wd| !registry.slots_for(closer.id, wd, input.meeting_type).is_empty());
            index.insert(closer.id, rows.len());
            rows.push(CloserMetricRow {
                closer_id: closer.id,
                closer_name: closer.name.clone(),
                active: closer.active,
                configured,
                counters: CloserCounters::default(),
                lead_quota: u64::from(closer.daily_lead_quota) * u64::from(input.range.days()),
                quota_attainment: 0.0,
                ranks: CloserRanks::default(),
            });
        }

        for meeting in input.meetings {
            if !self.counts(meeting, input.range, input.meeting_type) {
                continue;
            }
            let row = match index.get(&meeting.closer_id) {
                Some(&i) => i,
                None => {
                    warnings.push(Warning::missing_linkage(
                        meeting.id,
                        format!("meeting closer {} is not a known closer", meeting.closer_id),
                    ));
                    index.insert(meeting.closer_id, rows.len());
                    rows.push(fallback_row(meeting.closer_id));
                    rows.len() - 1
                }
            };
            let counters = &mut rows[row].counters;
            for attendee in &meeting.attendees {
                let status = effective_status(attendee);
                if matches!(status, AttendeeStatus::Canceled | AttendeeStatus::Rescheduled) {
                    continue;
                }
                counters.scheduled += 1;
                match status {
                    AttendeeStatus::Completed => counters.realized += 1,
                    AttendeeStatus::ContractPaid => {
                        counters.realized += 1;
                        counters.contract_paid += 1;
                    }
                    AttendeeStatus::NoShow => counters.no_show += 1,
                    _ => {}
                }
            }
        }

        self.attribute_follow_ons(&input, &index, &mut rows, &mut warnings);

        for row in &mut rows {
            row.quota_attainment = ratio(row.counters.scheduled.into(), row.lead_quota);
        }
        let counters: Vec<&CloserCounters> = rows.iter().map(|r| &r.counters).collect();
        let ranks = rank_all(&counters);
        for (row, ranks) in rows.iter_mut().zip(ranks) {
            row.ranks = ranks;
        }

        for w in &warnings {
            warn!("Closer metrics: {}", w.message);
        }

        CloserMetricsReport {
            range: input.range,
            meeting_type: input.meeting_type,
            team_average: team_average(&rows),
            team_meta: u64::from(self.config.team_daily_meta) * u64::from(input.range.days()),
            rows,
            warnings,
        }
    }

    fn counts(&self, meeting: &Meeting, range: DateRange, meeting_type: MeetingType) -> bool {
        meeting.meeting_type == meeting_type
            && meeting.status != MeetingStatus::Canceled
            && range.contains(meeting.scheduled_at.date())
            && self.config.is_authorized_source(meeting.booked_by.as_deref())
    }

    /// Credits each later-stage meeting to the closer of the latest earlier-stage
    /// meeting of the same deal that precedes it.
    fn attribute_follow_ons(
        &self,
        input: &MetricsInput<'_>,
        index: &HashMap<Uuid, usize>,
        rows: &mut [CloserMetricRow],
        warnings: &mut Vec<Warning>,
    ) {
        let Some(next_stage) = input.meeting_type.next_stage() else {
            return;
        };

        let mut earlier: HashMap<Uuid, Vec<(NaiveDateTime, Uuid)>> = HashMap::new();
        for meeting in input.prior_stage.iter().chain(input.meetings) {
            if meeting.meeting_type != input.meeting_type || meeting.is_withdrawn() {
                continue;
            }
            for deal in meeting_deals(meeting) {
                earlier
                    .entry(deal)
                    .or_default()
                    .push((meeting.scheduled_at, meeting.closer_id));
            }
        }

        for meeting in input.follow_ons {
            if meeting.is_withdrawn() || !self.counts(meeting, input.range, next_stage) {
                continue;
            }
            let deals = meeting_deals(meeting);
            if deals.is_empty() {
                warnings.push(Warning::missing_linkage(
                    meeting.id,
                    "follow-on meeting has no deal linkage".to_string(),
                ));
                continue;
            }
            for deal in deals {
                let source = earlier.get(&deal).and_then(|entries| {
                    entries
                        .iter()
                        .filter(|(at, _)| *at < meeting.scheduled_at)
                        .max_by_key(|(at, _)| *at)
                });
                match source.and_then(|(_, closer_id)| index.get(closer_id)) {
                    Some(&i) => rows[i].counters.follow_on += 1,
                    None => warnings.push(Warning::missing_linkage(
                        meeting.id,
                        format!("no earlier {} closer found for deal {deal}", input.meeting_type),
                    )),
                }
            }
        }
    }
}

fn meeting_deals(meeting: &Meeting) -> BTreeSet<Uuid> {
    meeting
        .attendees
        .iter()
        .filter(|a| a.holds_seat())
        .filter_map(|a| a.deal_id)
        .chain(meeting.deal_id)
        .collect()
}

fn fallback_row(closer_id: Uuid) -> CloserMetricRow {
    CloserMetricRow {
        closer_id,
        closer_name: UNKNOWN_CLOSER_NAME.to_string(),
        active: false,
        configured: false,
        counters: CloserCounters::default(),
        lead_quota: 0,
        quota_attainment: 0.0,
        ranks: CloserRanks::default(),
    }
}

/// Mean over closers with configured availability, idle ones included.
fn team_average(rows: &[CloserMetricRow]) -> TeamAverages {
    let counted: Vec<&CloserCounters> = rows
        .iter()
        .filter(|r| r.configured)
        .map(|r| &r.counters)
        .collect();
    if counted.is_empty() {
        return TeamAverages::default();
    }
    let n = counted.len() as f64;
    let mean = |f: fn(&CloserCounters) -> u32| {
        counted.iter().map(|c| f64::from(f(c))).sum::<f64>() / n
    };
    TeamAverages {
        closers_counted: counted.len() as u32,
        scheduled: mean(|c| c.scheduled),
        realized: mean(|c| c.realized),
        no_show: mean(|c| c.no_show),
        contract_paid: mean(|c| c.contract_paid),
        follow_on: mean(|c| c.follow_on),
    }
}

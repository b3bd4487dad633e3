use chrono::NaiveDateTime;
use std::collections::HashMap;

use crate::types::{Event, EventStatus, ReservationRecord};

/// Pairs every departure with the arrival that opened it.
///
/// When a user has several arrivals, the latest one at or before the
/// departure wins. Departures without such an arrival, or without a booked
/// end, are dropped. Output follows departure order in `events`.
pub fn join(events: &[Event]) -> Vec<ReservationRecord> {
    let mut arrivals: HashMap<&str, Vec<NaiveDateTime>> = HashMap::new();
    for ev in events.iter().filter(|e| e.status == EventStatus::Occupied) {
        arrivals.entry(ev.user_id.as_str()).or_default().push(ev.timestamp);
    }
    for times in arrivals.values_mut() {
        times.sort_unstable();
    }

    let mut records = Vec::new();
    let mut unmatched = 0usize;
    let mut no_booked_end = 0usize;

    for dep in events.iter().filter(|e| e.status == EventStatus::Free) {
        let Some(booked_end) = dep.booked_end else {
            no_booked_end += 1;
            continue;
        };
        let arrival = arrivals.get(dep.user_id.as_str()).and_then(|times| {
            let idx = times.partition_point(|t| *t <= dep.timestamp);
            idx.checked_sub(1).map(|i| times[i])
        });
        match arrival {
            Some(arrival_time) => records.push(ReservationRecord {
                user_id: dep.user_id.clone(),
                arrival_time,
                booked_end,
                actual_departure: dep.timestamp,
            }),
            None => unmatched += 1,
        }
    }

    if unmatched > 0 || no_booked_end > 0 {
        tracing::warn!(
            "dropped departures: {} without a preceding arrival, {} without booked_end",
            unmatched,
            no_booked_end
        );
    }
    tracing::debug!("joined {} reservation records", records.len());
    records
}

//! Calendar dates of a training session from its start date, format and weekday.

use chrono::{Datelike, Days, NaiveDate, Weekday};
use db::models::planning::{FormationFormat, PlanningSchedule};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormationDateError {
    #[error("weekday must be between 0 (Monday) and 6 (Sunday), got {0}")]
    InvalidWeekday(u8),
    #[error("session dates fall outside the supported calendar range")]
    OutOfRange,
}

pub fn parse_weekday(value: u8) -> Result<Weekday, FormationDateError> {
    match value {
        0 => Ok(Weekday::Mon),
        1 => Ok(Weekday::Tue),
        2 => Ok(Weekday::Wed),
        3 => Ok(Weekday::Thu),
        4 => Ok(Weekday::Fri),
        5 => Ok(Weekday::Sat),
        6 => Ok(Weekday::Sun),
        other => Err(FormationDateError::InvalidWeekday(other)),
    }
}

/// Day offsets from the first session day
fn offsets(format: FormationFormat) -> &'static [u64] {
    match format {
        FormationFormat::SingleWeek => &[0],
        FormationFormat::Monthly => &[0, 7, 14, 21],
        FormationFormat::TwoDays => &[0, 1],
    }
}

pub fn session_count(format: FormationFormat) -> usize {
    offsets(format).len()
}

/// First date on or after `start` that falls on `weekday`.
pub fn first_occurrence(start: NaiveDate, weekday: Weekday) -> Result<NaiveDate, FormationDateError> {
    let wanted = weekday.num_days_from_monday();
    let current = start.weekday().num_days_from_monday();
    let ahead = (7 + wanted - current) % 7;
    start
        .checked_add_days(Days::new(u64::from(ahead)))
        .ok_or(FormationDateError::OutOfRange)
}

pub fn compute_session_dates(
    start: NaiveDate,
    format: FormationFormat,
    weekday: Weekday,
) -> Result<Vec<NaiveDate>, FormationDateError> {
    let anchor = first_occurrence(start, weekday)?;
    offsets(format)
        .iter()
        .map(|offset| {
            anchor
                .checked_add_days(Days::new(*offset))
                .ok_or(FormationDateError::OutOfRange)
        })
        .collect()
}

/// Full schedule of a planning row. The stored start date is the first
/// session day, which may be later than the requested `start`.
pub fn schedule(
    start: NaiveDate,
    format: FormationFormat,
    weekday: u8,
) -> Result<PlanningSchedule, FormationDateError> {
    let dates = compute_session_dates(start, format, parse_weekday(weekday)?)?;
    let (Some(first), Some(last)) = (dates.first().copied(), dates.last().copied()) else {
        return Err(FormationDateError::OutOfRange);
    };

    Ok(PlanningSchedule {
        format,
        weekday,
        start_date: first,
        end_date: last,
        session_dates: dates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn first_occurrence_keeps_matching_start() {
        // 2025-03-03 is a Monday
        assert_eq!(first_occurrence(date(2025, 3, 3), Weekday::Mon).unwrap(), date(2025, 3, 3));
        assert_eq!(first_occurrence(date(2025, 3, 5), Weekday::Mon).unwrap(), date(2025, 3, 10));
        assert_eq!(first_occurrence(date(2025, 3, 5), Weekday::Sat).unwrap(), date(2025, 3, 8));
    }

    #[test]
    fn single_week_yields_one_date() {
        let dates = compute_session_dates(date(2025, 3, 5), FormationFormat::SingleWeek, Weekday::Thu)
            .unwrap();
        assert_eq!(dates, vec![date(2025, 3, 6)]);
    }

    #[test]
    fn monthly_yields_four_weekly_dates() {
        let dates =
            compute_session_dates(date(2025, 3, 5), FormationFormat::Monthly, Weekday::Mon).unwrap();
        assert_eq!(
            dates,
            vec![date(2025, 3, 10), date(2025, 3, 17), date(2025, 3, 24), date(2025, 3, 31)]
        );
    }

    #[test]
    fn two_days_are_consecutive() {
        let dates =
            compute_session_dates(date(2025, 3, 3), FormationFormat::TwoDays, Weekday::Sat).unwrap();
        assert_eq!(dates, vec![date(2025, 3, 8), date(2025, 3, 9)]);
    }

    #[test]
    fn monthly_crosses_year_boundary() {
        let sched = schedule(date(2025, 12, 29), FormationFormat::Monthly, 2).unwrap();
        assert_eq!(sched.start_date, date(2025, 12, 31));
        assert_eq!(sched.end_date, date(2026, 1, 21));
        assert_eq!(sched.session_dates.len(), session_count(FormationFormat::Monthly));
    }

    #[test]
    fn two_days_wrap_into_next_month() {
        let sched = schedule(date(2025, 5, 31), FormationFormat::TwoDays, 5).unwrap();
        assert_eq!(sched.session_dates, vec![date(2025, 5, 31), date(2025, 6, 1)]);
    }

    #[test]
    fn rejects_invalid_weekday() {
        let err = schedule(date(2025, 3, 3), FormationFormat::SingleWeek, 7).unwrap_err();
        assert_eq!(err, FormationDateError::InvalidWeekday(7));
    }
}

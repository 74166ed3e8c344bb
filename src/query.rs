//! The line-oriented query dispatcher: canned REPORT syntax, falling
//! through to the generic SQL evaluator.

use std::io::Write;

use chrono::{Local, NaiveDateTime, TimeZone, Utc};

use crate::error::ReportArityError;
use crate::store::Store;

const REPORT_PREFIX_LEN: usize = "REPORTX".len();

enum Report {
    One,
    Two,
    Three,
}

fn classify(line: &str) -> Option<(Report, &str)> {
    // `line` is arbitrary UTF-8 from the query socket, so byte index
    // REPORT_PREFIX_LEN may fall inside a multi-byte character; only
    // split there once it's confirmed to be a char boundary.
    let head = line.get(..REPORT_PREFIX_LEN)?;
    let rest = &line[REPORT_PREFIX_LEN..];
    let report = match head.to_ascii_uppercase().as_str() {
        "REPORT1" => Report::One,
        "REPORT2" => Report::Two,
        "REPORT3" => Report::Three,
        _ => return None,
    };
    Some((report, rest))
}

/// Parses `lat1 lat2 long1 long2`, tolerating any leading whitespace
/// and trailing tokens, mirroring the reference `sscanf` call.
fn parse_rect(rest: &str) -> Option<(f64, f64, f64, f64)> {
    let mut nums = rest.split_whitespace().map(str::parse::<f64>);
    let lat1 = nums.next()?.ok()?;
    let lat2 = nums.next()?.ok()?;
    let long1 = nums.next()?.ok()?;
    let long2 = nums.next()?.ok()?;
    Some((lat1, lat2, long1, long2))
}

/// Parses an optional `REPORT3` timestamp: `YYYY-MM-DD HH:MM:SS` in
/// local time, quotes stripped, converted to UTC seconds. An absent
/// timestamp substitutes the current UTC time.
fn parse_report3_time(rest: &str) -> Option<i64> {
    let rest = rest.trim();
    if rest.is_empty() {
        return Some(Utc::now().timestamp());
    }
    let stripped = rest.trim_matches(|c| c == '\'' || c == '"');
    let naive = NaiveDateTime::parse_from_str(stripped, "%Y-%m-%d %H:%M:%S").ok()?;
    let local = Local.from_local_datetime(&naive).single()?;
    Some(local.with_timezone(&Utc).timestamp())
}

fn write_error(sink: &mut impl Write, msg: &str) {
    let _ = write!(sink, "error: {msg}\n");
}

/// Dispatches one newline-stripped query line against `store`,
/// streaming its result (or error) to `sink`.
pub fn dispatch(store: &Store, line: &str, sink: &mut impl Write) {
    match classify(line) {
        Some((Report::One, rest)) => match parse_rect(rest) {
            Some((lat1, lat2, long1, long2)) => {
                if let Err(e) = store.report1(lat1, lat2, long1, long2, sink) {
                    write_error(sink, &e.to_string());
                }
            }
            None => write_error(sink, &ReportArityError { report: 1 }.to_string()),
        },
        Some((Report::Two, rest)) => match parse_rect(rest) {
            Some((lat1, lat2, long1, long2)) => {
                if let Err(e) = store.report2(lat1, lat2, long1, long2, sink) {
                    write_error(sink, &e.to_string());
                }
            }
            None => write_error(sink, &ReportArityError { report: 2 }.to_string()),
        },
        Some((Report::Three, rest)) => match parse_report3_time(rest) {
            Some(t) => {
                if let Err(e) = store.report3(t, sink) {
                    write_error(sink, &e.to_string());
                }
            }
            None => write_error(sink, "REPORT3 takes an optional 'YYYY-MM-DD HH:MM:SS' timestamp"),
        },
        None => {
            if let Err(e) = store.run_sql(line, sink) {
                write_error(sink, &e.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(store: &Store, line: &str) -> String {
        let mut out = Vec::new();
        dispatch(store, line, &mut out);
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn report1_bad_arity_emits_error_line() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(
            run(&store, "REPORT1 1 2 3"),
            "error: REPORT1 takes lat1, lat2, long1, long2\n"
        );
    }

    #[test]
    fn generic_sql_is_case_and_prefix_insensitive_to_reports() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(run(&store, "SELECT 1+1"), "2\n");
    }

    #[test]
    fn unknown_sql_surfaces_as_error_line() {
        let store = Store::open_in_memory().unwrap();
        assert!(run(&store, "SELECT foo FROM bar").starts_with("error: "));
    }

    #[test]
    fn multibyte_line_straddling_prefix_boundary_does_not_panic() {
        let store = Store::open_in_memory().unwrap();
        // 6 ASCII bytes then a 3-byte CJK character spanning bytes 6-8,
        // so byte offset 7 (REPORT_PREFIX_LEN) falls mid-character.
        let line = "aaaaaa\u{8a9e}";
        assert!(classify(line).is_none());
        assert!(run(&store, line).starts_with("error: "));
    }

    #[test]
    fn report3_with_no_timestamp_uses_now() {
        let store = Store::open_in_memory().unwrap();
        store
            .add_tripdata(1, 0.0, 0.0, crate::store::EventKind::Begin, 0)
            .unwrap();
        assert_eq!(run(&store, "REPORT3"), "1\n");
    }

    #[test]
    fn report3_future_timestamp_after_completed_trip_is_zero() {
        let store = Store::open_in_memory().unwrap();
        store
            .add_tripdata(1, -122.27, 37.45, crate::store::EventKind::Begin, 0)
            .unwrap();
        store
            .add_tripdata(1, -122.26, 37.46, crate::store::EventKind::End, 1200)
            .unwrap();
        assert_eq!(run(&store, "REPORT3 '2099-01-01 00:00:00'"), "0\n");
    }
}

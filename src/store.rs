//! The in-memory relational store: schema, prepared statements, and
//! row insertion/summary maintenance.
//!
//! Backed by an embedded SQLite engine over `:memory:`, the direct
//! idiomatic-Rust analogue of the reference implementation's
//! `sqlite3_open(":memory:")`/`sqlite3_prepare_v2` pair. `rusqlite`'s
//! statement cache (`prepare_cached`) stands in for the reference's
//! hand-maintained `PreparedStatementCache` struct.

use std::io::Write;

use chrono::Utc;
use rusqlite::{params, types::ValueRef, Connection, Rows};

use crate::error::StoreError;

const DDL: &str = "
    CREATE TABLE triplog(
        id INTEGER,
        long REAL,
        lat REAL,
        type INTEGER,
        fare_cents INTEGER DEFAULT 0
    );
    CREATE INDEX lat_long_idx ON triplog(lat, long, type, id, fare_cents);
    CREATE INDEX type_idx ON triplog(id, type);
    CREATE TABLE tripsummary(
        id INTEGER,
        begin INTEGER,
        end INTEGER
    );
    CREATE INDEX summary_id_idx ON tripsummary(id);
    CREATE INDEX summary_time_idx ON tripsummary(begin, end, id);
";

const INSERT_TRIPLOG: &str = "INSERT INTO triplog VALUES (?1, ?2, ?3, ?4, ?5)";
const INSERT_SUMMARY: &str = "INSERT INTO tripsummary VALUES (?1, ?2, NULL)";
const UPDATE_SUMMARY: &str = "UPDATE tripsummary SET end = ?1 WHERE id = ?2";

const REPORT1_SQL: &str =
    "SELECT COUNT(DISTINCT id) FROM triplog WHERE lat BETWEEN ?1 AND ?2 AND long BETWEEN ?3 AND ?4";
const REPORT2_SQL: &str = "SELECT COUNT(DISTINCT id), SUM(fare_cents) FROM triplog \
     WHERE lat BETWEEN ?1 AND ?2 AND long BETWEEN ?3 AND ?4 AND (type = 0 OR type = 2)";
const REPORT3_SQL: &str =
    "SELECT COUNT(DISTINCT id) FROM tripsummary WHERE begin <= ?1 AND (end IS NULL OR end >= ?2)";

/// `triplog.type` discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Begin = 0,
    Transit = 1,
    End = 2,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(StoreError::Open)?;
        conn.execute_batch(DDL).map_err(StoreError::Open)?;
        conn.set_prepared_statement_cache_capacity(8);
        Ok(Self { conn })
    }

    /// Inserts one `triplog` row; on BEGIN additionally inserts a
    /// `tripsummary` row, on END additionally marks that row's end
    /// time. A failure in the summary maintenance step does not roll
    /// back the triplog insert that already happened.
    pub fn add_tripdata(
        &self,
        id: i32,
        lng: f32,
        lat: f32,
        kind: EventKind,
        cents: i32,
    ) -> Result<(), StoreError> {
        {
            let mut stmt = self
                .conn
                .prepare_cached(INSERT_TRIPLOG)
                .map_err(StoreError::Bind)?;
            stmt.execute(params![id, lng as f64, lat as f64, kind as i32, cents])
                .map_err(StoreError::Step)?;
        }

        match kind {
            EventKind::Begin => {
                let now = Utc::now().timestamp();
                let mut stmt = self
                    .conn
                    .prepare_cached(INSERT_SUMMARY)
                    .map_err(StoreError::Bind)?;
                stmt.execute(params![id, now]).map_err(StoreError::Step)?;
            }
            EventKind::End => {
                let now = Utc::now().timestamp();
                let mut stmt = self
                    .conn
                    .prepare_cached(UPDATE_SUMMARY)
                    .map_err(StoreError::Bind)?;
                stmt.execute(params![now, id]).map_err(StoreError::Step)?;
            }
            EventKind::Transit => {}
        }
        Ok(())
    }

    /// REPORT1: count of distinct trip ids with at least one row in
    /// the rectangle.
    pub fn report1(
        &self,
        lat1: f64,
        lat2: f64,
        long1: f64,
        long2: f64,
        sink: &mut impl Write,
    ) -> Result<(), StoreError> {
        let (lat1, lat2) = order(lat1, lat2);
        let (long1, long2) = order(long1, long2);
        let mut stmt = self
            .conn
            .prepare_cached(REPORT1_SQL)
            .map_err(StoreError::Bind)?;
        let rows = stmt
            .query(params![lat1, lat2, long1, long2])
            .map_err(StoreError::Step)?;
        stream_rows(rows, sink).map_err(StoreError::Step)
    }

    /// REPORT2: count of distinct ids and fare sum for BEGIN/END rows
    /// in the rectangle.
    pub fn report2(
        &self,
        lat1: f64,
        lat2: f64,
        long1: f64,
        long2: f64,
        sink: &mut impl Write,
    ) -> Result<(), StoreError> {
        let (lat1, lat2) = order(lat1, lat2);
        let (long1, long2) = order(long1, long2);
        let mut stmt = self
            .conn
            .prepare_cached(REPORT2_SQL)
            .map_err(StoreError::Bind)?;
        let rows = stmt
            .query(params![lat1, lat2, long1, long2])
            .map_err(StoreError::Step)?;
        stream_rows(rows, sink).map_err(StoreError::Step)
    }

    /// REPORT3: count of trips active at instant `t` (UTC seconds).
    pub fn report3(&self, t: i64, sink: &mut impl Write) -> Result<(), StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached(REPORT3_SQL)
            .map_err(StoreError::Bind)?;
        let rows = stmt.query(params![t, t]).map_err(StoreError::Step)?;
        stream_rows(rows, sink).map_err(StoreError::Step)
    }

    /// The generic SQL fallback: whatever the client sent, verbatim.
    /// `Connection::prepare` only compiles the first semicolon-delimited
    /// statement in `text` and silently drops the rest, unlike
    /// `sqlite3_exec`, which runs every statement in the string and
    /// streams rows from each via its row callback. Split and run each
    /// statement in turn so a multi-statement query line behaves the
    /// same way.
    pub fn run_sql(&self, text: &str, sink: &mut impl Write) -> Result<(), rusqlite::Error> {
        for stmt_text in split_statements(text) {
            let mut stmt = self.conn.prepare(stmt_text)?;
            let rows = stmt.query([])?;
            stream_rows(rows, sink)?;
        }
        Ok(())
    }
}

/// Splits `text` on top-level `;` statement separators, the way
/// SQLite's own tokenizer would before `sqlite3_exec` prepares and
/// steps each statement in turn. Semicolons inside string/identifier
/// literals or comments don't split. Empty statements (stray
/// semicolons, trailing whitespace) are dropped.
fn split_statements(text: &str) -> Vec<&str> {
    #[derive(PartialEq)]
    enum Mode {
        Normal,
        Single,
        Double,
        Backtick,
        Bracket,
        LineComment,
        BlockComment,
    }

    let mut out = Vec::new();
    let mut mode = Mode::Normal;
    let mut start = 0;
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        match mode {
            Mode::Normal => match c {
                b';' => {
                    let stmt = text[start..i].trim();
                    if !stmt.is_empty() {
                        out.push(stmt);
                    }
                    start = i + 1;
                }
                b'\'' => mode = Mode::Single,
                b'"' => mode = Mode::Double,
                b'`' => mode = Mode::Backtick,
                b'[' => mode = Mode::Bracket,
                b'-' if bytes.get(i + 1) == Some(&b'-') => mode = Mode::LineComment,
                b'/' if bytes.get(i + 1) == Some(&b'*') => mode = Mode::BlockComment,
                _ => {}
            },
            Mode::Single => {
                if c == b'\'' {
                    if bytes.get(i + 1) == Some(&b'\'') {
                        i += 1;
                    } else {
                        mode = Mode::Normal;
                    }
                }
            }
            Mode::Double => {
                if c == b'"' {
                    if bytes.get(i + 1) == Some(&b'"') {
                        i += 1;
                    } else {
                        mode = Mode::Normal;
                    }
                }
            }
            Mode::Backtick => {
                if c == b'`' {
                    mode = Mode::Normal;
                }
            }
            Mode::Bracket => {
                if c == b']' {
                    mode = Mode::Normal;
                }
            }
            Mode::LineComment => {
                if c == b'\n' {
                    mode = Mode::Normal;
                }
            }
            Mode::BlockComment => {
                if c == b'*' && bytes.get(i + 1) == Some(&b'/') {
                    i += 1;
                    mode = Mode::Normal;
                }
            }
        }
        i += 1;
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

fn order(a: f64, b: f64) -> (f64, f64) {
    if a > b {
        (b, a)
    } else {
        (a, b)
    }
}

/// Serializes every row as space-separated column text, `NULL`
/// literal for null cells, one row per line.
fn stream_rows(mut rows: Rows<'_>, sink: &mut impl Write) -> rusqlite::Result<()> {
    while let Some(row) = rows.next()? {
        let stmt = row.as_ref();
        for i in 0..stmt.column_count() {
            if i != 0 {
                let _ = sink.write_all(b" ");
            }
            match row.get_ref(i)? {
                ValueRef::Null => {
                    let _ = sink.write_all(b"NULL");
                }
                ValueRef::Integer(v) => {
                    let _ = write!(sink, "{v}");
                }
                ValueRef::Real(v) => {
                    let _ = write!(sink, "{v}");
                }
                ValueRef::Text(t) => {
                    let _ = sink.write_all(t);
                }
                ValueRef::Blob(b) => {
                    let _ = sink.write_all(b);
                }
            }
        }
        let _ = sink.write_all(b"\n");
    }
    Ok(())
}

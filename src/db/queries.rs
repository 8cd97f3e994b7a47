use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// An appointment row. Times are stored in UTC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppointmentRow {
    pub id: String,
    pub summary: String,
    pub description: String,
    pub phone: Option<String>,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
}

fn fmt(dt: &NaiveDateTime) -> String {
    dt.format(TIME_FORMAT).to_string()
}

fn parse(s: &str, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIME_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_appointment(row: &Row<'_>) -> rusqlite::Result<AppointmentRow> {
    let start_str: String = row.get(4)?;
    let end_str: String = row.get(5)?;
    Ok(AppointmentRow {
        id: row.get(0)?,
        summary: row.get(1)?,
        description: row.get(2)?,
        phone: row.get(3)?,
        start_at: parse(&start_str, 4)?,
        end_at: parse(&end_str, 5)?,
    })
}

const COLUMNS: &str = "id, summary, description, phone, start_at, end_at";

// ── Appointments ──

pub fn insert_appointment(conn: &Connection, appt: &AppointmentRow) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO appointments (id, summary, description, phone, start_at, end_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            appt.id,
            appt.summary,
            appt.description,
            appt.phone,
            fmt(&appt.start_at),
            fmt(&appt.end_at),
        ],
    )?;
    Ok(())
}

/// Appointments overlapping `[from, until)`.
pub fn get_overlapping(
    conn: &Connection,
    from: &NaiveDateTime,
    until: &NaiveDateTime,
) -> anyhow::Result<Vec<AppointmentRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM appointments WHERE start_at < ?2 AND end_at > ?1 ORDER BY start_at"
    ))?;
    let rows = stmt
        .query_map(params![fmt(from), fmt(until)], row_to_appointment)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Appointments whose start falls within `[from, until]`.
pub fn get_starting_between(
    conn: &Connection,
    from: &NaiveDateTime,
    until: &NaiveDateTime,
) -> anyhow::Result<Vec<AppointmentRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM appointments WHERE start_at >= ?1 AND start_at <= ?2 ORDER BY start_at"
    ))?;
    let rows = stmt
        .query_map(params![fmt(from), fmt(until)], row_to_appointment)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_next_for_phone(
    conn: &Connection,
    phone: &str,
    now: &NaiveDateTime,
) -> anyhow::Result<Option<AppointmentRow>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM appointments WHERE phone = ?1 AND start_at >= ?2 ORDER BY start_at LIMIT 1"
            ),
            params![phone, fmt(now)],
            row_to_appointment,
        )
        .optional()?;
    Ok(row)
}

pub fn delete_appointment(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let rows = conn.execute("DELETE FROM appointments WHERE id = ?1", params![id])?;
    Ok(rows > 0)
}

pub fn move_appointment(
    conn: &Connection,
    id: &str,
    start_at: &NaiveDateTime,
    end_at: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let rows = conn.execute(
        "UPDATE appointments SET start_at = ?1, end_at = ?2, updated_at = datetime('now') WHERE id = ?3",
        params![fmt(start_at), fmt(end_at), id],
    )?;
    Ok(rows > 0)
}

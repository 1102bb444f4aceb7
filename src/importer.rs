/// Row types and the day query for the Messages database (`~/Library/Messages/chat.db`).
///
/// Tables involved (only the columns read here):
/// ```sql
/// CREATE TABLE handle (ROWID INTEGER PRIMARY KEY, id TEXT NOT NULL);
/// CREATE TABLE message (
///     ROWID     INTEGER PRIMARY KEY,
///     handle_id INTEGER,
///     text      TEXT,
///     date      INTEGER   -- nanoseconds since 2001-01-01T00:00:00Z
/// );
/// CREATE TABLE attachment (ROWID INTEGER PRIMARY KEY, filename TEXT, mime_type TEXT);
/// CREATE TABLE message_attachment_join (message_id INTEGER, attachment_id INTEGER);
/// ```
///
/// A message with several attachments yields one row per attachment, all sharing
/// the message's text and timestamp.
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use eyre::{Context, Result, eyre};
use rusqlite::{Connection, params};

/// Seconds between the Unix epoch and 2001-01-01T00:00:00Z.
pub const APPLE_EPOCH_OFFSET: i64 = 978_307_200;

const NANOS_PER_SECOND: i64 = 1_000_000_000;

const DAY_QUERY: &str = "
SELECT
    message.date,
    handle.id,
    message.text,
    attachment.filename,
    attachment.mime_type
FROM message
JOIN handle ON message.handle_id = handle.ROWID
LEFT JOIN message_attachment_join ON message.ROWID = message_attachment_join.message_id
LEFT JOIN attachment ON attachment.ROWID = message_attachment_join.attachment_id
WHERE handle.id = ?1 AND message.date >= ?2 AND message.date < ?3
ORDER BY message.date ASC, message.ROWID ASC";

/// Reference to an attachment as stored in the `attachment` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRef {
    /// Raw path, usually prefixed with `~/Library/Messages/Attachments/`.
    pub path: String,
    pub mime_type: Option<String>,
}

/// One row of the day query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRow {
    /// Local wall-clock time, whole seconds.
    pub timestamp: NaiveDateTime,
    pub sender: String,
    pub text: Option<String>,
    pub attachment: Option<AttachmentRef>,
}

/// Convert a local wall-clock time to the `message.date` representation.
///
/// Ambiguous times (DST fall-back) resolve to the earlier instant; times inside a
/// DST gap have no representation and return `None`.
pub fn to_apple_nanos(local: NaiveDateTime) -> Option<i64> {
    let instant = Local.from_local_datetime(&local).earliest()?;
    (instant.timestamp() - APPLE_EPOCH_OFFSET).checked_mul(NANOS_PER_SECOND)
}

/// Convert a `message.date` value to local wall-clock time, truncated to seconds.
pub fn from_apple_nanos(nanos: i64) -> Option<NaiveDateTime> {
    let unix = nanos / NANOS_PER_SECOND + APPLE_EPOCH_OFFSET;
    let utc = DateTime::from_timestamp(unix, 0)?;
    Some(utc.with_timezone(&Local).naive_local())
}

/// First instant of `date` in local time, as `message.date` nanoseconds.
fn day_start_nanos(date: NaiveDate) -> Result<i64> {
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| eyre!("Invalid date: {}", date))?;
    // A DST switch at midnight skips 00:00; the day then starts at the first valid hour.
    (0..3)
        .find_map(|h| to_apple_nanos(midnight + chrono::Duration::hours(h)))
        .ok_or_else(|| eyre!("Cannot represent local midnight of {}", date))
}

/// `[start, end)` range of `message.date` values covering one local calendar day.
pub fn day_bounds(date: NaiveDate) -> Result<(i64, i64)> {
    let next = date
        .succ_opt()
        .ok_or_else(|| eyre!("Date out of range: {}", date))?;
    Ok((day_start_nanos(date)?, day_start_nanos(next)?))
}

/// All rows exchanged with `contact` on the local calendar day `date`, oldest first.
pub fn fetch_day(conn: &Connection, contact: &str, date: NaiveDate) -> Result<Vec<MessageRow>> {
    let (start, end) = day_bounds(date)?;

    let mut stmt = conn
        .prepare(DAY_QUERY)
        .wrap_err("Failed to prepare message query")?;

    let raw = stmt
        .query_map(params![contact, start, end], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })
        .wrap_err("Failed to execute message query")?
        .collect::<Result<Vec<_>, _>>()
        .wrap_err("Failed to read message rows")?;

    raw.into_iter()
        .map(|(date, sender, text, filename, mime_type)| {
            let timestamp = from_apple_nanos(date)
                .ok_or_else(|| eyre!("Message date out of range: {}", date))?;
            let attachment = filename
                .filter(|f| !f.is_empty())
                .map(|path| AttachmentRef { path, mime_type });
            Ok(MessageRow {
                timestamp,
                sender,
                text,
                attachment,
            })
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SCHEMA: &str = "
        CREATE TABLE handle (ROWID INTEGER PRIMARY KEY, id TEXT NOT NULL);
        CREATE TABLE message (
            ROWID INTEGER PRIMARY KEY,
            handle_id INTEGER,
            text TEXT,
            date INTEGER
        );
        CREATE TABLE attachment (ROWID INTEGER PRIMARY KEY, filename TEXT, mime_type TEXT);
        CREATE TABLE message_attachment_join (message_id INTEGER, attachment_id INTEGER);
    ";

    fn at(date: NaiveDate, h: u32, m: u32, s: u32) -> NaiveDateTime {
        date.and_hms_opt(h, m, s).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn insert_message(
        conn: &Connection,
        handle: i64,
        text: Option<&str>,
        when: NaiveDateTime,
    ) -> i64 {
        conn.execute(
            "INSERT INTO message (handle_id, text, date) VALUES (?1, ?2, ?3)",
            params![handle, text, to_apple_nanos(when).unwrap()],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    fn attach(conn: &Connection, message: i64, filename: &str, mime: &str) {
        conn.execute(
            "INSERT INTO attachment (filename, mime_type) VALUES (?1, ?2)",
            params![filename, mime],
        )
        .unwrap();
        let attachment = conn.last_insert_rowid();
        conn.execute(
            "INSERT INTO message_attachment_join (message_id, attachment_id) VALUES (?1, ?2)",
            params![message, attachment],
        )
        .unwrap();
    }

    fn seeded() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute_batch(
            "INSERT INTO handle (ROWID, id) VALUES (1, '+15555550100'), (2, 'other@example.com');",
        )
        .unwrap();
        conn
    }

    #[test]
    fn apple_nanos_conversion_is_symmetric_at_second_precision() {
        let when = at(day(), 14, 0, 5);
        let nanos = to_apple_nanos(when).unwrap();
        assert_eq!(from_apple_nanos(nanos), Some(when));
        assert_eq!(from_apple_nanos(nanos + 999_999_999), Some(when));
    }

    #[test]
    fn fetch_day_filters_contact_and_day() {
        let conn = seeded();
        insert_message(&conn, 1, Some("before"), at(day().pred_opt().unwrap(), 23, 59, 59));
        insert_message(&conn, 1, Some("first"), at(day(), 0, 0, 0));
        insert_message(&conn, 2, Some("someone else"), at(day(), 9, 0, 0));
        insert_message(&conn, 1, Some("last"), at(day(), 23, 59, 59));
        insert_message(&conn, 1, Some("after"), at(day().succ_opt().unwrap(), 0, 0, 0));

        let rows = fetch_day(&conn, "+15555550100", day()).unwrap();
        let texts: Vec<_> = rows.iter().map(|r| r.text.as_deref().unwrap()).collect();
        assert_eq!(texts, ["first", "last"]);
        assert!(rows.iter().all(|r| r.sender == "+15555550100"));
        assert_eq!(rows[1].timestamp, at(day(), 23, 59, 59));
    }

    #[test]
    fn fetch_day_joins_attachments() {
        let conn = seeded();
        let id = insert_message(&conn, 1, None, at(day(), 14, 0, 5));
        attach(
            &conn,
            id,
            "~/Library/Messages/Attachments/ab/01/photo.heic",
            "image/heic",
        );
        insert_message(&conn, 1, Some("no attachment"), at(day(), 14, 1, 0));

        let rows = fetch_day(&conn, "+15555550100", day()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0].attachment,
            Some(AttachmentRef {
                path: "~/Library/Messages/Attachments/ab/01/photo.heic".into(),
                mime_type: Some("image/heic".into()),
            })
        );
        assert_eq!(rows[0].text, None);
        assert_eq!(rows[1].attachment, None);
    }

    #[test]
    fn fetch_day_fails_without_schema() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(fetch_day(&conn, "+15555550100", day()).is_err());
    }
}

//! Yearly ticket number sequence.
//!
//! A single row holds `(year, last_value)`. Callers must hold the database
//! write lock (an IMMEDIATE transaction) while allocating, which serializes
//! allocation across every connection and process sharing the file.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use super::{TicketError, TicketSequence};

/// Render a ticket number, zero-padding the counter to four digits.
///
/// Counters past 9999 simply widen.
pub fn format_ticket_number(year: i32, value: i64) -> String {
    format!("TKT-{}-{:04}", year, value)
}

/// Seed the singleton row if it does not exist yet.
pub(crate) fn bootstrap(conn: &Connection, year: i32) -> Result<(), TicketError> {
    conn.execute(
        "INSERT OR IGNORE INTO ticket_sequence (id, year, last_value) VALUES (1, ?1, 0)",
        params![year],
    )?;
    Ok(())
}

pub(crate) fn current(conn: &Connection) -> Result<Option<TicketSequence>, TicketError> {
    let sequence = conn
        .query_row(
            "SELECT year, last_value FROM ticket_sequence WHERE id = 1",
            [],
            |row| {
                Ok(TicketSequence {
                    year: row.get(0)?,
                    last_value: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(sequence)
}

/// Advance the counter for `year` and persist it.
///
/// A later year restarts the counter at 1. An earlier year (clock moved
/// backwards) keeps counting in the stored year so no number is reissued,
/// unless nothing has been issued from the stored year yet.
pub(crate) fn allocate(conn: &Connection, year: i32) -> Result<TicketSequence, TicketError> {
    let next = match current(conn)? {
        Some(stored) if stored.last_value > 0 && stored.year == year => TicketSequence {
            year,
            last_value: stored.last_value + 1,
        },
        Some(stored) if stored.last_value > 0 && stored.year > year => {
            warn!(
                stored_year = stored.year,
                clock_year = year,
                "Clock is behind the ticket sequence, continuing stored year"
            );
            TicketSequence {
                year: stored.year,
                last_value: stored.last_value + 1,
            }
        }
        _ => TicketSequence {
            year,
            last_value: 1,
        },
    };

    conn.execute(
        "INSERT INTO ticket_sequence (id, year, last_value) VALUES (1, ?1, ?2)
         ON CONFLICT(id) DO UPDATE SET year = excluded.year, last_value = excluded.last_value",
        params![next.year, next.last_value],
    )?;

    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sequence_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE ticket_sequence (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                year INTEGER NOT NULL,
                last_value INTEGER NOT NULL
            );",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_format_pads_to_four_digits() {
        assert_eq!(format_ticket_number(2026, 1), "TKT-2026-0001");
        assert_eq!(format_ticket_number(2026, 42), "TKT-2026-0042");
        assert_eq!(format_ticket_number(2026, 12345), "TKT-2026-12345");
    }

    #[test]
    fn test_allocate_increments_within_year() {
        let conn = sequence_conn();
        bootstrap(&conn, 2026).unwrap();

        assert_eq!(allocate(&conn, 2026).unwrap().last_value, 1);
        assert_eq!(allocate(&conn, 2026).unwrap().last_value, 2);
        assert_eq!(
            current(&conn).unwrap(),
            Some(TicketSequence {
                year: 2026,
                last_value: 2
            })
        );
    }

    #[test]
    fn test_allocate_rolls_over_on_new_year() {
        let conn = sequence_conn();
        conn.execute(
            "INSERT INTO ticket_sequence (id, year, last_value) VALUES (1, 2025, 17)",
            [],
        )
        .unwrap();

        let next = allocate(&conn, 2026).unwrap();
        assert_eq!(
            next,
            TicketSequence {
                year: 2026,
                last_value: 1
            }
        );
    }

    #[test]
    fn test_allocate_without_row_starts_at_one() {
        let conn = sequence_conn();
        assert_eq!(allocate(&conn, 2026).unwrap().last_value, 1);
    }

    #[test]
    fn test_bootstrap_keeps_existing_row() {
        let conn = sequence_conn();
        bootstrap(&conn, 2026).unwrap();
        allocate(&conn, 2026).unwrap();
        bootstrap(&conn, 2027).unwrap();
        assert_eq!(
            current(&conn).unwrap(),
            Some(TicketSequence {
                year: 2026,
                last_value: 1
            })
        );
    }

    #[test]
    fn test_unused_seed_year_is_replaced() {
        let conn = sequence_conn();
        bootstrap(&conn, 2027).unwrap();
        assert_eq!(
            allocate(&conn, 2026).unwrap(),
            TicketSequence {
                year: 2026,
                last_value: 1
            }
        );
    }

    #[test]
    fn test_clock_behind_keeps_stored_year() {
        let conn = sequence_conn();
        conn.execute(
            "INSERT INTO ticket_sequence (id, year, last_value) VALUES (1, 2027, 3)",
            [],
        )
        .unwrap();

        let next = allocate(&conn, 2026).unwrap();
        assert_eq!(next.year, 2027);
        assert_eq!(next.last_value, 4);
    }
}

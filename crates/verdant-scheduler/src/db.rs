use rusqlite::Connection;

/// Initialise the watering state schema in `conn`.
///
/// One row per schedule entry that has ever completed; safe to call on every
/// startup.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS watering_state (
            schedule_id   TEXT NOT NULL PRIMARY KEY,  -- entry start time, HH:MM
            last_watered  TEXT NOT NULL,              -- local YYYY-MM-DDTHH:MM:SS
            updated_at    TEXT NOT NULL
        ) STRICT;
        ",
    )
}

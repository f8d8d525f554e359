use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

use crate::schema::TABLES;

const SCHEMA_VERSION: i64 = 1;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");

        let mut ddl = String::new();
        for table in TABLES {
            ddl.push_str(&table.create_table_sql());
            ddl.push_str(";\n");
            for index in table.create_index_sql() {
                ddl.push_str(&index);
                ddl.push_str(";\n");
            }
        }
        ddl.push_str("INSERT INTO schema_version (version) VALUES (1);\n");

        conn.execute_batch(&format!("BEGIN;\n{}COMMIT;", ddl))?;
    }

    info!("Database migrations complete (schema v{})", SCHEMA_VERSION);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(versions, 1);

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
                 ('conference', 'conference_participant', 'draft', 'usage_limit', 'usage_counters')",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(tables, 5);
    }
}

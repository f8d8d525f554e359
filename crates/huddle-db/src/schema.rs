//! Static description of every table the sync engine owns.
//!
//! The DDL in [`crate::migrations`] and the generic upsert and UPDATE statements in
//! [`crate::batch`] are both generated from these definitions, so a column only
//! ever has to be declared once. Every table has an implicit `id TEXT PRIMARY KEY`
//! that is not listed in `columns`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    /// Stored as INTEGER 0/1
    Boolean,
    /// Stored as TEXT holding a JSON document
    Json,
}

impl ColumnType {
    fn sql_type(&self) -> &'static str {
        match self {
            Self::Text | Self::Json => "TEXT",
            Self::Integer | Self::Boolean => "INTEGER",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnSchema {
    pub name: &'static str,
    pub kind: ColumnType,
    pub indexed: bool,
    pub optional: bool,
}

impl ColumnSchema {
    pub const fn new(name: &'static str, kind: ColumnType) -> Self {
        Self {
            name,
            kind,
            indexed: false,
            optional: false,
        }
    }

    pub const fn indexed(self) -> Self {
        Self {
            indexed: true,
            ..self
        }
    }

    pub const fn optional(self) -> Self {
        Self {
            optional: true,
            ..self
        }
    }
}

/// `column REFERENCES table(id)`
#[derive(Debug, Clone, Copy)]
pub struct ForeignKey {
    pub column: &'static str,
    pub references: &'static str,
}

#[derive(Debug)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [ColumnSchema],
    pub foreign_keys: &'static [ForeignKey],
    pub checks: &'static [&'static str],
}

impl TableSchema {
    pub fn create_table_sql(&self) -> String {
        let mut defs = vec!["id TEXT PRIMARY KEY".to_string()];

        for column in self.columns {
            let mut def = format!("{} {}", column.name, column.kind.sql_type());
            if !column.optional {
                def.push_str(" NOT NULL");
            }
            if let Some(fk) = self.foreign_keys.iter().find(|fk| fk.column == column.name) {
                def.push_str(&format!(" REFERENCES {}(id)", fk.references));
            }
            defs.push(def);
        }

        for check in self.checks {
            defs.push(format!("CHECK ({})", check));
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            self.name,
            defs.join(",\n    ")
        )
    }

    pub fn create_index_sql(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.indexed)
            .map(|c| {
                format!(
                    "CREATE INDEX IF NOT EXISTS idx_{table}_{column} ON {table}({column})",
                    table = self.name,
                    column = c.name
                )
            })
            .collect()
    }

    /// `id` first, then every column in declaration order. Row decoders rely on
    /// this order.
    pub fn select_sql(&self) -> String {
        let columns: Vec<&str> = self.columns.iter().map(|c| c.name).collect();
        format!("SELECT id, {} FROM {}", columns.join(", "), self.name)
    }

    /// Parameters: `?1` is the id, then one per column. A row that already
    /// exists with that id is overwritten, so the last writer wins.
    pub fn upsert_sql(&self) -> String {
        let columns: Vec<&str> = self.columns.iter().map(|c| c.name).collect();
        let placeholders: Vec<String> = (1..=columns.len() + 1).map(|i| format!("?{}", i)).collect();
        let assignments: Vec<String> = columns
            .iter()
            .map(|c| format!("{c} = excluded.{c}"))
            .collect();
        format!(
            "INSERT INTO {} (id, {}) VALUES ({}) ON CONFLICT(id) DO UPDATE SET {}",
            self.name,
            columns.join(", "),
            placeholders.join(", "),
            assignments.join(", ")
        )
    }

    /// Parameters: one per column, then the id last.
    pub fn update_sql(&self) -> String {
        let assignments: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = ?{}", c.name, i + 1))
            .collect();
        format!(
            "UPDATE {} SET {} WHERE id = ?{}",
            self.name,
            assignments.join(", "),
            self.columns.len() + 1
        )
    }
}

use ColumnType::{Boolean, Integer, Json, Text};

pub static CONFERENCE: TableSchema = TableSchema {
    name: "conference",
    columns: &[
        ColumnSchema::new("url", Text),
        ColumnSchema::new("channel_id", Text).indexed(),
        ColumnSchema::new("team_id", Text).indexed(),
        ColumnSchema::new("user_id", Text).indexed(),
        ColumnSchema::new("create_at", Integer),
        ColumnSchema::new("delete_at", Integer).optional(),
    ],
    foreign_keys: &[],
    checks: &[],
};

// No foreign key on user_id: participants may name users that are not stored
// locally.
pub static CONFERENCE_PARTICIPANT: TableSchema = TableSchema {
    name: "conference_participant",
    columns: &[
        ColumnSchema::new("channel_id", Text).indexed(),
        ColumnSchema::new("conference_id", Text).indexed(),
        ColumnSchema::new("user_id", Text).indexed(),
        ColumnSchema::new("present", Boolean),
        ColumnSchema::new("status", Text),
    ],
    foreign_keys: &[ForeignKey {
        column: "conference_id",
        references: "conference",
    }],
    checks: &["status IN ('approved', 'pending', 'denied')"],
};

pub static DRAFT: TableSchema = TableSchema {
    name: "draft",
    columns: &[
        ColumnSchema::new("create_at", Integer),
        ColumnSchema::new("update_at", Integer),
        ColumnSchema::new("delete_at", Integer),
        ColumnSchema::new("user_id", Text).indexed(),
        ColumnSchema::new("channel_id", Text).indexed(),
        ColumnSchema::new("root_id", Text).indexed(),
        ColumnSchema::new("files", Json),
        ColumnSchema::new("message", Text),
        ColumnSchema::new("props", Json),
        ColumnSchema::new("metadata", Json).optional(),
        ColumnSchema::new("priority", Json).optional(),
        ColumnSchema::new("timestamp", Integer).optional(),
    ],
    foreign_keys: &[],
    checks: &[],
};

/// One row per team, id = team id.
pub static USAGE_LIMIT: TableSchema = TableSchema {
    name: "usage_limit",
    columns: &[
        ColumnSchema::new("boards", Json),
        ColumnSchema::new("bots", Integer),
        ColumnSchema::new("custom_emojis", Integer),
        ColumnSchema::new("files", Json),
        ColumnSchema::new("guests", Integer),
        ColumnSchema::new("incoming_webhooks", Integer),
        ColumnSchema::new("integrations", Json),
        ColumnSchema::new("members", Integer),
        ColumnSchema::new("messages", Json),
        ColumnSchema::new("outgoing_webhooks", Integer),
        ColumnSchema::new("private_channels", Integer),
        ColumnSchema::new("public_channels", Integer),
        ColumnSchema::new("reminder_custom_date", Boolean),
        ColumnSchema::new("scheduled_draft_custom_date", Boolean),
        ColumnSchema::new("sidebar_categories", Integer),
        ColumnSchema::new("storage", Integer),
        ColumnSchema::new("teams", Json),
    ],
    foreign_keys: &[],
    checks: &[],
};

/// One row per team, id = team id.
pub static USAGE_COUNTERS: TableSchema = TableSchema {
    name: "usage_counters",
    columns: &[
        ColumnSchema::new("custom_emojis", Integer),
        ColumnSchema::new("guests", Integer),
        ColumnSchema::new("incoming_webhooks", Integer),
        ColumnSchema::new("members", Integer),
        ColumnSchema::new("outgoing_webhooks", Integer),
        ColumnSchema::new("pending_guests", Integer),
        ColumnSchema::new("private_channels", Integer),
        ColumnSchema::new("public_channels", Integer),
        ColumnSchema::new("sidebar_categories", Integer),
        ColumnSchema::new("storage", Integer),
    ],
    foreign_keys: &[],
    checks: &[],
};

/// Parents before children, the order tables are created in.
pub static TABLES: &[&TableSchema] = &[
    &CONFERENCE,
    &CONFERENCE_PARTICIPANT,
    &DRAFT,
    &USAGE_LIMIT,
    &USAGE_COUNTERS,
];

//! SQL schema for the parts database.
//!
//! Each schema version is one complete DDL script. Every statement is
//! guarded (`IF NOT EXISTS`), so a script can be re-applied to a store that
//! already has some or all of its objects.

/// Config key holding the applied schema version.
pub const VERSION_KEY: &str = "database_version";

/// Reported when no version marker can be read.
pub const UNVERSIONED: &str = "0.0";

/// A named schema version and the DDL that produces it.
#[derive(Debug, Clone, Copy)]
pub struct SchemaVersion {
  pub version: &'static str,
  pub ddl:     &'static str,
}

/// All known schema versions.
pub const VERSIONS: &[SchemaVersion] = &[SchemaVersion { version: "1.0", ddl: SCHEMA_V1 }];

pub const REQUIRED_TABLES: &[&str] = &["parts", "config", "discovery_log"];

pub const REQUIRED_INDEXES: &[&str] = &[
  "idx_parts_composite_key",
  "idx_parts_part_number",
  "idx_parts_active",
  "idx_parts_category",
  "idx_discovery_part_number",
  "idx_discovery_session",
  "idx_discovery_invoice",
  "idx_discovery_date",
];

pub const REQUIRED_TRIGGERS: &[&str] = &["trg_parts_updated_at", "trg_config_updated_at"];

pub const REQUIRED_VIEWS: &[&str] = &["active_parts", "recent_discoveries"];

/// Version 1.0, the bootstrap schema.
const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS parts (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    composite_key      TEXT NOT NULL,
    part_number        TEXT,
    authorized_price   TEXT NOT NULL CHECK (CAST(authorized_price AS REAL) > 0),
    description        TEXT,
    item_type          TEXT,
    category           TEXT,
    source             TEXT NOT NULL DEFAULT 'manual'
                       CHECK (source IN ('manual', 'discovered', 'imported')),
    first_seen_invoice TEXT,
    created_at         TEXT NOT NULL,   -- RFC 3339 UTC
    updated_at         TEXT NOT NULL,
    is_active          INTEGER NOT NULL DEFAULT 1 CHECK (is_active IN (0, 1)),
    notes              TEXT
);

-- Typed settings; `value` is decoded according to `data_type`.
-- Also holds the schema version marker under key 'database_version'.
CREATE TABLE IF NOT EXISTS config (
    key         TEXT PRIMARY KEY,
    value       TEXT NOT NULL DEFAULT '',
    data_type   TEXT NOT NULL DEFAULT 'string'
                CHECK (data_type IN ('string', 'number', 'boolean', 'json')),
    description TEXT,
    category    TEXT NOT NULL DEFAULT 'general',
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

-- Append-only audit trail; rows are only removed by retention purges.
CREATE TABLE IF NOT EXISTS discovery_log (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    part_number           TEXT NOT NULL,
    invoice_number        TEXT,
    invoice_date          TEXT,
    discovered_price      TEXT,
    authorized_price      TEXT,
    action_taken          TEXT NOT NULL
                          CHECK (action_taken IN
                            ('discovered', 'added', 'updated', 'skipped', 'price_mismatch')),
    user_decision         TEXT,
    discovery_date        TEXT NOT NULL,
    processing_session_id TEXT,
    notes                 TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_parts_composite_key ON parts(composite_key);
CREATE INDEX IF NOT EXISTS idx_parts_part_number       ON parts(part_number);
CREATE INDEX IF NOT EXISTS idx_parts_active            ON parts(is_active);
CREATE INDEX IF NOT EXISTS idx_parts_category          ON parts(category);
CREATE INDEX IF NOT EXISTS idx_discovery_part_number   ON discovery_log(part_number);
CREATE INDEX IF NOT EXISTS idx_discovery_session       ON discovery_log(processing_session_id);
CREATE INDEX IF NOT EXISTS idx_discovery_invoice       ON discovery_log(invoice_number);
CREATE INDEX IF NOT EXISTS idx_discovery_date          ON discovery_log(discovery_date);

-- Stamp updated_at when an UPDATE did not set it explicitly.
CREATE TRIGGER IF NOT EXISTS trg_parts_updated_at
AFTER UPDATE ON parts
FOR EACH ROW WHEN NEW.updated_at = OLD.updated_at
BEGIN
    UPDATE parts SET updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = NEW.id;
END;

CREATE TRIGGER IF NOT EXISTS trg_config_updated_at
AFTER UPDATE ON config
FOR EACH ROW WHEN NEW.updated_at = OLD.updated_at
BEGIN
    UPDATE config SET updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE key = NEW.key;
END;

CREATE VIEW IF NOT EXISTS active_parts AS
    SELECT * FROM parts WHERE is_active = 1;

CREATE VIEW IF NOT EXISTS recent_discoveries AS
    SELECT * FROM discovery_log
    WHERE discovery_date >= strftime('%Y-%m-%dT%H:%M:%S', 'now', '-30 days')
    ORDER BY discovery_date DESC;
";

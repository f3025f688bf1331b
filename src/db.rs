use crate::config::Config;
use crate::storage::{TabStorage, tab_key};
use crate::store::{TabId, TabState};
use anyhow::Result;
use libsql::{Builder, Connection, Database as LibsqlDatabase};
use std::path::Path;

const SYSTEM_MIGRATIONS: &[(&str, &str)] =
    &[("system/000_migrations_table.sql", include_str!("migrations/system/000_migrations_table.sql"))];

const MIGRATIONS: &[(&str, &str)] = &[("001_tab_state.sql", include_str!("migrations/001_tab_state.sql"))];

pub struct Database {
    _db: LibsqlDatabase,
    conn: Connection,
}

impl Database {
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    async fn is_migration_applied(conn: &Connection, name: &str) -> Result<bool> {
        let query = "SELECT 1 FROM _migrations WHERE name = ?";
        match conn.query(query, libsql::params![name]).await {
            Ok(mut rows) => Ok(rows.next().await?.is_some()),
            Err(e) => {
                if e.to_string().contains("no such table") {
                    Ok(false)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    async fn record_migration(conn: &Connection, name: &str) -> Result<()> {
        let query = r#"
            INSERT INTO _migrations (name, applied_at)
            VALUES (?, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        "#;
        conn.execute(query, libsql::params![name]).await?;
        Ok(())
    }

    async fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<()> {
        if Self::is_migration_applied(conn, name).await? {
            tracing::debug!("migration {} already applied, skipping", name);
            return Ok(());
        }

        tracing::info!("applying migration: {}", name);
        conn.execute_batch(sql)
            .await
            .map_err(|e| anyhow::anyhow!("failed to execute migration {name}: {e}"))?;

        Self::record_migration(conn, name).await?;
        Ok(())
    }

    pub async fn new(cfg: &Config, data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(cfg.app.get_db());
        tracing::info!(path = ?path, "[db] opening local database");
        let db = Builder::new_local(&path).build().await?;
        Self::setup(db).await
    }

    pub async fn in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        Self::setup(db).await
    }

    async fn setup(db: LibsqlDatabase) -> Result<Self> {
        let conn = db.connect()?;
        conn.query("SELECT 1", ()).await?;

        for (filename, sql) in SYSTEM_MIGRATIONS.iter().chain(MIGRATIONS) {
            Self::run_migration(&conn, filename, sql).await?;
        }

        Ok(Database { _db: db, conn })
    }

    #[cfg(test)]
    async fn tab_keys(&self) -> Result<Vec<String>> {
        let mut rows = self.conn.query("SELECT key FROM tab_state ORDER BY key", ()).await?;
        let mut keys = Vec::new();
        while let Some(row) = rows.next().await? {
            keys.push(row.get::<String>(0)?);
        }
        Ok(keys)
    }
}

impl TabStorage for Database {
    async fn load(&self, tab_id: TabId) -> Result<Option<TabState>> {
        let query = "SELECT data FROM tab_state WHERE key = ?";
        let mut rows = self.conn.query(query, libsql::params![tab_key(tab_id)]).await?;

        if let Some(row) = rows.next().await? {
            let raw: String = row
                .get(0)
                .map_err(|e| anyhow::anyhow!("failed to get data: {e}"))?;
            Ok(Some(serde_json::from_str(&raw)?))
        } else {
            Ok(None)
        }
    }

    async fn save(&self, tab_id: TabId, state: &TabState) -> Result<()> {
        let query = r#"
            INSERT INTO tab_state (key, data, updated_at)
            VALUES (?, ?, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            ON CONFLICT(key) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at
        "#;
        let raw = serde_json::to_string(state)?;
        self.conn
            .execute(query, libsql::params![tab_key(tab_id), raw])
            .await?;
        Ok(())
    }

    async fn remove(&self, tab_id: TabId) -> Result<()> {
        self.conn
            .execute("DELETE FROM tab_state WHERE key = ?", libsql::params![tab_key(tab_id)])
            .await?;
        Ok(())
    }
}

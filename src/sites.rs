//! Relational site store with audit trail.
//!
//! Sites are the source of truth for the search index. Every mutation
//! writes the site row and one `audit_logs` entry in the same transaction:
//!
//! | Action | `changes_json` |
//! |--------|----------------|
//! | `create` | the submitted fields |
//! | `update` | `{"old": {...}, "new": {...}}` |
//! | `delete` | `{"deleted": {...}}` |
//!
//! The store never touches the index; callers follow each write with a
//! resync (see [`crate::sync::Synchronizer::resync_after_write`]).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::auth::Principal;
use crate::db::now_ts;
use crate::error::{PortalError, PortalResult};
use crate::models::{SiteRecord, SiteType};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Anything that can enumerate the current set of sites.
#[async_trait]
pub trait SiteSource: Send + Sync {
    async fn list_sites(&self) -> PortalResult<Vec<SiteRecord>>;
}

/// Site fields as submitted by a client, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteInput {
    pub name: Option<String>,
    pub url: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub site_type: Option<String>,
}

/// Validated site fields.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteFields {
    pub name: String,
    pub url: String,
    pub description: Option<String>,
    pub site_type: SiteType,
}

impl SiteInput {
    pub fn validate(&self) -> PortalResult<SiteFields> {
        let name = self.name.as_deref().map(str::trim).unwrap_or_default();
        let url = self.url.as_deref().map(str::trim).unwrap_or_default();
        if name.is_empty() || url.is_empty() {
            return Err(PortalError::validation("Name and URL are required"));
        }
        if url::Url::parse(url).is_err() {
            return Err(PortalError::validation("Invalid URL format"));
        }

        let site_type = match self.site_type.as_deref().map(str::trim) {
            None | Some("") => SiteType::default(),
            Some(t) => t.parse::<SiteType>().map_err(PortalError::Validation)?,
        };

        Ok(SiteFields {
            name: name.to_string(),
            url: url.to_string(),
            description: self
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            site_type,
        })
    }
}

fn snapshot(name: &str, url: &str, description: &Option<String>, site_type: SiteType) -> Value {
    json!({
        "name": name,
        "url": url,
        "description": description,
        "type": site_type,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SitePage {
    pub sites: Vec<SiteRecord>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: String,
    pub user_id: String,
    pub action: String,
    pub site_id: Option<String>,
    pub changes: Value,
    pub created_at: i64,
}

/// SQLite-backed site store.
#[derive(Clone)]
pub struct SiteStore {
    pool: SqlitePool,
}

fn row_to_site(row: &SqliteRow) -> SiteRecord {
    let site_type: String = row.get("type");
    SiteRecord {
        id: row.get("id"),
        name: row.get("name"),
        url: row.get("url"),
        description: row.get("description"),
        site_type: site_type.parse().unwrap_or_default(),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const SITE_COLUMNS: &str = "id, name, url, description, type, created_by, created_at, updated_at";

impl SiteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// One page of sites, newest first, optionally narrowed by a
    /// case-insensitive substring of name, url or description.
    pub async fn list_page(&self, page: u32, limit: u32, search: Option<&str>) -> PortalResult<SitePage> {
        let page = page.max(1);
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let offset = (page as i64 - 1) * limit as i64;
        let needle = search.map(str::trim).unwrap_or_default().to_lowercase();

        let filter = "(?1 = '' OR instr(lower(name), ?1) > 0 OR instr(lower(url), ?1) > 0 \
                      OR instr(lower(coalesce(description, '')), ?1) > 0)";

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM sites WHERE {}", filter))
            .bind(&needle)
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM sites WHERE {} ORDER BY created_at DESC, rowid DESC LIMIT ?2 OFFSET ?3",
            SITE_COLUMNS, filter
        ))
        .bind(&needle)
        .bind(limit as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total = total as u64;
        Ok(SitePage {
            sites: rows.iter().map(row_to_site).collect(),
            pagination: Pagination {
                page,
                limit,
                total,
                pages: total.div_ceil(limit as u64),
            },
        })
    }

    pub async fn get(&self, id: &str) -> PortalResult<Option<SiteRecord>> {
        let row = sqlx::query(&format!("SELECT {} FROM sites WHERE id = ?", SITE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_site))
    }

    pub async fn create(&self, user: &Principal, fields: &SiteFields) -> PortalResult<SiteRecord> {
        let now = now_ts();
        let site = SiteRecord {
            id: Uuid::new_v4().to_string(),
            name: fields.name.clone(),
            url: fields.url.clone(),
            description: fields.description.clone(),
            site_type: fields.site_type,
            created_by: user.id.clone(),
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO sites (id, name, url, description, type, created_by, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&site.id)
        .bind(&site.name)
        .bind(&site.url)
        .bind(&site.description)
        .bind(site.site_type.as_str())
        .bind(&site.created_by)
        .bind(site.created_at)
        .bind(site.updated_at)
        .execute(&mut *tx)
        .await?;

        let changes = snapshot(&site.name, &site.url, &site.description, site.site_type);
        insert_audit(&mut tx, user, "create", &site.id, changes).await?;
        tx.commit().await?;

        tracing::info!(site_id = %site.id, name = %site.name, "site created");
        Ok(site)
    }

    pub async fn update(&self, user: &Principal, id: &str, fields: &SiteFields) -> PortalResult<SiteRecord> {
        let existing = self
            .get(id)
            .await?
            .ok_or_else(|| PortalError::NotFound("Site not found".to_string()))?;

        let site = SiteRecord {
            name: fields.name.clone(),
            url: fields.url.clone(),
            description: fields.description.clone(),
            site_type: fields.site_type,
            updated_at: now_ts(),
            ..existing.clone()
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE sites SET name = ?, url = ?, description = ?, type = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&site.name)
        .bind(&site.url)
        .bind(&site.description)
        .bind(site.site_type.as_str())
        .bind(site.updated_at)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let changes = json!({
            "old": snapshot(&existing.name, &existing.url, &existing.description, existing.site_type),
            "new": snapshot(&site.name, &site.url, &site.description, site.site_type),
        });
        insert_audit(&mut tx, user, "update", id, changes).await?;
        tx.commit().await?;

        tracing::info!(site_id = %id, "site updated");
        Ok(site)
    }

    /// Delete a site, returning the removed record.
    pub async fn delete(&self, user: &Principal, id: &str) -> PortalResult<SiteRecord> {
        let existing = self
            .get(id)
            .await?
            .ok_or_else(|| PortalError::NotFound("Site not found".to_string()))?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM sites WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let changes = json!({
            "deleted": snapshot(&existing.name, &existing.url, &existing.description, existing.site_type),
        });
        insert_audit(&mut tx, user, "delete", id, changes).await?;
        tx.commit().await?;

        tracing::info!(site_id = %id, "site deleted");
        Ok(existing)
    }

    /// Audit entries for one site, oldest first.
    pub async fn audit_trail(&self, site_id: &str) -> PortalResult<Vec<AuditEntry>> {
        let rows = sqlx::query(
            "SELECT id, user_id, action, site_id, changes_json, created_at
             FROM audit_logs WHERE site_id = ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(site_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let changes_json: String = row.get("changes_json");
                AuditEntry {
                    id: row.get("id"),
                    user_id: row.get("user_id"),
                    action: row.get("action"),
                    site_id: row.get("site_id"),
                    changes: serde_json::from_str(&changes_json).unwrap_or(Value::Null),
                    created_at: row.get("created_at"),
                }
            })
            .collect())
    }
}

async fn insert_audit(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    user: &Principal,
    action: &str,
    site_id: &str,
    changes: Value,
) -> PortalResult<()> {
    sqlx::query(
        "INSERT INTO audit_logs (id, user_id, action, site_id, changes_json, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&user.id)
    .bind(action)
    .bind(site_id)
    .bind(changes.to_string())
    .bind(now_ts())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl SiteSource for SiteStore {
    async fn list_sites(&self) -> PortalResult<Vec<SiteRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM sites ORDER BY created_at ASC, rowid ASC",
            SITE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_site).collect())
    }
}

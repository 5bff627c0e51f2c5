//! Site synchronization into the search index.
//!
//! The relational `sites` table is authoritative. [`Synchronizer`] rebuilds
//! the index from it wholesale: clear, bulk load, configure attributes. It is
//! the only writer of site documents into the synchronized index, and every
//! step waits for its index task, so a successful [`Synchronizer::full_resync`]
//! means the index holds exactly the current sites.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{PortalError, PortalResult};
use crate::index::{wait_for_task, IndexError, IndexResult, IndexService, Task, TaskWait};
use crate::models::{IndexedDocument, SiteType};
use crate::sites::SiteSource;

pub const PRIMARY_KEY: &str = "id";
pub const SYNC_SEARCHABLE: [&str; 4] = ["name", "url", "description", "type"];
pub const SEED_SEARCHABLE: [&str; 3] = ["name", "description", "type"];
pub const FILTERABLE: [&str; 1] = ["type"];

/// Outcome of the resync that follows a site write.
///
/// A failed resync never undoes the write; it is reported next to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SyncOutcome {
    Synced {
        #[serde(rename = "syncedCount")]
        synced_count: usize,
    },
    Failed {
        error: String,
    },
}

/// What [`Synchronizer::initialize_with_sample_data`] did.
#[derive(Debug, Clone)]
pub struct InitReport {
    pub index_name: String,
    pub documents_added: usize,
    pub create_task: Task,
    pub add_task: Task,
}

/// Every index lifecycle operation runs under `lock`, so a resync always
/// reads the sites table after the previous one has finished writing.
pub struct Synchronizer {
    index: Arc<dyn IndexService>,
    sites: Arc<dyn SiteSource>,
    index_name: String,
    wait: TaskWait,
    lock: Mutex<()>,
}

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn to_values(docs: &[IndexedDocument]) -> PortalResult<Vec<serde_json::Value>> {
    docs.iter()
        .map(|d| {
            serde_json::to_value(d)
                .map_err(|e| PortalError::upstream("Failed to encode document", e))
        })
        .collect()
}

impl Synchronizer {
    pub fn new(
        index: Arc<dyn IndexService>,
        sites: Arc<dyn SiteSource>,
        index_name: impl Into<String>,
        wait: TaskWait,
    ) -> Self {
        Self {
            index,
            sites,
            index_name: index_name.into(),
            wait,
            lock: Mutex::new(()),
        }
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    async fn settle(&self, task: IndexResult<Task>) -> PortalResult<Task> {
        let task = task?;
        Ok(wait_for_task(self.index.as_ref(), &task, self.wait).await?)
    }

    async fn index_exists(&self) -> PortalResult<bool> {
        match self.index.get_index(&self.index_name).await {
            Ok(_) => Ok(true),
            Err(IndexError::IndexNotFound(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Rebuild the index from every current site.
    ///
    /// Creates the index first when it does not exist. Returns the number
    /// of documents loaded.
    pub async fn full_resync(&self) -> PortalResult<usize> {
        let _guard = self.lock.lock().await;
        let docs: Vec<IndexedDocument> = self
            .sites
            .list_sites()
            .await?
            .iter()
            .map(|s| s.to_document())
            .collect();

        if !self.index_exists().await? {
            tracing::info!(index = %self.index_name, "creating missing index before resync");
            self.settle(self.index.create_index(&self.index_name, PRIMARY_KEY).await)
                .await?;
        }

        self.settle(self.index.delete_all_documents(&self.index_name).await)
            .await?;

        if !docs.is_empty() {
            let values = to_values(&docs)?;
            self.settle(
                self.index
                    .add_documents(&self.index_name, &values, Some(PRIMARY_KEY))
                    .await,
            )
            .await?;
        }

        self.settle(
            self.index
                .update_searchable_attributes(&self.index_name, &owned(&SYNC_SEARCHABLE))
                .await,
        )
        .await?;
        self.settle(
            self.index
                .update_filterable_attributes(&self.index_name, &owned(&FILTERABLE))
                .await,
        )
        .await?;

        tracing::info!(index = %self.index_name, synced = docs.len(), "index synchronized");
        Ok(docs.len())
    }

    /// Resync after a site write, folding any failure into the outcome.
    pub async fn resync_after_write(&self) -> SyncOutcome {
        match self.full_resync().await {
            Ok(synced_count) => SyncOutcome::Synced { synced_count },
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    details = e.details().unwrap_or_default(),
                    "site saved but index resync failed"
                );
                SyncOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Create the index and load the fixed seed set.
    ///
    /// Refuses with a conflict when the index already exists; existing data
    /// is never touched.
    pub async fn initialize_with_sample_data(&self) -> PortalResult<InitReport> {
        let _guard = self.lock.lock().await;
        if self.index_exists().await? {
            return Err(PortalError::Conflict(
                "Index already exists with data. Use DELETE first if you want to reinitialize."
                    .to_string(),
            ));
        }

        let create_task = self
            .settle(self.index.create_index(&self.index_name, PRIMARY_KEY).await)
            .await?;

        let docs = sample_documents();
        let values = to_values(&docs)?;
        let add_task = self
            .settle(
                self.index
                    .add_documents(&self.index_name, &values, Some(PRIMARY_KEY))
                    .await,
            )
            .await?;

        self.settle(
            self.index
                .update_searchable_attributes(&self.index_name, &owned(&SEED_SEARCHABLE))
                .await,
        )
        .await?;
        self.settle(
            self.index
                .update_filterable_attributes(&self.index_name, &owned(&FILTERABLE))
                .await,
        )
        .await?;

        tracing::info!(index = %self.index_name, documents = docs.len(), "index initialized with sample data");
        Ok(InitReport {
            index_name: self.index_name.clone(),
            documents_added: docs.len(),
            create_task,
            add_task,
        })
    }

    /// Delete the index. Not-found when it is already gone.
    pub async fn teardown(&self) -> PortalResult<Task> {
        let _guard = self.lock.lock().await;
        let task = self
            .settle(self.index.delete_index(&self.index_name).await)
            .await?;
        tracing::info!(index = %self.index_name, "index deleted");
        Ok(task)
    }
}

fn seed(id: &str, name: &str, url: &str, description: &str, site_type: SiteType) -> IndexedDocument {
    IndexedDocument {
        id: id.to_string(),
        name: name.to_string(),
        url: url.to_string(),
        description: Some(description.to_string()),
        site_type,
    }
}

/// The eight documents loaded by [`Synchronizer::initialize_with_sample_data`].
pub fn sample_documents() -> Vec<IndexedDocument> {
    vec![
        seed(
            "portal-001",
            "Employee Portal - Main Dashboard",
            "https://portal.internal.company.com/dashboard",
            "Central hub for employee resources, HR forms, payroll information, and company announcements",
            SiteType::Website,
        ),
        seed(
            "finance-001",
            "Financial System - Budget Reports",
            "https://finance.internal.company.com/reports",
            "Access quarterly budget reports, expense tracking, and financial analytics dashboard",
            SiteType::System,
        ),
        seed(
            "docs-001",
            "Document Management System",
            "https://docs.internal.company.com",
            "Centralized document storage, version control, and collaboration platform for all company files",
            SiteType::Document,
        ),
        seed(
            "crm-001",
            "Customer Relationship Management",
            "https://crm.internal.company.com",
            "Customer database, sales pipeline, and client communication tracking system",
            SiteType::Database,
        ),
        seed(
            "helpdesk-001",
            "IT Support & Help Desk",
            "https://helpdesk.internal.company.com",
            "Submit IT tickets, access knowledge base, and track support request status",
            SiteType::Website,
        ),
        seed(
            "inventory-001",
            "Inventory Management System",
            "https://inventory.internal.company.com",
            "Track office supplies, equipment, and asset management across all locations",
            SiteType::System,
        ),
        seed(
            "wiki-001",
            "Company Wiki & Knowledge Base",
            "https://wiki.internal.company.com",
            "Internal documentation, procedures, policies, and institutional knowledge repository",
            SiteType::Document,
        ),
        seed(
            "monitoring-001",
            "System Monitoring Dashboard",
            "https://monitoring.internal.company.com",
            "Real-time server monitoring, network status, and infrastructure health metrics",
            SiteType::System,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryIndex;
    use crate::models::{SearchQuery, SiteRecord};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct FixedSites(Mutex<Vec<SiteRecord>>);

    #[async_trait]
    impl SiteSource for FixedSites {
        async fn list_sites(&self) -> PortalResult<Vec<SiteRecord>> {
            Ok(self.0.lock().unwrap().clone())
        }
    }

    fn site(id: &str, name: &str) -> SiteRecord {
        SiteRecord {
            id: id.into(),
            name: name.into(),
            url: format!("https://{}.example.com", id),
            description: None,
            site_type: SiteType::Website,
            created_by: "u1".into(),
            created_at: 0,
            updated_at: 0,
        }
    }

    fn setup(sites: Vec<SiteRecord>) -> (Arc<MemoryIndex>, Arc<FixedSites>, Synchronizer) {
        let index = Arc::new(MemoryIndex::new());
        let source = Arc::new(FixedSites(Mutex::new(sites)));
        let sync = Synchronizer::new(index.clone(), source.clone(), "internal_sites", TaskWait::default());
        (index, source, sync)
    }

    #[test]
    fn test_sample_documents() {
        let docs = sample_documents();
        assert_eq!(docs.len(), 8);
        assert_eq!(docs[0].id, "portal-001");
        assert_eq!(docs[3].site_type, SiteType::Database);
    }

    #[tokio::test]
    async fn test_full_resync_creates_index_and_replaces_documents() {
        let (index, source, sync) = setup(vec![site("a", "Alpha"), site("b", "Beta")]);
        assert_eq!(sync.full_resync().await.unwrap(), 2);

        source.0.lock().unwrap().remove(0);
        assert_eq!(sync.full_resync().await.unwrap(), 1);

        let page = index.get_documents("internal_sites", 20, 0).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.results[0]["id"], "b");
    }

    #[tokio::test]
    async fn test_full_resync_with_no_sites_empties_index() {
        let (index, _source, sync) = setup(vec![]);
        assert_eq!(sync.full_resync().await.unwrap(), 0);
        let stats = index.get_stats("internal_sites").await.unwrap();
        assert_eq!(stats.number_of_documents, 0);
    }

    #[tokio::test]
    async fn test_initialize_refuses_existing_index() {
        let (index, _source, sync) = setup(vec![]);
        let report = sync.initialize_with_sample_data().await.unwrap();
        assert_eq!(report.documents_added, 8);

        let err = sync.initialize_with_sample_data().await.unwrap_err();
        assert!(matches!(err, PortalError::Conflict(_)));

        let resp = index
            .search("internal_sites", &SearchQuery::text("", 20))
            .await
            .unwrap();
        assert_eq!(resp.estimated_total_hits, 8);
    }

    #[tokio::test]
    async fn test_teardown_then_not_found() {
        let (_index, _source, sync) = setup(vec![]);
        sync.initialize_with_sample_data().await.unwrap();
        sync.teardown().await.unwrap();
        assert!(matches!(
            sync.teardown().await.unwrap_err(),
            PortalError::NotFound(_)
        ));
    }

    /// Returns the first snapshot late, after newer resyncs may have started.
    struct SlowFirstRead {
        sites: Mutex<Vec<SiteRecord>>,
        first: AtomicBool,
    }

    #[async_trait]
    impl SiteSource for SlowFirstRead {
        async fn list_sites(&self) -> PortalResult<Vec<SiteRecord>> {
            let snapshot = self.sites.lock().unwrap().clone();
            if self.first.swap(false, Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            Ok(snapshot)
        }
    }

    #[tokio::test]
    async fn test_overlapping_resyncs_end_with_current_sites() {
        let index = Arc::new(MemoryIndex::new());
        let source = Arc::new(SlowFirstRead {
            sites: Mutex::new(vec![site("a", "Alpha"), site("b", "Beta")]),
            first: AtomicBool::new(true),
        });
        let sync = Synchronizer::new(index.clone(), source.clone(), "internal_sites", TaskWait::default());

        let (first, second) = tokio::join!(sync.full_resync(), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            source.sites.lock().unwrap().remove(0);
            sync.full_resync().await
        });
        assert_eq!(first.unwrap(), 2);
        assert_eq!(second.unwrap(), 1);

        let page = index.get_documents("internal_sites", 20, 0).await.unwrap();
        let ids: Vec<&str> = page.results.iter().map(|d| d["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["b"]);
    }

    #[tokio::test]
    async fn test_resync_failure_is_reported_not_raised() {
        let index = Arc::new(MemoryIndex::new());
        index.hold_tasks(true);
        let sync = Synchronizer::new(
            index.clone(),
            Arc::new(FixedSites(Mutex::new(vec![site("a", "Alpha")]))),
            "internal_sites",
            TaskWait {
                timeout: std::time::Duration::from_millis(30),
                first_poll: std::time::Duration::from_millis(10),
            },
        );
        match sync.resync_after_write().await {
            SyncOutcome::Failed { error } => assert!(error.contains("did not respond")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}

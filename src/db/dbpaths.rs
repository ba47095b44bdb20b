use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Error as SqlxError, Postgres, QueryBuilder, Row};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{AccessFacts, Collaborator, Node, NodeDraft, NodePatch, NodeStatus, SyncError};
use crate::services::path_store::PathStore;
use crate::ws::tree::NodeTree;

const NODE_COLUMNS: &str = r#"
    id,
    "learningPathId" AS path_id,
    "parentNodeId" AS parent_id,
    title,
    description,
    status::text AS status,
    color,
    "order" AS node_order,
    "positionX" AS position_x,
    "positionY" AS position_y,
    "estimatedTime" AS estimated_time,
    "notificationDate" AS notification_date
"#;

/// Node Row from database
#[derive(Debug, Clone, sqlx::FromRow)]
struct NodeRow {
    id: String,
    path_id: String,
    parent_id: Option<String>,
    title: String,
    description: Option<String>,
    status: String,
    color: Option<String>,
    node_order: Option<i32>,
    position_x: Option<f64>,
    position_y: Option<f64>,
    estimated_time: Option<i32>,
    notification_date: Option<DateTime<Utc>>,
}

impl From<NodeRow> for Node {
    fn from(row: NodeRow) -> Self {
        Node {
            id: row.id,
            path_id: row.path_id,
            parent_id: row.parent_id,
            title: row.title,
            description: row.description,
            status: NodeStatus::parse(&row.status).unwrap_or_default(),
            color: row.color,
            order: row.node_order.unwrap_or(0),
            position_x: row.position_x,
            position_y: row.position_y,
            estimated_time: row.estimated_time,
            notification_date: row.notification_date,
        }
    }
}

/// Learning paths stored in PostgreSQL.
pub struct PgPathStore {
    pool: PgPool,
}

impl PgPathStore {
    /// Create a new database connection pool
    ///
    /// # Arguments
    /// * `database_url` - PostgreSQL connection string
    pub async fn new(database_url: &str) -> Result<Self, SqlxError> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await?;

        info!("Database connection pool created successfully");

        Ok(Self { pool })
    }

    fn log_pool(&self, action: &str, path_id: &str) {
        let pool_idle = self.pool.num_idle() as u32;
        let pool_size = self.pool.size();
        debug!(
            "{} for path {}. Pool connections: {} idle, {} in use",
            action,
            path_id,
            pool_idle,
            pool_size.saturating_sub(pool_idle)
        );
    }

    async fn load_access_facts(&self, path_id: &str) -> Result<Option<AccessFacts>, SqlxError> {
        self.log_pool("Loading access facts", path_id);

        let query_sql = r#"
            SELECT
                lp."ownerId" AS owner_id,
                lp."isPublic" AS is_public,
                COALESCE(
                    (SELECT json_agg(json_build_object('userId', c."userId", 'role', c.role::text))
                     FROM "Collaboration" c
                     WHERE c."learningPathId" = lp.id),
                    '[]'::json
                ) AS collaborators
            FROM "LearningPath" lp
            WHERE lp.id = $1
        "#;

        let Some(row) = sqlx::query(query_sql)
            .bind(path_id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let collaborators: serde_json::Value = row.try_get("collaborators")?;
        let collaborators: Vec<Collaborator> = serde_json::from_value(collaborators)
            .map_err(|e| SqlxError::Decode(Box::new(e)))?;

        Ok(Some(AccessFacts {
            owner_id: row.try_get("owner_id")?,
            is_public: row.try_get("is_public")?,
            collaborators,
        }))
    }

    async fn load_node_tree(&self, path_id: &str) -> Result<NodeTree, SqlxError> {
        let links = sqlx::query_as::<_, (String, Option<String>)>(
            r#"SELECT id, "parentNodeId" FROM "Node" WHERE "learningPathId" = $1"#,
        )
        .bind(path_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(NodeTree::from_links(links))
    }

    async fn update_node(&self, path_id: &str, node_id: &str, patch: &NodePatch) -> Result<Option<Node>, SqlxError> {
        self.log_pool("Updating node", path_id);

        let mut qb = QueryBuilder::<Postgres>::new(r#"UPDATE "Node" SET "updatedAt" = NOW()"#);
        if let Some(title) = &patch.title {
            qb.push(", title = ").push_bind(title.clone());
        }
        if let Some(description) = &patch.description {
            qb.push(", description = ").push_bind(description.clone());
        }
        if let Some(status) = patch.status {
            qb.push(", status = ")
                .push_bind(status.as_str())
                .push(r#"::"NodeStatus""#);
        }
        if let Some(color) = &patch.color {
            qb.push(", color = ").push_bind(color.clone());
        }
        if let Some(order) = patch.order {
            qb.push(r#", "order" = "#).push_bind(order);
        }
        if let Some(parent_id) = &patch.parent_id {
            qb.push(r#", "parentNodeId" = "#).push_bind(parent_id.clone());
        }
        if let Some(x) = patch.position_x {
            qb.push(r#", "positionX" = "#).push_bind(x);
        }
        if let Some(y) = patch.position_y {
            qb.push(r#", "positionY" = "#).push_bind(y);
        }
        if let Some(minutes) = patch.estimated_time {
            qb.push(r#", "estimatedTime" = "#).push_bind(minutes);
        }
        if let Some(date) = patch.notification_date {
            qb.push(r#", "notificationDate" = "#).push_bind(date);
        }
        qb.push(" WHERE id = ")
            .push_bind(node_id.to_string())
            .push(r#" AND "learningPathId" = "#)
            .push_bind(path_id.to_string());
        qb.push(" RETURNING ").push(NODE_COLUMNS);

        let row = qb.build_query_as::<NodeRow>().fetch_optional(&self.pool).await?;
        Ok(row.map(Node::from))
    }

    async fn insert_node(&self, path_id: &str, parent_id: Option<&str>, draft: &NodeDraft) -> Result<Node, SqlxError> {
        self.log_pool("Creating node", path_id);

        let query_sql = format!(
            r#"
            INSERT INTO "Node" (
                id, "learningPathId", "parentNodeId", title, description, status, color,
                "order", "positionX", "positionY", "estimatedTime", "createdAt", "updatedAt"
            )
            VALUES (
                $1, $2, $3, $4, $5, $6::"NodeStatus", $7,
                COALESCE($8, (SELECT COUNT(*)::int FROM "Node" WHERE "learningPathId" = $2)),
                $9, $10, $11, NOW(), NOW()
            )
            RETURNING {}
            "#,
            NODE_COLUMNS
        );

        let row = sqlx::query_as::<_, NodeRow>(&query_sql)
            .bind(Uuid::new_v4().to_string())
            .bind(path_id)
            .bind(parent_id)
            .bind(&draft.title)
            .bind(draft.description.as_deref().unwrap_or(""))
            .bind(draft.status.as_str())
            .bind(&draft.color)
            .bind(draft.order)
            .bind(draft.position_x)
            .bind(draft.position_y)
            .bind(draft.estimated_time)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn remove_subtree(&self, path_id: &str, node_id: &str) -> Result<u64, SqlxError> {
        self.log_pool("Deleting node", path_id);

        let query_sql = r#"
            WITH RECURSIVE doomed AS (
                SELECT id FROM "Node" WHERE id = $1 AND "learningPathId" = $2
                UNION
                SELECT n.id FROM "Node" n
                JOIN doomed d ON n."parentNodeId" = d.id
                WHERE n."learningPathId" = $2
            )
            DELETE FROM "Node" WHERE id IN (SELECT id FROM doomed)
        "#;

        let result = sqlx::query(query_sql)
            .bind(node_id)
            .bind(path_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

impl PathStore for PgPathStore {
    fn get_access_facts<'a>(&'a self, path_id: &'a str) -> BoxFuture<'a, Result<Option<AccessFacts>, SyncError>> {
        async move { Ok(self.load_access_facts(path_id).await?) }.boxed()
    }

    fn get_node_tree<'a>(&'a self, path_id: &'a str) -> BoxFuture<'a, Result<NodeTree, SyncError>> {
        async move { Ok(self.load_node_tree(path_id).await?) }.boxed()
    }

    fn apply_node_patch<'a>(
        &'a self,
        path_id: &'a str,
        node_id: &'a str,
        patch: &'a NodePatch,
    ) -> BoxFuture<'a, Result<Option<Node>, SyncError>> {
        async move { Ok(self.update_node(path_id, node_id, patch).await?) }.boxed()
    }

    fn create_node<'a>(
        &'a self,
        path_id: &'a str,
        parent_id: Option<&'a str>,
        draft: &'a NodeDraft,
    ) -> BoxFuture<'a, Result<Node, SyncError>> {
        async move { Ok(self.insert_node(path_id, parent_id, draft).await?) }.boxed()
    }

    fn delete_node<'a>(&'a self, path_id: &'a str, node_id: &'a str) -> BoxFuture<'a, Result<u64, SyncError>> {
        async move { Ok(self.remove_subtree(path_id, node_id).await?) }.boxed()
    }
}

//! LibsqlTreeStore - TreeStore Implementation for libsql (embedded SQLite)
//!
//! Stores nested-set rows in a single table whose table and column names come
//! from [`NestedSetColumns`], so an existing table can be adopted as-is.
//!
//! # Transactions
//!
//! The store owns one connection guarded by a tokio mutex. `begin()` takes the
//! guard and issues `BEGIN IMMEDIATE`, which acquires SQLite's write lock up
//! front; the guard is held until `COMMIT` or `ROLLBACK`. SQLite only ever
//! has one writer, so serializing transactions at the connection costs
//! nothing, and it keeps `:memory:` databases (one database per connection)
//! usable.
//!
//! # Examples
//!
//! ```rust,no_run
//! use nestable_core::config::NestedSetColumns;
//! use nestable_core::db::{LibsqlTreeStore, TreeReader};
//! use std::path::PathBuf;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = LibsqlTreeStore::new(PathBuf::from("./data/tree.db"), NestedSetColumns::default()).await?;
//! let roots = store.find_roots().await?;
//! println!("{} trees", roots.len());
//! # Ok(())
//! # }
//! ```

use crate::config::NestedSetColumns;
use crate::db::{DatabaseError, TreeReader, TreeStore, TreeTransaction};
use crate::models::{NodeFieldsUpdate, RangeUpdate, TreeNode};
use async_trait::async_trait;
use libsql::{Builder, Connection, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Stand-in for an unbounded upper range limit
const UNBOUNDED: i64 = i64::MAX;

/// SQL statements rendered once from the configured column names
#[derive(Debug)]
struct Statements {
    select: String,
    create_table: String,
    create_indexes: [String; 2],
    find_node: String,
    find_tree: String,
    find_roots: String,
    find_children: String,
    find_ancestors: String,
    shift_range: String,
    update_range_depth: String,
    update_range_tree: String,
    insert_node: String,
}

impl Statements {
    fn render(c: &NestedSetColumns) -> Self {
        let t = &c.table;
        let select = format!(
            "SELECT {id}, {tree}, {lft}, {rgt}, {depth}, {name}, {props} FROM {t}",
            id = c.id,
            tree = c.tree,
            lft = c.left,
            rgt = c.right,
            depth = c.depth,
            name = c.name,
            props = c.properties,
        );
        let prefixed = |alias: &str| {
            format!(
                "SELECT {a}.{id}, {a}.{tree}, {a}.{lft}, {a}.{rgt}, {a}.{depth}, {a}.{name}, {a}.{props} FROM {t} {a}",
                a = alias,
                id = c.id,
                tree = c.tree,
                lft = c.left,
                rgt = c.right,
                depth = c.depth,
                name = c.name,
                props = c.properties,
            )
        };

        Self {
            create_table: format!(
                "CREATE TABLE IF NOT EXISTS {t} (
                    {id} TEXT PRIMARY KEY,
                    {tree} TEXT NOT NULL,
                    {lft} INTEGER NOT NULL,
                    {rgt} INTEGER NOT NULL,
                    {depth} INTEGER NOT NULL,
                    {name} TEXT NOT NULL DEFAULT '',
                    {props} TEXT NOT NULL DEFAULT '{{}}'
                )",
                id = c.id,
                tree = c.tree,
                lft = c.left,
                rgt = c.right,
                depth = c.depth,
                name = c.name,
                props = c.properties,
            ),
            create_indexes: [
                format!(
                    "CREATE INDEX IF NOT EXISTS idx_{t}_tree_lft ON {t}({tree}, {lft})",
                    tree = c.tree,
                    lft = c.left,
                ),
                format!(
                    "CREATE INDEX IF NOT EXISTS idx_{t}_tree_rgt ON {t}({tree}, {rgt})",
                    tree = c.tree,
                    rgt = c.right,
                ),
            ],
            find_node: format!("{select} WHERE {id} = ?1", id = c.id),
            find_tree: format!(
                "{select} WHERE {tree} = ?1 ORDER BY {lft}",
                tree = c.tree,
                lft = c.left,
            ),
            find_roots: format!(
                "{select} WHERE {depth} = 0 ORDER BY {tree}, {lft}",
                depth = c.depth,
                tree = c.tree,
                lft = c.left,
            ),
            find_children: format!(
                "{base} JOIN {t} p ON n.{tree} = p.{tree} AND n.{lft} > p.{lft} AND n.{rgt} < p.{rgt}
                 WHERE p.{id} = ?1 AND (?2 IS NULL OR n.{depth} <= p.{depth} + ?2)
                 ORDER BY n.{lft}",
                base = prefixed("n"),
                tree = c.tree,
                lft = c.left,
                rgt = c.right,
                id = c.id,
                depth = c.depth,
            ),
            find_ancestors: format!(
                "{base} JOIN {t} x ON n.{tree} = x.{tree} AND n.{lft} < x.{lft} AND n.{rgt} > x.{rgt}
                 WHERE x.{id} = ?1 AND (?2 IS NULL OR n.{depth} >= x.{depth} - ?2)
                 ORDER BY n.{lft}",
                base = prefixed("n"),
                tree = c.tree,
                lft = c.left,
                rgt = c.right,
                id = c.id,
                depth = c.depth,
            ),
            shift_range: format!(
                "UPDATE {t} SET
                    {lft} = CASE WHEN {lft} >= ?2 AND {lft} < ?3 THEN {lft} + ?4 ELSE {lft} END,
                    {rgt} = CASE WHEN {rgt} >= ?2 AND {rgt} < ?3 THEN {rgt} + ?4 ELSE {rgt} END
                 WHERE {tree} = ?1
                   AND (({lft} >= ?2 AND {lft} < ?3) OR ({rgt} >= ?2 AND {rgt} < ?3))",
                lft = c.left,
                rgt = c.right,
                tree = c.tree,
            ),
            update_range_depth: format!(
                "UPDATE {t} SET {depth} = {depth} + ?4
                 WHERE {tree} = ?1 AND {lft} >= ?2 AND {lft} < ?3",
                depth = c.depth,
                tree = c.tree,
                lft = c.left,
            ),
            update_range_tree: format!(
                "UPDATE {t} SET {depth} = {depth} + ?4, {tree} = ?5
                 WHERE {tree} = ?1 AND {lft} >= ?2 AND {lft} < ?3",
                depth = c.depth,
                tree = c.tree,
                lft = c.left,
            ),
            insert_node: format!(
                "INSERT INTO {t} ({id}, {tree}, {lft}, {rgt}, {depth}, {name}, {props})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                id = c.id,
                tree = c.tree,
                lft = c.left,
                rgt = c.right,
                depth = c.depth,
                name = c.name,
                props = c.properties,
            ),
            select,
        }
    }
}

/// Shared connection plus the rendered statements
struct Inner {
    conn: Arc<Mutex<Connection>>,
    columns: NestedSetColumns,
    statements: Statements,
}

/// libsql-backed nested-set table
#[derive(Clone)]
pub struct LibsqlTreeStore {
    inner: Arc<Inner>,
}

impl LibsqlTreeStore {
    /// Open (or create) a database file and ensure the table exists
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if:
    /// - the column configuration is invalid
    /// - the parent directory cannot be created
    /// - the connection or the schema initialization fails
    pub async fn new(db_path: PathBuf, columns: NestedSetColumns) -> Result<Self, DatabaseError> {
        columns
            .validate()
            .map_err(DatabaseError::initialization_failed)?;

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;
        let conn = db.connect()?;

        Self::initialize(conn, columns).await
    }

    /// Private in-memory database, gone when the store is dropped
    pub async fn new_in_memory(columns: NestedSetColumns) -> Result<Self, DatabaseError> {
        columns
            .validate()
            .map_err(DatabaseError::initialization_failed)?;

        let path = PathBuf::from(":memory:");
        let db = Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(path, e))?;
        let conn = db.connect()?;

        Self::initialize(conn, columns).await
    }

    async fn initialize(conn: Connection, columns: NestedSetColumns) -> Result<Self, DatabaseError> {
        let statements = Statements::render(&columns);

        execute_pragma(&conn, "PRAGMA busy_timeout = 5000").await?;
        conn.execute(&statements.create_table, ())
            .await
            .map_err(|e| {
                DatabaseError::initialization_failed(format!("Failed to create table: {}", e))
            })?;
        for index in &statements.create_indexes {
            conn.execute(index, ()).await.map_err(|e| {
                DatabaseError::initialization_failed(format!("Failed to create index: {}", e))
            })?;
        }

        tracing::debug!("Initialized nested-set table '{}'", columns.table);

        Ok(Self {
            inner: Arc::new(Inner {
                conn: Arc::new(Mutex::new(conn)),
                columns,
                statements,
            }),
        })
    }

    pub fn columns(&self) -> &NestedSetColumns {
        &self.inner.columns
    }

    /// Insert rows in one transaction
    pub async fn seed(&self, nodes: &[TreeNode]) -> Result<(), DatabaseError> {
        let mut tx = self.begin().await?;
        for node in nodes {
            if let Err(e) = tx.insert_node(node).await {
                tx.rollback().await?;
                return Err(e);
            }
        }
        tx.commit().await
    }
}

/// PRAGMA statements return rows, so they go through query()
async fn execute_pragma(conn: &Connection, pragma: &str) -> Result<(), DatabaseError> {
    conn.query(pragma, ()).await.map_err(|e| {
        DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
    })?;
    Ok(())
}

fn optional_limit(limit: Option<i64>) -> Value {
    limit.map_or(Value::Null, Value::Integer)
}

/// Decode a row selected by `Statements::select` (column order is fixed)
fn row_to_node(row: &libsql::Row) -> Result<TreeNode, DatabaseError> {
    let id: String = row.get(0)?;
    let properties_json: String = row.get(6)?;
    let properties = serde_json::from_str(&properties_json)
        .map_err(|e| DatabaseError::corrupt_row(&id, format!("invalid properties: {}", e)))?;

    Ok(TreeNode {
        tree_id: row.get(1)?,
        lft: row.get(2)?,
        rgt: row.get(3)?,
        depth: row.get(4)?,
        name: row.get(5)?,
        properties,
        id,
    })
}

async fn query_nodes(
    conn: &Connection,
    sql: &str,
    params: Vec<Value>,
) -> Result<Vec<TreeNode>, DatabaseError> {
    let mut rows = conn
        .query(sql, params)
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Query failed: {}", e)))?;

    let mut nodes = Vec::new();
    while let Some(row) = rows.next().await? {
        nodes.push(row_to_node(&row)?);
    }
    Ok(nodes)
}

/// Read helpers shared by the store and its transactions
async fn read_node(
    conn: &Connection,
    s: &Statements,
    id: &str,
) -> Result<Option<TreeNode>, DatabaseError> {
    let mut nodes = query_nodes(conn, &s.find_node, vec![Value::from(id.to_string())]).await?;
    Ok(nodes.pop())
}

#[async_trait]
impl TreeReader for LibsqlTreeStore {
    async fn find_node(&self, id: &str) -> Result<Option<TreeNode>, DatabaseError> {
        let conn = self.inner.conn.lock().await;
        read_node(&conn, &self.inner.statements, id).await
    }

    async fn find_tree(&self, tree_id: &str) -> Result<Vec<TreeNode>, DatabaseError> {
        let conn = self.inner.conn.lock().await;
        query_nodes(
            &conn,
            &self.inner.statements.find_tree,
            vec![Value::from(tree_id.to_string())],
        )
        .await
    }

    async fn find_roots(&self) -> Result<Vec<TreeNode>, DatabaseError> {
        let conn = self.inner.conn.lock().await;
        query_nodes(&conn, &self.inner.statements.find_roots, Vec::new()).await
    }

    async fn find_children(
        &self,
        parent_id: &str,
        depth_limit: Option<i64>,
    ) -> Result<Vec<TreeNode>, DatabaseError> {
        let conn = self.inner.conn.lock().await;
        query_nodes(
            &conn,
            &self.inner.statements.find_children,
            vec![Value::from(parent_id.to_string()), optional_limit(depth_limit)],
        )
        .await
    }

    async fn find_ancestors(
        &self,
        id: &str,
        depth_limit: Option<i64>,
    ) -> Result<Vec<TreeNode>, DatabaseError> {
        let conn = self.inner.conn.lock().await;
        query_nodes(
            &conn,
            &self.inner.statements.find_ancestors,
            vec![Value::from(id.to_string()), optional_limit(depth_limit)],
        )
        .await
    }
}

#[async_trait]
impl TreeStore for LibsqlTreeStore {
    async fn begin(&self) -> Result<Box<dyn TreeTransaction>, DatabaseError> {
        let conn = self.inner.conn.clone().lock_owned().await;

        conn.execute("BEGIN IMMEDIATE", ()).await.map_err(|e| {
            DatabaseError::transaction_failed(format!("Failed to begin transaction: {}", e))
        })?;

        Ok(Box::new(LibsqlTransaction {
            conn: Some(conn),
            inner: self.inner.clone(),
        }))
    }
}

/// Open `BEGIN IMMEDIATE` transaction on the shared connection
///
/// `conn` is `Some` until the transaction is committed or rolled back.
pub struct LibsqlTransaction {
    conn: Option<OwnedMutexGuard<Connection>>,
    inner: Arc<Inner>,
}

impl LibsqlTransaction {
    fn conn(&self) -> Result<&Connection, DatabaseError> {
        self.conn
            .as_deref()
            .ok_or_else(|| DatabaseError::transaction_failed("transaction already finished"))
    }

    async fn finish(&mut self, statement: &str) -> Result<(), DatabaseError> {
        let conn = self
            .conn
            .take()
            .ok_or_else(|| DatabaseError::transaction_failed("transaction already finished"))?;

        if let Err(e) = conn.execute(statement, ()).await {
            if statement == "COMMIT" {
                if let Err(rollback) = conn.execute("ROLLBACK", ()).await {
                    tracing::error!("Failed to roll back after failed commit: {}", rollback);
                }
            }
            return Err(DatabaseError::transaction_failed(format!(
                "Failed to {}: {}",
                statement.to_lowercase(),
                e
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl TreeReader for LibsqlTransaction {
    async fn find_node(&self, id: &str) -> Result<Option<TreeNode>, DatabaseError> {
        read_node(self.conn()?, &self.inner.statements, id).await
    }

    async fn find_tree(&self, tree_id: &str) -> Result<Vec<TreeNode>, DatabaseError> {
        query_nodes(
            self.conn()?,
            &self.inner.statements.find_tree,
            vec![Value::from(tree_id.to_string())],
        )
        .await
    }

    async fn find_roots(&self) -> Result<Vec<TreeNode>, DatabaseError> {
        query_nodes(self.conn()?, &self.inner.statements.find_roots, Vec::new()).await
    }

    async fn find_children(
        &self,
        parent_id: &str,
        depth_limit: Option<i64>,
    ) -> Result<Vec<TreeNode>, DatabaseError> {
        query_nodes(
            self.conn()?,
            &self.inner.statements.find_children,
            vec![Value::from(parent_id.to_string()), optional_limit(depth_limit)],
        )
        .await
    }

    async fn find_ancestors(
        &self,
        id: &str,
        depth_limit: Option<i64>,
    ) -> Result<Vec<TreeNode>, DatabaseError> {
        query_nodes(
            self.conn()?,
            &self.inner.statements.find_ancestors,
            vec![Value::from(id.to_string()), optional_limit(depth_limit)],
        )
        .await
    }
}

#[async_trait]
impl TreeTransaction for LibsqlTransaction {
    async fn shift_range(
        &mut self,
        tree_id: &str,
        lower: i64,
        upper: Option<i64>,
        delta: i64,
    ) -> Result<u64, DatabaseError> {
        self.conn()?
            .execute(
                &self.inner.statements.shift_range,
                (tree_id, lower, upper.unwrap_or(UNBOUNDED), delta),
            )
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!(
                    "Failed to shift [{}, {:?}) by {} in tree {}: {}",
                    lower, upper, delta, tree_id, e
                ))
            })
    }

    async fn update_range(
        &mut self,
        tree_id: &str,
        lower: i64,
        upper: Option<i64>,
        update: &RangeUpdate,
    ) -> Result<u64, DatabaseError> {
        let upper = upper.unwrap_or(UNBOUNDED);
        let statements = &self.inner.statements;
        let result = match &update.tree_id {
            Some(new_tree) => {
                self.conn()?
                    .execute(
                        &statements.update_range_tree,
                        (tree_id, lower, upper, update.depth_delta, new_tree.as_str()),
                    )
                    .await
            }
            None => {
                self.conn()?
                    .execute(
                        &statements.update_range_depth,
                        (tree_id, lower, upper, update.depth_delta),
                    )
                    .await
            }
        };

        result.map_err(|e| {
            DatabaseError::sql_execution(format!(
                "Failed to update range [{}, {}) in tree {}: {}",
                lower, upper, tree_id, e
            ))
        })
    }

    async fn update_node(
        &mut self,
        id: &str,
        update: &NodeFieldsUpdate,
    ) -> Result<(), DatabaseError> {
        let c = &self.inner.columns;
        let mut assignments = Vec::new();
        let mut params = Vec::new();

        if let Some(tree_id) = &update.tree_id {
            assignments.push(c.tree.as_str());
            params.push(Value::from(tree_id.clone()));
        }
        if let Some(lft) = update.lft {
            assignments.push(c.left.as_str());
            params.push(Value::Integer(lft));
        }
        if let Some(rgt) = update.rgt {
            assignments.push(c.right.as_str());
            params.push(Value::Integer(rgt));
        }
        if let Some(depth) = update.depth {
            assignments.push(c.depth.as_str());
            params.push(Value::Integer(depth));
        }
        if let Some(name) = &update.name {
            assignments.push(c.name.as_str());
            params.push(Value::from(name.clone()));
        }
        if let Some(properties) = &update.properties {
            assignments.push(c.properties.as_str());
            params.push(Value::from(properties.to_string()));
        }

        if assignments.is_empty() {
            return match self.find_node(id).await? {
                Some(_) => Ok(()),
                None => Err(DatabaseError::row_not_found(id)),
            };
        }

        let set_clause = assignments
            .iter()
            .enumerate()
            .map(|(index, column)| format!("{} = ?{}", column, index + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?{}",
            c.table,
            set_clause,
            c.id,
            params.len() + 1
        );
        params.push(Value::from(id.to_string()));

        let updated = self
            .conn()?
            .execute(&sql, params)
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to update {}: {}", id, e)))?;

        if updated == 0 {
            return Err(DatabaseError::row_not_found(id));
        }
        Ok(())
    }

    async fn insert_node(&mut self, node: &TreeNode) -> Result<(), DatabaseError> {
        if self.find_node(&node.id).await?.is_some() {
            return Err(DatabaseError::duplicate_row(&node.id));
        }

        self.conn()?
            .execute(
                &self.inner.statements.insert_node,
                (
                    node.id.as_str(),
                    node.tree_id.as_str(),
                    node.lft,
                    node.rgt,
                    node.depth,
                    node.name.as_str(),
                    node.properties.to_string(),
                ),
            )
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to insert node {}: {}", node.id, e))
            })?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DatabaseError> {
        self.finish("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<(), DatabaseError> {
        self.finish("ROLLBACK").await
    }
}

impl Drop for LibsqlTransaction {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };

        tracing::warn!("libsql transaction dropped without commit; rolling back");
        // the guard moves into the task so no other transaction starts before ROLLBACK
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = conn.execute("ROLLBACK", ()).await {
                        tracing::error!("Failed to roll back dropped transaction: {}", e);
                    }
                });
            }
            Err(_) => {
                tracing::error!("No runtime available to roll back dropped transaction");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_nodes() -> Vec<TreeNode> {
        vec![
            TreeNode::with_bounds("root", "t", 1, 10, 0),
            TreeNode::with_bounds("a", "t", 2, 3, 1),
            TreeNode::with_bounds("b", "t", 4, 7, 1),
            TreeNode::with_bounds("c", "t", 5, 6, 2),
            TreeNode::with_bounds("d", "t", 8, 9, 1),
        ]
    }

    async fn sample_store() -> LibsqlTreeStore {
        let store = LibsqlTreeStore::new_in_memory(NestedSetColumns::default())
            .await
            .unwrap();
        store.seed(&sample_nodes()).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_failed_commit_releases_connection() {
        let store = sample_store().await;
        // no BEGIN was issued, so COMMIT and the follow-up ROLLBACK both fail
        let mut tx = LibsqlTransaction {
            conn: Some(store.inner.conn.clone().lock_owned().await),
            inner: store.inner.clone(),
        };

        let err = tx.commit().await.unwrap_err();
        assert!(matches!(err, DatabaseError::TransactionFailed { .. }));
        assert!(tx.commit().await.is_err());
        drop(tx);

        let mut next = store.begin().await.unwrap();
        next.shift_range("t", 8, None, 2).await.unwrap();
        next.commit().await.unwrap();
        drop(next);
        let root = store.find_node("root").await.unwrap().unwrap();
        assert_eq!((root.lft, root.rgt), (1, 12));
    }

    #[tokio::test]
    async fn test_round_trip_row() {
        let store = sample_store().await;
        let node = store.find_node("c").await.unwrap().unwrap();
        assert_eq!(node, TreeNode::with_bounds("c", "t", 5, 6, 2));
        assert!(store.find_node("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_children_and_ancestors_queries() {
        let store = sample_store().await;

        let direct: Vec<String> = store
            .find_children("root", Some(1))
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(direct, vec!["a", "b", "d"]);
        assert_eq!(store.find_children("root", None).await.unwrap().len(), 4);

        let parent = store.find_ancestors("c", Some(1)).await.unwrap();
        assert_eq!(parent.len(), 1);
        assert_eq!(parent[0].id, "b");
        assert_eq!(store.find_ancestors("c", None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_shift_range_and_rollback() {
        let store = sample_store().await;

        let mut tx = store.begin().await.unwrap();
        let touched = tx.shift_range("t", 8, None, 2).await.unwrap();
        assert_eq!(touched, 2);
        tx.rollback().await.unwrap();
        drop(tx);

        let root = store.find_node("root").await.unwrap().unwrap();
        assert_eq!(root.rgt, 10);

        let mut tx = store.begin().await.unwrap();
        tx.shift_range("t", 8, None, 2).await.unwrap();
        tx.commit().await.unwrap();
        drop(tx);

        let root = store.find_node("root").await.unwrap().unwrap();
        let d = store.find_node("d").await.unwrap().unwrap();
        assert_eq!(root.rgt, 12);
        assert_eq!((d.lft, d.rgt), (10, 11));
    }

    #[tokio::test]
    async fn test_update_range_retags_tree() {
        let store = sample_store().await;

        let mut tx = store.begin().await.unwrap();
        let update = RangeUpdate {
            depth_delta: -1,
            tree_id: Some("fresh".to_string()),
        };
        assert_eq!(tx.update_range("t", 4, Some(8), &update).await.unwrap(), 2);
        tx.commit().await.unwrap();
        drop(tx);

        let tree = store.find_tree("fresh").await.unwrap();
        let ids: Vec<&str> = tree.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(tree[0].depth, 0);
    }

    #[tokio::test]
    async fn test_update_node_missing_row() {
        let store = sample_store().await;
        let mut tx = store.begin().await.unwrap();
        let err = tx
            .update_node(
                "missing",
                &NodeFieldsUpdate {
                    depth: Some(1),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::RowNotFound { .. }));
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_custom_columns_on_file_database() {
        let temp_dir = TempDir::new().unwrap();
        let columns = NestedSetColumns {
            table: "categories".to_string(),
            left: "left_bound".to_string(),
            right: "right_bound".to_string(),
            tree: "root_id".to_string(),
            ..Default::default()
        };

        let store = LibsqlTreeStore::new(temp_dir.path().join("nested/tree.db"), columns)
            .await
            .unwrap();
        store.seed(&sample_nodes()).await.unwrap();

        let roots = store.find_roots().await.unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].id, "root");
    }

    #[tokio::test]
    async fn test_invalid_columns_rejected() {
        let columns = NestedSetColumns {
            left: "lft; --".to_string(),
            ..Default::default()
        };
        let result = LibsqlTreeStore::new_in_memory(columns).await;
        assert!(matches!(
            result,
            Err(DatabaseError::InitializationFailed(_))
        ));
    }
}

//! `GraphStore`: the persistent node/edge store. Binds the "embedded SQL
//! engine" interface from spec §6 concretely to `rusqlite`, opened once and
//! guarded by a single mutex (single-writer, matching spec §5's model;
//! SQLite itself serializes writers on one connection, so the core claims no
//! further reader/writer concurrency here).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use itertools::Itertools;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use types::{properties, vector, Algorithm, GraphEdge, GraphNode, Properties};

use crate::error::{BatchResult, GraphError};
use crate::schema;
use similarity::index::{HnswConfig, HnswIndex};
use similarity::VectorIndex;

/// Which way [`GraphStore::get_edges`] walks from a node.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Direction {
    Out,
    In,
    Both,
}

impl Direction {
    pub fn parse(s: &str) -> Result<Self, GraphError> {
        match s {
            "out" => Ok(Direction::Out),
            "in" => Ok(Direction::In),
            "both" => Ok(Direction::Both),
            other => Err(GraphError::InvalidDirection {
                direction: other.to_string(),
            }),
        }
    }
}

/// Filter accepted by [`GraphStore::get_all_nodes`].
#[derive(Debug, Clone, Default)]
pub struct NodeFilter {
    pub node_type: Option<String>,
    pub property_equals: Option<(String, String)>,
    pub limit: Option<usize>,
}

/// One operation inside an [`GraphStore::execute_batch`] call.
pub enum BatchOp {
    UpsertNode(GraphNode),
    UpsertEdge(GraphEdge),
    DeleteNode(String),
    DeleteEdge(String),
}

/// A chat message backing the TEMPR short-term/semantic/keyword channels.
/// Not part of the core node/edge data model; this is the ambient binding
/// the `memory` crate's recall channels read through.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub role: String,
    pub content: String,
    pub vector: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

pub struct GraphStore {
    conn: Mutex<Connection>,
    dim: usize,
    algorithm: Algorithm,
    hnsw: RwLock<Option<Arc<HnswIndex>>>,
}

impl GraphStore {
    pub fn open(path: &str, dim: usize, algorithm: Algorithm) -> Result<Self, GraphError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn, dim, algorithm)
    }

    pub fn open_in_memory(dim: usize, algorithm: Algorithm) -> Result<Self, GraphError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, dim, algorithm)
    }

    fn from_connection(conn: Connection, dim: usize, algorithm: Algorithm) -> Result<Self, GraphError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            dim,
            algorithm,
            hnsw: RwLock::new(None),
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Re-runs schema creation; a no-op when already present.
    pub fn init_schema(&self) -> Result<(), GraphError> {
        schema::init_schema(&self.conn.lock())
    }

    // ---------------------------------------------------------------- nodes

    #[tracing::instrument(skip(self, node))]
    pub fn upsert_node(&self, node: &GraphNode) -> Result<(), GraphError> {
        if node.id.is_empty() {
            return Err(GraphError::EmptyId);
        }
        if node.vector.is_empty() {
            return Err(GraphError::MissingVector);
        }
        vector::validate_dimension(&node.vector, self.dim)?;
        let blob = vector::encode(&node.vector)?;
        let props = properties::encode_properties(&node.properties)?;
        let now = Utc::now().to_rfc3339();

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO graph_nodes (id, vector, content, node_type, properties, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(id) DO UPDATE SET
                vector = excluded.vector,
                content = excluded.content,
                node_type = excluded.node_type,
                properties = excluded.properties,
                updated_at = excluded.updated_at",
            params![node.id, blob, node.content, node.node_type, props, now],
        )?;
        drop(conn);

        if let Some(hnsw) = self.hnsw.read().as_ref() {
            let _ = hnsw.delete(&node.id);
            let _ = hnsw.insert(node.id.clone(), node.vector.clone());
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub fn get_node(&self, id: &str) -> Result<GraphNode, GraphError> {
        let conn = self.conn.lock();
        let raw = conn
            .query_row(
                "SELECT id, vector, content, node_type, properties, created_at, updated_at
                 FROM graph_nodes WHERE id = ?1",
                params![id],
                RawNode::from_row,
            )
            .optional()?;
        raw.ok_or_else(|| GraphError::NodeNotFound { id: id.to_string() })?
            .try_into()
    }

    #[tracing::instrument(skip(self))]
    pub fn delete_node(&self, id: &str) -> Result<(), GraphError> {
        let conn = self.conn.lock();
        let affected = conn.execute("DELETE FROM graph_nodes WHERE id = ?1", params![id])?;
        drop(conn);
        if affected == 0 {
            return Err(GraphError::NodeNotFound { id: id.to_string() });
        }
        if let Some(hnsw) = self.hnsw.read().as_ref() {
            let _ = hnsw.delete(id);
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub fn get_nodes_batch(&self, ids: &[String]) -> Result<Vec<GraphNode>, GraphError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock();
        let placeholders = ids.iter().map(|_| "?").join(",");
        let sql = format!(
            "SELECT id, vector, content, node_type, properties, created_at, updated_at
             FROM graph_nodes WHERE id IN ({placeholders})"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(ids.iter()), RawNode::from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.try_into()?);
        }
        Ok(out)
    }

    #[tracing::instrument(skip(self, filter))]
    pub fn get_all_nodes(&self, filter: &NodeFilter) -> Result<Vec<GraphNode>, GraphError> {
        let conn = self.conn.lock();
        let mut sql = String::from(
            "SELECT id, vector, content, node_type, properties, created_at, updated_at FROM graph_nodes WHERE 1=1",
        );
        let mut bindings: Vec<String> = Vec::new();
        if let Some(node_type) = &filter.node_type {
            sql.push_str(" AND node_type = ?");
            bindings.push(node_type.clone());
        }
        if let Some((key, value)) = &filter.property_equals {
            sql.push_str(&format!(" AND json_extract(properties, '$.{key}') = ?"));
            bindings.push(value.clone());
        }
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(bindings.iter()), RawNode::from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.try_into()?);
        }
        Ok(out)
    }

    #[tracing::instrument(skip(self, nodes))]
    pub fn upsert_nodes_batch(&self, nodes: &[GraphNode]) -> Result<BatchResult, GraphError> {
        let mut result = BatchResult::default();
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO graph_nodes (id, vector, content, node_type, properties, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    vector = excluded.vector,
                    content = excluded.content,
                    node_type = excluded.node_type,
                    properties = excluded.properties,
                    updated_at = excluded.updated_at",
            )?;
            for node in nodes {
                match upsert_one_node(&mut stmt, node, self.dim) {
                    Ok(()) => result.record_success(),
                    Err(e) => result.record_failure(e),
                }
            }
        }
        tx.commit()?;
        Ok(result)
    }

    #[tracing::instrument(skip(self, ids))]
    pub fn delete_nodes_batch(&self, ids: &[String]) -> Result<BatchResult, GraphError> {
        let mut result = BatchResult::default();
        if ids.is_empty() {
            return Ok(result);
        }
        let conn = self.conn.lock();
        let placeholders = ids.iter().map(|_| "?").join(",");
        let sql = format!("DELETE FROM graph_nodes WHERE id IN ({placeholders})");
        let affected = conn.execute(&sql, params_from_iter(ids.iter()))?;
        result.success_count = affected;
        result.failed_count = ids.len().saturating_sub(affected);
        Ok(result)
    }

    // ---------------------------------------------------------------- edges

    #[tracing::instrument(skip(self, edge))]
    pub fn upsert_edge(&self, edge: &GraphEdge) -> Result<(), GraphError> {
        if edge.id.is_empty() {
            return Err(GraphError::EmptyId);
        }
        let weight = if edge.weight == 0.0 { 1.0 } else { edge.weight };
        let props = properties::encode_properties(&edge.properties)?;
        let vector_blob = edge
            .vector
            .as_ref()
            .map(|v| vector::encode(v))
            .transpose()?;
        let now = Utc::now().to_rfc3339();

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO graph_edges (id, from_node_id, to_node_id, edge_type, weight, properties, vector, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                from_node_id = excluded.from_node_id,
                to_node_id = excluded.to_node_id,
                edge_type = excluded.edge_type,
                weight = excluded.weight,
                properties = excluded.properties,
                vector = excluded.vector",
            params![
                edge.id,
                edge.from_node_id,
                edge.to_node_id,
                edge.edge_type,
                weight,
                props,
                vector_blob,
                now
            ],
        )?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub fn get_edges(&self, node_id: &str, direction: Direction) -> Result<Vec<GraphEdge>, GraphError> {
        let conn = self.conn.lock();
        let sql = match direction {
            Direction::Out => {
                "SELECT id, from_node_id, to_node_id, edge_type, weight, properties, vector, created_at
                 FROM graph_edges WHERE from_node_id = ?1"
            }
            Direction::In => {
                "SELECT id, from_node_id, to_node_id, edge_type, weight, properties, vector, created_at
                 FROM graph_edges WHERE to_node_id = ?1"
            }
            Direction::Both => {
                "SELECT id, from_node_id, to_node_id, edge_type, weight, properties, vector, created_at
                 FROM graph_edges WHERE from_node_id = ?1 OR to_node_id = ?1"
            }
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![node_id], RawEdge::from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.try_into()?);
        }
        Ok(out)
    }

    #[tracing::instrument(skip(self))]
    pub fn delete_edge(&self, id: &str) -> Result<(), GraphError> {
        let conn = self.conn.lock();
        let affected = conn.execute("DELETE FROM graph_edges WHERE id = ?1", params![id])?;
        if affected == 0 {
            return Err(GraphError::EdgeNotFound { id: id.to_string() });
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub fn get_edges_batch(&self, ids: &[String]) -> Result<Vec<GraphEdge>, GraphError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock();
        let placeholders = ids.iter().map(|_| "?").join(",");
        let sql = format!(
            "SELECT id, from_node_id, to_node_id, edge_type, weight, properties, vector, created_at
             FROM graph_edges WHERE id IN ({placeholders})"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(ids.iter()), RawEdge::from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.try_into()?);
        }
        Ok(out)
    }

    #[tracing::instrument(skip(self, edges))]
    pub fn upsert_edges_batch(&self, edges: &[GraphEdge]) -> Result<BatchResult, GraphError> {
        let mut result = BatchResult::default();
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO graph_edges (id, from_node_id, to_node_id, edge_type, weight, properties, vector, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                    from_node_id = excluded.from_node_id,
                    to_node_id = excluded.to_node_id,
                    edge_type = excluded.edge_type,
                    weight = excluded.weight,
                    properties = excluded.properties,
                    vector = excluded.vector",
            )?;
            for edge in edges {
                match upsert_one_edge(&mut stmt, edge) {
                    Ok(()) => result.record_success(),
                    Err(e) => result.record_failure(e),
                }
            }
        }
        tx.commit()?;
        Ok(result)
    }

    #[tracing::instrument(skip(self, ids))]
    pub fn delete_edges_batch(&self, ids: &[String]) -> Result<BatchResult, GraphError> {
        let mut result = BatchResult::default();
        if ids.is_empty() {
            return Ok(result);
        }
        let conn = self.conn.lock();
        let placeholders = ids.iter().map(|_| "?").join(",");
        let sql = format!("DELETE FROM graph_edges WHERE id IN ({placeholders})");
        let affected = conn.execute(&sql, params_from_iter(ids.iter()))?;
        result.success_count = affected;
        result.failed_count = ids.len().saturating_sub(affected);
        Ok(result)
    }

    /// Runs a mixed batch of node/edge upserts and deletes inside a single
    /// transaction. Per-op failures are reported in the result and do not
    /// abort the transaction unless a SQL-level error occurs.
    #[tracing::instrument(skip(self, ops))]
    pub fn execute_batch(&self, ops: Vec<BatchOp>) -> Result<BatchResult, GraphError> {
        let mut result = BatchResult::default();
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for op in ops {
            let outcome = match op {
                BatchOp::UpsertNode(node) => (|| -> Result<(), GraphError> {
                    if node.id.is_empty() {
                        return Err(GraphError::EmptyId);
                    }
                    vector::validate_dimension(&node.vector, self.dim)?;
                    let blob = vector::encode(&node.vector)?;
                    let props = properties::encode_properties(&node.properties)?;
                    let now = Utc::now().to_rfc3339();
                    tx.execute(
                        "INSERT INTO graph_nodes (id, vector, content, node_type, properties, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                         ON CONFLICT(id) DO UPDATE SET
                            vector = excluded.vector, content = excluded.content,
                            node_type = excluded.node_type, properties = excluded.properties,
                            updated_at = excluded.updated_at",
                        params![node.id, blob, node.content, node.node_type, props, now],
                    )?;
                    Ok(())
                })(),
                BatchOp::UpsertEdge(edge) => (|| -> Result<(), GraphError> {
                    if edge.id.is_empty() {
                        return Err(GraphError::EmptyId);
                    }
                    let weight = if edge.weight == 0.0 { 1.0 } else { edge.weight };
                    let props = properties::encode_properties(&edge.properties)?;
                    let vector_blob = edge.vector.as_ref().map(vector::encode).transpose()?;
                    let now = Utc::now().to_rfc3339();
                    tx.execute(
                        "INSERT INTO graph_edges (id, from_node_id, to_node_id, edge_type, weight, properties, vector, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                         ON CONFLICT(id) DO UPDATE SET
                            from_node_id = excluded.from_node_id, to_node_id = excluded.to_node_id,
                            edge_type = excluded.edge_type, weight = excluded.weight,
                            properties = excluded.properties, vector = excluded.vector",
                        params![edge.id, edge.from_node_id, edge.to_node_id, edge.edge_type, weight, props, vector_blob, now],
                    )?;
                    Ok(())
                })(),
                BatchOp::DeleteNode(id) => tx
                    .execute("DELETE FROM graph_nodes WHERE id = ?1", params![id])
                    .map(|_| ())
                    .map_err(GraphError::from),
                BatchOp::DeleteEdge(id) => tx
                    .execute("DELETE FROM graph_edges WHERE id = ?1", params![id])
                    .map(|_| ())
                    .map_err(GraphError::from),
            };
            match outcome {
                Ok(()) => result.record_success(),
                Err(e) => result.record_failure(e),
            }
        }
        tx.commit()?;
        Ok(result)
    }

    // --------------------------------------------------------------- stats

    pub fn node_count(&self) -> Result<usize, GraphError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM graph_nodes", [], |r| r.get(0))?;
        Ok(count as usize)
    }

    pub fn edge_count(&self) -> Result<usize, GraphError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM graph_edges", [], |r| r.get(0))?;
        Ok(count as usize)
    }

    /// All `(id, vector)` pairs, used by traversal/algorithms/hybrid search
    /// that need the whole node set in memory.
    pub(crate) fn all_node_vectors(&self) -> Result<Vec<(String, Vec<f32>)>, GraphError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id, vector FROM graph_nodes")?;
        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            let blob: Vec<u8> = row.get(1)?;
            Ok((id, blob))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, blob) = row?;
            out.push((id, vector::decode(&blob)?));
        }
        Ok(out)
    }

    /// Every edge with its full data, used by import/export.
    pub(crate) fn all_edges_full(&self) -> Result<Vec<GraphEdge>, GraphError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, from_node_id, to_node_id, edge_type, weight, properties, vector, created_at FROM graph_edges",
        )?;
        let rows = stmt.query_map([], RawEdge::from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.try_into()?);
        }
        Ok(out)
    }

    /// All `(from, to, edge_type, weight)` tuples, used by traversal and
    /// graph algorithms.
    pub(crate) fn all_edges_light(&self) -> Result<Vec<(String, String, String, f64)>, GraphError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT from_node_id, to_node_id, edge_type, weight FROM graph_edges")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// All `(id, node_type)` pairs, used by traversal's `node_types` filter.
    pub(crate) fn all_node_types(&self) -> Result<Vec<(String, String)>, GraphError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id, node_type FROM graph_nodes")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// All `(id, from, to, edge_type, weight)` tuples, used by traversal's
    /// `shortest_path` which needs to report the edge ids it walked.
    pub(crate) fn all_edges_with_id(&self) -> Result<Vec<(String, String, String, String, f64)>, GraphError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id, from_node_id, to_node_id, edge_type, weight FROM graph_edges")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, f64>(4)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub(crate) fn node_exists(&self, id: &str) -> Result<bool, GraphError> {
        let conn = self.conn.lock();
        let exists: Option<i64> = conn
            .query_row("SELECT 1 FROM graph_nodes WHERE id = ?1", params![id], |r| r.get(0))
            .optional()?;
        Ok(exists.is_some())
    }

    pub(crate) fn node_vector(&self, id: &str) -> Result<Option<Vec<f32>>, GraphError> {
        let conn = self.conn.lock();
        let blob: Option<Vec<u8>> = conn
            .query_row("SELECT vector FROM graph_nodes WHERE id = ?1", params![id], |r| r.get(0))
            .optional()?;
        blob.map(|b| vector::decode(&b).map_err(GraphError::from)).transpose()
    }

    // ------------------------------------------------------------ messages

    #[tracing::instrument(skip(self, content, vector))]
    pub fn add_message(
        &self,
        id: &str,
        session_id: &str,
        user_id: &str,
        role: &str,
        content: &str,
        vector: Option<&[f32]>,
    ) -> Result<(), GraphError> {
        let blob = vector.map(types::vector::encode).transpose()?;
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO messages (id, session_id, user_id, role, content, vector, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![id, session_id, user_id, role, content, blob, now],
        )?;
        Ok(())
    }

    /// Last `limit` messages of a session, oldest first.
    #[tracing::instrument(skip(self))]
    pub fn recent_messages(&self, session_id: &str, limit: usize) -> Result<Vec<Message>, GraphError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, user_id, role, content, vector, created_at FROM messages
             WHERE session_id = ?1 ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![session_id, limit as i64], RawMessage::from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.try_into()?);
        }
        out.reverse();
        Ok(out)
    }

    /// BM25-ranked keyword search over messages of `user_id`, excluding
    /// `exclude_session` if given. Higher score = more relevant.
    #[tracing::instrument(skip(self, query))]
    pub fn keyword_search_messages(
        &self,
        user_id: &str,
        exclude_session: Option<&str>,
        query: &str,
        limit: usize,
    ) -> Result<Vec<(Message, f64)>, GraphError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock();
        let sql = "SELECT m.id, m.session_id, m.user_id, m.role, m.content, m.vector, m.created_at, bm25(messages_fts) as rank
                   FROM messages_fts
                   JOIN messages m ON m.rowid = messages_fts.rowid
                   WHERE messages_fts MATCH ?1 AND m.user_id = ?2
                     AND (?3 IS NULL OR m.session_id != ?3)
                   ORDER BY rank LIMIT ?4";
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(
            params![fts_query(query), user_id, exclude_session, limit as i64],
            |row| {
                let raw = RawMessage::from_row(row)?;
                let rank: f64 = row.get(7)?;
                Ok((raw, rank))
            },
        )?;
        let mut out = Vec::new();
        for row in rows {
            let (raw, rank) = row?;
            // bm25() in SQLite is lower-is-better; invert so callers see
            // higher-is-more-relevant, matching every other ranked channel.
            out.push((raw.try_into()?, -rank));
        }
        Ok(out)
    }

    /// Exact cosine/dot/euclidean search over message vectors of `user_id`,
    /// excluding `exclude_session` if given. Brute force: message volume in
    /// an embedded single-process store does not warrant an ANN index.
    #[tracing::instrument(skip(self, query_vec))]
    pub fn semantic_search_messages(
        &self,
        user_id: &str,
        exclude_session: Option<&str>,
        query_vec: &[f32],
        limit: usize,
    ) -> Result<Vec<(Message, f32)>, GraphError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, user_id, role, content, vector, created_at FROM messages
             WHERE user_id = ?1 AND (?2 IS NULL OR session_id != ?2) AND vector IS NOT NULL",
        )?;
        let rows = stmt.query_map(params![user_id, exclude_session], RawMessage::from_row)?;
        let mut scored = Vec::new();
        for row in rows {
            let msg: Message = row?.try_into()?;
            if let Some(v) = &msg.vector {
                let score = similarity::score(self.algorithm, query_vec, v);
                scored.push((msg, score));
            }
        }
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    // --------------------------------------------------------- HNSW accel

    /// Builds an in-memory HNSW index over every stored node vector. Opt-in
    /// accuracy/speed trade-off used by [`crate::hybrid`] and
    /// [`crate::algorithms::similarity_in_graph`]; off by default (exact
    /// brute force over `graph_nodes`).
    #[tracing::instrument(skip(self, config))]
    pub fn enable_hnsw_acceleration(&self, config: HnswConfig) -> Result<(), GraphError> {
        let index = HnswIndex::new(self.dim, self.algorithm, config, 0xC0FFEE);
        for (id, v) in self.all_node_vectors()? {
            let _ = index.insert(id, v);
        }
        *self.hnsw.write() = Some(Arc::new(index));
        Ok(())
    }

    pub fn hnsw(&self) -> Option<Arc<HnswIndex>> {
        self.hnsw.read().clone()
    }
}

/// Escapes an FTS5 MATCH query by quoting the whole phrase, so punctuation
/// in user text does not get parsed as FTS5 query syntax.
fn fts_query(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}

fn upsert_one_node(
    stmt: &mut rusqlite::Statement<'_>,
    node: &GraphNode,
    dim: usize,
) -> Result<(), GraphError> {
    if node.id.is_empty() {
        return Err(GraphError::EmptyId);
    }
    vector::validate_dimension(&node.vector, dim)?;
    let blob = vector::encode(&node.vector)?;
    let props = properties::encode_properties(&node.properties)?;
    let now = Utc::now().to_rfc3339();
    stmt.execute(params![node.id, blob, node.content, node.node_type, props, now])?;
    Ok(())
}

fn upsert_one_edge(stmt: &mut rusqlite::Statement<'_>, edge: &GraphEdge) -> Result<(), GraphError> {
    if edge.id.is_empty() {
        return Err(GraphError::EmptyId);
    }
    let weight = if edge.weight == 0.0 { 1.0 } else { edge.weight };
    let props = properties::encode_properties(&edge.properties)?;
    let vector_blob = edge.vector.as_ref().map(vector::encode).transpose()?;
    let now = Utc::now().to_rfc3339();
    stmt.execute(params![
        edge.id,
        edge.from_node_id,
        edge.to_node_id,
        edge.edge_type,
        weight,
        props,
        vector_blob,
        now
    ])?;
    Ok(())
}

struct RawNode {
    id: String,
    vector: Vec<u8>,
    content: String,
    node_type: String,
    properties: String,
    created_at: String,
    updated_at: String,
}

impl RawNode {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            vector: row.get(1)?,
            content: row.get(2)?,
            node_type: row.get(3)?,
            properties: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}

impl TryFrom<RawNode> for GraphNode {
    type Error = GraphError;

    fn try_from(raw: RawNode) -> Result<Self, GraphError> {
        Ok(GraphNode {
            id: raw.id,
            vector: vector::decode(&raw.vector)?,
            content: raw.content,
            node_type: raw.node_type,
            properties: decode_properties_lenient(&raw.properties)?,
            created_at: parse_rfc3339(&raw.created_at),
            updated_at: parse_rfc3339(&raw.updated_at),
        })
    }
}

struct RawEdge {
    id: String,
    from_node_id: String,
    to_node_id: String,
    edge_type: String,
    weight: f64,
    properties: String,
    vector: Option<Vec<u8>>,
    created_at: String,
}

impl RawEdge {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            from_node_id: row.get(1)?,
            to_node_id: row.get(2)?,
            edge_type: row.get(3)?,
            weight: row.get(4)?,
            properties: row.get(5)?,
            vector: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

impl TryFrom<RawEdge> for GraphEdge {
    type Error = GraphError;

    fn try_from(raw: RawEdge) -> Result<Self, GraphError> {
        Ok(GraphEdge {
            id: raw.id,
            from_node_id: raw.from_node_id,
            to_node_id: raw.to_node_id,
            edge_type: raw.edge_type,
            weight: raw.weight,
            properties: decode_properties_lenient(&raw.properties)?,
            vector: raw.vector.map(|b| vector::decode(&b)).transpose()?,
            created_at: parse_rfc3339(&raw.created_at),
        })
    }
}

struct RawMessage {
    id: String,
    session_id: String,
    user_id: String,
    role: String,
    content: String,
    vector: Option<Vec<u8>>,
    created_at: String,
}

impl RawMessage {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            session_id: row.get(1)?,
            user_id: row.get(2)?,
            role: row.get(3)?,
            content: row.get(4)?,
            vector: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}

impl TryFrom<RawMessage> for Message {
    type Error = GraphError;

    fn try_from(raw: RawMessage) -> Result<Self, GraphError> {
        Ok(Message {
            id: raw.id,
            session_id: raw.session_id,
            user_id: raw.user_id,
            role: raw.role,
            content: raw.content,
            vector: raw.vector.map(|b| vector::decode(&b)).transpose()?,
            created_at: parse_rfc3339(&raw.created_at),
        })
    }
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn decode_properties_lenient(s: &str) -> Result<Properties, GraphError> {
    Ok(properties::decode_properties(s)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use types::Properties;

    fn store() -> GraphStore {
        GraphStore::open_in_memory(3, Algorithm::CosineSimilarity).unwrap()
    }

    fn node(id: &str, v: [f32; 3]) -> GraphNode {
        GraphNode::new(id, v.to_vec(), "", "doc", Properties::new()).unwrap()
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let store = store();
        store.upsert_node(&node("a", [1.0, 0.0, 0.0])).unwrap();
        let fetched = store.get_node("a").unwrap();
        assert_eq!(fetched.vector, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn repeated_upsert_preserves_created_at_and_advances_updated_at() {
        let store = store();
        store.upsert_node(&node("a", [1.0, 0.0, 0.0])).unwrap();
        let first = store.get_node("a").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.upsert_node(&node("a", [0.0, 1.0, 0.0])).unwrap();
        let second = store.get_node("a").unwrap();
        assert_eq!(first.created_at, second.created_at);
        assert!(second.updated_at >= first.updated_at);
        assert_eq!(second.vector, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn get_missing_node_is_not_found() {
        let store = store();
        assert!(matches!(
            store.get_node("missing").unwrap_err(),
            GraphError::NodeNotFound { .. }
        ));
    }

    #[test]
    fn cascade_delete_removes_incident_edges() {
        let store = store();
        store.upsert_node(&node("a", [1.0, 0.0, 0.0])).unwrap();
        store.upsert_node(&node("b", [0.0, 1.0, 0.0])).unwrap();
        let edge = GraphEdge::new("e1", "a", "b", "knows", 0.8, Properties::new(), None).unwrap();
        store.upsert_edge(&edge).unwrap();

        store.delete_node("a").unwrap();
        assert!(store.get_node("a").is_err());
        assert!(store.get_edges("b", Direction::In).unwrap().is_empty());
        assert_eq!(store.edge_count().unwrap(), 0);
    }

    #[test]
    fn edge_weight_zero_defaults_to_one() {
        let store = store();
        store.upsert_node(&node("a", [1.0, 0.0, 0.0])).unwrap();
        store.upsert_node(&node("b", [0.0, 1.0, 0.0])).unwrap();
        let mut edge = GraphEdge::new("e1", "a", "b", "knows", 1.0, Properties::new(), None).unwrap();
        edge.weight = 0.0;
        store.upsert_edge(&edge).unwrap();
        let edges = store.get_edges("a", Direction::Out).unwrap();
        assert_eq!(edges[0].weight, 1.0);
    }

    #[test]
    fn batch_upsert_reports_partial_failures_without_aborting() {
        let store = store();
        let good = node("a", [1.0, 0.0, 0.0]);
        let mut bad = node("b", [1.0, 0.0, 0.0]);
        bad.id = String::new();
        let result = store.upsert_nodes_batch(&[good, bad]).unwrap();
        assert_eq!(result.success_count, 1);
        assert_eq!(result.failed_count, 1);
        assert!(store.get_node("a").is_ok());
    }

    #[test]
    fn keyword_search_excludes_current_session() {
        let store = store();
        store
            .add_message("m1", "s1", "u1", "user", "Alice lives in Paris", None)
            .unwrap();
        store
            .add_message("m2", "s2", "u1", "user", "Alice lives in Paris too", None)
            .unwrap();
        let results = store
            .keyword_search_messages("u1", Some("s1"), "Paris", 10)
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.id, "m2");
    }

    #[test]
    fn recent_messages_returns_oldest_first() {
        let store = store();
        store.add_message("m1", "s1", "u1", "user", "first", None).unwrap();
        store.add_message("m2", "s1", "u1", "user", "second", None).unwrap();
        let recent = store.recent_messages("s1", 5).unwrap();
        assert_eq!(recent.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(), ["m1", "m2"]);
    }
}

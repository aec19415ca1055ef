//! File-level dependency graph backed by SQLite.
//!
//! Forward and reverse edges are the same rows read in opposite
//! directions, so the two views can never drift apart. Read operations
//! degrade to empty results so a broken graph never blocks retrieval.
//!
//! Edge endpoints are extension-less module paths: resolved imports carry
//! no extension while on-disk paths do, and both must land on the same
//! node for multi-hop traversal to chain.

use std::collections::{HashMap, HashSet, VecDeque};
use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::error::{IndexError, Result};

/// Which way a transitive traversal walks the edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DepDirection {
    /// Follow what the file imports.
    #[default]
    Imports,
    /// Follow what imports the file.
    ImportedBy,
}

#[derive(Debug, Clone)]
pub struct DepGraph {
    pool: SqlitePool,
}

impl DepGraph {
    /// Open (or create) the graph database and run migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub async fn open(path: &str) -> Result<Self> {
        let url = if path == ":memory:" {
            "sqlite::memory:".to_owned()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let opts = SqliteConnectOptions::from_str(&url)
            .map_err(IndexError::Sqlite)?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Replace the outgoing edges of `importer` with `imported`, atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    pub async fn set_deps(&self, project: &str, importer: &str, imported: &[String]) -> Result<()> {
        let importer = module_key(importer);
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM dep_edges WHERE project = ? AND importer = ?")
            .bind(project)
            .bind(importer)
            .execute(&mut *tx)
            .await?;
        for dep in imported {
            let dep = module_key(dep);
            if dep == importer {
                continue;
            }
            sqlx::query(
                "INSERT OR IGNORE INTO dep_edges (project, importer, imported) VALUES (?, ?, ?)",
            )
            .bind(project)
            .bind(importer)
            .bind(dep)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Drop the outgoing edges of a deleted file. Edges pointing at it are
    /// kept: the importers still reference that path in their source.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn remove_file(&self, project: &str, file: &str) -> Result<()> {
        sqlx::query("DELETE FROM dep_edges WHERE project = ? AND importer = ?")
            .bind(project)
            .bind(module_key(file))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Drop every edge of a project.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn clear(&self, project: &str) -> Result<()> {
        sqlx::query("DELETE FROM dep_edges WHERE project = ?")
            .bind(project)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Files that `file` imports directly.
    pub async fn deps(&self, project: &str, file: &str) -> Vec<String> {
        let rows: sqlx::Result<Vec<(String,)>> = sqlx::query_as(
            "SELECT imported FROM dep_edges WHERE project = ? AND importer = ? ORDER BY imported",
        )
        .bind(project)
        .bind(module_key(file))
        .fetch_all(&self.pool)
        .await;
        match rows {
            Ok(rows) => rows.into_iter().map(|(f,)| f).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "dependency lookup failed");
                Vec::new()
            }
        }
    }

    /// Files that import `file` directly.
    pub async fn reverse_deps(&self, project: &str, file: &str) -> Vec<String> {
        let rows: sqlx::Result<Vec<(String,)>> = sqlx::query_as(
            "SELECT importer FROM dep_edges WHERE project = ? AND imported = ? ORDER BY importer",
        )
        .bind(project)
        .bind(module_key(file))
        .fetch_all(&self.pool)
        .await;
        match rows {
            Ok(rows) => rows.into_iter().map(|(f,)| f).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "reverse dependency lookup failed");
                Vec::new()
            }
        }
    }

    /// Breadth-first transitive traversal with each file's distance from
    /// the root, walking `direction`. The root itself is not in the
    /// result, and cycles terminate because visited files are never
    /// re-enqueued.
    pub async fn transitive_deps(
        &self,
        project: &str,
        file: &str,
        max_depth: usize,
        direction: DepDirection,
    ) -> HashMap<String, usize> {
        let root = module_key(file).to_owned();
        let mut levels = HashMap::new();
        let mut visited: HashSet<String> = HashSet::from([root.clone()]);
        let mut queue: VecDeque<(String, usize)> = VecDeque::from([(root, 0)]);

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let neighbors = match direction {
                DepDirection::Imports => self.deps(project, &current).await,
                DepDirection::ImportedBy => self.reverse_deps(project, &current).await,
            };
            for dep in neighbors {
                if visited.insert(dep.clone()) {
                    levels.insert(dep.clone(), depth + 1);
                    queue.push_back((dep, depth + 1));
                }
            }
        }
        levels
    }

    /// Rank files by direct reverse-dependency count, descending. Ties
    /// break alphabetically. An empty `candidates` slice ranks the whole
    /// project; otherwise only the named files are considered.
    pub async fn top_files_by_rev_deps(
        &self,
        project: &str,
        candidates: &[String],
        limit: usize,
    ) -> Vec<(String, usize)> {
        let mut sql =
            String::from("SELECT imported, COUNT(*) AS n FROM dep_edges WHERE project = ?");
        if !candidates.is_empty() {
            let marks = vec!["?"; candidates.len()].join(", ");
            sql.push_str(&format!(" AND imported IN ({marks})"));
        }
        sql.push_str(" GROUP BY imported ORDER BY n DESC, imported ASC LIMIT ?");

        let mut query = sqlx::query_as(&sql).bind(project);
        for candidate in candidates {
            query = query.bind(module_key(candidate));
        }
        let rows: sqlx::Result<Vec<(String, i64)>> = query
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await;
        match rows {
            Ok(rows) => rows
                .into_iter()
                .map(|(f, n)| (f, usize::try_from(n).unwrap_or(0)))
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "top files query failed");
                Vec::new()
            }
        }
    }
}

fn module_key(path: &str) -> &str {
    let name_start = path.rfind('/').map_or(0, |i| i + 1);
    match path[name_start..].rfind('.') {
        Some(dot) if dot > 0 => &path[..name_start + dot],
        _ => path,
    }
}

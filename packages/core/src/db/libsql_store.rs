//! libsql implementation of [`ChapterStore`]
//!
//! Structural writes (`insert_chapter`, `commit_batch`) run inside
//! `BEGIN IMMEDIATE … COMMIT`: the revision check, every row change and
//! the revision bump either all land or none do.

use crate::db::{BookSnapshot, ChapterBatch, ChapterStore, DatabaseError, DatabaseService};
use crate::models::{Book, Chapter, ChapterContentUpdate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

const BOOK_COLUMNS: &str = "id, owner_id, title, author, revision, created_at, modified_at";
const CHAPTER_COLUMNS: &str =
    "id, book_id, title, content, parent_id, sort_order, level, created_at, modified_at";

/// ChapterStore backed by a libsql database file
#[derive(Debug, Clone)]
pub struct LibsqlChapterStore {
    db: Arc<DatabaseService>,
}

impl LibsqlChapterStore {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self { db }
    }

    /// Open the database at `path` and wrap it
    pub async fn open(path: std::path::PathBuf) -> Result<Self, DatabaseError> {
        Ok(Self::new(Arc::new(DatabaseService::new(path).await?)))
    }

    async fn fetch_book(
        conn: &libsql::Connection,
        id: &str,
    ) -> Result<Option<Book>, DatabaseError> {
        let mut rows = conn
            .query(
                &format!("SELECT {} FROM books WHERE id = ?", BOOK_COLUMNS),
                [id],
            )
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to query book: {}", e)))?;

        match rows.next().await? {
            Some(row) => Ok(Some(row_to_book(&row)?)),
            None => Ok(None),
        }
    }

    async fn current_revision(
        conn: &libsql::Connection,
        book_id: &str,
    ) -> Result<i64, DatabaseError> {
        let mut rows = conn
            .query("SELECT revision FROM books WHERE id = ?", [book_id])
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to read revision: {}", e)))?;

        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)?),
            None => Err(DatabaseError::book_not_found(book_id)),
        }
    }

    async fn read_snapshot(
        conn: &libsql::Connection,
        book_id: &str,
    ) -> Result<BookSnapshot, DatabaseError> {
        let book = Self::fetch_book(conn, book_id)
            .await?
            .ok_or_else(|| DatabaseError::book_not_found(book_id))?;

        let mut rows = conn
            .query(
                &format!(
                    "SELECT {} FROM chapters WHERE book_id = ? ORDER BY parent_id, sort_order, id",
                    CHAPTER_COLUMNS
                ),
                [book_id],
            )
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to load chapters: {}", e)))?;

        let mut chapters = Vec::new();
        while let Some(row) = rows.next().await? {
            chapters.push(row_to_chapter(&row)?);
        }
        Ok(BookSnapshot { book, chapters })
    }

    async fn insert_checked(
        conn: &libsql::Connection,
        chapter: &Chapter,
        expected_revision: i64,
    ) -> Result<(), DatabaseError> {
        let actual = Self::current_revision(conn, &chapter.book_id).await?;
        if actual != expected_revision {
            return Err(DatabaseError::revision_conflict(
                chapter.book_id.clone(),
                expected_revision,
                actual,
            ));
        }
        Self::insert_row(conn, chapter).await?;
        Self::bump_revision(conn, &chapter.book_id, &Utc::now().to_rfc3339()).await
    }

    /// Check the revision, run `batch` changes and bump the revision.
    /// Must be called inside an open transaction.
    async fn apply_batch(
        conn: &libsql::Connection,
        batch: &ChapterBatch,
    ) -> Result<i64, DatabaseError> {
        let actual = Self::current_revision(conn, &batch.book_id).await?;
        if actual != batch.expected_revision {
            return Err(DatabaseError::revision_conflict(
                batch.book_id.clone(),
                batch.expected_revision,
                actual,
            ));
        }

        let now = Utc::now().to_rfc3339();

        for id in &batch.deletes {
            let affected = conn
                .execute(
                    "DELETE FROM chapters WHERE id = ? AND book_id = ?",
                    (id.as_str(), batch.book_id.as_str()),
                )
                .await
                .map_err(|e| {
                    DatabaseError::sql_execution(format!("Failed to delete chapter {}: {}", id, e))
                })?;
            if affected == 0 {
                return Err(DatabaseError::chapter_not_found(id.clone()));
            }
        }

        for position in &batch.updates {
            let affected = conn
                .execute(
                    "UPDATE chapters SET parent_id = ?, sort_order = ?, level = ?, modified_at = ?
                     WHERE id = ? AND book_id = ?",
                    (
                        position.parent_id.as_deref(),
                        position.order as i64,
                        position.level as i64,
                        now.as_str(),
                        position.id.as_str(),
                        batch.book_id.as_str(),
                    ),
                )
                .await
                .map_err(|e| {
                    DatabaseError::sql_execution(format!(
                        "Failed to update chapter {}: {}",
                        position.id, e
                    ))
                })?;
            if affected == 0 {
                return Err(DatabaseError::chapter_not_found(position.id.clone()));
            }
        }

        Self::bump_revision(conn, &batch.book_id, &now).await?;
        Ok(actual + 1)
    }

    async fn bump_revision(
        conn: &libsql::Connection,
        book_id: &str,
        now: &str,
    ) -> Result<(), DatabaseError> {
        conn.execute(
            "UPDATE books SET revision = revision + 1, modified_at = ? WHERE id = ?",
            (now, book_id),
        )
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to bump revision: {}", e)))?;
        Ok(())
    }

    async fn insert_row(conn: &libsql::Connection, chapter: &Chapter) -> Result<(), DatabaseError> {
        conn.execute(
            &format!(
                "INSERT INTO chapters ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                CHAPTER_COLUMNS
            ),
            libsql::params![
                chapter.id.as_str(),
                chapter.book_id.as_str(),
                chapter.title.as_str(),
                chapter.content.as_str(),
                chapter.parent_id.as_deref(),
                chapter.order as i64,
                chapter.level as i64,
                chapter.created_at.to_rfc3339(),
                chapter.modified_at.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to insert chapter {}: {}", chapter.id, e))
        })?;
        Ok(())
    }

    async fn begin(conn: &libsql::Connection) -> Result<(), DatabaseError> {
        conn.execute("BEGIN IMMEDIATE", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to begin transaction: {}", e))
        })?;
        Ok(())
    }

    /// COMMIT on success, ROLLBACK on error
    async fn finish<T>(
        conn: &libsql::Connection,
        result: Result<T, DatabaseError>,
    ) -> Result<T, DatabaseError> {
        match result {
            Ok(value) => {
                if let Err(e) = conn.execute("COMMIT", ()).await {
                    let _rollback = conn.execute("ROLLBACK", ()).await;
                    return Err(DatabaseError::sql_execution(format!(
                        "Failed to commit transaction: {}",
                        e
                    )));
                }
                Ok(value)
            }
            Err(e) => {
                let _rollback = conn.execute("ROLLBACK", ()).await;
                Err(e)
            }
        }
    }
}

#[async_trait]
impl ChapterStore for LibsqlChapterStore {
    async fn create_book(&self, book: Book) -> Result<Book, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;
        conn.execute(
            &format!(
                "INSERT INTO books ({}) VALUES (?, ?, ?, ?, ?, ?, ?)",
                BOOK_COLUMNS
            ),
            (
                book.id.as_str(),
                book.owner_id.as_str(),
                book.title.as_str(),
                book.author.as_deref(),
                book.revision,
                book.created_at.to_rfc3339(),
                book.modified_at.to_rfc3339(),
            ),
        )
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to insert book: {}", e)))?;

        Ok(book)
    }

    async fn get_book(&self, id: &str) -> Result<Option<Book>, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;
        Self::fetch_book(&conn, id).await
    }

    async fn list_books(&self, owner_id: &str) -> Result<Vec<Book>, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {} FROM books WHERE owner_id = ? ORDER BY created_at, id",
                    BOOK_COLUMNS
                ),
                [owner_id],
            )
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to list books: {}", e)))?;

        let mut books = Vec::new();
        while let Some(row) = rows.next().await? {
            books.push(row_to_book(&row)?);
        }
        Ok(books)
    }

    async fn load_all(&self, book_id: &str) -> Result<BookSnapshot, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;

        // Read book and chapters in one transaction so the revision matches
        conn.execute("BEGIN", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to begin read: {}", e))
        })?;
        let result = Self::read_snapshot(&conn, book_id).await;
        Self::finish(&conn, result).await
    }

    async fn get_chapter(&self, id: &str) -> Result<Option<Chapter>, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {} FROM chapters WHERE id = ?", CHAPTER_COLUMNS),
                [id],
            )
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to query chapter: {}", e)))?;

        match rows.next().await? {
            Some(row) => Ok(Some(row_to_chapter(&row)?)),
            None => Ok(None),
        }
    }

    async fn insert_chapter(
        &self,
        chapter: Chapter,
        expected_revision: i64,
    ) -> Result<Chapter, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;
        Self::begin(&conn).await?;

        let result = Self::insert_checked(&conn, &chapter, expected_revision).await;
        Self::finish(&conn, result).await?;
        Ok(chapter)
    }

    async fn update_chapter_content(
        &self,
        id: &str,
        update: ChapterContentUpdate,
    ) -> Result<Chapter, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;
        let affected = conn
            .execute(
                "UPDATE chapters SET title = COALESCE(?, title), content = COALESCE(?, content), modified_at = ?
                 WHERE id = ?",
                (
                    update.title.as_deref(),
                    update.content.as_deref(),
                    Utc::now().to_rfc3339(),
                    id,
                ),
            )
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to update chapter: {}", e)))?;

        if affected == 0 {
            return Err(DatabaseError::chapter_not_found(id));
        }

        self.get_chapter(id)
            .await?
            .ok_or_else(|| DatabaseError::chapter_not_found(id))
    }

    async fn commit_batch(&self, batch: ChapterBatch) -> Result<i64, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;
        Self::begin(&conn).await?;

        let result = Self::apply_batch(&conn, &batch).await;
        let revision = Self::finish(&conn, result).await?;

        tracing::info!(
            "Committed batch for book '{}': {} update(s), {} delete(s), revision {}",
            batch.book_id,
            batch.updates.len(),
            batch.deletes.len(),
            revision
        );
        Ok(revision)
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::invalid_data(format!("bad timestamp '{}': {}", value, e)))
}

fn non_negative(value: i64, column: &str) -> Result<u32, DatabaseError> {
    u32::try_from(value)
        .map_err(|_| DatabaseError::invalid_data(format!("{} out of range: {}", column, value)))
}

fn row_to_book(row: &libsql::Row) -> Result<Book, DatabaseError> {
    Ok(Book {
        id: row.get::<String>(0)?,
        owner_id: row.get::<String>(1)?,
        title: row.get::<String>(2)?,
        author: row.get::<Option<String>>(3)?,
        revision: row.get::<i64>(4)?,
        created_at: parse_timestamp(&row.get::<String>(5)?)?,
        modified_at: parse_timestamp(&row.get::<String>(6)?)?,
    })
}

fn row_to_chapter(row: &libsql::Row) -> Result<Chapter, DatabaseError> {
    Ok(Chapter {
        id: row.get::<String>(0)?,
        book_id: row.get::<String>(1)?,
        title: row.get::<String>(2)?,
        content: row.get::<String>(3)?,
        parent_id: row.get::<Option<String>>(4)?,
        order: non_negative(row.get::<i64>(5)?, "sort_order")?,
        level: non_negative(row.get::<i64>(6)?, "level")?,
        created_at: parse_timestamp(&row.get::<String>(7)?)?,
        modified_at: parse_timestamp(&row.get::<String>(8)?)?,
    })
}

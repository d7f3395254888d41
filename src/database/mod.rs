use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Sqlite, SqlitePool, Transaction, migrate::MigrateDatabase};
use tracing::{error, info};

use crate::models::Listing;

/// Result of a guarded insert. Re-inserting a known `ref_no` is a no-op:
/// first write wins, the stored row is never updated in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn connect(database_url: &str) -> Result<Self> {
        // Create database file if it doesn't exist
        if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
            info!("Creating database at {database_url}");
            Sqlite::create_database(database_url).await?;
        }

        // Single-writer model: one shared connection per run.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(database_url)
            .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS vehicles (
                ref_no TEXT PRIMARY KEY,
                year INTEGER,
                title TEXT,
                mileage INTEGER,
                engine_size INTEGER,
                engine_code TEXT,
                model_code TEXT,
                transmission TEXT,
                drive TEXT,
                steering TEXT,
                doors INTEGER,
                seats INTEGER,
                fuel_type TEXT,
                auction_grade TEXT,
                total_price REAL,
                link TEXT,
                colour TEXT,
                location TEXT,
                sent_to_discord INTEGER DEFAULT 0
            )
            ",
        )
        .execute(&pool)
        .await?;

        info!("Database initialized successfully");
        Ok(Self { pool })
    }

    pub async fn exists(&self, ref_no: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM vehicles WHERE ref_no = ?")
            .bind(ref_no)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }

    pub async fn insert(&self, listing: &Listing) -> Result<InsertOutcome> {
        let mut tx = self.pool.begin().await?;
        let outcome = Self::insert_tx(&mut tx, listing).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    /// Insert a buffered batch in one transaction. A failing record is
    /// logged and skipped; the rest of the batch still commits.
    pub async fn insert_batch(&self, listings: &[Listing]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0usize;

        for listing in listings {
            match Self::insert_tx(&mut tx, listing).await {
                Ok(InsertOutcome::Inserted) => inserted += 1,
                Ok(InsertOutcome::AlreadyExists) => {
                    info!(
                        "Record with ref no {} already exists, skipping insertion",
                        listing.ref_no
                    );
                }
                Err(e) => error!("Error inserting data for {}: {e}", listing.ref_no),
            }
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn insert_tx(
        tx: &mut Transaction<'_, Sqlite>,
        listing: &Listing,
    ) -> Result<InsertOutcome> {
        let existing = sqlx::query("SELECT 1 FROM vehicles WHERE ref_no = ?")
            .bind(&listing.ref_no)
            .fetch_optional(&mut **tx)
            .await?;

        if existing.is_some() {
            return Ok(InsertOutcome::AlreadyExists);
        }

        sqlx::query(
            r"
            INSERT INTO vehicles (
                ref_no, year, title, mileage, engine_size, engine_code,
                model_code, transmission, drive, steering, doors, seats,
                fuel_type, auction_grade, total_price, link, colour, location
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&listing.ref_no)
        .bind(listing.year)
        .bind(&listing.title)
        .bind(listing.mileage)
        .bind(listing.engine_size)
        .bind(&listing.engine_code)
        .bind(&listing.model_code)
        .bind(&listing.transmission)
        .bind(&listing.drive)
        .bind(&listing.steering)
        .bind(listing.doors)
        .bind(listing.seats)
        .bind(&listing.fuel_type)
        .bind(&listing.auction_grade)
        .bind(listing.total_price)
        .bind(&listing.link)
        .bind(&listing.colour)
        .bind(&listing.location)
        .execute(&mut **tx)
        .await?;

        Ok(InsertOutcome::Inserted)
    }

    pub async fn all(&self) -> Result<Vec<Listing>> {
        let listings = sqlx::query_as::<_, Listing>("SELECT * FROM vehicles")
            .fetch_all(&self.pool)
            .await?;

        Ok(listings)
    }

    pub async fn unnotified(&self) -> Result<Vec<Listing>> {
        let listings =
            sqlx::query_as::<_, Listing>("SELECT * FROM vehicles WHERE sent_to_discord = 0")
                .fetch_all(&self.pool)
                .await?;

        Ok(listings)
    }

    pub async fn delete(&self, ref_no: &str) -> Result<()> {
        sqlx::query("DELETE FROM vehicles WHERE ref_no = ?")
            .bind(ref_no)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn mark_notified(&self, ref_no: &str) -> Result<()> {
        sqlx::query("UPDATE vehicles SET sent_to_discord = 1 WHERE ref_no = ?")
            .bind(ref_no)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}

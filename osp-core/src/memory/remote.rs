//! Network-backed remote tiers: Redis for the fast cache, MongoDB for documents.

#[cfg(feature = "redis")]
pub use self::redis_cache::RedisCache;

#[cfg(feature = "mongo")]
pub use self::mongo_documents::MongoDocuments;

#[cfg(feature = "redis")]
mod redis_cache {
    use std::time::Duration;

    use redis::Commands;

    use crate::anchor::{AnchorId, StoredRecord};
    use crate::error::{Error, Result};
    use crate::memory::tier::CacheTier;

    const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

    fn redis_err(e: redis::RedisError) -> Error {
        Error::storage("cache", e.to_string())
    }

    /// Redis client for the fast cache tier.
    pub struct RedisCache {
        client: redis::Client,
    }

    impl RedisCache {
        /// Create a client for `url`; no connection is made until first use.
        pub fn open(url: &str) -> Result<Self> {
            let client = redis::Client::open(url).map_err(redis_err)?;
            Ok(Self { client })
        }

        fn connection(&self) -> Result<redis::Connection> {
            self.client
                .get_connection_with_timeout(CONNECT_TIMEOUT)
                .map_err(redis_err)
        }
    }

    impl CacheTier for RedisCache {
        fn ping(&self, timeout: Duration) -> bool {
            self.client
                .get_connection_with_timeout(timeout)
                .and_then(|mut conn| redis::cmd("PING").query::<String>(&mut conn))
                .is_ok()
        }

        fn get(&self, id: &AnchorId) -> Result<Option<StoredRecord>> {
            let mut conn = self.connection()?;
            let raw: Option<String> = conn.get(id.storage_key()).map_err(redis_err)?;
            raw.map(|r| StoredRecord::from_json(&r)).transpose()
        }

        fn set(&self, record: &StoredRecord) -> Result<()> {
            let mut conn = self.connection()?;
            let _: () = conn.set(record.key(), record.to_json()?).map_err(redis_err)?;
            Ok(())
        }

        fn set_many(&self, records: &[StoredRecord]) -> Result<()> {
            if records.is_empty() {
                return Ok(());
            }
            let mut pipe = redis::pipe();
            for record in records {
                pipe.set(record.key(), record.to_json()?).ignore();
            }
            let mut conn = self.connection()?;
            let _: () = pipe.query(&mut conn).map_err(redis_err)?;
            Ok(())
        }

        fn delete(&self, id: &AnchorId) -> Result<()> {
            let mut conn = self.connection()?;
            let _: () = conn.del(id.storage_key()).map_err(redis_err)?;
            Ok(())
        }
    }
}

#[cfg(feature = "mongo")]
mod mongo_documents {
    use std::time::Duration;

    use mongodb::bson::{doc, Bson, Document};
    use mongodb::options::ClientOptions;
    use mongodb::sync::{Client, Collection, Database};

    use crate::anchor::{AnchorId, StoredRecord};
    use crate::error::{Error, Result};
    use crate::memory::tier::DocumentTier;

    fn mongo_err(e: mongodb::error::Error) -> Error {
        Error::storage("documents", e.to_string())
    }

    fn to_record(doc: &Document) -> Result<StoredRecord> {
        let field = |name: &str| {
            doc.get_str(name)
                .map(str::to_string)
                .map_err(|e| Error::storage("documents", format!("field {}: {}", name, e)))
        };
        Ok(StoredRecord {
            id: field("_id")?,
            data: field("data")?,
            type_name: field("type")?,
        })
    }

    fn to_document(record: &StoredRecord) -> Document {
        doc! {
            "_id": record.id.as_str(),
            "data": record.data.as_str(),
            "type": record.type_name.as_str(),
        }
    }

    fn id_list(ids: &[AnchorId]) -> Vec<Bson> {
        ids.iter().map(|id| Bson::String(id.to_string())).collect()
    }

    /// MongoDB client for the document store tier.
    pub struct MongoDocuments {
        db: Database,
        collection: Collection<Document>,
        collection_name: String,
    }

    impl MongoDocuments {
        /// Connect to `url`, using `database.collection` for anchors.
        pub fn open(url: &str, database: &str, collection: &str, timeout: Duration) -> Result<Self> {
            let mut options = ClientOptions::parse(url).run().map_err(mongo_err)?;
            options.server_selection_timeout = Some(timeout);
            options.connect_timeout = Some(timeout);
            let client = Client::with_options(options).map_err(mongo_err)?;
            let db = client.database(database);
            Ok(Self {
                collection: db.collection::<Document>(collection),
                collection_name: collection.to_string(),
                db,
            })
        }
    }

    impl DocumentTier for MongoDocuments {
        fn ping(&self, _timeout: Duration) -> bool {
            // Bounded by the server selection timeout set in `open`
            self.db.run_command(doc! { "ping": 1 }).run().is_ok()
        }

        fn find_one(&self, id: &AnchorId) -> Result<Option<StoredRecord>> {
            self.collection
                .find_one(doc! { "_id": id.to_string() })
                .run()
                .map_err(mongo_err)?
                .map(|d| to_record(&d))
                .transpose()
        }

        fn find_many(&self, ids: &[AnchorId]) -> Result<Vec<StoredRecord>> {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            let cursor = self
                .collection
                .find(doc! { "_id": { "$in": id_list(ids) } })
                .run()
                .map_err(mongo_err)?;
            let mut records = Vec::new();
            for doc in cursor {
                records.push(to_record(&doc.map_err(mongo_err)?)?);
            }
            Ok(records)
        }

        fn upsert_many(&self, records: &[StoredRecord]) -> Result<()> {
            if records.is_empty() {
                return Ok(());
            }
            let updates: Vec<Document> = records
                .iter()
                .map(|r| {
                    doc! {
                        "q": { "_id": r.id.as_str() },
                        "u": to_document(r),
                        "upsert": true,
                    }
                })
                .collect();
            self.db
                .run_command(doc! {
                    "update": self.collection_name.as_str(),
                    "updates": updates,
                    "ordered": false,
                })
                .run()
                .map_err(mongo_err)?;
            Ok(())
        }

        fn delete_many(&self, ids: &[AnchorId]) -> Result<()> {
            if ids.is_empty() {
                return Ok(());
            }
            self.collection
                .delete_many(doc! { "_id": { "$in": id_list(ids) } })
                .run()
                .map_err(mongo_err)?;
            Ok(())
        }
    }
}

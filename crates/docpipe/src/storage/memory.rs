//! In-memory record store

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

use super::RecordStore;
use crate::error::{Error, Result};
use crate::types::{ContentType, FileRecord, ParsedContent};

/// Record store backed by concurrent hash maps. Contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    files: DashMap<Uuid, FileRecord>,
    parsed: DashMap<Uuid, ParsedContent>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryRecordStore {
    fn get(&self, id: Uuid) -> Result<Option<FileRecord>> {
        Ok(self.files.get(&id).map(|r| r.clone()))
    }

    fn save(&self, record: &mut FileRecord) -> Result<()> {
        record.updated_at = Utc::now();
        self.files.insert(record.id, record.clone());
        Ok(())
    }

    fn update(&self, record: &mut FileRecord) -> Result<()> {
        match self.files.get_mut(&record.id) {
            Some(mut stored) => {
                record.updated_at = Utc::now();
                *stored = record.clone();
                Ok(())
            }
            None => Err(Error::not_found(format!("File with ID {} not found", record.id))),
        }
    }

    fn create_parsed_content(
        &self,
        file_id: Uuid,
        content: Value,
        content_type: ContentType,
        row_count: u64,
    ) -> Result<ParsedContent> {
        if !self.files.contains_key(&file_id) {
            return Err(Error::not_found(format!("File with ID {} not found", file_id)));
        }

        match self.parsed.entry(file_id) {
            Entry::Occupied(_) => Err(Error::storage(format!(
                "Parsed content already exists for file {}",
                file_id
            ))),
            Entry::Vacant(slot) => {
                let parsed = ParsedContent {
                    file_id,
                    content,
                    content_type,
                    row_count,
                    created_at: Utc::now(),
                };
                slot.insert(parsed.clone());
                Ok(parsed)
            }
        }
    }

    fn get_parsed_content(&self, file_id: Uuid) -> Result<Option<ParsedContent>> {
        Ok(self.parsed.get(&file_id).map(|p| p.clone()))
    }

    fn delete_parsed_content(&self, file_id: Uuid) -> Result<bool> {
        Ok(self.parsed.remove(&file_id).is_some())
    }

    fn delete_by_id(&self, id: Uuid) -> Result<bool> {
        let removed = self.files.remove(&id).is_some();
        self.parsed.remove(&id);
        Ok(removed)
    }

    fn list(&self) -> Result<Vec<FileRecord>> {
        let mut records: Vec<FileRecord> = self
            .files
            .iter()
            .map(|entry| {
                let mut record = entry.value().clone();
                record.file_content = Vec::new();
                record
            })
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }
}

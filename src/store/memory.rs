use super::{AccountRecord, AccountStore, StoreFuture};
use serde_json::Value;

/// In-process store used by tests and local runs.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    identifier_field: String,
    records: Vec<AccountRecord>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(identifier_field: impl Into<String>) -> Self {
        Self {
            identifier_field: identifier_field.into(),
            records: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_record(mut self, record: AccountRecord) -> Self {
        self.records.push(record);
        self
    }
}

impl AccountStore for MemoryStore {
    fn find_by_identifier<'a>(&'a self, identifier: &'a str) -> StoreFuture<'a> {
        let matches = self
            .records
            .iter()
            .filter(|record| {
                matches!(
                    record.get(&self.identifier_field),
                    Some(Value::String(value)) if value == identifier
                )
            })
            .cloned()
            .collect();

        Box::pin(async move { Ok(matches) })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn matches_identifier_exactly() {
        let store = MemoryStore::new("email")
            .with_record(AccountRecord::try_from(json!({"email": "a@b.com"})).unwrap())
            .with_record(AccountRecord::try_from(json!({"email": "A@b.com"})).unwrap())
            .with_record(AccountRecord::try_from(json!({"email": "a@b.com", "n": 2})).unwrap());

        assert_eq!(store.find_by_identifier("a@b.com").await.unwrap().len(), 2);
        assert!(store.find_by_identifier("x@y.com").await.unwrap().is_empty());
    }
}

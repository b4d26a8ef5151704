//! Parallel batches over several sessions.
//!
//! A [`ClientPool`] deals the operations of a batch round-robin to its
//! workers. Each worker with a non-empty share opens its own session, runs
//! the share in order and closes the session. Shares run concurrently, so
//! there is no ordering between operations given to different workers.

use crate::client::Client;
use crate::connection::ConnectionConfig;
use crate::error::ClientError;
use ignite_protocol::{MapKind, TypeHints, Value};
use std::collections::HashSet;
use tokio::task::JoinSet;

/// One operation in a pool batch.
#[derive(Debug, Clone, PartialEq)]
pub enum PoolOperation {
    Get { cache: String, key: Value },
    GetAll { cache: String, keys: Vec<Value> },
    Put { cache: String, key: Value, value: Value },
    PutAll { cache: String, entries: Vec<(Value, Value)> },
    ContainsKey { cache: String, key: Value },
    ContainsKeys { cache: String, keys: Vec<Value> },
    Clear { cache: String },
    ClearKey { cache: String, key: Value },
    RemoveKey { cache: String, key: Value },
    RemoveKeys { cache: String, keys: Vec<Value> },
    RemoveAll { cache: String },
    GetSize { cache: String },
    GetNames,
    CreateWithName { cache: String },
    Destroy { cache: String },
}

impl PoolOperation {
    /// Name of the client method the operation maps to.
    pub fn name(&self) -> &'static str {
        match self {
            PoolOperation::Get { .. } => "cache_get",
            PoolOperation::GetAll { .. } => "cache_get_all",
            PoolOperation::Put { .. } => "cache_put",
            PoolOperation::PutAll { .. } => "cache_put_all",
            PoolOperation::ContainsKey { .. } => "cache_contains_key",
            PoolOperation::ContainsKeys { .. } => "cache_contains_keys",
            PoolOperation::Clear { .. } => "cache_clear",
            PoolOperation::ClearKey { .. } => "cache_clear_key",
            PoolOperation::RemoveKey { .. } => "cache_remove_key",
            PoolOperation::RemoveKeys { .. } => "cache_remove_keys",
            PoolOperation::RemoveAll { .. } => "cache_remove_all",
            PoolOperation::GetSize { .. } => "cache_get_size",
            PoolOperation::GetNames => "cache_get_names",
            PoolOperation::CreateWithName { .. } => "cache_create_with_name",
            PoolOperation::Destroy { .. } => "cache_destroy",
        }
    }

    async fn run(&self, client: &Client, hints: &TypeHints) -> Result<PoolOutput, ClientError> {
        let handle = |name: &str| client.cache(name).with_hints(hints.clone());

        let output = match self {
            PoolOperation::Get { cache, key } => PoolOutput::Found(handle(cache).get(key.clone()).await?),
            PoolOperation::GetAll { cache, keys } => PoolOutput::Entries(handle(cache).get_all(keys).await?),
            PoolOperation::Put { cache, key, value } => {
                handle(cache).put(key.clone(), value.clone()).await?;
                PoolOutput::Unit
            }
            PoolOperation::PutAll { cache, entries } => {
                handle(cache).put_all(entries).await?;
                PoolOutput::Unit
            }
            PoolOperation::ContainsKey { cache, key } => {
                PoolOutput::Bool(handle(cache).contains_key(key.clone()).await?)
            }
            PoolOperation::ContainsKeys { cache, keys } => {
                PoolOutput::Bool(handle(cache).contains_keys(keys).await?)
            }
            PoolOperation::Clear { cache } => {
                handle(cache).clear().await?;
                PoolOutput::Unit
            }
            PoolOperation::ClearKey { cache, key } => {
                handle(cache).clear_key(key.clone()).await?;
                PoolOutput::Unit
            }
            PoolOperation::RemoveKey { cache, key } => {
                PoolOutput::Bool(handle(cache).remove_key(key.clone()).await?)
            }
            PoolOperation::RemoveKeys { cache, keys } => {
                handle(cache).remove_keys(keys).await?;
                PoolOutput::Unit
            }
            PoolOperation::RemoveAll { cache } => {
                handle(cache).remove_all().await?;
                PoolOutput::Unit
            }
            PoolOperation::GetSize { cache } => PoolOutput::Size(handle(cache).size().await?),
            PoolOperation::GetNames => PoolOutput::Names(client.cache_get_names().await?),
            PoolOperation::CreateWithName { cache } => {
                PoolOutput::Bool(client.cache_create_with_name(cache).await?)
            }
            PoolOperation::Destroy { cache } => {
                client.cache_destroy(cache).await?;
                PoolOutput::Unit
            }
        };
        Ok(output)
    }
}

/// What one operation returned.
#[derive(Debug, Clone, PartialEq)]
pub enum PoolOutput {
    Unit,
    Bool(bool),
    Size(i64),
    Found(Option<Value>),
    Entries(Vec<(Value, Value)>),
    Names(Vec<String>),
}

impl PoolOutput {
    /// List-like outputs contribute their items, anything else one value.
    fn flatten_into(self, out: &mut Vec<Value>) {
        match self {
            PoolOutput::Unit | PoolOutput::Found(None) => out.push(Value::Null),
            PoolOutput::Bool(b) => out.push(Value::Bool(b)),
            PoolOutput::Size(n) => out.push(Value::Long(n)),
            PoolOutput::Found(Some(Value::List(items)))
            | PoolOutput::Found(Some(Value::Collection { items, .. })) => out.extend(items),
            PoolOutput::Found(Some(value)) => out.push(value),
            PoolOutput::Entries(entries) => out.push(Value::Map {
                kind: MapKind::Linked,
                entries,
            }),
            PoolOutput::Names(names) => out.extend(names.into_iter().map(Value::String)),
        }
    }
}

/// An operation together with its id and output.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationResult {
    pub id: String,
    pub operation: PoolOperation,
    pub output: PoolOutput,
}

/// Results of one batch, grouped by worker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResults {
    groups: Vec<Vec<OperationResult>>,
}

impl BatchResults {
    /// One group per worker, in worker order. Idle workers leave an empty group.
    pub fn groups(&self) -> &[Vec<OperationResult>] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &str) -> Option<&PoolOutput> {
        self.groups
            .iter()
            .flatten()
            .find(|result| result.id == id)
            .map(|result| &result.output)
    }

    /// All results, worker by worker.
    pub fn into_list(self) -> Vec<OperationResult> {
        self.groups.into_iter().flatten().collect()
    }

    /// All outputs merged into one list of values, worker by worker.
    ///
    /// Name lists and list or collection values are spliced in item by item.
    /// Operations without a result contribute `Null`.
    pub fn into_values(self) -> Vec<Value> {
        let mut out = Vec::new();
        for result in self.into_list() {
            result.output.flatten_into(&mut out);
        }
        out
    }
}

/// Runs batches of operations in parallel over several sessions.
#[derive(Debug, Clone)]
pub struct ClientPool {
    config: ConnectionConfig,
    workers: usize,
    hints: TypeHints,
}

impl ClientPool {
    pub fn new(config: ConnectionConfig, workers: usize) -> Result<Self, ClientError> {
        if workers == 0 {
            return Err(ClientError::Config("pool needs at least one worker".to_string()));
        }
        Ok(Self {
            config,
            workers,
            hints: TypeHints::default(),
        })
    }

    /// Hints applied to every cache operation of a batch.
    pub fn with_hints(mut self, hints: TypeHints) -> Self {
        self.hints = hints;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs `batch`, keyed by operation id.
    ///
    /// Fails with the first error any worker reports; the remaining workers
    /// are cancelled.
    pub async fn execute<I, S>(&self, batch: I) -> Result<BatchResults, ClientError>
    where
        I: IntoIterator<Item = (S, PoolOperation)>,
        S: Into<String>,
    {
        let mut shares: Vec<Vec<(String, PoolOperation)>> = vec![Vec::new(); self.workers];
        let mut seen = HashSet::new();
        for (idx, (id, operation)) in batch.into_iter().enumerate() {
            let id = id.into();
            if !seen.insert(id.clone()) {
                return Err(ClientError::Config(format!("duplicate operation id '{}'", id)));
            }
            shares[idx % self.workers].push((id, operation));
        }

        let mut join_set = JoinSet::new();
        for (worker, share) in shares.into_iter().enumerate() {
            if share.is_empty() {
                continue;
            }
            tracing::debug!("Pool worker {} takes {} operations", worker, share.len());
            let config = self.config.clone();
            let hints = self.hints.clone();
            join_set.spawn(async move { (worker, run_share(config, hints, share).await) });
        }

        let mut groups = vec![Vec::new(); self.workers];
        while let Some(joined) = join_set.join_next().await {
            let (worker, outcome) = joined.map_err(|e| ClientError::Worker(e.to_string()))?;
            groups[worker] = outcome.map_err(|err| {
                tracing::debug!("Pool worker {} failed: {}", worker, err);
                err
            })?;
        }
        Ok(BatchResults { groups })
    }
}

async fn run_share(
    config: ConnectionConfig,
    hints: TypeHints,
    share: Vec<(String, PoolOperation)>,
) -> Result<Vec<OperationResult>, ClientError> {
    let client = Client::open(config).await?;

    let mut results = Vec::with_capacity(share.len());
    let mut failure = None;
    for (id, operation) in share {
        match operation.run(&client, &hints).await {
            Ok(output) => results.push(OperationResult {
                id,
                operation,
                output,
            }),
            Err(err) => {
                failure = Some(err);
                break;
            }
        }
    }

    if let Err(err) = client.close().await {
        tracing::warn!("Failed to close pool session: {}", err);
    }
    match failure {
        Some(err) => Err(err),
        None => Ok(results),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, output: PoolOutput) -> OperationResult {
        OperationResult {
            id: id.to_string(),
            operation: PoolOperation::GetNames,
            output,
        }
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = ConnectionConfig::new("127.0.0.1", 10800);
        assert!(matches!(ClientPool::new(config, 0), Err(ClientError::Config(_))));
    }

    #[tokio::test]
    async fn test_duplicate_ids_rejected_before_connecting() {
        // Nothing listens here; the batch must fail before any dial.
        let pool = ClientPool::new(ConnectionConfig::new("127.0.0.1", 1), 2).unwrap();
        let batch = vec![
            ("a", PoolOperation::GetNames),
            ("a", PoolOperation::GetNames),
        ];
        match pool.execute(batch).await {
            Err(ClientError::Config(message)) => assert!(message.contains("'a'")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let pool = ClientPool::new(ConnectionConfig::new("127.0.0.1", 1), 3).unwrap();
        let results = pool
            .execute(Vec::<(String, PoolOperation)>::new())
            .await
            .unwrap();
        assert!(results.is_empty());
        assert_eq!(results.groups().len(), 3);
    }

    #[test]
    fn test_into_values_splices_lists() {
        let results = BatchResults {
            groups: vec![
                vec![
                    result("names", PoolOutput::Names(vec!["a".into(), "b".into()])),
                    result("put", PoolOutput::Unit),
                ],
                vec![
                    result("list", PoolOutput::Found(Some(Value::List(vec![Value::Int(1), Value::Int(2)])))),
                    result("size", PoolOutput::Size(3)),
                    result("get", PoolOutput::Found(Some(Value::from("x")))),
                ],
                vec![],
            ],
        };
        assert_eq!(results.len(), 5);
        assert_eq!(results.get("size"), Some(&PoolOutput::Size(3)));
        assert_eq!(results.get("missing"), None);

        assert_eq!(
            results.into_values(),
            vec![
                Value::from("a"),
                Value::from("b"),
                Value::Null,
                Value::Int(1),
                Value::Int(2),
                Value::Long(3),
                Value::from("x"),
            ]
        );
    }

    #[test]
    fn test_entries_stay_one_value() {
        let entries = vec![(Value::Int(1), Value::from("one"))];
        let results = BatchResults {
            groups: vec![vec![result("all", PoolOutput::Entries(entries.clone()))]],
        };
        assert_eq!(
            results.into_values(),
            vec![Value::Map {
                kind: MapKind::Linked,
                entries
            }]
        );
    }

    #[test]
    fn test_operation_names() {
        assert_eq!(PoolOperation::GetNames.name(), "cache_get_names");
        assert_eq!(
            PoolOperation::GetSize {
                cache: "c".into()
            }
            .name(),
            "cache_get_size"
        );
    }
}

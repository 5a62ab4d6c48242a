//! Redis (or KeyDB) backend
//!
//! Reads use `GET`, `MGET` and `SCAN`. Commits run one Lua script that
//! checks every guard and then applies deletes and puts, so a transaction is
//! atomic on the Redis server whatever the number of server nodes writing.
//!
//! Only standalone Redis or KeyDB deployments (optionally replicated) are
//! supported. A transaction spans keys of several registrations, which
//! Redis Cluster would place in different hash slots. The script still
//! declares every key it touches in `KEYS`.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Script;
use serde::Serialize;

use super::backend::{KvBackend, Transaction};
use crate::store::error::{StoreError, StoreResult};

/// `KEYS` holds guard keys, then delete keys, then put keys
const COMMIT_SCRIPT: &str = r#"
local tx = cjson.decode(ARGV[1])
local guards = #tx.expected
for i = 1, guards do
  local current = redis.call('GET', KEYS[i])
  local expected = tx.expected[i]
  if expected == cjson.null then
    if current then return 0 end
  elseif current ~= expected then
    return 0
  end
end
for i = guards + 1, guards + tx.deletes do
  redis.call('DEL', KEYS[i])
end
for i, value in ipairs(tx.values) do
  redis.call('SET', KEYS[guards + tx.deletes + i], value)
end
return 1
"#;

/// Non-key arguments of the commit script
#[derive(Debug, Serialize)]
struct CommitArgs<'a> {
    expected: Vec<Option<&'a str>>,
    deletes: usize,
    values: Vec<&'a str>,
}

impl<'a> CommitArgs<'a> {
    fn new(transaction: &'a Transaction) -> Self {
        Self {
            expected: transaction
                .guards()
                .iter()
                .map(|g| g.expected.as_deref())
                .collect(),
            deletes: transaction.deletes().len(),
            values: transaction.puts().iter().map(|p| p.value.as_str()).collect(),
        }
    }
}

fn commit_keys(transaction: &Transaction) -> Vec<&str> {
    let guards = transaction.guards().iter().map(|g| g.key.as_str());
    let deletes = transaction.deletes().iter().map(String::as_str);
    let puts = transaction.puts().iter().map(|p| p.key.as_str());
    guards.chain(deletes).chain(puts).collect()
}

const SCAN_BATCH: usize = 256;

/// Shared-store backend talking to a Redis server
pub struct RedisBackend {
    connection: MultiplexedConnection,
    commit: Script,
}

impl RedisBackend {
    /// Connect to the server at `url` (e.g. `redis://127.0.0.1:6379/0`)
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url)?;
        let connection = client.get_multiplexed_async_connection().await?;

        tracing::info!(url = %url, "Connected to redis registration backend");

        Ok(Self::with_connection(connection))
    }

    pub fn with_connection(connection: MultiplexedConnection) -> Self {
        Self {
            connection,
            commit: Script::new(COMMIT_SCRIPT),
        }
    }
}

/// Escape glob metacharacters for `SCAN MATCH`
fn escape_pattern(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('*');
    escaped
}

#[async_trait]
impl KvBackend for RedisBackend {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut con = self.connection.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut con).await?;
        Ok(value)
    }

    async fn get_many(&self, keys: &[String]) -> StoreResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut con = self.connection.clone();
        let values: Vec<Option<String>> =
            redis::cmd("MGET").arg(keys).query_async(&mut con).await?;
        Ok(values)
    }

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut con = self.connection.clone();
        let pattern = escape_pattern(prefix);
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut con)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn commit(&self, transaction: Transaction) -> StoreResult<bool> {
        let payload = serde_json::to_string(&CommitArgs::new(&transaction)).map_err(|source| {
            StoreError::Serialization {
                what: "transaction",
                source,
            }
        })?;

        let mut invocation = self.commit.prepare_invoke();
        for key in commit_keys(&transaction) {
            invocation.key(key);
        }
        invocation.arg(payload);

        let mut con = self.connection.clone();
        let applied: i64 = invocation.invoke_async(&mut con).await?;
        Ok(applied == 1)
    }
}

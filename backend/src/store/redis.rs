use std::collections::HashMap;

use async_trait::async_trait;
use redis::{aio::Connection, AsyncCommands, Client, Script};
use shared::{NewTask, Task, TaskId, TaskPatch};

use super::{StoreError, TaskStore};

/// List of all live task ids, in insertion order.
const ORDER_KEY: &str = "tasks";
const TASK_KEY_PREFIX: &str = "task:";

const UPDATE_SCRIPT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return {}
end
if #ARGV > 0 then
  redis.call('HSET', KEYS[1], unpack(ARGV))
end
return redis.call('HGETALL', KEYS[1])
";

const DELETE_SCRIPT: &str = r"
local record = redis.call('HGETALL', KEYS[1])
if #record == 0 then
  return record
end
redis.call('DEL', KEYS[1])
redis.call('LREM', KEYS[2], 0, ARGV[1])
return record
";

type Record = HashMap<String, String>;

/// Redis-backed store. Each task is a hash at `task:{id}` holding
/// `name`, `completed` and `color`.
pub struct RedisTaskStore {
    client: Client,
    prefix: String,
    update_script: Script,
    delete_script: Script,
}

impl RedisTaskStore {
    pub fn open(redis_url: &str) -> Result<Self, StoreError> {
        Self::with_prefix(redis_url, "")
    }

    /// Like [`RedisTaskStore::open`], with every key namespaced under `prefix`.
    pub fn with_prefix(redis_url: &str, prefix: impl Into<String>) -> Result<Self, StoreError> {
        Ok(Self {
            client: Client::open(redis_url)?,
            prefix: prefix.into(),
            update_script: Script::new(UPDATE_SCRIPT),
            delete_script: Script::new(DELETE_SCRIPT),
        })
    }

    async fn connection(&self) -> Result<Connection, StoreError> {
        Ok(self.client.get_async_connection().await?)
    }

    fn task_key(&self, id: &str) -> String {
        format!("{}{}{}", self.prefix, TASK_KEY_PREFIX, id)
    }

    fn order_key(&self) -> String {
        format!("{}{}", self.prefix, ORDER_KEY)
    }
}

fn completed_value(completed: bool) -> &'static str {
    if completed {
        "true"
    } else {
        "false"
    }
}

fn patch_fields(patch: &TaskPatch) -> Vec<(&'static str, String)> {
    let mut fields = Vec::new();
    if let Some(name) = &patch.name {
        fields.push(("name", name.clone()));
    }
    if let Some(completed) = patch.completed {
        fields.push(("completed", completed_value(completed).to_string()));
    }
    if let Some(color) = &patch.color {
        fields.push(("color", color.clone()));
    }
    fields
}

/// Decodes the hash stored at `key`; an empty hash means the key is absent.
fn decode(key: &str, id: &str, mut record: Record) -> Result<Option<Task>, StoreError> {
    if record.is_empty() {
        return Ok(None);
    }
    let corrupt = |reason: String| StoreError::Corrupt {
        key: key.to_string(),
        reason,
    };
    let mut field = |name: &str| {
        record
            .remove(name)
            .ok_or_else(|| corrupt(format!("missing field {name}")))
    };

    let name = field("name")?;
    let completed = match field("completed")?.as_str() {
        "true" => true,
        "false" => false,
        other => return Err(corrupt(format!("bad completed value {other:?}"))),
    };
    let color = field("color")?;
    let id = id
        .parse::<TaskId>()
        .map_err(|e| corrupt(e.to_string()))?;

    Ok(Some(Task {
        id,
        name,
        completed,
        color,
    }))
}

#[async_trait]
impl TaskStore for RedisTaskStore {
    async fn list(&self) -> Result<Vec<Task>, StoreError> {
        let mut conn = self.connection().await?;
        let ids: Vec<String> = conn.lrange(self.order_key(), 0, -1).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for id in &ids {
            pipe.hgetall(self.task_key(id));
        }
        let records: Vec<Record> = pipe.query_async(&mut conn).await?;

        let mut tasks = Vec::with_capacity(ids.len());
        for (id, record) in ids.iter().zip(records) {
            if let Some(task) = decode(&self.task_key(id), id, record)? {
                tasks.push(task);
            }
        }
        Ok(tasks)
    }

    async fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        let id = id.to_string();
        let key = self.task_key(&id);
        let mut conn = self.connection().await?;
        let record: Record = conn.hgetall(&key).await?;
        decode(&key, &id, record)
    }

    async fn create(&self, new_task: NewTask) -> Result<Task, StoreError> {
        let task = new_task.into_task(TaskId::generate());
        let id = task.id.to_string();
        let fields = [
            ("name", task.name.as_str()),
            ("completed", completed_value(task.completed)),
            ("color", task.color.as_str()),
        ];

        let mut conn = self.connection().await?;
        let () = redis::pipe()
            .atomic()
            .hset_multiple(self.task_key(&id), &fields[..])
            .ignore()
            .rpush(self.order_key(), &id)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(task)
    }

    async fn update(&self, id: TaskId, patch: TaskPatch) -> Result<Option<Task>, StoreError> {
        let id = id.to_string();
        let key = self.task_key(&id);
        let mut conn = self.connection().await?;

        let mut invocation = self.update_script.key(&key);
        for (field, value) in patch_fields(&patch) {
            invocation.arg(field).arg(value);
        }
        let record: Record = invocation.invoke_async(&mut conn).await?;
        decode(&key, &id, record)
    }

    async fn delete(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        let id = id.to_string();
        let key = self.task_key(&id);
        let mut conn = self.connection().await?;
        let record: Record = self
            .delete_script
            .key(&key)
            .key(self.order_key())
            .arg(&id)
            .invoke_async(&mut conn)
            .await?;
        decode(&key, &id, record)
    }
}

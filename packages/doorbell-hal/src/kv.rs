//! JSON-file-backed key-value store, standing in for ESP-IDF's NVS flash
//! partition on non-ESP32 development and test hosts. Namespaces map to
//! top-level JSON objects; the whole file is rewritten on every write
//! since NVS-sized config data is tiny and writes are rare (provisioning
//! once, chime changes occasionally).

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use doorbell_core::error::{DoorbellError, DoorbellResult};
use doorbell_core::kv::KvStore;

type Namespace = HashMap<String, Value>;

pub struct JsonFileKvStore {
    path: PathBuf,
    data: Mutex<HashMap<String, Namespace>>,
}

impl JsonFileKvStore {
    /// Loads `path` if it exists, otherwise starts empty. The file is
    /// created on the first write.
    pub async fn open(path: PathBuf) -> DoorbellResult<Self> {
        let data = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|err| DoorbellError::Internal(format!("malformed kv store file: {err}")))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    async fn persist(&self, data: &HashMap<String, Namespace>) -> DoorbellResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(data)
            .map_err(|err| DoorbellError::Internal(format!("kv store encode failed: {err}")))?;

        // Write to a temp file and rename, so a crash mid-write never
        // leaves a half-written store behind.
        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, &bytes).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl KvStore for JsonFileKvStore {
    async fn get_str(&self, namespace: &str, key: &str) -> DoorbellResult<Option<String>> {
        let data = self.data.lock().await;
        Ok(data
            .get(namespace)
            .and_then(|ns| ns.get(key))
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn set_str(&self, namespace: &str, key: &str, value: &str) -> DoorbellResult<()> {
        let mut data = self.data.lock().await;
        data.entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), Value::String(value.to_string()));
        self.persist(&data).await
    }

    async fn get_i32(&self, namespace: &str, key: &str) -> DoorbellResult<Option<i32>> {
        let data = self.data.lock().await;
        Ok(data
            .get(namespace)
            .and_then(|ns| ns.get(key))
            .and_then(Value::as_i64)
            .map(|v| v as i32))
    }

    async fn set_i32(&self, namespace: &str, key: &str, value: i32) -> DoorbellResult<()> {
        let mut data = self.data.lock().await;
        data.entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), Value::from(value));
        self.persist(&data).await
    }

    async fn erase(&self, namespace: &str, key: &str) -> DoorbellResult<()> {
        let mut data = self.data.lock().await;
        if let Some(ns) = data.get_mut(namespace) {
            ns.remove(key);
        }
        self.persist(&data).await
    }
}

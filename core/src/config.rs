use serde::{Deserialize, Serialize};

fn default_threshold_cents() -> u64 { 250 }
fn default_interval_secs() -> u64 { 60 }
fn default_timeout_ms() -> u64 { 10_000 }
fn default_max_pages() -> usize { 50 }
fn default_listen_addr() -> String { "0.0.0.0:0".into() }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Obfuscated ledger blob.
    pub ledger_path: String,
    /// Snapshot of the ledger taken at the end of the last reconciliation pass.
    pub snapshot_path: String,
    /// SQLite audit journal; `:memory:` keeps it in-process.
    pub journal_path: String,
    /// Cyclic digit key for the at-rest codec.
    pub ledger_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    /// Members endpoint, including campaign id and field selection.
    pub members_url: String,
    pub access_token: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Hard cap on `links.next` hops per fetch.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// A payment increase must EXCEED this to earn a credit.
    #[serde(default = "default_threshold_cents")]
    pub credit_threshold_cents: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Base64 of the 32-byte AES-256-GCM message key.
    pub message_key: String,
    /// Honour a bare `INFO` datagram without the envelope.
    #[serde(default)]
    pub allow_plaintext_info: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub storage: StorageConfig,
    pub billing: BillingConfig,
    pub reconciliation: ReconciliationConfig,
    pub transport: TransportConfig,
}

impl ServerConfig {
    /// Load from a JSON config file.
    /// In tests, use ServerConfig::default_test().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: ServerConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        crate::codec::ObfuscationKey::parse(&self.storage.ledger_key)?;
        crate::envelope::MessageEnvelope::from_base64_key(&self.transport.message_key)?;
        if self.reconciliation.interval_secs == 0 {
            anyhow::bail!("reconciliation.interval_secs must be > 0");
        }
        if self.billing.max_pages == 0 {
            anyhow::bail!("billing.max_pages must be > 0");
        }
        Ok(())
    }

    /// The pipe-delimited secrets returned to an INFO request.
    pub fn info_payload(&self) -> String {
        format!(
            "SENSITIVE|{}|{}|{}|{}",
            self.billing.client_id,
            self.billing.client_secret,
            self.transport.message_key,
            self.storage.ledger_key,
        )
    }

    /// Config with hardcoded defaults for use in unit tests.
    /// Paths point at the working directory; tests override them.
    pub fn default_test() -> Self {
        Self {
            storage: StorageConfig {
                ledger_path: "ids.txt".into(),
                snapshot_path: "idscache.txt".into(),
                journal_path: ":memory:".into(),
                ledger_key: "3141592653".into(),
            },
            billing: BillingConfig {
                members_url: "http://127.0.0.1:9/members".into(),
                access_token: "test-access".into(),
                client_id: "test-client".into(),
                client_secret: "test-secret".into(),
                timeout_ms: 500,
                max_pages: 2,
            },
            reconciliation: ReconciliationConfig {
                interval_secs: 60,
                credit_threshold_cents: 250,
            },
            transport: TransportConfig {
                listen_addr: "127.0.0.1:0".into(),
                // 32 bytes of 0x2a
                message_key: "KioqKioqKioqKioqKioqKioqKioqKioqKioqKioqKio=".into(),
                allow_plaintext_info: false,
            },
        }
    }

    /// Point every storage path inside `dir`.
    pub fn with_storage_dir(mut self, dir: &std::path::Path) -> Self {
        self.storage.ledger_path = dir.join("ids.txt").to_string_lossy().into_owned();
        self.storage.snapshot_path = dir.join("idscache.txt").to_string_lossy().into_owned();
        self
    }
}

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

/// A command line given either as a list of words or as one string that is
/// split the way a POSIX shell would.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Words(pub Vec<String>);

impl Words {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for Words {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct WordsVisitor;

        impl<'de> Visitor<'de> for WordsVisitor {
            type Value = Words;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a command string or a list of words")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Words, E> {
                shell_words::split(value)
                    .map(Words)
                    .map_err(|e| E::custom(format!("cannot split {value:?}: {e}")))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Words, A::Error> {
                let mut words = Vec::new();
                while let Some(word) = seq.next_element::<String>()? {
                    words.push(word);
                }
                Ok(Words(words))
            }
        }

        deserializer.deserialize_any(WordsVisitor)
    }
}

/// Health check test: a string runs through the container's shell, a list
/// is passed as is (`["CMD", ...]`, `["CMD-SHELL", ...]` or `["NONE"]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HealthTest {
    Shell(String),
    Exec(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    pub test: HealthTest,
    pub interval_ms: u64,
    pub timeout_ms: u64,
    pub retries: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            test: HealthTest::Exec(vec!["NONE".to_string()]),
            interval_ms: 2000,
            timeout_ms: 2000,
            retries: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfig {
    #[serde(default = "default_host_ip")]
    pub host_ip: String,
    pub host_port: u16,
    pub container_port: u16,
}

fn default_host_ip() -> String {
    "0.0.0.0".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountConfig {
    /// Host path; relative paths resolve against the config file.
    pub source: PathBuf,
    pub target: String,
    #[serde(default)]
    pub read_only: bool,
}

/// A file placed in the container before it starts. Exactly one of
/// `content` and `source` must be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedConfig {
    pub path: String,
    #[serde(default)]
    pub content: Option<String>,
    /// Host file; relative paths resolve against the config file.
    #[serde(default)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub ports: Vec<PortConfig>,
    #[serde(default)]
    pub mounts: Vec<MountConfig>,
    #[serde(default)]
    pub entrypoint: Words,
    #[serde(default)]
    pub command: Words,
    #[serde(default)]
    pub health_check: Option<HealthCheckConfig>,
    #[serde(default)]
    pub embeds: Vec<EmbedConfig>,
    /// Command run inside the container once it is healthy.
    #[serde(default)]
    pub after_start: Option<Words>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub project: String,
    /// Defaults to the project name.
    pub network: Option<String>,
    pub docker_bin: String,
    pub health_retries: u32,
    pub health_backoff_ms: u64,
    /// Seconds teardown may take before remaining containers are left.
    pub shutdown_timeout: u64,
    /// Keep containers running after a failed run until a signal arrives.
    pub keep_alive: bool,
    /// Brought up in this order.
    pub services: Vec<ServiceConfig>,

    /// Directory of the file this was loaded from.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: "stackup".to_string(),
            network: None,
            docker_bin: "docker".to_string(),
            health_retries: 5,
            health_backoff_ms: 1000,
            shutdown_timeout: 30,
            keep_alive: false,
            services: Vec::new(),
            base_dir: PathBuf::from("."),
        }
    }
}

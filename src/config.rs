use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

/// Key a configuration document uses to point at another document.
pub const LOCATION_KEY: &str = "location";

/// Redirects followed before resolution gives up.
pub const DEFAULT_MAX_REDIRECTS: usize = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no config specified")]
    Missing,
    #[error("unable to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("unable to parse config file {path}: {source}")]
    InvalidConfigFile {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("config at {url} is not valid JSON: {source}")]
    InvalidRemoteConfig { url: String, source: reqwest::Error },
    #[error("config document at {origin} must be a JSON object")]
    NotAnObject { origin: String },
    #[error("config 'location' must be a string or an object, found {found}")]
    InvalidLocation { found: String },
    #[error("config redirected more than {limit} time(s), last location was {origin}")]
    TooManyRedirects { limit: usize, origin: String },
    #[error("config section '{section}' is malformed: {source}")]
    InvalidSection {
        section: String,
        source: serde_json::Error,
    },
}

/// Where a configuration document comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    Inline(Map<String, Value>),
    Remote(String),
    File(PathBuf),
}

impl ConfigSource {
    /// Classifies a location string. Empty strings name no source at all.
    pub fn parse(location: &str) -> Option<Self> {
        if location.is_empty() {
            None
        } else if location.starts_with("http") {
            Some(ConfigSource::Remote(location.to_string()))
        } else {
            Some(ConfigSource::File(PathBuf::from(location)))
        }
    }

    /// Interprets the value of a `location` key. `Ok(None)` means the
    /// document does not redirect.
    fn from_location(value: &Value) -> Result<Option<Self>, ConfigError> {
        match value {
            Value::Null | Value::Bool(false) => Ok(None),
            Value::String(location) => Ok(ConfigSource::parse(location)),
            Value::Object(map) => Ok(Some(ConfigSource::Inline(map.clone()))),
            other => Err(ConfigError::InvalidLocation {
                found: other.to_string(),
            }),
        }
    }

    fn describe(&self) -> String {
        match self {
            ConfigSource::Inline(_) => "<inline>".to_string(),
            ConfigSource::Remote(url) => url.clone(),
            ConfigSource::File(path) => path.display().to_string(),
        }
    }
}

impl From<Map<String, Value>> for ConfigSource {
    fn from(map: Map<String, Value>) -> Self {
        ConfigSource::Inline(map)
    }
}

/// A fully resolved, flat settings document. It never carries a `location`
/// key once it leaves the loader.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Configuration {
    values: Map<String, Value>,
}

impl Configuration {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// An owned copy of every top-level field.
    pub fn to_object(&self) -> Map<String, Value> {
        self.values.clone()
    }

    /// Deserializes a top-level section. Absent and `null` sections are `None`.
    pub fn section<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|source| ConfigError::InvalidSection {
                    section: key.to_string(),
                    source,
                }),
        }
    }

    pub fn docker(&self) -> Result<Option<DockerSection>, ConfigError> {
        self.section("docker")
    }

    pub fn hydra(&self) -> Result<Option<HydraSection>, ConfigError> {
        self.section("hydra")
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerSection {
    pub organization: String,
    /// Only needed when a Dockerfile has to be generated.
    #[serde(default)]
    pub base_image: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub include_healthcheck: bool,
    #[serde(default)]
    pub include_dockerignore: bool,
    /// Overrides `hydra.plugins.logger` when set.
    #[serde(default)]
    pub logger_plugin: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HydraSection {
    pub service_name: String,
    pub service_port: u16,
    #[serde(default)]
    pub plugins: HydraPlugins,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct HydraPlugins {
    /// Usually an object of plugin settings; any truthy value enables it.
    #[serde(default)]
    pub logger: Value,
}

impl HydraPlugins {
    pub fn logger_enabled(&self) -> bool {
        truthy(&self.logger)
    }
}

/// JavaScript truthiness: `null`, `false`, `0`, `NaN` and `""` are false.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Resolves configuration sources into a [`Configuration`], following
/// `location` redirects up to a fixed depth.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    base_dir: PathBuf,
    max_redirects: usize,
}

impl ConfigLoader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }

    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn resolve(&self, source: Option<ConfigSource>) -> Result<Configuration, ConfigError> {
        let mut source = source.ok_or(ConfigError::Missing)?;
        let mut redirects = 0;

        loop {
            let mut document = match source {
                ConfigSource::Inline(map) => {
                    tracing::debug!(fields = map.len(), "using inline config");
                    return Ok(Configuration { values: map });
                }
                ConfigSource::Remote(ref url) => fetch_remote(url)?,
                ConfigSource::File(ref path) => read_file(&self.absolute(path))?,
            };

            let location = document.remove(LOCATION_KEY).unwrap_or(Value::Null);
            let Some(next) = ConfigSource::from_location(&location)? else {
                tracing::debug!(origin = %source.describe(), "resolved config");
                return Ok(Configuration { values: document });
            };

            if redirects >= self.max_redirects {
                return Err(ConfigError::TooManyRedirects {
                    limit: self.max_redirects,
                    origin: next.describe(),
                });
            }
            redirects += 1;
            tracing::debug!(
                from = %source.describe(),
                to = %next.describe(),
                "following config location"
            );
            source = next;
        }
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

fn read_file(path: &Path) -> Result<Map<String, Value>, ConfigError> {
    let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value =
        serde_json::from_str(&data).map_err(|source| ConfigError::InvalidConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
    into_object(value, path.display().to_string())
}

fn fetch_remote(url: &str) -> Result<Map<String, Value>, ConfigError> {
    let invalid = |source| ConfigError::InvalidRemoteConfig {
        url: url.to_string(),
        source,
    };

    let value: Value = reqwest::blocking::Client::new()
        .get(url)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .header(reqwest::header::ACCEPT, "application/json; charset=UTF-8")
        .send()
        .and_then(|response| response.error_for_status())
        .and_then(|response| response.json::<Value>())
        .map_err(invalid)?;
    into_object(value, url.to_string())
}

fn into_object(value: Value, origin: String) -> Result<Map<String, Value>, ConfigError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ConfigError::NotAnObject { origin }),
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, ConfigLoader, ConfigSource, Configuration};
    use serde_json::{Map, Value, json};
    use std::io::{Read, Write};
    use std::net::TcpListener;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn serve_once(body: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
        let addr = listener.local_addr().expect("listener has an address");
        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf);
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });
        format!("http://{addr}/config.json")
    }

    #[test]
    fn inline_source_is_copied() {
        let original = object(json!({"docker": {"organization": "acme"}, "port": 3000}));
        let loader = ConfigLoader::new(".");

        let config = loader
            .resolve(Some(ConfigSource::from(original.clone())))
            .expect("inline config resolves");

        assert_eq!(config.to_object(), original);
        assert_eq!(config.get("port"), Some(&json!(3000)));
    }

    #[test]
    fn missing_source_is_rejected() {
        let err = ConfigLoader::new("/nonexistent")
            .resolve(None)
            .expect_err("no source should fail");
        assert!(matches!(err, ConfigError::Missing));
        assert!(ConfigSource::parse("").is_none());
    }

    #[test]
    fn classifies_location_strings() {
        assert_eq!(
            ConfigSource::parse("https://cfg.example.com/a.json"),
            Some(ConfigSource::Remote("https://cfg.example.com/a.json".into()))
        );
        assert_eq!(
            ConfigSource::parse("config/config.json"),
            Some(ConfigSource::File("config/config.json".into()))
        );
    }

    #[test]
    fn reads_file_without_location() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"docker":{"organization":"acme"},"debug":true}"#).unwrap();

        let config = ConfigLoader::new(dir.path())
            .resolve(ConfigSource::parse("config.json"))
            .expect("file config resolves");

        assert_eq!(
            config.to_object(),
            object(json!({"docker": {"organization": "acme"}, "debug": true}))
        );
    }

    #[test]
    fn follows_location_to_other_file() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let target = dir.path().join("real.json");
        std::fs::write(&target, r#"{"hydra":{"serviceName":"foo-service","servicePort":8080}}"#)
            .unwrap();
        let outer = dir.path().join("config.json");
        std::fs::write(&outer, json!({"location": target, "ignored": 1}).to_string()).unwrap();

        let config = ConfigLoader::new(dir.path())
            .resolve(ConfigSource::parse("config.json"))
            .expect("redirected config resolves");

        assert!(config.get("ignored").is_none());
        assert!(config.get("location").is_none());
        let hydra = config.hydra().unwrap().expect("hydra section present");
        assert_eq!(hydra.service_name, "foo-service");
        assert_eq!(hydra.service_port, 8080);
    }

    #[test]
    fn caps_redirect_depth() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        std::fs::write(dir.path().join("a.json"), r#"{"location":"b.json"}"#).unwrap();
        std::fs::write(dir.path().join("b.json"), r#"{"location":"a.json"}"#).unwrap();

        let err = ConfigLoader::new(dir.path())
            .resolve(ConfigSource::parse("a.json"))
            .expect_err("circular redirect must stop");
        assert!(matches!(err, ConfigError::TooManyRedirects { limit: 1, .. }));

        let err = ConfigLoader::new(dir.path())
            .with_max_redirects(5)
            .resolve(ConfigSource::parse("a.json"))
            .expect_err("circular redirect must stop");
        assert!(matches!(err, ConfigError::TooManyRedirects { limit: 5, .. }));
    }

    #[test]
    fn falsy_location_is_dropped() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        std::fs::write(dir.path().join("c.json"), r#"{"location":"","name":"x"}"#).unwrap();

        let config = ConfigLoader::new(dir.path())
            .resolve(ConfigSource::parse("c.json"))
            .expect("empty location means no redirect");
        assert_eq!(config.to_object(), object(json!({"name": "x"})));
    }

    #[test]
    fn numeric_location_is_invalid() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        std::fs::write(dir.path().join("c.json"), r#"{"location":42}"#).unwrap();

        let err = ConfigLoader::new(dir.path())
            .resolve(ConfigSource::parse("c.json"))
            .expect_err("numeric location is rejected");
        assert!(matches!(err, ConfigError::InvalidLocation { .. }));
    }

    #[test]
    fn reports_io_and_parse_errors() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let loader = ConfigLoader::new(dir.path());

        let err = loader
            .resolve(ConfigSource::parse("missing.json"))
            .expect_err("missing file fails");
        assert!(matches!(err, ConfigError::Io { .. }));

        std::fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        let err = loader
            .resolve(ConfigSource::parse("bad.json"))
            .expect_err("bad json fails");
        assert!(matches!(err, ConfigError::InvalidConfigFile { .. }));
    }

    #[test]
    fn fetches_remote_config() {
        let url = serve_once(r#"{"docker":{"organization":"remote"}}"#.to_string());

        let config = ConfigLoader::new(".")
            .resolve(ConfigSource::parse(&url))
            .expect("remote config resolves");
        assert_eq!(config.get("docker"), Some(&json!({"organization": "remote"})));
    }

    #[test]
    fn remote_garbage_is_invalid() {
        let url = serve_once("<html>nope</html>".to_string());

        let err = ConfigLoader::new(".")
            .resolve(ConfigSource::parse(&url))
            .expect_err("non-json body fails");
        assert!(matches!(err, ConfigError::InvalidRemoteConfig { .. }));
    }

    #[test]
    fn follows_location_from_remote_document() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let target = dir.path().join("local.json");
        std::fs::write(&target, r#"{"docker":{"organization":"local"}}"#).unwrap();
        let url = serve_once(json!({ "location": target }).to_string());

        let config = ConfigLoader::new(dir.path())
            .resolve(ConfigSource::parse(&url))
            .expect("remote redirect resolves");
        assert_eq!(config.to_object(), object(json!({"docker": {"organization": "local"}})));
    }

    #[test]
    fn organization_alone_is_a_valid_docker_section() {
        let config = Configuration {
            values: object(json!({"docker": {"organization": "acme"}})),
        };
        let docker = config.docker().unwrap().expect("docker section present");
        assert_eq!(docker.organization, "acme");
        assert_eq!(docker.base_image, None);
        assert_eq!(docker.author, None);
    }

    #[test]
    fn logger_plugin_uses_truthiness() {
        let hydra = |plugins: Value| Configuration {
            values: object(json!({"hydra": {"serviceName": "a-service", "servicePort": 1, "plugins": plugins}})),
        }
        .hydra()
        .unwrap()
        .expect("hydra section present");

        assert!(hydra(json!({"logger": {"logRetention": {}}})).plugins.logger_enabled());
        assert!(hydra(json!({"logger": true})).plugins.logger_enabled());
        assert!(hydra(json!({"logger": "hls"})).plugins.logger_enabled());
        assert!(!hydra(json!({"logger": 0})).plugins.logger_enabled());
        assert!(!hydra(json!({"logger": ""})).plugins.logger_enabled());
        assert!(!hydra(json!({"logger": null})).plugins.logger_enabled());
        assert!(!hydra(json!({})).plugins.logger_enabled());
    }

    #[test]
    fn malformed_section_is_reported() {
        let config = Configuration {
            values: object(json!({"docker": {"organization": 7}})),
        };
        let err = config.docker().expect_err("wrong field type");
        assert!(matches!(err, ConfigError::InvalidSection { ref section, .. } if section == "docker"));

        let empty = Configuration {
            values: object(json!({"docker": null})),
        };
        assert!(empty.docker().unwrap().is_none());
    }

    #[test]
    fn docker_toggles_default_off() {
        let config = Configuration {
            values: object(json!({"docker": {
                "organization": "acme",
                "baseImage": "node:20",
                "author": "Ops",
                "email": "ops@acme.io"
            }})),
        };
        let docker = config.docker().unwrap().expect("docker section present");
        assert_eq!(docker.base_image.as_deref(), Some("node:20"));
        assert!(!docker.include_healthcheck);
        assert!(!docker.include_dockerignore);
        assert_eq!(docker.logger_plugin, None);
    }
}

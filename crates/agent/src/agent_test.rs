use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use lodge_inputs::file::{FileRegistryConfig, LineParser, OffsetRegistry, PlainParser};
use lodge_inputs::system::SystemConfig;
use lodge_schema::{Field, FieldType, TimestampFormat, Value};
use lodge_storage::{EchoStorage, Query, SqliteConfig, SqliteStorage, StorageDriver};

use super::{Agent, AgentConfig};

fn offsets() -> OffsetRegistry {
    OffsetRegistry::open(&FileRegistryConfig {
        offsets: None,
        limit: 0,
    })
    .unwrap()
}

fn echo() -> Arc<dyn StorageDriver> {
    Arc::new(EchoStorage)
}

fn time_field(name: &str, format: &str) -> Field {
    Field {
        name: name.to_string(),
        timestamp: Some(TimestampFormat {
            format: format.to_string(),
        }),
        ..Field::default()
    }
}

fn log_schema() -> Vec<Field> {
    vec![
        time_field("time", "%Y-%m-%d %H:%M:%S"),
        Field::new("level", FieldType::String),
        Field::new("message", FieldType::String),
    ]
}

fn raw(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn test_init_validates_name() {
    let config = AgentConfig {
        fields: log_schema(),
        ..AgentConfig::default()
    };

    assert!(Agent::init("", &config, echo(), offsets()).await.is_err());
    assert!(
        Agent::init("bad name", &config, echo(), offsets())
            .await
            .is_err()
    );
    assert!(
        Agent::init("nginx_access", &config, echo(), offsets())
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_init_requires_time_field() {
    let config = AgentConfig {
        fields: vec![Field::new("message", FieldType::String)],
        ..AgentConfig::default()
    };
    assert!(Agent::init("logs", &config, echo(), offsets()).await.is_err());
}

#[tokio::test]
async fn test_init_rejects_duplicate_field_names() {
    let duplicate = Field {
        name: "message".to_string(),
        template: Some("{{.level}}".to_string()),
        ..Field::default()
    };

    let mut fields = log_schema();
    fields.push(duplicate);

    let config = AgentConfig {
        fields,
        ..AgentConfig::default()
    };
    assert!(Agent::init("logs", &config, echo(), offsets()).await.is_err());
}

#[tokio::test]
async fn test_retention_field_is_first_time_field() {
    let config = AgentConfig {
        fields: vec![
            Field::new("status", FieldType::Int),
            time_field("created", "%Y-%m-%d %H:%M:%S"),
            time_field("updated", "%Y-%m-%d %H:%M:%S"),
        ],
        ..AgentConfig::default()
    };

    let agent = Agent::init("logs", &config, echo(), offsets()).await.unwrap();
    assert_eq!(agent.retention_field(), "created");
}

#[tokio::test]
async fn test_system_agent_adopts_sampler_schema() {
    let config = AgentConfig {
        system: Some(SystemConfig::default()),
        ..AgentConfig::default()
    };

    let agent = Agent::init("host", &config, echo(), offsets()).await.unwrap();

    let names: Vec<&str> = agent.schema().iter().map(|f| f.name()).collect();
    assert!(names.contains(&"cpu_usage"));
    assert!(names.contains(&"mem_total"));
    assert_eq!(agent.retention_field(), "time");
}

#[tokio::test]
async fn test_serialize_substitutes_defaults() {
    let config = AgentConfig {
        fields: log_schema(),
        ..AgentConfig::default()
    };
    let agent = Agent::init("logs", &config, echo(), offsets()).await.unwrap();

    let record = agent.serialize(&raw(&[("level", "INFO")]));
    assert_eq!(record["time"], Value::Int(0));
    assert_eq!(record["level"], Value::Str("INFO".to_string()));
    assert_eq!(record["message"], Value::Str(String::new()));
}

#[tokio::test]
async fn test_serialize_is_deterministic() {
    let config = AgentConfig {
        fields: log_schema(),
        ..AgentConfig::default()
    };
    let agent = Agent::init("logs", &config, echo(), offsets()).await.unwrap();

    let data = raw(&[
        ("time", "2023-01-01 12:00:00"),
        ("level", "INFO"),
        ("message", "Test message"),
    ]);
    assert_eq!(agent.serialize(&data), agent.serialize(&data));
}

#[tokio::test]
async fn test_json_style_type_conversion() {
    // A JSON input line arrives as raw strings; the schema types them.
    let config = AgentConfig {
        fields: vec![
            time_field("time", "%Y-%m-%d %H:%M:%S"),
            Field::new("int", FieldType::Int),
            Field::new("float", FieldType::Float),
        ],
        ..AgentConfig::default()
    };
    let agent = Agent::init("logs", &config, echo(), offsets()).await.unwrap();

    let record = agent.serialize(&raw(&[
        ("time", "2023-01-01 12:00:00"),
        ("int", "123"),
        ("float", "123.456"),
    ]));

    assert_eq!(record["time"], Value::Int(1672574400000));
    assert_eq!(record["int"], Value::Int(123));
    assert_eq!(record["float"], Value::Float(123.456));
}

#[tokio::test]
async fn test_plain_line_to_stored_row() {
    // A full pass: regex parse, serialize, write, query back.
    let storage: Arc<dyn StorageDriver> = Arc::new(
        SqliteStorage::open(SqliteConfig::memory()).await.unwrap(),
    );

    let config = AgentConfig {
        fields: log_schema(),
        ..AgentConfig::default()
    };
    let agent = Agent::init("logs", &config, Arc::clone(&storage), offsets())
        .await
        .unwrap();

    let parser =
        PlainParser::new(r"^(?P<time>[^ ]+ [^ ]+) (?P<level>\w+) (?P<message>.*)").unwrap();
    let data = parser
        .parse("2023-01-01 12:00:00 INFO Test message")
        .unwrap()
        .unwrap();
    agent.process(data).await;

    let mut line = None;
    for _ in 0..200 {
        let (tx, mut rx) = mpsc::channel::<Bytes>(16);
        storage.query(tx, &Query::new("logs")).await.unwrap();
        if let Ok(bytes) = rx.try_recv() {
            line = Some(String::from_utf8(bytes.to_vec()).unwrap());
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let line = line.expect("no row stored");
    let row: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
    assert_eq!(row["_cursor"], "0000000000000001");
    assert_eq!(row["time"], 1672574400000i64);
    assert_eq!(row["level"], "INFO");
    assert_eq!(row["message"], "Test message");
}

#[tokio::test]
async fn test_config_deserializes_from_yaml() {
    let yaml = r#"
fields:
  - name: time
    timestamp:
      format: common
  - name: status
    type: int
  - name: summary
    template: "{{.method}} {{.path}}"
file:
  path: /var/log/nginx/access_(?P<host>.*)\.log
  format: plain
  regex: '(?P<time>[^ ]+) (?P<method>\w+) (?P<path>[^ ]+) (?P<status>\d+)'
  rotation:
    method: truncate
    max_size: 10MB
retention:
  period: 3d
  interval: 1h
"#;

    let config: AgentConfig = serde_yaml::from_str(yaml).unwrap();
    let agent = Agent::init("nginx", &config, echo(), offsets()).await.unwrap();

    assert_eq!(agent.name(), "nginx");
    assert_eq!(agent.retention_field(), "time");
    assert_eq!(agent.schema().len(), 3);
    assert_eq!(agent.schema()[1].kind(), FieldType::Int);
}

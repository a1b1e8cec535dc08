use crate::layout::ChordLayout;
use chord_schema::{keys, Artifact, ConfigVars};
use std::path::Path;

const POSTGRES_PORT: &str = "5432";

fn path_str(p: &Path) -> String {
    p.to_string_lossy().into_owned()
}

/// Derived, non-secret config for an artifact seen for the first time.
///
/// Only ever persisted once per artifact, at image build time.
pub fn static_template(layout: &ChordLayout, artifact: &Artifact) -> ConfigVars {
    let tmp = layout.tmp_dir();
    let postgres_dir = tmp.join("postgresql");
    let data = layout.data_dir().join(artifact.as_str());

    let entries = [
        (keys::REDIS_SOCKET, path_str(&tmp.join("redis.sock"))),
        (
            keys::POSTGRES_SOCKET,
            path_str(&postgres_dir.join(format!(".s.PGSQL.{POSTGRES_PORT}"))),
        ),
        (keys::POSTGRES_SOCKET_DIR, path_str(&postgres_dir)),
        (keys::POSTGRES_PORT, POSTGRES_PORT.to_owned()),
        (keys::POSTGRES_DATABASE, format!("{artifact}_db")),
        (keys::POSTGRES_USER, format!("{artifact}_acct")),
        (keys::SERVICE_ARTIFACT, artifact.to_string()),
        (
            keys::SERVICE_SOCKET,
            path_str(&tmp.join(format!("{artifact}.sock"))),
        ),
        (
            keys::SERVICE_VENV,
            path_str(&layout.service_install_dir(artifact).join("env")),
        ),
        (keys::SERVICE_URL_BASE_PATH, format!("/api/{artifact}")),
        (keys::SERVICE_DATA, path_str(&data)),
        (
            keys::SERVICE_LOGS,
            path_str(&tmp.join("logs").join(artifact.as_str())),
        ),
        (
            keys::SERVICE_TEMP,
            path_str(&tmp.join("data").join(artifact.as_str())),
        ),
        (
            keys::SERVICE_ENVIRONMENT,
            path_str(&data.join(".environment")),
        ),
    ];

    entries
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v))
        .collect()
}

use assert_cmd::Command;
use predicates::prelude::*;
use serial_test::serial;
use std::fs::write;
use tempfile::{tempdir, NamedTempFile};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// One debian repository with one package whose files live under `dist_dir`.
fn manifest_yaml(dist_dir: &std::path::Path, publish: bool) -> String {
    format!(
        r#"
threads: 2
bintray:
  repos:
    - name: debs
      subject: acme
      config:
        type: debian
      packages:
        - package: agent
          upload:
            version: 1.0.0
            pattern: "{}/*.deb"
            publish: {publish}
"#,
        dist_dir.display()
    )
}

fn create_config(content: &str) -> NamedTempFile {
    let config = NamedTempFile::new().expect("Creating temp config file failed");
    write(config.path(), content).expect("Writing temp config failed");
    config
}

#[test]
fn sync_cli_fails_when_config_is_missing() {
    let mut cmd = Command::cargo_bin("bintray-sync").expect("Binary exists");
    cmd.arg("sync")
        .arg("--config")
        .arg("/no/such/manifest.yaml")
        .env("BINTRAY_USER", "jdoe")
        .env("BINTRAY_KEY", "apikey");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[test]
fn reconcile_cli_fails_without_credentials() {
    let dist = tempdir().unwrap();
    let config = create_config(&manifest_yaml(dist.path(), false));

    let mut cmd = Command::cargo_bin("bintray-sync").expect("Binary exists");
    cmd.arg("reconcile")
        .arg("--config")
        .arg(config.path())
        .env_remove("BINTRAY_USER")
        .env_remove("BINTRAY_KEY");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("BINTRAY_USER"));
}

#[test]
fn cli_rejects_unknown_subcommand() {
    let mut cmd = Command::cargo_bin("bintray-sync").expect("Binary exists");
    cmd.arg("upload");
    cmd.assert().failure();
}

#[tokio::test(flavor = "multi_thread")]
async fn reconcile_cli_makes_no_changes_when_everything_exists() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/debs"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/packages/acme/debs/agent"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dist = tempdir().unwrap();
    let config = create_config(&manifest_yaml(dist.path(), false));
    let config_path = config.path().to_path_buf();
    let api_url = server.uri();

    tokio::task::spawn_blocking(move || {
        Command::cargo_bin("bintray-sync")
            .expect("Binary exists")
            .arg("reconcile")
            .arg("--config")
            .arg(&config_path)
            .env("BINTRAY_USER", "jdoe")
            .env("BINTRAY_KEY", "apikey")
            .env("BINTRAY_API_URL", api_url)
            .assert()
            .success()
            .stdout(
                predicate::str::contains("Reconcile complete")
                    .and(predicate::str::contains("already_exists")),
            );
    })
    .await
    .expect("command task");

    let requests = server.received_requests().await.unwrap_or_default();
    assert!(
        requests.iter().all(|r| r.method.as_str() == "GET"),
        "reconcile must not mutate existing state: {requests:?}"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn reconcile_cli_exits_non_zero_when_repository_creation_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/debs"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/debs"))
        .respond_with(ResponseTemplate::new(500).set_body_string("quota exceeded"))
        .expect(1)
        .mount(&server)
        .await;

    let dist = tempdir().unwrap();
    let config = create_config(&manifest_yaml(dist.path(), false));
    let config_path = config.path().to_path_buf();
    let api_url = server.uri();

    tokio::task::spawn_blocking(move || {
        Command::cargo_bin("bintray-sync")
            .expect("Binary exists")
            .arg("reconcile")
            .arg("--config")
            .arg(&config_path)
            .env("BINTRAY_USER", "jdoe")
            .env("BINTRAY_KEY", "apikey")
            .env("BINTRAY_API_URL", api_url)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Reconciliation failed"));
    })
    .await
    .expect("command task");

    let requests = server.received_requests().await.unwrap_or_default();
    assert!(
        !requests.iter().any(|r| r.url.path() == "/packages/acme/debs/agent"),
        "packages must not be touched after the repository failed: {requests:?}"
    );
}

use std::sync::{Arc, Mutex};
use tracing_subscriber::prelude::*; // needed for .with()
use tracing_subscriber::{layer::Context, Layer, Registry};

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        use std::fmt::Write as FmtWrite;
        let mut msg = String::new();
        let _ = write!(&mut msg, "{:?}", event);
        self.events.lock().unwrap().push(msg);
    }
}

#[tokio::test]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    use bintray_sync::cli::{run, Cli, Commands};

    // The dummy path fails to load; the event is emitted before that.
    let cli = Cli {
        command: Commands::Sync {
            config: std::path::PathBuf::from("dummy.yaml"),
            cleanup: false,
        },
    };

    let _ = run(cli).await;

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}

/// Mounts every endpoint a sync of the single-package manifest touches.
async fn mount_sync_endpoints(server: &MockServer, upload_status: u16) {
    for (verb, route, status) in [
        ("GET", "/repos/acme/debs", 404),
        ("POST", "/repos/acme/debs", 201),
        ("GET", "/packages/acme/debs/agent/versions/1.0.0", 404),
        ("POST", "/packages/acme/debs/agent/versions", 201),
        ("PUT", "/content/acme/debs/agent/1.0.0/agent_1.0.0_amd64.deb", upload_status),
        ("POST", "/gpg/acme/debs/agent/versions/1.0.0", 200),
        ("POST", "/content/acme/debs/agent/1.0.0/publish", 200),
        ("POST", "/calc_metadata/acme/debs", 202),
    ] {
        Mock::given(method(verb))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status))
            .mount(server)
            .await;
    }
    // Package lookup: absent for reconcile, present for the final show.
    Mock::given(method("GET"))
        .and(path("/packages/acme/debs/agent"))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/packages/acme/debs"))
        .respond_with(ResponseTemplate::new(201))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/packages/acme/debs/agent"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"name": "agent", "versions": ["1.0.0"]})),
        )
        .mount(server)
        .await;
}

fn set_bintray_env(server: &MockServer) {
    std::env::set_var("BINTRAY_USER", "jdoe");
    std::env::set_var("BINTRAY_KEY", "apikey");
    std::env::set_var("BINTRAY_API_URL", server.uri());
    std::env::remove_var("BINTRAY_ADMIN_GPG_PASSPHRASE");
}

#[tokio::test]
#[serial]
async fn sync_run_provisions_uploads_and_publishes() {
    use bintray_sync::cli::{run, Cli, Commands};

    let server = MockServer::start().await;
    mount_sync_endpoints(&server, 201).await;
    set_bintray_env(&server);

    let dist = tempdir().unwrap();
    write(dist.path().join("agent_1.0.0_amd64.deb"), b"deb").unwrap();
    let config = create_config(&manifest_yaml(dist.path(), true));

    run(Cli {
        command: Commands::Sync {
            config: config.path().to_path_buf(),
            cleanup: false,
        },
    })
    .await
    .expect("sync should succeed");

    let requests = server.received_requests().await.unwrap_or_default();
    let published = requests
        .iter()
        .any(|r| r.method.as_str() == "POST" && r.url.path().ends_with("/publish"));
    assert!(published, "expected a publish call: {requests:?}");
}

#[tokio::test]
#[serial]
async fn sync_run_fails_when_a_step_fails() {
    use bintray_sync::cli::{run, Cli, Commands};

    let server = MockServer::start().await;
    mount_sync_endpoints(&server, 500).await;
    set_bintray_env(&server);

    let dist = tempdir().unwrap();
    write(dist.path().join("agent_1.0.0_amd64.deb"), b"deb").unwrap();
    let config = create_config(&manifest_yaml(dist.path(), false));

    let err = run(Cli {
        command: Commands::Sync {
            config: config.path().to_path_buf(),
            cleanup: false,
        },
    })
    .await
    .expect_err("failed upload must fail the run");
    assert!(err.to_string().contains("publish steps failed"));
}
